//! CNN Model Architecture for Celestial Bodies Classification
//!
//! A deliberately small network: one valid-padded convolution, one max-pool,
//! then two dense layers. The last layer emits raw logits; softmax is applied
//! by the inference post-processing, never inside the model.

use burn::{
    config::Config,
    module::{Module, ModuleVisitor, Param, ParamId},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Initializer, Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, ElementConversion, Tensor},
};
use tracing::{debug, info};

use crate::config::TrainConfig;
use crate::utils::error::{CelestialError, Result as CelestialResult};

/// Configuration for the CelestialClassifier CNN model
#[derive(Config, Debug)]
pub struct CelestialClassifierConfig {
    /// Input shape `[height, width, channels]`
    pub image_shape: [usize; 3],

    /// Filters of the convolution layer
    pub conv_filters: usize,

    /// Units of the hidden dense layer
    pub dense_units: usize,

    /// Width of the logits layer
    pub output_classes: usize,

    /// Square convolution kernel size
    #[config(default = "3")]
    pub kernel_size: usize,

    /// Square max-pool window, also used as its stride
    #[config(default = "3")]
    pub pool_size: usize,
}

impl CelestialClassifierConfig {
    /// Architecture described by a training configuration
    pub fn from_train_config(config: &TrainConfig) -> Self {
        Self::new(
            config.image_shape(),
            config.conv_filters,
            config.dense_units,
            config.output_classes,
        )
    }

    /// Spatial size `[height, width]` after convolution and pooling
    pub fn feature_dims(&self) -> CelestialResult<[usize; 2]> {
        let [height, width, channels] = self.image_shape;

        if channels == 0
            || self.conv_filters == 0
            || self.dense_units == 0
            || self.output_classes == 0
            || self.kernel_size == 0
            || self.pool_size == 0
        {
            return Err(CelestialError::Shape(format!(
                "Every layer size must be positive: {:?}",
                self
            )));
        }

        let reduce = |size: usize| -> Option<usize> {
            let conv = size.checked_sub(self.kernel_size)? + 1;
            let pooled = conv.checked_sub(self.pool_size)? / self.pool_size + 1;
            Some(pooled)
        };

        match (reduce(height), reduce(width)) {
            (Some(h), Some(w)) => Ok([h, w]),
            _ => Err(CelestialError::Shape(format!(
                "Input {}x{} is too small for a {k}x{k} convolution followed by a {p}x{p} pool",
                height,
                width,
                k = self.kernel_size,
                p = self.pool_size
            ))),
        }
    }

    /// Number of features entering the hidden dense layer
    pub fn flattened_features(&self) -> CelestialResult<usize> {
        let [h, w] = self.feature_dims()?;
        Ok(h * w * self.conv_filters)
    }

    /// Initialize an untrained model from the configuration
    pub fn init<B: Backend>(&self, device: &B::Device) -> CelestialResult<CelestialClassifier<B>> {
        let [height, width, channels] = self.image_shape;
        let flattened = self.flattened_features()?;

        // Keras defaults: Glorot-uniform kernels, zero biases
        let initializer = Initializer::XavierUniform { gain: 1.0 };

        let mut conv = Conv2dConfig::new(
            [channels, self.conv_filters],
            [self.kernel_size, self.kernel_size],
        )
        .with_initializer(initializer.clone())
        .init(device);

        let pool = MaxPool2dConfig::new([self.pool_size, self.pool_size])
            .with_strides([self.pool_size, self.pool_size])
            .init();

        let mut dense = LinearConfig::new(flattened, self.dense_units)
            .with_initializer(initializer.clone())
            .init(device);

        let mut output = LinearConfig::new(self.dense_units, self.output_classes)
            .with_initializer(initializer)
            .init(device);

        conv.bias = zeroed(conv.bias);
        dense.bias = zeroed(dense.bias);
        output.bias = zeroed(output.bias);

        Ok(CelestialClassifier {
            conv,
            pool,
            dense,
            output,
            activation: Relu::new(),
            input_height: height,
            input_width: width,
            input_channels: channels,
            num_classes: self.output_classes,
        })
    }

    /// Keras-style layer table with output shapes and parameter counts
    pub fn summary(&self) -> CelestialResult<String> {
        let [height, width, channels] = self.image_shape;
        let [ph, pw] = self.feature_dims()?;
        let k = self.kernel_size;
        let f = self.conv_filters;
        let flattened = self.flattened_features()?;

        let layers = [
            (
                "conv2d (Conv2D)",
                format!("(None, {}, {}, {})", height - k + 1, width - k + 1, f),
                k * k * channels * f + f,
            ),
            (
                "max_pooling2d (MaxPooling2D)",
                format!("(None, {}, {}, {})", ph, pw, f),
                0,
            ),
            ("flatten (Flatten)", format!("(None, {})", flattened), 0),
            (
                "dense (Dense)",
                format!("(None, {})", self.dense_units),
                flattened * self.dense_units + self.dense_units,
            ),
            (
                "dense_1 (Dense)",
                format!("(None, {})", self.output_classes),
                self.dense_units * self.output_classes + self.output_classes,
            ),
        ];

        let mut out = String::new();
        out.push_str(&format!(
            "{:<30}{:<25}{:>10}\n",
            "Layer (type)", "Output Shape", "Param #"
        ));
        out.push_str(&"=".repeat(65));
        out.push('\n');

        let mut total = 0;
        for (name, shape, params) in layers {
            total += params;
            out.push_str(&format!("{:<30}{:<25}{:>10}\n", name, shape, params));
        }

        out.push_str(&"=".repeat(65));
        out.push('\n');
        out.push_str(&format!("Total params: {}\n", total));

        Ok(out)
    }
}

/// Celestial bodies classifier CNN
///
/// Architecture:
/// - Conv2d (3x3, valid) + ReLU
/// - MaxPool2d (3x3, stride 3)
/// - Flatten
/// - Linear + ReLU
/// - Linear (logits)
#[derive(Module, Debug)]
pub struct CelestialClassifier<B: Backend> {
    pub conv: Conv2d<B>,
    pub pool: MaxPool2d,
    pub dense: Linear<B>,
    pub output: Linear<B>,
    activation: Relu,

    // Input contract, kept for callers and for the packaged manifest
    input_height: usize,
    input_width: usize,
    input_channels: usize,
    num_classes: usize,
}

impl<B: Backend> CelestialClassifier<B> {
    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `images` - Channel-last input of shape [batch_size, height, width, channels]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // NHWC -> NCHW for Burn's convolution
        let x = images.permute([0, 3, 1, 2]);

        let x = self.conv.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);

        let x: Tensor<B, 2> = x.flatten(1, 3);

        let x = self.dense.forward(x);
        let x = self.activation.forward(x);
        self.output.forward(x)
    }

    /// Input shape as `[height, width, channels]`
    pub fn input_shape(&self) -> [usize; 3] {
        [self.input_height, self.input_width, self.input_channels]
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Same-shaped trainable bias filled with zeros
fn zeroed<B: Backend>(bias: Option<Param<Tensor<B, 1>>>) -> Option<Param<Tensor<B, 1>>> {
    bias.map(|b| Param::from_tensor(b.val().zeros_like()))
}

/// Accumulates the squared L2 norm of every float parameter
struct SquaredNorm {
    sum: f64,
}

impl<B: Backend> ModuleVisitor<B> for SquaredNorm {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        let squared: f64 = (tensor.clone() * tensor.clone())
            .sum()
            .into_scalar()
            .elem();
        self.sum += squared;
    }
}

/// L2 norm over all model parameters
///
/// Visiting the parameters also materializes any lazily initialized weights.
pub fn weight_norm<B: Backend, M: Module<B>>(model: &M) -> f64 {
    let mut visitor = SquaredNorm { sum: 0.0 };
    model.visit(&mut visitor);
    visitor.sum.sqrt()
}

/// Build an untrained classifier with weights drawn from `seed`
///
/// The backend RNG is re-seeded on every call and all parameters are
/// materialized before returning, so the initial weights depend only on the
/// seed and the configuration.
pub fn build_model<B: Backend>(
    config: &CelestialClassifierConfig,
    seed: u64,
    device: &B::Device,
) -> CelestialResult<CelestialClassifier<B>> {
    B::seed(seed);
    let model = config.init::<B>(device)?;

    let norm = weight_norm::<B, _>(&model);
    info!(
        "Model built: input {:?}, {} classes, {} parameters",
        model.input_shape(),
        model.num_classes(),
        model.num_params()
    );
    debug!("Initial weight norm: {:.6}", norm);

    Ok(model)
}
