//! Logging Module
//!
//! Provides structured logging utilities using the `tracing` crate.
//! Supports various output formats and log levels for debugging and production use.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Create a verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// `EnvFilter` directive for this configuration
    pub fn filter_directive(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        if self.level == LogLevel::Trace {
            level
        } else {
            format!("warn,celestial_bodies={level},celestial_train={level}")
        }
    }

    /// Apply the `CELESTIAL_LOG` environment variable on top of this config
    pub fn with_env_override(mut self) -> Self {
        if let Ok(level) = std::env::var("CELESTIAL_LOG") {
            self.level = LogLevel::parse(&level);
        }
        self
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name, falling back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Initialize logging with the given configuration
///
/// Log lines go to stderr so stdout stays reserved for the CLI's own messages.
/// Dependencies are capped at `warn` unless the level is `trace`.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let filter = EnvFilter::new(config.filter_directive());

    let layer = fmt::layer()
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .with_writer(std::io::stderr)
        .compact();

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Training progress logger
pub struct TrainingLogger {
    /// Current epoch (1-based)
    epoch: usize,
    /// Total epochs
    total_epochs: usize,
    /// Epoch start time
    epoch_start: std::time::Instant,
    /// Training start time
    training_start: std::time::Instant,
}

impl TrainingLogger {
    /// Create a new training logger
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: std::time::Instant::now(),
            training_start: std::time::Instant::now(),
        }
    }

    /// Log start of an epoch
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = std::time::Instant::now();

        tracing::info!("Epoch {}/{} started", epoch, self.total_epochs);
    }

    /// Log end of an epoch with the Keras-style metric line
    pub fn end_epoch(&self, train_loss: f64, train_acc: f64, val_loss: f64, val_acc: f64) {
        let epoch_time = self.epoch_start.elapsed();
        let total_time = self.training_start.elapsed();

        let epochs_remaining = self.total_epochs.saturating_sub(self.epoch);
        let avg_epoch_time = total_time.as_secs_f64() / self.epoch.max(1) as f64;
        let eta_secs = epochs_remaining as f64 * avg_epoch_time;

        tracing::info!(
            "Epoch {}/{} completed in {:.1}s | loss: {:.4} | accuracy: {:.4} | val_loss: {:.4} | val_accuracy: {:.4} | ETA: {:.0}s",
            self.epoch,
            self.total_epochs,
            epoch_time.as_secs_f64(),
            train_loss,
            train_acc,
            val_loss,
            val_acc,
            eta_secs
        );
    }

    /// Log training completion
    pub fn log_complete(&self, final_val_accuracy: f64) {
        let total_time = self.training_start.elapsed();

        tracing::info!(
            "Training complete! {} epochs in {:.1}s | Final val accuracy: {:.2}%",
            self.total_epochs,
            total_time.as_secs_f64(),
            final_val_accuracy * 100.0
        );
    }
}
