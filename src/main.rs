//! Celestial Bodies Classifier Training CLI
//!
//! Trains the classifier on a prepared dataset and writes the exported model
//! and its training history into a model folder.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use colored::Colorize;
use tracing::info;

use celestial_bodies::artifact::ArtifactStore;
use celestial_bodies::backend::{backend_name, default_device, TrainingBackend};
use celestial_bodies::config::{load_params, DEFAULT_PARAMS_FILE};
use celestial_bodies::utils::logging::{init_logging, LogConfig};
use celestial_bodies::utils::{format_duration, format_number};

const USAGE: &str = "Arguments error. Usage:\n\n\tcelestial-train <prepared-dataset-folder> <model-folder>\n";

/// Train the celestial bodies classifier and export it with its inference contract
#[derive(Parser, Debug)]
#[command(name = "celestial-train")]
#[command(version)]
#[command(about = "Train and package the celestial bodies image classifier", long_about = None)]
struct Cli {
    /// Folder produced by the dataset preparation stage
    prepared_dataset_folder: PathBuf,

    /// Folder receiving the exported model and the training history
    model_folder: PathBuf,

    /// Parameter file with `prepare` and `train` sections
    #[arg(long, default_value = DEFAULT_PARAMS_FILE)]
    params: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(_) => {
            println!("{}", USAGE);
            std::process::exit(1);
        }
    };

    let config = load_params(&cli.params)
        .with_context(|| format!("Failed to load parameters from {}", cli.params.display()))?;

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    }
    .with_env_override();
    init_logging(&log_config).map_err(|e| anyhow!(e))?;

    print_banner();
    info!("Backend: {}", backend_name());

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Dataset:        {}", cli.prepared_dataset_folder.display());
    println!("  Image size:     {}", config.image_size);
    println!("  Grayscale:      {}", config.grayscale);
    println!("  Epochs:         {}", config.epochs);
    println!("  Learning rate:  {}", config.learning_rate);
    println!("  Seed:           {}", config.seed);
    println!();

    let store = ArtifactStore::from_env()?;
    info!("Model store: {}", store.root().display());

    let summary = celestial_bodies::pipeline::run::<TrainingBackend>(
        &config,
        &cli.prepared_dataset_folder,
        &cli.model_folder,
        &store,
        &default_device(),
    )?;

    println!("{}", "Training Complete!".green().bold());
    println!("  Parameters:     {}", format_number(summary.num_params));
    if let Some(last) = summary.history.last() {
        println!(
            "  Final metrics:  loss {:.4}, accuracy {:.4}, val_loss {:.4}, val_accuracy {:.4}",
            last.loss, last.accuracy, last.val_loss, last.val_accuracy
        );
    }
    if let Some(best) = summary.history.best_val_accuracy() {
        println!("  Best val acc:   {:.4}", best);
    }
    println!("  Registered as:  {}", summary.tag);
    println!("  Duration:       {}", format_duration(summary.elapsed));

    let model_dir = cli
        .model_folder
        .canonicalize()
        .unwrap_or_else(|_| cli.model_folder.clone());
    println!("\nModel saved at {}", model_dir.display());

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ==================================================
   Celestial Bodies Classifier
   CNN training and packaging with Burn + Rust
 ==================================================
  "#
        .green()
    );
}
