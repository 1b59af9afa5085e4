//! Myo Gesture Trainer CLI
//!
//! Offline EMG gesture classifier training and ONNX export.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use myo_gesture_trainer::{
    config::Config,
    pipeline::{Pipeline, TrainRun},
    report::RunSummary,
    VERSION,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "myo-trainer")]
#[command(version = VERSION)]
#[command(about = "Train and export an EMG gesture classifier", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the <Label>_RAW.csv logs
    #[arg(long, global = true)]
    input_dir: Option<PathBuf>,

    /// Directory receiving every artifact of a run
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment raw logs into emg_clean.csv
    Prepare,

    /// Extract and scale features from emg_clean.csv
    Features,

    /// Train and export the classifier from emg_clean.csv
    Train {
        /// Skip the grid search and use the configured default parameters
        #[arg(long)]
        no_grid_search: bool,
    },

    /// Prepare, then train
    Run {
        /// Skip the grid search and use the configured default parameters
        #[arg(long)]
        no_grid_search: bool,
    },

    /// Classify the rows of a features CSV with the exported model
    ///
    /// The columns must match the ones the model was trained on:
    /// emg_features_raw.csv for feature scaling, emg_features_scaled.csv when
    /// scaling targets the raw channels.
    Predict {
        /// Features CSV (Label + feature columns)
        features: PathBuf,
    },

    /// Show configuration
    Config,

    /// Write the default configuration
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Prepare => load_config(&cli.config, &cli.input_dir, &cli.output_dir)
            .and_then(cmd_prepare),
        Commands::Features => load_config(&cli.config, &cli.input_dir, &cli.output_dir)
            .and_then(cmd_features),
        Commands::Train { no_grid_search } => {
            load_config(&cli.config, &cli.input_dir, &cli.output_dir)
                .and_then(|config| cmd_train(config, no_grid_search))
        }
        Commands::Run { no_grid_search } => {
            load_config(&cli.config, &cli.input_dir, &cli.output_dir)
                .and_then(|config| cmd_run(config, no_grid_search))
        }
        Commands::Predict { features } => load_config(&cli.config, &cli.input_dir, &cli.output_dir)
            .and_then(|config| cmd_predict(config, &features)),
        Commands::Config => load_config(&cli.config, &cli.input_dir, &cli.output_dir)
            .and_then(|config| cmd_config(&config, cli.config.as_deref())),
        Commands::InitConfig { force } => cmd_init_config(cli.config.as_deref(), force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Load the configuration file and apply command-line overrides.
fn load_config(
    path: &Option<PathBuf>,
    input_dir: &Option<PathBuf>,
    output_dir: &Option<PathBuf>,
) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    if let Some(dir) = input_dir {
        config.input_dir = dir.clone();
    }
    if let Some(dir) = output_dir {
        config.output_dir = dir.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn cmd_prepare(config: Config) -> Result<()> {
    println!("Myo Gesture Trainer v{VERSION}");
    let mut summary = RunSummary::new(&config);
    let pipeline = Pipeline::new(config)?;

    let sessions = pipeline.prepare(&mut summary).context("Prepare failed")?;
    println!();
    println!("Sessions written: {}", sessions.len());
    if let Some(seg) = &summary.segmentation {
        for (label, counts) in &seg.labels {
            println!(
                "  {label}: {} retained ({} too short, {} inactive)",
                counts.retained, counts.rejected_short, counts.rejected_inactive
            );
        }
    }
    Ok(())
}

fn cmd_features(config: Config) -> Result<()> {
    println!("Myo Gesture Trainer v{VERSION}");
    let mut summary = RunSummary::new(&config);
    let pipeline = Pipeline::new(config)?;

    let extraction = pipeline
        .features(&mut summary)
        .context("Feature extraction failed")?;
    println!();
    println!(
        "Feature vectors: {} x {}",
        extraction.scaled.len(),
        extraction.scaled.width()
    );
    println!(
        "Scaler: {:?} on {:?}",
        extraction.scaler.method, extraction.scaler.target
    );
    Ok(())
}

fn cmd_train(mut config: Config, no_grid_search: bool) -> Result<()> {
    println!("Myo Gesture Trainer v{VERSION}");
    if no_grid_search {
        config.training.grid_search = false;
    }
    let mut summary = RunSummary::new(&config);
    let pipeline = Pipeline::new(config)?;

    let run = pipeline.train(&mut summary).context("Training failed")?;
    print_run(&run);
    Ok(())
}

fn cmd_run(mut config: Config, no_grid_search: bool) -> Result<()> {
    println!("Myo Gesture Trainer v{VERSION}");
    if no_grid_search {
        config.training.grid_search = false;
    }
    let mut summary = RunSummary::new(&config);
    let pipeline = Pipeline::new(config)?;

    let run = pipeline.run(&mut summary).context("Run failed")?;
    print_run(&run);
    Ok(())
}

fn print_run(run: &TrainRun) {
    println!();
    println!("Classes: {}", run.training.labels.classes().join(", "));
    for model in [&run.training.primary, &run.training.fallback] {
        println!(
            "  {} {}: test F1 {:.4}",
            model.name,
            model.network.architecture(),
            model.test_report.weighted_f1
        );
    }
    println!();
    println!(
        "Exported {} graph to {}",
        run.export.model_name,
        run.export.path.display()
    );
    for (name, reason) in &run.export.rejected {
        println!("  {name} graph rejected: {reason}");
    }
}

fn cmd_predict(config: Config, features: &Path) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let predictions = pipeline
        .predict(features)
        .with_context(|| format!("Prediction failed for {}", features.display()))?;

    println!("label,predicted,confidence");
    for p in &predictions {
        println!("{},{},{:.4}", p.label, p.predicted, p.confidence);
    }
    Ok(())
}

fn cmd_config(config: &Config, path: Option<&Path>) -> Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::config_path);
    println!("Config file: {:?}", path);
    println!("Window length: {} samples", config.windowing.window_len());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn cmd_init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::config_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Config::default()
        .save_to(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
