//! Myo Gesture Trainer - offline EMG gesture classifier training.
//!
//! This library turns per-gesture EMG logs recorded from an 8-pod armband into
//! a small classifier exported as an ONNX graph, together with the scaler and
//! label sidecars an in-engine inferencer needs.
//!
//! # Pipeline
//!
//! - **Segmentation**: raw rows are cut into fixed-size sessions, and short or
//!   inactive sessions are dropped
//! - **Trimming**: the least active rows of each session are removed
//! - **Features**: time-domain statistics per channel over fixed windows
//! - **Scaling**: standard or min-max, fitted on features or raw channels
//! - **Training**: feed-forward network with optional grid search, plus a
//!   logistic fallback
//! - **Export**: graph checked for structure, operator allow-set and round-trip
//!   output before it is written
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Myo Gesture Trainer                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌──────────┐ │
//! │  │ *_RAW.csv  │──▶│ Segmenter  │──▶│  Trimmer   │──▶│ Windower │ │
//! │  └────────────┘   └────────────┘   └────────────┘   └──────────┘ │
//! │                         │                                │       │
//! │                         ▼                                ▼       │
//! │                  ┌────────────┐   ┌────────────┐   ┌──────────┐  │
//! │                  │ emg_clean  │   │   Scaler   │◀──│ Features │  │
//! │                  └────────────┘   └────────────┘   └──────────┘  │
//! │                                         │                        │
//! │                                         ▼                        │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐                │
//! │  │   .onnx    │◀──│  Exporter  │◀──│  Trainer   │                │
//! │  └────────────┘   └────────────┘   └────────────┘                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use myo_gesture_trainer::{config::Config, pipeline::Pipeline, report::RunSummary};
//!
//! let config = Config::load().expect("Failed to load config");
//! let mut summary = RunSummary::new(&config);
//! let pipeline = Pipeline::new(config).expect("Invalid config");
//!
//! // Segment raw logs, then train and export
//! pipeline.run(&mut summary).expect("Run failed");
//! ```

pub mod config;
pub mod core;
pub mod data;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod report;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{FeatureKind, Scaler, ScalingMethod, ScalingTarget, Segmenter, Trimmer, Windower};
pub use data::{LoadError, RawSample};
pub use export::{ExportError, Exporter, GraphRuntime};
pub use model::{LabelMap, Network, TrainError, Trainer};
pub use pipeline::{Pipeline, PipelineError};
pub use report::RunSummary;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
