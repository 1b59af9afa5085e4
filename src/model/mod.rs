//! Classifier training.
//!
//! This module contains:
//! - The label map sidecar
//! - A dense feed-forward network trained with Adam
//! - The multinomial logistic fallback
//! - Split, fold, and metric helpers
//! - The cross-validated grid search
//! - `Trainer`, which runs the whole stage

pub mod labels;
pub mod linear;
pub mod metrics;
pub mod network;
pub mod search;
pub mod split;
pub mod trainer;

use thiserror::Error;

// Re-export commonly used types
pub use labels::LabelMap;
pub use linear::LogisticRegression;
pub use metrics::{ClassMetrics, ClassificationReport};
pub use network::{Activation, DenseLayer, FitReport, MlpParams, Network, TrainOptions};
pub use search::{CellScore, GridSearch, ParamGrid, SearchResult};
pub use split::{stratified_k_fold, train_test_split, Split};
pub use trainer::{TrainedModel, Trainer, TrainingOutcome};

/// Training errors.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("No samples to train on")]
    EmptyDataset,

    #[error("{samples} samples but {labels} labels")]
    ShapeMismatch { samples: usize, labels: usize },

    #[error("At least two classes are needed, found {0}")]
    TooFewClasses(usize),

    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    #[error("Invalid label map: {0}")]
    InvalidLabelMap(String),

    #[error("Invalid hyperparameters: {0}")]
    InvalidParams(String),

    #[error("Cannot split {samples} samples with test fraction {test_fraction}")]
    SplitTooSmall { samples: usize, test_fraction: f64 },

    #[error("Training diverged at epoch {epoch}")]
    Diverged { epoch: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
