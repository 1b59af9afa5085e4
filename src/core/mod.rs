//! Signal processing stages between the raw logs and the classifier.
//!
//! This module contains:
//! - Session segmentation with activity gating
//! - Percentile trimming of sessions
//! - Fixed-size windowing of trimmed rows
//! - Time-domain feature computation per window
//! - Scaler fitting and the scaler sidecar

pub mod features;
pub mod scaler;
pub mod segmentation;
pub mod trimming;
pub mod windowing;

// Re-export commonly used types
pub use features::{
    extract_features, feature_names, presets, FeatureDataset, FeatureError, FeatureKind,
    FeatureVector,
};
pub use scaler::{Scaler, ScalerError, ScalingMethod, ScalingTarget};
pub use segmentation::{Segmenter, SegmentationReport, Session};
pub use trimming::{percentile, TrimReport, Trimmer};
pub use windowing::{window_len_samples, WindowReport, Windower};
