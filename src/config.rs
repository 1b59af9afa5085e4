//! Configuration for the gesture trainer.

use crate::core::features::{presets, FeatureKind};
use crate::core::scaler::{ScalingMethod, ScalingTarget};
use crate::core::windowing::window_len_samples;
use crate::model::network::MlpParams;
use crate::model::search::ParamGrid;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main configuration for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the `<Label>_RAW.csv` logs
    pub input_dir: PathBuf,

    /// Directory receiving every artifact of a run
    pub output_dir: PathBuf,

    pub segmentation: SegmentationConfig,
    pub trimming: TrimConfig,
    pub windowing: WindowConfig,

    /// Per-channel features, in column order
    pub features: Vec<FeatureKind>,

    pub scaling: ScalingConfig,
    pub training: TrainingConfig,
    pub export: ExportConfig,
    pub files: OutputFiles,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            segmentation: SegmentationConfig::default(),
            trimming: TrimConfig::default(),
            windowing: WindowConfig::default(),
            features: presets::RUNTIME.to_vec(),
            scaling: ScalingConfig::default(),
            training: TrainingConfig::default(),
            export: ExportConfig::default(),
            files: OutputFiles::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("myo-gesture-trainer")
            .join("config.json")
    }

    /// Ensure the output directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Path of an artifact inside the output directory.
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segmentation.samples_per_session == 0 {
            return Err(ConfigError::Invalid(
                "segmentation.samples_per_session must be positive".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.trimming.cut_percentile) {
            return Err(ConfigError::Invalid(format!(
                "trimming.cut_percentile {} outside 0..=100",
                self.trimming.cut_percentile
            )));
        }
        let window_len = self.windowing.window_len();
        if window_len < 2 {
            return Err(ConfigError::Invalid(format!(
                "window length of {window_len} samples is too short"
            )));
        }
        if self.features.is_empty() {
            return Err(ConfigError::Invalid("no feature kinds configured".into()));
        }
        if let ScalingMethod::MinMax { min, max } = self.scaling.method {
            if !(max > min) {
                return Err(ConfigError::Invalid(format!(
                    "scaling range [{min}, {max}] is empty"
                )));
            }
        }
        if !(self.training.test_fraction > 0.0 && self.training.test_fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "training.test_fraction {} outside (0, 1)",
                self.training.test_fraction
            )));
        }
        if self.training.cv_folds < 2 {
            return Err(ConfigError::Invalid("training.cv_folds must be at least 2".into()));
        }
        if self.training.max_epochs == 0 {
            return Err(ConfigError::Invalid("training.max_epochs must be positive".into()));
        }
        if self.training.logistic_c <= 0.0 {
            return Err(ConfigError::Invalid("training.logistic_c must be positive".into()));
        }
        if self.training.grid_search && self.training.grid.is_empty() {
            return Err(ConfigError::Invalid("training.grid has no cells".into()));
        }
        if self.export.allowed_ops.is_empty() {
            return Err(ConfigError::Invalid("export.allowed_ops is empty".into()));
        }
        Ok(())
    }
}

/// Session segmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Nominal rows per session
    pub samples_per_session: usize,
    /// Minimum rows for a chunk to be kept (half the session size when unset)
    pub min_samples: Option<usize>,
    /// Mean activity a session must strictly exceed
    pub min_activity: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            samples_per_session: 1000,
            min_samples: None,
            min_activity: 5.0,
        }
    }
}

impl SegmentationConfig {
    pub fn min_samples(&self) -> usize {
        self.min_samples.unwrap_or(self.samples_per_session / 2)
    }
}

/// Session trimming settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    /// Rows below this activity percentile are dropped
    pub cut_percentile: f64,
    /// Minimum rows before and after trimming (segmentation minimum when unset)
    pub min_rows: Option<usize>,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            cut_percentile: 20.0,
            min_rows: None,
        }
    }
}

impl TrimConfig {
    pub fn min_rows(&self, segmentation: &SegmentationConfig) -> usize {
        self.min_rows.unwrap_or_else(|| segmentation.min_samples())
    }
}

/// Window length settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window duration in milliseconds
    pub window_ms: f64,
    /// Assumed sampling rate of the armband
    pub sample_rate_hz: f64,
    /// Explicit window length, overriding the duration
    pub window_samples: Option<usize>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_ms: 250.0,
            sample_rate_hz: 70.0,
            window_samples: None,
        }
    }
}

impl WindowConfig {
    /// Window length in samples.
    pub fn window_len(&self) -> usize {
        self.window_samples
            .unwrap_or_else(|| window_len_samples(self.window_ms, self.sample_rate_hz))
    }
}

/// Scaler settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub method: ScalingMethod,
    pub target: ScalingTarget,
}

/// Classifier training settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Share of samples held out for testing
    pub test_fraction: f64,
    /// Seed for the split, shuffling and weight initialisation
    pub seed: u64,
    /// Run the cross-validated grid search
    pub grid_search: bool,
    pub cv_folds: usize,
    pub grid: ParamGrid,
    /// Network settings used when the grid search is off
    pub default_params: MlpParams,
    pub max_epochs: usize,
    /// Minimum loss improvement that resets early stopping
    pub tol: f64,
    pub n_iter_no_change: usize,
    /// Inverse regularisation strength of the linear fallback
    pub logistic_c: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            grid_search: true,
            cv_folds: 5,
            grid: ParamGrid::default(),
            default_params: MlpParams::default(),
            max_epochs: 300,
            tol: 1e-4,
            n_iter_no_change: 10,
            logistic_c: 1.0,
        }
    }
}

/// Graph export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Operator types the downstream runtime supports
    pub allowed_ops: Vec<String>,
    pub opset_version: i64,
    pub input_name: String,
    pub output_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            allowed_ops: ["MatMul", "Add", "Relu", "Tanh", "Sigmoid", "Softmax", "Identity"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            opset_version: 13,
            input_name: "input".to_string(),
            output_name: "output".to_string(),
        }
    }
}

/// Artifact file names inside the output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFiles {
    pub clean: String,
    pub features_raw: String,
    pub features_scaled: String,
    pub scaler: String,
    pub label_map: String,
    pub model: String,
    pub summary: String,
}

impl Default for OutputFiles {
    fn default() -> Self {
        Self {
            clean: "emg_clean.csv".to_string(),
            features_raw: "emg_features_raw.csv".to_string(),
            features_scaled: "emg_features_scaled.csv".to_string(),
            scaler: "scaler_params.json".to_string(),
            label_map: "label_map.json".to_string(),
            model: "emg_classifier.onnx".to_string(),
            summary: "training_summary.txt".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
