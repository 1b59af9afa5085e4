//! Stage orchestration.
//!
//! `prepare` turns raw logs into `emg_clean.csv`; `train` picks the clean file
//! up and runs trimming, feature extraction, scaling, training and export;
//! `predict` replays the exported artifacts on a feature file.

use crate::config::{Config, ConfigError};
use crate::core::features::{
    extract_features, read_feature_csv, write_feature_csv, FeatureDataset, FeatureError,
};
use crate::core::scaler::{Scaler, ScalerError, ScalingTarget};
use crate::core::segmentation::{Segmenter, Session};
use crate::core::trimming::Trimmer;
use crate::core::windowing::Windower;
use crate::data::clean::{into_sessions, read_clean, write_clean};
use crate::data::loader::{load_raw_dir, LoadError};
use crate::export::graph::metadata_feature_names;
use crate::export::runtime::GraphRuntime;
use crate::export::{ExportError, ExportOutcome, Exporter};
use crate::model::labels::LabelMap;
use crate::model::network::argmax;
use crate::model::trainer::{Trainer, TrainingOutcome};
use crate::model::TrainError;
use crate::report::RunSummary;
use ndarray::ArrayView1;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Column prefix of features computed from scaled channels, so they cannot
/// be confused with `emg_features_raw.csv`.
pub const SCALED_CHANNEL_PREFIX: &str = "scaled_";

/// Errors from any stage of a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Scaler(#[from] ScalerError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No session survived {0}")]
    NoSessions(&'static str),

    #[error("No feature vector could be extracted")]
    NoFeatures,

    #[error("Feature columns do not match the model: {0}")]
    FeatureColumns(String),
}

/// Feature matrices of one run and the scaler that links them.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub raw: FeatureDataset,
    pub scaled: FeatureDataset,
    pub scaler: Scaler,
}

/// Result of running the whole training stage.
#[derive(Debug, Clone)]
pub struct TrainRun {
    pub training: TrainingOutcome,
    pub export: ExportOutcome,
}

/// One prediction from the exported model.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Label recorded in the feature file
    pub label: String,
    pub predicted: String,
    pub confidence: f32,
}

/// Runs stages against one configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn path(&self, file_name: &str) -> std::path::PathBuf {
        self.config.output_path(file_name)
    }

    /// Segment the raw logs and write `emg_clean.csv`.
    pub fn prepare(&self, summary: &mut RunSummary) -> Result<Vec<Session>, PipelineError> {
        self.config.ensure_directories()?;
        info!("Loading raw logs from {}", self.config.input_dir.display());

        let rows = load_raw_dir(&self.config.input_dir)?;
        let (sessions, report) = Segmenter::new(&self.config.segmentation).segment(&rows);
        summary.segmentation = Some(report);

        if sessions.is_empty() {
            return Err(PipelineError::NoSessions("segmentation"));
        }

        let path = self.path(&self.config.files.clean);
        let written = write_clean(&path, &sessions)?;
        info!(
            "Wrote {} rows in {} sessions to {}",
            written,
            sessions.len(),
            path.display()
        );
        Ok(sessions)
    }

    /// Read the sessions written by `prepare`.
    pub fn load_sessions(&self) -> Result<Vec<Session>, PipelineError> {
        let path = self.path(&self.config.files.clean);
        let sessions = into_sessions(read_clean(&path)?);
        info!("Read {} sessions from {}", sessions.len(), path.display());
        Ok(sessions)
    }

    /// Trim sessions, extract features and fit the scaler.
    pub fn extract(
        &self,
        sessions: &[Session],
        summary: &mut RunSummary,
    ) -> Result<Extraction, PipelineError> {
        let trimmer = Trimmer::new(
            self.config.trimming.cut_percentile,
            self.config.trimming.min_rows(&self.config.segmentation),
        );
        let (trimmed, trim_report) = trimmer.trim_all(sessions);
        summary.trimming = Some(trim_report);
        if trimmed.is_empty() {
            return Err(PipelineError::NoSessions("trimming"));
        }

        let windower = Windower::from_config(&self.config.windowing);
        let kinds = &self.config.features;
        let method = self.config.scaling.method;

        let (raw, scaled, scaler, window_report) = match self.config.scaling.target {
            ScalingTarget::Features => {
                let (raw, report) = extract_features(&trimmed, &windower, kinds)?;
                if raw.is_empty() {
                    return Err(PipelineError::NoFeatures);
                }
                let scaler = Scaler::fit_features(method, &raw)?;
                let scaled = scaler.transform_dataset(&raw)?;
                (raw, scaled, scaler, report)
            }
            ScalingTarget::RawChannels => {
                let (raw, _) = extract_features(&trimmed, &windower, kinds)?;
                let scaler = Scaler::fit_channels(method, &trimmed)?;
                let scaled_sessions = scaler.transform_sessions(&trimmed)?;
                let (scaled, report) = extract_features(&scaled_sessions, &windower, kinds)?;
                if scaled.is_empty() {
                    return Err(PipelineError::NoFeatures);
                }
                let scaled = scaled.with_prefix(SCALED_CHANNEL_PREFIX);
                (raw, scaled, scaler, report)
            }
        };

        let empty = window_report.empty_labels();
        if !empty.is_empty() {
            warn!("Labels without any usable window: {}", empty.join(", "));
        }
        summary.windows = Some(window_report);
        summary.features = Some((scaled.len(), scaled.width()));

        write_feature_csv(&self.path(&self.config.files.features_raw), &raw)?;
        write_feature_csv(&self.path(&self.config.files.features_scaled), &scaled)?;
        scaler.save(&self.path(&self.config.files.scaler))?;
        info!(
            "Extracted {} vectors of {} features; scaler fitted on {:?}",
            scaled.len(),
            scaled.width(),
            scaler.target
        );

        Ok(Extraction {
            raw,
            scaled,
            scaler,
        })
    }

    /// Feature extraction from the clean file, without training.
    pub fn features(&self, summary: &mut RunSummary) -> Result<Extraction, PipelineError> {
        self.config.ensure_directories()?;
        let sessions = self.load_sessions()?;
        if sessions.is_empty() {
            return Err(PipelineError::NoSessions("loading"));
        }
        self.extract(&sessions, summary)
    }

    /// Trim, extract, train, export, and write the summary.
    pub fn train(&self, summary: &mut RunSummary) -> Result<TrainRun, PipelineError> {
        let extraction = self.features(summary)?;

        let training = Trainer::new(&self.config.training).train(&extraction.scaled)?;
        training
            .labels
            .save(&self.path(&self.config.files.label_map))?;
        summary.training = Some(training.clone());

        let probe = training.test.x.row(0).to_vec();
        let export = Exporter::new(&self.config.export)
            .with_feature_names(extraction.scaled.feature_names.clone())
            .export(
            &training.primary,
            &training.fallback,
            &training.labels,
            &probe,
            &self.path(&self.config.files.model),
        )?;
        summary.export = Some(export.clone());

        let summary_path = self.path(&self.config.files.summary);
        summary.save(&summary_path)?;
        info!("Summary written to {}", summary_path.display());

        Ok(TrainRun { training, export })
    }

    /// `prepare` followed by `train`.
    pub fn run(&self, summary: &mut RunSummary) -> Result<TrainRun, PipelineError> {
        self.prepare(summary)?;
        self.train(summary)
    }

    /// Classify every vector of a feature file with the exported model.
    ///
    /// The file's columns must equal the ones recorded in the model. With a
    /// feature-fitted scaler that is `emg_features_raw.csv`, scaled here with
    /// the saved parameters; with a channel-fitted scaler only
    /// `emg_features_scaled.csv` matches, and its values pass through.
    pub fn predict(&self, features_path: &Path) -> Result<Vec<Prediction>, PipelineError> {
        let scaler = Scaler::load(&self.path(&self.config.files.scaler))?;
        let labels = LabelMap::load(&self.path(&self.config.files.label_map))?;
        let bytes = std::fs::read(self.path(&self.config.files.model))?;
        let runtime = GraphRuntime::from_bytes(&bytes)?;

        let expected = metadata_feature_names(runtime.model()).ok_or_else(|| {
            PipelineError::FeatureColumns("the model records no feature columns".to_string())
        })?;

        let dataset = read_feature_csv(features_path)?;
        if dataset.feature_names != expected {
            return Err(PipelineError::FeatureColumns(format!(
                "{} has {} columns starting {:?}, the model expects {} starting {:?}",
                features_path.display(),
                dataset.width(),
                dataset.feature_names.first(),
                expected.len(),
                expected.first()
            )));
        }

        let dataset = match scaler.target {
            ScalingTarget::Features => {
                if dataset.feature_names != scaler.feature_names {
                    return Err(PipelineError::FeatureColumns(format!(
                        "{} columns in {}, scaler has {}",
                        dataset.width(),
                        features_path.display(),
                        scaler.width()
                    )));
                }
                scaler.transform_dataset(&dataset)?
            }
            ScalingTarget::RawChannels => dataset,
        };

        let mut predictions = Vec::with_capacity(dataset.len());
        for vector in dataset.vectors() {
            let input: Vec<f32> = vector.values.iter().map(|&v| v as f32).collect();
            let probabilities = runtime.run(&input)?;
            let widened: Vec<f64> = probabilities.iter().map(|&p| p as f64).collect();
            let class = argmax(ArrayView1::from(widened.as_slice()));
            let predicted = labels
                .label_of(class)
                .ok_or_else(|| TrainError::UnknownLabel(format!("class index {class}")))?;
            predictions.push(Prediction {
                label: vector.label.clone(),
                predicted: predicted.to_string(),
                confidence: probabilities.get(class).copied().unwrap_or(0.0),
            });
        }

        let correct = predictions
            .iter()
            .filter(|p| p.label == p.predicted)
            .count();
        info!(
            "Predicted {} vectors, {} match their recorded label",
            predictions.len(),
            correct
        );
        Ok(predictions)
    }
}
