//! Validation sequence and fallback policy for the exported model.
//!
//! A candidate graph is written only after it passes, in order: the structural
//! check, the allow-set check, and a round trip through serialization and the
//! reference evaluator on a held-out sample. The network graph is tried first;
//! if it fails, the logistic graph goes through the same sequence.

use crate::config::ExportConfig;
use crate::export::graph::{
    build_model, check_structure, metadata_classes, metadata_feature_names, op_types,
    set_feature_names, AllowSet,
};
use crate::export::runtime::GraphRuntime;
use crate::export::ExportError;
use crate::model::labels::LabelMap;
use crate::model::network::{argmax, Network};
use crate::model::trainer::TrainedModel;
use ndarray::{Array1, Array2};
use prost::Message;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Largest difference allowed between evaluator and network probabilities.
const ROUND_TRIP_TOLERANCE: f64 = 1e-3;

/// A graph that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedGraph {
    pub bytes: Vec<u8>,
    pub op_types: Vec<String>,
    /// Evaluator output for the probe sample
    pub probabilities: Vec<f32>,
    pub predicted: String,
}

/// What was written, and what was rejected on the way.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub model_name: &'static str,
    pub architecture: String,
    pub path: PathBuf,
    pub graph: ValidatedGraph,
    /// Candidates that failed validation, with the reason
    pub rejected: Vec<(&'static str, String)>,
}

impl ExportOutcome {
    pub fn used_fallback(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// Builds, validates and writes classifier graphs.
#[derive(Debug, Clone)]
pub struct Exporter {
    config: ExportConfig,
    allow: AllowSet,
    feature_names: Option<Vec<String>>,
}

impl Exporter {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            config: config.clone(),
            allow: AllowSet::from_config(config),
            feature_names: None,
        }
    }

    /// Record the input columns in every graph this exporter builds.
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    /// Run the full validation sequence on one network.
    pub fn validate(
        &self,
        network: &Network,
        labels: &LabelMap,
        probe: &[f64],
    ) -> Result<ValidatedGraph, ExportError> {
        let mut model = build_model(network, labels, &self.config);
        if let Some(names) = &self.feature_names {
            if names.len() != network.n_inputs() {
                return Err(ExportError::ShapeMismatch {
                    name: "feature names".to_string(),
                    expected: vec![network.n_inputs() as i64],
                    actual: vec![names.len() as i64],
                });
            }
            set_feature_names(&mut model, names);
        }

        check_structure(&model, network.n_inputs(), labels.len())?;
        self.allow.check(&model)?;

        let bytes = model.encode_to_vec();
        let runtime = GraphRuntime::from_bytes(&bytes)?;

        let recorded = metadata_classes(runtime.model()).unwrap_or_default();
        if recorded.as_slice() != labels.classes() {
            return Err(ExportError::InvalidOutput(format!(
                "metadata classes {recorded:?} differ from the label map"
            )));
        }

        if self.feature_names.is_some()
            && metadata_feature_names(runtime.model()) != self.feature_names
        {
            return Err(ExportError::InvalidOutput(
                "metadata feature names differ from the training columns".to_string(),
            ));
        }

        let input: Vec<f32> = probe.iter().map(|&v| v as f32).collect();
        let probabilities = runtime.run(&input)?;
        if probabilities.len() != labels.len() {
            return Err(ExportError::InvalidOutput(format!(
                "{} outputs for {} classes",
                probabilities.len(),
                labels.len()
            )));
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(ExportError::InvalidOutput(format!(
                "non-finite probabilities {probabilities:?}"
            )));
        }

        let x = Array2::from_shape_vec((1, probe.len()), probe.to_vec())
            .map_err(|e| ExportError::Evaluation(e.to_string()))?;
        let expected = network.predict_proba(&x);
        let drift = probabilities
            .iter()
            .zip(expected.iter())
            .map(|(&p, &e)| (p as f64 - e).abs())
            .fold(0.0, f64::max);
        if drift > ROUND_TRIP_TOLERANCE {
            return Err(ExportError::InvalidOutput(format!(
                "graph output differs from the trained model by {drift:.2e}"
            )));
        }

        let class = argmax(Array1::from_iter(probabilities.iter().map(|&p| p as f64)).view());
        let predicted = labels
            .label_of(class)
            .ok_or_else(|| ExportError::InvalidOutput(format!("class {class} has no label")))?
            .to_string();

        Ok(ValidatedGraph {
            bytes,
            op_types: op_types(&model),
            probabilities,
            predicted,
        })
    }

    /// Validate the primary model, falling back to the linear model, and write
    /// the first graph that passes.
    pub fn export(
        &self,
        primary: &TrainedModel,
        fallback: &TrainedModel,
        labels: &LabelMap,
        probe: &[f64],
        path: &Path,
    ) -> Result<ExportOutcome, ExportError> {
        let mut rejected = Vec::new();

        let (chosen, graph) = match self.validate(&primary.network, labels, probe) {
            Ok(graph) => (primary, graph),
            Err(primary_err) => {
                warn!(
                    "{} graph rejected: {}; trying the {} graph",
                    primary.name, primary_err, fallback.name
                );
                match self.validate(&fallback.network, labels, probe) {
                    Ok(graph) => {
                        rejected.push((primary.name, primary_err.to_string()));
                        (fallback, graph)
                    }
                    Err(fallback_err) => {
                        return Err(ExportError::BothFailed {
                            primary: Box::new(primary_err),
                            fallback: Box::new(fallback_err),
                        })
                    }
                }
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &graph.bytes)?;

        info!(
            "Exported {} graph {} ({} bytes, ops {}) to {}",
            chosen.name,
            chosen.network.architecture(),
            graph.bytes.len(),
            graph.op_types.join(", "),
            path.display()
        );

        Ok(ExportOutcome {
            model_name: chosen.name,
            architecture: chosen.network.architecture(),
            path: path.to_path_buf(),
            graph,
            rejected,
        })
    }
}
