//! The training stage: split, search, fit the network and its fallback,
//! then score both on each split.

use crate::config::TrainingConfig;
use crate::core::features::FeatureDataset;
use crate::model::labels::LabelMap;
use crate::model::linear::LogisticRegression;
use crate::model::metrics::ClassificationReport;
use crate::model::network::{FitReport, MlpParams, Network, TrainOptions};
use crate::model::search::{GridSearch, SearchResult};
use crate::model::split::{train_test_split, Split};
use crate::model::TrainError;
use ndarray::Array2;
use tracing::info;

/// A fitted classifier with its scores.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    /// Short model name used in logs and the summary
    pub name: &'static str,
    pub network: Network,
    /// Network hyperparameters, `None` for the logistic fallback
    pub params: Option<MlpParams>,
    pub fit: FitReport,
    pub train_report: ClassificationReport,
    pub test_report: ClassificationReport,
}

/// Everything the training stage produces.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub labels: LabelMap,
    pub primary: TrainedModel,
    pub fallback: TrainedModel,
    pub search: Option<SearchResult>,
    pub train: Split,
    pub test: Split,
}

/// Stack a feature dataset into a (samples × features) matrix.
pub fn dataset_matrix(dataset: &FeatureDataset) -> Result<Array2<f64>, TrainError> {
    let flat: Vec<f64> = dataset
        .vectors()
        .iter()
        .flat_map(|v| v.values.iter().copied())
        .collect();
    Array2::from_shape_vec((dataset.len(), dataset.width()), flat).map_err(|_| {
        TrainError::ShapeMismatch {
            samples: dataset.len(),
            labels: dataset.len(),
        }
    })
}

/// Runs the training stage with one configuration.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: &TrainingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn options(&self) -> TrainOptions {
        TrainOptions {
            max_epochs: self.config.max_epochs,
            tol: self.config.tol,
            n_iter_no_change: self.config.n_iter_no_change,
            seed: self.config.seed,
        }
    }

    /// Train both classifiers on a scaled feature dataset.
    pub fn train(&self, dataset: &FeatureDataset) -> Result<TrainingOutcome, TrainError> {
        if dataset.is_empty() {
            return Err(TrainError::EmptyDataset);
        }

        let labels = LabelMap::from_labels(dataset.labels());
        if labels.len() < 2 {
            return Err(TrainError::TooFewClasses(labels.len()));
        }
        let x = dataset_matrix(dataset)?;
        let y = labels.encode(&dataset.labels())?;

        let (train, test) =
            train_test_split(&x, &y, self.config.test_fraction, self.config.seed)?;
        info!(
            "Training on {} samples, testing on {} ({} classes, {} features)",
            train.len(),
            test.len(),
            labels.len(),
            x.ncols()
        );

        let options = self.options();
        let (params, search) = if self.config.grid_search {
            let search = GridSearch::new(
                self.config.grid.clone(),
                self.config.cv_folds,
                options.clone(),
            );
            let result = search.run(&train.x, &train.y, &labels)?;
            (result.best.params.clone(), Some(result))
        } else {
            (self.config.default_params.clone(), None)
        };

        let (network, fit) = Network::fit(&train.x, &train.y, labels.len(), &params, &options)?;
        let primary = score("mlp", network, Some(params), fit, &train, &test, &labels);

        let logistic = LogisticRegression::new(self.config.logistic_c);
        let (network, fit) = logistic.fit(&train.x, &train.y, labels.len(), &options)?;
        let fallback = score("logistic", network, None, fit, &train, &test, &labels);

        for model in [&primary, &fallback] {
            info!(
                "{} {}: train F1 {:.4}, test F1 {:.4}",
                model.name,
                model.network.architecture(),
                model.train_report.weighted_f1,
                model.test_report.weighted_f1
            );
        }

        Ok(TrainingOutcome {
            labels,
            primary,
            fallback,
            search,
            train,
            test,
        })
    }
}

fn score(
    name: &'static str,
    network: Network,
    params: Option<MlpParams>,
    fit: FitReport,
    train: &Split,
    test: &Split,
    labels: &LabelMap,
) -> TrainedModel {
    let train_report = ClassificationReport::new(&train.y, &network.predict(&train.x), labels);
    let test_report = ClassificationReport::new(&test.y, &network.predict(&test.x), labels);
    TrainedModel {
        name,
        network,
        params,
        fit,
        train_report,
        test_report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::FeatureVector;
    use crate::model::network::Activation;
    use crate::model::search::ParamGrid;

    fn dataset() -> FeatureDataset {
        let mut dataset = FeatureDataset::new(vec!["f0".into(), "f1".into()]);
        for i in 0..60 {
            let (label, centre) = match i % 3 {
                0 => ("Fist", [3.0, 0.0]),
                1 => ("Pinch", [0.0, 3.0]),
                _ => ("Rest", [-3.0, -3.0]),
            };
            let jitter = (i as f64 * 0.37).sin() * 0.3;
            dataset
                .push(FeatureVector {
                    label: label.to_string(),
                    values: vec![centre[0] + jitter, centre[1] - jitter],
                })
                .unwrap();
        }
        dataset
    }

    fn fast_config(grid_search: bool) -> TrainingConfig {
        TrainingConfig {
            grid_search,
            cv_folds: 3,
            grid: ParamGrid {
                hidden_layers: vec![vec![8]],
                activation: vec![Activation::Relu, Activation::Tanh],
                alpha: vec![1e-4],
                learning_rate: vec![1e-2],
                batch_size: vec![16],
            },
            default_params: MlpParams {
                hidden_layers: vec![8],
                learning_rate: 1e-2,
                ..Default::default()
            },
            max_epochs: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_dataset_matrix_shape() {
        let x = dataset_matrix(&dataset()).unwrap();
        assert_eq!(x.dim(), (60, 2));
    }

    #[test]
    fn test_train_without_search() {
        let outcome = Trainer::new(&fast_config(false)).train(&dataset()).unwrap();
        assert_eq!(outcome.labels.classes(), &["Fist", "Pinch", "Rest"]);
        assert_eq!(outcome.test.len(), 12);
        assert_eq!(outcome.train.len(), 48);
        assert!(outcome.search.is_none());
        assert_eq!(outcome.primary.network.architecture(), "2-8-3");
        assert_eq!(outcome.fallback.network.architecture(), "2-3");
        assert!(outcome.primary.test_report.weighted_f1 > 0.9);
        assert!(outcome.fallback.test_report.weighted_f1 > 0.9);
    }

    #[test]
    fn test_train_with_search() {
        let outcome = Trainer::new(&fast_config(true)).train(&dataset()).unwrap();
        let search = outcome.search.as_ref().unwrap();
        assert_eq!(search.cells.len(), 2);
        assert_eq!(outcome.primary.params.as_ref(), Some(&search.best.params));
    }

    #[test]
    fn test_single_class_rejected() {
        let mut dataset = FeatureDataset::new(vec!["f0".into()]);
        for i in 0..10 {
            dataset
                .push(FeatureVector {
                    label: "Fist".into(),
                    values: vec![i as f64],
                })
                .unwrap();
        }
        assert!(matches!(
            Trainer::new(&fast_config(false)).train(&dataset),
            Err(TrainError::TooFewClasses(1))
        ));
    }
}
