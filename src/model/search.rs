//! Cross-validated hyperparameter grid search.
//!
//! Every cell of the grid is scored by the mean weighted F1 over stratified
//! folds. Cells are independent and evaluated in parallel; the reduction picks
//! the best mean score, and the earliest cell in grid order on ties.

use crate::model::labels::LabelMap;
use crate::model::metrics::weighted_f1;
use crate::model::network::{Activation, MlpParams, Network, TrainOptions};
use crate::model::split::{stratified_k_fold, Split};
use crate::model::TrainError;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Candidate values per hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub hidden_layers: Vec<Vec<usize>>,
    pub activation: Vec<Activation>,
    pub alpha: Vec<f64>,
    pub learning_rate: Vec<f64>,
    pub batch_size: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            hidden_layers: vec![vec![32], vec![64], vec![64, 32]],
            activation: vec![Activation::Relu, Activation::Tanh],
            alpha: vec![1e-4, 1e-3],
            learning_rate: vec![1e-3, 1e-2],
            batch_size: vec![32, 64],
        }
    }
}

impl ParamGrid {
    /// Every combination, hidden layers varying slowest.
    pub fn cells(&self) -> Vec<MlpParams> {
        let mut cells = Vec::with_capacity(self.len());
        for hidden in &self.hidden_layers {
            for &activation in &self.activation {
                for &alpha in &self.alpha {
                    for &learning_rate in &self.learning_rate {
                        for &batch_size in &self.batch_size {
                            cells.push(MlpParams {
                                hidden_layers: hidden.clone(),
                                activation,
                                alpha,
                                learning_rate,
                                batch_size,
                            });
                        }
                    }
                }
            }
        }
        cells
    }

    pub fn len(&self) -> usize {
        self.hidden_layers.len()
            * self.activation.len()
            * self.alpha.len()
            * self.learning_rate.len()
            * self.batch_size.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mean cross-validation score of one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellScore {
    pub params: MlpParams,
    pub mean_f1: f64,
    pub fold_scores: Vec<f64>,
}

/// Outcome of a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub best: CellScore,
    /// Every cell, in grid order
    pub cells: Vec<CellScore>,
    pub folds: usize,
}

/// Grid search over a fixed training split.
#[derive(Debug, Clone)]
pub struct GridSearch {
    grid: ParamGrid,
    folds: usize,
    options: TrainOptions,
}

impl GridSearch {
    pub fn new(grid: ParamGrid, folds: usize, options: TrainOptions) -> Self {
        Self {
            grid,
            folds,
            options,
        }
    }

    /// Score every cell and return the winner.
    pub fn run(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        labels: &LabelMap,
    ) -> Result<SearchResult, TrainError> {
        let cells = self.grid.cells();
        if cells.is_empty() {
            return Err(TrainError::InvalidParams("empty parameter grid".into()));
        }
        let folds = stratified_k_fold(y, self.folds);
        if folds.is_empty() {
            return Err(TrainError::SplitTooSmall {
                samples: y.len(),
                test_fraction: 1.0 / self.folds.max(1) as f64,
            });
        }

        info!(
            "Grid search: {} cells x {} folds on {} samples",
            cells.len(),
            folds.len(),
            y.len()
        );

        let scored: Vec<CellScore> = cells
            .into_par_iter()
            .map(|params| self.score_cell(params, x, y, &folds, labels))
            .collect::<Result<_, _>>()?;

        let best = scored
            .iter()
            .enumerate()
            .fold(None::<(usize, f64)>, |best, (i, cell)| match best {
                Some((_, score)) if cell.mean_f1 <= score => best,
                _ => Some((i, cell.mean_f1)),
            })
            .map(|(i, _)| scored[i].clone())
            .ok_or_else(|| TrainError::InvalidParams("no cell was scored".into()))?;

        info!("Best cell: {} (mean F1 {:.4})", best.params, best.mean_f1);

        Ok(SearchResult {
            best,
            cells: scored,
            folds: folds.len(),
        })
    }

    fn score_cell(
        &self,
        params: MlpParams,
        x: &Array2<f64>,
        y: &[usize],
        folds: &[(Vec<usize>, Vec<usize>)],
        labels: &LabelMap,
    ) -> Result<CellScore, TrainError> {
        let mut fold_scores = Vec::with_capacity(folds.len());
        for (train_rows, validation_rows) in folds {
            let train = Split::select(x, y, train_rows);
            let validation = Split::select(x, y, validation_rows);
            let (network, _) =
                Network::fit(&train.x, &train.y, labels.len(), &params, &self.options)?;
            let predicted = network.predict(&validation.x);
            fold_scores.push(weighted_f1(&validation.y, &predicted, labels));
        }

        let mean_f1 = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
        debug!("{}: mean F1 {:.4}", params, mean_f1);

        Ok(CellScore {
            params,
            mean_f1,
            fold_scores,
        })
    }
}
