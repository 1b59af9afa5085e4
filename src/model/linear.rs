//! Multinomial logistic regression, used as the export fallback.
//!
//! Trained as a network without hidden layers: full-batch gradient steps on
//! the softmax cross-entropy, with the L2 strength set to `1 / C` so the
//! objective matches the usual `C`-parameterised logistic loss.

use crate::model::network::{FitReport, MlpParams, Network, TrainOptions};
use crate::model::TrainError;
use ndarray::Array2;

const LOGISTIC_LEARNING_RATE: f64 = 0.05;

/// Logistic regression settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    /// Inverse regularisation strength
    pub c: f64,
    pub learning_rate: f64,
}

impl LogisticRegression {
    pub fn new(c: f64) -> Self {
        Self {
            c,
            learning_rate: LOGISTIC_LEARNING_RATE,
        }
    }

    /// Equivalent network parameters for `n_samples` training rows.
    pub fn params(&self, n_samples: usize) -> MlpParams {
        MlpParams {
            hidden_layers: Vec::new(),
            alpha: 1.0 / self.c,
            learning_rate: self.learning_rate,
            batch_size: n_samples.max(1),
            ..Default::default()
        }
    }

    /// Fit on `x` and class indices `y`. The result has a single layer.
    pub fn fit(
        &self,
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        options: &TrainOptions,
    ) -> Result<(Network, FitReport), TrainError> {
        if !(self.c > 0.0) {
            return Err(TrainError::InvalidParams(format!("C = {}", self.c)));
        }
        Network::fit(x, y, n_classes, &self.params(x.nrows()), options)
    }
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn linearly_separable() -> (Array2<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(3);
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for class in 0..2 {
            let offset = if class == 0 { -3.0 } else { 3.0 };
            for _ in 0..40 {
                rows.push(offset + rng.gen_range(-1.0..1.0));
                rows.push(rng.gen_range(-1.0..1.0));
                y.push(class);
            }
        }
        (Array2::from_shape_vec((80, 2), rows).unwrap(), y)
    }

    #[test]
    fn test_logistic_is_single_layer() {
        let (x, y) = linearly_separable();
        let (net, _) = LogisticRegression::default()
            .fit(&x, &y, 2, &TrainOptions::default())
            .unwrap();
        assert_eq!(net.layers.len(), 1);
        assert!(net.hidden_sizes().is_empty());
        assert_eq!(net.architecture(), "2-2");
    }

    #[test]
    fn test_logistic_separates_classes() {
        let (x, y) = linearly_separable();
        let (net, report) = LogisticRegression::default()
            .fit(&x, &y, 2, &TrainOptions::default())
            .unwrap();
        assert!(report.final_loss.is_finite());
        let correct = net
            .predict(&x)
            .iter()
            .zip(&y)
            .filter(|(a, b)| a == b)
            .count();
        assert_eq!(correct, 80);
    }

    #[test]
    fn test_params_map_c_to_alpha() {
        let params = LogisticRegression::new(0.5).params(100);
        assert_eq!(params.alpha, 2.0);
        assert_eq!(params.batch_size, 100);
        assert!(params.hidden_layers.is_empty());
    }

    #[test]
    fn test_rejects_non_positive_c() {
        let (x, y) = linearly_separable();
        let result = LogisticRegression::new(0.0).fit(&x, &y, 2, &TrainOptions::default());
        assert!(matches!(result, Err(TrainError::InvalidParams(_))));
    }
}
