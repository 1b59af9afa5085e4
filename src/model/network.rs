//! Dense feed-forward classifier trained with Adam.
//!
//! Hidden layers share one activation; the output layer is always softmax and
//! the loss is cross-entropy with an L2 penalty on the weights. Training is
//! fully determined by the seed: weight initialisation and mini-batch order
//! both draw from the same `StdRng`.

use crate::model::TrainError;
use ndarray::{Array, Array1, Array2, ArrayView1, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
const PROB_FLOOR: f64 = 1e-10;

/// Hidden layer activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    Tanh,
    Logistic,
}

impl Activation {
    fn apply(&self, z: &mut Array2<f64>) {
        match self {
            Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Activation::Tanh => z.mapv_inplace(f64::tanh),
            Activation::Logistic => z.mapv_inplace(logistic),
        }
    }

    /// Derivative expressed through the activation's output.
    fn derivative(&self, a: f64) -> f64 {
        match self {
            Activation::Relu => {
                if a > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - a * a,
            Activation::Logistic => a * (1.0 - a),
        }
    }

    /// Name of the equivalent graph operator.
    pub fn op_type(&self) -> &'static str {
        match self {
            Activation::Relu => "Relu",
            Activation::Tanh => "Tanh",
            Activation::Logistic => "Sigmoid",
        }
    }

    /// Glorot scaling factor for weights feeding this activation.
    fn init_factor(&self) -> f64 {
        match self {
            Activation::Logistic => 2.0,
            _ => 6.0,
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Relu => "relu",
            Activation::Tanh => "tanh",
            Activation::Logistic => "logistic",
        };
        f.write_str(name)
    }
}

pub(crate) fn logistic(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Network hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpParams {
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    /// L2 penalty strength
    pub alpha: f64,
    pub learning_rate: f64,
    pub batch_size: usize,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64],
            activation: Activation::Relu,
            alpha: 1e-4,
            learning_rate: 1e-3,
            batch_size: 32,
        }
    }
}

impl fmt::Display for MlpParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hidden: Vec<String> = self.hidden_layers.iter().map(|h| h.to_string()).collect();
        write!(
            f,
            "hidden=({}) activation={} alpha={} learning_rate={} batch_size={}",
            hidden.join(", "),
            self.activation,
            self.alpha,
            self.learning_rate,
            self.batch_size
        )
    }
}

/// Stopping and seeding options shared by every fit of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOptions {
    pub max_epochs: usize,
    pub tol: f64,
    pub n_iter_no_change: usize,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            max_epochs: 300,
            tol: 1e-4,
            n_iter_no_change: 10,
            seed: 42,
        }
    }
}

/// Outcome of a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub epochs: usize,
    pub final_loss: f64,
    /// Stopped early because the loss stopped improving
    pub converged: bool,
}

/// One fully connected layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    /// Shape (inputs, outputs)
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl DenseLayer {
    pub fn n_inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_outputs(&self) -> usize {
        self.weights.ncols()
    }
}

/// A trained classifier. Immutable once returned by `fit`.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    pub layers: Vec<DenseLayer>,
    /// Activation after every layer but the last
    pub activation: Activation,
}

impl Network {
    /// Glorot-uniform initialised network.
    pub fn new(
        n_inputs: usize,
        hidden_layers: &[usize],
        n_outputs: usize,
        activation: Activation,
        rng: &mut StdRng,
    ) -> Self {
        let mut sizes = Vec::with_capacity(hidden_layers.len() + 2);
        sizes.push(n_inputs);
        sizes.extend_from_slice(hidden_layers);
        sizes.push(n_outputs);

        let layers = sizes
            .windows(2)
            .map(|pair| {
                let (fan_in, fan_out) = (pair[0], pair[1]);
                let bound = (activation.init_factor() / (fan_in + fan_out) as f64).sqrt();
                DenseLayer {
                    weights: Array2::from_shape_simple_fn((fan_in, fan_out), || {
                        rng.gen_range(-bound..bound)
                    }),
                    bias: Array1::from_shape_simple_fn(fan_out, || rng.gen_range(-bound..bound)),
                }
            })
            .collect();

        Self { layers, activation }
    }

    pub fn n_inputs(&self) -> usize {
        self.layers.first().map(|l| l.n_inputs()).unwrap_or(0)
    }

    pub fn n_outputs(&self) -> usize {
        self.layers.last().map(|l| l.n_outputs()).unwrap_or(0)
    }

    /// Sizes of the hidden layers.
    pub fn hidden_sizes(&self) -> Vec<usize> {
        let n = self.layers.len().saturating_sub(1);
        self.layers[..n].iter().map(|l| l.n_outputs()).collect()
    }

    /// Layer sizes from input to output, e.g. `48-64-3`.
    pub fn architecture(&self) -> String {
        let mut sizes = vec![self.n_inputs()];
        sizes.extend(self.layers.iter().map(|l| l.n_outputs()));
        sizes
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Outputs of every layer, starting with the input itself.
    fn forward_all(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(x.clone());

        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            let mut z = activations[i].dot(&layer.weights) + &layer.bias;
            if i == last {
                softmax_rows(&mut z);
            } else {
                self.activation.apply(&mut z);
            }
            activations.push(z);
        }
        activations
    }

    /// Class probabilities, one row per sample.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        if self.layers.is_empty() {
            return Array2::zeros((x.nrows(), 0));
        }
        self.forward_all(x).pop().unwrap_or_else(|| Array2::zeros((0, 0)))
    }

    /// Most probable class per sample.
    pub fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        self.predict_proba(x)
            .axis_iter(Axis(0))
            .map(argmax)
            .collect()
    }

    /// Train a network on `x` (samples × features) and class indices `y`.
    pub fn fit(
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        params: &MlpParams,
        options: &TrainOptions,
    ) -> Result<(Network, FitReport), TrainError> {
        check_training_data(x, y, n_classes)?;
        if params.learning_rate <= 0.0 || params.alpha < 0.0 {
            return Err(TrainError::InvalidParams(params.to_string()));
        }
        if params.hidden_layers.iter().any(|&h| h == 0) {
            return Err(TrainError::InvalidParams(params.to_string()));
        }

        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut network = Network::new(
            x.ncols(),
            &params.hidden_layers,
            n_classes,
            params.activation,
            &mut rng,
        );

        let n = x.nrows();
        let batch_size = params.batch_size.clamp(1, n);
        let targets = one_hot(y, n_classes);
        let mut adam = Adam::new(&network, params.learning_rate);
        let mut order: Vec<usize> = (0..n).collect();

        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;
        let mut report = FitReport {
            epochs: 0,
            final_loss: f64::INFINITY,
            converged: false,
        };

        for epoch in 0..options.max_epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb = targets.select(Axis(0), batch);
                let (loss, grads) = network.gradients(&xb, &yb, params.alpha);
                adam.step(&mut network, &grads);
                epoch_loss += loss * batch.len() as f64;
            }
            epoch_loss /= n as f64;

            if !epoch_loss.is_finite() {
                return Err(TrainError::Diverged { epoch });
            }
            report.epochs = epoch + 1;
            report.final_loss = epoch_loss;

            if epoch_loss > best_loss - options.tol {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            if epoch_loss < best_loss {
                best_loss = epoch_loss;
            }
            if no_improvement > options.n_iter_no_change {
                report.converged = true;
                break;
            }
        }

        debug!(
            "{} ({}): {} epochs, loss {:.5}",
            network.architecture(),
            params,
            report.epochs,
            report.final_loss
        );
        Ok((network, report))
    }

    /// Penalised batch loss and per-layer gradients.
    fn gradients(
        &self,
        x: &Array2<f64>,
        targets: &Array2<f64>,
        alpha: f64,
    ) -> (f64, Vec<(Array2<f64>, Array1<f64>)>) {
        let n = x.nrows() as f64;
        let activations = self.forward_all(x);
        let probs = &activations[self.layers.len()];

        let data_loss = -probs
            .iter()
            .zip(targets.iter())
            .map(|(&p, &t)| t * p.max(PROB_FLOOR).ln())
            .sum::<f64>()
            / n;
        let penalty: f64 = self
            .layers
            .iter()
            .map(|l| l.weights.iter().map(|w| w * w).sum::<f64>())
            .sum::<f64>()
            * 0.5
            * alpha
            / n;

        let mut delta = (probs - targets) / n;
        let mut grads = Vec::with_capacity(self.layers.len());

        for l in (0..self.layers.len()).rev() {
            let layer = &self.layers[l];
            let grad_w = activations[l].t().dot(&delta) + &layer.weights * (alpha / n);
            let grad_b = delta.sum_axis(Axis(0));

            if l > 0 {
                let mut upstream = delta.dot(&layer.weights.t());
                Zip::from(&mut upstream)
                    .and(&activations[l])
                    .for_each(|d, &a| *d *= self.activation.derivative(a));
                delta = upstream;
            }
            grads.push((grad_w, grad_b));
        }
        grads.reverse();

        (data_loss + penalty, grads)
    }
}

/// Adam optimiser state.
struct Adam {
    learning_rate: f64,
    t: i32,
    m: Vec<(Array2<f64>, Array1<f64>)>,
    v: Vec<(Array2<f64>, Array1<f64>)>,
}

impl Adam {
    fn new(network: &Network, learning_rate: f64) -> Self {
        let zeros: Vec<(Array2<f64>, Array1<f64>)> = network
            .layers
            .iter()
            .map(|l| {
                (
                    Array2::zeros(l.weights.raw_dim()),
                    Array1::zeros(l.bias.raw_dim()),
                )
            })
            .collect();
        Self {
            learning_rate,
            t: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    fn step(&mut self, network: &mut Network, grads: &[(Array2<f64>, Array1<f64>)]) {
        self.t += 1;
        let lr_t = self.learning_rate * (1.0 - ADAM_BETA2.powi(self.t)).sqrt()
            / (1.0 - ADAM_BETA1.powi(self.t));

        for (i, layer) in network.layers.iter_mut().enumerate() {
            let (gw, gb) = &grads[i];
            let (mw, mb) = &mut self.m[i];
            let (vw, vb) = &mut self.v[i];
            adam_update(&mut layer.weights, mw, vw, gw, lr_t);
            adam_update(&mut layer.bias, mb, vb, gb, lr_t);
        }
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    lr_t: f64,
) {
    Zip::from(param)
        .and(m)
        .and(v)
        .and(grad)
        .for_each(|p, m, v, &g| {
            *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
            *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + ADAM_EPSILON);
        });
}

/// Row-wise softmax, shifted by the row maximum.
pub(crate) fn softmax_rows(z: &mut Array2<f64>) {
    for mut row in z.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(row: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

fn one_hot(y: &[usize], n_classes: usize) -> Array2<f64> {
    let mut out = Array2::zeros((y.len(), n_classes));
    for (row, &class) in y.iter().enumerate() {
        out[[row, class]] = 1.0;
    }
    out
}

pub(crate) fn check_training_data(
    x: &Array2<f64>,
    y: &[usize],
    n_classes: usize,
) -> Result<(), TrainError> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(TrainError::EmptyDataset);
    }
    if x.nrows() != y.len() {
        return Err(TrainError::ShapeMismatch {
            samples: x.nrows(),
            labels: y.len(),
        });
    }
    if n_classes < 2 {
        return Err(TrainError::TooFewClasses(n_classes));
    }
    if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
        return Err(TrainError::UnknownLabel(format!("class index {bad}")));
    }
    Ok(())
}
