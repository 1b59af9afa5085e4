//! Seeded train/test split and stratified k-fold assignment.

use crate::model::TrainError;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Rows of a matrix with their class indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub x: Array2<f64>,
    pub y: Vec<usize>,
}

impl Split {
    /// Subset by row indices.
    pub fn select(x: &Array2<f64>, y: &[usize], rows: &[usize]) -> Self {
        Self {
            x: x.select(Axis(0), rows),
            y: rows.iter().map(|&i| y[i]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Shuffle rows with `seed` and hold out `ceil(n * test_fraction)` of them.
pub fn train_test_split(
    x: &Array2<f64>,
    y: &[usize],
    test_fraction: f64,
    seed: u64,
) -> Result<(Split, Split), TrainError> {
    let n = y.len();
    if x.nrows() != n {
        return Err(TrainError::ShapeMismatch {
            samples: x.nrows(),
            labels: n,
        });
    }

    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(TrainError::SplitTooSmall {
            samples: n,
            test_fraction,
        });
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let (test, train) = order.split_at(n_test);

    Ok((Split::select(x, y, train), Split::select(x, y, test)))
}

/// Assign each row to one of `k` folds, keeping class proportions.
///
/// Rows of each class are dealt round-robin across folds in row order. `k` is
/// clamped to the number of rows. Returns `(train_rows, validation_rows)` per
/// fold; folds that would have no validation rows are omitted.
pub fn stratified_k_fold(y: &[usize], k: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
    let k = k.min(y.len());
    if k < 2 {
        return Vec::new();
    }

    let n_classes = y.iter().copied().max().map(|m| m + 1).unwrap_or(0);
    let mut seen = vec![0usize; n_classes];
    let mut fold_of = Vec::with_capacity(y.len());
    for &class in y {
        fold_of.push(seen[class] % k);
        seen[class] += 1;
    }

    (0..k)
        .filter_map(|fold| {
            let (validation, train): (Vec<usize>, Vec<usize>) =
                (0..y.len()).partition(|&i| fold_of[i] == fold);
            if validation.is_empty() || train.is_empty() {
                None
            } else {
                Some((train, validation))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize) -> (Array2<f64>, Vec<usize>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64);
        let y = (0..n).map(|i| i % 3).collect();
        (x, y)
    }

    #[test]
    fn test_split_sizes() {
        let (x, y) = data(11);
        let (train, test) = train_test_split(&x, &y, 0.2, 42).unwrap();
        // ceil(11 * 0.2) = 3
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);
        assert_eq!(train.x.nrows(), 8);
    }

    #[test]
    fn test_split_is_seeded_and_disjoint() {
        let (x, y) = data(30);
        let (train_a, test_a) = train_test_split(&x, &y, 0.2, 42).unwrap();
        let (_, test_b) = train_test_split(&x, &y, 0.2, 42).unwrap();
        assert_eq!(test_a, test_b);

        // Column 0 holds 2 * row, so it identifies the row
        let mut rows: Vec<usize> = train_a
            .x
            .column(0)
            .iter()
            .chain(test_a.x.column(0).iter())
            .map(|v| *v as usize / 2)
            .collect();
        rows.sort();
        assert_eq!(rows, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_too_small() {
        let (x, y) = data(1);
        assert!(matches!(
            train_test_split(&x, &y, 0.2, 42),
            Err(TrainError::SplitTooSmall { .. })
        ));
    }

    #[test]
    fn test_stratified_folds_cover_rows_once() {
        let y: Vec<usize> = (0..20).map(|i| if i < 10 { 0 } else { 1 }).collect();
        let folds = stratified_k_fold(&y, 5);
        assert_eq!(folds.len(), 5);

        let mut validated: Vec<usize> = folds.iter().flat_map(|(_, v)| v.clone()).collect();
        validated.sort();
        assert_eq!(validated, (0..20).collect::<Vec<_>>());

        for (train, validation) in &folds {
            assert_eq!(train.len() + validation.len(), 20);
            let zeros = validation.iter().filter(|&&i| y[i] == 0).count();
            assert_eq!(zeros, 2);
        }
    }

    #[test]
    fn test_folds_clamped_to_rows() {
        let y = vec![0, 1, 0];
        let folds = stratified_k_fold(&y, 5);
        assert!(!folds.is_empty());
        assert!(folds.len() <= 3);
        assert!(stratified_k_fold(&[0], 5).is_empty());
    }
}
