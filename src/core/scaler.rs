//! Column scaling fitted at training time and replayed at inference time.
//!
//! Both methods reduce to an affine map `scaled = (x - offset) / scale` per
//! column, which is what the sidecar stores (`mean` holds the offsets so the
//! in-engine loader can read either method unchanged).

use crate::core::features::FeatureDataset;
use crate::core::segmentation::Session;
use crate::data::types::{channel_columns, RawSample, CHANNEL_COUNT};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::path::Path;
use thiserror::Error;

/// How columns are normalised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalingMethod {
    /// Zero mean, unit variance (population standard deviation)
    Standard,
    /// Linear map of each column's observed range onto `[min, max]`
    MinMax { min: f64, max: f64 },
}

impl Default for ScalingMethod {
    fn default() -> Self {
        ScalingMethod::Standard
    }
}

/// What the scaler is fitted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingTarget {
    /// Feature vectors, after windowing
    #[default]
    Features,
    /// Raw pod values, before windowing
    RawChannels,
}

/// Scaler errors.
#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("Cannot fit a scaler on an empty matrix")]
    Empty,

    #[error("Row has {actual} values, scaler expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid min-max range [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },

    #[error("Scaler was fitted on {0:?}, not on raw channels")]
    WrongTarget(ScalingTarget),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fitted per-column scaling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub method: ScalingMethod,
    pub target: ScalingTarget,
    pub feature_names: Vec<String>,
    /// Per-column offsets
    #[serde(rename = "mean")]
    pub offset: Vec<f64>,
    /// Per-column divisors
    pub scale: Vec<f64>,
}

impl Scaler {
    /// Fit over a row-major matrix. NaN cells are ignored per column.
    pub fn fit(
        method: ScalingMethod,
        target: ScalingTarget,
        feature_names: Vec<String>,
        rows: &[Vec<f64>],
    ) -> Result<Self, ScalerError> {
        if rows.is_empty() || feature_names.is_empty() {
            return Err(ScalerError::Empty);
        }
        if let ScalingMethod::MinMax { min, max } = method {
            if !(max > min) {
                return Err(ScalerError::InvalidRange { min, max });
            }
        }

        let width = feature_names.len();
        let mut offset = Vec::with_capacity(width);
        let mut scale = Vec::with_capacity(width);

        for col in 0..width {
            let mut values = Vec::with_capacity(rows.len());
            for row in rows {
                let v = *row.get(col).ok_or(ScalerError::DimensionMismatch {
                    expected: width,
                    actual: row.len(),
                })?;
                if !v.is_nan() {
                    values.push(v);
                }
            }
            if values.is_empty() {
                return Err(ScalerError::Empty);
            }

            let (o, s) = match method {
                ScalingMethod::Standard => {
                    let mean = values.iter().mean();
                    let std = values.iter().population_std_dev();
                    (mean, non_zero(std))
                }
                ScalingMethod::MinMax { min, max } => {
                    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
                    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    let range = non_zero(hi - lo);
                    let s = range / (max - min);
                    (lo - min * s, s)
                }
            };
            offset.push(o);
            scale.push(s);
        }

        Ok(Self {
            method,
            target,
            feature_names,
            offset,
            scale,
        })
    }

    /// Fit on a feature dataset.
    pub fn fit_features(
        method: ScalingMethod,
        dataset: &FeatureDataset,
    ) -> Result<Self, ScalerError> {
        Self::fit(
            method,
            ScalingTarget::Features,
            dataset.feature_names.clone(),
            &dataset.rows(),
        )
    }

    /// Fit on the pod values of trimmed sessions.
    pub fn fit_channels(method: ScalingMethod, sessions: &[Session]) -> Result<Self, ScalerError> {
        let rows: Vec<Vec<f64>> = sessions
            .iter()
            .flat_map(|s| s.rows.iter().map(|r| r.channels.to_vec()))
            .collect();
        Self::fit(method, ScalingTarget::RawChannels, channel_columns(), &rows)
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.offset.len()
    }

    /// Apply the fitted transform to one row.
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, ScalerError> {
        if row.len() != self.width() {
            return Err(ScalerError::DimensionMismatch {
                expected: self.width(),
                actual: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.offset.iter().zip(self.scale.iter()))
            .map(|(x, (o, s))| (x - o) / s)
            .collect())
    }

    /// Apply the fitted transform to every vector of a dataset.
    pub fn transform_dataset(&self, dataset: &FeatureDataset) -> Result<FeatureDataset, ScalerError> {
        if dataset.width() != self.width() {
            return Err(ScalerError::DimensionMismatch {
                expected: self.width(),
                actual: dataset.width(),
            });
        }
        dataset
            .map_values(|values| {
                values
                    .iter()
                    .zip(self.offset.iter().zip(self.scale.iter()))
                    .map(|(x, (o, s))| (x - o) / s)
                    .collect()
            })
            .map_err(|_| ScalerError::DimensionMismatch {
                expected: self.width(),
                actual: dataset.width(),
            })
    }

    /// Apply a raw-channel scaler to the pod values of sessions.
    pub fn transform_sessions(&self, sessions: &[Session]) -> Result<Vec<Session>, ScalerError> {
        if self.target != ScalingTarget::RawChannels {
            return Err(ScalerError::WrongTarget(self.target));
        }
        if self.width() != CHANNEL_COUNT {
            return Err(ScalerError::DimensionMismatch {
                expected: CHANNEL_COUNT,
                actual: self.width(),
            });
        }

        Ok(sessions
            .iter()
            .map(|s| Session {
                label: s.label.clone(),
                index: s.index,
                rows: s
                    .rows
                    .iter()
                    .map(|r| {
                        let mut channels = r.channels;
                        for (ch, v) in channels.iter_mut().enumerate() {
                            *v = (*v - self.offset[ch]) / self.scale[ch];
                        }
                        RawSample::new(r.timestamp.clone(), channels)
                    })
                    .collect(),
            })
            .collect())
    }

    /// Write the sidecar JSON.
    pub fn save(&self, path: &Path) -> Result<(), ScalerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a sidecar JSON. The loaded parameters are applied as-is.
    pub fn load(path: &Path) -> Result<Self, ScalerError> {
        let content = std::fs::read_to_string(path)?;
        let scaler: Scaler = serde_json::from_str(&content)?;
        if scaler.offset.len() != scaler.scale.len() {
            return Err(ScalerError::DimensionMismatch {
                expected: scaler.offset.len(),
                actual: scaler.scale.len(),
            });
        }
        Ok(scaler)
    }
}

/// Replace a zero (or non-finite) divisor with 1.
fn non_zero(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        1.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::FeatureVector;

    fn matrix() -> Vec<Vec<f64>> {
        vec![
            vec![1.0, 10.0, 5.0],
            vec![2.0, 20.0, 5.0],
            vec![3.0, 30.0, 5.0],
            vec![4.0, 60.0, 5.0],
        ]
    }

    fn names() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    fn column(rows: &[Vec<f64>], col: usize) -> Vec<f64> {
        rows.iter().map(|r| r[col]).collect()
    }

    #[test]
    fn test_standard_round_trip_statistics() {
        let rows = matrix();
        let scaler =
            Scaler::fit(ScalingMethod::Standard, ScalingTarget::Features, names(), &rows).unwrap();
        let scaled: Vec<Vec<f64>> = rows.iter().map(|r| scaler.transform_row(r).unwrap()).collect();

        for col in 0..2 {
            let values = column(&scaled, col);
            assert!(values.iter().mean().abs() < 1e-9);
            assert!((values.iter().population_std_dev() - 1.0).abs() < 1e-9);
        }
        // Constant column: scale falls back to 1, values centred on 0
        assert_eq!(scaler.scale[2], 1.0);
        assert!(column(&scaled, 2).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_min_max_round_trip_range() {
        let rows = matrix();
        let scaler = Scaler::fit(
            ScalingMethod::MinMax { min: -1.0, max: 1.0 },
            ScalingTarget::Features,
            names(),
            &rows,
        )
        .unwrap();
        let scaled: Vec<Vec<f64>> = rows.iter().map(|r| scaler.transform_row(r).unwrap()).collect();

        for col in 0..2 {
            let values = column(&scaled, col);
            let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            assert!((lo + 1.0).abs() < 1e-9);
            assert!((hi - 1.0).abs() < 1e-9);
        }
        assert!((scaled[1][1] - (-1.0 + 2.0 * 10.0 / 50.0)).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_range_rejected() {
        let result = Scaler::fit(
            ScalingMethod::MinMax { min: 1.0, max: 1.0 },
            ScalingTarget::Features,
            names(),
            &matrix(),
        );
        assert!(matches!(result, Err(ScalerError::InvalidRange { .. })));
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let scaler = Scaler::fit(
            ScalingMethod::Standard,
            ScalingTarget::Features,
            names(),
            &matrix(),
        )
        .unwrap();
        assert!(matches!(
            scaler.transform_row(&[1.0, 2.0]),
            Err(ScalerError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_sidecar_load_applies_without_refit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler_params.json");
        let scaler = Scaler::fit(
            ScalingMethod::Standard,
            ScalingTarget::Features,
            names(),
            &matrix(),
        )
        .unwrap();
        scaler.save(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(json["mean"].is_array());
        assert!(json["scale"].is_array());

        let loaded = Scaler::load(&path).unwrap();
        let unseen = [100.0, -5.0, 7.0];
        assert_eq!(
            loaded.transform_row(&unseen).unwrap(),
            scaler.transform_row(&unseen).unwrap()
        );
    }

    #[test]
    fn test_dataset_transform() {
        let mut dataset = FeatureDataset::new(names());
        for row in matrix() {
            dataset
                .push(FeatureVector {
                    label: "Fist".into(),
                    values: row,
                })
                .unwrap();
        }
        let scaler = Scaler::fit_features(ScalingMethod::Standard, &dataset).unwrap();
        let scaled = scaler.transform_dataset(&dataset).unwrap();
        assert_eq!(scaled.len(), 4);
        assert_eq!(scaled.labels(), vec!["Fist"; 4]);
    }

    #[test]
    fn test_channel_scaler_on_sessions() {
        let session = Session {
            label: "Fist".into(),
            index: 0,
            rows: (0..10)
                .map(|i| RawSample::new("t", [i as f64; CHANNEL_COUNT]))
                .collect(),
        };
        let scaler = Scaler::fit_channels(ScalingMethod::Standard, &[session.clone()]).unwrap();
        assert_eq!(scaler.target, ScalingTarget::RawChannels);
        assert_eq!(scaler.width(), CHANNEL_COUNT);

        let scaled = scaler.transform_sessions(&[session]).unwrap();
        let first: Vec<f64> = scaled[0].rows.iter().map(|r| r.channels[0]).collect();
        assert!(first.iter().mean().abs() < 1e-9);

        let feature_scaler = Scaler::fit(
            ScalingMethod::Standard,
            ScalingTarget::Features,
            names(),
            &matrix(),
        )
        .unwrap();
        assert!(matches!(
            feature_scaler.transform_sessions(&scaled),
            Err(ScalerError::WrongTarget(ScalingTarget::Features))
        ));
    }
}
