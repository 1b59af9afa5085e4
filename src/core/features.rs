//! Time-domain feature computation from sample windows.
//!
//! Every window yields one vector: for each channel in order, each configured
//! feature kind in order. The vector length is therefore
//! `CHANNEL_COUNT * kinds.len()` for every window of a run.

use crate::core::segmentation::Session;
use crate::core::windowing::{concat_by_label, SampleWindow, WindowReport, Windower};
use crate::data::loader::LoadError;
use crate::data::types::{CHANNEL_COUNT, LABEL_COLUMN};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::path::Path;
use tracing::{info, warn};

/// A per-channel time-domain statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Mean value
    Mean,
    /// Mean absolute value (MAV)
    Mav,
    /// Population standard deviation
    Std,
    /// Sample standard deviation (n - 1)
    SampleStd,
    /// Root mean square
    Rms,
    /// Sign changes between consecutive samples
    ZeroCrossings,
    /// Sum of absolute first differences
    WaveformLength,
    /// Mean of first differences
    DiffMean,
    /// Population standard deviation of first differences
    DiffStd,
    /// Sign changes of the slope
    SlopeSignChanges,
}

impl FeatureKind {
    /// Short name used in column headers.
    pub fn short_name(&self) -> &'static str {
        match self {
            FeatureKind::Mean => "mean",
            FeatureKind::Mav => "mav",
            FeatureKind::Std => "std",
            FeatureKind::SampleStd => "sstd",
            FeatureKind::Rms => "rms",
            FeatureKind::ZeroCrossings => "zc",
            FeatureKind::WaveformLength => "wl",
            FeatureKind::DiffMean => "dmean",
            FeatureKind::DiffStd => "dstd",
            FeatureKind::SlopeSignChanges => "ssc",
        }
    }

    /// Compute this feature over one channel of a window.
    pub fn compute(&self, x: &[f64]) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        match self {
            FeatureKind::Mean => x.mean(),
            FeatureKind::Mav => x.iter().map(|v| v.abs()).mean(),
            FeatureKind::Std => x.population_std_dev(),
            FeatureKind::SampleStd => {
                if x.len() < 2 {
                    0.0
                } else {
                    x.std_dev()
                }
            }
            FeatureKind::Rms => x.iter().map(|v| v * v).mean().sqrt(),
            FeatureKind::ZeroCrossings => zero_crossings(x) as f64,
            FeatureKind::WaveformLength => diff(x).iter().map(|d| d.abs()).sum(),
            FeatureKind::DiffMean => {
                let dx = diff(x);
                if dx.is_empty() {
                    0.0
                } else {
                    dx.mean()
                }
            }
            FeatureKind::DiffStd => {
                let dx = diff(x);
                if dx.is_empty() {
                    0.0
                } else {
                    dx.population_std_dev()
                }
            }
            FeatureKind::SlopeSignChanges => slope_sign_changes(x) as f64,
        }
    }
}

/// Named, ordered sets of feature kinds.
pub mod presets {
    use super::FeatureKind;

    /// The order the in-engine inferencer computes per channel.
    pub const RUNTIME: [FeatureKind; 6] = [
        FeatureKind::Mav,
        FeatureKind::WaveformLength,
        FeatureKind::ZeroCrossings,
        FeatureKind::SlopeSignChanges,
        FeatureKind::Rms,
        FeatureKind::SampleStd,
    ];

    /// The per-session statistics of the offline feature script.
    pub const SESSION: [FeatureKind; 7] = [
        FeatureKind::Mean,
        FeatureKind::Std,
        FeatureKind::Rms,
        FeatureKind::ZeroCrossings,
        FeatureKind::WaveformLength,
        FeatureKind::DiffMean,
        FeatureKind::DiffStd,
    ];
}

/// First differences.
fn diff(x: &[f64]) -> Vec<f64> {
    x.windows(2).map(|p| p[1] - p[0]).collect()
}

/// Count of consecutive pairs with strictly opposite signs.
fn zero_crossings(x: &[f64]) -> usize {
    x.windows(2).filter(|p| p[0] * p[1] < 0.0).count()
}

/// Count of interior points where the slope changes sign.
fn slope_sign_changes(x: &[f64]) -> usize {
    x.windows(3)
        .filter(|t| (t[1] - t[0]) * (t[2] - t[1]) < 0.0)
        .count()
}

/// Column names for a feature layout (`CH1_mav`, `CH1_wl`, ...).
pub fn feature_names(kinds: &[FeatureKind]) -> Vec<String> {
    (1..=CHANNEL_COUNT)
        .flat_map(|ch| {
            kinds
                .iter()
                .map(move |k| format!("CH{}_{}", ch, k.short_name()))
        })
        .collect()
}

/// Compute the feature vector of one window.
pub fn compute_window_features(window: &SampleWindow<'_>, kinds: &[FeatureKind]) -> Vec<f64> {
    let mut values = Vec::with_capacity(CHANNEL_COUNT * kinds.len());
    for ch in 0..CHANNEL_COUNT {
        let x = window.channel(ch);
        values.extend(kinds.iter().map(|k| k.compute(&x)));
    }
    values
}

/// One labeled feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub label: String,
    pub values: Vec<f64>,
}

/// Errors produced when assembling a feature dataset.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Feature vector for {label} has {actual} values, expected {expected}")]
    LengthMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
}

/// Feature vectors of one run; every vector has `feature_names.len()` values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureDataset {
    pub feature_names: Vec<String>,
    vectors: Vec<FeatureVector>,
}

impl FeatureDataset {
    /// Create an empty dataset with the given column layout.
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            vectors: Vec::new(),
        }
    }

    /// Add a vector, enforcing the column count.
    pub fn push(&mut self, vector: FeatureVector) -> Result<(), FeatureError> {
        if vector.values.len() != self.feature_names.len() {
            return Err(FeatureError::LengthMismatch {
                label: vector.label,
                expected: self.feature_names.len(),
                actual: vector.values.len(),
            });
        }
        self.vectors.push(vector);
        Ok(())
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Number of values per vector.
    pub fn width(&self) -> usize {
        self.feature_names.len()
    }

    /// Labels in vector order.
    pub fn labels(&self) -> Vec<&str> {
        self.vectors.iter().map(|v| v.label.as_str()).collect()
    }

    /// Values as row vectors.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.vectors.iter().map(|v| v.values.clone()).collect()
    }

    /// The same vectors under renamed columns (`<prefix><name>`).
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        for name in &mut self.feature_names {
            name.insert_str(0, prefix);
        }
        self
    }

    /// A copy with every vector's values replaced through `f`.
    pub fn map_values<F>(&self, mut f: F) -> Result<Self, FeatureError>
    where
        F: FnMut(&[f64]) -> Vec<f64>,
    {
        let mut out = Self::new(self.feature_names.clone());
        for v in &self.vectors {
            out.push(FeatureVector {
                label: v.label.clone(),
                values: f(&v.values),
            })?;
        }
        Ok(out)
    }
}

/// Extract labeled feature vectors from trimmed sessions.
///
/// Windows containing a missing value produce no vector and are counted.
pub fn extract_features(
    sessions: &[Session],
    windower: &Windower,
    kinds: &[FeatureKind],
) -> Result<(FeatureDataset, WindowReport), FeatureError> {
    let mut dataset = FeatureDataset::new(feature_names(kinds));
    let mut report = WindowReport {
        window_len: windower.window_len(),
        ..Default::default()
    };

    for (label, rows) in concat_by_label(sessions) {
        let mut counts = windower.count(rows.len());
        for window in windower.windows(&label, &rows) {
            if window.has_missing() {
                counts.skipped_missing += 1;
                continue;
            }
            dataset.push(FeatureVector {
                label: label.clone(),
                values: compute_window_features(&window, kinds),
            })?;
        }

        if counts.usable() == 0 {
            warn!(
                "{}: no usable {}-sample window in {} rows",
                label,
                windower.window_len(),
                counts.rows
            );
        } else {
            info!(
                "{}: {} windows ({} tail rows dropped, {} skipped for missing values)",
                label, counts.windows, counts.dropped_tail_rows, counts.skipped_missing
            );
        }
        report.labels.insert(label, counts);
    }

    Ok((dataset, report))
}

/// Write a dataset as `Label,<feature columns>`.
pub fn write_feature_csv(path: &Path, dataset: &FeatureDataset) -> Result<(), LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = WriterBuilder::new().from_path(path).map_err(csv_err)?;
    let mut header = vec![LABEL_COLUMN.to_string()];
    header.extend(dataset.feature_names.iter().cloned());
    writer.write_record(&header).map_err(csv_err)?;

    for vector in dataset.vectors() {
        let mut record = Vec::with_capacity(header.len());
        record.push(vector.label.clone());
        record.extend(vector.values.iter().map(|v| v.to_string()));
        writer.write_record(&record).map_err(csv_err)?;
    }

    writer.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a dataset written by [`write_feature_csv`].
pub fn read_feature_csv(path: &Path) -> Result<FeatureDataset, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::Headers)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    let label_idx = headers
        .iter()
        .position(|h| h == LABEL_COLUMN)
        .ok_or_else(|| LoadError::MissingColumns {
            path: path.to_path_buf(),
            columns: vec![LABEL_COLUMN.to_string()],
        })?;

    let value_idx: Vec<usize> = (0..headers.len()).filter(|&i| i != label_idx).collect();
    let names = value_idx.iter().map(|&i| headers[i].to_string()).collect();
    let mut dataset = FeatureDataset::new(names);

    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        let values = value_idx
            .iter()
            .map(|&i| crate::data::types::coerce_numeric(record.get(i).unwrap_or("")))
            .collect();
        // Column count is fixed by the header, so push cannot fail here.
        let _ = dataset.push(FeatureVector {
            label: record.get(label_idx).unwrap_or("").to_string(),
            values,
        });
    }

    Ok(dataset)
}
