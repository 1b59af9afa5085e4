//! Session segmentation of raw gesture logs.
//!
//! Each label's samples are cut, in file order, into consecutive chunks of a
//! fixed nominal size. A chunk becomes a session only if it is long enough
//! and its mean cross-channel activity exceeds a threshold.

use crate::config::SegmentationConfig;
use crate::data::types::{LabeledSample, RawSample};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A retained chunk of one label's samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Gesture label
    pub label: String,
    /// Index among the retained sessions of this label
    pub index: usize,
    /// Samples in file order
    pub rows: Vec<RawSample>,
}

impl Session {
    /// Number of rows in the session.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Mean per-row activity over the session.
    pub fn mean_activity(&self) -> f64 {
        mean_activity(&self.rows)
    }
}

/// Per-label segmentation counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelSegmentation {
    /// Rows seen for the label
    pub rows: usize,
    /// Chunks considered
    pub chunks: usize,
    /// Chunks kept as sessions
    pub retained: usize,
    /// Chunks dropped for having too few rows
    pub rejected_short: usize,
    /// Chunks dropped for low activity
    pub rejected_inactive: usize,
}

/// Segmentation counts for every label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationReport {
    pub labels: BTreeMap<String, LabelSegmentation>,
}

impl SegmentationReport {
    /// Total retained sessions.
    pub fn total_sessions(&self) -> usize {
        self.labels.values().map(|l| l.retained).sum()
    }

    /// Total rows seen across all labels.
    pub fn total_rows(&self) -> usize {
        self.labels.values().map(|l| l.rows).sum()
    }
}

/// Mean of per-row activity sums.
pub fn mean_activity(rows: &[RawSample]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|r| r.activity()).mean()
}

/// Splits labeled samples into activity-gated sessions.
#[derive(Debug, Clone)]
pub struct Segmenter {
    samples_per_session: usize,
    min_samples: usize,
    min_activity: f64,
}

impl Segmenter {
    /// Create a segmenter from configuration.
    pub fn new(config: &SegmentationConfig) -> Self {
        Self {
            samples_per_session: config.samples_per_session.max(1),
            min_samples: config.min_samples(),
            min_activity: config.min_activity,
        }
    }

    /// Nominal chunk size.
    pub fn samples_per_session(&self) -> usize {
        self.samples_per_session
    }

    /// Minimum rows for a chunk to be kept.
    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Segment a labeled sequence. Labels are visited in sorted order.
    pub fn segment(&self, rows: &[LabeledSample]) -> (Vec<Session>, SegmentationReport) {
        let mut by_label: BTreeMap<&str, Vec<RawSample>> = BTreeMap::new();
        for row in rows {
            by_label
                .entry(row.label.as_str())
                .or_default()
                .push(row.sample.clone());
        }

        let mut report = SegmentationReport::default();
        let mut sessions = Vec::new();

        for (label, samples) in by_label {
            let (label_sessions, counts) = self.segment_label(label, &samples);
            info!(
                "{}: {} rows -> {} sessions ({} short, {} inactive)",
                label, counts.rows, counts.retained, counts.rejected_short, counts.rejected_inactive
            );
            report.labels.insert(label.to_string(), counts);
            sessions.extend(label_sessions);
        }

        (sessions, report)
    }

    /// Segment the samples of a single label.
    pub fn segment_label(
        &self,
        label: &str,
        samples: &[RawSample],
    ) -> (Vec<Session>, LabelSegmentation) {
        let mut counts = LabelSegmentation {
            rows: samples.len(),
            ..Default::default()
        };
        let mut sessions = Vec::new();

        for (chunk_idx, chunk) in samples.chunks(self.samples_per_session).enumerate() {
            counts.chunks += 1;

            if chunk.len() < self.min_samples {
                debug!(
                    "{} chunk {}: {} rows below minimum {}",
                    label,
                    chunk_idx,
                    chunk.len(),
                    self.min_samples
                );
                counts.rejected_short += 1;
                continue;
            }

            let activity = mean_activity(chunk);
            if activity <= self.min_activity {
                debug!(
                    "{} chunk {}: mean activity {:.2} not above {}",
                    label, chunk_idx, activity, self.min_activity
                );
                counts.rejected_inactive += 1;
                continue;
            }

            sessions.push(Session {
                label: label.to_string(),
                index: counts.retained,
                rows: chunk.to_vec(),
            });
            counts.retained += 1;
        }

        (sessions, counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::CHANNEL_COUNT;

    fn config(size: usize, min_activity: f64) -> SegmentationConfig {
        SegmentationConfig {
            samples_per_session: size,
            min_samples: None,
            min_activity,
        }
    }

    fn labeled(label: &str, count: usize, level: f64) -> Vec<LabeledSample> {
        (0..count)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                LabeledSample {
                    label: label.to_string(),
                    sample: RawSample::new(format!("t{i}"), [sign * level; CHANNEL_COUNT]),
                }
            })
            .collect()
    }

    #[test]
    fn test_fist_rest_scenario() {
        let mut rows = labeled("Fist", 1200, 10.0);
        rows.extend(labeled("Rest", 400, 0.1));

        let segmenter = Segmenter::new(&config(1000, 5.0));
        let (sessions, report) = segmenter.segment(&rows);

        let fist: Vec<_> = sessions.iter().filter(|s| s.label == "Fist").collect();
        let rest: Vec<_> = sessions.iter().filter(|s| s.label == "Rest").collect();
        assert_eq!(fist.len(), 1);
        assert_eq!(rest.len(), 0);
        assert_eq!(fist[0].len(), 1000);

        assert_eq!(report.labels["Fist"].chunks, 2);
        assert_eq!(report.labels["Fist"].rejected_short, 1);
        assert_eq!(report.labels["Rest"].retained, 0);
    }

    #[test]
    fn test_inactive_long_label_rejected_for_activity() {
        let rows = labeled("Rest", 2000, 0.5);
        let segmenter = Segmenter::new(&config(1000, 5.0));
        let (sessions, report) = segmenter.segment(&rows);

        assert!(sessions.is_empty());
        assert_eq!(report.labels["Rest"].rejected_inactive, 2);
    }

    #[test]
    fn test_session_lengths_within_bounds() {
        let rows = labeled("Pinch", 3700, 3.0);
        let segmenter = Segmenter::new(&config(1000, 5.0));
        let (sessions, _) = segmenter.segment(&rows);

        assert_eq!(sessions.len(), 4);
        for session in &sessions {
            assert!(session.len() <= segmenter.samples_per_session());
            assert!(session.len() >= segmenter.min_samples());
        }
        assert_eq!(sessions[3].len(), 700);
        let indices: Vec<usize> = sessions.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_threshold_is_strict() {
        // 8 channels * 0.625 = 5.0 exactly
        let rows = labeled("Edge", 1000, 0.625);
        let segmenter = Segmenter::new(&config(1000, 5.0));
        let (sessions, _) = segmenter.segment(&rows);
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_labels_sorted_and_deterministic() {
        let mut rows = labeled("Pinch", 1000, 10.0);
        rows.extend(labeled("Fist", 1000, 10.0));

        let segmenter = Segmenter::new(&config(1000, 5.0));
        let (first, _) = segmenter.segment(&rows);
        let (second, _) = segmenter.segment(&rows);

        assert_eq!(first, second);
        assert_eq!(first[0].label, "Fist");
        assert_eq!(first[1].label, "Pinch");
    }
}
