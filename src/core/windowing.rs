//! Fixed-size, non-overlapping windows over trimmed session rows.
//!
//! The trimmed rows of every session of a label are concatenated (sessions in
//! index order) and cut into windows whose length is derived from a duration
//! and an assumed sampling rate. A trailing partial window is dropped.

use crate::config::WindowConfig;
use crate::core::segmentation::Session;
use crate::data::types::{RawSample, CHANNEL_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of samples in a window of `window_ms` at `sample_rate_hz`.
///
/// Computed as `floor(window_ms / (1000 / sample_rate_hz))`.
pub fn window_len_samples(window_ms: f64, sample_rate_hz: f64) -> usize {
    if window_ms <= 0.0 || sample_rate_hz <= 0.0 {
        return 0;
    }
    let period_ms = 1000.0 / sample_rate_hz;
    (window_ms / period_ms).floor() as usize
}

/// A window of consecutive rows of one label.
#[derive(Debug, Clone, Copy)]
pub struct SampleWindow<'a> {
    /// Gesture label
    pub label: &'a str,
    /// Position of this window within the label
    pub index: usize,
    /// Rows covered by the window
    pub rows: &'a [RawSample],
}

impl<'a> SampleWindow<'a> {
    /// Number of samples in the window.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one channel across the window.
    pub fn channel(&self, channel: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r.channels[channel]).collect()
    }

    /// All channels, in channel order.
    pub fn channels(&self) -> Vec<Vec<f64>> {
        (0..CHANNEL_COUNT).map(|ch| self.channel(ch)).collect()
    }

    /// Whether any sample in the window has a missing value.
    pub fn has_missing(&self) -> bool {
        self.rows.iter().any(|r| r.has_missing())
    }
}

/// Per-label windowing counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelWindowing {
    /// Trimmed rows available for the label
    pub rows: usize,
    /// Full windows cut from those rows
    pub windows: usize,
    /// Rows left over after the last full window
    pub dropped_tail_rows: usize,
    /// Full windows skipped because they contained missing values
    pub skipped_missing: usize,
}

impl LabelWindowing {
    /// Windows that produced a feature vector.
    pub fn usable(&self) -> usize {
        self.windows - self.skipped_missing
    }
}

/// Windowing counts for every label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    pub window_len: usize,
    pub labels: BTreeMap<String, LabelWindowing>,
}

impl WindowReport {
    /// Labels that contributed no usable window.
    pub fn empty_labels(&self) -> Vec<&str> {
        self.labels
            .iter()
            .filter(|(_, l)| l.usable() == 0)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Cuts per-label row sequences into non-overlapping windows.
#[derive(Debug, Clone, Copy)]
pub struct Windower {
    window_len: usize,
}

impl Windower {
    /// Create a windower with an explicit length in samples.
    pub fn new(window_len: usize) -> Self {
        Self { window_len }
    }

    /// Create a windower from configuration.
    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.window_len())
    }

    /// Window length in samples.
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Full windows over a row sequence. Empty if the length is zero.
    pub fn windows<'a>(&self, label: &'a str, rows: &'a [RawSample]) -> Vec<SampleWindow<'a>> {
        if self.window_len == 0 {
            return Vec::new();
        }
        rows.chunks_exact(self.window_len)
            .enumerate()
            .map(|(index, rows)| SampleWindow { label, index, rows })
            .collect()
    }

    /// Counts for a row sequence before any window is skipped.
    pub fn count(&self, rows: usize) -> LabelWindowing {
        let windows = if self.window_len == 0 {
            0
        } else {
            rows / self.window_len
        };
        LabelWindowing {
            rows,
            windows,
            dropped_tail_rows: rows - windows * self.window_len,
            skipped_missing: 0,
        }
    }
}

/// Concatenate trimmed session rows per label, sessions in index order.
pub fn concat_by_label(sessions: &[Session]) -> BTreeMap<String, Vec<RawSample>> {
    let mut ordered: Vec<&Session> = sessions.iter().collect();
    ordered.sort_by(|a, b| a.label.cmp(&b.label).then(a.index.cmp(&b.index)));

    let mut by_label: BTreeMap<String, Vec<RawSample>> = BTreeMap::new();
    for session in ordered {
        by_label
            .entry(session.label.clone())
            .or_default()
            .extend(session.rows.iter().cloned());
    }
    by_label
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(count: usize) -> Vec<RawSample> {
        (0..count)
            .map(|i| RawSample::new(format!("t{i}"), [i as f64; CHANNEL_COUNT]))
            .collect()
    }

    #[test]
    fn test_window_len_from_duration() {
        assert_eq!(window_len_samples(1000.0, 100.0), 100);
        assert_eq!(window_len_samples(250.0, 100.0), 25);
        // 250 ms at 70 Hz is 17.5 samples
        assert_eq!(window_len_samples(250.0, 70.0), 17);
        assert_eq!(window_len_samples(0.0, 70.0), 0);
    }

    #[test]
    fn test_800_rows_make_8_windows() {
        let rows = rows(800);
        let windower = Windower::new(window_len_samples(1000.0, 100.0));

        let windows = windower.windows("Fist", &rows);
        assert_eq!(windows.len(), 8);
        assert!(windows.iter().all(|w| w.len() == 100));

        let counts = windower.count(rows.len());
        assert_eq!(counts.windows, 8);
        assert_eq!(counts.dropped_tail_rows, 0);
    }

    #[test]
    fn test_partial_tail_dropped() {
        let rows = rows(250);
        let windower = Windower::new(100);

        let windows = windower.windows("Fist", &rows);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].rows[0].timestamp, "t100");
        assert_eq!(windower.count(250).dropped_tail_rows, 50);
    }

    #[test]
    fn test_too_few_rows_yield_no_window() {
        let rows = rows(40);
        let windower = Windower::new(100);
        assert!(windower.windows("Rest", &rows).is_empty());
        assert_eq!(windower.count(40).windows, 0);
    }

    #[test]
    fn test_window_channel_extraction() {
        let rows = rows(3);
        let windower = Windower::new(3);
        let window = windower.windows("Fist", &rows)[0];
        assert_eq!(window.channel(5), vec![0.0, 1.0, 2.0]);
        assert_eq!(window.channels().len(), CHANNEL_COUNT);
        assert!(!window.has_missing());
    }

    #[test]
    fn test_concat_by_label_orders_sessions() {
        let sessions = vec![
            Session {
                label: "Fist".to_string(),
                index: 1,
                rows: rows(2),
            },
            Session {
                label: "Fist".to_string(),
                index: 0,
                rows: rows(3),
            },
            Session {
                label: "Closed".to_string(),
                index: 0,
                rows: rows(1),
            },
        ];

        let grouped = concat_by_label(&sessions);
        let labels: Vec<&String> = grouped.keys().collect();
        assert_eq!(labels, vec!["Closed", "Fist"]);
        assert_eq!(grouped["Fist"].len(), 5);
        assert_eq!(grouped["Fist"][3].timestamp, "t0");
    }

    #[test]
    fn test_empty_labels_reported() {
        let mut report = WindowReport {
            window_len: 100,
            ..Default::default()
        };
        report
            .labels
            .insert("Fist".to_string(), Windower::new(100).count(800));
        report
            .labels
            .insert("Rest".to_string(), Windower::new(100).count(40));
        assert_eq!(report.empty_labels(), vec!["Rest"]);
    }
}
