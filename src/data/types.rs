//! Sample types read from Myo armband session logs.
//!
//! A sample carries the eight EMG pod readings of one armband frame. Values
//! that could not be parsed are stored as `NaN` and treated as missing.

use serde::{Deserialize, Serialize};

/// Number of EMG channels (pods) on the armband.
pub const CHANNEL_COUNT: usize = 8;

/// Name of the timestamp column.
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Name of the label column in consolidated files.
pub const LABEL_COLUMN: &str = "Label";

/// Name of the session column in consolidated files.
pub const SESSION_COLUMN: &str = "Session";

/// Column names of the eight channels, in channel order.
pub fn channel_columns() -> Vec<String> {
    (1..=CHANNEL_COUNT).map(|i| format!("Pod{i}")).collect()
}

/// One frame of EMG readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Timestamp exactly as it appeared in the log
    pub timestamp: String,
    /// Pod readings; `NaN` marks a missing value
    pub channels: [f64; CHANNEL_COUNT],
}

impl RawSample {
    pub fn new(timestamp: impl Into<String>, channels: [f64; CHANNEL_COUNT]) -> Self {
        Self {
            timestamp: timestamp.into(),
            channels,
        }
    }

    /// Sum of absolute channel values. Missing values contribute nothing.
    pub fn activity(&self) -> f64 {
        self.channels
            .iter()
            .filter(|v| !v.is_nan())
            .map(|v| v.abs())
            .sum()
    }

    /// Whether any channel value is missing.
    pub fn has_missing(&self) -> bool {
        self.channels.iter().any(|v| v.is_nan())
    }
}

/// A sample together with the gesture it was recorded for.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    pub label: String,
    pub sample: RawSample,
}

/// A sample of the consolidated file, tagged with its session index.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSample {
    pub label: String,
    pub session: usize,
    pub sample: RawSample,
}

/// Parse a channel cell, coercing anything non-numeric to `NaN`.
pub fn coerce_numeric(cell: &str) -> f64 {
    cell.trim().parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_sums_absolute_values() {
        let sample = RawSample::new("t", [1.0, -2.0, 3.0, -4.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(sample.activity(), 11.0);
    }

    #[test]
    fn test_activity_skips_missing() {
        let sample = RawSample::new("t", [f64::NAN, -2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(sample.activity(), 2.0);
        assert!(sample.has_missing());
    }

    #[test]
    fn test_coerce_numeric() {
        assert_eq!(coerce_numeric(" 12 "), 12.0);
        assert_eq!(coerce_numeric("-3.5"), -3.5);
        assert!(coerce_numeric("abc").is_nan());
        assert!(coerce_numeric("").is_nan());
    }

    #[test]
    fn test_channel_columns() {
        let cols = channel_columns();
        assert_eq!(cols.len(), CHANNEL_COUNT);
        assert_eq!(cols[0], "Pod1");
        assert_eq!(cols[7], "Pod8");
    }
}
