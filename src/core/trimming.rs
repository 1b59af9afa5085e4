//! Trimming of sessions down to their active rows.
//!
//! Rows whose activity falls below a percentile of the session's activity are
//! dropped. Surviving rows keep their original order but need not be
//! contiguous.

use crate::core::segmentation::Session;
use crate::data::types::RawSample;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Linear-interpolation percentile (`q` in 0..=100) of a set of values.
///
/// Returns `None` for an empty slice. NaN values are ignored.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;

    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Session and row counts before and after trimming.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrimReport {
    pub sessions_in: usize,
    pub sessions_kept: usize,
    pub rows_in: usize,
    pub rows_kept: usize,
}

/// Drops the least active rows of each session.
#[derive(Debug, Clone)]
pub struct Trimmer {
    cut_percentile: f64,
    min_rows: usize,
}

impl Trimmer {
    /// Create a trimmer that cuts below `cut_percentile` and rejects results
    /// shorter than `min_rows`.
    pub fn new(cut_percentile: f64, min_rows: usize) -> Self {
        Self {
            cut_percentile,
            min_rows,
        }
    }

    pub fn min_rows(&self) -> usize {
        self.min_rows
    }

    /// Activity threshold for a set of rows.
    pub fn threshold(&self, rows: &[RawSample]) -> Option<f64> {
        let activity: Vec<f64> = rows.iter().map(|r| r.activity()).collect();
        percentile(&activity, self.cut_percentile)
    }

    /// Trim one session. Returns `None` if the session is too short before or
    /// after trimming.
    pub fn trim(&self, session: &Session) -> Option<Session> {
        if session.len() < self.min_rows {
            debug!(
                "{} session {}: too short ({} rows)",
                session.label,
                session.index,
                session.len()
            );
            return None;
        }

        let threshold = self.threshold(&session.rows)?;
        let rows: Vec<RawSample> = session
            .rows
            .iter()
            .filter(|r| r.activity() >= threshold)
            .cloned()
            .collect();

        if rows.is_empty() || rows.len() < self.min_rows {
            debug!(
                "{} session {}: {} rows left after trimming, below {}",
                session.label,
                session.index,
                rows.len(),
                self.min_rows
            );
            return None;
        }

        Some(Session {
            label: session.label.clone(),
            index: session.index,
            rows,
        })
    }

    /// Trim every session, keeping only those that survive.
    pub fn trim_all(&self, sessions: &[Session]) -> (Vec<Session>, TrimReport) {
        let trimmed: Vec<Session> = sessions.iter().filter_map(|s| self.trim(s)).collect();
        let report = TrimReport {
            sessions_in: sessions.len(),
            sessions_kept: trimmed.len(),
            rows_in: sessions.iter().map(Session::len).sum(),
            rows_kept: trimmed.iter().map(Session::len).sum(),
        };
        info!(
            "Trimmed {} sessions to {} ({} of {} rows kept)",
            report.sessions_in, report.sessions_kept, report.rows_kept, report.rows_in
        );
        (trimmed, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::CHANNEL_COUNT;

    fn session_with_levels(levels: &[f64]) -> Session {
        Session {
            label: "Fist".to_string(),
            index: 0,
            rows: levels
                .iter()
                .enumerate()
                .map(|(i, &l)| RawSample::new(format!("t{i}"), [l; CHANNEL_COUNT]))
                .collect(),
        }
    }

    #[test]
    fn test_percentile_linear() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 100.0), Some(5.0));
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        // rank = 0.2 * 4 = 0.8
        let p20 = percentile(&values, 20.0).unwrap();
        assert!((p20 - 1.8).abs() < 1e-12);
        assert_eq!(percentile(&[], 20.0), None);
    }

    #[test]
    fn test_percentile_unsorted_input() {
        let values = [10.0, 0.0, 5.0, 2.5];
        // sorted: 0, 2.5, 5, 10; rank = 0.2 * 3 = 0.6 -> 0 + 2.5 * 0.6
        let p20 = percentile(&values, 20.0).unwrap();
        assert!((p20 - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_trim_drops_lowest_fifth() {
        let levels: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let session = session_with_levels(&levels);
        let trimmer = Trimmer::new(20.0, 5);

        let trimmed = trimmer.trim(&session).unwrap();
        let threshold = trimmer.threshold(&session.rows).unwrap();

        assert!(trimmed.len() <= session.len());
        assert_eq!(trimmed.len(), 8);
        for row in &trimmed.rows {
            assert!(row.activity() >= threshold);
        }
    }

    #[test]
    fn test_trim_keeps_order_and_fragments() {
        let levels = [9.0, 0.1, 8.0, 0.2, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0];
        let session = session_with_levels(&levels);
        let trimmer = Trimmer::new(20.0, 1);

        let trimmed = trimmer.trim(&session).unwrap();
        let stamps: Vec<&str> = trimmed.rows.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["t0", "t2", "t4", "t5", "t6", "t7", "t8", "t9"]);
    }

    #[test]
    fn test_trim_rejects_short_sessions() {
        let session = session_with_levels(&[5.0; 4]);
        let trimmer = Trimmer::new(20.0, 5);
        assert!(trimmer.trim(&session).is_none());
    }

    #[test]
    fn test_trim_rejects_when_too_few_rows_remain() {
        let levels: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let session = session_with_levels(&levels);
        let trimmer = Trimmer::new(20.0, 9);
        assert!(trimmer.trim(&session).is_none());
    }

    #[test]
    fn test_trim_all_counts() {
        let levels: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let sessions = vec![session_with_levels(&levels), session_with_levels(&[1.0; 3])];
        let (trimmed, report) = Trimmer::new(20.0, 5).trim_all(&sessions);
        assert_eq!(trimmed.len(), 1);
        assert_eq!(
            report,
            TrimReport {
                sessions_in: 2,
                sessions_kept: 1,
                rows_in: 13,
                rows_kept: 8,
            }
        );
    }

    #[test]
    fn test_constant_activity_keeps_everything() {
        let session = session_with_levels(&[3.0; 10]);
        let trimmer = Trimmer::new(20.0, 5);
        assert_eq!(trimmer.trim(&session).unwrap().len(), 10);
    }
}
