//! The consolidated `emg_clean.csv` file.
//!
//! Holds every retained session row with its label and per-label session
//! index. Written once by segmentation, read by the training stages.

use crate::core::segmentation::Session;
use crate::data::loader::{cell, open_reader, ColumnIndex, LoadError};
use crate::data::types::{
    channel_columns, SessionSample, LABEL_COLUMN, SESSION_COLUMN, TIMESTAMP_COLUMN,
};
use csv::WriterBuilder;
use std::collections::BTreeMap;
use std::path::Path;

/// Format a channel value the way the file stores it (missing -> empty cell).
fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Write sessions to a consolidated CSV. Returns the number of rows written.
pub fn write_clean(path: &Path, sessions: &[Session]) -> Result<usize, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| LoadError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut writer = WriterBuilder::new().from_path(path).map_err(csv_err)?;

    let mut header = vec![TIMESTAMP_COLUMN.to_string()];
    header.extend(channel_columns());
    header.push(LABEL_COLUMN.to_string());
    header.push(SESSION_COLUMN.to_string());
    writer.write_record(&header).map_err(csv_err)?;

    let mut written = 0usize;
    for session in sessions {
        let session_idx = session.index.to_string();
        for row in &session.rows {
            let mut record = Vec::with_capacity(header.len());
            record.push(row.timestamp.clone());
            record.extend(row.channels.iter().map(|&v| format_value(v)));
            record.push(session.label.clone());
            record.push(session_idx.clone());
            writer.write_record(&record).map_err(csv_err)?;
            written += 1;
        }
    }

    writer.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(written)
}

/// Read a consolidated CSV back into session-tagged rows, in file order.
pub fn read_clean(path: &Path) -> Result<Vec<SessionSample>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(csv_err)?.clone();
    let columns = ColumnIndex::resolve(&headers, &[LABEL_COLUMN, SESSION_COLUMN], path)?;
    let (label_idx, session_idx) = (columns.extra[0], columns.extra[1]);

    let mut rows = Vec::new();
    for (row_idx, result) in reader.byte_records().enumerate() {
        let record = result.map_err(csv_err)?;
        let session = cell(&record, session_idx)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or_else(|| LoadError::InvalidSession {
                path: path.to_path_buf(),
                row: row_idx + 1,
                value: record
                    .get(session_idx)
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default(),
            })?;

        rows.push(SessionSample {
            label: cell(&record, label_idx).unwrap_or("").to_string(),
            session,
            sample: columns.sample(&record),
        });
    }

    Ok(rows)
}

/// Regroup consolidated rows into sessions, ordered by label then session index.
pub fn into_sessions(rows: Vec<SessionSample>) -> Vec<Session> {
    let mut grouped: BTreeMap<(String, usize), Vec<_>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry((row.label, row.session))
            .or_default()
            .push(row.sample);
    }

    grouped
        .into_iter()
        .map(|((label, index), rows)| Session { label, index, rows })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{RawSample, CHANNEL_COUNT};

    fn session(label: &str, index: usize, rows: usize) -> Session {
        Session {
            label: label.to_string(),
            index,
            rows: (0..rows)
                .map(|i| RawSample::new(format!("t{i}"), [i as f64; CHANNEL_COUNT]))
                .collect(),
        }
    }

    #[test]
    fn test_clean_file_preserves_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emg_clean.csv");
        let sessions = vec![session("Fist", 0, 3), session("Fist", 1, 2), session("Rest", 0, 4)];

        let written = write_clean(&path, &sessions).unwrap();
        assert_eq!(written, 9);

        let rows = read_clean(&path).unwrap();
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[3].label, "Fist");
        assert_eq!(rows[3].session, 1);

        let regrouped = into_sessions(rows);
        assert_eq!(regrouped, sessions);
    }

    #[test]
    fn test_missing_values_written_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emg_clean.csv");
        let mut s = session("Fist", 0, 1);
        s.rows[0].channels[2] = f64::NAN;

        write_clean(&path, &[s]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("t0,0,0,,0,0,0,0,0,Fist,0"));

        let rows = read_clean(&path).unwrap();
        assert!(rows[0].sample.channels[2].is_nan());
    }

    #[test]
    fn test_read_clean_requires_session_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emg_clean.csv");
        std::fs::write(
            &path,
            "Timestamp,Pod1,Pod2,Pod3,Pod4,Pod5,Pod6,Pod7,Pod8,Label\nt,1,1,1,1,1,1,1,1,Fist\n",
        )
        .unwrap();

        match read_clean(&path) {
            Err(LoadError::MissingColumns { columns, .. }) => {
                assert_eq!(columns, vec![SESSION_COLUMN.to_string()]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_clean_row_reports_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emg_clean.csv");
        std::fs::write(
            &path,
            "Timestamp,Pod1,Pod2,Pod3,Pod4,Pod5,Pod6,Pod7,Pod8,Label,Session\n\
             t0,1,1,1,1,1,1,1,1,Fist,0\n\
             t1,1,1,1\n",
        )
        .unwrap();

        match read_clean(&path) {
            Err(LoadError::InvalidSession { row, value, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(value, "");
            }
            other => panic!("expected InvalidSession, got {other:?}"),
        }
    }
}
