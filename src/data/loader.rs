//! Discovery and loading of per-gesture raw logs.
//!
//! Each gesture is recorded into its own `<Label>_RAW.csv` file with a
//! `Timestamp` column and one column per pod (`Pod1`..`Pod8`).

use crate::data::types::{
    channel_columns, coerce_numeric, LabeledSample, RawSample, CHANNEL_COUNT, TIMESTAMP_COLUMN,
};
use csv::{ByteRecord, Reader, ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Suffix that marks a raw gesture log.
pub const RAW_FILE_SUFFIX: &str = "_RAW";

/// Errors raised while loading session logs.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Missing columns in {path:?}: {columns:?}")]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    #[error("No *_RAW.csv files found in {0:?}")]
    NoInputFiles(PathBuf),

    #[error("Invalid session index {value:?} in {path:?} (row {row})")]
    InvalidSession {
        path: PathBuf,
        row: usize,
        value: String,
    },
}

/// Positions of the required columns inside a header row.
#[derive(Debug, Clone)]
pub(crate) struct ColumnIndex {
    pub timestamp: usize,
    pub channels: [usize; CHANNEL_COUNT],
    pub extra: Vec<usize>,
}

impl ColumnIndex {
    /// Resolve `Timestamp`, `Pod1..Pod8` and any `extra` columns.
    ///
    /// All absent names are reported at once.
    pub fn resolve(
        headers: &StringRecord,
        extra: &[&str],
        path: &Path,
    ) -> Result<Self, LoadError> {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let mut missing = Vec::new();
        let timestamp = find(TIMESTAMP_COLUMN);
        if timestamp.is_none() {
            missing.push(TIMESTAMP_COLUMN.to_string());
        }

        let mut channels = [0usize; CHANNEL_COUNT];
        for (slot, name) in channels.iter_mut().zip(channel_columns()) {
            match find(&name) {
                Some(idx) => *slot = idx,
                None => missing.push(name),
            }
        }

        let mut extra_idx = Vec::with_capacity(extra.len());
        for name in extra {
            match find(name) {
                Some(idx) => extra_idx.push(idx),
                None => missing.push(name.to_string()),
            }
        }

        match timestamp {
            Some(timestamp) if missing.is_empty() => Ok(Self {
                timestamp,
                channels,
                extra: extra_idx,
            }),
            _ => Err(LoadError::MissingColumns {
                path: path.to_path_buf(),
                columns: missing,
            }),
        }
    }

    /// Build a sample from a record. Absent, non-UTF-8 and non-numeric
    /// channel cells become `NaN`.
    pub fn sample(&self, record: &ByteRecord) -> RawSample {
        let mut channels = [f64::NAN; CHANNEL_COUNT];
        for (value, &idx) in channels.iter_mut().zip(self.channels.iter()) {
            *value = cell(record, idx).map(coerce_numeric).unwrap_or(f64::NAN);
        }
        let timestamp = record
            .get(self.timestamp)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        RawSample::new(timestamp, channels)
    }

    /// Whether a record is missing any required or extra column.
    pub fn is_short(&self, record: &ByteRecord) -> bool {
        let needed = self
            .channels
            .iter()
            .chain(self.extra.iter())
            .chain(std::iter::once(&self.timestamp))
            .copied()
            .max()
            .unwrap_or(0);
        record.len() <= needed
    }
}

/// A cell as text; `None` when absent or not valid UTF-8.
pub(crate) fn cell(record: &ByteRecord, idx: usize) -> Option<&str> {
    record.get(idx).and_then(|b| std::str::from_utf8(b).ok())
}

/// Open a CSV that tolerates rows of uneven length.
pub(crate) fn open_reader(path: &Path) -> Result<Reader<File>, LoadError> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_path(path)
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

/// Derive the gesture label from a raw log path (`Fist_RAW.csv` -> `Fist`).
pub fn label_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let label = stem.strip_suffix(RAW_FILE_SUFFIX)?;
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

/// Find all raw logs in a directory, sorted by label.
pub fn discover_raw_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, LoadError> {
    let entries = std::fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<(String, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "csv").unwrap_or(false))
        .filter_map(|p| label_from_path(&p).map(|label| (label, p)))
        .collect();

    if files.is_empty() {
        return Err(LoadError::NoInputFiles(dir.to_path_buf()));
    }

    files.sort();
    Ok(files)
}

/// Load one raw log. Fails if any required column is absent.
pub fn load_raw_file(path: &Path) -> Result<Vec<RawSample>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(csv_err)?.clone();
    let columns = ColumnIndex::resolve(&headers, &[], path)?;

    let mut samples = Vec::new();
    let mut rows_with_missing = 0usize;
    let mut short_rows = 0usize;
    for result in reader.byte_records() {
        let record = result.map_err(csv_err)?;
        if columns.is_short(&record) {
            short_rows += 1;
        }
        let sample = columns.sample(&record);
        if sample.has_missing() {
            rows_with_missing += 1;
        }
        samples.push(sample);
    }

    if rows_with_missing > 0 {
        warn!(
            "{:?}: {} rows had missing or non-numeric channel values ({} truncated), stored as missing",
            path, rows_with_missing, short_rows
        );
    }
    debug!("Loaded {} rows from {:?}", samples.len(), path);

    Ok(samples)
}

/// Load every raw log of a directory into one labeled sequence.
///
/// Rows are grouped by label (sorted) and keep their file order.
pub fn load_raw_dir(dir: &Path) -> Result<Vec<LabeledSample>, LoadError> {
    let files = discover_raw_files(dir)?;
    let mut all = Vec::new();

    for (label, path) in files {
        let samples = load_raw_file(&path)?;
        info!("{}: {} rows from {:?}", label, samples.len(), path);
        all.extend(samples.into_iter().map(|sample| LabeledSample {
            label: label.clone(),
            sample,
        }));
    }

    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    const HEADER: &str = "Timestamp,Pod1,Pod2,Pod3,Pod4,Pod5,Pod6,Pod7,Pod8\n";

    #[test]
    fn test_label_from_path() {
        assert_eq!(
            label_from_path(Path::new("/tmp/Fist_RAW.csv")),
            Some("Fist".to_string())
        );
        assert_eq!(label_from_path(Path::new("emg_clean.csv")), None);
        assert_eq!(label_from_path(Path::new("_RAW.csv")), None);
    }

    #[test]
    fn test_load_raw_file_coerces_bad_cells() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!("{HEADER}t0,1,2,3,4,5,6,7,8\nt1,x,2,3,4,5,6,7,\n");
        let path = write_file(dir.path(), "Fist_RAW.csv", &content);

        let samples = load_raw_file(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].channels[7], 8.0);
        assert!(samples[1].channels[0].is_nan());
        assert!(samples[1].channels[7].is_nan());
        assert_eq!(samples[1].timestamp, "t1");
    }

    #[test]
    fn test_truncated_row_becomes_missing() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!("{HEADER}t0,1,2,3,4,5,6,7,8\nt1,1,2,3\n");
        let path = write_file(dir.path(), "Fist_RAW.csv", &content);

        let samples = load_raw_file(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].channels[2], 3.0);
        assert!(samples[1].channels[3..].iter().all(|v| v.is_nan()));
        assert_eq!(samples[1].timestamp, "t1");
    }

    #[test]
    fn test_non_utf8_cell_becomes_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Fist_RAW.csv");
        let mut content = format!("{HEADER}t0,").into_bytes();
        content.extend_from_slice(&[0xff, 0xfe]);
        content.extend_from_slice(b",2,3,4,5,6,7,8\n");
        std::fs::write(&path, content).unwrap();

        let samples = load_raw_file(&path).unwrap();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].channels[0].is_nan());
        assert_eq!(samples[0].channels[1], 2.0);
    }

    #[test]
    fn test_missing_columns_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "Fist_RAW.csv",
            "Timestamp,Pod1,Pod2,Pod3,Pod4,Pod5,Pod6\nt0,1,2,3,4,5,6\n",
        );

        match load_raw_file(&path) {
            Err(LoadError::MissingColumns { columns, .. }) => {
                assert_eq!(columns, vec!["Pod7".to_string(), "Pod8".to_string()]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "Rest_RAW.csv", HEADER);
        write_file(dir.path(), "Fist_RAW.csv", HEADER);
        write_file(dir.path(), "emg_clean.csv", HEADER);
        write_file(dir.path(), "notes.txt", "x");

        let files = discover_raw_files(dir.path()).unwrap();
        let labels: Vec<&str> = files.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["Fist", "Rest"]);
    }

    #[test]
    fn test_discover_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_raw_files(dir.path()),
            Err(LoadError::NoInputFiles(_))
        ));
    }

    #[test]
    fn test_load_raw_dir_labels_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "Pinch_RAW.csv",
            &format!("{HEADER}t0,1,1,1,1,1,1,1,1\n"),
        );
        write_file(
            dir.path(),
            "Fist_RAW.csv",
            &format!("{HEADER}t0,2,2,2,2,2,2,2,2\nt1,3,3,3,3,3,3,3,3\n"),
        );

        let rows = load_raw_dir(dir.path()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].label, "Fist");
        assert_eq!(rows[1].label, "Fist");
        assert_eq!(rows[2].label, "Pinch");
    }
}
