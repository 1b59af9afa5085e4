//! Input and intermediate data files.
//!
//! This module contains:
//! - Sample types for armband frames
//! - Discovery and loading of `<Label>_RAW.csv` logs
//! - The consolidated `emg_clean.csv` session file

pub mod clean;
pub mod loader;
pub mod types;

// Re-export commonly used types
pub use clean::{into_sessions, read_clean, write_clean};
pub use loader::{discover_raw_files, label_from_path, load_raw_dir, load_raw_file, LoadError};
pub use types::{LabeledSample, RawSample, SessionSample, CHANNEL_COUNT};
