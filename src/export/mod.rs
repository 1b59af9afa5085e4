//! Classifier export to ONNX.
//!
//! This module contains:
//! - The protobuf message subset of the ONNX format
//! - Graph assembly, the structural checker and the operator allow-set
//! - A reference evaluator for round-trip checks
//! - The exporter with its linear fallback policy

pub mod exporter;
pub mod graph;
pub mod onnx;
pub mod runtime;

use thiserror::Error;

// Re-export commonly used types
pub use exporter::{ExportOutcome, Exporter, ValidatedGraph};
pub use graph::{build_model, check_structure, AllowSet};
pub use runtime::GraphRuntime;

/// Export and validation errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Model has no IR version")]
    MissingIrVersion,

    #[error("Model imports no default-domain opset")]
    MissingOpset,

    #[error("Model has no graph")]
    MissingGraph,

    #[error("Node {node} reads undefined value {input}")]
    DanglingInput { node: String, input: String },

    #[error("Value {0} is defined more than once")]
    DuplicateValue(String),

    #[error("Graph output {0} is never produced")]
    MissingOutput(String),

    #[error("Initializer {name} declares {expected} elements but holds {actual}")]
    InitializerSize {
        name: String,
        expected: i64,
        actual: usize,
    },

    #[error("{name} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<i64>,
        actual: Vec<i64>,
    },

    #[error("Bad graph interface: {0}")]
    Interface(String),

    #[error("Operators outside the allow-set: {}", .0.join(", "))]
    UnsupportedOps(Vec<String>),

    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    #[error("Primary graph failed ({primary}) and fallback graph failed ({fallback})")]
    BothFailed {
        primary: Box<ExportError>,
        fallback: Box<ExportError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
