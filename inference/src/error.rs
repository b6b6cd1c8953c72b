// error.rs — Fatal inference errors
//
// One enum for every condition that fails an inference call. Legitimate
// indeterminacy is never an error; it surfaces as unknown properties plus an
// optional warning diagnostic.

use std::path::PathBuf;

use thiserror::Error;

use crate::diag::{codes, DiagCode, DiagLevel, Diagnostic};
use crate::dynamic::ClusterError;

/// Structural defects found while indexing the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphDefect {
    #[error("input '{0}' refers to a node that does not exist")]
    DanglingInput(String),
    #[error("node name is defined more than once")]
    DuplicateName,
    #[error("node is on a cycle that is not closed by a NextIteration → Merge edge")]
    UnrecognizedCycle,
    #[error("{0}")]
    FrameStructure(String),
    #[error("fetch node does not exist")]
    MissingFetch,
    #[error("init node does not exist")]
    MissingInit,
    #[error("input '{input}' refers to output {slot}, but the producer has {available} output(s)")]
    SlotOutOfRange {
        input: String,
        slot: usize,
        available: usize,
    },
}

impl GraphDefect {
    pub fn code(&self) -> DiagCode {
        match self {
            GraphDefect::DanglingInput(_) => codes::E0101,
            GraphDefect::DuplicateName => codes::E0102,
            GraphDefect::UnrecognizedCycle => codes::E0103,
            GraphDefect::FrameStructure(_) => codes::E0104,
            GraphDefect::MissingFetch | GraphDefect::MissingInit => codes::E0105,
            GraphDefect::SlotOutOfRange { .. } => codes::E0106,
        }
    }
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("malformed graph at node '{node}': {defect}")]
    MalformedGraph { node: String, defect: GraphDefect },

    #[error("shape rule for '{op}' rejected node '{node}': {message}")]
    ShapeRule {
        op: String,
        node: String,
        message: String,
    },

    #[error("dtype conflict at node '{node}' ({op}): {message}")]
    DtypeConflict {
        op: String,
        node: String,
        message: String,
    },

    #[error("no shape rule registered for op '{op}' (node '{node}')")]
    UnregisteredOp { op: String, node: String },

    #[error("cluster was not initialized with item '{item}'")]
    ClusterNotInitialized { item: String },

    #[error("dynamic inference failed: {0}")]
    Cluster(#[from] ClusterError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl InferenceError {
    pub fn malformed(node: impl Into<String>, defect: GraphDefect) -> Self {
        InferenceError::MalformedGraph {
            node: node.into(),
            defect,
        }
    }

    pub fn code(&self) -> DiagCode {
        match self {
            InferenceError::MalformedGraph { defect, .. } => defect.code(),
            InferenceError::ShapeRule { .. } => codes::E0201,
            InferenceError::DtypeConflict { .. } => codes::E0202,
            InferenceError::UnregisteredOp { .. } => codes::E0203,
            InferenceError::ClusterNotInitialized { .. } => codes::E0301,
            InferenceError::Cluster(_) => codes::E0302,
            InferenceError::Io { .. } => codes::E0001,
            InferenceError::Json { .. } => codes::E0002,
        }
    }

    /// The node the error is attributed to, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            InferenceError::MalformedGraph { node, .. }
            | InferenceError::ShapeRule { node, .. }
            | InferenceError::DtypeConflict { node, .. }
            | InferenceError::UnregisteredOp { node, .. } => Some(node),
            _ => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::new(DiagLevel::Error, self.to_string()).with_code(self.code());
        match self.node() {
            Some(node) => diag.with_node(node),
            None => diag,
        }
    }
}
