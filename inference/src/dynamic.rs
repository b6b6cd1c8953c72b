// dynamic.rs — Dynamic-inference collaborator seam
//
// Dynamic inference runs the item once on an execution cluster and reads the
// properties of the tensors that were actually produced. The cluster itself
// is an external collaborator behind the `Cluster` trait; the in-tree
// implementation, `RecordedCluster`, replays a recorded step trace.
//
// Preconditions: `Cluster::initialize` was called with the same item that is
//   later passed to `run` (checked by fingerprint in properties.rs).
// Postconditions: a `StepTrace` lists, per executed node, the properties of
//   each output slot in index order.
// Failure modes: trace file unreadable or malformed; the cluster refusing to
//   run an item it was not initialized with.
// Side effects: `RecordedCluster::load` reads one file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::item::Item;
use crate::types::TensorProperties;

#[derive(Debug, Error)]
pub enum ClusterError {
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
    #[error("item '{item}' was not handed to initialize")]
    NotInitialized { item: String },
    #[error("execution failed: {0}")]
    Execution(String),
}

/// Properties observed for one executed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceNode {
    pub name: String,
    #[serde(default)]
    pub outputs: Vec<TensorProperties>,
}

/// Everything one step of execution produced. Nodes that did not run (or
/// that the cluster did not report) are simply absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepTrace {
    pub nodes: Vec<TraceNode>,
}

impl StepTrace {
    pub fn node(&self, name: &str) -> Option<&TraceNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

/// An execution environment able to run an item once.
pub trait Cluster {
    /// Place the item on the cluster. Must precede `run`.
    fn initialize(&mut self, item: &Item) -> Result<(), ClusterError>;

    /// Fingerprint of the item last handed to `initialize`, if any.
    fn initialized_fingerprint(&self) -> Option<[u8; 32]>;

    /// Execute the fetch nodes once and report the produced tensors.
    fn run(&mut self, item: &Item) -> Result<StepTrace, ClusterError>;
}

/// A cluster that answers from a previously recorded trace.
#[derive(Debug, Clone, Default)]
pub struct RecordedCluster {
    trace: StepTrace,
    initialized: Option<[u8; 32]>,
}

impl RecordedCluster {
    pub fn new(trace: StepTrace) -> Self {
        RecordedCluster {
            trace,
            initialized: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(RecordedCluster::new)
    }

    pub fn load(path: &Path) -> Result<Self, ClusterError> {
        let source = std::fs::read_to_string(path).map_err(|e| ClusterError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        RecordedCluster::from_json(&source).map_err(|e| ClusterError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn trace(&self) -> &StepTrace {
        &self.trace
    }
}

impl Cluster for RecordedCluster {
    fn initialize(&mut self, item: &Item) -> Result<(), ClusterError> {
        self.initialized = Some(item.fingerprint());
        Ok(())
    }

    fn initialized_fingerprint(&self) -> Option<[u8; 32]> {
        self.initialized
    }

    fn run(&mut self, item: &Item) -> Result<StepTrace, ClusterError> {
        if self.initialized != Some(item.fingerprint()) {
            return Err(ClusterError::NotInitialized {
                item: item.id.clone(),
            });
        }
        Ok(self.trace.clone())
    }
}
