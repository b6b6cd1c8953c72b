// properties.rs — Graph property store and inference entry points
//
// `GraphProperties` runs static inference (symbolic propagation) or dynamic
// inference (one execution on a cluster) over an Item and answers
// per-node queries for input and output properties in slot order.
//
// Preconditions: none; malformed items are reported as errors.
// Postconditions: after a successful call every node has properties
//   (static), or every node the cluster reported has properties (dynamic).
//   Unknown names always yield empty slices.
// Failure modes: see `InferenceError`; a failed call leaves the store empty.
// Side effects: `infer_dynamically` runs the cluster once.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::Serialize;
use tracing::info;

use crate::diag::{codes, Diagnostic};
use crate::dynamic::Cluster;
use crate::error::InferenceError;
use crate::frame::FrameIndex;
use crate::graph_index::GraphIndex;
use crate::item::Item;
use crate::propagate::Propagator;
use crate::registry::Registry;
use crate::resource::ResourceIndex;
use crate::types::TensorProperties;

// ── Configuration ───────────────────────────────────────────────────────────

pub const DEFAULT_MAX_PASSES: usize = 64;

/// What to do with an op kind that has no registered rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownOpPolicy {
    /// Fully unknown outputs plus a W0101 warning.
    #[default]
    Unknown,
    /// Fail the call.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceOptions {
    /// Upper bound on propagation passes. Reaching it is not an error.
    pub max_passes: usize,
    pub unknown_ops: UnknownOpPolicy,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        InferenceOptions {
            max_passes: DEFAULT_MAX_PASSES,
            unknown_ops: UnknownOpPolicy::default(),
        }
    }
}

// ── Reports ─────────────────────────────────────────────────────────────────

/// Serializable view of one node's properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
    pub inputs: Vec<TensorProperties>,
    pub outputs: Vec<TensorProperties>,
}

#[derive(Debug, Clone, Default)]
struct NodeProperties {
    inputs: Vec<TensorProperties>,
    outputs: Vec<TensorProperties>,
}

// ── Store ───────────────────────────────────────────────────────────────────

pub struct GraphProperties<'a> {
    item: &'a Item,
    registry: &'a Registry,
    options: InferenceOptions,
    nodes: HashMap<String, NodeProperties>,
    frames: HashMap<String, String>,
    diagnostics: Vec<Diagnostic>,
    passes: usize,
    converged: bool,
}

impl<'a> GraphProperties<'a> {
    /// Store over `item` using the standard rule registry.
    pub fn new(item: &'a Item) -> Self {
        Self::with_options(item, Registry::shared_standard(), InferenceOptions::default())
    }

    pub fn with_options(item: &'a Item, registry: &'a Registry, options: InferenceOptions) -> Self {
        GraphProperties {
            item,
            registry,
            options,
            nodes: HashMap::new(),
            frames: HashMap::new(),
            diagnostics: Vec::new(),
            passes: 0,
            converged: false,
        }
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.frames.clear();
        self.diagnostics.clear();
        self.passes = 0;
        self.converged = false;
    }

    /// Infer properties without executing the graph.
    pub fn infer_statically(&mut self) -> Result<(), InferenceError> {
        self.reset();
        let item = self.item;
        let graph = GraphIndex::build(item)?;
        let resources = ResourceIndex::build(&graph);
        let order = graph.evaluation_order(&resources.soft_edges())?;
        let frames = FrameIndex::build(&graph, &order)?;
        let result =
            Propagator::new(&graph, &resources, self.registry, &self.options, &order).run()?;

        for (i, node) in item.nodes.iter().enumerate() {
            self.nodes.insert(
                node.name.clone(),
                NodeProperties {
                    inputs: result.inputs[i].clone(),
                    outputs: result.outputs[i].clone(),
                },
            );
            if let Some(frame) = frames.frame_of(i) {
                self.frames.insert(node.name.clone(), frame.name.clone());
            }
        }
        self.diagnostics = result.diagnostics;
        self.passes = result.passes;
        self.converged = result.converged;
        info!(
            item = %item.id,
            nodes = item.nodes.len(),
            frames = frames.frames().len(),
            passes = self.passes,
            converged = self.converged,
            "static inference finished"
        );
        Ok(())
    }

    /// Infer properties by running the item once on `cluster`, which must
    /// have been initialized with this item.
    pub fn infer_dynamically(&mut self, cluster: &mut dyn Cluster) -> Result<(), InferenceError> {
        self.reset();
        let item = self.item;
        if cluster.initialized_fingerprint() != Some(item.fingerprint()) {
            return Err(InferenceError::ClusterNotInitialized {
                item: item.id.clone(),
            });
        }
        let graph = GraphIndex::build(item)?;
        let trace = cluster.run(item)?;

        let observed: Vec<Option<&[TensorProperties]>> = item
            .nodes
            .iter()
            .map(|n| trace.node(&n.name).map(|t| t.outputs.as_slice()))
            .collect();

        for (i, node) in item.nodes.iter().enumerate() {
            let Some(outputs) = observed[i] else {
                self.diagnostics.push(
                    Diagnostic::warning(codes::W0301, "node did not appear in the execution trace")
                        .with_node(&node.name),
                );
                continue;
            };
            let inputs = graph
                .data_inputs(i)
                .iter()
                .map(|e| {
                    observed[e.producer]
                        .and_then(|o| o.get(e.slot))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect();
            self.nodes.insert(
                node.name.clone(),
                NodeProperties {
                    inputs,
                    outputs: outputs.to_vec(),
                },
            );
        }
        self.converged = true;
        info!(
            item = %item.id,
            nodes = item.nodes.len(),
            observed = self.nodes.len(),
            "dynamic inference finished"
        );
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Properties of a node's data inputs in input order; empty for
    /// unknown names.
    pub fn input_properties(&self, name: &str) -> &[TensorProperties] {
        self.nodes.get(name).map(|n| n.inputs.as_slice()).unwrap_or(&[])
    }

    /// Properties of a node's outputs in slot order; empty for unknown
    /// names.
    pub fn output_properties(&self, name: &str) -> &[TensorProperties] {
        self.nodes.get(name).map(|n| n.outputs.as_slice()).unwrap_or(&[])
    }

    pub fn has_properties(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Names of nodes with properties, sorted.
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Loop frame a node was assigned to by static inference.
    pub fn frame_of(&self, name: &str) -> Option<&str> {
        self.frames.get(name).map(String::as_str)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn item(&self) -> &'a Item {
        self.item
    }

    /// Per-node reports in item order, restricted to `names` when given.
    pub fn report(&self, names: &[String]) -> Vec<NodeReport> {
        self.item
            .nodes
            .iter()
            .filter(|n| names.is_empty() || names.contains(&n.name))
            .filter_map(|n| {
                let props = self.nodes.get(&n.name)?;
                Some(NodeReport {
                    name: n.name.clone(),
                    op: n.op.clone(),
                    frame: self.frames.get(&n.name).cloned(),
                    inputs: props.inputs.clone(),
                    outputs: props.outputs.clone(),
                })
            })
            .collect()
    }

    /// Deterministic, name-sorted rendering of every node's properties.
    pub fn snapshot(&self) -> String {
        let mut out = String::new();
        for name in self.node_names() {
            let op = self.item.node(name).map_or("?", |n| n.op.as_str());
            let _ = writeln!(out, "{} [{}]", name, op);
            let inputs = self.input_properties(name);
            if !inputs.is_empty() {
                let _ = writeln!(out, "  in:  {}", join_props(inputs));
            }
            let outputs = self.output_properties(name);
            if !outputs.is_empty() {
                let _ = writeln!(out, "  out: {}", join_props(outputs));
            }
        }
        out
    }
}

fn join_props(props: &[TensorProperties]) -> String {
    props
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
