// resource.rs — Queue and variable resources
//
// Indexes the shared mutable state of a graph: queues with their enqueue and
// dequeue sites, and resource-variable handles. Handles are resolved by
// walking back through pass-through nodes (frame transfers, identities,
// switches, merges) to the node that created the resource.
//
// Queue joins use the informative-set rule: every enqueued component and the
// queue's declared component shape contribute, unknown-rank contributors are
// ignored, and the result is the join of the rest.
//
// Preconditions: `graph` passed GraphIndex validation.
// Postconditions: `soft_edges()` orders every enqueue before every dequeue of
//   the same queue.
// Failure modes: none at index time; dtype disagreement surfaces from
//   `join_component`.
// Side effects: none.

use std::collections::HashMap;

use crate::graph_index::{DataEdge, GraphIndex};
use crate::lattice::{self, DtypeConflict};
use crate::types::{DataType, Dim, Shape, TensorProperties};

// ── Op kinds ────────────────────────────────────────────────────────────────

const QUEUE_KINDS: &[&str] = &[
    "FIFOQueue",
    "RandomShuffleQueue",
    "PaddingFIFOQueue",
    "PriorityQueue",
];

const PASS_THROUGH: &[&str] = &[
    "Identity",
    "RefIdentity",
    "Enter",
    "RefEnter",
    "Exit",
    "RefExit",
    "Switch",
    "RefSwitch",
    "Merge",
    "RefMerge",
    "NextIteration",
    "RefNextIteration",
];

/// Queue creation op; `Some(true)` for the V2 (resource handle) form.
pub fn queue_version(op: &str) -> Option<bool> {
    let (base, v2) = match op.strip_suffix("V2") {
        Some(base) => (base, true),
        None => (op, false),
    };
    QUEUE_KINDS.contains(&base).then_some(v2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOp {
    Enqueue,
    EnqueueMany,
    Dequeue,
    DequeueMany,
    DequeueUpTo,
    Size,
    Close,
}

impl QueueOp {
    pub fn of(op: &str) -> Option<QueueOp> {
        let base = op.strip_suffix("V2").unwrap_or(op);
        Some(match base {
            "QueueEnqueue" => QueueOp::Enqueue,
            "QueueEnqueueMany" => QueueOp::EnqueueMany,
            "QueueDequeue" => QueueOp::Dequeue,
            "QueueDequeueMany" => QueueOp::DequeueMany,
            "QueueDequeueUpTo" => QueueOp::DequeueUpTo,
            "QueueSize" => QueueOp::Size,
            "QueueClose" => QueueOp::Close,
            _ => return None,
        })
    }

    pub fn is_enqueue(self) -> bool {
        matches!(self, QueueOp::Enqueue | QueueOp::EnqueueMany)
    }

    pub fn is_dequeue(self) -> bool {
        matches!(
            self,
            QueueOp::Dequeue | QueueOp::DequeueMany | QueueOp::DequeueUpTo
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableOp {
    /// `Variable` / `VariableV2`: reference-typed storage.
    RefVariable,
    VarHandle,
    Read,
    /// `Assign`, `AssignAdd`, `AssignSub`: forward input 0.
    Assign,
    /// `AssignVariableOp` and friends: no outputs.
    AssignHandle,
}

impl VariableOp {
    pub fn of(op: &str) -> Option<VariableOp> {
        Some(match op {
            "Variable" | "VariableV2" => VariableOp::RefVariable,
            "VarHandleOp" => VariableOp::VarHandle,
            "ReadVariableOp" => VariableOp::Read,
            "Assign" | "AssignAdd" | "AssignSub" => VariableOp::Assign,
            "AssignVariableOp" | "AssignAddVariableOp" | "AssignSubVariableOp" => {
                VariableOp::AssignHandle
            }
            _ => return None,
        })
    }
}

// ── Index ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub node: usize,
    pub v2: bool,
    pub component_types: Vec<DataType>,
    /// Declared component shapes; empty when the queue declares none.
    pub shapes: Vec<Shape>,
    pub enqueues: Vec<usize>,
    pub dequeues: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct ResourceIndex {
    queues: Vec<QueueInfo>,
    queue_by_node: HashMap<usize, usize>,
    /// Resource node each handle-consuming node resolves to.
    handle_target: HashMap<usize, usize>,
}

/// Walk back from a handle input to the node that created it.
pub fn resolve_handle(graph: &GraphIndex<'_>, edge: DataEdge) -> Option<usize> {
    let mut node = edge.producer;
    let mut visited = vec![false; graph.len()];
    loop {
        if visited[node] {
            return None;
        }
        visited[node] = true;
        if !PASS_THROUGH.contains(&graph.node(node).op.as_str()) {
            return Some(node);
        }
        node = graph
            .data_inputs(node)
            .iter()
            .map(|e| e.producer)
            .find(|&p| !visited[p])?;
    }
}

impl ResourceIndex {
    pub fn build(graph: &GraphIndex<'_>) -> Self {
        let mut index = ResourceIndex::default();
        for i in 0..graph.len() {
            let node = graph.node(i);
            if let Some(v2) = queue_version(&node.op) {
                index.queue_by_node.insert(i, index.queues.len());
                index.queues.push(QueueInfo {
                    node: i,
                    v2,
                    component_types: node
                        .attr_type_list("component_types")
                        .map(<[DataType]>::to_vec)
                        .unwrap_or_default(),
                    shapes: node
                        .attr_shape_list("shapes")
                        .map(<[Shape]>::to_vec)
                        .unwrap_or_default(),
                    enqueues: Vec::new(),
                    dequeues: Vec::new(),
                });
            }
        }

        for i in 0..graph.len() {
            let op = &graph.node(i).op;
            let uses_handle = QueueOp::of(op).is_some()
                || matches!(
                    VariableOp::of(op),
                    Some(VariableOp::Read | VariableOp::AssignHandle)
                );
            if !uses_handle {
                continue;
            }
            let Some(&handle) = graph.data_inputs(i).first() else {
                continue;
            };
            let Some(target) = resolve_handle(graph, handle) else {
                continue;
            };
            index.handle_target.insert(i, target);
            if let (Some(kind), Some(&q)) = (QueueOp::of(op), index.queue_by_node.get(&target)) {
                if kind.is_enqueue() {
                    index.queues[q].enqueues.push(i);
                } else if kind.is_dequeue() {
                    index.queues[q].dequeues.push(i);
                }
            }
        }
        index
    }

    /// Queue a handle-consuming node operates on.
    pub fn queue_for(&self, node: usize) -> Option<&QueueInfo> {
        let target = self.handle_target.get(&node)?;
        self.queue_by_node.get(target).map(|&q| &self.queues[q])
    }

    /// Resource node a handle-consuming node resolves to.
    pub fn handle_target(&self, node: usize) -> Option<usize> {
        self.handle_target.get(&node).copied()
    }

    /// Enqueue → dequeue ordering edges for every queue.
    pub fn soft_edges(&self) -> Vec<(usize, usize)> {
        self.queues
            .iter()
            .flat_map(|q| {
                q.enqueues
                    .iter()
                    .flat_map(move |&e| q.dequeues.iter().map(move |&d| (e, d)))
            })
            .collect()
    }
}

// ── Joins ───────────────────────────────────────────────────────────────────

/// Handle output of a queue creation op.
pub fn queue_handle(v2: bool) -> TensorProperties {
    if v2 {
        TensorProperties::new(DataType::RESOURCE, Shape::scalar())
    } else {
        TensorProperties::new(DataType::STRING.to_ref(), Shape::known(&[2]))
    }
}

/// Element shape of one component enqueued by `QueueEnqueueMany`.
pub fn strip_batch(shape: &Shape) -> Shape {
    match shape.dims() {
        Some([_, rest @ ..]) => Shape::Ranked(rest.to_vec()),
        _ => Shape::UnknownRank,
    }
}

/// Batched dequeue result.
pub fn prepend_batch(shape: &Shape, batch: Dim) -> Shape {
    match shape.dims() {
        Some(dims) => {
            let mut out = Vec::with_capacity(dims.len() + 1);
            out.push(batch);
            out.extend_from_slice(dims);
            Shape::Ranked(out)
        }
        None => Shape::UnknownRank,
    }
}

/// Informative-set join for one queue component.
pub fn join_component(
    declared_type: DataType,
    declared_shape: Option<&Shape>,
    enqueued: &[TensorProperties],
) -> Result<TensorProperties, DtypeConflict> {
    let declared = declared_shape.map(|s| TensorProperties::new(declared_type, s.clone()));
    let mut joined = lattice::join_informative(declared.iter().chain(enqueued))?;
    joined.dtype = declared_type.agree(joined.dtype)?;
    Ok(joined)
}
