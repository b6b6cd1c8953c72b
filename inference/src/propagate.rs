// propagate.rs — Fixed-point shape and dtype propagation
//
// Abstract interpretation over the graph. Every output slot starts
// unevaluated; each pass visits the nodes in evaluation order, computes new
// output properties from the current input properties, and stores the join
// of old and new. Entries therefore only ever widen, and since the lattice
// has finite height per slot the passes reach a fixed point.
//
// Evaluation is strict: a node with an unevaluated data input is skipped for
// the pass. Merge is the exception and joins whatever inputs are evaluated,
// which is what lets loop-carried values start from the Enter side.
//
// Preconditions: `order` comes from `GraphIndex::evaluation_order` with the
//   resource index's soft edges; frame structure has been validated.
// Postconditions: a `Propagation` holding input and output properties for
//   every node, plus non-fatal diagnostics.
// Failure modes: a shape-rule rejection or dtype conflict still present in
//   the final pass; an unregistered op under `UnknownOpPolicy::Reject`; a
//   consumer reading an output slot its producer does not have.
// Side effects: none (the item is never mutated).

use tracing::{debug, trace, warn};

use crate::diag::{codes, Diagnostic};
use crate::error::{GraphDefect, InferenceError};
use crate::graph_index::{DataEdge, GraphIndex, OpRole};
use crate::item::{Node, TensorValue};
use crate::lattice::{join_in_band, DtypeConflict};
use crate::properties::{InferenceOptions, UnknownOpPolicy};
use crate::registry::{InferenceContext, Registry};
use crate::resource::{self, QueueOp, ResourceIndex, VariableOp};
use crate::types::{DataType, Dim, Shape, TensorProperties};

/// Constant forwarding through identities stops after this many hops.
const MAX_CONSTANT_HOPS: usize = 16;

/// Result of a completed propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Propagation {
    pub inputs: Vec<Vec<TensorProperties>>,
    pub outputs: Vec<Vec<TensorProperties>>,
    pub passes: usize,
    pub converged: bool,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Propagator<'g, 'a> {
    graph: &'g GraphIndex<'a>,
    resources: &'g ResourceIndex,
    registry: &'g Registry,
    options: &'g InferenceOptions,
    order: &'g [usize],
    table: Vec<Option<Vec<TensorProperties>>>,
    warned: Vec<bool>,
    diagnostics: Vec<Diagnostic>,
}

fn shape_rule_error(node: &Node, message: impl Into<String>) -> InferenceError {
    InferenceError::ShapeRule {
        op: node.op.clone(),
        node: node.name.clone(),
        message: message.into(),
    }
}

fn dtype_error(node: &Node, conflict: DtypeConflict) -> InferenceError {
    InferenceError::DtypeConflict {
        op: node.op.clone(),
        node: node.name.clone(),
        message: conflict.to_string(),
    }
}

/// Rejections that may disappear once inputs widen in a later pass.
fn is_provisional(err: &InferenceError) -> bool {
    matches!(
        err,
        InferenceError::ShapeRule { .. } | InferenceError::DtypeConflict { .. }
    )
}

impl<'g, 'a> Propagator<'g, 'a> {
    pub fn new(
        graph: &'g GraphIndex<'a>,
        resources: &'g ResourceIndex,
        registry: &'g Registry,
        options: &'g InferenceOptions,
        order: &'g [usize],
    ) -> Self {
        Propagator {
            graph,
            resources,
            registry,
            options,
            order,
            table: vec![None; graph.len()],
            warned: vec![false; graph.len()],
            diagnostics: Vec::new(),
        }
    }

    pub fn run(mut self) -> Result<Propagation, InferenceError> {
        let max_passes = self.options.max_passes.max(1);
        let mut passes = 0;
        let mut converged = false;
        let mut rejection = None;

        while passes < max_passes {
            passes += 1;
            rejection = None;
            let mut changed = 0;
            for &i in self.order {
                match self.visit(i) {
                    Ok(n) => changed += n,
                    Err(err) if is_provisional(&err) => {
                        trace!(node = %self.graph.node(i).name, error = %err, "provisional rejection");
                        if rejection.is_none() {
                            rejection = Some(err);
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
            debug!(pass = passes, changed, "propagation pass");
            if changed == 0 {
                converged = true;
                break;
            }
        }

        if let Some(err) = rejection {
            return Err(err);
        }
        if !converged {
            warn!(passes, "pass cap reached before a fixed point");
            self.diagnostics.push(
                Diagnostic::warning(
                    codes::W0201,
                    format!("no fixed point after {} passes; results are partial", passes),
                )
                .with_hint("raise InferenceOptions::max_passes"),
            );
        }
        self.check_slots()?;
        Ok(self.publish(passes, converged))
    }

    // ── Table access ────────────────────────────────────────────────────

    fn slot(&self, edge: DataEdge) -> Option<&TensorProperties> {
        self.table[edge.producer].as_ref()?.get(edge.slot)
    }

    fn visit(&mut self, i: usize) -> Result<usize, InferenceError> {
        let Some(outputs) = self.evaluate(i)? else {
            return Ok(0);
        };
        self.store(i, outputs)
    }

    /// Monotone update: each slot becomes `join(old, new)`. Either every
    /// slot is updated or none is.
    fn store(&mut self, i: usize, outputs: Vec<TensorProperties>) -> Result<usize, InferenceError> {
        let node = self.graph.node(i);
        let Some(old) = &self.table[i] else {
            trace!(node = %node.name, outputs = outputs.len(), "first evaluation");
            self.table[i] = Some(outputs);
            return Ok(1);
        };

        let mut merged = old.clone();
        let mut changed = 0;
        for (s, new) in outputs.into_iter().enumerate() {
            match merged.get(s) {
                None => {
                    merged.push(new);
                    changed += 1;
                }
                Some(prev) => {
                    let joined = prev.join(&new).map_err(|e| dtype_error(node, e))?;
                    if &joined != prev {
                        trace!(node = %node.name, slot = s, from = %prev, to = %joined, "widened");
                        merged[s] = joined;
                        changed += 1;
                    }
                }
            }
        }
        self.table[i] = Some(merged);
        Ok(changed)
    }

    // ── Node evaluation ─────────────────────────────────────────────────

    /// New outputs for node `i`, or `None` when it cannot be evaluated yet.
    fn evaluate(&mut self, i: usize) -> Result<Option<Vec<TensorProperties>>, InferenceError> {
        let graph = self.graph;
        let node = graph.node(i);
        let edges = graph.data_inputs(i);
        let role = graph.role(i);

        if role == OpRole::Merge {
            let evaluated: Vec<&TensorProperties> =
                edges.iter().filter_map(|&e| self.slot(e)).collect();
            if evaluated.is_empty() {
                return Ok(None);
            }
            let joined = join_in_band(evaluated).map_err(|e| dtype_error(node, e))?;
            return Ok(Some(vec![
                joined,
                TensorProperties::new(DataType::INT32, Shape::scalar()),
            ]));
        }

        let Some(inputs) = edges
            .iter()
            .map(|&e| self.slot(e).cloned())
            .collect::<Option<Vec<_>>>()
        else {
            return Ok(None);
        };
        let first = inputs.first().cloned().unwrap_or_default();

        let outputs = match role {
            OpRole::Enter | OpRole::Exit | OpRole::NextIteration => vec![first],
            OpRole::Switch => vec![first.clone(), first],
            OpRole::LoopCond => {
                if first.dtype.is_valid() && first.dtype.base() != DataType::BOOL {
                    return Err(shape_rule_error(
                        node,
                        format!("loop condition must be bool, got {}", first.dtype),
                    ));
                }
                vec![TensorProperties::new(DataType::BOOL, first.shape)]
            }
            OpRole::Merge | OpRole::Other => match self.evaluate_resource(i, &inputs)? {
                Some(outputs) => outputs,
                None => self.evaluate_rule(i, &inputs)?,
            },
        };
        Ok(Some(outputs))
    }

    fn evaluate_resource(
        &self,
        i: usize,
        inputs: &[TensorProperties],
    ) -> Result<Option<Vec<TensorProperties>>, InferenceError> {
        let node = self.graph.node(i);
        if let Some(v2) = resource::queue_version(&node.op) {
            return Ok(Some(vec![resource::queue_handle(v2)]));
        }
        if let Some(kind) = QueueOp::of(&node.op) {
            return Ok(Some(match kind {
                QueueOp::Enqueue | QueueOp::EnqueueMany | QueueOp::Close => Vec::new(),
                QueueOp::Size => vec![TensorProperties::new(DataType::INT32, Shape::scalar())],
                QueueOp::Dequeue | QueueOp::DequeueMany | QueueOp::DequeueUpTo => {
                    self.dequeue(i, kind)?
                }
            }));
        }
        let Some(kind) = VariableOp::of(&node.op) else {
            return Ok(None);
        };
        let outputs = match kind {
            VariableOp::RefVariable => {
                let dtype = node
                    .attr_type("dtype")
                    .ok_or_else(|| shape_rule_error(node, "missing type attribute 'dtype'"))?;
                let shape = node.attr_shape("shape").cloned().unwrap_or_default();
                vec![TensorProperties::new(dtype.to_ref(), shape)]
            }
            VariableOp::VarHandle => {
                vec![TensorProperties::new(DataType::RESOURCE, Shape::scalar())]
            }
            VariableOp::Read => {
                let handle = self
                    .resources
                    .handle_target(i)
                    .map(|t| self.graph.node(t))
                    .filter(|t| VariableOp::of(&t.op) == Some(VariableOp::VarHandle));
                let props = match handle {
                    Some(h) => TensorProperties::new(
                        h.attr_type("dtype").unwrap_or_default(),
                        h.attr_shape("shape").cloned().unwrap_or_default(),
                    ),
                    None => TensorProperties::of_type(node.attr_type("dtype").unwrap_or_default()),
                };
                vec![props]
            }
            VariableOp::Assign => vec![inputs.first().cloned().unwrap_or_default()],
            VariableOp::AssignHandle => Vec::new(),
        };
        Ok(Some(outputs))
    }

    /// Per-component informative join over every enqueue on the queue plus
    /// its declared shapes.
    fn dequeue(&self, i: usize, kind: QueueOp) -> Result<Vec<TensorProperties>, InferenceError> {
        let graph = self.graph;
        let node = graph.node(i);
        let queue = self.resources.queue_for(i);
        let types: Vec<DataType> = node
            .attr_type_list("component_types")
            .map(<[DataType]>::to_vec)
            .or_else(|| queue.map(|q| q.component_types.clone()))
            .unwrap_or_default();

        let batch = match kind {
            QueueOp::DequeueMany => Some(
                graph
                    .data_inputs(i)
                    .get(1)
                    .and_then(|&e| self.constant_value(e))
                    .and_then(|t| t.int_values())
                    .and_then(|v| match v.as_slice() {
                        [n] => Dim::from_i64(*n),
                        _ => None,
                    })
                    .unwrap_or(Dim::Unknown),
            ),
            QueueOp::DequeueUpTo => Some(Dim::Unknown),
            _ => None,
        };

        let mut outputs = Vec::with_capacity(types.len());
        for (c, &dtype) in types.iter().enumerate() {
            let mut enqueued = Vec::new();
            for &e in queue.map(|q| q.enqueues.as_slice()).unwrap_or_default() {
                let Some(props) = graph
                    .data_inputs(e)
                    .get(c + 1)
                    .and_then(|&edge| self.slot(edge))
                else {
                    continue;
                };
                if QueueOp::of(&graph.node(e).op) == Some(QueueOp::EnqueueMany) {
                    enqueued.push(TensorProperties::new(
                        props.dtype,
                        resource::strip_batch(&props.shape),
                    ));
                } else {
                    enqueued.push(props.clone());
                }
            }
            let declared = queue.and_then(|q| q.shapes.get(c));
            let mut joined = resource::join_component(dtype, declared, &enqueued)
                .map_err(|e| dtype_error(node, e))?;
            if let Some(batch) = batch {
                joined.shape = resource::prepend_batch(&joined.shape, batch);
            }
            outputs.push(joined);
        }
        Ok(outputs)
    }

    fn evaluate_rule(
        &mut self,
        i: usize,
        inputs: &[TensorProperties],
    ) -> Result<Vec<TensorProperties>, InferenceError> {
        let node = self.graph.node(i);
        let Some(rule) = self.registry.lookup(&node.op) else {
            return match self.options.unknown_ops {
                UnknownOpPolicy::Reject => Err(InferenceError::UnregisteredOp {
                    op: node.op.clone(),
                    node: node.name.clone(),
                }),
                UnknownOpPolicy::Unknown => {
                    if !self.warned[i] {
                        self.warned[i] = true;
                        self.diagnostics.push(
                            Diagnostic::warning(
                                codes::W0101,
                                format!("no shape rule for op '{}'; outputs are unknown", node.op),
                            )
                            .with_node(&node.name),
                        );
                    }
                    let slots = self.graph.referenced_slots(i).max(1);
                    Ok(vec![TensorProperties::unknown(); slots])
                }
            };
        };

        let tensors: Vec<Option<TensorValue>> = self
            .graph
            .data_inputs(i)
            .iter()
            .map(|&e| self.constant_value(e))
            .collect();
        let mut ctx = InferenceContext::new(node, inputs, &tensors);
        rule.infer(&mut ctx)
            .map_err(|e| shape_rule_error(node, e.0))?;
        Ok(ctx.into_outputs())
    }

    /// Statically known value of a tensor: a `Const`, forwarded through
    /// identity-like nodes, or the `Shape` of a fully defined tensor.
    fn constant_value(&self, mut edge: DataEdge) -> Option<TensorValue> {
        for _ in 0..MAX_CONSTANT_HOPS {
            if edge.slot != 0 {
                return None;
            }
            let node = self.graph.node(edge.producer);
            match node.op.as_str() {
                "Const" => return node.attr_tensor("value").cloned(),
                "Identity" | "Snapshot" | "StopGradient" | "Enter" | "RefEnter" => {
                    edge = *self.graph.data_inputs(edge.producer).first()?;
                }
                "Shape" => {
                    let input = *self.graph.data_inputs(edge.producer).first()?;
                    let shape = &self.slot(input)?.shape;
                    if !shape.is_fully_defined() {
                        return None;
                    }
                    let dims = shape.to_i64s()?;
                    let dtype = node.attr_type("out_type").unwrap_or(DataType::INT32);
                    let len = dims.len() as u64;
                    return Some(TensorValue::ints(dtype, Shape::known(&[len]), dims));
                }
                _ => return None,
            }
        }
        None
    }

    // ── Completion ──────────────────────────────────────────────────────

    fn check_slots(&self) -> Result<(), InferenceError> {
        for consumer in 0..self.graph.len() {
            for edge in self.graph.data_inputs(consumer) {
                let Some(outputs) = &self.table[edge.producer] else {
                    continue;
                };
                if edge.slot >= outputs.len() {
                    let producer = &self.graph.node(edge.producer).name;
                    let input = if edge.slot == 0 {
                        producer.clone()
                    } else {
                        format!("{}:{}", producer, edge.slot)
                    };
                    return Err(InferenceError::malformed(
                        &self.graph.node(consumer).name,
                        GraphDefect::SlotOutOfRange {
                            input,
                            slot: edge.slot,
                            available: outputs.len(),
                        },
                    ));
                }
            }
        }
        Ok(())
    }

    fn publish(self, passes: usize, converged: bool) -> Propagation {
        let graph = self.graph;
        let inputs = (0..graph.len())
            .map(|i| {
                graph
                    .data_inputs(i)
                    .iter()
                    .map(|&e| self.slot(e).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        let outputs = self
            .table
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry {
                Some(outputs) => outputs.clone(),
                None => vec![TensorProperties::unknown(); graph.referenced_slots(i).max(1)],
            })
            .collect();
        Propagation {
            inputs,
            outputs,
            passes,
            converged,
            diagnostics: self.diagnostics,
        }
    }
}
