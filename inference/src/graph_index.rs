// graph_index.rs — Name resolution, adjacency and evaluation order
//
// Resolves every input reference of an Item to a node index, validates the
// graph structure, and computes the order the propagator visits nodes in.
//
// Preconditions: none; the item may be arbitrarily malformed.
// Postconditions: on success every data and control input names an existing
//   node, names are unique, and fetch/init nodes exist.
// Failure modes: `InferenceError::MalformedGraph` for each structural defect;
//   `evaluation_order` fails on a cycle not closed by a NextIteration → Merge
//   edge or a deferrable resource edge.
// Side effects: none.

use std::collections::{BTreeSet, HashMap};

use crate::error::{GraphDefect, InferenceError};
use crate::item::{InputRef, Item, Node};

// ── Control-flow roles ──────────────────────────────────────────────────────

/// Role of an op kind in control flow. `Ref*` kinds share the role of their
/// value counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpRole {
    Enter,
    Merge,
    Switch,
    NextIteration,
    Exit,
    LoopCond,
    Other,
}

impl OpRole {
    pub fn of(op: &str) -> OpRole {
        match op {
            "Enter" | "RefEnter" => OpRole::Enter,
            "Merge" | "RefMerge" => OpRole::Merge,
            "Switch" | "RefSwitch" => OpRole::Switch,
            "NextIteration" | "RefNextIteration" => OpRole::NextIteration,
            "Exit" | "RefExit" => OpRole::Exit,
            "LoopCond" => OpRole::LoopCond,
            _ => OpRole::Other,
        }
    }
}

// ── Index ───────────────────────────────────────────────────────────────────

/// A resolved data input: producer node index and output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataEdge {
    pub producer: usize,
    pub slot: usize,
}

#[derive(Debug)]
pub struct GraphIndex<'a> {
    item: &'a Item,
    by_name: HashMap<&'a str, usize>,
    data_inputs: Vec<Vec<DataEdge>>,
    control_inputs: Vec<Vec<usize>>,
    /// Highest output slot any consumer references, per producer.
    referenced_slots: Vec<usize>,
}

impl<'a> GraphIndex<'a> {
    pub fn build(item: &'a Item) -> Result<Self, InferenceError> {
        let mut by_name = HashMap::with_capacity(item.nodes.len());
        for (i, node) in item.nodes.iter().enumerate() {
            if by_name.insert(node.name.as_str(), i).is_some() {
                return Err(InferenceError::malformed(
                    &node.name,
                    GraphDefect::DuplicateName,
                ));
            }
        }

        let mut data_inputs = Vec::with_capacity(item.nodes.len());
        let mut control_inputs = Vec::with_capacity(item.nodes.len());
        let mut referenced_slots = vec![0usize; item.nodes.len()];

        for node in &item.nodes {
            let mut data = Vec::new();
            let mut control = Vec::new();
            for input in &node.input {
                let target = match input {
                    InputRef::Data(t) => t.node.as_str(),
                    InputRef::Control(name) => name.as_str(),
                };
                let producer = *by_name.get(target).ok_or_else(|| {
                    InferenceError::malformed(
                        &node.name,
                        GraphDefect::DanglingInput(input.to_string()),
                    )
                })?;
                match input {
                    InputRef::Data(t) => {
                        referenced_slots[producer] = referenced_slots[producer].max(t.slot + 1);
                        data.push(DataEdge {
                            producer,
                            slot: t.slot,
                        });
                    }
                    InputRef::Control(_) => control.push(producer),
                }
            }
            data_inputs.push(data);
            control_inputs.push(control);
        }

        for name in &item.fetch {
            if !by_name.contains_key(name.as_str()) {
                return Err(InferenceError::malformed(name, GraphDefect::MissingFetch));
            }
        }
        for name in &item.init_ops {
            if !by_name.contains_key(name.as_str()) {
                return Err(InferenceError::malformed(name, GraphDefect::MissingInit));
            }
        }

        Ok(GraphIndex {
            item,
            by_name,
            data_inputs,
            control_inputs,
            referenced_slots,
        })
    }

    pub fn item(&self) -> &'a Item {
        self.item
    }

    pub fn len(&self) -> usize {
        self.item.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &'a Node {
        &self.item.nodes[index]
    }

    pub fn role(&self, index: usize) -> OpRole {
        OpRole::of(&self.item.nodes[index].op)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn data_inputs(&self, index: usize) -> &[DataEdge] {
        &self.data_inputs[index]
    }

    pub fn control_inputs(&self, index: usize) -> &[usize] {
        &self.control_inputs[index]
    }

    /// Number of output slots consumers refer to (highest slot + 1).
    pub fn referenced_slots(&self, index: usize) -> usize {
        self.referenced_slots[index]
    }

    /// `true` for the loop back edge `NextIteration → Merge`.
    pub fn is_back_edge(&self, producer: usize, consumer: usize) -> bool {
        self.role(producer) == OpRole::NextIteration && self.role(consumer) == OpRole::Merge
    }

    // ── Evaluation order (Kahn's algorithm) ─────────────────────────────

    /// Topological order over data and control edges with loop back edges
    /// removed. `soft_edges` (producer, consumer) order resource writers
    /// before readers; when the sort is stuck, the lowest-index node waiting
    /// only on soft edges is released. Ties break by node index.
    pub fn evaluation_order(&self, soft_edges: &[(usize, usize)]) -> Result<Vec<usize>, InferenceError> {
        let n = self.len();
        let mut hard_deg = vec![0usize; n];
        let mut soft_deg = vec![0usize; n];
        let mut hard_out: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut soft_out: Vec<Vec<usize>> = vec![Vec::new(); n];

        for consumer in 0..n {
            let producers = self.data_inputs[consumer]
                .iter()
                .map(|e| e.producer)
                .chain(self.control_inputs[consumer].iter().copied());
            for producer in producers {
                if self.is_back_edge(producer, consumer) {
                    continue;
                }
                hard_deg[consumer] += 1;
                hard_out[producer].push(consumer);
            }
        }
        for &(producer, consumer) in soft_edges {
            if producer == consumer {
                continue;
            }
            soft_deg[consumer] += 1;
            soft_out[producer].push(consumer);
        }

        let mut ready: BTreeSet<usize> = (0..n)
            .filter(|&i| hard_deg[i] == 0 && soft_deg[i] == 0)
            .collect();
        let mut scheduled = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while order.len() < n {
            let Some(next) = ready.pop_first() else {
                // Stuck: release the first node blocked only by soft edges.
                let released = (0..n).find(|&i| !scheduled[i] && hard_deg[i] == 0);
                match released {
                    Some(i) => {
                        soft_deg[i] = 0;
                        ready.insert(i);
                        continue;
                    }
                    None => {
                        let stuck = (0..n).find(|&i| !scheduled[i]).unwrap_or(0);
                        return Err(InferenceError::malformed(
                            &self.node(stuck).name,
                            GraphDefect::UnrecognizedCycle,
                        ));
                    }
                }
            };
            scheduled[next] = true;
            order.push(next);
            for &c in &hard_out[next] {
                hard_deg[c] -= 1;
                if hard_deg[c] == 0 && soft_deg[c] == 0 && !scheduled[c] {
                    ready.insert(c);
                }
            }
            for &c in &soft_out[next] {
                if soft_deg[c] > 0 {
                    soft_deg[c] -= 1;
                }
                if hard_deg[c] == 0 && soft_deg[c] == 0 && !scheduled[c] {
                    ready.insert(c);
                }
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::types::{DataType, Shape};

    fn names(index: &GraphIndex<'_>, order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| index.node(i).name.clone()).collect()
    }

    #[test]
    fn resolves_inputs_and_referenced_slots() {
        let mut b = GraphBuilder::new("t");
        b.node("s", "Switch", &["x", "p"]);
        b.placeholder("x", DataType::FLOAT, Shape::known(&[2]));
        b.placeholder("p", DataType::BOOL, Shape::scalar());
        b.node("use", "Identity", &["s:1"]);
        let item = b.finish();
        let index = GraphIndex::build(&item).unwrap();
        let s = index.index_of("s").unwrap();
        assert_eq!(index.data_inputs(s).len(), 2);
        assert_eq!(index.referenced_slots(s), 2);
        assert_eq!(index.referenced_slots(index.index_of("use").unwrap()), 0);
    }

    #[test]
    fn dangling_input_is_malformed() {
        let mut b = GraphBuilder::new("t");
        b.node("a", "Identity", &["missing:0"]);
        let item = b.finish();
        let err = GraphIndex::build(&item).unwrap_err();
        assert_eq!(err.node(), Some("a"));
        assert!(matches!(
            err,
            InferenceError::MalformedGraph {
                defect: GraphDefect::DanglingInput(_),
                ..
            }
        ));
    }

    #[test]
    fn duplicate_name_and_missing_fetch() {
        let mut b = GraphBuilder::new("t");
        b.node("a", "NoOp", &[]);
        b.node("a", "NoOp", &[]);
        let item = b.finish();
        assert!(matches!(
            GraphIndex::build(&item),
            Err(InferenceError::MalformedGraph {
                defect: GraphDefect::DuplicateName,
                ..
            })
        ));

        let mut b = GraphBuilder::new("t");
        b.node("a", "NoOp", &[]);
        b.fetch("nope");
        let item = b.finish();
        assert!(matches!(
            GraphIndex::build(&item),
            Err(InferenceError::MalformedGraph {
                defect: GraphDefect::MissingFetch,
                ..
            })
        ));
    }

    #[test]
    fn order_respects_dependencies_regardless_of_listing() {
        let mut b = GraphBuilder::new("t");
        b.node("c", "Square", &["b"]);
        b.node("b", "Square", &["a"]);
        b.placeholder("a", DataType::FLOAT, Shape::known(&[2]));
        let item = b.finish();
        let index = GraphIndex::build(&item).unwrap();
        let order = index.evaluation_order(&[]).unwrap();
        assert_eq!(names(&index, &order), ["a", "b", "c"]);
    }

    #[test]
    fn loop_back_edge_is_ignored() {
        let mut b = GraphBuilder::new("t");
        b.placeholder("x", DataType::FLOAT, Shape::known(&[2]));
        b.node("m", "Merge", &["x", "n"]);
        b.node("n", "NextIteration", &["m"]);
        let item = b.finish();
        let index = GraphIndex::build(&item).unwrap();
        let order = index.evaluation_order(&[]).unwrap();
        assert_eq!(names(&index, &order), ["x", "m", "n"]);
    }

    #[test]
    fn plain_cycle_is_rejected() {
        let mut b = GraphBuilder::new("t");
        b.node("a", "Square", &["b"]);
        b.node("b", "Square", &["a"]);
        let item = b.finish();
        let index = GraphIndex::build(&item).unwrap();
        let err = index.evaluation_order(&[]).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::MalformedGraph {
                defect: GraphDefect::UnrecognizedCycle,
                ..
            }
        ));
    }

    #[test]
    fn soft_edges_order_and_defer() {
        let mut b = GraphBuilder::new("t");
        b.node("reader", "NoOp", &[]);
        b.node("writer", "NoOp", &[]);
        let item = b.finish();
        let index = GraphIndex::build(&item).unwrap();
        let order = index.evaluation_order(&[(1, 0)]).unwrap();
        assert_eq!(names(&index, &order), ["writer", "reader"]);

        // reader -> writer by data, writer -> reader by resource: released.
        let mut b = GraphBuilder::new("t");
        b.node("reader", "NoOp", &[]);
        b.node("writer", "Identity", &["reader"]);
        let item = b.finish();
        let index = GraphIndex::build(&item).unwrap();
        let order = index.evaluation_order(&[(1, 0)]).unwrap();
        assert_eq!(names(&index, &order), ["reader", "writer"]);
    }
}
