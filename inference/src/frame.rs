// frame.rs — Control-flow frame index
//
// Groups nodes into loop frames. A frame is opened by Enter nodes carrying a
// `frame_name` and closed by Exit nodes; frames nest, the parent being the
// frame the Enter's input lives in.
//
// Preconditions: `order` is a GraphIndex evaluation order, so every node's
//   non-back-edge producers precede it.
// Postconditions: every node is assigned to exactly one frame or the root.
// Failure modes: `MalformedGraph(FrameStructure)` for an Enter without a
//   frame name, an Exit outside any frame, a frame name reused under two
//   parents, or a NextIteration → Merge edge crossing frames.
// Side effects: none.

use std::collections::HashMap;

use crate::error::{GraphDefect, InferenceError};
use crate::graph_index::{GraphIndex, OpRole};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub name: String,
    /// Index of the enclosing frame; `None` for frames entered from the root.
    pub parent: Option<usize>,
    /// 1 for top-level loops.
    pub depth: usize,
    pub enters: Vec<usize>,
    pub merges: Vec<usize>,
    pub exits: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct FrameIndex {
    frames: Vec<Frame>,
    by_name: HashMap<String, usize>,
    node_frame: Vec<Option<usize>>,
}

fn frame_error(node: &str, message: String) -> InferenceError {
    InferenceError::malformed(node, GraphDefect::FrameStructure(message))
}

impl FrameIndex {
    pub fn build(graph: &GraphIndex<'_>, order: &[usize]) -> Result<Self, InferenceError> {
        let mut index = FrameIndex {
            frames: Vec::new(),
            by_name: HashMap::new(),
            node_frame: vec![None; graph.len()],
        };

        for &i in order {
            let node = graph.node(i);
            let first_input = graph
                .data_inputs(i)
                .iter()
                .map(|e| e.producer)
                .find(|&p| !graph.is_back_edge(p, i));
            let inherited = first_input
                .or_else(|| graph.control_inputs(i).first().copied())
                .and_then(|p| index.node_frame[p]);

            let frame = match graph.role(i) {
                OpRole::Enter => {
                    let name = node.attr_str("frame_name").ok_or_else(|| {
                        frame_error(&node.name, "Enter has no frame_name".to_string())
                    })?;
                    let id = index.open(name, inherited, &node.name)?;
                    index.frames[id].enters.push(i);
                    Some(id)
                }
                OpRole::Exit => {
                    let Some(inner) = inherited else {
                        return Err(frame_error(
                            &node.name,
                            "Exit is not inside any loop frame".to_string(),
                        ));
                    };
                    index.frames[inner].exits.push(i);
                    index.frames[inner].parent
                }
                role => {
                    if role == OpRole::Merge {
                        if let Some(id) = inherited {
                            index.frames[id].merges.push(i);
                        }
                    }
                    inherited
                }
            };
            index.node_frame[i] = frame;
        }

        for consumer in 0..graph.len() {
            for edge in graph.data_inputs(consumer) {
                if graph.is_back_edge(edge.producer, consumer)
                    && index.node_frame[edge.producer] != index.node_frame[consumer]
                {
                    return Err(frame_error(
                        &graph.node(consumer).name,
                        format!(
                            "NextIteration '{}' feeds a Merge in a different frame ({} vs {})",
                            graph.node(edge.producer).name,
                            index.describe(index.node_frame[edge.producer]),
                            index.describe(index.node_frame[consumer]),
                        ),
                    ));
                }
            }
        }

        Ok(index)
    }

    fn open(&mut self, name: &str, parent: Option<usize>, enter: &str) -> Result<usize, InferenceError> {
        if let Some(&id) = self.by_name.get(name) {
            if self.frames[id].parent != parent {
                return Err(frame_error(
                    enter,
                    format!(
                        "frame '{}' is entered from both {} and {}",
                        name,
                        self.describe(self.frames[id].parent),
                        self.describe(parent),
                    ),
                ));
            }
            return Ok(id);
        }
        let depth = parent.map_or(1, |p| self.frames[p].depth + 1);
        let id = self.frames.len();
        self.frames.push(Frame {
            name: name.to_string(),
            parent,
            depth,
            enters: Vec::new(),
            merges: Vec::new(),
            exits: Vec::new(),
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    fn describe(&self, frame: Option<usize>) -> String {
        match frame {
            Some(id) => format!("'{}'", self.frames[id].name),
            None => "the root frame".to_string(),
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, name: &str) -> Option<&Frame> {
        self.by_name.get(name).map(|&id| &self.frames[id])
    }

    /// Frame id of a node; `None` for the root frame.
    pub fn frame_id_of(&self, node: usize) -> Option<usize> {
        self.node_frame.get(node).copied().flatten()
    }

    pub fn frame_of(&self, node: usize) -> Option<&Frame> {
        self.frame_id_of(node).map(|id| &self.frames[id])
    }

    /// Loop nesting depth of a node; 0 in the root frame.
    pub fn depth_of(&self, node: usize) -> usize {
        self.frame_of(node).map_or(0, |f| f.depth)
    }
}
