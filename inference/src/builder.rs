// builder.rs — Programmatic item construction
//
// Builds Items in code for tests, benches and embedding applications. The
// loop helper lays out the canonical frame structure
// (Enter → Merge → Switch → Identity → body → NextIteration, Exit on the
// false branch) with the usual generated node names.

use crate::item::{AttrValue, InputRef, Item, ListValue, Node, TensorRef, TensorValue};
use crate::types::{DataType, Shape};

/// Attribute setter for the node just added.
pub struct NodeBuilder<'b> {
    node: &'b mut Node,
}

impl<'b> NodeBuilder<'b> {
    pub fn attr(self, key: &str, value: AttrValue) -> Self {
        self.node.attr.insert(key.to_string(), value);
        self
    }

    pub fn type_attr(self, key: &str, dtype: DataType) -> Self {
        self.attr(key, AttrValue::Type(dtype))
    }

    pub fn shape_attr(self, key: &str, shape: Shape) -> Self {
        self.attr(key, AttrValue::Shape(shape))
    }

    pub fn int_attr(self, key: &str, value: i64) -> Self {
        self.attr(key, AttrValue::I(value))
    }

    pub fn bool_attr(self, key: &str, value: bool) -> Self {
        self.attr(key, AttrValue::B(value))
    }

    pub fn str_attr(self, key: &str, value: &str) -> Self {
        self.attr(key, AttrValue::S(value.to_string()))
    }

    pub fn type_list_attr(self, key: &str, types: &[DataType]) -> Self {
        self.attr(
            key,
            AttrValue::List(ListValue {
                types: types.to_vec(),
                ..ListValue::default()
            }),
        )
    }

    pub fn shape_list_attr(self, key: &str, shapes: &[Shape]) -> Self {
        self.attr(
            key,
            AttrValue::List(ListValue {
                shape: shapes.to_vec(),
                ..ListValue::default()
            }),
        )
    }

    /// Add an ordering-only input.
    pub fn control(self, name: &str) -> Self {
        self.node.input.push(InputRef::Control(name.to_string()));
        self
    }
}

#[derive(Debug, Default)]
pub struct GraphBuilder {
    item: Item,
}

fn input_ref(text: &str) -> InputRef {
    text.parse().unwrap_or_else(|_| InputRef::Data(TensorRef::new(text, 0)))
}

/// Loop-generated name: `frame/Kind` for the first variable, `frame/Kind_i`
/// after that.
fn loop_name(frame: &str, kind: &str, i: usize) -> String {
    if i == 0 {
        format!("{}/{}", frame, kind)
    } else {
        format!("{}/{}_{}", frame, kind, i)
    }
}

impl GraphBuilder {
    pub fn new(id: &str) -> Self {
        GraphBuilder {
            item: Item {
                id: id.to_string(),
                ..Item::default()
            },
        }
    }

    /// Add a node. Inputs use the `name`, `name:slot`, `^name` convention.
    pub fn node(&mut self, name: &str, op: &str, inputs: &[&str]) -> NodeBuilder<'_> {
        let mut node = Node::new(name, op);
        node.input = inputs.iter().map(|i| input_ref(i)).collect();
        self.item.nodes.push(node);
        let last = self.item.nodes.len() - 1;
        NodeBuilder {
            node: &mut self.item.nodes[last],
        }
    }

    pub fn placeholder(&mut self, name: &str, dtype: DataType, shape: Shape) -> NodeBuilder<'_> {
        self.node(name, "Placeholder", &[])
            .type_attr("dtype", dtype)
            .shape_attr("shape", shape)
    }

    pub fn constant(&mut self, name: &str, value: TensorValue) -> NodeBuilder<'_> {
        let dtype = value.dtype;
        self.node(name, "Const", &[])
            .type_attr("dtype", dtype)
            .attr("value", AttrValue::Tensor(value))
    }

    /// 1-D int32 constant.
    pub fn int_vector(&mut self, name: &str, values: &[i64]) -> NodeBuilder<'_> {
        self.constant(name, TensorValue::int_vector(values))
    }

    pub fn int_scalar(&mut self, name: &str, value: i64) -> NodeBuilder<'_> {
        self.constant(name, TensorValue::int_scalar(value))
    }

    /// Float constant of the given shape with every element set to `value`.
    pub fn filled(&mut self, name: &str, dims: &[u64], value: f64) -> NodeBuilder<'_> {
        self.constant(
            name,
            TensorValue::filled(DataType::FLOAT, Shape::known(dims), value),
        )
    }

    /// `RandomStandardNormal` fed by a constant shape node `<name>/shape`.
    pub fn random_normal(&mut self, name: &str, dims: &[i64]) -> NodeBuilder<'_> {
        let shape_node = format!("{}/shape", name);
        self.int_vector(&shape_node, dims);
        self.node(name, "RandomStandardNormal", &[shape_node.as_str()])
            .type_attr("dtype", DataType::FLOAT)
    }

    /// `FIFOQueueV2` with declared component types and optional shapes.
    pub fn queue(&mut self, name: &str, types: &[DataType], shapes: &[Shape]) -> NodeBuilder<'_> {
        let node = self
            .node(name, "FIFOQueueV2", &[])
            .type_list_attr("component_types", types);
        if shapes.is_empty() {
            node
        } else {
            node.shape_list_attr("shapes", shapes)
        }
    }

    pub fn enqueue(&mut self, name: &str, queue: &str, values: &[&str]) -> NodeBuilder<'_> {
        let mut inputs = vec![queue];
        inputs.extend_from_slice(values);
        self.node(name, "QueueEnqueueV2", &inputs)
    }

    pub fn dequeue(&mut self, name: &str, queue: &str, types: &[DataType]) -> NodeBuilder<'_> {
        self.node(name, "QueueDequeueV2", &[queue])
            .type_list_attr("component_types", types)
    }

    pub fn variable(&mut self, name: &str, dtype: DataType, shape: Shape) -> NodeBuilder<'_> {
        self.node(name, "VariableV2", &[])
            .type_attr("dtype", dtype)
            .shape_attr("shape", shape)
    }

    pub fn enter(&mut self, name: &str, input: &str, frame: &str, is_constant: bool) -> NodeBuilder<'_> {
        self.node(name, "Enter", &[input])
            .str_attr("frame_name", frame)
            .bool_attr("is_constant", is_constant)
    }

    /// Build a while loop over `inits`. `cond` receives the Merge outputs and
    /// returns the boolean tensor deciding whether to iterate; `body`
    /// receives the Identity outputs and returns one next value per loop
    /// variable. Returns the Exit node names in variable order.
    pub fn while_loop<C, B>(&mut self, frame: &str, inits: &[&str], cond: C, body: B) -> Vec<String>
    where
        C: FnOnce(&mut GraphBuilder, &[String]) -> String,
        B: FnOnce(&mut GraphBuilder, &[String]) -> Vec<String>,
    {
        let mut merges = Vec::with_capacity(inits.len());
        for (i, init) in inits.iter().enumerate() {
            let enter = loop_name(frame, "Enter", i);
            let merge = loop_name(frame, "Merge", i);
            let next = loop_name(frame, "NextIteration", i);
            self.enter(&enter, init, frame, false);
            self.node(&merge, "Merge", &[enter.as_str(), next.as_str()]);
            merges.push(merge);
        }

        let predicate = cond(self, &merges);
        let loop_cond = format!("{}/LoopCond", frame);
        self.node(&loop_cond, "LoopCond", &[predicate.as_str()]);

        let mut identities = Vec::with_capacity(inits.len());
        let mut exits = Vec::with_capacity(inits.len());
        for (i, merge) in merges.iter().enumerate() {
            let switch = loop_name(frame, "Switch", i);
            let identity = loop_name(frame, "Identity", i);
            let exit = loop_name(frame, "Exit", i);
            self.node(&switch, "Switch", &[merge.as_str(), loop_cond.as_str()]);
            let taken = format!("{}:1", switch);
            self.node(&identity, "Identity", &[taken.as_str()]);
            self.node(&exit, "Exit", &[switch.as_str()]);
            identities.push(identity);
            exits.push(exit);
        }

        let outputs = body(self, &identities);
        for (i, out) in outputs.iter().enumerate() {
            let next = loop_name(frame, "NextIteration", i);
            self.node(&next, "NextIteration", &[out.as_str()]);
        }
        exits
    }

    pub fn fetch(&mut self, name: &str) -> &mut Self {
        self.item.fetch.push(name.to_string());
        self
    }

    pub fn init_op(&mut self, name: &str) -> &mut Self {
        self.item.init_ops.push(name.to_string());
        self
    }

    pub fn finish(self) -> Item {
        self.item
    }
}
