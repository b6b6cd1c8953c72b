// item.rs — Inference items: graph snapshot, fetch and init node sets
//
// An Item is one immutable dataflow graph plus the names of the nodes that
// must be materialized (fetch) and the nodes run once before execution
// (init_ops). Items load from JSON; node inputs use the "name", "name:slot"
// and "^name" (control) string conventions, attributes mirror the classic
// attribute oneof (type / shape / i / f / b / s / tensor / list).
//
// Preconditions: none.
// Postconditions: a parsed Item is not yet validated; graph_index.rs owns
//   dangling-input, duplicate-name and cycle checks.
// Failure modes: malformed JSON or unparsable type/shape/input strings.
// Side effects: `Item::load` reads one file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::InferenceError;
use crate::types::{DataType, Shape};

/// Largest integer tensor `TensorValue::int_values` will expand.
pub const MAX_EXPANDED_ELEMENTS: u64 = 1 << 16;

// ── Tensor and input references ─────────────────────────────────────────────

/// One output slot of one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorRef {
    pub node: String,
    pub slot: usize,
}

impl TensorRef {
    pub fn new(node: impl Into<String>, slot: usize) -> Self {
        TensorRef {
            node: node.into(),
            slot,
        }
    }
}

impl fmt::Display for TensorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.slot == 0 {
            write!(f, "{}", self.node)
        } else {
            write!(f, "{}:{}", self.node, self.slot)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid input reference '{0}'")]
pub struct InputParseError(pub String);

/// A node input: a data edge carrying a value, or an ordering-only control
/// edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InputRef {
    Data(TensorRef),
    Control(String),
}

impl FromStr for InputRef {
    type Err = InputParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix('^') {
            if name.is_empty() {
                return Err(InputParseError(s.to_string()));
            }
            return Ok(InputRef::Control(name.to_string()));
        }
        let (node, slot) = match s.rsplit_once(':') {
            Some((node, slot)) => {
                let slot = slot
                    .parse::<usize>()
                    .map_err(|_| InputParseError(s.to_string()))?;
                (node, slot)
            }
            None => (s, 0),
        };
        if node.is_empty() {
            return Err(InputParseError(s.to_string()));
        }
        Ok(InputRef::Data(TensorRef::new(node, slot)))
    }
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputRef::Data(t) => write!(f, "{}", t),
            InputRef::Control(name) => write!(f, "^{}", name),
        }
    }
}

impl TryFrom<String> for InputRef {
    type Error = InputParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<InputRef> for String {
    fn from(input: InputRef) -> Self {
        input.to_string()
    }
}

// ── Attribute values ────────────────────────────────────────────────────────

/// A constant tensor literal (`Const` values, shape arguments).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorValue {
    pub dtype: DataType,
    pub shape: Shape,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub int_val: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub float_val: Vec<f64>,
}

impl TensorValue {
    /// Integer tensor with explicit values.
    pub fn ints(dtype: DataType, shape: Shape, values: Vec<i64>) -> Self {
        TensorValue {
            dtype,
            shape,
            int_val: values,
            float_val: Vec::new(),
        }
    }

    /// 1-D int32 tensor, the usual encoding of a shape argument.
    pub fn int_vector(values: &[i64]) -> Self {
        let len = values.len() as u64;
        TensorValue::ints(DataType::INT32, Shape::known(&[len]), values.to_vec())
    }

    pub fn int_scalar(value: i64) -> Self {
        TensorValue::ints(DataType::INT32, Shape::scalar(), vec![value])
    }

    /// Float tensor filled with one value.
    pub fn filled(dtype: DataType, shape: Shape, value: f64) -> Self {
        TensorValue {
            dtype,
            shape,
            int_val: Vec::new(),
            float_val: vec![value],
        }
    }

    /// Integer payload, expanded to the full element count. A single stored
    /// value splats across all elements. `None` if the payload is absent,
    /// inconsistent with the shape, or larger than `MAX_EXPANDED_ELEMENTS`.
    pub fn int_values(&self) -> Option<Vec<i64>> {
        if !self.dtype.element().is_some_and(|t| t.is_integer()) {
            return None;
        }
        let n = self.shape.num_elements()?;
        if n > MAX_EXPANDED_ELEMENTS {
            return None;
        }
        let n = n as usize;
        match self.int_val.len() {
            len if len == n => Some(self.int_val.clone()),
            1 => Some(vec![self.int_val[0]; n]),
            _ => None,
        }
    }
}

/// List-valued attribute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ListValue {
    #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<DataType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<Shape>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub i: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub s: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    #[serde(rename = "type")]
    Type(DataType),
    Shape(Shape),
    I(i64),
    F(f64),
    B(bool),
    S(String),
    Tensor(TensorValue),
    List(ListValue),
}

// ── Nodes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub op: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<InputRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attr: BTreeMap<String, AttrValue>,
}

impl Node {
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            op: op.into(),
            input: Vec::new(),
            attr: BTreeMap::new(),
        }
    }

    /// Data inputs in index order.
    pub fn data_inputs(&self) -> impl Iterator<Item = &TensorRef> {
        self.input.iter().filter_map(|i| match i {
            InputRef::Data(t) => Some(t),
            InputRef::Control(_) => None,
        })
    }

    pub fn num_data_inputs(&self) -> usize {
        self.data_inputs().count()
    }

    pub fn control_inputs(&self) -> impl Iterator<Item = &str> {
        self.input.iter().filter_map(|i| match i {
            InputRef::Control(name) => Some(name.as_str()),
            InputRef::Data(_) => None,
        })
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attr.get(key)
    }

    pub fn attr_type(&self, key: &str) -> Option<DataType> {
        match self.attr.get(key)? {
            AttrValue::Type(t) => Some(*t),
            _ => None,
        }
    }

    pub fn attr_shape(&self, key: &str) -> Option<&Shape> {
        match self.attr.get(key)? {
            AttrValue::Shape(s) => Some(s),
            _ => None,
        }
    }

    pub fn attr_int(&self, key: &str) -> Option<i64> {
        match self.attr.get(key)? {
            AttrValue::I(i) => Some(*i),
            _ => None,
        }
    }

    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        match self.attr.get(key)? {
            AttrValue::B(b) => Some(*b),
            _ => None,
        }
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        match self.attr.get(key)? {
            AttrValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn attr_tensor(&self, key: &str) -> Option<&TensorValue> {
        match self.attr.get(key)? {
            AttrValue::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn attr_list(&self, key: &str) -> Option<&ListValue> {
        match self.attr.get(key)? {
            AttrValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn attr_type_list(&self, key: &str) -> Option<&[DataType]> {
        self.attr_list(key).map(|l| l.types.as_slice())
    }

    pub fn attr_shape_list(&self, key: &str) -> Option<&[Shape]> {
        self.attr_list(key).map(|l| l.shape.as_slice())
    }
}

// ── Items ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub id: String,
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fetch: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_ops: Vec<String>,
}

impl Item {
    pub fn from_json(json: &str) -> Result<Item, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> Result<Item, InferenceError> {
        let source = std::fs::read_to_string(path).map_err(|e| InferenceError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Item::from_json(&source).map_err(|e| InferenceError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Compact JSON with no whitespace. Attribute maps are ordered, so equal
    /// items always serialize identically.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// SHA-256 of `canonical_json()`. Used to check that a cluster was
    /// initialized with this exact item.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }

    pub fn fingerprint_hex(&self) -> String {
        use std::fmt::Write;
        let mut s = String::with_capacity(64);
        for b in self.fingerprint() {
            let _ = write!(s, "{:02x}", b);
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_input_conventions() {
        assert_eq!(
            "a".parse::<InputRef>().unwrap(),
            InputRef::Data(TensorRef::new("a", 0))
        );
        assert_eq!(
            "while/Switch_1:1".parse::<InputRef>().unwrap(),
            InputRef::Data(TensorRef::new("while/Switch_1", 1))
        );
        assert_eq!(
            "^while/Identity".parse::<InputRef>().unwrap(),
            InputRef::Control("while/Identity".to_string())
        );
        assert!("a:x".parse::<InputRef>().is_err());
        assert!("^".parse::<InputRef>().is_err());
    }

    #[test]
    fn input_display_round_trips() {
        for text in ["a", "b:2", "^c"] {
            assert_eq!(text.parse::<InputRef>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn loads_item_json() {
        let json = r#"{
            "id": "vars",
            "nodes": [
                {"name": "Var", "op": "Variable",
                 "attr": {"dtype": {"type": "float"}, "shape": {"shape": [3, 7]}}},
                {"name": "InitVar", "op": "Assign", "input": ["Var", "InitialVal"]},
                {"name": "InitialVal", "op": "Const",
                 "attr": {"value": {"tensor": {"dtype": "float", "shape": [3, 7], "float_val": [0.0]}}}}
            ],
            "fetch": ["Var"],
            "init_ops": ["InitVar"]
        }"#;
        let item = Item::from_json(json).unwrap();
        assert_eq!(item.nodes.len(), 3);
        let var = item.node("Var").unwrap();
        assert_eq!(var.attr_type("dtype"), Some(DataType::FLOAT));
        assert_eq!(var.attr_shape("shape"), Some(&Shape::known(&[3, 7])));
        let init = item.node("InitVar").unwrap();
        assert_eq!(init.num_data_inputs(), 2);
        assert_eq!(item.fetch, vec!["Var".to_string()]);
    }

    #[test]
    fn int_values_splat_single_payload() {
        let t = TensorValue::ints(DataType::INT32, Shape::known(&[3]), vec![7]);
        assert_eq!(t.int_values(), Some(vec![7, 7, 7]));
        let v = TensorValue::int_vector(&[3, 7]);
        assert_eq!(v.int_values(), Some(vec![3, 7]));
        let f = TensorValue::filled(DataType::FLOAT, Shape::known(&[2]), 1.0);
        assert_eq!(f.int_values(), None);
    }

    #[test]
    fn int_values_refuses_huge_splat() {
        let huge = Shape::known(&[1 << 40, 1 << 20]);
        let t = TensorValue::ints(DataType::INT64, huge, vec![0]);
        assert_eq!(t.int_values(), None);
        let limit = Shape::known(&[MAX_EXPANDED_ELEMENTS]);
        let edge = TensorValue::ints(DataType::INT32, limit, vec![1]);
        assert_eq!(edge.int_values().map(|v| v.len()), Some(1 << 16));
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let mut item = Item::default();
        item.nodes.push(Node::new("a", "NoOp"));
        let first = item.fingerprint();
        assert_eq!(first, item.clone().fingerprint());
        item.nodes.push(Node::new("b", "NoOp"));
        assert_ne!(first, item.fingerprint());
        assert_eq!(item.fingerprint_hex().len(), 64);
    }
}
