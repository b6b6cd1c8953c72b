// registry.rs — Shape-rule registry
//
// Maps an operation kind to a pure rule `(attributes, input properties) ->
// output properties | rejection`. The propagator only ever looks rules up by
// name, so the set of supported kinds grows by registration, never by
// editing the engine. `Registry::standard()` carries the built-in rule set
// from rules.rs; declarative rules can be added from a JSON manifest.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;
use thiserror::Error;

use crate::item::{Node, TensorValue};
use crate::types::{DataType, Shape, TensorProperties, TypeParseError};

// ── Rule interface ──────────────────────────────────────────────────────────

/// A shape rule rejected its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RuleError(pub String);

impl RuleError {
    pub fn new(message: impl Into<String>) -> Self {
        RuleError(message.into())
    }
}

/// What a rule sees: the node, its current input properties, and the
/// constant value of any input whose producer is statically known.
pub struct InferenceContext<'a> {
    node: &'a Node,
    inputs: &'a [TensorProperties],
    input_tensors: &'a [Option<TensorValue>],
    outputs: Vec<TensorProperties>,
}

static UNKNOWN: TensorProperties = TensorProperties {
    dtype: DataType::Invalid,
    shape: Shape::UnknownRank,
};

impl<'a> InferenceContext<'a> {
    pub fn new(
        node: &'a Node,
        inputs: &'a [TensorProperties],
        input_tensors: &'a [Option<TensorValue>],
    ) -> Self {
        InferenceContext {
            node,
            inputs,
            input_tensors,
            outputs: Vec::new(),
        }
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn inputs(&self) -> &'a [TensorProperties] {
        self.inputs
    }

    /// Input properties; out-of-range indices read as fully unknown.
    pub fn input(&self, index: usize) -> &'a TensorProperties {
        self.inputs.get(index).unwrap_or(&UNKNOWN)
    }

    pub fn input_tensor(&self, index: usize) -> Option<&'a TensorValue> {
        self.input_tensors.get(index).and_then(|t| t.as_ref())
    }

    pub fn input_ints(&self, index: usize) -> Option<Vec<i64>> {
        self.input_tensor(index).and_then(|t| t.int_values())
    }

    /// Required type attribute.
    pub fn attr_type(&self, key: &str) -> Result<DataType, RuleError> {
        self.node
            .attr_type(key)
            .ok_or_else(|| RuleError::new(format!("missing type attribute '{}'", key)))
    }

    /// Ensure at least `n` data inputs.
    pub fn expect_inputs(&self, n: usize) -> Result<(), RuleError> {
        if self.inputs.len() < n {
            return Err(RuleError::new(format!(
                "expected at least {} input(s), got {}",
                n,
                self.inputs.len()
            )));
        }
        Ok(())
    }

    pub fn set_output(&mut self, index: usize, props: TensorProperties) {
        if self.outputs.len() <= index {
            self.outputs.resize(index + 1, TensorProperties::unknown());
        }
        self.outputs[index] = props;
    }

    pub fn push_output(&mut self, props: TensorProperties) {
        self.outputs.push(props);
    }

    pub fn into_outputs(self) -> Vec<TensorProperties> {
        self.outputs
    }
}

/// A per-operation shape function.
pub trait ShapeRule: Send + Sync {
    fn infer(&self, ctx: &mut InferenceContext<'_>) -> Result<(), RuleError>;
}

impl<F> ShapeRule for F
where
    F: Fn(&mut InferenceContext<'_>) -> Result<(), RuleError> + Send + Sync,
{
    fn infer(&self, ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
        self(ctx)
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

/// Where a registered rule came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOrigin {
    Builtin,
    Custom,
    Manifest(PathBuf),
}

impl fmt::Display for RuleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOrigin::Builtin => write!(f, "built-in rules"),
            RuleOrigin::Custom => write!(f, "custom registration"),
            RuleOrigin::Manifest(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("duplicate rule for op '{op}': first defined in {first}, redefined in {second}")]
    DuplicateRule {
        op: String,
        first: RuleOrigin,
        second: RuleOrigin,
    },
}

// ── Registry ────────────────────────────────────────────────────────────────

struct RuleEntry {
    rule: Box<dyn ShapeRule>,
    origin: RuleOrigin,
}

/// Operation kind → shape rule.
pub struct Registry {
    rules: HashMap<String, RuleEntry>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Registry {
            rules: HashMap::new(),
        }
    }

    /// Registry with the built-in rule set.
    pub fn standard() -> Self {
        let mut registry = Registry::new();
        crate::rules::register_standard(&mut registry);
        registry
    }

    /// Process-wide shared instance of `standard()`.
    pub fn shared_standard() -> &'static Registry {
        static STANDARD: OnceLock<Registry> = OnceLock::new();
        STANDARD.get_or_init(Registry::standard)
    }

    pub fn register(
        &mut self,
        op: impl Into<String>,
        rule: impl ShapeRule + 'static,
    ) -> Result<(), RegistryError> {
        self.insert(op.into(), Box::new(rule), RuleOrigin::Custom)
    }

    /// Used by rules.rs; built-in names are unique by construction.
    pub(crate) fn register_builtin(&mut self, op: &str, rule: impl ShapeRule + 'static) {
        self.rules.insert(
            op.to_string(),
            RuleEntry {
                rule: Box::new(rule),
                origin: RuleOrigin::Builtin,
            },
        );
    }

    fn insert(
        &mut self,
        op: String,
        rule: Box<dyn ShapeRule>,
        origin: RuleOrigin,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.rules.get(&op) {
            return Err(RegistryError::DuplicateRule {
                op,
                first: existing.origin.clone(),
                second: origin,
            });
        }
        self.rules.insert(op, RuleEntry { rule, origin });
        Ok(())
    }

    pub fn lookup(&self, op: &str) -> Option<&dyn ShapeRule> {
        self.rules.get(op).map(|e| e.rule.as_ref())
    }

    pub fn contains(&self, op: &str) -> bool {
        self.rules.contains_key(op)
    }

    pub fn origin(&self, op: &str) -> Option<&RuleOrigin> {
        self.rules.get(op).map(|e| &e.origin)
    }

    /// Registered op kinds, sorted.
    pub fn op_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Load declarative rules from a JSON manifest. Returns the number of
    /// rules added.
    pub fn load_manifest(&mut self, path: &Path) -> Result<usize, RegistryError> {
        let source = std::fs::read_to_string(path).map_err(|e| RegistryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let rules = parse_manifest(&source).map_err(|message| RegistryError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        let count = rules.len();
        for (op, rule) in rules {
            self.insert(
                op,
                Box::new(rule),
                RuleOrigin::Manifest(path.to_path_buf()),
            )?;
        }
        Ok(count)
    }
}

// ── Declarative rules ───────────────────────────────────────────────────────

/// Source of an output dtype in a declarative rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtypeSource {
    Fixed(DataType),
    Attr(String),
    Input(usize),
}

/// Source of an output shape in a declarative rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeSource {
    Fixed(Shape),
    Attr(String),
    Input(usize),
}

/// Rule assembled from a manifest entry: each output copies its dtype and
/// shape from a literal, an attribute, or an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredRule {
    pub outputs: Vec<(DtypeSource, ShapeSource)>,
}

impl ShapeRule for DeclaredRule {
    fn infer(&self, ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
        for (dtype_src, shape_src) in &self.outputs {
            let dtype = match dtype_src {
                DtypeSource::Fixed(t) => *t,
                DtypeSource::Attr(key) => ctx.attr_type(key)?,
                DtypeSource::Input(i) => ctx.input(*i).dtype,
            };
            let shape = match shape_src {
                ShapeSource::Fixed(s) => s.clone(),
                ShapeSource::Attr(key) => ctx
                    .node()
                    .attr_shape(key)
                    .cloned()
                    .ok_or_else(|| RuleError::new(format!("missing shape attribute '{}'", key)))?,
                ShapeSource::Input(i) => ctx.input(*i).shape.clone(),
            };
            ctx.push_output(TensorProperties::new(dtype, shape));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ManifestFile {
    rules: Vec<ManifestRule>,
}

#[derive(Deserialize)]
struct ManifestRule {
    op: String,
    #[serde(default)]
    outputs: Vec<ManifestOutput>,
}

#[derive(Deserialize)]
struct ManifestOutput {
    dtype: String,
    shape: ManifestShape,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestShape {
    Reference(String),
    Literal(Shape),
}

fn parse_manifest(source: &str) -> Result<Vec<(String, DeclaredRule)>, String> {
    let file: ManifestFile = serde_json::from_str(source).map_err(|e| e.to_string())?;
    file.rules
        .into_iter()
        .map(|rule| {
            let outputs = rule
                .outputs
                .into_iter()
                .map(|out| {
                    let dtype = parse_dtype_source(&out.dtype).map_err(|e| e.to_string())?;
                    let shape = match out.shape {
                        ManifestShape::Literal(s) => ShapeSource::Fixed(s),
                        ManifestShape::Reference(r) => parse_shape_source(&r)?,
                    };
                    Ok((dtype, shape))
                })
                .collect::<Result<Vec<_>, String>>()
                .map_err(|e| format!("rule '{}': {}", rule.op, e))?;
            Ok((rule.op, DeclaredRule { outputs }))
        })
        .collect()
}

fn parse_input_index(text: &str) -> Option<Result<usize, String>> {
    text.strip_prefix("input:").map(|i| {
        i.parse::<usize>()
            .map_err(|_| format!("invalid input reference '{}'", text))
    })
}

fn parse_dtype_source(text: &str) -> Result<DtypeSource, TypeParseError> {
    if let Some(key) = text.strip_prefix("attr:") {
        return Ok(DtypeSource::Attr(key.to_string()));
    }
    if let Some(Ok(i)) = parse_input_index(text) {
        return Ok(DtypeSource::Input(i));
    }
    text.parse().map(DtypeSource::Fixed)
}

fn parse_shape_source(text: &str) -> Result<ShapeSource, String> {
    if let Some(key) = text.strip_prefix("attr:") {
        return Ok(ShapeSource::Attr(key.to_string()));
    }
    if let Some(index) = parse_input_index(text) {
        return index.map(ShapeSource::Input);
    }
    text.parse::<Shape>()
        .map(ShapeSource::Fixed)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_scalar(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
        ctx.push_output(TensorProperties::new(DataType::INT32, Shape::scalar()));
        Ok(())
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = Registry::new();
        registry.register("MyOp", always_scalar).unwrap();
        assert!(registry.contains("MyOp"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.origin("MyOp"), Some(&RuleOrigin::Custom));

        let node = Node::new("n", "MyOp");
        let mut ctx = InferenceContext::new(&node, &[], &[]);
        registry.lookup("MyOp").unwrap().infer(&mut ctx).unwrap();
        assert_eq!(ctx.into_outputs()[0].to_string(), "int32: []");
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = Registry::standard();
        let err = registry.register("Square", always_scalar).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRule { ref op, .. } if op == "Square"));
        assert!(err.to_string().contains("built-in rules"));
    }

    #[test]
    fn standard_registry_covers_common_ops() {
        let registry = Registry::shared_standard();
        for op in ["Const", "Square", "ConcatV2", "Reshape", "MatMul", "AddN"] {
            assert!(registry.contains(op), "missing rule for {}", op);
        }
        let names = registry.op_names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn manifest_rules_copy_attr_and_input() {
        let rules = parse_manifest(
            r#"{"rules": [
                {"op": "Scale", "outputs": [{"dtype": "attr:T", "shape": "input:0"}]},
                {"op": "Count", "outputs": [{"dtype": "int64", "shape": []}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        let (op, scale) = &rules[0];
        assert_eq!(op, "Scale");
        assert_eq!(
            scale.outputs[0],
            (DtypeSource::Attr("T".into()), ShapeSource::Input(0))
        );
        assert_eq!(
            rules[1].1.outputs[0],
            (DtypeSource::Fixed(DataType::INT64), ShapeSource::Fixed(Shape::scalar()))
        );
    }

    #[test]
    fn manifest_rejects_unknown_dtype() {
        let err = parse_manifest(
            r#"{"rules": [{"op": "Bad", "outputs": [{"dtype": "quux", "shape": "?"}]}]}"#,
        )
        .unwrap_err();
        assert!(err.contains("rule 'Bad'"), "{}", err);
    }

    #[test]
    fn declared_rule_reads_inputs() {
        let mut node = Node::new("s", "Scale");
        node.attr.insert(
            "T".into(),
            crate::item::AttrValue::Type(DataType::DOUBLE),
        );
        let inputs = [TensorProperties::new(DataType::DOUBLE, Shape::known(&[4]))];
        let rule = DeclaredRule {
            outputs: vec![(DtypeSource::Attr("T".into()), ShapeSource::Input(0))],
        };
        let mut ctx = InferenceContext::new(&node, &inputs, &[]);
        rule.infer(&mut ctx).unwrap();
        assert_eq!(ctx.into_outputs()[0].to_string(), "double: [4]");
    }
}
