// rules.rs — Standard shape rules
//
// The built-in rule set installed by `Registry::standard()`. Every rule is a
// plain function over an `InferenceContext`; none of them knows about frames,
// resources or the fixed point, which are handled in propagate.rs.
//
// Preconditions: input properties may be partially or fully unknown.
// Postconditions: a rule pushes one TensorProperties per output slot, never
//   more specific than what its inputs justify.
// Failure modes: `RuleError` when inputs are provably inconsistent (concrete
//   dimension conflicts, rank mismatches, wrong argument shapes).
// Side effects: none.

use std::ops::Range;

use crate::registry::{InferenceContext, Registry, RuleError};
use crate::types::{DataType, Dim, Shape, TensorProperties};

type Rule = fn(&mut InferenceContext<'_>) -> Result<(), RuleError>;

const UNARY_ELEMENTWISE: &[&str] = &[
    "Identity",
    "Snapshot",
    "StopGradient",
    "PreventGradient",
    "Square",
    "Neg",
    "Abs",
    "Exp",
    "Log",
    "Sqrt",
    "Rsqrt",
    "Reciprocal",
    "Tanh",
    "Sigmoid",
    "Relu",
    "Relu6",
    "Elu",
    "Selu",
    "Softplus",
    "Sin",
    "Cos",
    "Floor",
    "Ceil",
    "Round",
    "Sign",
    "Softmax",
    "LogSoftmax",
    "ZerosLike",
    "OnesLike",
];

const BINARY_BROADCAST: &[&str] = &[
    "Add",
    "AddV2",
    "Sub",
    "Mul",
    "Div",
    "RealDiv",
    "FloorDiv",
    "FloorMod",
    "Maximum",
    "Minimum",
    "Pow",
    "SquaredDifference",
];

const COMPARISONS: &[&str] = &[
    "Less",
    "LessEqual",
    "Greater",
    "GreaterEqual",
    "Equal",
    "NotEqual",
    "LogicalAnd",
    "LogicalOr",
];

const REDUCTIONS: &[&str] = &["Sum", "Mean", "Max", "Min", "Prod", "All", "Any"];

const RANDOM: &[&str] = &[
    "RandomStandardNormal",
    "RandomNormal",
    "RandomUniform",
    "TruncatedNormal",
];

/// Largest rank read off a shape argument's length; longer vectors leave
/// the rank unknown.
const MAX_RANK: u64 = 254;

pub(crate) fn register_standard(registry: &mut Registry) {
    let groups: [(&[&str], Rule); 5] = [
        (UNARY_ELEMENTWISE, unary_elementwise),
        (BINARY_BROADCAST, binary_broadcast),
        (COMPARISONS, comparison),
        (REDUCTIONS, reduction),
        (RANDOM, random),
    ];
    for (ops, rule) in groups {
        for op in ops {
            registry.register_builtin(op, rule);
        }
    }

    let single: [(&str, Rule); 20] = [
        ("Const", constant),
        ("Placeholder", placeholder),
        ("PlaceholderV2", placeholder),
        ("PlaceholderWithDefault", placeholder_with_default),
        ("NoOp", no_outputs),
        ("RefIdentity", ref_identity),
        ("LogicalNot", logical_not),
        ("Cast", cast),
        ("Fill", fill),
        ("AddN", add_n),
        ("ConcatV2", concat_v2),
        ("Concat", concat_v1),
        ("Pack", pack),
        ("Reshape", reshape),
        ("Shape", shape_of),
        ("Size", size_or_rank),
        ("Rank", size_or_rank),
        ("ExpandDims", expand_dims),
        ("Squeeze", squeeze),
        ("Transpose", transpose),
    ];
    for (op, rule) in single {
        registry.register_builtin(op, rule);
    }
    registry.register_builtin("MatMul", mat_mul);
    registry.register_builtin("BiasAdd", bias_add);
    registry.register_builtin("Select", select);
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn agree_dtypes(ctx: &InferenceContext<'_>, inputs: Range<usize>) -> Result<DataType, RuleError> {
    let mut dtype = DataType::Invalid;
    for i in inputs {
        dtype = dtype
            .agree(ctx.input(i).dtype.base())
            .map_err(|e| RuleError::new(format!("input {}: {}", i, e)))?;
    }
    Ok(dtype)
}

fn normalize_axis(axis: i64, rank: usize) -> Result<usize, RuleError> {
    let r = rank as i64;
    let normalized = if axis < 0 { axis + r } else { axis };
    if normalized < 0 || normalized >= r {
        return Err(RuleError::new(format!(
            "axis {} is out of range for rank {}",
            axis, rank
        )));
    }
    Ok(normalized as usize)
}

fn scalar_int(ctx: &InferenceContext<'_>, index: usize) -> Option<i64> {
    match ctx.input_ints(index)?.as_slice() {
        [v] => Some(*v),
        _ => None,
    }
}

/// Shape described by a 1-D integer argument. A constant argument gives
/// the dimensions (`-1` entries stay unknown); otherwise only the rank can
/// be read off the argument's own length.
fn shape_argument(ctx: &InferenceContext<'_>, index: usize) -> Result<Shape, RuleError> {
    if let Some(values) = ctx.input_ints(index) {
        return Shape::from_i64s(&values).map_err(|e| RuleError::new(e.to_string()));
    }
    let arg = &ctx.input(index).shape;
    match arg.rank() {
        Some(1) => Ok(match arg.dim(0) {
            Some(Dim::Known(n)) if n <= MAX_RANK => Shape::unknown_dims(n as usize),
            _ => Shape::UnknownRank,
        }),
        Some(rank) => Err(RuleError::new(format!(
            "shape argument must be a vector, got rank {}",
            rank
        ))),
        None => Ok(Shape::UnknownRank),
    }
}

fn broadcast_dim(x: Dim, y: Dim) -> Option<Dim> {
    match (x, y) {
        (Dim::Known(1), d) | (d, Dim::Known(1)) => Some(d),
        (Dim::Known(a), Dim::Known(b)) => (a == b).then_some(Dim::Known(a)),
        (Dim::Known(a), Dim::Unknown) | (Dim::Unknown, Dim::Known(a)) => Some(Dim::Known(a)),
        (Dim::Unknown, Dim::Unknown) => Some(Dim::Unknown),
    }
}

/// Numpy-style broadcast of two shapes.
pub fn broadcast_shapes(a: &Shape, b: &Shape) -> Result<Shape, RuleError> {
    let (Some(da), Some(db)) = (a.dims(), b.dims()) else {
        return Ok(Shape::UnknownRank);
    };
    let rank = da.len().max(db.len());
    let pad_a = rank - da.len();
    let pad_b = rank - db.len();
    let mut out = Vec::with_capacity(rank);
    for i in 0..rank {
        let x = if i < pad_a { Dim::Known(1) } else { da[i - pad_a] };
        let y = if i < pad_b { Dim::Known(1) } else { db[i - pad_b] };
        out.push(broadcast_dim(x, y).ok_or_else(|| {
            RuleError::new(format!("incompatible shapes for broadcasting: {} and {}", a, b))
        })?);
    }
    Ok(Shape::Ranked(out))
}

// ── Sources ─────────────────────────────────────────────────────────────────

fn constant(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    let node = ctx.node();
    let value = node
        .attr_tensor("value")
        .ok_or_else(|| RuleError::new("missing tensor attribute 'value'"))?;
    let dtype = node.attr_type("dtype").unwrap_or(value.dtype);
    ctx.push_output(TensorProperties::new(dtype, value.shape.clone()));
    Ok(())
}

fn placeholder(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    let dtype = ctx.attr_type("dtype")?;
    let shape = ctx.node().attr_shape("shape").cloned().unwrap_or_default();
    ctx.push_output(TensorProperties::new(dtype, shape));
    Ok(())
}

fn placeholder_with_default(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    let dtype = ctx.attr_type("dtype")?;
    let shape = match ctx.node().attr_shape("shape") {
        Some(s) if !s.is_unknown_rank() => s.clone(),
        _ => ctx.input(0).shape.clone(),
    };
    ctx.push_output(TensorProperties::new(dtype, shape));
    Ok(())
}

fn random(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(1)?;
    let dtype = ctx.attr_type("dtype")?;
    let shape = shape_argument(ctx, 0)?;
    ctx.push_output(TensorProperties::new(dtype, shape));
    Ok(())
}

fn fill(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(2)?;
    let dtype = ctx.node().attr_type("T").unwrap_or(ctx.input(1).dtype.base());
    if let Some(rank) = ctx.input(1).shape.rank() {
        if rank != 0 {
            return Err(RuleError::new(format!(
                "fill value must be a scalar, got rank {}",
                rank
            )));
        }
    }
    let shape = shape_argument(ctx, 0)?;
    ctx.push_output(TensorProperties::new(dtype, shape));
    Ok(())
}

fn no_outputs(_ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    Ok(())
}

// ── Elementwise ─────────────────────────────────────────────────────────────

fn unary_elementwise(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(1)?;
    let input = ctx.input(0);
    ctx.push_output(TensorProperties::new(input.dtype.base(), input.shape.clone()));
    Ok(())
}

fn ref_identity(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(1)?;
    let input = ctx.input(0).clone();
    ctx.push_output(input);
    Ok(())
}

fn logical_not(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(1)?;
    let shape = ctx.input(0).shape.clone();
    ctx.push_output(TensorProperties::new(DataType::BOOL, shape));
    Ok(())
}

fn cast(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(1)?;
    let dtype = ctx.attr_type("DstT")?;
    let shape = ctx.input(0).shape.clone();
    ctx.push_output(TensorProperties::new(dtype, shape));
    Ok(())
}

fn binary_broadcast(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(2)?;
    let dtype = agree_dtypes(ctx, 0..2)?;
    let shape = broadcast_shapes(&ctx.input(0).shape, &ctx.input(1).shape)?;
    ctx.push_output(TensorProperties::new(dtype, shape));
    Ok(())
}

fn comparison(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(2)?;
    agree_dtypes(ctx, 0..2)?;
    let shape = broadcast_shapes(&ctx.input(0).shape, &ctx.input(1).shape)?;
    ctx.push_output(TensorProperties::new(DataType::BOOL, shape));
    Ok(())
}

fn bias_add(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(2)?;
    let dtype = agree_dtypes(ctx, 0..2)?;
    let shape = ctx.input(0).shape.clone();
    ctx.push_output(TensorProperties::new(dtype, shape));
    Ok(())
}

fn select(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(3)?;
    let dtype = agree_dtypes(ctx, 1..3)?;
    let shape = ctx
        .input(1)
        .shape
        .unify(&ctx.input(2).shape)
        .ok_or_else(|| {
            RuleError::new(format!(
                "branches have different shapes: {} and {}",
                ctx.input(1).shape,
                ctx.input(2).shape
            ))
        })?;
    ctx.push_output(TensorProperties::new(dtype, shape));
    Ok(())
}

fn add_n(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(1)?;
    let n = ctx.num_inputs();
    let dtype = agree_dtypes(ctx, 0..n)?;
    let mut shape = Shape::UnknownRank;
    for (i, input) in ctx.inputs().iter().enumerate() {
        shape = shape.unify(&input.shape).ok_or_else(|| {
            RuleError::new(format!("input {} has shape {}, expected {}", i, input.shape, shape))
        })?;
    }
    ctx.push_output(TensorProperties::new(dtype, shape));
    Ok(())
}

// ── Structural ──────────────────────────────────────────────────────────────

fn concat_v2(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(2)?;
    let n = ctx.num_inputs();
    concat_values(ctx, 0..n - 1, n - 1)
}

fn concat_v1(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(2)?;
    let n = ctx.num_inputs();
    concat_values(ctx, 1..n, 0)
}

fn concat_values(
    ctx: &mut InferenceContext<'_>,
    values: Range<usize>,
    axis_input: usize,
) -> Result<(), RuleError> {
    let dtype = agree_dtypes(ctx, values.clone())?;
    let Some(rank) = values.clone().find_map(|i| ctx.input(i).shape.rank()) else {
        ctx.push_output(TensorProperties::new(dtype, Shape::UnknownRank));
        return Ok(());
    };
    let Some(axis) = scalar_int(ctx, axis_input) else {
        ctx.push_output(TensorProperties::new(dtype, Shape::unknown_dims(rank)));
        return Ok(());
    };
    let axis = normalize_axis(axis, rank)?;

    let mut out = vec![Dim::Unknown; rank];
    let mut axis_total = Some(0u64);
    for i in values {
        let Some(dims) = ctx.input(i).shape.dims() else {
            axis_total = None;
            continue;
        };
        if dims.len() != rank {
            return Err(RuleError::new(format!(
                "input {} has rank {}, expected {}",
                i,
                dims.len(),
                rank
            )));
        }
        for (k, dim) in dims.iter().enumerate() {
            if k == axis {
                axis_total = axis_total.zip(dim.value()).map(|(a, b)| a + b);
            } else {
                out[k] = out[k].unify(*dim).ok_or_else(|| {
                    RuleError::new(format!(
                        "dimension {} of input {} is {}, expected {}",
                        k, i, dim, out[k]
                    ))
                })?;
            }
        }
    }
    out[axis] = axis_total.map_or(Dim::Unknown, Dim::Known);
    ctx.push_output(TensorProperties::new(dtype, Shape::Ranked(out)));
    Ok(())
}

fn pack(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(1)?;
    let n = ctx.num_inputs();
    let dtype = agree_dtypes(ctx, 0..n)?;
    let mut shape = Shape::UnknownRank;
    for input in ctx.inputs() {
        shape = shape.unify(&input.shape).ok_or_else(|| {
            RuleError::new(format!("packed values differ: {} and {}", shape, input.shape))
        })?;
    }
    let out = match shape {
        Shape::UnknownRank => Shape::UnknownRank,
        Shape::Ranked(mut dims) => {
            let axis = ctx.node().attr_int("axis").unwrap_or(0);
            let axis = normalize_axis(axis, dims.len() + 1)?;
            dims.insert(axis, Dim::Known(n as u64));
            Shape::Ranked(dims)
        }
    };
    ctx.push_output(TensorProperties::new(dtype, out));
    Ok(())
}

fn reshape(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(2)?;
    let input = ctx.input(0);
    let dtype = input.dtype.base();
    let target = shape_argument(ctx, 1)?;
    let out = match (&target, input.shape.num_elements()) {
        (Shape::Ranked(dims), Some(total)) => {
            let mismatch = || {
                RuleError::new(format!(
                    "cannot reshape a tensor with {} elements to {}",
                    total, target
                ))
            };
            let wildcards = dims.iter().filter(|d| !d.is_known()).count();
            let Some(known) = dims
                .iter()
                .filter_map(|d| d.value())
                .try_fold(1u64, |acc, d| acc.checked_mul(d))
            else {
                ctx.push_output(TensorProperties::new(dtype, target.clone()));
                return Ok(());
            };
            match wildcards {
                0 if known != total => return Err(mismatch()),
                1 if known > 0 => {
                    if total % known != 0 {
                        return Err(mismatch());
                    }
                    Shape::Ranked(
                        dims.iter()
                            .map(|d| if d.is_known() { *d } else { Dim::Known(total / known) })
                            .collect(),
                    )
                }
                _ => target.clone(),
            }
        }
        _ => target.clone(),
    };
    ctx.push_output(TensorProperties::new(dtype, out));
    Ok(())
}

fn shape_of(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(1)?;
    let dtype = ctx.node().attr_type("out_type").unwrap_or(DataType::INT32);
    let len = match ctx.input(0).shape.rank() {
        Some(rank) => Dim::Known(rank as u64),
        None => Dim::Unknown,
    };
    ctx.push_output(TensorProperties::new(dtype, Shape::Ranked(vec![len])));
    Ok(())
}

fn size_or_rank(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(1)?;
    let dtype = ctx.node().attr_type("out_type").unwrap_or(DataType::INT32);
    ctx.push_output(TensorProperties::new(dtype, Shape::scalar()));
    Ok(())
}

fn expand_dims(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(2)?;
    let input = ctx.input(0);
    let dtype = input.dtype.base();
    let out = match (input.shape.dims(), scalar_int(ctx, 1)) {
        (Some(dims), Some(axis)) => {
            let axis = normalize_axis(axis, dims.len() + 1)?;
            let mut dims = dims.to_vec();
            dims.insert(axis, Dim::Known(1));
            Shape::Ranked(dims)
        }
        (Some(dims), None) => Shape::unknown_dims(dims.len() + 1),
        (None, _) => Shape::UnknownRank,
    };
    ctx.push_output(TensorProperties::new(dtype, out));
    Ok(())
}

fn squeeze(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(1)?;
    let input = ctx.input(0);
    let dtype = input.dtype.base();
    let requested: Vec<i64> = ctx
        .node()
        .attr_list("squeeze_dims")
        .map(|l| l.i.clone())
        .unwrap_or_default();
    let Some(dims) = input.shape.dims() else {
        ctx.push_output(TensorProperties::new(dtype, Shape::UnknownRank));
        return Ok(());
    };
    let out = if requested.is_empty() {
        if dims.iter().any(|d| !d.is_known()) {
            Shape::UnknownRank
        } else {
            Shape::Ranked(dims.iter().copied().filter(|d| *d != Dim::Known(1)).collect())
        }
    } else {
        let mut drop = vec![false; dims.len()];
        for &axis in &requested {
            let axis = normalize_axis(axis, dims.len())?;
            if let Dim::Known(n) = dims[axis] {
                if n != 1 {
                    return Err(RuleError::new(format!(
                        "cannot squeeze dimension {} of size {}",
                        axis, n
                    )));
                }
            }
            drop[axis] = true;
        }
        Shape::Ranked(
            dims.iter()
                .zip(drop)
                .filter(|(_, d)| !d)
                .map(|(dim, _)| *dim)
                .collect(),
        )
    };
    ctx.push_output(TensorProperties::new(dtype, out));
    Ok(())
}

fn transpose(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(2)?;
    let input = ctx.input(0);
    let dtype = input.dtype.base();
    let out = match (input.shape.dims(), ctx.input_ints(1)) {
        (Some(dims), Some(perm)) => {
            if perm.len() != dims.len() {
                return Err(RuleError::new(format!(
                    "permutation has {} entries for rank {}",
                    perm.len(),
                    dims.len()
                )));
            }
            let permuted = perm
                .iter()
                .map(|&p| normalize_axis(p, dims.len()).map(|p| dims[p]))
                .collect::<Result<Vec<_>, _>>()?;
            Shape::Ranked(permuted)
        }
        (Some(dims), None) => Shape::unknown_dims(dims.len()),
        (None, Some(perm)) => Shape::unknown_dims(perm.len()),
        (None, None) => match shape_argument(ctx, 1)? {
            Shape::Ranked(perm) => Shape::unknown_dims(perm.len()),
            Shape::UnknownRank => Shape::UnknownRank,
        },
    };
    ctx.push_output(TensorProperties::new(dtype, out));
    Ok(())
}

fn mat_mul(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(2)?;
    let dtype = agree_dtypes(ctx, 0..2)?;
    let transpose_a = ctx.node().attr_bool("transpose_a").unwrap_or(false);
    let transpose_b = ctx.node().attr_bool("transpose_b").unwrap_or(false);

    let matrix = |index: usize, transposed: bool| -> Result<(Dim, Dim), RuleError> {
        match ctx.input(index).shape.dims() {
            None => Ok((Dim::Unknown, Dim::Unknown)),
            Some([rows, cols]) if transposed => Ok((*cols, *rows)),
            Some([rows, cols]) => Ok((*rows, *cols)),
            Some(dims) => Err(RuleError::new(format!(
                "input {} must be a matrix, got rank {}",
                index,
                dims.len()
            ))),
        }
    };
    let (m, k_a) = matrix(0, transpose_a)?;
    let (k_b, n) = matrix(1, transpose_b)?;
    k_a.unify(k_b).ok_or_else(|| {
        RuleError::new(format!("inner dimensions {} and {} differ", k_a, k_b))
    })?;
    ctx.push_output(TensorProperties::new(dtype, Shape::Ranked(vec![m, n])));
    Ok(())
}

fn reduction(ctx: &mut InferenceContext<'_>) -> Result<(), RuleError> {
    ctx.expect_inputs(2)?;
    let input = ctx.input(0);
    let dtype = input.dtype.base();
    let keep_dims = ctx.node().attr_bool("keep_dims").unwrap_or(false);
    let out = match (input.shape.dims(), ctx.input_ints(1)) {
        (Some(dims), Some(axes)) => {
            let mut reduced = vec![false; dims.len()];
            for &axis in &axes {
                reduced[normalize_axis(axis, dims.len())?] = true;
            }
            Shape::Ranked(
                dims.iter()
                    .zip(reduced)
                    .filter_map(|(dim, r)| match (r, keep_dims) {
                        (true, true) => Some(Dim::Known(1)),
                        (true, false) => None,
                        (false, _) => Some(*dim),
                    })
                    .collect(),
            )
        }
        (Some(dims), None) if keep_dims => Shape::unknown_dims(dims.len()),
        _ => Shape::UnknownRank,
    };
    ctx.push_output(TensorProperties::new(dtype, out));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{AttrValue, ListValue, Node, TensorValue};

    fn p(text: &str) -> TensorProperties {
        text.parse().unwrap()
    }

    fn run(
        rule: Rule,
        node: &Node,
        inputs: &[TensorProperties],
        tensors: &[Option<TensorValue>],
    ) -> Result<Vec<String>, RuleError> {
        let mut ctx = InferenceContext::new(node, inputs, tensors);
        rule(&mut ctx)?;
        Ok(ctx.into_outputs().iter().map(|o| o.to_string()).collect())
    }

    #[test]
    fn broadcasting_follows_numpy_rules() {
        let s = |t: &str| t.parse::<Shape>().unwrap();
        assert_eq!(broadcast_shapes(&s("[3,1]"), &s("[4]")).unwrap(), s("[3,4]"));
        assert_eq!(broadcast_shapes(&s("[-1,2]"), &s("[2]")).unwrap(), s("[-1,2]"));
        assert_eq!(broadcast_shapes(&s("[-1]"), &s("[5]")).unwrap(), s("[5]"));
        assert_eq!(
            broadcast_shapes(&Shape::UnknownRank, &s("[5]")).unwrap(),
            Shape::UnknownRank
        );
        assert!(broadcast_shapes(&s("[3]"), &s("[4]")).is_err());
    }

    #[test]
    fn random_shape_comes_from_constant_argument() {
        let mut node = Node::new("r", "RandomStandardNormal");
        node.attr.insert("dtype".into(), AttrValue::Type(DataType::FLOAT));
        let inputs = [p("int32: [4]")];
        let tensors = [Some(TensorValue::int_vector(&[10, 2, 3, 4]))];
        assert_eq!(
            run(random, &node, &inputs, &tensors).unwrap(),
            ["float: [10,2,3,4]"]
        );
        // Without the value only the rank is known.
        assert_eq!(
            run(random, &node, &inputs, &[None]).unwrap(),
            ["float: [-1,-1,-1,-1]"]
        );
        let inputs = [TensorProperties::new(DataType::INT32, Shape::known(&[1 << 62]))];
        assert_eq!(run(random, &node, &inputs, &[None]).unwrap(), ["float: ?"]);
    }

    #[test]
    fn concat_sums_axis_and_unifies_the_rest() {
        let node = Node::new("c", "ConcatV2");
        let inputs = [p("float: [1,1,1]"), p("float: [1,1,1]"), p("int32: []")];
        let tensors = [None, None, Some(TensorValue::int_scalar(0))];
        assert_eq!(
            run(concat_v2, &node, &inputs, &tensors).unwrap(),
            ["float: [2,1,1]"]
        );

        let inputs = [p("float: [-1,2]"), p("float: [3,-1]"), p("int32: []")];
        let tensors = [None, None, Some(TensorValue::int_scalar(-1))];
        assert_eq!(
            run(concat_v2, &node, &inputs, &tensors).unwrap(),
            ["float: [3,-1]"]
        );
    }

    #[test]
    fn concat_rejects_conflicting_non_axis_dims() {
        let node = Node::new("c", "ConcatV2");
        let inputs = [p("float: [2,3]"), p("float: [2,4]"), p("int32: []")];
        let tensors = [None, None, Some(TensorValue::int_scalar(0))];
        assert!(run(concat_v2, &node, &inputs, &tensors).is_err());
    }

    #[test]
    fn reshape_infers_wildcard() {
        let node = Node::new("r", "Reshape");
        let inputs = [p("float: [6,4]"), p("int32: [2]")];
        let tensors = [None, Some(TensorValue::int_vector(&[-1, 8]))];
        assert_eq!(run(reshape, &node, &inputs, &tensors).unwrap(), ["float: [3,8]"]);

        let tensors = [None, Some(TensorValue::int_vector(&[5, 5]))];
        assert!(run(reshape, &node, &inputs, &tensors).is_err());

        let big = 1i64 << 40;
        let tensors = [None, Some(TensorValue::int_vector(&[big, big, -1]))];
        assert_eq!(
            run(reshape, &node, &inputs, &tensors).unwrap(),
            ["float: [1099511627776,1099511627776,-1]"]
        );
    }

    #[test]
    fn mat_mul_checks_inner_dimension() {
        let mut node = Node::new("mm", "MatMul");
        let inputs = [p("float: [2,3]"), p("float: [3,5]")];
        assert_eq!(run(mat_mul, &node, &inputs, &[]).unwrap(), ["float: [2,5]"]);

        node.attr.insert("transpose_b".into(), AttrValue::B(true));
        let err = run(mat_mul, &node, &inputs, &[]).unwrap_err();
        assert_eq!(err.to_string(), "inner dimensions 3 and 5 differ");
    }

    #[test]
    fn add_n_refines_across_inputs() {
        let node = Node::new("a", "AddN");
        let inputs = [p("float: [-1,2]"), p("float: [4,-1]")];
        assert_eq!(run(add_n, &node, &inputs, &[]).unwrap(), ["float: [4,2]"]);
        let inputs = [p("float: [2]"), p("double: [2]")];
        assert!(run(add_n, &node, &inputs, &[]).is_err());
    }

    #[test]
    fn squeeze_and_reduce() {
        let mut node = Node::new("s", "Squeeze");
        let inputs = [p("float: [1,3,1]")];
        assert_eq!(run(squeeze, &node, &inputs, &[]).unwrap(), ["float: [3]"]);
        node.attr.insert(
            "squeeze_dims".into(),
            AttrValue::List(ListValue {
                i: vec![-1],
                ..ListValue::default()
            }),
        );
        assert_eq!(run(squeeze, &node, &inputs, &[]).unwrap(), ["float: [1,3]"]);

        let node = Node::new("m", "Mean");
        let inputs = [p("float: [4,5,6]"), p("int32: [1]")];
        let tensors = [None, Some(TensorValue::int_vector(&[1]))];
        assert_eq!(run(reduction, &node, &inputs, &tensors).unwrap(), ["float: [4,6]"]);
    }

    #[test]
    fn identity_strips_reference() {
        let node = Node::new("i", "Identity");
        let inputs = [p("float_ref: [3,7]")];
        assert_eq!(
            run(unary_elementwise, &node, &inputs, &[]).unwrap(),
            ["float: [3,7]"]
        );
        assert_eq!(
            run(ref_identity, &node, &inputs, &[]).unwrap(),
            ["float_ref: [3,7]"]
        );
    }

    #[test]
    fn comparison_yields_bool() {
        let node = Node::new("l", "Less");
        let inputs = [p("int32: []"), p("int32: []")];
        assert_eq!(run(comparison, &node, &inputs, &[]).unwrap(), ["bool: []"]);
    }
}
