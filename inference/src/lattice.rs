// lattice.rs — Symbolic dimension lattice
//
// Joins over Dim, Shape and TensorProperties. The join is the least common
// generalization: equal concrete sizes survive, everything else widens to
// unknown; rank disagreement widens to unknown rank. Join is commutative,
// associative and idempotent, and every propagated value only ever widens,
// which is what bounds the fixed-point loop in propagate.rs.
//
// Two flavours exist for combining many contributors:
// - `join_in_band`: used by Merge. An unknown-rank contributor forces an
//   unknown-rank result.
// - `join_informative`: used by resource joins. Unknown-rank contributors are
//   ignored; known information always wins over no information.
//
// `Shape::unify` is not a lattice operation. It is the refinement shape rules
// use when operands must agree (unknown yields to known, distinct knowns
// conflict).

use thiserror::Error;

use crate::types::{DataType, Dim, Shape, TensorProperties};

/// Two information sources disagree on the element type of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dtype mismatch: {left} vs {right}")]
pub struct DtypeConflict {
    pub left: DataType,
    pub right: DataType,
}

// ── Dim ─────────────────────────────────────────────────────────────────────

impl Dim {
    pub fn join(self, other: Dim) -> Dim {
        match (self, other) {
            (Dim::Known(a), Dim::Known(b)) if a == b => Dim::Known(a),
            _ => Dim::Unknown,
        }
    }

    /// `true` if `self` is at least as general as `other`.
    pub fn generalizes(self, other: Dim) -> bool {
        match (self, other) {
            (Dim::Unknown, _) => true,
            (Dim::Known(a), Dim::Known(b)) => a == b,
            (Dim::Known(_), Dim::Unknown) => false,
        }
    }

    /// Refinement: unknown yields to known; `None` if two knowns differ.
    pub fn unify(self, other: Dim) -> Option<Dim> {
        match (self, other) {
            (Dim::Unknown, d) | (d, Dim::Unknown) => Some(d),
            (Dim::Known(a), Dim::Known(b)) if a == b => Some(Dim::Known(a)),
            _ => None,
        }
    }
}

// ── Shape ───────────────────────────────────────────────────────────────────

impl Shape {
    pub fn join(&self, other: &Shape) -> Shape {
        match (self, other) {
            (Shape::Ranked(a), Shape::Ranked(b)) if a.len() == b.len() => {
                Shape::Ranked(a.iter().zip(b).map(|(x, y)| x.join(*y)).collect())
            }
            _ => Shape::UnknownRank,
        }
    }

    pub fn generalizes(&self, other: &Shape) -> bool {
        match (self, other) {
            (Shape::UnknownRank, _) => true,
            (Shape::Ranked(_), Shape::UnknownRank) => false,
            (Shape::Ranked(a), Shape::Ranked(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.generalizes(*y))
            }
        }
    }

    /// Join restricted to known-rank contributors. Empty set → unknown rank.
    pub fn join_informative<'a, I>(shapes: I) -> Shape
    where
        I: IntoIterator<Item = &'a Shape>,
    {
        let mut acc: Option<Shape> = None;
        for shape in shapes {
            if shape.is_unknown_rank() {
                continue;
            }
            acc = Some(match acc {
                None => shape.clone(),
                Some(prev) => prev.join(shape),
            });
        }
        acc.unwrap_or(Shape::UnknownRank)
    }

    /// Refinement used by shape rules that require agreement. Unknown rank
    /// yields to the other side; `None` on a rank or dimension conflict.
    pub fn unify(&self, other: &Shape) -> Option<Shape> {
        match (self, other) {
            (Shape::UnknownRank, s) | (s, Shape::UnknownRank) => Some(s.clone()),
            (Shape::Ranked(a), Shape::Ranked(b)) => {
                if a.len() != b.len() {
                    return None;
                }
                a.iter()
                    .zip(b)
                    .map(|(x, y)| x.unify(*y))
                    .collect::<Option<Vec<_>>>()
                    .map(Shape::Ranked)
            }
        }
    }
}

// ── DataType ────────────────────────────────────────────────────────────────

impl DataType {
    /// Agreement between two sources for the same slot. `Invalid` carries no
    /// information; reference-ness alone is not a disagreement and resolves
    /// to the value variant.
    pub fn agree(self, other: DataType) -> Result<DataType, DtypeConflict> {
        match (self, other) {
            (DataType::Invalid, t) | (t, DataType::Invalid) => Ok(t),
            (a, b) if a == b => Ok(a),
            (a, b) if a.base() == b.base() => Ok(a.base()),
            (left, right) => Err(DtypeConflict { left, right }),
        }
    }
}

// ── TensorProperties ────────────────────────────────────────────────────────

impl TensorProperties {
    pub fn join(&self, other: &TensorProperties) -> Result<TensorProperties, DtypeConflict> {
        Ok(TensorProperties {
            dtype: self.dtype.agree(other.dtype)?,
            shape: self.shape.join(&other.shape),
        })
    }

    pub fn generalizes(&self, other: &TensorProperties) -> bool {
        (!self.dtype.is_valid() || self.dtype.base() == other.dtype.base())
            && self.shape.generalizes(&other.shape)
    }
}

/// Merge-style join over every contributor. Empty input → fully unknown.
pub fn join_in_band<'a, I>(props: I) -> Result<TensorProperties, DtypeConflict>
where
    I: IntoIterator<Item = &'a TensorProperties>,
{
    let mut acc: Option<TensorProperties> = None;
    for p in props {
        acc = Some(match acc {
            None => p.clone(),
            Some(prev) => prev.join(p)?,
        });
    }
    Ok(acc.unwrap_or_default())
}

/// Resource-style join: dtypes must agree across every contributor, shapes
/// are joined over the known-rank contributors only.
pub fn join_informative<'a, I>(props: I) -> Result<TensorProperties, DtypeConflict>
where
    I: IntoIterator<Item = &'a TensorProperties>,
{
    let mut dtype = DataType::Invalid;
    let mut shapes = Vec::new();
    for p in props {
        dtype = dtype.agree(p.dtype)?;
        shapes.push(&p.shape);
    }
    Ok(TensorProperties {
        dtype,
        shape: Shape::join_informative(shapes),
    })
}
