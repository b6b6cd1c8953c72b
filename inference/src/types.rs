// types.rs — Tensor property data model
//
// DataType, Dim, Shape and TensorProperties: the unit of inference output,
// attached to one (node, output slot). Lattice operations over these types
// live in lattice.rs.
//
// Rendering: "<dtype>: ?" for unknown rank, "<dtype>: [d0,d1,...]" otherwise,
// with -1 for each unknown dimension.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Parse errors ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeParseError {
    #[error("unknown data type '{0}'")]
    UnknownDataType(String),
    #[error("invalid shape '{0}'")]
    InvalidShape(String),
    #[error("invalid dimension {0} (expected -1 or a non-negative size)")]
    InvalidDim(i64),
    #[error("invalid tensor properties '{0}' (expected '<dtype>: <shape>')")]
    InvalidProperties(String),
}

// ── Element types ───────────────────────────────────────────────────────────

/// Tensor element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    Float,
    Double,
    Half,
    BFloat16,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Bool,
    String,
    Complex64,
    Complex128,
    Resource,
    Variant,
}

impl ElementType {
    pub const ALL: [ElementType; 18] = [
        ElementType::Float,
        ElementType::Double,
        ElementType::Half,
        ElementType::BFloat16,
        ElementType::Int8,
        ElementType::Int16,
        ElementType::Int32,
        ElementType::Int64,
        ElementType::UInt8,
        ElementType::UInt16,
        ElementType::UInt32,
        ElementType::UInt64,
        ElementType::Bool,
        ElementType::String,
        ElementType::Complex64,
        ElementType::Complex128,
        ElementType::Resource,
        ElementType::Variant,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ElementType::Float => "float",
            ElementType::Double => "double",
            ElementType::Half => "half",
            ElementType::BFloat16 => "bfloat16",
            ElementType::Int8 => "int8",
            ElementType::Int16 => "int16",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::UInt8 => "uint8",
            ElementType::UInt16 => "uint16",
            ElementType::UInt32 => "uint32",
            ElementType::UInt64 => "uint64",
            ElementType::Bool => "bool",
            ElementType::String => "string",
            ElementType::Complex64 => "complex64",
            ElementType::Complex128 => "complex128",
            ElementType::Resource => "resource",
            ElementType::Variant => "variant",
        }
    }

    pub fn from_name(name: &str) -> Option<ElementType> {
        ElementType::ALL.iter().copied().find(|t| t.name() == name)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ElementType::Int8
                | ElementType::Int16
                | ElementType::Int32
                | ElementType::Int64
                | ElementType::UInt8
                | ElementType::UInt16
                | ElementType::UInt32
                | ElementType::UInt64
        )
    }
}

// ── DataType ─────────────────────────────────────────────────────────────────

/// Element type of a tensor slot, including the reference variants used by
/// mutable storage and the distinguished `Invalid` (unknown) value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    #[default]
    Invalid,
    Value(ElementType),
    Ref(ElementType),
}

impl DataType {
    pub const FLOAT: DataType = DataType::Value(ElementType::Float);
    pub const DOUBLE: DataType = DataType::Value(ElementType::Double);
    pub const INT32: DataType = DataType::Value(ElementType::Int32);
    pub const INT64: DataType = DataType::Value(ElementType::Int64);
    pub const BOOL: DataType = DataType::Value(ElementType::Bool);
    pub const STRING: DataType = DataType::Value(ElementType::String);
    pub const RESOURCE: DataType = DataType::Value(ElementType::Resource);

    pub fn is_valid(self) -> bool {
        self != DataType::Invalid
    }

    pub fn is_ref(self) -> bool {
        matches!(self, DataType::Ref(_))
    }

    pub fn element(self) -> Option<ElementType> {
        match self {
            DataType::Invalid => None,
            DataType::Value(t) | DataType::Ref(t) => Some(t),
        }
    }

    /// The reference variant of this type (`float` → `float_ref`).
    pub fn to_ref(self) -> DataType {
        match self {
            DataType::Value(t) => DataType::Ref(t),
            other => other,
        }
    }

    /// Strip the reference qualifier (`float_ref` → `float`).
    pub fn base(self) -> DataType {
        match self {
            DataType::Ref(t) => DataType::Value(t),
            other => other,
        }
    }
}

impl From<ElementType> for DataType {
    fn from(t: ElementType) -> Self {
        DataType::Value(t)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Invalid => write!(f, "invalid"),
            DataType::Value(t) => write!(f, "{}", t.name()),
            DataType::Ref(t) => write!(f, "{}_ref", t.name()),
        }
    }
}

impl FromStr for DataType {
    type Err = TypeParseError;

    /// Accepts `float`, `float_ref`, `invalid`, and the `DT_FLOAT` /
    /// `DT_FLOAT_REF` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = lowered.strip_prefix("dt_").unwrap_or(&lowered);
        if name == "invalid" {
            return Ok(DataType::Invalid);
        }
        let (elem, is_ref) = match name.strip_suffix("_ref") {
            Some(base) => (base, true),
            None => (name, false),
        };
        let elem = ElementType::from_name(elem)
            .ok_or_else(|| TypeParseError::UnknownDataType(s.to_string()))?;
        Ok(if is_ref {
            DataType::Ref(elem)
        } else {
            DataType::Value(elem)
        })
    }
}

impl TryFrom<String> for DataType {
    type Error = TypeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DataType> for String {
    fn from(dtype: DataType) -> Self {
        dtype.to_string()
    }
}

// ── Dimensions and shapes ───────────────────────────────────────────────────

/// One dimension of a ranked shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Known(u64),
    /// Rendered as `-1`. Two unknown dims are never presumed equal.
    Unknown,
}

impl Dim {
    /// `-1` → `Unknown`, `n >= 0` → `Known(n)`, anything else → `None`.
    pub fn from_i64(v: i64) -> Option<Dim> {
        match v {
            -1 => Some(Dim::Unknown),
            n if n >= 0 => Some(Dim::Known(n as u64)),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Dim::Known(n) => n as i64,
            Dim::Unknown => -1,
        }
    }

    pub fn value(self) -> Option<u64> {
        match self {
            Dim::Known(n) => Some(n),
            Dim::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, Dim::Known(_))
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// A tensor shape: unknown rank, or an ordered list of dimensions
/// (empty for scalars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Option<Vec<i64>>", into = "Option<Vec<i64>>")]
pub enum Shape {
    #[default]
    UnknownRank,
    Ranked(Vec<Dim>),
}

impl Shape {
    pub fn scalar() -> Shape {
        Shape::Ranked(Vec::new())
    }

    /// Fully-known shape from concrete sizes.
    pub fn known(dims: &[u64]) -> Shape {
        Shape::Ranked(dims.iter().map(|&d| Dim::Known(d)).collect())
    }

    /// Known rank, every dimension unknown.
    pub fn unknown_dims(rank: usize) -> Shape {
        Shape::Ranked(vec![Dim::Unknown; rank])
    }

    /// Shape from the `-1`-for-unknown integer convention.
    pub fn from_i64s(dims: &[i64]) -> Result<Shape, TypeParseError> {
        dims.iter()
            .map(|&d| Dim::from_i64(d).ok_or(TypeParseError::InvalidDim(d)))
            .collect::<Result<Vec<_>, _>>()
            .map(Shape::Ranked)
    }

    pub fn rank(&self) -> Option<usize> {
        self.dims().map(|d| d.len())
    }

    pub fn dims(&self) -> Option<&[Dim]> {
        match self {
            Shape::UnknownRank => None,
            Shape::Ranked(dims) => Some(dims),
        }
    }

    pub fn dim(&self, index: usize) -> Option<Dim> {
        self.dims().and_then(|d| d.get(index).copied())
    }

    pub fn is_unknown_rank(&self) -> bool {
        matches!(self, Shape::UnknownRank)
    }

    pub fn is_fully_defined(&self) -> bool {
        self.dims().is_some_and(|d| d.iter().all(|x| x.is_known()))
    }

    /// Element count when every dimension is known.
    pub fn num_elements(&self) -> Option<u64> {
        let dims = self.dims()?;
        dims.iter()
            .try_fold(1u64, |acc, d| d.value().map(|v| acc.saturating_mul(v)))
    }

    pub fn to_i64s(&self) -> Option<Vec<i64>> {
        self.dims().map(|d| d.iter().map(|x| x.as_i64()).collect())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::UnknownRank => write!(f, "?"),
            Shape::Ranked(dims) => {
                write!(f, "[")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", d)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl FromStr for Shape {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "?" {
            return Ok(Shape::UnknownRank);
        }
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .ok_or_else(|| TypeParseError::InvalidShape(s.to_string()))?;
        if inner.trim().is_empty() {
            return Ok(Shape::scalar());
        }
        let dims = inner
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<i64>()
                    .map_err(|_| TypeParseError::InvalidShape(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Shape::from_i64s(&dims)
    }
}

impl TryFrom<Option<Vec<i64>>> for Shape {
    type Error = TypeParseError;

    fn try_from(dims: Option<Vec<i64>>) -> Result<Self, Self::Error> {
        match dims {
            None => Ok(Shape::UnknownRank),
            Some(dims) => Shape::from_i64s(&dims),
        }
    }
}

impl From<Shape> for Option<Vec<i64>> {
    fn from(shape: Shape) -> Self {
        shape.to_i64s()
    }
}

// ── TensorProperties ────────────────────────────────────────────────────────

/// Inferred (dtype, shape) of one output slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TensorProperties {
    pub dtype: DataType,
    pub shape: Shape,
}

impl TensorProperties {
    pub fn new(dtype: DataType, shape: Shape) -> Self {
        TensorProperties { dtype, shape }
    }

    /// Fully unknown: invalid dtype, unknown rank.
    pub fn unknown() -> Self {
        TensorProperties::default()
    }

    /// Known dtype, unknown rank.
    pub fn of_type(dtype: DataType) -> Self {
        TensorProperties {
            dtype,
            shape: Shape::UnknownRank,
        }
    }
}

impl fmt::Display for TensorProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.dtype, self.shape)
    }
}

impl FromStr for TensorProperties {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (dtype, shape) = s
            .split_once(':')
            .ok_or_else(|| TypeParseError::InvalidProperties(s.to_string()))?;
        Ok(TensorProperties {
            dtype: dtype.parse()?,
            shape: shape.parse()?,
        })
    }
}
