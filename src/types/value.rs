//! Canonical attribute values
//!
//! `AttrValue` is the closed sum of everything a canonical entity may
//! carry: scalars, homogeneous scalar arrays, and coordinate records.
//! The Normalizer can construct nothing outside this sum, which is what
//! keeps nested records and arbitrary-precision numbers out of the
//! downstream pipeline.

use serde_json::{json, Value};

use super::coordinate::Point3;

/// A canonical attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    StrArray(Vec<String>),
    /// A single coordinate record `{x, y, z}`
    Point(Point3),
    /// An array of coordinate records (polyline points)
    Points(Vec<Point3>),
}

impl AttrValue {
    /// Numeric view: integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<&Point3> {
        match self {
            AttrValue::Point(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_points(&self) -> Option<&[Point3]> {
        match self {
            AttrValue::Points(ps) => Some(ps),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "string",
            AttrValue::BoolArray(_) => "bool[]",
            AttrValue::IntArray(_) => "int[]",
            AttrValue::FloatArray(_) => "float[]",
            AttrValue::StrArray(_) => "string[]",
            AttrValue::Point(_) => "point",
            AttrValue::Points(_) => "point[]",
        }
    }

    /// Render as a JSON value.
    ///
    /// Coordinates keep their `{x, y, z}` record shape here; the
    /// projector is responsible for flattening them before anything
    /// reaches the graph store.
    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Bool(b) => json!(b),
            AttrValue::Int(i) => json!(i),
            AttrValue::Float(f) => json!(f),
            AttrValue::Str(s) => json!(s),
            AttrValue::BoolArray(v) => json!(v),
            AttrValue::IntArray(v) => json!(v),
            AttrValue::FloatArray(v) => json!(v),
            AttrValue::StrArray(v) => json!(v),
            AttrValue::Point(p) => json!({"x": p.x, "y": p.y, "z": p.z}),
            AttrValue::Points(ps) => Value::Array(
                ps.iter().map(|p| json!({"x": p.x, "y": p.y, "z": p.z})).collect(),
            ),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        AttrValue::Float(f)
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<Point3> for AttrValue {
    fn from(p: Point3) -> Self {
        AttrValue::Point(p)
    }
}
