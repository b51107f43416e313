//! Graph payload model
//!
//! Typed nodes and relationships under the fixed schema, plus the
//! graph-safety rules for property values: a property reaching the
//! store is a scalar, a homogeneous scalar array, or a JSON-encoded
//! string: never a record.

use indexmap::IndexMap;
use serde_json::Value;

use crate::types::Point3;

/// Node labels of the fixed schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLabel {
    Building,
    Floor,
    Space,
    WallSegment,
    Feature,
    BlockReference,
    Annotation,
    Metadata,
    OcrRegion,
    OcrText,
}

impl NodeLabel {
    pub fn name(&self) -> &'static str {
        match self {
            NodeLabel::Building => "Building",
            NodeLabel::Floor => "Floor",
            NodeLabel::Space => "Space",
            NodeLabel::WallSegment => "WallSegment",
            NodeLabel::Feature => "Feature",
            NodeLabel::BlockReference => "BlockReference",
            NodeLabel::Annotation => "Annotation",
            NodeLabel::Metadata => "Metadata",
            NodeLabel::OcrRegion => "OCRRegion",
            NodeLabel::OcrText => "OCRText",
        }
    }
}

/// Relationship types of the fixed schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelType {
    HasFloor,
    HasSpace,
    HasWall,
    HasFeature,
    HasAnnotation,
    HasBlockReference,
    HasMetadata,
    HasOcrRegion,
    ContainsText,
    Validates,
    Discovers,
}

impl RelType {
    pub fn name(&self) -> &'static str {
        match self {
            RelType::HasFloor => "HAS_FLOOR",
            RelType::HasSpace => "HAS_SPACE",
            RelType::HasWall => "HAS_WALL",
            RelType::HasFeature => "HAS_FEATURE",
            RelType::HasAnnotation => "HAS_ANNOTATION",
            RelType::HasBlockReference => "HAS_BLOCK_REFERENCE",
            RelType::HasMetadata => "HAS_METADATA",
            RelType::HasOcrRegion => "HAS_OCR_REGION",
            RelType::ContainsText => "CONTAINS_TEXT",
            RelType::Validates => "VALIDATES",
            RelType::Discovers => "DISCOVERS",
        }
    }
}

/// A node destined for the graph store.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub label: NodeLabel,
    pub uid: String,
    pub properties: IndexMap<String, Value>,
}

impl GraphNode {
    pub fn new(label: NodeLabel, uid: impl Into<String>) -> Self {
        GraphNode {
            label,
            uid: uid.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    /// Flatten a coordinate into `{key}_x`, `{key}_y`, `{key}_z`.
    pub fn set_point(&mut self, key: &str, p: Point3) {
        self.properties.insert(format!("{key}_x"), Value::from(p.x));
        self.properties.insert(format!("{key}_y"), Value::from(p.y));
        self.properties.insert(format!("{key}_z"), Value::from(p.z));
    }
}

/// A relationship destined for the graph store.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRelationship {
    pub start_label: NodeLabel,
    pub start_uid: String,
    pub rel_type: RelType,
    pub end_label: NodeLabel,
    pub end_uid: String,
    pub properties: IndexMap<String, Value>,
}

impl GraphRelationship {
    pub fn new(
        start: (NodeLabel, &str),
        rel_type: RelType,
        end: (NodeLabel, &str),
    ) -> Self {
        GraphRelationship {
            start_label: start.0,
            start_uid: start.1.to_string(),
            rel_type,
            end_label: end.0,
            end_uid: end.1.to_string(),
            properties: IndexMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

/// The transformed output of an ingest (or enrichment) ready for the
/// Batcher & Writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphPayload {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
}

impl GraphPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }

    /// Append another payload, preserving order.
    pub fn extend(&mut self, other: GraphPayload) {
        self.nodes.extend(other.nodes);
        self.relationships.extend(other.relationships);
    }
}

/// Scalar kind of an array element, for the homogeneity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarKind {
    Bool,
    Int,
    Float,
    Str,
}

fn scalar_kind(v: &Value) -> Option<ScalarKind> {
    match v {
        Value::Bool(_) => Some(ScalarKind::Bool),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some(ScalarKind::Int)
            } else {
                Some(ScalarKind::Float)
            }
        }
        Value::String(_) => Some(ScalarKind::Str),
        _ => None,
    }
}

/// Whether a value may be stored as a graph property as-is.
///
/// Scalars are safe; arrays are safe when empty or when every element
/// shares the scalar kind of the first element.
pub fn is_graph_safe(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => true,
        Value::Array(items) => {
            let Some(first) = items.first() else { return true };
            let Some(kind) = scalar_kind(first) else { return false };
            items.iter().all(|i| scalar_kind(i) == Some(kind))
        }
        Value::Object(_) => false,
    }
}

/// Coerce a value to a graph-safe one, serializing offenders to a JSON
/// string. Returns the safe value and whether coercion happened.
pub fn coerce_graph_safe(v: Value) -> (Value, bool) {
    if is_graph_safe(&v) {
        return (v, false);
    }
    let text = serde_json::to_string(&v).unwrap_or_else(|_| String::new());
    (Value::String(text), true)
}
