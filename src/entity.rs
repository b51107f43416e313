//! Canonical CAD entities
//!
//! The tagged output of the Normalizer. `EntityKind` is a closed sum
//! over the entity types the pipeline understands; raw records that fit
//! neither the name table nor the numeric type-code table never become
//! canonical entities.

use ahash::AHashMap;
use bitflags::bitflags;
use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::types::{AttrValue, Point3};

bitflags! {
    /// Polyline flags word (DXF group 70).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PolylineFlags: u32 {
        /// Bit 0: the polyline is closed
        const CLOSED = 0b0000_0001;
        /// Bit 7: linetype pattern generation continues around vertices
        const PLINEGEN = 0b1000_0000;
    }
}

/// Canonical entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Line,
    LwPolyline,
    Polyline2D,
    Polyline3D,
    Circle,
    Arc,
    Text,
    MText,
    Attrib,
    AttDef,
    MultiLeader,
    Insert,
    ScaleInfo,
}

/// Fixed numeric type-code table.
///
/// Some parsers emit numeric type identifiers instead of names; these
/// are the codes the pipeline translates.
static TYPE_CODES: Lazy<AHashMap<i64, EntityKind>> = Lazy::new(|| {
    let mut table = AHashMap::new();
    table.insert(1, EntityKind::Text);
    table.insert(2, EntityKind::Attrib);
    table.insert(3, EntityKind::AttDef);
    table.insert(7, EntityKind::Insert);
    table.insert(19, EntityKind::Polyline2D);
    table.insert(20, EntityKind::Polyline3D);
    table.insert(21, EntityKind::Arc);
    table.insert(22, EntityKind::Circle);
    table.insert(23, EntityKind::Line);
    table.insert(44, EntityKind::MText);
    table.insert(77, EntityKind::LwPolyline);
    table
});

impl EntityKind {
    /// Canonical upper-case name.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Line => "LINE",
            EntityKind::LwPolyline => "LWPOLYLINE",
            EntityKind::Polyline2D => "POLYLINE_2D",
            EntityKind::Polyline3D => "POLYLINE_3D",
            EntityKind::Circle => "CIRCLE",
            EntityKind::Arc => "ARC",
            EntityKind::Text => "TEXT",
            EntityKind::MText => "MTEXT",
            EntityKind::Attrib => "ATTRIB",
            EntityKind::AttDef => "ATTDEF",
            EntityKind::MultiLeader => "MULTILEADER",
            EntityKind::Insert => "INSERT",
            EntityKind::ScaleInfo => "SCALE_INFO",
        }
    }

    /// Look up a kind by its name tag (case-insensitive).
    pub fn from_name(name: &str) -> Option<EntityKind> {
        match name.trim().to_ascii_uppercase().as_str() {
            "LINE" => Some(EntityKind::Line),
            "LWPOLYLINE" => Some(EntityKind::LwPolyline),
            "POLYLINE_2D" | "POLYLINE2D" => Some(EntityKind::Polyline2D),
            "POLYLINE_3D" | "POLYLINE3D" => Some(EntityKind::Polyline3D),
            "CIRCLE" => Some(EntityKind::Circle),
            "ARC" => Some(EntityKind::Arc),
            "TEXT" => Some(EntityKind::Text),
            "MTEXT" => Some(EntityKind::MText),
            "ATTRIB" => Some(EntityKind::Attrib),
            "ATTDEF" => Some(EntityKind::AttDef),
            "MULTILEADER" => Some(EntityKind::MultiLeader),
            "INSERT" => Some(EntityKind::Insert),
            "SCALE_INFO" => Some(EntityKind::ScaleInfo),
            _ => None,
        }
    }

    /// Look up a kind by its numeric type code.
    ///
    /// Returns `None` for codes outside the fixed table (class-based
    /// object types); the Normalizer counts those as unrecognized.
    pub fn from_type_code(code: i64) -> Option<EntityKind> {
        TYPE_CODES.get(&code).copied()
    }

    /// Whether this kind carries text content.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            EntityKind::Text
                | EntityKind::MText
                | EntityKind::Attrib
                | EntityKind::AttDef
                | EntityKind::MultiLeader
        )
    }
}

/// A normalized CAD entity.
///
/// Never mutated after construction; consumed once by the projector.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEntity {
    pub kind: EntityKind,
    pub layer: String,
    pub attributes: IndexMap<String, AttrValue>,
}

impl CanonicalEntity {
    /// Create an entity on the default layer `"0"`.
    pub fn new(kind: EntityKind) -> Self {
        CanonicalEntity {
            kind,
            layer: "0".to_string(),
            attributes: IndexMap::new(),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// First attribute present among `keys`.
    pub fn first_attr(&self, keys: &[&str]) -> Option<&AttrValue> {
        keys.iter().find_map(|k| self.attributes.get(*k))
    }

    /// Numeric attribute with fallback names.
    pub fn numeric(&self, keys: &[&str], default: f64) -> f64 {
        self.first_attr(keys).and_then(AttrValue::as_f64).unwrap_or(default)
    }

    /// Coordinate attribute with fallback names.
    pub fn point(&self, keys: &[&str]) -> Option<Point3> {
        self.first_attr(keys).and_then(AttrValue::as_point).copied()
    }

    /// Polyline vertex list, under whichever name the parser used.
    pub fn points(&self) -> Option<&[Point3]> {
        self.first_attr(&["points", "vertices"]).and_then(AttrValue::as_points)
    }

    /// Text content from whichever field the parser populated.
    ///
    /// Blank after trimming counts as absent.
    pub fn text_content(&self) -> Option<&str> {
        self.first_attr(&["text", "text_value"])
            .and_then(AttrValue::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Insertion point, under whichever name the parser used.
    pub fn insert_point(&self) -> Option<Point3> {
        self.point(&["insert", "ins_pt", "insertion_pt"])
    }

    /// Closed-flag detection: an explicit boolean, or bit 0 of the
    /// flags word under either of its names.
    pub fn is_closed_polyline(&self) -> bool {
        if let Some(closed) = self.first_attr(&["is_closed"]).and_then(AttrValue::as_bool) {
            return closed;
        }
        if let Some(flags) = self.first_attr(&["is_closed", "flag", "flags"]) {
            if let Some(raw) = flags.as_i64() {
                return PolylineFlags::from_bits_truncate(raw as u32)
                    .contains(PolylineFlags::CLOSED);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_code_table() {
        assert_eq!(EntityKind::from_type_code(1), Some(EntityKind::Text));
        assert_eq!(EntityKind::from_type_code(7), Some(EntityKind::Insert));
        assert_eq!(EntityKind::from_type_code(19), Some(EntityKind::Polyline2D));
        assert_eq!(EntityKind::from_type_code(21), Some(EntityKind::Arc));
        assert_eq!(EntityKind::from_type_code(22), Some(EntityKind::Circle));
        assert_eq!(EntityKind::from_type_code(23), Some(EntityKind::Line));
        assert_eq!(EntityKind::from_type_code(44), Some(EntityKind::MText));
        assert_eq!(EntityKind::from_type_code(77), Some(EntityKind::LwPolyline));
        assert_eq!(EntityKind::from_type_code(999), None);
    }

    #[test]
    fn test_from_name_case_insensitive() {
        assert_eq!(EntityKind::from_name("line"), Some(EntityKind::Line));
        assert_eq!(EntityKind::from_name(" MTEXT "), Some(EntityKind::MText));
        assert_eq!(EntityKind::from_name("SPLINE"), None);
    }

    #[test]
    fn test_closed_flag_from_bool() {
        let mut e = CanonicalEntity::new(EntityKind::LwPolyline);
        e.attributes.insert("is_closed".into(), AttrValue::Bool(true));
        assert!(e.is_closed_polyline());
    }

    #[test]
    fn test_closed_flag_from_flags_word() {
        let mut e = CanonicalEntity::new(EntityKind::LwPolyline);
        e.attributes.insert("flag".into(), AttrValue::Int(1));
        assert!(e.is_closed_polyline());

        let mut open = CanonicalEntity::new(EntityKind::LwPolyline);
        // PLINEGEN alone does not close the polyline.
        open.attributes.insert("flags".into(), AttrValue::Int(128));
        assert!(!open.is_closed_polyline());
    }

    #[test]
    fn test_text_content_fallback_and_blank() {
        let mut e = CanonicalEntity::new(EntityKind::Text);
        e.attributes.insert("text_value".into(), AttrValue::Str("  ROOM 101  ".into()));
        assert_eq!(e.text_content(), Some("ROOM 101"));

        let mut blank = CanonicalEntity::new(EntityKind::Text);
        blank.attributes.insert("text".into(), AttrValue::Str("   ".into()));
        assert_eq!(blank.text_content(), None);
    }

    #[test]
    fn test_insert_point_fallbacks() {
        let mut e = CanonicalEntity::new(EntityKind::MText);
        e.attributes
            .insert("ins_pt".into(), AttrValue::Point(Point3::from_xy(5.0, 6.0)));
        assert_eq!(e.insert_point(), Some(Point3::new(5.0, 6.0, 0.0)));
    }
}
