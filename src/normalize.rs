//! Raw-record normalization
//!
//! Canonicalizes arbitrary parser output into [`CanonicalEntity`]
//! values: coordinate arrays become `{x, y, z}` records, numbers become
//! `f64` with at most six fractional digits (collapsing to integers
//! where exact), nested records flatten into prefixed scalar keys, and
//! strings are decoded through the utf-8 → latin-1 ladder.
//!
//! Normalization is pure and deterministic; records that cannot be
//! canonicalized are dropped and counted, never fatal.

use std::borrow::Cow;

use indexmap::IndexMap;
use serde_json::Value;

use crate::entity::{CanonicalEntity, EntityKind};
use crate::parser::RawRecord;
use crate::types::{AttrValue, Point3};

/// Maximum fractional digits preserved on a canonical float.
const MAX_COORDINATE_PRECISION: i32 = 6;

/// Integers beyond this magnitude stay floats (exactness limit of f64).
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0; // 2^53

/// Encoding that successfully decoded a byte string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

/// Decode bytes through the documented ladder.
///
/// UTF-8 is tried strictly first. Latin-1 decoding is total (every byte
/// is a code point) and therefore subsumes the cp1252 and lossy rungs
/// of the documented ladder.
pub fn decode_text(bytes: &[u8]) -> (Cow<'_, str>, TextEncoding) {
    match std::str::from_utf8(bytes) {
        Ok(s) => (Cow::Borrowed(s), TextEncoding::Utf8),
        Err(_) => (encoding_rs::mem::decode_latin1(bytes), TextEncoding::Latin1),
    }
}

/// Counters accumulated across one normalization run.
///
/// Surfaced alongside the ingest result; per-record problems land here
/// instead of aborting the stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeStats {
    pub coordinates_normalized: u64,
    pub decimals_converted: u64,
    pub records_flattened: u64,
    pub maps_serialized: u64,
    pub dropped_records: u64,
    pub unrecognized_kinds: u64,
    pub errors: Vec<String>,
}

impl NormalizeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another stats block into this one.
    pub fn merge(&mut self, other: &NormalizeStats) {
        self.coordinates_normalized += other.coordinates_normalized;
        self.decimals_converted += other.decimals_converted;
        self.records_flattened += other.records_flattened;
        self.maps_serialized += other.maps_serialized;
        self.dropped_records += other.dropped_records;
        self.unrecognized_kinds += other.unrecognized_kinds;
        self.errors.extend(other.errors.iter().cloned());
    }
}

/// Stateless-per-record normalizer carrying run statistics.
#[derive(Debug, Default)]
pub struct Normalizer {
    stats: NormalizeStats,
}

impl Normalizer {
    pub fn new() -> Self {
        Normalizer { stats: NormalizeStats::new() }
    }

    pub fn stats(&self) -> &NormalizeStats {
        &self.stats
    }

    pub fn into_stats(self) -> NormalizeStats {
        self.stats
    }

    /// Normalize one raw record.
    ///
    /// Returns `None` (and counts) when the record carries no
    /// recognizable entity tag.
    pub fn normalize(&mut self, raw: &RawRecord) -> Option<CanonicalEntity> {
        let kind = match self.entity_kind(raw) {
            Some(kind) => kind,
            None => {
                self.stats.unrecognized_kinds += 1;
                self.stats.dropped_records += 1;
                return None;
            }
        };

        let mut entity = CanonicalEntity::new(kind);
        entity.layer = raw
            .get("layer")
            .map(layer_name)
            .unwrap_or_else(|| "0".to_string());

        for (key, value) in raw {
            if matches!(key.as_str(), "object" | "type" | "layer") {
                continue;
            }
            self.normalize_field(&mut entity.attributes, &sanitize_key(key), value);
        }

        Some(entity)
    }

    /// Normalize a whole chunk, dropping unusable records.
    pub fn normalize_chunk(&mut self, records: &[RawRecord]) -> Vec<CanonicalEntity> {
        records.iter().filter_map(|r| self.normalize(r)).collect()
    }

    fn entity_kind(&self, raw: &RawRecord) -> Option<EntityKind> {
        let tag = raw.get("object").or_else(|| raw.get("type"))?;
        match tag {
            Value::String(name) => EntityKind::from_name(name),
            Value::Number(code) => code.as_i64().and_then(EntityKind::from_type_code),
            _ => None,
        }
    }

    fn normalize_field(
        &mut self,
        out: &mut IndexMap<String, AttrValue>,
        key: &str,
        value: &Value,
    ) {
        match value {
            Value::Null => {}
            Value::Bool(b) => {
                out.insert(key.to_string(), AttrValue::Bool(*b));
            }
            Value::Number(n) => {
                out.insert(key.to_string(), self.canonical_number(n));
            }
            Value::String(s) => {
                out.insert(key.to_string(), AttrValue::Str(s.clone()));
            }
            Value::Array(items) => self.normalize_array(out, key, items),
            Value::Object(map) => {
                if let Some(point) = coordinate_record(map) {
                    self.stats.coordinates_normalized += 1;
                    out.insert(key.to_string(), AttrValue::Point(point));
                } else {
                    self.flatten_record(out, key, map);
                }
            }
        }
    }

    fn normalize_array(
        &mut self,
        out: &mut IndexMap<String, AttrValue>,
        key: &str,
        items: &[Value],
    ) {
        if items.is_empty() {
            out.insert(key.to_string(), AttrValue::FloatArray(Vec::new()));
            return;
        }

        if let Some(point) = coordinate_array(items) {
            self.stats.coordinates_normalized += 1;
            out.insert(key.to_string(), AttrValue::Point(point));
            return;
        }

        // Arrays-of-arrays (polyline points) become arrays of coordinates.
        if items.iter().all(|v| v.is_array()) {
            let mut points = Vec::with_capacity(items.len());
            for item in items {
                match item.as_array().and_then(|a| coordinate_array(a)) {
                    Some(p) => points.push(p),
                    None => {
                        self.serialize_fallback(out, key, &Value::Array(items.to_vec()));
                        return;
                    }
                }
            }
            self.stats.coordinates_normalized += points.len() as u64;
            out.insert(key.to_string(), AttrValue::Points(points));
            return;
        }

        // Arrays of coordinate records.
        if items
            .iter()
            .all(|v| v.as_object().map(|m| coordinate_record(m).is_some()).unwrap_or(false))
        {
            let points: Vec<Point3> = items
                .iter()
                .filter_map(|v| v.as_object().and_then(coordinate_record))
                .collect();
            self.stats.coordinates_normalized += points.len() as u64;
            out.insert(key.to_string(), AttrValue::Points(points));
            return;
        }

        // Lists of records flatten to `key_{i}_{subkey}`.
        if items.iter().all(Value::is_object) {
            for (i, item) in items.iter().enumerate() {
                if let Some(map) = item.as_object() {
                    self.flatten_record(out, &format!("{key}_{i}"), map);
                }
            }
            return;
        }

        // Homogeneous scalar arrays keep their element type.
        if let Some(attr) = self.scalar_array(items) {
            out.insert(key.to_string(), attr);
            return;
        }

        self.serialize_fallback(out, key, &Value::Array(items.to_vec()));
    }

    fn scalar_array(&mut self, items: &[Value]) -> Option<AttrValue> {
        if items.iter().all(Value::is_boolean) {
            return Some(AttrValue::BoolArray(
                items.iter().filter_map(Value::as_bool).collect(),
            ));
        }
        if items.iter().all(Value::is_string) {
            return Some(AttrValue::StrArray(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ));
        }
        if items.iter().all(Value::is_number) {
            let canonical: Vec<AttrValue> = items
                .iter()
                .filter_map(|v| v.as_number())
                .map(|n| self.canonical_number(n))
                .collect();
            if canonical.iter().all(|v| matches!(v, AttrValue::Int(_))) {
                return Some(AttrValue::IntArray(
                    canonical.iter().filter_map(AttrValue::as_i64).collect(),
                ));
            }
            // Mixed integer/float numerics widen to a float array.
            return Some(AttrValue::FloatArray(
                canonical.iter().filter_map(AttrValue::as_f64).collect(),
            ));
        }
        None
    }

    /// Flatten a nested record one level deep with the outer key as
    /// prefix; anything still nested below that serializes to a string.
    fn flatten_record(
        &mut self,
        out: &mut IndexMap<String, AttrValue>,
        prefix: &str,
        map: &serde_json::Map<String, Value>,
    ) {
        self.stats.records_flattened += 1;
        for (subkey, subvalue) in map {
            let flat_key = format!("{prefix}_{}", sanitize_key(subkey));
            match subvalue {
                Value::Null => {}
                Value::Bool(b) => {
                    out.insert(flat_key, AttrValue::Bool(*b));
                }
                Value::Number(n) => {
                    let canonical = self.canonical_number(n);
                    out.insert(flat_key, canonical);
                }
                Value::String(s) => {
                    out.insert(flat_key, AttrValue::Str(s.clone()));
                }
                Value::Array(items) => self.normalize_array(out, &flat_key, items),
                Value::Object(inner) => {
                    if let Some(point) = coordinate_record(inner) {
                        self.stats.coordinates_normalized += 1;
                        out.insert(flat_key, AttrValue::Point(point));
                    } else {
                        self.serialize_fallback(out, &flat_key, subvalue);
                    }
                }
            }
        }
    }

    /// Last resort: keep the value as its JSON text.
    fn serialize_fallback(&mut self, out: &mut IndexMap<String, AttrValue>, key: &str, value: &Value) {
        self.stats.maps_serialized += 1;
        match serde_json::to_string(value) {
            Ok(text) => {
                out.insert(key.to_string(), AttrValue::Str(text));
            }
            Err(e) => self.stats.errors.push(format!("serialize {key}: {e}")),
        }
    }

    fn canonical_number(&mut self, n: &serde_json::Number) -> AttrValue {
        if let Some(i) = n.as_i64() {
            return AttrValue::Int(i);
        }
        if let Some(u) = n.as_u64() {
            // Above i64::MAX; representable only approximately.
            return AttrValue::Float(u as f64);
        }
        let f = n.as_f64().unwrap_or(0.0);
        let rounded = round_to_precision(f);
        if (rounded - f).abs() > 0.0 {
            self.stats.decimals_converted += 1;
        }
        if rounded.fract() == 0.0 && rounded.abs() < MAX_EXACT_INT {
            AttrValue::Int(rounded as i64)
        } else {
            AttrValue::Float(rounded)
        }
    }
}

/// Round to [`MAX_COORDINATE_PRECISION`] fractional digits.
///
/// Values too large for the scaling multiply to stay exact pass
/// through unchanged.
fn round_to_precision(f: f64) -> f64 {
    if !f.is_finite() || f.abs() >= 1e15 {
        return f;
    }
    let scale = 10f64.powi(MAX_COORDINATE_PRECISION);
    (f * scale).round() / scale
}

/// Replace dots and spaces in a key with underscores.
fn sanitize_key(key: &str) -> String {
    key.replace(['.', ' '], "_")
}

fn layer_name(value: &Value) -> String {
    match value {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => "0".to_string(),
    }
}

/// A length-2/3 all-numeric array is a coordinate.
fn coordinate_array(items: &[Value]) -> Option<Point3> {
    if !(2..=3).contains(&items.len()) || !items.iter().all(Value::is_number) {
        return None;
    }
    let x = items[0].as_f64()?;
    let y = items[1].as_f64()?;
    let z = items.get(2).and_then(Value::as_f64).unwrap_or(0.0);
    Some(Point3::new(
        round_to_precision(x),
        round_to_precision(y),
        round_to_precision(z),
    ))
}

/// A record with numeric `x` and `y` (and optionally `z`) and nothing
/// else is a coordinate.
fn coordinate_record(map: &serde_json::Map<String, Value>) -> Option<Point3> {
    let x = map.get("x")?.as_f64()?;
    let y = map.get("y")?.as_f64()?;
    if !map.keys().all(|k| matches!(k.as_str(), "x" | "y" | "z")) {
        return None;
    }
    let z = map.get("z").and_then(Value::as_f64).unwrap_or(0.0);
    Some(Point3::new(
        round_to_precision(x),
        round_to_precision(y),
        round_to_precision(z),
    ))
}
