//! Entity-to-graph projection
//!
//! Maps canonical entities to typed nodes and relationships under the
//! fixed schema. UID counters are monotonic within an ingest and are
//! threaded across chunk boundaries, so streaming and whole-file
//! transformations number identically for identical inputs.

use serde_json::{json, Value};
use tracing::debug;

use crate::entity::{CanonicalEntity, EntityKind};
use crate::enrich::validate::{Correlation, OcrEnrichment};
use crate::graph::{GraphNode, GraphPayload, GraphRelationship, NodeLabel, RelType};
use crate::types::{AttrValue, Point3};

/// UID of the single Building node of an ingest.
pub const BUILDING_UID: &str = "building_1";

/// UID of the single Floor node of an ingest. Floor inference is out of
/// scope; every entity hangs off this floor.
pub const FLOOR_UID: &str = "floor_1";

/// Monotonic per-ingest UID counters.
///
/// Carried across chunks; never shared between ingests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidCounters {
    space: u64,
    wall: u64,
    feature: u64,
    annotation: u64,
    block: u64,
    metadata: u64,
    ocr_region: u64,
    ocr_text: u64,
}

impl UidCounters {
    fn next(counter: &mut u64, prefix: &str) -> String {
        *counter += 1;
        format!("{prefix}_{counter}")
    }
}

/// Per-entity projection discards, counted rather than surfaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionStats {
    pub projected: u64,
    /// Kinds with no row in the projection table
    pub unprojected_kinds: u64,
    /// Open polylines (not currently projected)
    pub open_polylines: u64,
    /// Closed polylines with fewer than three points
    pub degenerate_polylines: u64,
    /// Textual entities whose content was blank after trimming
    pub blank_texts: u64,
}

impl ProjectionStats {
    pub fn discarded(&self) -> u64 {
        self.unprojected_kinds + self.open_polylines + self.degenerate_polylines + self.blank_texts
    }
}

/// Projects canonical entity chunks into graph payloads.
pub struct GraphProjector {
    building_uid: String,
    floor_uid: String,
    counters: UidCounters,
    stats: ProjectionStats,
    source_name: String,
}

impl GraphProjector {
    pub fn new(source_name: &str) -> Self {
        GraphProjector {
            building_uid: BUILDING_UID.to_string(),
            floor_uid: FLOOR_UID.to_string(),
            counters: UidCounters::default(),
            stats: ProjectionStats::default(),
            source_name: source_name.to_string(),
        }
    }

    pub fn stats(&self) -> &ProjectionStats {
        &self.stats
    }

    pub fn counters(&self) -> &UidCounters {
        &self.counters
    }

    /// The Building and Floor roots plus their edge.
    ///
    /// Emitted once, before any entity chunk.
    pub fn root_payload(&self) -> GraphPayload {
        let mut payload = GraphPayload::new();
        payload.nodes.push(
            GraphNode::new(NodeLabel::Building, &self.building_uid)
                .with_property("name", json!(format!("Building ({})", self.source_name))),
        );
        payload.nodes.push(
            GraphNode::new(NodeLabel::Floor, &self.floor_uid)
                .with_property("name", json!("Floor 1"))
                .with_property("level", json!(1)),
        );
        payload.relationships.push(GraphRelationship::new(
            (NodeLabel::Building, &self.building_uid),
            RelType::HasFloor,
            (NodeLabel::Floor, &self.floor_uid),
        ));
        payload
    }

    /// Project one chunk of canonical entities.
    pub fn project_chunk(&mut self, chunk: &[CanonicalEntity]) -> GraphPayload {
        let mut payload = GraphPayload::new();
        for entity in chunk {
            self.project_entity(entity, &mut payload);
        }
        payload
    }

    /// Copy attributes the projection table did not consume onto the
    /// node, so parser detail (colors, linetypes, extended data)
    /// survives projection. Coordinates flatten; coordinate arrays
    /// JSON-encode.
    fn carry_extra_attributes(
        node: &mut GraphNode,
        entity: &CanonicalEntity,
        consumed: &[&str],
    ) {
        for (key, value) in &entity.attributes {
            if consumed.contains(&key.as_str()) || node.properties.contains_key(key) {
                continue;
            }
            match value {
                AttrValue::Point(p) => node.set_point(key, *p),
                AttrValue::Points(_) => {
                    let text = serde_json::to_string(&value.to_json())
                        .unwrap_or_else(|_| "[]".to_string());
                    node.properties.insert(key.clone(), json!(text));
                }
                other => {
                    node.properties.insert(key.clone(), other.to_json());
                }
            }
        }
    }

    fn project_entity(&mut self, entity: &CanonicalEntity, payload: &mut GraphPayload) {
        match entity.kind {
            EntityKind::ScaleInfo => self.project_scale_info(entity, payload),
            EntityKind::LwPolyline => self.project_polyline(entity, payload),
            EntityKind::Line => self.project_line(entity, payload),
            EntityKind::Circle | EntityKind::Arc => self.project_feature(entity, payload),
            kind if kind.is_textual() => self.project_annotation(entity, payload),
            EntityKind::Insert => self.project_insert(entity, payload),
            _ => {
                self.stats.unprojected_kinds += 1;
            }
        }
    }

    fn project_scale_info(&mut self, entity: &CanonicalEntity, payload: &mut GraphPayload) {
        let uid = UidCounters::next(&mut self.counters.metadata, "metadata");
        let mut node = GraphNode::new(NodeLabel::Metadata, &uid)
            .with_property("type", json!("SCALE_INFO"));
        for (property, names) in [
            ("dimscale", ["scales_DIMSCALE", "DIMSCALE", "dimscale"]),
            ("ltscale", ["scales_LTSCALE", "LTSCALE", "ltscale"]),
            ("cmlscale", ["scales_CMLSCALE", "CMLSCALE", "cmlscale"]),
            ("celtscale", ["scales_CELTSCALE", "CELTSCALE", "celtscale"]),
        ] {
            node.properties
                .insert(property.to_string(), json!(entity.numeric(&names, 1.0)));
        }
        Self::carry_extra_attributes(
            &mut node,
            entity,
            &[
                "scales_DIMSCALE", "scales_LTSCALE", "scales_CMLSCALE", "scales_CELTSCALE",
                "DIMSCALE", "LTSCALE", "CMLSCALE", "CELTSCALE",
                "dimscale", "ltscale", "cmlscale", "celtscale",
            ],
        );
        payload.nodes.push(node);
        payload.relationships.push(GraphRelationship::new(
            (NodeLabel::Building, &self.building_uid),
            RelType::HasMetadata,
            (NodeLabel::Metadata, &uid),
        ));
        self.stats.projected += 1;
    }

    fn project_polyline(&mut self, entity: &CanonicalEntity, payload: &mut GraphPayload) {
        if !entity.is_closed_polyline() {
            self.stats.open_polylines += 1;
            return;
        }
        let points = entity.points().unwrap_or(&[]);
        if points.len() < 3 {
            self.stats.degenerate_polylines += 1;
            return;
        }
        let raw_points: Vec<Value> = points.iter().map(|p| json!({"x": p.x, "y": p.y})).collect();
        let raw_points_json =
            serde_json::to_string(&raw_points).unwrap_or_else(|_| "[]".to_string());

        let uid = UidCounters::next(&mut self.counters.space, "space");
        let mut node = GraphNode::new(NodeLabel::Space, &uid)
            .with_property("raw_points", json!(raw_points_json))
            .with_property("point_count", json!(points.len()))
            .with_property("layer", json!(entity.layer));
        Self::carry_extra_attributes(
            &mut node,
            entity,
            &["points", "vertices", "flag", "flags", "is_closed"],
        );
        payload.nodes.push(node);
        payload.relationships.push(GraphRelationship::new(
            (NodeLabel::Floor, &self.floor_uid),
            RelType::HasSpace,
            (NodeLabel::Space, &uid),
        ));
        self.stats.projected += 1;
    }

    fn project_line(&mut self, entity: &CanonicalEntity, payload: &mut GraphPayload) {
        let uid = UidCounters::next(&mut self.counters.wall, "wall");
        let mut node = GraphNode::new(NodeLabel::WallSegment, &uid);
        node.set_point("start", entity.point(&["start"]).unwrap_or(Point3::ZERO));
        node.set_point("end", entity.point(&["end"]).unwrap_or(Point3::ZERO));
        node.properties.insert("layer".to_string(), json!(entity.layer));
        Self::carry_extra_attributes(&mut node, entity, &["start", "end"]);
        payload.nodes.push(node);
        payload.relationships.push(GraphRelationship::new(
            (NodeLabel::Floor, &self.floor_uid),
            RelType::HasWall,
            (NodeLabel::WallSegment, &uid),
        ));
        self.stats.projected += 1;
    }

    fn project_feature(&mut self, entity: &CanonicalEntity, payload: &mut GraphPayload) {
        let uid = UidCounters::next(&mut self.counters.feature, "feature");
        let mut node = GraphNode::new(NodeLabel::Feature, &uid)
            .with_property("type", json!(entity.kind.name()));
        node.set_point("center", entity.point(&["center"]).unwrap_or(Point3::ZERO));
        node.properties
            .insert("radius".to_string(), json!(entity.numeric(&["radius"], 0.0)));
        if entity.kind == EntityKind::Arc {
            node.properties.insert(
                "start_angle".to_string(),
                json!(entity.numeric(&["start_angle"], 0.0)),
            );
            node.properties.insert(
                "end_angle".to_string(),
                json!(entity.numeric(&["end_angle"], 0.0)),
            );
        }
        node.properties.insert("layer".to_string(), json!(entity.layer));
        Self::carry_extra_attributes(
            &mut node,
            entity,
            &["center", "radius", "start_angle", "end_angle"],
        );
        payload.nodes.push(node);
        payload.relationships.push(GraphRelationship::new(
            (NodeLabel::Floor, &self.floor_uid),
            RelType::HasFeature,
            (NodeLabel::Feature, &uid),
        ));
        self.stats.projected += 1;
    }

    fn project_annotation(&mut self, entity: &CanonicalEntity, payload: &mut GraphPayload) {
        let text = match entity.text_content() {
            Some(text) => text.to_string(),
            None => {
                self.stats.blank_texts += 1;
                return;
            }
        };
        let uid = UidCounters::next(&mut self.counters.annotation, "annotation");
        let mut node = GraphNode::new(NodeLabel::Annotation, &uid)
            .with_property("text", json!(text))
            .with_property("type", json!(entity.kind.name()));
        node.set_point("insert", entity.insert_point().unwrap_or(Point3::ZERO));
        node.properties
            .insert("height".to_string(), json!(entity.numeric(&["height"], 1.0)));
        node.properties.insert("layer".to_string(), json!(entity.layer));

        // Block-attribute extras, where the parser exposes them.
        if let Some(tag) = entity.first_attr(&["tag"]).and_then(|v| v.as_str()) {
            node.properties.insert("tag".to_string(), json!(tag));
        }
        if entity.kind == EntityKind::AttDef {
            if let Some(prompt) = entity.first_attr(&["prompt"]).and_then(|v| v.as_str()) {
                node.properties.insert("prompt".to_string(), json!(prompt));
            }
        }
        if let Some(parent) = entity
            .first_attr(&["parent_block", "block_name"])
            .and_then(|v| v.as_str())
        {
            node.properties.insert("parent_block".to_string(), json!(parent));
        }

        Self::carry_extra_attributes(
            &mut node,
            entity,
            &[
                "text", "text_value", "insert", "ins_pt", "insertion_pt",
                "height", "tag", "prompt", "parent_block", "block_name",
            ],
        );
        payload.nodes.push(node);
        payload.relationships.push(GraphRelationship::new(
            (NodeLabel::Floor, &self.floor_uid),
            RelType::HasAnnotation,
            (NodeLabel::Annotation, &uid),
        ));
        self.stats.projected += 1;
    }

    fn project_insert(&mut self, entity: &CanonicalEntity, payload: &mut GraphPayload) {
        let uid = UidCounters::next(&mut self.counters.block, "block");
        let block_name = entity
            .first_attr(&["block_name", "name"])
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let mut node = GraphNode::new(NodeLabel::BlockReference, &uid)
            .with_property("block_name", json!(block_name));
        node.set_point("insert", entity.insert_point().unwrap_or(Point3::ZERO));
        node.properties
            .insert("rotation".to_string(), json!(entity.numeric(&["rotation"], 0.0)));

        // Scale appears either as a coordinate triple or as separate axes.
        if let Some(scale) = entity.point(&["scale"]) {
            node.properties.insert("xscale".to_string(), json!(scale.x));
            node.properties.insert("yscale".to_string(), json!(scale.y));
            node.properties.insert("zscale".to_string(), json!(scale.z));
        } else {
            for axis in ["xscale", "yscale", "zscale"] {
                node.properties
                    .insert(axis.to_string(), json!(entity.numeric(&[axis], 1.0)));
            }
        }
        node.properties.insert("layer".to_string(), json!(entity.layer));
        Self::carry_extra_attributes(
            &mut node,
            entity,
            &[
                "name", "block_name", "insert", "ins_pt", "insertion_pt",
                "rotation", "scale", "xscale", "yscale", "zscale",
            ],
        );
        payload.nodes.push(node);
        payload.relationships.push(GraphRelationship::new(
            (NodeLabel::Floor, &self.floor_uid),
            RelType::HasBlockReference,
            (NodeLabel::BlockReference, &uid),
        ));
        self.stats.projected += 1;
    }

    /// Project OCR enrichment results onto the already-loaded graph.
    ///
    /// Invoked by the Job Manager after rendering, recognition and
    /// cross-validation; the resulting payload merges into the same
    /// ingest's graph without clearing it.
    pub fn project_ocr(&mut self, enrichment: &OcrEnrichment) -> GraphPayload {
        let mut payload = GraphPayload::new();
        let mut region_uids: ahash::AHashMap<String, String> = ahash::AHashMap::new();

        for region in &enrichment.regions {
            let uid = UidCounters::next(&mut self.counters.ocr_region, "ocr_region");
            region_uids.insert(region.region_id.clone(), uid.clone());
            payload.nodes.push(
                GraphNode::new(NodeLabel::OcrRegion, &uid)
                    .with_property("region_id", json!(region.region_id))
                    .with_property("region_type", json!(region.region_type.name()))
                    .with_property("text_count", json!(region.text_count))
                    .with_property("average_confidence", json!(region.average_confidence)),
            );
            payload.relationships.push(GraphRelationship::new(
                (NodeLabel::Floor, &self.floor_uid),
                RelType::HasOcrRegion,
                (NodeLabel::OcrRegion, &uid),
            ));
        }

        for finding in &enrichment.texts {
            let uid = UidCounters::next(&mut self.counters.ocr_text, "ocr_text");
            let extracted_info = serde_json::to_string(&finding.extracted_info)
                .unwrap_or_else(|_| "{}".to_string());
            payload.nodes.push(
                GraphNode::new(NodeLabel::OcrText, &uid)
                    .with_property("text", json!(finding.text))
                    .with_property("confidence", json!(finding.confidence))
                    .with_property("region_id", json!(finding.region_id))
                    .with_property("region_type", json!(finding.region_type.name()))
                    .with_property("engine", json!(finding.engine))
                    .with_property("extracted_info", json!(extracted_info)),
            );
            if let Some(region_uid) = region_uids.get(&finding.region_id) {
                payload.relationships.push(GraphRelationship::new(
                    (NodeLabel::OcrRegion, region_uid),
                    RelType::ContainsText,
                    (NodeLabel::OcrText, &uid),
                ));
            } else {
                debug!(region_id = %finding.region_id, "OCR text without a summarized region");
            }
            match &finding.correlation {
                Correlation::Validates { correlation_type, cad_text } => {
                    payload.relationships.push(
                        GraphRelationship::new(
                            (NodeLabel::OcrText, &uid),
                            RelType::Validates,
                            (NodeLabel::Floor, &self.floor_uid),
                        )
                        .with_property("confidence", json!(finding.confidence))
                        .with_property("correlation_type", json!(correlation_type))
                        .with_property("cad_text", json!(cad_text)),
                    );
                }
                Correlation::Discovers { context } => {
                    payload.relationships.push(
                        GraphRelationship::new(
                            (NodeLabel::OcrText, &uid),
                            RelType::Discovers,
                            (NodeLabel::Floor, &self.floor_uid),
                        )
                        .with_property("confidence", json!(finding.confidence))
                        .with_property("region_type", json!(finding.region_type.name()))
                        .with_property("context", json!(context)),
                    );
                }
            }
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Normalizer;
    use crate::parser::RawRecord;
    use serde_json::json;

    fn canonical(value: Value) -> CanonicalEntity {
        let record: RawRecord = value.as_object().unwrap().clone();
        Normalizer::new().normalize(&record).expect("normalizable test record")
    }

    #[test]
    fn test_root_payload_shape() {
        let projector = GraphProjector::new("plan");
        let roots = projector.root_payload();
        assert_eq!(roots.nodes.len(), 2);
        assert_eq!(roots.relationships.len(), 1);
        assert_eq!(roots.nodes[0].uid, "building_1");
        assert_eq!(roots.nodes[1].uid, "floor_1");
        assert_eq!(roots.relationships[0].rel_type, RelType::HasFloor);
        assert_eq!(
            roots.nodes[0].properties.get("name"),
            Some(&json!("Building (plan)"))
        );
    }

    #[test]
    fn test_line_projects_to_wall_segment() {
        let mut projector = GraphProjector::new("plan");
        let payload = projector.project_chunk(&[canonical(json!({
            "object": "LINE", "start": [0, 0], "end": [10, 0], "layer": "W"
        }))]);
        let wall = &payload.nodes[0];
        assert_eq!(wall.label, NodeLabel::WallSegment);
        assert_eq!(wall.uid, "wall_1");
        assert_eq!(wall.properties.get("start_x"), Some(&json!(0.0)));
        assert_eq!(wall.properties.get("end_x"), Some(&json!(10.0)));
        assert_eq!(wall.properties.get("end_z"), Some(&json!(0.0)));
        assert_eq!(wall.properties.get("layer"), Some(&json!("W")));
        assert_eq!(payload.relationships[0].rel_type, RelType::HasWall);
        assert_eq!(payload.relationships[0].start_uid, "floor_1");
    }

    #[test]
    fn test_closed_polyline_projects_to_space() {
        let mut projector = GraphProjector::new("plan");
        let payload = projector.project_chunk(&[canonical(json!({
            "object": "LWPOLYLINE",
            "points": [[0, 0], [10, 0], [10, 10], [0, 10]],
            "flag": 1
        }))]);
        let space = &payload.nodes[0];
        assert_eq!(space.label, NodeLabel::Space);
        assert_eq!(space.uid, "space_1");
        assert_eq!(space.properties.get("point_count"), Some(&json!(4)));
        let raw: Vec<Value> =
            serde_json::from_str(space.properties.get("raw_points").unwrap().as_str().unwrap())
                .unwrap();
        assert_eq!(raw.len(), 4);
        assert_eq!(raw[1], json!({"x": 10.0, "y": 0.0}));
    }

    #[test]
    fn test_open_polyline_is_counted_discard() {
        let mut projector = GraphProjector::new("plan");
        let payload = projector.project_chunk(&[canonical(json!({
            "object": "LWPOLYLINE", "points": [[0, 0], [10, 0]], "flag": 0
        }))]);
        assert!(payload.is_empty());
        assert_eq!(projector.stats().open_polylines, 1);
    }

    #[test]
    fn test_degenerate_closed_polyline_is_counted() {
        let mut projector = GraphProjector::new("plan");
        let payload = projector.project_chunk(&[canonical(json!({
            "object": "LWPOLYLINE", "points": [[0, 0], [10, 0]], "flag": 1
        }))]);
        assert!(payload.is_empty());
        assert_eq!(projector.stats().degenerate_polylines, 1);
    }

    #[test]
    fn test_arc_feature_carries_angles() {
        let mut projector = GraphProjector::new("plan");
        let payload = projector.project_chunk(&[canonical(json!({
            "object": "ARC", "center": [5, 5], "radius": 2.5,
            "start_angle": 0.0, "end_angle": 90.0
        }))]);
        let feature = &payload.nodes[0];
        assert_eq!(feature.properties.get("type"), Some(&json!("ARC")));
        assert_eq!(feature.properties.get("end_angle"), Some(&json!(90.0)));
    }

    #[test]
    fn test_scale_info_projects_to_metadata() {
        let mut projector = GraphProjector::new("plan");
        let payload = projector.project_chunk(&[canonical(json!({
            "type": "SCALE_INFO",
            "scales": {"DIMSCALE": 1.0, "LTSCALE": 2.0, "CMLSCALE": 1.0, "CELTSCALE": 1.0}
        }))]);
        let metadata = &payload.nodes[0];
        assert_eq!(metadata.label, NodeLabel::Metadata);
        assert_eq!(metadata.uid, "metadata_1");
        assert_eq!(metadata.properties.get("ltscale"), Some(&json!(2.0)));
        let rel = &payload.relationships[0];
        assert_eq!(rel.start_uid, "building_1");
        assert_eq!(rel.rel_type, RelType::HasMetadata);
    }

    #[test]
    fn test_blank_annotation_discarded() {
        let mut projector = GraphProjector::new("plan");
        let payload = projector.project_chunk(&[canonical(json!({
            "object": "TEXT", "text": "   ", "insert": [0, 0]
        }))]);
        assert!(payload.is_empty());
        assert_eq!(projector.stats().blank_texts, 1);
    }

    #[test]
    fn test_attdef_carries_tag_and_prompt() {
        let mut projector = GraphProjector::new("plan");
        let payload = projector.project_chunk(&[canonical(json!({
            "object": "ATTDEF", "text": "N/A", "tag": "ROOM_NO",
            "prompt": "Room number?", "insert": [1, 1]
        }))]);
        let node = &payload.nodes[0];
        assert_eq!(node.properties.get("tag"), Some(&json!("ROOM_NO")));
        assert_eq!(node.properties.get("prompt"), Some(&json!("Room number?")));
        assert_eq!(node.properties.get("type"), Some(&json!("ATTDEF")));
    }

    #[test]
    fn test_insert_projects_block_reference() {
        let mut projector = GraphProjector::new("plan");
        let payload = projector.project_chunk(&[canonical(json!({
            "object": "INSERT", "name": "DOOR_90", "ins_pt": [3, 4],
            "rotation": 1.5708, "scale": [1, 1, 1]
        }))]);
        let node = &payload.nodes[0];
        assert_eq!(node.label, NodeLabel::BlockReference);
        assert_eq!(node.properties.get("block_name"), Some(&json!("DOOR_90")));
        assert_eq!(node.properties.get("xscale"), Some(&json!(1.0)));
        assert_eq!(payload.relationships[0].rel_type, RelType::HasBlockReference);
    }

    #[test]
    fn test_extra_attributes_carried_onto_node() {
        let mut projector = GraphProjector::new("plan");
        let payload = projector.project_chunk(&[canonical(json!({
            "object": "TEXT", "text": "A-01", "insert": [1, 2],
            "color": {"index": 7, "rgb": 16777215}
        }))]);
        let node = &payload.nodes[0];
        assert_eq!(node.properties.get("color_index"), Some(&json!(7)));
        assert_eq!(node.properties.get("color_rgb"), Some(&json!(16777215)));
        // Table-defined properties keep their values.
        assert_eq!(node.properties.get("text"), Some(&json!("A-01")));
    }

    #[test]
    fn test_counters_thread_across_chunks() {
        let mut projector = GraphProjector::new("plan");
        let line = json!({"object": "LINE", "start": [0, 0], "end": [1, 1]});
        let first = projector.project_chunk(&[canonical(line.clone())]);
        let second = projector.project_chunk(&[canonical(line)]);
        assert_eq!(first.nodes[0].uid, "wall_1");
        assert_eq!(second.nodes[0].uid, "wall_2");
    }

    #[test]
    fn test_unprojected_kind_counted() {
        let mut projector = GraphProjector::new("plan");
        let payload = projector.project_chunk(&[canonical(json!({
            "type": 19, "points": [[0, 0], [1, 1]]
        }))]);
        assert!(payload.is_empty());
        assert_eq!(projector.stats().unprojected_kinds, 1);
    }
}
