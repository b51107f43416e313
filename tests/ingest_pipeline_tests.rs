//! End-to-end ingest scenarios against the in-memory store

mod common;

use common::*;
use serde_json::{json, Value};

use cadgraph::store::MemoryGraph;
use cadgraph::PipelineError;

#[test]
fn test_single_line_builds_minimal_graph() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryGraph::new();
    let pipeline = test_pipeline(&store, test_config(&dir));
    let upload = write_artifact(&dir, "plan.dxf", &[line_entity(0.0, 0.0, 10.0, 0.0, "W")]);

    let report = pipeline.ingest(&upload).unwrap();
    assert_eq!(report.entities_extracted, 1);
    assert_eq!(report.nodes_created, 3);
    assert_eq!(report.relationships_created, 2);

    assert_eq!(store.label_count("Building"), 1);
    assert_eq!(store.label_count("Floor"), 1);
    assert_eq!(store.label_count("WallSegment"), 1);
    assert!(store.has_relationship(("Building", "building_1"), "HAS_FLOOR", ("Floor", "floor_1")));
    assert!(store.has_relationship(("Floor", "floor_1"), "HAS_WALL", ("WallSegment", "wall_1")));

    let wall = store.node("WallSegment", "wall_1").unwrap();
    assert_eq!(wall.get("start_x"), Some(&json!(0.0)));
    assert_eq!(wall.get("start_y"), Some(&json!(0.0)));
    assert_eq!(wall.get("start_z"), Some(&json!(0.0)));
    assert_eq!(wall.get("end_x"), Some(&json!(10.0)));
    assert_eq!(wall.get("end_y"), Some(&json!(0.0)));
    assert_eq!(wall.get("end_z"), Some(&json!(0.0)));
    assert_eq!(wall.get("layer"), Some(&json!("W")));
}

#[test]
fn test_scale_info_and_space() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryGraph::new();
    let pipeline = test_pipeline(&store, test_config(&dir));
    let points = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
    let upload = write_artifact(
        &dir,
        "plan.dxf",
        &[scale_info_entity(), closed_polyline(&points, "ROOMS")],
    );
    pipeline.ingest(&upload).unwrap();

    // Metadata hangs off the Building.
    let metadata = store.node("Metadata", "metadata_1").unwrap();
    assert_eq!(metadata.get("dimscale"), Some(&json!(1.0)));
    assert_eq!(metadata.get("ltscale"), Some(&json!(2.0)));
    assert!(store.has_relationship(
        ("Building", "building_1"),
        "HAS_METADATA",
        ("Metadata", "metadata_1")
    ));

    // The Space preserves its points as JSON.
    let space = store.node("Space", "space_1").unwrap();
    assert_eq!(space.get("point_count"), Some(&json!(4)));
    let raw: Vec<Value> =
        serde_json::from_str(space.get("raw_points").unwrap().as_str().unwrap()).unwrap();
    assert_eq!(raw.len(), 4);
    assert_eq!(raw[3], json!({"x": 0.0, "y": 10.0}));
    assert!(store.has_relationship(("Floor", "floor_1"), "HAS_SPACE", ("Space", "space_1")));
}

#[test]
fn test_nested_color_record_flattens() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryGraph::new();
    let pipeline = test_pipeline(&store, test_config(&dir));
    let upload = write_artifact(
        &dir,
        "plan.dxf",
        &[json!({
            "object": "TEXT",
            "text": "A-01",
            "insert": [1.0, 2.0],
            "color": {"index": 7, "rgb": 16777215}
        })],
    );
    pipeline.ingest(&upload).unwrap();

    let annotation = store.node("Annotation", "annotation_1").unwrap();
    assert_eq!(annotation.get("color_index"), Some(&json!(7)));
    assert_eq!(annotation.get("color_rgb"), Some(&json!(16777215)));
    // No property anywhere holds a record.
    for (label, uid, props) in store.node_triples() {
        for (key, value) in props {
            assert!(
                !value.is_object(),
                "{label}/{uid} property {key} is a record: {value}"
            );
        }
    }
}

#[test]
fn test_repeat_ingest_is_idempotent_and_clearing() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryGraph::new();
    let config = test_config(&dir);

    let entities = [
        line_entity(0.0, 0.0, 5.0, 0.0, "W"),
        circle_entity(2.0, 2.0, 1.0),
        text_entity("KITCHEN", 1.0, 1.0),
    ];
    let upload = write_artifact(&dir, "plan.dxf", &entities);

    let first = test_pipeline(&store, config.clone()).ingest(&upload).unwrap();
    let after_first = (store.node_count(), store.relationship_count());

    let second = test_pipeline(&store, config.clone()).ingest(&upload).unwrap();
    let after_second = (store.node_count(), store.relationship_count());

    assert_eq!(first.nodes_created, second.nodes_created);
    assert_eq!(after_first, after_second);

    // A smaller third ingest removes everything from the earlier ones.
    let small = write_artifact(&dir, "small.dxf", &[line_entity(0.0, 0.0, 1.0, 1.0, "0")]);
    test_pipeline(&store, config).ingest(&small).unwrap();
    assert_eq!(store.label_count("WallSegment"), 1);
    assert_eq!(store.label_count("Feature"), 0);
    assert_eq!(store.label_count("Annotation"), 0);
}

#[test]
fn test_determinism_across_stores() {
    let dir = tempfile::tempdir().unwrap();
    let entities = [
        scale_info_entity(),
        line_entity(0.0, 0.0, 5.0, 0.0, "W"),
        closed_polyline(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0)], "R"),
        text_entity("HALL", 2.0, 2.0),
        circle_entity(1.0, 1.0, 0.5),
    ];
    let upload = write_artifact(&dir, "plan.dxf", &entities);

    let store_a = MemoryGraph::new();
    test_pipeline(&store_a, test_config(&dir)).ingest(&upload).unwrap();
    let store_b = MemoryGraph::new();
    test_pipeline(&store_b, test_config(&dir)).ingest(&upload).unwrap();

    assert_eq!(store_a.node_triples(), store_b.node_triples());
    assert_eq!(store_a.relationship_triples(), store_b.relationship_triples());
}

#[test]
fn test_chunk_size_does_not_change_output() {
    // The documented policy: UID numbering is identical across chunk
    // sizes because counters thread through chunk boundaries.
    let dir = tempfile::tempdir().unwrap();
    let mut entities = Vec::new();
    for i in 0..8 {
        entities.push(line_entity(i as f64, 0.0, i as f64, 5.0, "W"));
        entities.push(text_entity(&format!("T{i}"), i as f64, 1.0));
    }
    let upload = write_artifact(&dir, "plan.dxf", &entities);

    let mut results = Vec::new();
    for chunk_size in [1usize, 3, 1000] {
        let store = MemoryGraph::new();
        let mut config = test_config(&dir);
        config.streaming_entity_threshold = 2;
        config.streaming_chunk_size = chunk_size;
        test_pipeline(&store, config).ingest(&upload).unwrap();
        results.push((store.node_triples(), store.relationship_triples()));
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[test]
fn test_streaming_matches_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let entities: Vec<_> = (0..10)
        .map(|i| line_entity(0.0, i as f64, 10.0, i as f64, "W"))
        .collect();
    let upload = write_artifact(&dir, "plan.dxf", &entities);

    let streamed = MemoryGraph::new();
    let mut config = test_config(&dir);
    config.streaming_entity_threshold = 2;
    test_pipeline(&streamed, config).ingest(&upload).unwrap();

    let whole = MemoryGraph::new();
    test_pipeline(&whole, test_config(&dir)).ingest(&upload).unwrap();

    assert_eq!(streamed.node_triples(), whole.node_triples());
    assert_eq!(streamed.relationship_triples(), whole.relationship_triples());
}

#[test]
fn test_transient_failures_within_budget_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryGraph::new();
    store.inject_transient_failures(3);
    let pipeline = test_pipeline(&store, test_config(&dir));
    let upload = write_artifact(&dir, "plan.dxf", &[line_entity(0.0, 0.0, 1.0, 1.0, "0")]);
    let report = pipeline.ingest(&upload).unwrap();
    assert_eq!(report.nodes_created, 3);
}

#[test]
fn test_transient_failures_beyond_budget_become_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryGraph::new();
    store.inject_transient_failures(4);
    let pipeline = test_pipeline(&store, test_config(&dir));
    let upload = write_artifact(&dir, "plan.dxf", &[line_entity(0.0, 0.0, 1.0, 1.0, "0")]);
    let err = pipeline.ingest(&upload).unwrap_err();
    assert!(matches!(err, PipelineError::FatalWrite(_)));
}

#[test]
fn test_objects_root_artifact_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryGraph::new();
    let pipeline = test_pipeline(&store, test_config(&dir));

    let path = dir.path().join("plan.dxf");
    std::fs::write(
        &path,
        serde_json::to_string(&json!({
            "HEADER": {"DIMSCALE": 2.0, "LTSCALE": 1.0},
            "OBJECTS": [
                {"object": "LINE", "start": [0, 0], "end": [3, 3], "layer": "A"}
            ]
        }))
        .unwrap(),
    )
    .unwrap();

    pipeline.ingest(&path).unwrap();
    // Header scales surfaced as a Metadata node.
    let metadata = store.node("Metadata", "metadata_1").unwrap();
    assert_eq!(metadata.get("dimscale"), Some(&json!(2.0)));
    assert_eq!(store.label_count("WallSegment"), 1);
}

#[test]
fn test_unrecognized_and_malformed_entities_are_counted_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryGraph::new();
    let pipeline = test_pipeline(&store, test_config(&dir));
    let upload = write_artifact(
        &dir,
        "plan.dxf",
        &[
            line_entity(0.0, 0.0, 1.0, 0.0, "W"),
            json!({"object": "SPLINE", "degree": 3}),
            json!({"no_type_tag": true}),
        ],
    );
    let report = pipeline.ingest(&upload).unwrap();
    assert_eq!(report.entities_extracted, 3);
    assert_eq!(store.label_count("WallSegment"), 1);
    assert_eq!(report.stats.normalize.dropped_records, 2);
    assert_eq!(report.stats.normalize.unrecognized_kinds, 2);
}
