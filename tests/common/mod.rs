//! Shared builders and fixtures for integration tests

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use cadgraph::enrich::{
    OcrContext, OcrEngine, OcrOutcome, OcrWord, Region, RegionRenderer, RenderConfig,
    RenderedRegion,
};
use cadgraph::load::FixedMemoryMonitor;
use cadgraph::parser::JsonArtifactParser;
use cadgraph::store::MemoryGraph;
use cadgraph::{IngestPipeline, PipelineConfig};

pub fn line_entity(x1: f64, y1: f64, x2: f64, y2: f64, layer: &str) -> Value {
    json!({"object": "LINE", "start": [x1, y1], "end": [x2, y2], "layer": layer})
}

pub fn closed_polyline(points: &[(f64, f64)], layer: &str) -> Value {
    let pts: Vec<Value> = points.iter().map(|(x, y)| json!([x, y])).collect();
    json!({"object": "LWPOLYLINE", "points": pts, "flag": 1, "layer": layer})
}

pub fn circle_entity(cx: f64, cy: f64, radius: f64) -> Value {
    json!({"object": "CIRCLE", "center": [cx, cy], "radius": radius})
}

pub fn text_entity(text: &str, x: f64, y: f64) -> Value {
    json!({"object": "TEXT", "text": text, "insert": [x, y], "height": 2.5})
}

pub fn scale_info_entity() -> Value {
    json!({
        "type": "SCALE_INFO",
        "scales": {"DIMSCALE": 1.0, "LTSCALE": 2.0, "CMLSCALE": 1.0, "CELTSCALE": 1.0}
    })
}

/// Write an entity-array artifact under `dir` with a `.dxf` name so it
/// passes upload validation.
pub fn write_artifact(dir: &tempfile::TempDir, name: &str, entities: &[Value]) -> PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(serde_json::to_string(&entities.to_vec()).unwrap().as_bytes())
        .unwrap();
    path
}

pub fn test_config(dir: &tempfile::TempDir) -> PipelineConfig {
    PipelineConfig {
        staging_dir: dir.path().join("staging"),
        results_dir: dir.path().join("results"),
        ..PipelineConfig::default()
    }
}

/// Install a subscriber once so `RUST_LOG` surfaces pipeline decisions
/// during test runs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A pipeline against the in-memory store with test-friendly timings.
pub fn test_pipeline(store: &MemoryGraph, config: PipelineConfig) -> IngestPipeline {
    init_tracing();
    IngestPipeline::new(config, Arc::new(JsonArtifactParser), Arc::new(store.clone()))
        .with_memory_monitor(Arc::new(FixedMemoryMonitor::relaxed()))
        .with_retry_base_delay(Duration::from_millis(1))
}

/// Renderer producing a stub raster; optionally slow, to hold a worker.
pub struct StubRenderer {
    pub delay: Duration,
}

impl StubRenderer {
    pub fn instant() -> Self {
        StubRenderer { delay: Duration::ZERO }
    }

    pub fn slow(delay: Duration) -> Self {
        StubRenderer { delay }
    }
}

impl RegionRenderer for StubRenderer {
    fn render(&self, region: &Region, _config: &RenderConfig) -> cadgraph::Result<RenderedRegion> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(RenderedRegion {
            region: region.clone(),
            image: vec![0u8; 16],
            image_size: (4, 4),
            actual_bounds: region.bounds,
            scale_factor: 1.0,
            metadata: json!({}),
        })
    }
}

/// OCR engine that recognizes a fixed word list in every region.
pub struct WordListOcr {
    pub words: Vec<(String, f64)>,
}

impl WordListOcr {
    pub fn new(words: &[(&str, f64)]) -> Self {
        WordListOcr {
            words: words.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
        }
    }
}

impl OcrEngine for WordListOcr {
    fn recognize(&self, _rendered: &RenderedRegion, _context: &OcrContext) -> cadgraph::Result<OcrOutcome> {
        Ok(OcrOutcome {
            engine: "wordlist".to_string(),
            full_text: self
                .words
                .iter()
                .map(|(t, _)| t.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            words: self
                .words
                .iter()
                .map(|(t, c)| OcrWord { text: t.clone(), confidence: *c })
                .collect(),
            confidence_score: 0.9,
            processing_time: 0.01,
        })
    }
}
