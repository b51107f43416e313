//! The five-stage enrichment pipeline
//!
//! Runs inside a Job Manager worker: extract the drawing again, render
//! and recognize candidate regions, cross-validate against the vector
//! data, score the run, and merge OCR nodes into the ingest's graph.
//! Progress points per stage are fixed and observable through job
//! status.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::load::{GraphWriter, MemoryMonitor};
use crate::parser::CadParser;
use crate::project::GraphProjector;
use crate::store::SessionManager;
use crate::stream::EntityStream;

use super::regions::{derive_regions, drawing_bounds};
use super::validate::{cross_validate, score_quality};
use super::{OcrContext, OcrEngine, OcrOutcome, Region, RegionRenderer, RenderConfig};

/// Stage boundaries: name plus the progress reached when it finishes.
const STAGES: [(&str, f64); 5] = [
    ("extract", 0.30),
    ("render_ocr", 0.70),
    ("cross_validate", 0.85),
    ("quality_score", 0.95),
    ("assemble", 1.00),
];

/// Progress reported when the first stage begins.
const INITIAL_PROGRESS: f64 = 0.10;

/// One live update from the runner to its observer.
#[derive(Debug, Clone)]
pub struct StageUpdate {
    pub stage: &'static str,
    pub progress: f64,
    /// Metrics that became known at this point
    pub metrics: Vec<(String, Value)>,
}

/// The outcome persisted with a completed job.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentResult {
    pub success: bool,
    pub message: String,
    pub summary: EnrichmentSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentSummary {
    pub regions_processed: usize,
    pub ocr_results: usize,
    pub validations: usize,
    pub discoveries: usize,
    pub health_score: f64,
    pub nodes_added: usize,
    pub relationships_added: usize,
    pub processing_time: f64,
}

/// Executes enrichment for one file.
///
/// Shared by all workers; per-job state lives on the stack of `run`.
pub struct EnrichmentRunner {
    parser: Arc<dyn CadParser>,
    renderer: Arc<dyn RegionRenderer>,
    ocr: Arc<dyn OcrEngine>,
    session: SessionManager,
    monitor: Arc<dyn MemoryMonitor>,
    config: PipelineConfig,
}

impl EnrichmentRunner {
    pub fn new(
        parser: Arc<dyn CadParser>,
        renderer: Arc<dyn RegionRenderer>,
        ocr: Arc<dyn OcrEngine>,
        session: SessionManager,
        monitor: Arc<dyn MemoryMonitor>,
        config: PipelineConfig,
    ) -> Self {
        EnrichmentRunner { parser, renderer, ocr, session, monitor, config }
    }

    /// Run all five stages for `file_path`, reporting progress through
    /// `observe`.
    pub fn run(
        &self,
        file_path: &Path,
        observe: &mut dyn FnMut(StageUpdate),
    ) -> Result<EnrichmentResult> {
        let run_started = Instant::now();

        // Stage 1: extract.
        observe(StageUpdate {
            stage: STAGES[0].0,
            progress: INITIAL_PROGRESS,
            metrics: Vec::new(),
        });
        let stage_started = Instant::now();
        let artifact = self.parser.parse(file_path)?;
        let mut stream = EntityStream::open(&artifact)?;
        let mut entities = Vec::new();
        loop {
            let chunk = stream.next_chunk(self.config.streaming_chunk_size)?;
            if chunk.is_empty() {
                break;
            }
            entities.extend(chunk);
        }
        let cad_texts: Vec<String> = entities
            .iter()
            .filter_map(|e| e.text_content().map(str::to_string))
            .collect();
        let bounds = drawing_bounds(&entities);
        let regions = match bounds {
            Some(bounds) if !bounds.is_empty() => derive_regions(&bounds, cad_texts.len()),
            _ => Vec::new(),
        };
        observe(StageUpdate {
            stage: STAGES[0].0,
            progress: STAGES[0].1,
            metrics: vec![
                ("extraction_time".to_string(), json!(stage_started.elapsed().as_secs_f64())),
                ("entities_extracted".to_string(), json!(entities.len())),
                ("regions_found".to_string(), json!(regions.len())),
            ],
        });

        if regions.is_empty() {
            info!(file = %file_path.display(), "no candidate regions; enrichment is a no-op");
            return Ok(EnrichmentResult {
                success: true,
                message: "no candidate regions found for OCR".to_string(),
                summary: EnrichmentSummary {
                    regions_processed: 0,
                    ocr_results: 0,
                    validations: 0,
                    discoveries: 0,
                    health_score: 0.0,
                    nodes_added: 0,
                    relationships_added: 0,
                    processing_time: run_started.elapsed().as_secs_f64(),
                },
            });
        }

        // Stage 2: render + OCR, region by region.
        let stage_started = Instant::now();
        let drawing_extent = bounds.unwrap_or(super::Bounds::new(0.0, 0.0, 0.0, 0.0));
        let render_config = RenderConfig::default();
        let mut outcomes: Vec<(Region, OcrOutcome)> = Vec::new();
        let span = STAGES[1].1 - STAGES[0].1;
        for (i, region) in regions.iter().enumerate() {
            observe(StageUpdate {
                stage: STAGES[1].0,
                progress: STAGES[0].1 + span * (i as f64 / regions.len() as f64),
                metrics: Vec::new(),
            });
            let rendered = self.renderer.render(region, &render_config).map_err(|e| {
                PipelineError::JobExecution(format!("render {}: {e}", region.region_id))
            })?;
            let context = OcrContext::for_region(region.region_type, drawing_extent);
            let outcome = self.ocr.recognize(&rendered, &context).map_err(|e| {
                PipelineError::JobExecution(format!("ocr {}: {e}", region.region_id))
            })?;
            debug!(
                region = %region.region_id,
                words = outcome.words.len(),
                "region recognized"
            );
            outcomes.push((region.clone(), outcome));
        }
        observe(StageUpdate {
            stage: STAGES[1].0,
            progress: STAGES[1].1,
            metrics: vec![
                ("ocr_time".to_string(), json!(stage_started.elapsed().as_secs_f64())),
                ("ocr_results".to_string(), json!(outcomes.len())),
            ],
        });

        // Stage 3: cross-validate against the vector data.
        let enrichment = cross_validate(&outcomes, &cad_texts);
        observe(StageUpdate {
            stage: STAGES[2].0,
            progress: STAGES[2].1,
            metrics: vec![
                ("validations".to_string(), json!(enrichment.validations)),
                ("discoveries".to_string(), json!(enrichment.discoveries)),
            ],
        });

        // Stage 4: quality score.
        let quality = score_quality(&enrichment, regions.len(), run_started.elapsed().as_secs_f64());
        observe(StageUpdate {
            stage: STAGES[3].0,
            progress: STAGES[3].1,
            metrics: vec![("health_score".to_string(), json!(quality.health_score))],
        });

        // Stage 5: assemble and merge into the graph, without clearing.
        let mut projector = GraphProjector::new(
            file_path.file_stem().and_then(|s| s.to_str()).unwrap_or("drawing"),
        );
        let payload = projector.project_ocr(&enrichment);
        let mut writer = GraphWriter::for_enrichment(
            self.session.clone(),
            self.monitor.clone(),
            &self.config,
        );
        let report = writer.write(&payload)?;
        observe(StageUpdate {
            stage: STAGES[4].0,
            progress: STAGES[4].1,
            metrics: vec![
                ("nodes_added".to_string(), json!(report.nodes_written)),
                ("relationships_added".to_string(), json!(report.relationships_written)),
            ],
        });

        Ok(EnrichmentResult {
            success: true,
            message: format!(
                "enrichment completed: {} regions, {} words",
                enrichment.regions.len(),
                enrichment.texts.len()
            ),
            summary: EnrichmentSummary {
                regions_processed: regions.len(),
                ocr_results: outcomes.len(),
                validations: enrichment.validations,
                discoveries: enrichment.discoveries,
                health_score: quality.health_score,
                nodes_added: report.nodes_written,
                relationships_added: report.relationships_written,
                processing_time: run_started.elapsed().as_secs_f64(),
            },
        })
    }
}
