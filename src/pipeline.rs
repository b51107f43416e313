//! Pipeline orchestrator
//!
//! Drives one upload end to end: validate, stage, parse, choose the
//! transformation strategy, write, and optionally hand the staged file
//! to the Job Manager for enrichment. Every fallback is a named,
//! logged decision; on failure the staged upload is deleted and a
//! typed error surfaces.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::detect::extension_supported;
use crate::enrich::{EnrichmentRunner, OcrEngine, RegionRenderer};
use crate::error::{PipelineError, Result};
use crate::graph::GraphPayload;
use crate::jobs::JobManager;
use crate::load::{GraphWriter, MemoryMonitor, SysMemoryMonitor, WriteReport};
use crate::normalize::NormalizeStats;
use crate::parser::{CadParser, ParsedArtifact};
use crate::project::{GraphProjector, ProjectionStats};
use crate::store::{GraphDriver, SessionManager};
use crate::stream::{EntityStream, StreamStats};

/// Statistics block accompanying an ingest result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestStats {
    pub stream: StreamStats,
    pub normalize: NormalizeStats,
    pub projection: ProjectionStats,
    pub write: WriteReport,
    /// Whether the streaming transformation was used
    pub streamed: bool,
    /// Whether the wall-clock guard forced the whole-file fallback
    pub streaming_fallback: bool,
}

/// The ingest result returned to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub file_path: PathBuf,
    pub entities_extracted: usize,
    pub nodes_created: usize,
    pub relationships_created: usize,
    /// Present when an enrichment job was submitted
    pub job_id: Option<String>,
    pub stats: IngestStats,
}

/// Composes the ingest stages for single uploads.
pub struct IngestPipeline {
    config: PipelineConfig,
    parser: Arc<dyn CadParser>,
    session: SessionManager,
    monitor: Arc<dyn MemoryMonitor>,
    jobs: Option<JobManager>,
}

impl IngestPipeline {
    pub fn new(
        config: PipelineConfig,
        parser: Arc<dyn CadParser>,
        driver: Arc<dyn GraphDriver>,
    ) -> Self {
        let session = SessionManager::new(driver, &config);
        IngestPipeline {
            config,
            parser,
            session,
            monitor: Arc::new(SysMemoryMonitor::new()),
            jobs: None,
        }
    }

    /// Substitute the memory monitor (tests pin readings).
    pub fn with_memory_monitor(mut self, monitor: Arc<dyn MemoryMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Shrink the retry backoff unit (tests).
    pub fn with_retry_base_delay(mut self, base_delay: std::time::Duration) -> Self {
        self.session = self.session.with_base_delay(base_delay);
        self
    }

    /// Attach the enrichment engines and start the Job Manager.
    ///
    /// Jobs are submitted automatically after each ingest only when
    /// `async_enrichment_enabled` is set; manual submission through
    /// [`IngestPipeline::jobs`] works either way.
    pub fn with_enrichment(
        mut self,
        renderer: Arc<dyn RegionRenderer>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        let runner = EnrichmentRunner::new(
            self.parser.clone(),
            renderer,
            ocr,
            self.session.clone(),
            self.monitor.clone(),
            self.config.clone(),
        );
        self.jobs = Some(JobManager::new(
            self.config.max_workers,
            &self.config.results_dir,
            Arc::new(runner),
        ));
        self
    }

    pub fn jobs(&self) -> Option<&JobManager> {
        self.jobs.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Join the job workers; call at host shutdown.
    pub fn shutdown(mut self) {
        if let Some(jobs) = self.jobs.take() {
            jobs.shutdown();
        }
    }

    /// Ingest one uploaded file.
    pub fn ingest(&self, upload: &Path) -> Result<IngestReport> {
        let staged = self.validate_and_stage(upload)?;
        match self.ingest_staged(upload, &staged) {
            Ok(report) => Ok(report),
            Err(e) => {
                // Failed ingests leave no staged upload behind.
                if let Err(remove_err) = std::fs::remove_file(&staged) {
                    warn!(
                        staged = %staged.display(),
                        error = %remove_err,
                        "could not delete staged upload after failure"
                    );
                }
                Err(e)
            }
        }
    }

    fn validate_and_stage(&self, upload: &Path) -> Result<PathBuf> {
        if !extension_supported(upload) {
            return Err(PipelineError::Input(format!(
                "unsupported extension: {} (only DWG and DXF are supported)",
                upload.display()
            )));
        }
        let metadata = std::fs::metadata(upload)
            .map_err(|e| PipelineError::Input(format!("unreadable upload: {e}")))?;
        if metadata.len() == 0 {
            return Err(PipelineError::Input("empty upload".to_string()));
        }
        if metadata.len() > self.config.max_upload_bytes {
            return Err(PipelineError::Input(format!(
                "file size {} exceeds the {} byte limit",
                metadata.len(),
                self.config.max_upload_bytes
            )));
        }

        std::fs::create_dir_all(&self.config.staging_dir)?;
        let file_name = upload
            .file_name()
            .ok_or_else(|| PipelineError::Input("upload has no file name".to_string()))?;
        let staged = self.config.staging_dir.join(file_name);
        std::fs::copy(upload, &staged)?;
        Ok(staged)
    }

    fn ingest_staged(&self, upload: &Path, staged: &Path) -> Result<IngestReport> {
        let started = Instant::now();
        let artifact = self.parser.parse(staged)?;
        let entity_count = EntityStream::count_entities(&artifact)?;
        info!(
            file = %staged.display(),
            entity_count,
            "parsed upload"
        );

        let source_name = upload
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("drawing")
            .to_string();

        let mut stats = IngestStats::default();
        let payload = if self.config.use_streaming(entity_count) && artifact.restartable() {
            stats.streamed = true;
            let chunk_size = self.config.chunk_size_for(entity_count);
            info!(
                entity_count,
                threshold = self.config.streaming_entity_threshold,
                chunk_size,
                "entity count above streaming threshold; using streaming transformation"
            );
            match self.transform_streaming(&artifact, &source_name, chunk_size, &mut stats)? {
                Some(payload) => payload,
                None => {
                    stats.streaming_fallback = true;
                    warn!(
                        timeout_s = self.config.streaming_timeout.as_secs(),
                        "streaming transformation exceeded its wall-clock guard; \
                         falling back to whole-file transformation"
                    );
                    self.transform_whole(&artifact, &source_name, &mut stats)?
                }
            }
        } else {
            if self.config.use_streaming(entity_count) {
                info!("artifact is single-pass; using whole-file transformation");
            }
            self.transform_whole(&artifact, &source_name, &mut stats)?
        };

        let mut writer = GraphWriter::new(self.session.clone(), self.monitor.clone(), &self.config);
        let write_report = writer.write(&payload)?;
        stats.write = write_report;

        let job_id = if self.config.async_enrichment_enabled {
            match &self.jobs {
                Some(jobs) => Some(jobs.submit(staged, json!({}))?),
                None => {
                    warn!("async enrichment enabled but no engines attached; skipping job");
                    None
                }
            }
        } else {
            None
        };

        info!(
            nodes = stats.write.nodes_written,
            relationships = stats.write.relationships_written,
            discarded_entities = stats.projection.discarded(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingest complete"
        );
        Ok(IngestReport {
            file_path: staged.to_path_buf(),
            entities_extracted: entity_count,
            nodes_created: stats.write.nodes_written,
            relationships_created: stats.write.relationships_written,
            job_id,
            stats,
        })
    }

    /// Chunked transformation under the wall-clock guard.
    ///
    /// `Ok(None)` signals guard expiry; the caller falls back to the
    /// whole-file path.
    fn transform_streaming(
        &self,
        artifact: &ParsedArtifact,
        source_name: &str,
        chunk_size: usize,
        stats: &mut IngestStats,
    ) -> Result<Option<GraphPayload>> {
        let deadline = Instant::now() + self.config.streaming_timeout;
        let mut stream = EntityStream::open(artifact)?;
        let mut projector = GraphProjector::new(source_name);
        let mut payload = projector.root_payload();
        loop {
            if Instant::now() >= deadline {
                return Ok(None);
            }
            let chunk = stream.next_chunk(chunk_size)?;
            if chunk.is_empty() {
                break;
            }
            payload.extend(projector.project_chunk(&chunk));
        }
        let (stream_stats, normalize_stats) = stream.into_stats();
        stats.stream = stream_stats;
        stats.normalize = normalize_stats;
        stats.projection = projector.stats().clone();
        Ok(Some(payload))
    }

    /// Whole-file transformation: all entities resident, one projection
    /// pass.
    fn transform_whole(
        &self,
        artifact: &ParsedArtifact,
        source_name: &str,
        stats: &mut IngestStats,
    ) -> Result<GraphPayload> {
        let mut stream = EntityStream::open(artifact)?;
        let mut entities = Vec::new();
        loop {
            let chunk = stream.next_chunk(usize::MAX)?;
            if chunk.is_empty() {
                break;
            }
            entities.extend(chunk);
        }
        let mut projector = GraphProjector::new(source_name);
        let mut payload = projector.root_payload();
        payload.extend(projector.project_chunk(&entities));
        let (stream_stats, normalize_stats) = stream.into_stats();
        stats.stream = stream_stats;
        stats.normalize = normalize_stats;
        stats.projection = projector.stats().clone();
        Ok(payload)
    }
}
