//! # cadgraph
//!
//! A pure Rust pipeline for ingesting engineering CAD drawings (DWG and
//! DXF) into a labeled property graph.
//!
//! The crate owns the staged transformation from raw CAD bytes to a
//! batched, memory-bounded, idempotent graph write:
//!
//! ```text
//! file → Parser (external) → Entity Streamer → Normalizer
//!      → Graph Projector → Batcher & Writer → Graph Store
//! ```
//!
//! plus a bounded asynchronous job manager that runs region rendering,
//! OCR, cross-validation and graph enrichment off the upload path.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cadgraph::{IngestPipeline, PipelineConfig};
//! use cadgraph::parser::JsonArtifactParser;
//! use cadgraph::store::MemoryGraph;
//!
//! let pipeline = IngestPipeline::new(
//!     PipelineConfig::from_env(),
//!     Arc::new(JsonArtifactParser),
//!     Arc::new(MemoryGraph::new()),
//! );
//! let report = pipeline.ingest("drawings/plan.dxf".as_ref())?;
//! println!("{} nodes written", report.nodes_created);
//! # Ok::<(), cadgraph::PipelineError>(())
//! ```
//!
//! ## Architecture
//!
//! External collaborators are traits at the boundaries:
//!
//! - `CadParser`: format-specific DWG/DXF readers
//! - `RegionRenderer` / `OcrEngine`: raster rendering and recognition
//! - `GraphDriver`: the graph store (an in-memory implementation
//!   ships for tests and as the merge-semantics reference)
//!
//! Everything between those seams lives here: normalization,
//! streaming, projection, batching, retry, and the job system.

#![allow(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod detect;
pub mod entity;
pub mod enrich;
pub mod error;
pub mod graph;
pub mod jobs;
pub mod load;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod project;
pub mod store;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use entity::{CanonicalEntity, EntityKind};
pub use error::{PipelineError, Result};
pub use graph::{GraphNode, GraphPayload, GraphRelationship, NodeLabel, RelType};
pub use jobs::{JobManager, JobState, JobStatus};
pub use normalize::{Normalizer, NormalizeStats};
pub use parser::{CadParser, ParsedArtifact, RawRecord};
pub use pipeline::{IngestPipeline, IngestReport};
pub use project::GraphProjector;
pub use store::{GraphDriver, MemoryGraph, SessionManager};
pub use stream::EntityStream;
pub use types::{AttrValue, Point3};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
