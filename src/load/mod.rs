//! Batcher & Writer
//!
//! Takes a graph payload (streamed or whole) and writes it to the
//! store idempotently: clear once per ingest, group by label and
//! edge pattern, size batches against free memory, sweep every
//! property for graph safety, and merge under the session manager's
//! retry policy. Nodes always land before relationships.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::graph::{coerce_graph_safe, GraphPayload};
use crate::store::{NodeRow, RelPattern, RelRow, SessionManager};

pub use memory::{
    compute_batch_size, FixedMemoryMonitor, MemoryMonitor, MemoryPressure, MemorySnapshot,
    SysMemoryMonitor,
};

/// Row count above which the safety sweep runs in parallel.
const SWEEP_PARALLEL_THRESHOLD: usize = 512;

/// Writer behavior knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    /// Remove all prior data before the first flush (the ingest path).
    /// Enrichment writers leave the graph in place.
    pub clear_before_write: bool,
    /// Pause after a batch under high memory pressure.
    pub pause_high: Duration,
    /// Pause after a batch under critical memory pressure.
    pub pause_critical: Duration,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            clear_before_write: true,
            pause_high: Duration::from_secs(1),
            pause_critical: Duration::from_secs(3),
        }
    }
}

/// Counters from one writer lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub nodes_written: usize,
    pub relationships_written: usize,
    pub node_batches: usize,
    pub relationship_batches: usize,
    pub properties_coerced: u64,
    pub backpressure_pauses: u32,
    pub cleared: bool,
}

impl WriteReport {
    fn absorb(&mut self, other: WriteReport) {
        self.nodes_written += other.nodes_written;
        self.relationships_written += other.relationships_written;
        self.node_batches += other.node_batches;
        self.relationship_batches += other.relationship_batches;
        self.properties_coerced += other.properties_coerced;
        self.backpressure_pauses += other.backpressure_pauses;
        self.cleared |= other.cleared;
    }
}

/// Writes graph payloads through a session manager.
///
/// One writer serves one ingest; the Clear step runs on its first
/// flush only.
pub struct GraphWriter {
    session: SessionManager,
    monitor: Arc<dyn MemoryMonitor>,
    options: WriteOptions,
    memory_high_pct: u8,
    memory_critical_pct: u8,
    cleared: bool,
    report: WriteReport,
}

impl GraphWriter {
    pub fn new(
        session: SessionManager,
        monitor: Arc<dyn MemoryMonitor>,
        config: &PipelineConfig,
    ) -> Self {
        GraphWriter {
            session,
            monitor,
            options: WriteOptions::default(),
            memory_high_pct: config.memory_high_pct,
            memory_critical_pct: config.memory_critical_pct,
            cleared: false,
            report: WriteReport::default(),
        }
    }

    /// A writer that merges into the existing graph (enrichment path).
    pub fn for_enrichment(
        session: SessionManager,
        monitor: Arc<dyn MemoryMonitor>,
        config: &PipelineConfig,
    ) -> Self {
        let mut writer = Self::new(session, monitor, config);
        writer.options.clear_before_write = false;
        writer
    }

    /// Override pauses (tests shrink them).
    pub fn with_pauses(mut self, high: Duration, critical: Duration) -> Self {
        self.options.pause_high = high;
        self.options.pause_critical = critical;
        self
    }

    /// Accumulated counters across all flushes so far.
    pub fn report(&self) -> &WriteReport {
        &self.report
    }

    /// Write one payload. May be called repeatedly with successive
    /// chunks of the same ingest.
    pub fn write(&mut self, payload: &GraphPayload) -> Result<WriteReport> {
        validate_payload(payload)?;

        let mut report = WriteReport::default();
        if self.options.clear_before_write && !self.cleared {
            self.clear()?;
            self.cleared = true;
            report.cleared = true;
        }

        let node_groups = group_nodes(payload);
        let rel_groups = group_relationships(payload);

        let total_rows = payload.nodes.len() + payload.relationships.len();
        let snapshot = self.monitor.snapshot();
        let batch_size = compute_batch_size(total_rows, &snapshot);
        debug!(
            total_rows,
            batch_size,
            available_mb = snapshot.available_mb,
            "computed adaptive batch size"
        );

        for (label, rows) in &node_groups {
            for chunk in rows.chunks(batch_size) {
                let (prepared, coerced) = sweep_node_rows(chunk);
                report.properties_coerced += coerced;
                self.session
                    .execute_with_retry(&format!("merge {} {label} nodes", prepared.len()), &mut |tx| {
                        tx.merge_nodes(label, &prepared)
                    })?;
                report.nodes_written += prepared.len();
                report.node_batches += 1;
                report.backpressure_pauses += self.pause_for_pressure();
            }
        }

        for (pattern, rows) in &rel_groups {
            for chunk in rows.chunks(batch_size) {
                let (prepared, coerced) = sweep_rel_rows(chunk);
                report.properties_coerced += coerced;
                self.session.execute_with_retry(
                    &format!(
                        "merge {} {}-[{}]->{} relationships",
                        prepared.len(),
                        pattern.start_label,
                        pattern.rel_type,
                        pattern.end_label
                    ),
                    &mut |tx| tx.merge_relationships(pattern, &prepared),
                )?;
                report.relationships_written += prepared.len();
                report.relationship_batches += 1;
                report.backpressure_pauses += self.pause_for_pressure();
            }
        }

        self.report.absorb(report.clone());
        Ok(report)
    }

    /// The Clear step: remove all prior data in one managed
    /// transaction, via the store's bulk path when it has one.
    fn clear(&mut self) -> Result<()> {
        if self.session.supports_bulk_delete() {
            info!("clearing prior dataset via store bulk-delete path");
        } else {
            info!("clearing prior dataset via detach-delete transaction");
        }
        self.session
            .execute_with_retry("clear prior dataset", &mut |tx| tx.delete_all())
    }

    /// Pause between batches when memory pressure demands it.
    /// Returns 1 when a pause was taken.
    fn pause_for_pressure(&self) -> u32 {
        let snapshot = self.monitor.snapshot();
        match snapshot.pressure(self.memory_high_pct, self.memory_critical_pct) {
            MemoryPressure::Critical => {
                warn!(
                    used_pct = snapshot.used_pct,
                    "critical memory pressure; pausing between batches"
                );
                std::thread::sleep(self.options.pause_critical);
                1
            }
            MemoryPressure::High => {
                debug!(
                    used_pct = snapshot.used_pct,
                    "high memory pressure; brief pause between batches"
                );
                std::thread::sleep(self.options.pause_high);
                1
            }
            MemoryPressure::Normal => 0,
        }
    }
}

fn validate_payload(payload: &GraphPayload) -> Result<()> {
    for node in &payload.nodes {
        if node.uid.trim().is_empty() {
            return Err(PipelineError::Payload(format!(
                "{} node with empty uid",
                node.label.name()
            )));
        }
    }
    for rel in &payload.relationships {
        if rel.start_uid.trim().is_empty() || rel.end_uid.trim().is_empty() {
            return Err(PipelineError::Payload(format!(
                "{} relationship with empty endpoint uid",
                rel.rel_type.name()
            )));
        }
    }
    Ok(())
}

/// Group nodes by label, preserving payload order within each group.
fn group_nodes(payload: &GraphPayload) -> IndexMap<&'static str, Vec<NodeRow>> {
    let mut groups: IndexMap<&'static str, Vec<NodeRow>> = IndexMap::new();
    for node in &payload.nodes {
        groups.entry(node.label.name()).or_default().push(NodeRow {
            uid: node.uid.clone(),
            properties: node
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        });
    }
    groups
}

/// Group relationships by `(start_label, type, end_label)`.
fn group_relationships(payload: &GraphPayload) -> IndexMap<RelPattern, Vec<RelRow>> {
    let mut groups: IndexMap<RelPattern, Vec<RelRow>> = IndexMap::new();
    for rel in &payload.relationships {
        let pattern = RelPattern {
            start_label: rel.start_label.name().to_string(),
            rel_type: rel.rel_type.name().to_string(),
            end_label: rel.end_label.name().to_string(),
        };
        groups.entry(pattern).or_default().push(RelRow {
            start_uid: rel.start_uid.clone(),
            end_uid: rel.end_uid.clone(),
            properties: rel
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        });
    }
    groups
}

/// Final safety sweep: coerce every property to a graph-safe value.
fn sweep_properties(properties: &serde_json::Map<String, Value>) -> (serde_json::Map<String, Value>, u64) {
    let mut coerced = 0u64;
    let mut swept = serde_json::Map::with_capacity(properties.len());
    for (k, v) in properties {
        let (safe, changed) = coerce_graph_safe(v.clone());
        if changed {
            coerced += 1;
        }
        swept.insert(k.clone(), safe);
    }
    (swept, coerced)
}

fn sweep_node_rows(rows: &[NodeRow]) -> (Vec<NodeRow>, u64) {
    let sweep_one = |row: &NodeRow| {
        let (properties, coerced) = sweep_properties(&row.properties);
        (NodeRow { uid: row.uid.clone(), properties }, coerced)
    };
    let swept: Vec<(NodeRow, u64)> = if rows.len() > SWEEP_PARALLEL_THRESHOLD {
        rows.par_iter().map(sweep_one).collect()
    } else {
        rows.iter().map(sweep_one).collect()
    };
    let coerced = swept.iter().map(|(_, c)| c).sum();
    (swept.into_iter().map(|(r, _)| r).collect(), coerced)
}

fn sweep_rel_rows(rows: &[RelRow]) -> (Vec<RelRow>, u64) {
    let sweep_one = |row: &RelRow| {
        let (properties, coerced) = sweep_properties(&row.properties);
        (
            RelRow {
                start_uid: row.start_uid.clone(),
                end_uid: row.end_uid.clone(),
                properties,
            },
            coerced,
        )
    };
    let swept: Vec<(RelRow, u64)> = if rows.len() > SWEEP_PARALLEL_THRESHOLD {
        rows.par_iter().map(sweep_one).collect()
    } else {
        rows.iter().map(sweep_one).collect()
    };
    let coerced = swept.iter().map(|(_, c)| c).sum();
    (swept.into_iter().map(|(r, _)| r).collect(), coerced)
}
