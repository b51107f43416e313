//! In-memory graph store
//!
//! Implements the driver traits with merge-by-uid semantics matching
//! the Cypher the batcher renders. Used as the test substitute for a
//! real store and as the reference implementation of idempotent merge
//! behavior. Supports failure injection so retry paths can be driven
//! deterministically.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::{
    GraphDriver, GraphSession, GraphTransaction, NodeRow, RelPattern, RelRow, StoreError,
    StoreResult,
};

type NodeKey = (String, String); // (label, uid)
type RelKey = (String, String, String, String, String); // (start_label, start_uid, type, end_label, end_uid)

#[derive(Debug, Clone, Default)]
struct GraphData {
    nodes: AHashMap<NodeKey, serde_json::Map<String, Value>>,
    relationships: AHashMap<RelKey, serde_json::Map<String, Value>>,
}

/// Shared in-memory graph store.
///
/// Cloning yields a handle to the same graph.
#[derive(Clone, Default)]
pub struct MemoryGraph {
    data: Arc<Mutex<GraphData>>,
    /// Errors returned by upcoming transactions, in order.
    failures: Arc<Mutex<VecDeque<StoreError>>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next write transaction.
    pub fn inject_failure(&self, error: StoreError) {
        self.failures.lock().push_back(error);
    }

    /// Queue `n` transient failures.
    pub fn inject_transient_failures(&self, n: usize) {
        for i in 0..n {
            self.inject_failure(StoreError::Transient(format!("injected failure {}", i + 1)));
        }
    }

    pub fn node_count(&self) -> usize {
        self.data.lock().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.data.lock().relationships.len()
    }

    pub fn label_count(&self, label: &str) -> usize {
        self.data
            .lock()
            .nodes
            .keys()
            .filter(|(l, _)| l == label)
            .count()
    }

    pub fn node(&self, label: &str, uid: &str) -> Option<serde_json::Map<String, Value>> {
        self.data
            .lock()
            .nodes
            .get(&(label.to_string(), uid.to_string()))
            .cloned()
    }

    /// Uids under a label, sorted for stable assertions.
    pub fn uids(&self, label: &str) -> Vec<String> {
        let mut uids: Vec<String> = self
            .data
            .lock()
            .nodes
            .keys()
            .filter(|(l, _)| l == label)
            .map(|(_, uid)| uid.clone())
            .collect();
        uids.sort();
        uids
    }

    pub fn has_relationship(
        &self,
        start: (&str, &str),
        rel_type: &str,
        end: (&str, &str),
    ) -> bool {
        self.data.lock().relationships.contains_key(&(
            start.0.to_string(),
            start.1.to_string(),
            rel_type.to_string(),
            end.0.to_string(),
            end.1.to_string(),
        ))
    }

    /// `(start_uid, type, end_uid)` triples, sorted.
    pub fn relationship_triples(&self) -> Vec<(String, String, String)> {
        let mut triples: Vec<(String, String, String)> = self
            .data
            .lock()
            .relationships
            .keys()
            .map(|(_, start_uid, rel_type, _, end_uid)| {
                (start_uid.clone(), rel_type.clone(), end_uid.clone())
            })
            .collect();
        triples.sort();
        triples
    }

    /// `(label, uid, sorted property keys+values)` triples, sorted.
    ///
    /// The determinism assertions compare these across ingests.
    pub fn node_triples(&self) -> Vec<(String, String, Vec<(String, Value)>)> {
        let mut triples: Vec<(String, String, Vec<(String, Value)>)> = self
            .data
            .lock()
            .nodes
            .iter()
            .map(|((label, uid), props)| {
                let mut sorted: Vec<(String, Value)> =
                    props.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                (label.clone(), uid.clone(), sorted)
            })
            .collect();
        triples.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        triples
    }
}

impl GraphDriver for MemoryGraph {
    fn session(&self, _database: &str) -> StoreResult<Box<dyn GraphSession>> {
        Ok(Box::new(MemorySession { store: self.clone() }))
    }

    fn supports_bulk_delete(&self) -> bool {
        true
    }
}

struct MemorySession {
    store: MemoryGraph,
}

impl GraphSession for MemorySession {
    fn execute_write(
        &mut self,
        work: &mut dyn FnMut(&mut dyn GraphTransaction) -> StoreResult<()>,
    ) -> StoreResult<()> {
        if let Some(error) = self.store.failures.lock().pop_front() {
            return Err(error);
        }
        // Transactions are atomic: work runs against a copy that only
        // replaces the shared graph on success.
        let mut tx = MemoryTransaction {
            data: self.store.data.lock().clone(),
        };
        work(&mut tx)?;
        *self.store.data.lock() = tx.data;
        Ok(())
    }
}

struct MemoryTransaction {
    data: GraphData,
}

impl GraphTransaction for MemoryTransaction {
    fn delete_all(&mut self) -> StoreResult<()> {
        self.data.nodes.clear();
        self.data.relationships.clear();
        Ok(())
    }

    fn merge_nodes(&mut self, label: &str, rows: &[NodeRow]) -> StoreResult<()> {
        for row in rows {
            if row.uid.is_empty() {
                return Err(StoreError::Other("node row with empty uid".to_string()));
            }
            // Full property replacement, uid re-asserted.
            self.data
                .nodes
                .insert((label.to_string(), row.uid.clone()), row.properties.clone());
        }
        Ok(())
    }

    fn merge_relationships(&mut self, pattern: &RelPattern, rows: &[RelRow]) -> StoreResult<()> {
        for row in rows {
            let start_key = (pattern.start_label.clone(), row.start_uid.clone());
            let end_key = (pattern.end_label.clone(), row.end_uid.clone());
            // MATCH semantics: missing endpoints make the row a no-op.
            if !self.data.nodes.contains_key(&start_key)
                || !self.data.nodes.contains_key(&end_key)
            {
                continue;
            }
            let key = (
                pattern.start_label.clone(),
                row.start_uid.clone(),
                pattern.rel_type.clone(),
                pattern.end_label.clone(),
                row.end_uid.clone(),
            );
            let props = self.data.relationships.entry(key).or_default();
            for (k, v) in &row.properties {
                props.insert(k.clone(), v.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(uid: &str, layer: &str) -> NodeRow {
        let mut properties = serde_json::Map::new();
        properties.insert("layer".to_string(), json!(layer));
        NodeRow { uid: uid.to_string(), properties }
    }

    fn write(store: &MemoryGraph, work: &mut dyn FnMut(&mut dyn GraphTransaction) -> StoreResult<()>) -> StoreResult<()> {
        store.session("neo4j")?.execute_write(work)
    }

    #[test]
    fn test_merge_is_idempotent() {
        let store = MemoryGraph::new();
        for _ in 0..2 {
            write(&store, &mut |tx| tx.merge_nodes("Space", &[row("space_1", "0")])).unwrap();
        }
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_merge_replaces_properties() {
        let store = MemoryGraph::new();
        write(&store, &mut |tx| tx.merge_nodes("Space", &[row("space_1", "A")])).unwrap();
        write(&store, &mut |tx| tx.merge_nodes("Space", &[row("space_1", "B")])).unwrap();
        let node = store.node("Space", "space_1").unwrap();
        assert_eq!(node.get("layer"), Some(&json!("B")));
        assert_eq!(node.len(), 1);
    }

    #[test]
    fn test_relationship_needs_endpoints() {
        let store = MemoryGraph::new();
        let pattern = RelPattern {
            start_label: "Floor".to_string(),
            rel_type: "HAS_SPACE".to_string(),
            end_label: "Space".to_string(),
        };
        let rel = RelRow {
            start_uid: "floor_1".to_string(),
            end_uid: "space_1".to_string(),
            properties: serde_json::Map::new(),
        };
        write(&store, &mut |tx| tx.merge_relationships(&pattern, &[rel.clone()])).unwrap();
        assert_eq!(store.relationship_count(), 0);

        write(&store, &mut |tx| {
            tx.merge_nodes("Floor", &[row("floor_1", "0")])?;
            tx.merge_nodes("Space", &[row("space_1", "0")])
        })
        .unwrap();
        write(&store, &mut |tx| tx.merge_relationships(&pattern, &[rel.clone()])).unwrap();
        assert!(store.has_relationship(("Floor", "floor_1"), "HAS_SPACE", ("Space", "space_1")));
    }

    #[test]
    fn test_failed_transaction_changes_nothing() {
        let store = MemoryGraph::new();
        let result = write(&store, &mut |tx| {
            tx.merge_nodes("Space", &[row("space_1", "0")])?;
            Err(StoreError::Other("midway".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_failure_injection_order() {
        let store = MemoryGraph::new();
        store.inject_transient_failures(1);
        let first = write(&store, &mut |tx| tx.delete_all());
        assert!(matches!(first, Err(StoreError::Transient(_))));
        let second = write(&store, &mut |tx| tx.delete_all());
        assert!(second.is_ok());
    }

    #[test]
    fn test_delete_all() {
        let store = MemoryGraph::new();
        write(&store, &mut |tx| tx.merge_nodes("Space", &[row("space_1", "0")])).unwrap();
        write(&store, &mut |tx| tx.delete_all()).unwrap();
        assert_eq!(store.node_count(), 0);
    }
}
