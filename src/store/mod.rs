//! Graph store boundary
//!
//! The pipeline talks to its graph database through these traits. The
//! driver is injected (never a global) so hosts can plug in a bolt
//! driver and tests an in-memory store. Transactions are managed: the
//! work closure must be replayable because a driver may invoke it more
//! than once under its own retry policy.

pub mod cypher;
pub mod memory;
pub mod session;

use serde_json::Value;

use crate::error::PipelineError;

pub use memory::MemoryGraph;
pub use session::{RetryPolicy, SessionManager};

/// Outcome classification from the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Retry with backoff (deadlocks, leader switches, timeouts)
    #[error("transient store error: {0}")]
    Transient(String),
    /// The store cannot be reached; never retried
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Credentials rejected; never retried
    #[error("store authentication failed: {0}")]
    Auth(String),
    /// Anything else; fatal
    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Transient(msg) => PipelineError::TransientWrite(msg),
            StoreError::Unavailable(msg) => PipelineError::Unavailable(msg),
            StoreError::Auth(msg) => PipelineError::Auth(msg),
            StoreError::Other(msg) => PipelineError::FatalWrite(msg),
        }
    }
}

/// Result alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One node row of a bulk merge.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub uid: String,
    pub properties: serde_json::Map<String, Value>,
}

/// One relationship row of a bulk merge.
#[derive(Debug, Clone, PartialEq)]
pub struct RelRow {
    pub start_uid: String,
    pub end_uid: String,
    pub properties: serde_json::Map<String, Value>,
}

/// The `(start_label, type, end_label)` pattern a relationship batch
/// merges under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelPattern {
    pub start_label: String,
    pub rel_type: String,
    pub end_label: String,
}

/// Operations available inside a managed transaction.
pub trait GraphTransaction {
    /// Remove every node and relationship in the database.
    fn delete_all(&mut self) -> StoreResult<()>;

    /// Merge nodes by `uid` under `label`, replacing prior properties.
    fn merge_nodes(&mut self, label: &str, rows: &[NodeRow]) -> StoreResult<()>;

    /// Merge relationships by endpoint uids under a pattern, setting
    /// properties. Rows whose endpoints are missing are no-ops,
    /// matching `MATCH` semantics.
    fn merge_relationships(&mut self, pattern: &RelPattern, rows: &[RelRow]) -> StoreResult<()>;
}

/// A session borrowed from the driver's pool.
pub trait GraphSession {
    /// Run `work` inside a managed write transaction.
    ///
    /// `work` must be replayable: no external side effects keyed on the
    /// attempt number.
    fn execute_write(
        &mut self,
        work: &mut dyn FnMut(&mut dyn GraphTransaction) -> StoreResult<()>,
    ) -> StoreResult<()>;
}

/// A pooled connection to the graph store; the session factory.
pub trait GraphDriver: Send + Sync {
    /// Open a session against the named database.
    fn session(&self, database: &str) -> StoreResult<Box<dyn GraphSession>>;

    /// Whether the store exposes a safe bulk-delete path; when false
    /// the Clear step issues a detach-delete in one transaction.
    fn supports_bulk_delete(&self) -> bool {
        false
    }
}
