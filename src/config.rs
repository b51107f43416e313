//! Pipeline configuration
//!
//! All knobs the pipeline recognizes, with defaults matching the
//! documented configuration surface. `PipelineConfig::from_env` reads
//! the same variable names the deployment environment sets; anything
//! unset or unparsable keeps its default.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Chunk size used once an artifact crosses [`LARGE_ENTITY_THRESHOLD`].
pub const LARGE_STREAM_CHUNK_SIZE: usize = 2000;

/// Entity count above which the smaller streaming chunk size applies.
pub const LARGE_ENTITY_THRESHOLD: usize = 20_000;

/// Configuration for a pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Job Manager worker count. `MAX_WORKERS`
    pub max_workers: usize,
    /// Submit an enrichment job after each ingest. `ASYNC_ENRICHMENT_ENABLED`
    pub async_enrichment_enabled: bool,
    /// Entity count above which the streaming path is taken. `STREAMING_ENTITY_THRESHOLD`
    pub streaming_entity_threshold: usize,
    /// Streaming chunk size for mid-size artifacts. `STREAMING_CHUNK_SIZE`
    pub streaming_chunk_size: usize,
    /// Wall-clock guard on the streaming transformation. `STREAMING_TIMEOUT_S`
    pub streaming_timeout: Duration,
    /// Retries per batch before promotion to a fatal error. `BATCH_RETRY_MAX`
    pub batch_retry_max: u32,
    /// Memory pressure thresholds, percent of total. `MEMORY_HIGH_PCT` / `MEMORY_CRITICAL_PCT`
    pub memory_high_pct: u8,
    pub memory_critical_pct: u8,
    /// Connection pool tuning. `CONNECTION_LIFETIME_S` / `CONNECTION_POOL_SIZE` /
    /// `CONNECTION_ACQUIRE_TIMEOUT_S`
    pub connection_lifetime: Duration,
    pub connection_pool_size: usize,
    pub connection_acquire_timeout: Duration,
    /// Graph store endpoint. `GRAPH_URI` / `GRAPH_USER` / `GRAPH_PASSWORD` / `GRAPH_DATABASE`
    pub graph_uri: String,
    pub graph_user: String,
    pub graph_password: String,
    pub graph_database: String,
    /// Staging directory for uploads. `UPLOAD_STAGING_DIR`
    pub staging_dir: PathBuf,
    /// Directory for per-job result files. `JOB_RESULTS_DIR`
    pub results_dir: PathBuf,
    /// Upload size cap in bytes. `MAX_UPLOAD_MB`
    pub max_upload_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_workers: 2,
            async_enrichment_enabled: false,
            streaming_entity_threshold: 5000,
            streaming_chunk_size: 3000,
            streaming_timeout: Duration::from_secs(120),
            batch_retry_max: 3,
            memory_high_pct: 75,
            memory_critical_pct: 85,
            connection_lifetime: Duration::from_secs(1800),
            connection_pool_size: 100,
            connection_acquire_timeout: Duration::from_secs(60),
            graph_uri: "bolt://localhost:7687".to_string(),
            graph_user: "neo4j".to_string(),
            graph_password: "neo4j".to_string(),
            graph_database: "neo4j".to_string(),
            staging_dir: PathBuf::from("uploads"),
            results_dir: PathBuf::from("job_results"),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl PipelineConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            max_workers: env_parse("MAX_WORKERS", defaults.max_workers),
            async_enrichment_enabled: env_bool(
                "ASYNC_ENRICHMENT_ENABLED",
                defaults.async_enrichment_enabled,
            ),
            streaming_entity_threshold: env_parse(
                "STREAMING_ENTITY_THRESHOLD",
                defaults.streaming_entity_threshold,
            ),
            streaming_chunk_size: env_parse("STREAMING_CHUNK_SIZE", defaults.streaming_chunk_size),
            streaming_timeout: Duration::from_secs(env_parse(
                "STREAMING_TIMEOUT_S",
                defaults.streaming_timeout.as_secs(),
            )),
            batch_retry_max: env_parse("BATCH_RETRY_MAX", defaults.batch_retry_max),
            memory_high_pct: env_parse("MEMORY_HIGH_PCT", defaults.memory_high_pct),
            memory_critical_pct: env_parse("MEMORY_CRITICAL_PCT", defaults.memory_critical_pct),
            connection_lifetime: Duration::from_secs(env_parse(
                "CONNECTION_LIFETIME_S",
                defaults.connection_lifetime.as_secs(),
            )),
            connection_pool_size: env_parse("CONNECTION_POOL_SIZE", defaults.connection_pool_size),
            connection_acquire_timeout: Duration::from_secs(env_parse(
                "CONNECTION_ACQUIRE_TIMEOUT_S",
                defaults.connection_acquire_timeout.as_secs(),
            )),
            graph_uri: env_string("GRAPH_URI", &defaults.graph_uri),
            graph_user: env_string("GRAPH_USER", &defaults.graph_user),
            graph_password: env_string("GRAPH_PASSWORD", &defaults.graph_password),
            graph_database: env_string("GRAPH_DATABASE", &defaults.graph_database),
            staging_dir: PathBuf::from(env_string(
                "UPLOAD_STAGING_DIR",
                &defaults.staging_dir.to_string_lossy(),
            )),
            results_dir: PathBuf::from(env_string(
                "JOB_RESULTS_DIR",
                &defaults.results_dir.to_string_lossy(),
            )),
            max_upload_bytes: env_parse("MAX_UPLOAD_MB", 50u64) * 1024 * 1024,
        }
    }

    /// Streaming chunk size for a given entity count.
    ///
    /// Artifacts above [`LARGE_ENTITY_THRESHOLD`] use the smaller
    /// [`LARGE_STREAM_CHUNK_SIZE`] for tighter memory control.
    pub fn chunk_size_for(&self, entity_count: usize) -> usize {
        if entity_count > LARGE_ENTITY_THRESHOLD {
            LARGE_STREAM_CHUNK_SIZE
        } else {
            self.streaming_chunk_size
        }
    }

    /// Whether the streaming transformation applies to an entity count.
    pub fn use_streaming(&self, entity_count: usize) -> bool {
        entity_count > self.streaming_entity_threshold
    }

    /// The identity of the graph endpoint; drivers are reused while this
    /// is unchanged.
    pub fn store_identity(&self) -> (String, String, String) {
        (
            self.graph_uri.clone(),
            self.graph_user.clone(),
            self.graph_database.clone(),
        )
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_surface() {
        let c = PipelineConfig::default();
        assert_eq!(c.max_workers, 2);
        assert!(!c.async_enrichment_enabled);
        assert_eq!(c.streaming_entity_threshold, 5000);
        assert_eq!(c.streaming_chunk_size, 3000);
        assert_eq!(c.streaming_timeout, Duration::from_secs(120));
        assert_eq!(c.batch_retry_max, 3);
        assert_eq!(c.memory_high_pct, 75);
        assert_eq!(c.memory_critical_pct, 85);
        assert_eq!(c.connection_pool_size, 100);
        assert_eq!(c.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_chunk_size_shrinks_for_large_artifacts() {
        let c = PipelineConfig::default();
        assert_eq!(c.chunk_size_for(6000), 3000);
        assert_eq!(c.chunk_size_for(20_000), 3000);
        assert_eq!(c.chunk_size_for(20_001), 2000);
    }

    #[test]
    fn test_streaming_threshold_is_exclusive() {
        let c = PipelineConfig::default();
        assert!(!c.use_streaming(5000));
        assert!(c.use_streaming(5001));
    }

    #[test]
    fn test_env_bool_default_when_unset() {
        assert!(env_bool("CADGRAPH_TEST_UNSET_FLAG", true));
        assert!(!env_bool("CADGRAPH_TEST_UNSET_FLAG", false));
    }
}
