//! Session management and retry-aware execution
//!
//! Owns the injected driver and wraps every write in the retry policy:
//! transient errors back off exponentially with jitter, authentication
//! and availability errors surface immediately, and a transient error
//! that outlives the retry budget is promoted to a fatal write error.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{GraphDriver, GraphTransaction, StoreResult};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Backoff policy for transient write errors.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Unit delay; attempt `n` waits `base_delay × (2ⁿ + U(0,1))`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry attempt `n` (0-based), jittered.
    fn delay(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::random();
        self.base_delay.mul_f64(2f64.powi(attempt as i32) + jitter)
    }
}

/// Pool tuning handed to driver constructors.
///
/// The in-memory store ignores these; a bolt driver applies them when
/// the pool is built.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolOptions {
    pub max_lifetime: Duration,
    pub max_size: usize,
    pub acquire_timeout: Duration,
}

impl From<&PipelineConfig> for PoolOptions {
    fn from(config: &PipelineConfig) -> Self {
        PoolOptions {
            max_lifetime: config.connection_lifetime,
            max_size: config.connection_pool_size,
            acquire_timeout: config.connection_acquire_timeout,
        }
    }
}

/// Owns a pooled driver and yields retry-aware write execution.
///
/// Shared across ingests; callers must not tear it down between them.
/// Recreate only when the store identity in the configuration changes.
#[derive(Clone)]
pub struct SessionManager {
    driver: Arc<dyn GraphDriver>,
    database: String,
    policy: RetryPolicy,
    identity: (String, String, String),
}

impl SessionManager {
    pub fn new(driver: Arc<dyn GraphDriver>, config: &PipelineConfig) -> Self {
        SessionManager {
            driver,
            database: config.graph_database.clone(),
            policy: RetryPolicy {
                max_retries: config.batch_retry_max,
                ..RetryPolicy::default()
            },
            identity: config.store_identity(),
        }
    }

    /// Override the backoff unit (tests shrink it).
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.policy.base_delay = base_delay;
        self
    }

    pub fn driver(&self) -> &Arc<dyn GraphDriver> {
        &self.driver
    }

    /// Whether this manager already serves the endpoint a configuration
    /// names; reuse it instead of building a new driver when true.
    pub fn serves(&self, config: &PipelineConfig) -> bool {
        self.identity == config.store_identity()
    }

    pub fn supports_bulk_delete(&self) -> bool {
        self.driver.supports_bulk_delete()
    }

    /// Run a replayable write under the retry policy.
    pub fn execute_with_retry(
        &self,
        description: &str,
        work: &mut dyn FnMut(&mut dyn GraphTransaction) -> StoreResult<()>,
    ) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = self
                .driver
                .session(&self.database)
                .and_then(|mut session| session.execute_write(work));
            match outcome {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(description, attempt, "write succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    if attempt >= self.policy.max_retries {
                        return Err(PipelineError::FatalWrite(format!(
                            "{description}: still failing after {} retries: {e}",
                            self.policy.max_retries
                        )));
                    }
                    let delay = self.policy.delay(attempt);
                    warn!(
                        description,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient write error; backing off"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    warn!(description, error = %e, "fatal store error");
                    return Err(e.into());
                }
            }
        }
    }
}
