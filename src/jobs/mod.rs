//! Bounded asynchronous job manager
//!
//! A fixed pool of workers drains a shared queue of enrichment jobs.
//! Submission returns immediately; observers poll job state through
//! the registry. Every terminal transition persists the job's full
//! state to its result file, which outlives eviction from the
//! in-memory table.

pub mod state;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::enrich::EnrichmentRunner;
use crate::error::{PipelineError, Result};

pub use state::{JobState, JobStatus};

/// Queue poll timeout; bounds how long shutdown waits on idle workers.
const QUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Queue capacity; submissions beyond this back-pressure the caller.
const QUEUE_CAPACITY: usize = 256;

/// The shared job table plus its id counter.
struct JobRegistry {
    jobs: Mutex<IndexMap<String, JobState>>,
    counter: AtomicU64,
    results_dir: PathBuf,
}

impl JobRegistry {
    /// Claim a pending job for a worker. Cancelled jobs are skipped;
    /// the worker gets its own working copy.
    fn claim(&self, job_id: &str) -> Option<JobState> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(job_id)?;
        if !job.begin_processing() {
            return None;
        }
        Some(job.clone())
    }

    /// Sync a worker's copy back into the table, if not yet evicted.
    fn sync(&self, job: &JobState) {
        let mut jobs = self.jobs.lock();
        if let Some(slot) = jobs.get_mut(&job.job_id) {
            *slot = job.clone();
        }
    }

    /// Persist a terminal job state to its result file.
    fn persist(&self, job: &JobState) {
        let path = self.result_path(&job.job_id);
        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(&self.results_dir)?;
            let text = serde_json::to_string_pretty(job)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(&path, text)
        };
        match write() {
            Ok(()) => info!(job_id = %job.job_id, path = %path.display(), "job result persisted"),
            Err(e) => error!(job_id = %job.job_id, error = %e, "failed to persist job result"),
        }
    }

    fn result_path(&self, job_id: &str) -> PathBuf {
        self.results_dir.join(format!("{job_id}_result.json"))
    }
}

/// Bounded multi-worker queue for post-ingest enrichment jobs.
pub struct JobManager {
    registry: Arc<JobRegistry>,
    queue: Sender<String>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl JobManager {
    /// Start `max_workers` workers around the given runner.
    pub fn new(max_workers: usize, results_dir: &Path, runner: Arc<EnrichmentRunner>) -> Self {
        let registry = Arc::new(JobRegistry {
            jobs: Mutex::new(IndexMap::new()),
            counter: AtomicU64::new(0),
            results_dir: results_dir.to_path_buf(),
        });
        let (queue, receiver) = bounded::<String>(QUEUE_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers = (0..max_workers.max(1))
            .map(|_| {
                let registry = registry.clone();
                let receiver: Receiver<String> = receiver.clone();
                let runner = runner.clone();
                let shutdown = shutdown.clone();
                std::thread::spawn(move || worker_loop(registry, receiver, runner, shutdown))
            })
            .collect();

        info!(workers = max_workers.max(1), "job manager started");
        JobManager { registry, queue, workers, shutdown }
    }

    /// Enqueue a job. Returns its id immediately.
    pub fn submit(&self, file_path: &Path, options: Value) -> Result<String> {
        let n = self.registry.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let job_id = format!("enrich_{n:06}");
        let job = JobState::new(job_id.clone(), file_path.display().to_string(), options);
        self.registry.jobs.lock().insert(job_id.clone(), job);
        self.queue
            .send(job_id.clone())
            .map_err(|_| PipelineError::JobExecution("job queue is closed".to_string()))?;
        info!(job_id = %job_id, file = %file_path.display(), "enrichment job submitted");
        Ok(job_id)
    }

    /// Observe one job.
    pub fn status(&self, job_id: &str) -> Option<JobState> {
        self.registry.jobs.lock().get(job_id).cloned()
    }

    /// Observe all jobs, in submission order.
    pub fn list(&self) -> Vec<JobState> {
        self.registry.jobs.lock().values().cloned().collect()
    }

    /// Cancel a job. Succeeds only while it is still pending.
    pub fn cancel(&self, job_id: &str) -> bool {
        let mut jobs = self.registry.jobs.lock();
        jobs.get_mut(job_id).map(|j| j.cancel()).unwrap_or(false)
    }

    /// Evict jobs older than `max_age`. Returns the eviction count.
    /// Result files are untouched.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = state::now_secs() - max_age.as_secs_f64();
        let mut jobs = self.registry.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| job.created_at > cutoff);
        let evicted = before - jobs.len();
        if evicted > 0 {
            info!(evicted, "evicted aged jobs");
        }
        evicted
    }

    /// Where a job's durable record lives.
    pub fn result_path(&self, job_id: &str) -> PathBuf {
        self.registry.result_path(job_id)
    }

    /// Stop accepting work and join the workers.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("enrichment worker panicked during shutdown");
            }
        }
    }
}

fn worker_loop(
    registry: Arc<JobRegistry>,
    receiver: Receiver<String>,
    runner: Arc<EnrichmentRunner>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let job_id = match receiver.recv_timeout(QUEUE_POLL_TIMEOUT) {
            Ok(job_id) => job_id,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        // Cancelled (or evicted) between submit and pickup: skip.
        let Some(mut job) = registry.claim(&job_id) else {
            continue;
        };
        registry.sync(&job);
        info!(job_id = %job.job_id, "processing enrichment job");

        let file_path = PathBuf::from(&job.file_path);
        let outcome = runner.run(&file_path, &mut |update| {
            job.update_progress(update.stage, update.progress);
            for (key, value) in update.metrics {
                job.metrics.insert(key, value);
            }
            registry.sync(&job);
        });

        match outcome {
            Ok(result) => {
                let value = serde_json::to_value(&result)
                    .unwrap_or_else(|e| Value::String(format!("unserializable result: {e}")));
                job.complete(value);
            }
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "enrichment job failed");
                job.fail(e.to_string());
            }
        }
        registry.sync(&job);
        registry.persist(&job);
    }
}
