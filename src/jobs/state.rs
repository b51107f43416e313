//! Job states
//!
//! The observable record of one enrichment job. Transitions follow a
//! strict machine: `PENDING → PROCESSING → {COMPLETED | FAILED}` plus
//! `PENDING → CANCELLED`; once terminal, nothing changes except
//! eviction from the registry.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Seconds since the epoch, as the job clock.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Full observable state of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    pub file_path: String,
    pub status: JobStatus,
    /// Monotonically non-decreasing within a run, 1.0 only at completion
    pub progress: f64,
    pub current_stage: String,
    pub options: Value,
    pub created_at: f64,
    pub started_at: Option<f64>,
    pub completed_at: Option<f64>,
    pub processing_time: Option<f64>,
    pub metrics: serde_json::Map<String, Value>,
    pub error: Option<String>,
    /// Present only for completed jobs
    pub result: Option<Value>,
}

impl JobState {
    pub fn new(job_id: String, file_path: String, options: Value) -> Self {
        JobState {
            job_id,
            file_path,
            status: JobStatus::Pending,
            progress: 0.0,
            current_stage: "queued".to_string(),
            options,
            created_at: now_secs(),
            started_at: None,
            completed_at: None,
            processing_time: None,
            metrics: serde_json::Map::new(),
            error: None,
            result: None,
        }
    }

    /// `PENDING → PROCESSING`. False from any other state.
    pub fn begin_processing(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Processing;
        self.started_at = Some(now_secs());
        self.current_stage = "starting".to_string();
        true
    }

    /// `PENDING → CANCELLED`. False once a worker owns the job.
    pub fn cancel(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now_secs());
        self.current_stage = "cancelled".to_string();
        true
    }

    /// Live progress update; ignored outside `PROCESSING`.
    ///
    /// Caps below 1.0: full progress is reserved for the completed
    /// transition, so observers never see `1.0` on a running job.
    pub fn update_progress(&mut self, stage: &str, progress: f64) {
        if self.status != JobStatus::Processing {
            return;
        }
        self.current_stage = stage.to_string();
        // Progress never moves backwards.
        if progress > self.progress {
            self.progress = progress.min(0.99);
        }
    }

    /// `PROCESSING → COMPLETED`.
    pub fn complete(&mut self, result: Value) {
        if self.status != JobStatus::Processing {
            return;
        }
        self.status = JobStatus::Completed;
        self.progress = 1.0;
        self.current_stage = "completed".to_string();
        self.result = Some(result);
        self.finish();
    }

    /// `PROCESSING → FAILED`.
    pub fn fail(&mut self, error: String) {
        if self.status != JobStatus::Processing {
            return;
        }
        self.status = JobStatus::Failed;
        self.current_stage = format!("failed: {error}");
        self.error = Some(error);
        self.finish();
    }

    fn finish(&mut self) {
        let completed = now_secs();
        self.completed_at = Some(completed);
        if let Some(started) = self.started_at {
            self.processing_time = Some(completed - started);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> JobState {
        JobState::new("enrich_000001".to_string(), "plan.dxf".to_string(), json!({}))
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut j = job();
        assert_eq!(j.status, JobStatus::Pending);
        assert!(j.begin_processing());
        j.update_progress("extract", 0.1);
        j.update_progress("render_ocr", 0.5);
        j.complete(json!({"ok": true}));
        assert_eq!(j.status, JobStatus::Completed);
        assert_eq!(j.progress, 1.0);
        assert!(j.processing_time.is_some());
    }

    #[test]
    fn test_cancel_only_while_pending() {
        let mut j = job();
        assert!(j.cancel());
        assert_eq!(j.status, JobStatus::Cancelled);

        let mut j = job();
        j.begin_processing();
        assert!(!j.cancel());
        assert_eq!(j.status, JobStatus::Processing);
    }

    #[test]
    fn test_terminal_states_frozen() {
        let mut j = job();
        j.begin_processing();
        j.fail("render exploded".to_string());
        assert_eq!(j.status, JobStatus::Failed);

        // No transition out of a terminal state.
        assert!(!j.begin_processing());
        assert!(!j.cancel());
        j.complete(json!({}));
        assert_eq!(j.status, JobStatus::Failed);
        assert!(j.result.is_none());
    }

    #[test]
    fn test_progress_monotonic() {
        let mut j = job();
        j.begin_processing();
        j.update_progress("extract", 0.3);
        j.update_progress("extract", 0.2);
        assert_eq!(j.progress, 0.3);
    }

    #[test]
    fn test_double_begin_rejected() {
        let mut j = job();
        assert!(j.begin_processing());
        assert!(!j.begin_processing());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut j = job();
        j.begin_processing();
        j.complete(json!({"summary": {"validations": 2}}));
        let text = serde_json::to_string(&j).unwrap();
        let back: JobState = serde_json::from_str(&text).unwrap();
        assert_eq!(back.status, JobStatus::Completed);
        assert_eq!(back.result.unwrap()["summary"]["validations"], json!(2));
        assert!(text.contains("\"completed\""));
    }
}
