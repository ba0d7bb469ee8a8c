//! Job State Manager
//!
//! Authoritative in-memory registry of design jobs. Every mutation goes
//! through one lock and readers get cloned snapshots, so a status query never
//! observes a record mid-update. Lifecycle events are published on the
//! message bus after the lock is released.
//!
//! State machine: `pending -> queued -> running -> {completed | failed | cancelled}`.
//! Terminal states are final.

use crate::message_bus::{Event, MessageBus};
use sdk::errors::EngineError;
use sdk::types::{JobRecord, JobState, ParseJobStateError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub mod runner;
pub mod supervisor;

pub use runner::{DesignJob, JobRunner, RunnerSettings};
pub use supervisor::JobLauncher;

/// Errors from job state operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} is in state '{status}'")]
    InvalidState { job_id: String, status: JobState },

    #[error(transparent)]
    InvalidStatus(#[from] ParseJobStateError),
}

impl From<JobError> for EngineError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(job_id) => EngineError::JobNotFound(job_id),
            JobError::InvalidState { job_id, status } => EngineError::JobInvalidState {
                job_id,
                status: status.to_string(),
            },
            JobError::InvalidStatus(e) => EngineError::InvalidJobStatus(e.0),
        }
    }
}

/// Registry of job records keyed by job id
pub struct JobManager {
    jobs: Mutex<HashMap<String, JobRecord>>,
    bus: Option<Arc<MessageBus>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            bus: None,
        }
    }

    /// Create a manager that publishes lifecycle events
    pub fn with_bus(bus: Arc<MessageBus>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            bus: Some(bus),
        }
    }

    /// Register a new job in `pending` and return its id
    pub async fn create(
        &self,
        input_reference: &str,
        contig_spec: &str,
        params: serde_json::Value,
    ) -> String {
        let job_id = uuid::Uuid::new_v4().simple().to_string();
        let record = JobRecord {
            job_id: job_id.clone(),
            status: JobState::Pending,
            progress: None,
            message: "Job created".to_string(),
            input_reference: input_reference.to_string(),
            contig_spec: contig_spec.to_string(),
            params,
            output_ids: Vec::new(),
            started_at: now(),
            completed_at: None,
        };

        {
            let mut jobs = self.jobs.lock().await;
            jobs.insert(job_id.clone(), record);
        }

        info!("Created job {} (contigs: {})", job_id, contig_spec);
        self.publish(Event::JobCreated {
            job_id: job_id.clone(),
            input_reference: input_reference.to_string(),
            contig_spec: contig_spec.to_string(),
        })
        .await;

        job_id
    }

    /// Move a job to `status`, optionally setting progress and message
    ///
    /// While a job stays `running`, progress never decreases. Entering a
    /// terminal state stamps `completed_at`.
    pub async fn update(
        &self,
        job_id: &str,
        status: JobState,
        progress: Option<f64>,
        message: Option<&str>,
    ) -> Result<JobRecord, JobError> {
        let snapshot = {
            let mut jobs = self.jobs.lock().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

            if job.status.is_terminal() {
                return Err(JobError::InvalidState {
                    job_id: job_id.to_string(),
                    status: job.status,
                });
            }

            if let Some(progress) = progress {
                job.progress = match (job.status, status, job.progress) {
                    (JobState::Running, JobState::Running, Some(old)) => Some(old.max(progress)),
                    _ => Some(progress),
                };
            }
            job.status = status;
            if let Some(message) = message {
                job.message = message.to_string();
            }
            if status.is_terminal() {
                job.completed_at = Some(now());
            }

            job.clone()
        };

        debug!(
            "Job {} -> {} progress={:?}",
            job_id, snapshot.status, snapshot.progress
        );
        self.publish(Event::JobUpdated {
            job_id: job_id.to_string(),
            status: snapshot.status.to_string(),
            progress: snapshot.progress,
            message: snapshot.message.clone(),
        })
        .await;

        Ok(snapshot)
    }

    /// Like [`update`](Self::update) but with the status given as text
    pub async fn update_str(
        &self,
        job_id: &str,
        status: &str,
        progress: Option<f64>,
        message: Option<&str>,
    ) -> Result<JobRecord, JobError> {
        let status: JobState = status.parse()?;
        self.update(job_id, status, progress, message).await
    }

    pub async fn get_status(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let jobs = self.jobs.lock().await;
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Attach output file ids in registration order
    pub async fn set_results(&self, job_id: &str, output_ids: Vec<String>) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        job.output_ids = output_ids;
        Ok(())
    }

    /// Output ids of a completed job
    pub async fn get_results(&self, job_id: &str) -> Result<Vec<String>, JobError> {
        let jobs = self.jobs.lock().await;
        let job = jobs
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        if job.status != JobState::Completed {
            return Err(JobError::InvalidState {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }
        Ok(job.output_ids.clone())
    }

    /// Snapshots of every job, oldest first
    pub async fn list(&self) -> Vec<JobRecord> {
        let jobs = self.jobs.lock().await;
        let mut records: Vec<JobRecord> = jobs.values().cloned().collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        records
    }

    async fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event).await;
        }
    }
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_bus::EventType;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_yields_pending() {
        let manager = JobManager::new();
        let id = manager.create("/in.pdb", "A1-50/0 70-100", json!({})).await;

        let record = manager.get_status(&id).await.unwrap();
        assert_eq!(record.status, JobState::Pending);
        assert_eq!(record.progress, None);
        assert!(record.completed_at.is_none());
        assert_eq!(record.contig_spec, "A1-50/0 70-100");
    }

    #[tokio::test]
    async fn test_lifecycle_and_results() {
        let manager = JobManager::new();
        let id = manager.create("/in.pdb", "A1-10", json!({})).await;

        manager
            .update_str(&id, "running", Some(0.0), None)
            .await
            .unwrap();
        assert!(matches!(
            manager.get_results(&id).await,
            Err(JobError::InvalidState {
                status: JobState::Running,
                ..
            })
        ));

        manager
            .set_results(&id, vec!["f1".to_string(), "f2".to_string()])
            .await
            .unwrap();
        let record = manager
            .update_str(&id, "completed", Some(1.0), Some("done"))
            .await
            .unwrap();

        assert!(record.completed_at.is_some());
        assert_eq!(
            manager.get_results(&id).await.unwrap(),
            vec!["f1".to_string(), "f2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let manager = JobManager::new();
        assert_eq!(
            manager.get_status("nope").await,
            Err(JobError::NotFound("nope".to_string()))
        );
        assert!(matches!(
            manager.update("nope", JobState::Running, None, None).await,
            Err(JobError::NotFound(_))
        ));
        assert!(matches!(
            manager.get_results("nope").await,
            Err(JobError::NotFound(_))
        ));
    }

    #[test]
    fn test_engine_error_conversion() {
        let err: EngineError = JobError::InvalidState {
            job_id: "j1".to_string(),
            status: JobState::Running,
        }
        .into();
        assert_eq!(err.to_string(), "Job j1 is in state 'running'");

        let err: EngineError = JobError::NotFound("j2".to_string()).into();
        assert!(matches!(err, EngineError::JobNotFound(id) if id == "j2"));
    }

    #[tokio::test]
    async fn test_invalid_status_string() {
        let manager = JobManager::new();
        let id = manager.create("/in.pdb", "A1-10", json!({})).await;
        assert!(matches!(
            manager.update_str(&id, "exploded", None, None).await,
            Err(JobError::InvalidStatus(_))
        ));
        assert_eq!(
            manager.get_status(&id).await.unwrap().status,
            JobState::Pending
        );
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let manager = JobManager::new();
        let id = manager.create("/in.pdb", "A1-10", json!({})).await;
        manager
            .update(&id, JobState::Failed, None, Some("boom"))
            .await
            .unwrap();

        let err = manager
            .update(&id, JobState::Running, Some(0.5), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            JobError::InvalidState {
                job_id: id.clone(),
                status: JobState::Failed
            }
        );
        assert_eq!(manager.get_status(&id).await.unwrap().message, "boom");
    }

    #[tokio::test]
    async fn test_running_progress_is_monotonic() {
        let manager = JobManager::new();
        let id = manager.create("/in.pdb", "A1-10", json!({})).await;

        manager
            .update(&id, JobState::Running, Some(0.6), None)
            .await
            .unwrap();
        let record = manager
            .update(&id, JobState::Running, Some(0.2), None)
            .await
            .unwrap();
        assert_eq!(record.progress, Some(0.6));

        let record = manager
            .update(&id, JobState::Running, None, Some("still going"))
            .await
            .unwrap();
        assert_eq!(record.progress, Some(0.6));
        assert_eq!(record.message, "still going");
    }

    #[tokio::test]
    async fn test_publishes_lifecycle_events() {
        let bus = Arc::new(MessageBus::new());
        let mut rx = bus.subscribe(EventType::All).await;
        let manager = JobManager::with_bus(bus);

        let id = manager.create("/in.pdb", "A1-10", json!({})).await;
        manager
            .update(&id, JobState::Queued, None, Some("Queued"))
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(Event::JobCreated { .. })));
        match rx.recv().await {
            Some(Event::JobUpdated { job_id, status, .. }) => {
                assert_eq!(job_id, id);
                assert_eq!(status, "queued");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_updates_and_reads() {
        let manager = Arc::new(JobManager::new());
        let id = manager.create("/in.pdb", "A1-10", json!({})).await;

        let writer = {
            let manager = manager.clone();
            let id = id.clone();
            tokio::spawn(async move {
                for step in 0..=100 {
                    manager
                        .update(&id, JobState::Running, Some(step as f64 / 100.0), None)
                        .await
                        .unwrap();
                }
            })
        };

        let mut last = 0.0;
        for _ in 0..50 {
            let record = manager.get_status(&id).await.unwrap();
            let progress = record.progress.unwrap_or(0.0);
            assert!(progress >= last);
            last = progress;
            tokio::task::yield_now().await;
        }

        writer.await.unwrap();
        assert_eq!(manager.get_status(&id).await.unwrap().progress, Some(1.0));
    }
}
