//! Detached job supervision
//!
//! The request path only needs a job id. `JobLauncher` spawns the runner on
//! its own task and watches it from an outer task, so a panic inside the run
//! still leaves the job in a terminal state.

use super::{DesignJob, JobManager, JobRunner};
use sdk::types::JobState;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Clone)]
pub struct JobLauncher {
    runner: JobRunner,
    jobs: Arc<JobManager>,
}

impl JobLauncher {
    pub fn new(runner: JobRunner, jobs: Arc<JobManager>) -> Self {
        Self { runner, jobs }
    }

    /// Start a job in the background and return immediately
    ///
    /// The returned handle resolves once the job has reached a terminal state.
    pub fn launch(&self, job: DesignJob) -> JoinHandle<()> {
        let runner = self.runner.clone();
        let jobs = self.jobs.clone();
        let job_id = job.job_id.clone();

        info!("Launching job {}", job_id);
        tokio::spawn(async move {
            let run = tokio::spawn(async move { runner.run(job).await });

            if let Err(e) = run.await {
                error!("Job {} task aborted: {}", job_id, e);
                let message = format!("Unexpected error: {}", e);
                if let Err(e) = jobs
                    .update(&job_id, JobState::Failed, None, Some(&message))
                    .await
                {
                    error!("Job {} could not be marked failed: {}", job_id, e);
                }
            }
        })
    }
}
