//! Job Runner
//!
//! Drives one run of the external design program. The process is launched
//! with a discrete argument vector (never a shell), its output is read line
//! by line for progress markers, and the whole read-and-wait phase is bounded
//! by a timeout after which the process is killed and reaped.
//!
//! Every run ends in exactly one terminal transition on the [`JobManager`].

use super::{JobError, JobManager};
use crate::config::JobsConfig;
use crate::files::{FileError, FileRegistry};
use regex::Regex;
use sdk::types::JobState;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// Lines of output kept for failure diagnostics
const TAIL_LINES: usize = 10;

/// Errors that end a run in `failed`
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Error reading process output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Timed out after {0}s waiting for the process to exit")]
    ExitTimeout(u64),

    #[error("Design program exited with {status}.\n{tail}")]
    Exit { status: ExitStatus, tail: String },

    #[error("No design files named {0}_*.pdb were produced")]
    NoArtifacts(String),

    #[error("Could not register output: {0}")]
    File(#[from] FileError),

    #[error(transparent)]
    Job(#[from] JobError),
}

/// Process-level settings shared by every run
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub program: PathBuf,
    pub base_args: Vec<String>,
    pub working_dir: PathBuf,
    pub model_dir: PathBuf,
    pub timeout: Duration,
    pub exit_grace: Duration,
    pub artifact_prefix: String,
}

impl RunnerSettings {
    pub fn from_config(config: &JobsConfig) -> Self {
        Self {
            program: config.program.clone(),
            base_args: config.base_args.clone(),
            working_dir: config.working_dir.clone(),
            model_dir: config.model_dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            exit_grace: Duration::from_secs(config.exit_grace_secs),
            artifact_prefix: config.artifact_prefix.clone(),
        }
    }
}

/// Parameters of one design run
#[derive(Debug, Clone)]
pub struct DesignJob {
    pub job_id: String,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub contig_spec: String,
    pub num_designs: u32,
    pub diffusion_steps: u32,
    pub hotspots: Option<Vec<String>>,
}

fn progress_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)(\w+)\s+(\d+)\s*/\s*(\d+)").ok())
        .as_ref()
}

/// Parse a progress marker such as `Timestep 25/50`
///
/// Returns `(current, total, fraction)` with the fraction rounded to three
/// decimals and capped at 1.0.
pub fn parse_progress(line: &str) -> Option<(u64, u64, f64)> {
    let caps = progress_pattern()?.captures(line)?;
    let current: u64 = caps.get(2)?.as_str().parse().ok()?;
    let total: u64 = caps.get(3)?.as_str().parse().ok()?;
    if total == 0 {
        return None;
    }
    let fraction = (current as f64 / total as f64 * 1000.0).round() / 1000.0;
    Some((current, total, fraction.min(1.0)))
}

/// Runs design jobs and reports their lifecycle to the job manager
#[derive(Clone)]
pub struct JobRunner {
    settings: Arc<RunnerSettings>,
    jobs: Arc<JobManager>,
    files: Arc<dyn FileRegistry>,
}

impl JobRunner {
    pub fn new(
        settings: RunnerSettings,
        jobs: Arc<JobManager>,
        files: Arc<dyn FileRegistry>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            jobs,
            files,
        }
    }

    /// Argument vector passed to the design program
    pub fn build_args(&self, job: &DesignJob) -> Vec<String> {
        let prefix = job.output_dir.join(&self.settings.artifact_prefix);
        let mut args = self.settings.base_args.clone();
        args.extend([
            format!("inference.output_prefix={}", prefix.display()),
            format!("inference.input_pdb={}", job.input_path.display()),
            format!("contigmap.contigs=[{}]", job.contig_spec),
            format!("inference.num_designs={}", job.num_designs),
            format!("diffuser.T={}", job.diffusion_steps),
            format!(
                "inference.model_directory_path={}",
                self.settings.model_dir.display()
            ),
        ]);
        if let Some(hotspots) = job.hotspots.as_ref().filter(|h| !h.is_empty()) {
            args.push(format!("ppi.hotspot_res=[{}]", hotspots.join(",")));
        }
        args
    }

    /// Run a job to a terminal state. Never returns an error; failures are
    /// recorded on the job.
    pub async fn run(&self, job: DesignJob) {
        let job_id = job.job_id.clone();

        if let Err(e) = self
            .jobs
            .update(&job_id, JobState::Running, Some(0.0), Some("Design run started"))
            .await
        {
            warn!("Job {} cannot start: {}", job_id, e);
            return;
        }

        let outcome = self.execute(&job).await;
        self.finish(&job_id, outcome).await;
    }

    /// Record the single terminal transition for a run
    async fn finish(&self, job_id: &str, outcome: Result<Vec<String>, RunnerError>) {
        let result = match outcome {
            Ok(output_ids) => {
                let count = output_ids.len();
                info!("Job {} completed with {} design(s)", job_id, count);
                match self.jobs.set_results(job_id, output_ids).await {
                    Ok(()) => {
                        self.jobs
                            .update(
                                job_id,
                                JobState::Completed,
                                Some(1.0),
                                Some(&format!("Completed: {} design(s) generated", count)),
                            )
                            .await
                    }
                    Err(e) => {
                        self.jobs
                            .update(job_id, JobState::Failed, None, Some(&e.to_string()))
                            .await
                    }
                }
            }
            Err(e) => {
                error!("Job {} failed: {}", job_id, e);
                self.jobs
                    .update(job_id, JobState::Failed, None, Some(&e.to_string()))
                    .await
            }
        };

        if let Err(e) = result {
            warn!("Job {} could not record its final state: {}", job_id, e);
        }
    }

    async fn execute(&self, job: &DesignJob) -> Result<Vec<String>, RunnerError> {
        tokio::fs::create_dir_all(&job.output_dir).await?;

        let args = self.build_args(job);
        debug!("Launching {} {:?}", self.settings.program.display(), args);

        let mut command = Command::new(&self.settings.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.settings.working_dir.is_dir() {
            command.current_dir(&self.settings.working_dir);
        }

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: self.settings.program.display().to_string(),
            source,
        })?;

        let mut tail = VecDeque::with_capacity(TAIL_LINES);
        let watched = tokio::time::timeout(
            self.settings.timeout,
            self.watch(job, &mut child, &mut tail),
        )
        .await;

        let status = match watched {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                kill_and_reap(&mut child, &job.job_id).await;
                return Err(e);
            }
            Err(_) => {
                kill_and_reap(&mut child, &job.job_id).await;
                return Err(RunnerError::Timeout(self.settings.timeout.as_secs()));
            }
        };

        if !status.success() {
            let tail: Vec<String> = tail.into_iter().collect();
            return Err(RunnerError::Exit {
                status,
                tail: tail.join("\n"),
            });
        }

        let artifacts = find_artifacts(&job.output_dir, &self.settings.artifact_prefix).await?;
        if artifacts.is_empty() {
            return Err(RunnerError::NoArtifacts(
                self.settings.artifact_prefix.clone(),
            ));
        }

        let mut output_ids = Vec::with_capacity(artifacts.len());
        for path in artifacts {
            let display_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            output_ids.push(self.files.register(&path, &display_name)?);
        }
        Ok(output_ids)
    }

    /// Read both output streams to the end, then wait for exit
    async fn watch(
        &self,
        job: &DesignJob,
        child: &mut Child,
        tail: &mut VecDeque<String>,
    ) -> Result<ExitStatus, RunnerError> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            let (from_stdout, line) = tokio::select! {
                line = out_lines.next_line(), if out_open => (true, line?),
                line = err_lines.next_line(), if err_open => (false, line?),
            };

            let Some(line) = line else {
                if from_stdout {
                    out_open = false;
                } else {
                    err_open = false;
                }
                continue;
            };

            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.clone());

            if let Some((current, total, fraction)) = parse_progress(&line) {
                self.jobs
                    .update(
                        &job.job_id,
                        JobState::Running,
                        Some(fraction),
                        Some(&format!("Timestep {}/{}", current, total)),
                    )
                    .await?;
            }
        }

        match tokio::time::timeout(self.settings.exit_grace, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => Err(RunnerError::ExitTimeout(self.settings.exit_grace.as_secs())),
        }
    }
}

async fn kill_and_reap(child: &mut Child, job_id: &str) {
    // kill() also waits, so the process is reaped
    if let Err(e) = child.kill().await {
        warn!("Job {}: failed to kill design process: {}", job_id, e);
    }
}

/// Result artifacts `<prefix>_*.pdb` in `dir`, sorted by name
pub async fn find_artifacts(dir: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
    let wanted = format!("{}_", prefix);
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&wanted)
            && name.ends_with(".pdb")
            && entry.file_type().await?.is_file()
        {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}
