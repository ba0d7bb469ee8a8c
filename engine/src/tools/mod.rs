//! Tool Dispatcher
//!
//! Executes tool calls requested by the model. `dispatch` never fails: every
//! handler error, including input validation, comes back as a serialized
//! `{"error": "..."}` payload so the model can see it and adapt.

pub mod definitions;
pub mod rcsb;
pub mod structure;

pub use rcsb::{FetchError, RcsbClient};

use crate::files::FileRegistry;
use crate::jobs::{DesignJob, JobError, JobLauncher, JobManager};
use crate::llm::ToolDefinition;
use crate::message_bus::{Event, MessageBus};
use async_trait::async_trait;
use definitions::{
    CHECK_JOB_STATUS, COLOR_SCHEMES, FETCH_STRUCTURE, GET_JOB_RESULTS, GET_STRUCTURE_INFO,
    SUBMIT_DESIGN_JOB, VISUALIZATION_STYLES, VISUALIZE_STRUCTURE,
};
use sdk::types::{JobState, ToolError, ToolInput};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Instruction attached to a job submission result
const NO_POLL_INSTRUCTION: &str = "DO NOT call check_job_status to poll. Tell the user the job \
     has been submitted and they can ask for a status update later.";

const MAX_DESIGNS: i64 = 10;
const MAX_DIFFUSION_STEPS: i64 = 500;

/// Per-call context from the conversation that issued the tool call
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub conversation_id: String,
}

impl ToolContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
        }
    }
}

/// What the orchestrator needs from a tool set
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Definitions advertised to the model
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute one call; failures come back as an `{"error": ...}` payload
    async fn dispatch(&self, name: &str, input: &Value, ctx: &ToolContext) -> String;
}

/// Registry of the tools available to the agent
pub struct ToolRegistry {
    files: Arc<dyn FileRegistry>,
    jobs: Arc<JobManager>,
    launcher: JobLauncher,
    rcsb: RcsbClient,
    upload_dir: PathBuf,
    output_dir: PathBuf,
    bus: Option<Arc<MessageBus>>,
}

fn failed(e: impl std::fmt::Display) -> ToolError {
    ToolError::Failed(e.to_string())
}

fn job_error(e: JobError) -> ToolError {
    match e {
        JobError::NotFound(id) => ToolError::Failed(format!("Job '{}' not found.", id)),
        JobError::InvalidState { job_id, status } => ToolError::Failed(format!(
            "Job '{}' is not completed (status: {}).",
            job_id, status
        )),
        other => failed(other),
    }
}

impl ToolRegistry {
    pub fn new(
        files: Arc<dyn FileRegistry>,
        jobs: Arc<JobManager>,
        launcher: JobLauncher,
        rcsb: RcsbClient,
        upload_dir: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            files,
            jobs,
            launcher,
            rcsb,
            upload_dir,
            output_dir,
            bus: None,
        }
    }

    /// Publish `ToolCalled` events on the bus
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Definitions advertised to the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        definitions::all()
    }

    /// Dispatch a tool call by name and return the serialized result
    pub async fn dispatch(&self, name: &str, input: &Value, ctx: &ToolContext) -> String {
        debug!(
            "[{}] Dispatching tool '{}' with args: {}",
            ctx.conversation_id, name, input
        );

        if let Some(bus) = &self.bus {
            bus.publish(Event::ToolCalled {
                tool: name.to_string(),
                args: input.clone(),
            })
            .await;
        }

        let result = match ToolInput::from_value(name, input) {
            Ok(input) => self.execute(name, &input).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => value.to_string(),
            Err(e) => {
                warn!("Tool '{}' failed: {}", name, e);
                json!({ "error": e.to_string() }).to_string()
            }
        }
    }

    async fn execute(&self, name: &str, input: &ToolInput) -> Result<Value, ToolError> {
        match name {
            FETCH_STRUCTURE => self.fetch_structure(input).await,
            GET_STRUCTURE_INFO => self.get_structure_info(input).await,
            SUBMIT_DESIGN_JOB => self.submit_design_job(input).await,
            CHECK_JOB_STATUS => self.check_job_status(input).await,
            GET_JOB_RESULTS => self.get_job_results(input).await,
            VISUALIZE_STRUCTURE => self.visualize_structure(input).await,
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn fetch_structure(&self, input: &ToolInput) -> Result<Value, ToolError> {
        let raw_id = input.param_str("pdb_id")?;
        let fetched = self.rcsb.fetch(&raw_id).await.map_err(failed)?;

        let filename = format!("{}.pdb", fetched.pdb_id);
        let save_path = self
            .upload_dir
            .join(format!("{}_{}", uuid::Uuid::new_v4().simple(), filename));
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(failed)?;
        tokio::fs::write(&save_path, &fetched.contents)
            .await
            .map_err(failed)?;

        let file_id = self.files.register(&save_path, &filename).map_err(failed)?;
        let size = fetched.contents.len();

        Ok(json!({
            "status": "success",
            "file_id": file_id,
            "pdb_id": fetched.pdb_id,
            "filename": filename,
            "file_size_bytes": size,
            "sha256": fetched.sha256,
            "message": format!("PDB '{}' fetched from RCSB ({} bytes).", fetched.pdb_id, size),
        }))
    }

    async fn get_structure_info(&self, input: &ToolInput) -> Result<Value, ToolError> {
        let file_id = input.param_str("file_id")?;
        let path = self.files.resolve(&file_id).map_err(failed)?;
        let info = self.files.info(&file_id).map_err(failed)?;

        let bytes = tokio::fs::read(&path).await.map_err(failed)?;
        let summary = structure::analyze(&String::from_utf8_lossy(&bytes));

        let mut details = serde_json::to_value(&summary).map_err(failed)?;
        if let Value::Object(map) = &mut details {
            map.insert("filename".to_string(), json!(info.display_name));
            map.insert("size_bytes".to_string(), json!(info.size_bytes));
        }

        Ok(json!({
            "file_id": file_id,
            "summary": summary.describe(&info.display_name),
            "details": details,
        }))
    }

    async fn submit_design_job(&self, input: &ToolInput) -> Result<Value, ToolError> {
        let input_file_id = input.param_str("input_file_id")?;
        let contig_spec = input.param_str("contig_spec")?;
        if contig_spec.trim().is_empty() {
            return Err(ToolError::InvalidParameter(
                "contig_spec must not be empty".to_string(),
            ));
        }

        let num_designs = input.param_i64_opt("num_designs")?.unwrap_or(1);
        if !(1..=MAX_DESIGNS).contains(&num_designs) {
            return Err(ToolError::InvalidParameter(format!(
                "num_designs must be between 1 and {}",
                MAX_DESIGNS
            )));
        }
        let diffusion_steps = input.param_i64_opt("diffusion_steps")?.unwrap_or(50);
        if !(1..=MAX_DIFFUSION_STEPS).contains(&diffusion_steps) {
            return Err(ToolError::InvalidParameter(format!(
                "diffusion_steps must be between 1 and {}",
                MAX_DIFFUSION_STEPS
            )));
        }
        let hotspots = input.param_str_list_opt("hotspots")?;

        let input_path = self.files.resolve(&input_file_id).map_err(failed)?;

        let params = json!({
            "num_designs": num_designs,
            "diffusion_steps": diffusion_steps,
            "hotspots": hotspots,
        });
        let job_id = self.jobs.create(&input_file_id, &contig_spec, params).await;

        let output_dir = self.output_dir.join(&job_id);
        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            let message = format!("Could not create output directory: {}", e);
            // The job exists already, so it must not stay pending
            if let Err(e) = self
                .jobs
                .update(&job_id, JobState::Failed, None, Some(&message))
                .await
            {
                warn!("Job {} could not be marked failed: {}", job_id, e);
            }
            return Err(ToolError::Failed(message));
        }

        self.jobs
            .update(&job_id, JobState::Queued, None, Some("Queued"))
            .await
            .map_err(job_error)?;

        // Values were range-checked above
        self.launcher.launch(DesignJob {
            job_id: job_id.clone(),
            input_path,
            output_dir,
            contig_spec: contig_spec.clone(),
            num_designs: num_designs as u32,
            diffusion_steps: diffusion_steps as u32,
            hotspots,
        });

        Ok(json!({
            "status": "queued",
            "job_id": job_id,
            "num_designs": num_designs,
            "diffusion_steps": diffusion_steps,
            "contig_spec": contig_spec,
            "message": format!(
                "Design job submitted. Generating {} design(s) with {} timesteps. Job ID: '{}'.",
                num_designs, diffusion_steps, job_id
            ),
            "IMPORTANT_INSTRUCTION": NO_POLL_INSTRUCTION,
        }))
    }

    async fn check_job_status(&self, input: &ToolInput) -> Result<Value, ToolError> {
        let job_id = input.param_str("job_id")?;
        let record = self.jobs.get_status(&job_id).await.map_err(job_error)?;

        let message = match record.status {
            JobState::Completed => {
                "Job completed! Use get_job_results to retrieve designs.".to_string()
            }
            JobState::Running => match record.progress {
                Some(p) => format!("Running. Progress: {:.0}%.", p * 100.0),
                None => "Running.".to_string(),
            },
            JobState::Failed => format!("Failed: {}", record.message),
            other => format!("Status: {}", other),
        };

        let mut result = json!({
            "job_id": job_id,
            "status": record.status,
            "message": message,
        });
        if let Some(progress) = record.progress {
            result["progress"] = json!(progress);
        }
        Ok(result)
    }

    async fn get_job_results(&self, input: &ToolInput) -> Result<Value, ToolError> {
        let job_id = input.param_str("job_id")?;
        let output_ids = self.jobs.get_results(&job_id).await.map_err(job_error)?;

        let mut files = Vec::with_capacity(output_ids.len());
        for file_id in &output_ids {
            let info = self.files.info(file_id).map_err(failed)?;
            files.push(json!({
                "file_id": file_id,
                "filename": info.display_name,
                "size_bytes": info.size_bytes,
            }));
        }

        Ok(json!({
            "status": "success",
            "job_id": job_id,
            "num_files": output_ids.len(),
            "file_ids": output_ids,
            "files": files,
            "message": format!("Retrieved {} designed binder structure(s).", files.len()),
        }))
    }

    async fn visualize_structure(&self, input: &ToolInput) -> Result<Value, ToolError> {
        let file_ids = input.param_str_list("file_ids")?;
        if file_ids.is_empty() {
            return Err(ToolError::InvalidParameter(
                "file_ids must not be empty".to_string(),
            ));
        }

        let style = input
            .param_str_opt("style")?
            .unwrap_or_else(|| "cartoon".to_string());
        if !VISUALIZATION_STYLES.contains(&style.as_str()) {
            return Err(ToolError::InvalidParameter(format!(
                "style must be one of: {}",
                VISUALIZATION_STYLES.join(", ")
            )));
        }
        let color_by = input
            .param_str_opt("color_by")?
            .unwrap_or_else(|| "chain".to_string());
        if !COLOR_SCHEMES.contains(&color_by.as_str()) {
            return Err(ToolError::InvalidParameter(format!(
                "color_by must be one of: {}",
                COLOR_SCHEMES.join(", ")
            )));
        }

        let mut pdb_contents = serde_json::Map::new();
        for file_id in &file_ids {
            let path = self.files.resolve(file_id).map_err(failed)?;
            let bytes = tokio::fs::read(&path).await.map_err(failed)?;
            pdb_contents.insert(
                file_id.clone(),
                Value::String(String::from_utf8_lossy(&bytes).into_owned()),
            );
        }

        let mut result = json!({
            "status": "success",
            "num_structures": file_ids.len(),
            "style": style,
            "color_by": color_by,
            "pdb_contents": pdb_contents,
            "message": format!("Prepared {} structure(s) for visualization.", file_ids.len()),
        });
        if let Some(label) = input.param_str_opt("label")? {
            result["label"] = json!(label);
        }
        Ok(result)
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        ToolRegistry::definitions(self)
    }

    async fn dispatch(&self, name: &str, input: &Value, ctx: &ToolContext) -> String {
        ToolRegistry::dispatch(self, name, input, ctx).await
    }
}
