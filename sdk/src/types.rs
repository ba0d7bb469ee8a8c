//! Shared data types
//!
//! These types cross the boundary between the engine and whatever transport
//! drains it: the incremental agent event stream, job records and states, and
//! typed access to tool-call arguments.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Input to a tool handler
///
/// Wraps the JSON object the model supplied as tool-call arguments and gives
/// handlers typed accessors that fail with `ToolError::MissingParameter` or
/// `ToolError::InvalidParameter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub method: String,
    pub params: HashMap<String, serde_json::Value>,
}

impl ToolInput {
    /// Create a new ToolInput
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: HashMap::new(),
        }
    }

    /// Build from a tool call's JSON arguments. Anything but an object is rejected.
    pub fn from_value(
        method: impl Into<String>,
        value: &serde_json::Value,
    ) -> Result<Self, ToolError> {
        let method = method.into();
        match value {
            serde_json::Value::Object(map) => Ok(Self {
                method,
                params: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            }),
            serde_json::Value::Null => Ok(Self::new(method)),
            other => Err(ToolError::InvalidParameter(format!(
                "arguments must be an object, got {}",
                other
            ))),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<String, ToolError> {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => {
                Err(ToolError::MissingParameter(key.to_string()))
            }
            Some(v) => v
                .as_str()
                .map(String::from)
                .ok_or_else(|| ToolError::InvalidParameter(format!("{} must be a string", key))),
        }
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Result<Option<String>, ToolError> {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v) => v
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| ToolError::InvalidParameter(format!("{} must be a string", key))),
        }
    }

    /// Get an optional i64 parameter
    pub fn param_i64_opt(&self, key: &str) -> Result<Option<i64>, ToolError> {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| ToolError::InvalidParameter(format!("{} must be an integer", key))),
        }
    }

    /// Get a list of strings
    pub fn param_str_list(&self, key: &str) -> Result<Vec<String>, ToolError> {
        self.param_str_list_opt(key)?
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an optional list of strings
    pub fn param_str_list_opt(&self, key: &str) -> Result<Option<Vec<String>>, ToolError> {
        let items = match self.params.get(key) {
            None | Some(serde_json::Value::Null) => return Ok(None),
            Some(serde_json::Value::Array(items)) => items,
            Some(_) => {
                return Err(ToolError::InvalidParameter(format!(
                    "{} must be a list of strings",
                    key
                )))
            }
        };

        items
            .iter()
            .map(|item| {
                item.as_str().map(String::from).ok_or_else(|| {
                    ToolError::InvalidParameter(format!("{} must be a list of strings", key))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

/// Tool-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Failed(String),
}

/// One event on the incremental stream emitted during a conversation turn.
///
/// Serialized as `{"event": "<kind>", "data": ...}`. Consumers must process
/// events in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A chunk of assistant text
    Text(String),

    /// The model requested a tool
    ToolCall {
        name: String,
        input: serde_json::Value,
    },

    /// A tool finished; `result` is the compressed serialized payload
    ToolResult { name: String, result: String },

    /// A tool result carried structures for the 3D viewer
    Visualization {
        pdb_contents: serde_json::Value,
        style: String,
        color_by: String,
    },

    /// Terminal event of every turn
    Done { model_used: String, iterations: usize },
}

impl AgentEvent {
    /// Short name of the event kind, as used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::Text(_) => "text",
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::Visualization { .. } => "visualization",
            AgentEvent::Done { .. } => "done",
        }
    }
}

/// State of a compute job
///
/// `Pending -> Queued -> Running -> {Completed | Failed | Cancelled}`.
/// Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled jobs never change state again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the fixed job states
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid job status: {0}")]
pub struct ParseJobStateError(pub String);

impl FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "cancelled" => Ok(JobState::Cancelled),
            other => Err(ParseJobStateError(other.to_string())),
        }
    }
}

/// Snapshot of a compute job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobState,
    pub progress: Option<f64>,
    pub message: String,
    pub input_reference: String,
    pub contig_spec: String,
    pub params: serde_json::Value,
    pub output_ids: Vec<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}
