//! Bindery SDK
//!
//! Shared types for Bindery components: the agent event stream, job records,
//! tool inputs and the engine error type. A transport layer draining the
//! engine depends only on this crate.

/// Error types and handling
pub mod errors;

/// Event, job and tool input types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, EngineErrorExt};
pub use types::{AgentEvent, JobRecord, JobState, ParseJobStateError, ToolError, ToolInput};
