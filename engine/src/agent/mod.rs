//! Conversation agent
//!
//! The orchestrator drives one conversation turn through repeated provider
//! calls and tool dispatches. The context module keeps each outgoing request
//! inside the model's window.

pub mod context;
pub mod core;
pub mod prompt;

pub use core::{ConversationContext, Orchestrator, TurnSummary};
