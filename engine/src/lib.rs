//! Bindery Engine Library
//!
//! Agent orchestration and job execution for protein binder design.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Message bus for inter-component communication
pub mod message_bus;

/// LLM provider abstraction layer and model router
pub mod llm;

/// Conversation orchestrator and context window management
pub mod agent;

/// Tool dispatcher and tool handlers
pub mod tools;

/// Job state manager, runner and supervisor
pub mod jobs;

/// File registry
pub mod files;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
