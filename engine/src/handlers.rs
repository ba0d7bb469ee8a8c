//! Command handlers for CLI operations
//!
//! - chat: run conversation turns against the configured provider
//! - history: show stored conversation messages
//! - jobs-log: show the recorded lifecycle of a design job
//! - config show / path

use anyhow::{Context, Result};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::{ConversationContext, Orchestrator};
use crate::config::Config;
use crate::db::{Database, Recorder, StoredMessage};
use crate::files::{FileRegistry, LocalFileRegistry};
use crate::jobs::{JobLauncher, JobManager, JobRunner, RunnerSettings};
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::router::ModelRouter;
use crate::llm::{ConversationMessage, LLMProvider, Role};
use crate::message_bus::MessageBus;
use crate::tools::rcsb::RcsbClient;
use crate::tools::ToolRegistry;
use sdk::errors::{EngineError, EngineErrorExt};
use sdk::types::AgentEvent;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Longest tool result echoed to the terminal in text mode
const DISPLAY_RESULT_CHARS: usize = 200;

/// Wire the orchestrator and its collaborators from config
///
/// Jobs, files and tool calls all publish on `bus`.
pub fn build_orchestrator(
    config: &Config,
    provider: Arc<dyn LLMProvider>,
    bus: Arc<MessageBus>,
) -> (Orchestrator, Arc<JobManager>) {
    let files: Arc<dyn FileRegistry> = Arc::new(LocalFileRegistry::new());
    let jobs = Arc::new(JobManager::with_bus(bus.clone()));

    let runner = JobRunner::new(
        RunnerSettings::from_config(&config.jobs),
        jobs.clone(),
        files.clone(),
    );
    let launcher = JobLauncher::new(runner, jobs.clone());

    let tools = ToolRegistry::new(
        files,
        jobs.clone(),
        launcher,
        RcsbClient::from_config(&config.registry),
        config.jobs.upload_dir.clone(),
        config.jobs.output_dir.clone(),
    )
    .with_bus(bus.clone());

    let router = ModelRouter::new(Arc::new(config.llm.clone()));
    let orchestrator = Orchestrator::new(provider, router, Arc::new(tools))
        .with_max_iterations(config.agent.max_iterations)
        .with_provider_timeout(Duration::from_secs(config.llm.timeout_secs))
        .with_bus(bus);

    (orchestrator, jobs)
}

/// Rebuild a provider history from stored text messages
///
/// Only user messages and final assistant text are stored, so consecutive
/// messages with the same role are merged to keep roles alternating.
pub fn restore_messages(stored: &[StoredMessage]) -> Vec<ConversationMessage> {
    let mut messages: Vec<(Role, String)> = Vec::new();

    for message in stored {
        let role = match message.role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => continue,
        };
        match messages.last_mut() {
            Some((last_role, text)) if *last_role == role => {
                text.push_str("\n\n");
                text.push_str(&message.content);
            }
            _ => messages.push((role, message.content.clone())),
        }
    }

    messages
        .into_iter()
        .map(|(role, text)| match role {
            Role::User => ConversationMessage::user(text),
            Role::Assistant => ConversationMessage::assistant(text),
        })
        .collect()
}

/// Talk to the agent
///
/// With `message` one turn is run and the command exits; otherwise lines are
/// read from stdin until EOF or `exit`.
pub async fn handle_chat(
    message: Option<String>,
    conversation: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let mut ctx = match conversation {
        Some(id) => {
            let stored = database
                .messages()
                .conversation(&id)
                .await
                .context("Failed to load conversation")?;
            let mut ctx = ConversationContext::new(id);
            ctx.messages = restore_messages(&stored);
            ctx
        }
        None => ConversationContext::fresh(),
    };

    let provider = match AnthropicProvider::from_config(&config.llm) {
        Ok(provider) => provider,
        Err(e) => {
            let err = EngineError::from(e);
            eprintln!("Hint: {}", err.user_hint());
            return Err(err).context("Failed to configure the language model provider");
        }
    };

    let bus = Arc::new(MessageBus::new());
    let recorder = Recorder::new(&database).spawn(&bus).await;
    let (orchestrator, jobs) = build_orchestrator(config, Arc::new(provider), bus);

    if let OutputFormat::Text = format {
        println!("Conversation: {}", ctx.conversation_id);
    }

    match message {
        Some(text) => {
            run_one_turn(&orchestrator, &mut ctx, &text, format).await;

            let active = jobs
                .list()
                .await
                .into_iter()
                .filter(|job| !job.status.is_terminal())
                .count();
            if active > 0 {
                tracing::warn!(
                    "{} design job(s) still running will stop when the command exits",
                    active
                );
            }
        }
        None => {
            if let OutputFormat::Text = format {
                println!("Type a message, or 'exit' to quit.");
            }
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }
                run_one_turn(&orchestrator, &mut ctx, line, format).await;
            }
        }
    }

    recorder.shutdown().await;
    database.close().await?;
    Ok(())
}

async fn run_one_turn(
    orchestrator: &Orchestrator,
    ctx: &mut ConversationContext,
    text: &str,
    format: OutputFormat,
) {
    let (tx, rx) = mpsc::channel(64);
    let printer = spawn_printer(rx, format);

    orchestrator.run_turn(ctx, text, &tx).await;

    drop(tx);
    if let Err(e) = printer.await {
        tracing::warn!("Event printer failed: {}", e);
    }
}

fn spawn_printer(mut rx: mpsc::Receiver<AgentEvent>, format: OutputFormat) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match format {
                OutputFormat::Json => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!("Failed to serialize event: {}", e),
                },
                OutputFormat::Text => print_event(&event),
            }
        }
    })
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::Text(text) => {
            println!();
            println!("{}", text);
        }
        AgentEvent::ToolCall { name, input } => {
            println!("→ {} {}", name, input);
        }
        AgentEvent::ToolResult { name, result } => {
            let mut shown: String = result.chars().take(DISPLAY_RESULT_CHARS).collect();
            if result.chars().count() > DISPLAY_RESULT_CHARS {
                shown.push_str("...");
            }
            println!("← {} {}", name, shown);
        }
        AgentEvent::Visualization {
            pdb_contents,
            style,
            color_by,
        } => {
            let count = pdb_contents.as_object().map(|m| m.len()).unwrap_or(0);
            println!(
                "[structure view: {} file(s), style={}, color_by={}]",
                count, style, color_by
            );
        }
        AgentEvent::Done {
            model_used,
            iterations,
        } => {
            println!();
            println!("✓ {} ({} iteration(s))", model_used, iterations);
        }
    }
}

/// Show stored conversation messages
pub async fn handle_history(
    conversation: Option<String>,
    limit: usize,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let repo = database.messages();

    let messages = match &conversation {
        Some(id) => {
            let all = repo
                .conversation(id)
                .await
                .context("Failed to fetch conversation")?;
            let skip = all.len().saturating_sub(limit);
            all.into_iter().skip(skip).collect()
        }
        None => repo
            .recent_messages(limit as i64)
            .await
            .context("Failed to fetch message history")?,
    };

    match format {
        OutputFormat::Text => {
            if messages.is_empty() {
                println!("No messages in history");
            }
            for message in &messages {
                let created = chrono::DateTime::from_timestamp(message.created_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "Unknown".to_string());
                println!(
                    "[{}] {} {}:",
                    created, message.conversation_id, message.role
                );
                println!("  {}", message.content);
                if let Some(model) = &message.model_used {
                    println!(
                        "  model: {} tokens: {}",
                        model,
                        message.token_count.unwrap_or(0)
                    );
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "messages": messages,
                "count": messages.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Show the recorded lifecycle of a design job
pub async fn handle_jobs_log(job_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let events = database
        .job_events()
        .events_for_job(&job_id)
        .await
        .context("Failed to fetch job events")?;

    if events.is_empty() {
        database.close().await?;
        return Err(anyhow::anyhow!("No events recorded for job {}", job_id));
    }

    match format {
        OutputFormat::Text => {
            println!("Job {}", job_id);
            for event in &events {
                let progress = event
                    .progress
                    .map(|p| format!(" {:.0}%", p * 100.0))
                    .unwrap_or_default();
                println!(
                    "  {:<9} {}{} {}",
                    event.kind.as_str(),
                    event.status,
                    progress,
                    event.message
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "job_id": job_id,
                "events": events,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Print the effective configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let text = toml::to_string_pretty(config).context("Failed to serialize config")?;
            println!("{}", text);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}

/// Print the configuration file path
pub fn handle_config_path(custom: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let path = match custom {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    match format {
        OutputFormat::Text => println!("{}", path.display()),
        OutputFormat::Json => println!("{}", json!({ "path": path })),
    }
    Ok(())
}
