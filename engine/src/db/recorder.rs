/// Bus recorder
///
/// Subscribes to every bus event and writes conversation messages and job
/// lifecycle events to the database. Tool-call events are not persisted.
use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ConversationRepository, Database, JobEventKind, JobEventRepository};
use crate::message_bus::{Event, EventType, MessageBus};

pub struct Recorder {
    messages: ConversationRepository,
    job_events: JobEventRepository,
}

/// Handle to a running recorder task
pub struct RecorderHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RecorderHandle {
    /// Write whatever is still queued, then stop
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!("Recorder task ended abnormally: {}", e);
        }
    }
}

impl Recorder {
    pub fn new(db: &Database) -> Self {
        Self {
            messages: db.messages(),
            job_events: db.job_events(),
        }
    }

    /// Persist one event
    pub async fn record(&self, event: &Event) -> Result<()> {
        match event {
            Event::MessageAppended {
                conversation_id,
                role,
                content,
                model_used,
                token_count,
            } => {
                self.messages
                    .append_message(
                        conversation_id,
                        role,
                        content,
                        model_used.as_deref(),
                        *token_count,
                    )
                    .await?;
            }
            Event::JobCreated { job_id, .. } => {
                self.job_events
                    .append_event(job_id, JobEventKind::Created, "pending", None, "")
                    .await?;
            }
            Event::JobUpdated {
                job_id,
                status,
                progress,
                message,
            } => {
                self.job_events
                    .append_event(job_id, JobEventKind::Updated, status, *progress, message)
                    .await?;
            }
            Event::ToolCalled { .. } => {}
        }
        Ok(())
    }

    /// Subscribe to the bus and record events on a background task
    pub async fn spawn(self, bus: &MessageBus) -> RecorderHandle {
        let rx = bus.subscribe(EventType::All).await;
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move { self.run(rx, shutdown_rx).await });

        RecorderHandle { shutdown, task }
    }

    async fn run(&self, mut rx: mpsc::Receiver<Event>, mut shutdown_rx: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.record_logged(&event).await,
                    None => break,
                },
                _ = &mut shutdown_rx => {
                    while let Ok(event) = rx.try_recv() {
                        self.record_logged(&event).await;
                    }
                    break;
                }
            }
        }
        debug!("Recorder stopped");
    }

    async fn record_logged(&self, event: &Event) {
        if let Err(e) = self.record(event).await {
            warn!("Failed to record {:?} event: {:#}", event.event_type(), e);
        }
    }
}
