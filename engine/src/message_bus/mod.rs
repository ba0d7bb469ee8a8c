//! Message Bus for inter-component communication
//!
//! Jobs, the orchestrator and the tool dispatcher publish lifecycle events
//! here; the persistence recorder subscribes. Each subscriber owns a bounded
//! channel. A full subscriber applies backpressure: the publisher waits for
//! room rather than dropping the event.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::debug;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    /// A design job was created
    JobCreated,
    /// A design job changed status, progress or message
    JobUpdated,
    /// A message was appended to a conversation
    MessageAppended,
    /// A tool was called
    ToolCalled,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    JobCreated {
        job_id: String,
        input_reference: String,
        contig_spec: String,
    },
    JobUpdated {
        job_id: String,
        status: String,
        progress: Option<f64>,
        message: String,
    },
    /// Only user messages and final assistant text are published
    MessageAppended {
        conversation_id: String,
        role: String,
        content: String,
        model_used: Option<String>,
        token_count: Option<u64>,
    },
    ToolCalled {
        tool: String,
        args: serde_json::Value,
    },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::JobCreated { .. } => EventType::JobCreated,
            Event::JobUpdated { .. } => EventType::JobUpdated,
            Event::MessageAppended { .. } => EventType::MessageAppended,
            Event::ToolCalled { .. } => EventType::ToolCalled,
        }
    }
}

/// Message bus for pub/sub communication between components
pub struct MessageBus {
    /// Subscribers keyed by the event type they asked for
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to subscribers of its type and to `All` subscribers
    ///
    /// Waits while a subscriber's buffer is full. The lock is not held while
    /// waiting. Closed subscribers are pruned.
    pub async fn publish(&self, event: Event) {
        let event_type = event.event_type();
        let targets: Vec<mpsc::Sender<Event>> = {
            let channels = self.channels.lock().await;
            [event_type, EventType::All]
                .iter()
                .filter_map(|key| channels.get(key))
                .flat_map(|subs| subs.iter().cloned())
                .collect()
        };

        let mut saw_closed = false;
        for tx in targets {
            if tx.send(event.clone()).await.is_err() {
                saw_closed = true;
            }
        }

        if saw_closed {
            let mut channels = self.channels.lock().await;
            for subscribers in channels.values_mut() {
                subscribers.retain(|tx| !tx.is_closed());
            }
            debug!("Pruned closed subscribers after {:?}", event_type);
        }
    }

    /// Number of live subscribers across all event types
    pub async fn subscriber_count(&self) -> usize {
        let channels = self.channels.lock().await;
        channels
            .values()
            .flat_map(|subs| subs.iter())
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
