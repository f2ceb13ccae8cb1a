//! Domain event system — decoupled observation of runs and memory activity.
//!
//! The pool and long-term memory publish events as they work. Subscribers
//! (the CLI's verbose mode, tests) react without the publishers knowing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A pool run began
    RunStarted {
        run_id: String,
        input_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The router picked an agent and it is about to run
    AgentInvoked {
        run_id: String,
        agent_id: String,
        call_index: usize,
        timestamp: DateTime<Utc>,
    },

    /// A turn was appended to the shared state
    TurnAppended {
        run_id: String,
        agent_id: String,
        index: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A pool run ended
    RunFinished {
        run_id: String,
        termination: String,
        call_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A memory was stored or retrieved
    MemoryAccessed {
        operation: String, // "store", "retrieve", "delete", "clear"
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
