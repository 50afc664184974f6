//! Message Bus for engine events
//!
//! Components publish lifecycle events (decisions, task attempts, voice
//! training, session expiry) without knowing who listens. Subscribers get
//! bounded channels; a subscriber that falls behind loses events instead of
//! stalling the publisher.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::orchestrator::DecisionStatus;
use sdk::types::{AgentKind, FailureReason, TaskStatus};

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Event types that can be subscribed to
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    DecisionReceived,
    TaskDispatched,
    TaskStatusChanged,
    TaskRetrying,
    TaskSucceeded,
    TaskFailed,
    DecisionCompleted,
    VoiceTrained,
    SessionClosed,
    SessionExpired,
    /// Subscribe to all event types
    All,
}

/// Events published on the message bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The orchestrator accepted a routing decision
    DecisionReceived {
        decision_id: String,
        session_id: String,
        tasks: usize,
    },
    /// A task attempt is about to invoke its agent
    TaskDispatched {
        decision_id: String,
        task_id: String,
        kind: AgentKind,
        attempt: u32,
    },
    /// A dispatched task moved to `Running` (permits held) or `TimedOut`
    /// (an attempt overran its deadline)
    TaskStatusChanged {
        decision_id: String,
        task_id: String,
        status: TaskStatus,
    },
    /// An attempt failed and another one will follow after `delay_ms`
    TaskRetrying {
        decision_id: String,
        task_id: String,
        attempt: u32,
        reason: FailureReason,
        delay_ms: u64,
    },
    TaskSucceeded {
        decision_id: String,
        task_id: String,
        kind: AgentKind,
        attempts: u32,
    },
    /// Terminal failure, including tasks that were never dispatched
    TaskFailed {
        decision_id: String,
        task_id: String,
        kind: AgentKind,
        reason: FailureReason,
        attempts: u32,
    },
    DecisionCompleted {
        decision_id: String,
        session_id: String,
        status: DecisionStatus,
    },
    VoiceTrained {
        session_id: String,
        version: u32,
    },
    SessionClosed {
        session_id: String,
    },
    SessionExpired {
        session_id: String,
    },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::DecisionReceived { .. } => EventType::DecisionReceived,
            Event::TaskDispatched { .. } => EventType::TaskDispatched,
            Event::TaskStatusChanged { .. } => EventType::TaskStatusChanged,
            Event::TaskRetrying { .. } => EventType::TaskRetrying,
            Event::TaskSucceeded { .. } => EventType::TaskSucceeded,
            Event::TaskFailed { .. } => EventType::TaskFailed,
            Event::DecisionCompleted { .. } => EventType::DecisionCompleted,
            Event::VoiceTrained { .. } => EventType::VoiceTrained,
            Event::SessionClosed { .. } => EventType::SessionClosed,
            Event::SessionExpired { .. } => EventType::SessionExpired,
        }
    }
}

/// Message bus for pub/sub communication between components
pub struct MessageBus {
    /// Subscribers per event type
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
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

    /// Publish an event to subscribers of its type and of `EventType::All`.
    ///
    /// Never waits on a slow subscriber. Closed subscribers are dropped.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(?event_type, "Subscriber lagging, event dropped");
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatched(task_id: &str) -> Event {
        Event::TaskDispatched {
            decision_id: "d1".to_string(),
            task_id: task_id.to_string(),
            kind: AgentKind::blog(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe(EventType::TaskDispatched).await;

        bus.publish(dispatched("blog")).await;

        assert_eq!(rx.recv().await.unwrap(), dispatched("blog"));
    }

    #[tokio::test]
    async fn test_all_event_type() {
        let bus = MessageBus::new();
        let mut rx_all = bus.subscribe(EventType::All).await;
        let mut rx_voice = bus.subscribe(EventType::VoiceTrained).await;

        bus.publish(dispatched("image")).await;
        bus.publish(Event::VoiceTrained {
            session_id: "s1".to_string(),
            version: 2,
        })
        .await;

        assert_eq!(rx_all.recv().await.unwrap(), dispatched("image"));
        assert!(matches!(
            rx_all.recv().await.unwrap(),
            Event::VoiceTrained { version: 2, .. }
        ));
        assert!(matches!(
            rx_voice.recv().await.unwrap(),
            Event::VoiceTrained { .. }
        ));
        assert!(rx_voice.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block_publisher() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe(EventType::TaskDispatched).await;

        for i in 0..CHANNEL_BUFFER_SIZE + 10 {
            bus.publish(dispatched(&format!("t{}", i))).await;
        }

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, CHANNEL_BUFFER_SIZE);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = MessageBus::new();
        let rx = bus.subscribe(EventType::SessionClosed).await;
        drop(rx);

        bus.publish(Event::SessionClosed {
            session_id: "s1".to_string(),
        })
        .await;

        let channels = bus.channels.lock().await;
        assert!(channels
            .get(&EventType::SessionClosed)
            .is_some_and(|subs| subs.is_empty()));
    }
}
