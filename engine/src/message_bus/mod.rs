//! Message Bus for research progress
//!
//! The orchestrator publishes a [`ProgressEvent`] for every decision it makes.
//! Observers (the CLI progress printer, tests) subscribe to specific event
//! types or to all of them. Channels are bounded and publishing never waits:
//! a subscriber that falls behind loses events instead of stalling the loop.

use sdk::types::ActionKind;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be subscribed to
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    RunStarted,
    Decision,
    RunCompleted,
    /// Subscribe to all event types
    All,
}

/// Events published while a research run progresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    RunStarted {
        question: String,
        max_steps: u32,
    },
    /// Published for every decision, whether or not the action then succeeds
    Decision {
        step: u32,
        kind: ActionKind,
        title: String,
        description: String,
        fallback: bool,
    },
    RunCompleted {
        steps_taken: u32,
        degraded: bool,
    },
}

impl ProgressEvent {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            ProgressEvent::RunStarted { .. } => EventType::RunStarted,
            ProgressEvent::Decision { .. } => EventType::Decision,
            ProgressEvent::RunCompleted { .. } => EventType::RunCompleted,
        }
    }
}

/// Pub/sub hub for progress events
pub struct MessageBus {
    channels: Mutex<HashMap<EventType, Vec<mpsc::Sender<ProgressEvent>>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        self.channels()
            .entry(event_type)
            .or_default()
            .push(tx);
        rx
    }

    /// Publish an event to matching and `All` subscribers without waiting.
    /// Full channels drop the event; closed channels are unsubscribed.
    pub fn publish(&self, event: ProgressEvent) {
        let mut channels = self.channels();
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        tracing::debug!("Progress subscriber lagging, dropped {:?}", key);
                        true
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.channels().values().map(Vec::len).sum()
    }

    fn channels(&self) -> std::sync::MutexGuard<'_, HashMap<EventType, Vec<mpsc::Sender<ProgressEvent>>>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
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

    fn decision(step: u32) -> ProgressEvent {
        ProgressEvent::Decision {
            step,
            kind: ActionKind::Search,
            title: "Search".to_string(),
            description: String::new(),
            fallback: false,
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe(EventType::Decision);

        bus.publish(decision(1));

        assert_eq!(rx.recv().await.unwrap(), decision(1));
    }

    #[tokio::test]
    async fn test_all_and_specific_subscribers() {
        let bus = MessageBus::new();
        let mut rx_all = bus.subscribe(EventType::All);
        let mut rx_started = bus.subscribe(EventType::RunStarted);

        bus.publish(decision(2));
        bus.publish(ProgressEvent::RunStarted {
            question: "q".to_string(),
            max_steps: 10,
        });

        assert_eq!(rx_all.recv().await.unwrap(), decision(2));
        assert!(matches!(
            rx_all.recv().await.unwrap(),
            ProgressEvent::RunStarted { .. }
        ));
        assert!(matches!(
            rx_started.recv().await.unwrap(),
            ProgressEvent::RunStarted { .. }
        ));
        assert!(rx_started.try_recv().is_err());
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe(EventType::Decision);

        for step in 0..(CHANNEL_BUFFER_SIZE as u32 + 10) {
            bus.publish(decision(step));
        }

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, CHANNEL_BUFFER_SIZE);
    }

    #[test]
    fn test_closed_subscribers_are_removed() {
        let bus = MessageBus::new();
        let rx = bus.subscribe(EventType::Decision);
        drop(rx);

        bus.publish(decision(1));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
