use hashmark_types::DomainEvent;
use std::collections::HashMap;

/// Error type bus handlers may return; logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Box<dyn Fn(&DomainEvent) -> Result<(), HandlerError> + Send + Sync>;

/// In-process publish/subscribe fan-out.
///
/// Delivery is synchronous and FIFO per topic. A failing handler is
/// logged and skipped; it never stops delivery to later handlers.
/// Subscriptions are process-local and excluded from snapshots.
#[derive(Default)]
pub struct EventBus {
    subscribers: HashMap<String, Vec<Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a topic. `"*"` receives every event.
    pub fn subscribe<F>(&mut self, topic: &str, handler: F)
    where
        F: Fn(&DomainEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribers
            .entry(topic.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    /// Deliver an event to its topic's subscribers, then to wildcard
    /// subscribers, in registration order.
    pub fn publish(&self, event: &DomainEvent) {
        let topic = event.topic();
        for key in [topic, "*"] {
            let Some(handlers) = self.subscribers.get(key) else {
                continue;
            };
            for handler in handlers {
                if let Err(e) = handler(event) {
                    tracing::warn!(topic, "event handler failed: {e}");
                }
            }
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.get(topic).map(Vec::len).unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.subscribers.keys().collect::<Vec<_>>())
            .finish()
    }
}
