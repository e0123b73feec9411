//! Typed publish/subscribe for cross-component signals.
//!
//! Collaborators outside this engine (legend, layer panel) learn that
//! something changed through fire-and-forget signals; there is no payload
//! contract beyond the topic and an optional layer hint. The bus is owned
//! by the runtime, so its lifetime ends with `destroy()` rather than
//! leaking process-global listeners.

use tokio::sync::broadcast;

/// Signal channels the engine publishes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A decoded tile deposited new column statistics.
    NewStats,
    /// The legend should refresh (categorical discovery or a domain change).
    LegendRefresh,
    /// Displayed layers should rebuild with fresh accessors.
    Rebuild,
}

/// A fire-and-forget notification.
#[derive(Debug, Clone)]
pub struct Signal {
    /// Channel the signal was published on.
    pub topic: Topic,
    /// Layer the change belongs to, when one is known.
    pub layer: Option<String>,
}

/// Per-runtime event bus.
pub struct EventBus {
    new_stats: broadcast::Sender<Signal>,
    legend: broadcast::Sender<Signal>,
    rebuild: broadcast::Sender<Signal>,
}

const CHANNEL_CAPACITY: usize = 64;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        EventBus {
            new_stats: broadcast::channel(CHANNEL_CAPACITY).0,
            legend: broadcast::channel(CHANNEL_CAPACITY).0,
            rebuild: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<Signal> {
        match topic {
            Topic::NewStats => &self.new_stats,
            Topic::LegendRefresh => &self.legend,
            Topic::Rebuild => &self.rebuild,
        }
    }

    /// Subscribe to one topic.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Signal> {
        self.sender(topic).subscribe()
    }

    /// Publish on one topic. Publishing with no subscribers is fine.
    pub fn publish(&self, topic: Topic, layer: Option<&str>) {
        let _ = self.sender(topic).send(Signal {
            topic,
            layer: layer.map(String::from),
        });
    }
}
