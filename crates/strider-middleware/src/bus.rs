//! Topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels so every subscriber receives
//! every message without a slow subscriber blocking the others (it lags
//! instead).
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Telemetry`] | Distance readings, obstacle detections |
//! | [`Topic::HardwareCommands`] | Intents dispatched to or dropped before the gateway |
//! | [`Topic::SystemAlerts`] | Mode transitions, autonomy toggles, actuator faults |

use strider_types::{Event, StriderError};
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (events buffered before slow subscribers lag).
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Telemetry,
    HardwareCommands,
    SystemAlerts,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Telemetry, Topic::HardwareCommands, Topic::SystemAlerts];

    /// Wire name used by the cockpit when forwarding events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Telemetry => "telemetry",
            Topic::HardwareCommands => "hardware_commands",
            Topic::SystemAlerts => "system_alerts",
        }
    }
}

/// Shared event bus.  Clones share the same channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    telemetry: broadcast::Sender<Event>,
    hardware_commands: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` applies to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (telemetry, _) = broadcast::channel(capacity);
        let (hardware_commands, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            telemetry,
            hardware_commands,
            system_alerts,
        }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns the number of receivers handed the event, or
    /// [`StriderError::Channel`] when nobody is subscribed.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, StriderError> {
        self.sender(topic).send(event).map_err(|_| {
            StriderError::Channel(format!("no subscribers for topic {}", topic.as_str()))
        })
    }

    /// Fire-and-forget publish for producers that do not care whether
    /// anyone is listening.
    pub fn emit(&self, topic: Topic, event: Event) {
        if let Err(err) = self.publish_to(topic, event) {
            trace!(%err, "event dropped");
        }
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.sender(topic).subscribe(),
        }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Telemetry => &self.telemetry,
            Topic::HardwareCommands => &self.hardware_commands,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Next event on this topic.  `Lagged(n)` means `n` events were dropped
    /// for this subscriber; `Closed` means the bus is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}
