use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::trace;

use crate::{EventInfo, TrellisEvent};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// The event channel that components use to broadcast events
#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<EventInfo>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            tx: self.tx.clone(),
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<EventInfo>,
}

impl EventPublisher {
    pub fn send(&self, event: TrellisEvent) {
        let formatted_log = event.to_string();
        trace!("publishing event: {}", formatted_log);
        let event_info = EventInfo {
            event,
            time: SystemTime::now(),
            formatted_log,
        };
        // no subscribers is fine
        let _ = self.tx.send(event_info);
    }
}

#[derive(Debug)]
pub struct EventSubscriber {
    rx: broadcast::Receiver<EventInfo>,
}

impl EventSubscriber {
    pub async fn recv(&mut self) -> Result<EventInfo, broadcast::error::RecvError> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<EventInfo, broadcast::error::TryRecvError> {
        self.rx.try_recv()
    }
}
