use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotEvent {
    SpaceOpened,
    SpaceClosed,
    SpaceLiveUpdate,
    CamLiveUpdate,
}

/// Process-wide domain event emitter. Events without subscribers are dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<BotEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: BotEvent) {
        if self.sender.send(event).is_err() {
            trace!("No listeners for {:?}", event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
