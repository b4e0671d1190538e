mod model;

pub use model::*;

use std::{future::Future, pin::Pin, sync::Arc};

use dashmap::DashMap;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};

use super::{
    botstate::BotStateService,
    event::{BotEvent, EventBus},
    ServiceError,
};
use crate::error::HandlerResult;

pub type LiveFuture = Pin<Box<dyn Future<Output = HandlerResult<Option<i32>>> + Send>>;

/// Re-renders a live message. Returns the new message id when the runner replaced the message.
pub type LiveRunner = Arc<dyn Fn(LiveHandlerSpec) -> LiveFuture + Send + Sync>;

struct LiveEntry {
    spec: LiveHandlerSpec,
    task: JoinHandle<()>,
}

/// At most one live handler per `(chat, event)`. Registering again replaces the running one.
#[derive(Clone)]
pub struct LiveRegistry {
    events: EventBus,
    handlers: Arc<DashMap<(i64, BotEvent), LiveEntry>>,
    bot_state: BotStateService,
}

impl LiveRegistry {
    pub fn new(events: EventBus, bot_state: BotStateService) -> Self {
        Self {
            events,
            handlers: Arc::new(DashMap::new()),
            bot_state,
        }
    }

    pub async fn subscribe(&self, spec: LiveHandlerSpec, runner: LiveRunner) -> Result<(), ServiceError> {
        let event = spec.kind.event();
        let key = (spec.chat_id, event);

        if let Some((_, previous)) = self.handlers.remove(&key) {
            debug!("Replacing live handler {:?} in chat {}", spec.kind, spec.chat_id);
            previous.task.abort();
        }

        let mut receiver = self.events.subscribe();
        let handlers = Arc::clone(&self.handlers);
        let mut current = spec.clone();

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(received) if received == event => match runner(current.clone()).await {
                        Ok(Some(message_id)) => {
                            current.message_id = Some(message_id);
                            if let Some(mut entry) = handlers.get_mut(&key) {
                                entry.spec.message_id = Some(message_id);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Live handler {:?} in chat {} failed: {}", current.kind, current.chat_id, e),
                    },
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => debug!("Live handler lagged by {} events", skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(replaced) = self.handlers.insert(key, LiveEntry { spec, task }) {
            debug!(
                "Live handler {:?} in chat {} was registered concurrently, stopping it",
                replaced.spec.kind, replaced.spec.chat_id
            );
            replaced.task.abort();
        }
        self.persist().await
    }

    pub async fn unsubscribe(&self, chat_id: i64, kind: LiveKind) -> Result<bool, ServiceError> {
        let removed = self.handlers.remove(&(chat_id, kind.event()));
        if let Some((_, entry)) = &removed {
            entry.task.abort();
            self.persist().await?;
        }
        Ok(removed.is_some())
    }

    /// Stops every live handler in `chat_id`. Returns how many were running.
    pub async fn unsubscribe_chat(&self, chat_id: i64) -> Result<usize, ServiceError> {
        let keys: Vec<(i64, BotEvent)> = self
            .handlers
            .iter()
            .filter(|entry| entry.key().0 == chat_id)
            .map(|entry| *entry.key())
            .collect();

        for key in &keys {
            if let Some((_, entry)) = self.handlers.remove(key) {
                entry.task.abort();
            }
        }

        if !keys.is_empty() {
            self.persist().await?;
        }
        Ok(keys.len())
    }

    pub fn specs(&self) -> Vec<LiveHandlerSpec> {
        self.handlers.iter().map(|entry| entry.spec.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub async fn persist(&self) -> Result<(), ServiceError> {
        self.bot_state.set_live_handlers(self.specs()).await
    }
}
