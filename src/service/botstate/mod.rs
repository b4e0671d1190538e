use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{live::LiveHandlerSpec, ServiceError};
use crate::storage::KeyValueStore;

const BOT_STATE_KEY: &str = "bot:state";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub from: String,
    pub text: String,
    pub date: DateTime<Utc>,
}

/// Operational state that has to survive a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotStateDocument {
    #[serde(default)]
    pub history: HashMap<i64, VecDeque<HistoryEntry>>,
    #[serde(default)]
    pub live_handlers: Vec<LiveHandlerSpec>,
    #[serde(default)]
    pub flags: HashMap<String, bool>,
}

#[derive(Clone)]
pub struct BotStateService {
    store: Arc<dyn KeyValueStore>,
    document: Arc<RwLock<BotStateDocument>>,
    capacity: usize,
}

impl BotStateService {
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            document: Arc::new(RwLock::new(BotStateDocument::default())),
            capacity,
        }
    }

    /// Replaces the in-memory document with the stored one. A corrupt document is discarded.
    pub async fn load(&self) -> Result<(), ServiceError> {
        let Some(raw) = self.store.get(BOT_STATE_KEY).await? else {
            info!("No stored bot state, starting fresh");
            return Ok(());
        };

        match serde_json::from_str::<BotStateDocument>(&raw) {
            Ok(document) => {
                info!(
                    "Bot state loaded: {} chats with history, {} live handlers",
                    document.history.len(),
                    document.live_handlers.len()
                );
                *self.document.write().await = document;
            }
            Err(e) => warn!("Discarding unreadable bot state: {}", e),
        }

        Ok(())
    }

    pub async fn persist(&self) -> Result<(), ServiceError> {
        let raw = {
            let document = self.document.read().await;
            serde_json::to_string(&*document).map_err(crate::storage::StorageError::from)?
        };
        self.store.set(BOT_STATE_KEY, raw).await?;
        debug!("Bot state persisted");
        Ok(())
    }

    /// Appends to the chat's ring buffer, dropping the oldest entries past capacity.
    pub async fn push_history(&self, chat_id: i64, from: &str, text: &str) {
        if self.capacity == 0 {
            return;
        }

        let mut document = self.document.write().await;
        let history = document.history.entry(chat_id).or_default();
        history.push_back(HistoryEntry {
            from: from.to_string(),
            text: text.to_string(),
            date: Utc::now(),
        });
        while history.len() > self.capacity {
            history.pop_front();
        }
    }

    pub async fn history(&self, chat_id: i64) -> Vec<HistoryEntry> {
        self.document
            .read()
            .await
            .history
            .get(&chat_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn set_live_handlers(&self, specs: Vec<LiveHandlerSpec>) -> Result<(), ServiceError> {
        self.document.write().await.live_handlers = specs;
        self.persist().await
    }

    pub async fn live_handlers(&self) -> Vec<LiveHandlerSpec> {
        self.document.read().await.live_handlers.clone()
    }

    pub async fn flag(&self, name: &str) -> bool {
        self.document.read().await.flags.get(name).copied().unwrap_or(false)
    }

    pub async fn set_flag(&self, name: &str, value: bool) -> Result<(), ServiceError> {
        self.document.write().await.flags.insert(name.to_string(), value);
        self.persist().await
    }
}
