use std::{future::Future, sync::Arc};

use dashmap::DashMap;
use tokio::sync::OnceCell;

use super::UserState;

/// Latest presence record per user id.
///
/// Hydrated once per process on first access and only updated through [`PresenceCache::put`]
/// afterwards. Writes made by another process are not picked up until restart.
#[derive(Clone, Debug, Default)]
pub struct PresenceCache {
    entries: Arc<DashMap<u64, UserState>>,
    hydrated: Arc<OnceCell<()>>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `load` at most once and keeps the newest record of every user it returns.
    pub async fn ensure_hydrated<F, Fut, E>(&self, load: F) -> Result<(), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<UserState>, E>>,
    {
        self.hydrated
            .get_or_try_init(|| async {
                let states = load().await?;
                let count = states.len();

                for state in states {
                    let newer = self
                        .entries
                        .get(&state.user_id)
                        .map_or(true, |current| current.date <= state.date);
                    if newer {
                        self.entries.insert(state.user_id, state);
                    }
                }

                info!("Presence cache hydrated from {} records, {} users", count, self.entries.len());
                Ok(())
            })
            .await
            .map(|_| ())
    }

    pub fn put(&self, state: UserState) {
        self.entries.insert(state.user_id, state);
    }

    pub fn get(&self, user_id: u64) -> Option<UserState> {
        self.entries.get(&user_id).map(|entry| entry.value().clone())
    }

    pub fn snapshot(&self) -> Vec<UserState> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }
}
