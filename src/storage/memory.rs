use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{KeyValueStore, StateRepository, StorageError, UserRepository};
use crate::service::{
    state::{SpaceState, UserState},
    user::{Role, User, UserPatch},
};

#[derive(Clone, Debug)]
pub struct MemoryCache<T: Clone> {
    cache: Arc<DashMap<String, T>>,
}

impl<T: Clone> MemoryCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Arc::new(DashMap::with_capacity(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.cache.get(key).map(|value| value.value().clone())
    }

    pub fn set(&self, key: &str, value: T) {
        self.cache.insert(key.to_string(), value);
    }

    pub fn del(&self, key: &str) {
        self.cache.remove(key);
    }
}

/// Process-local backend used by tests and offline runs.
#[derive(Debug)]
pub struct MemoryStorage {
    users: DashMap<u64, User>,
    user_states: Mutex<Vec<UserState>>,
    space_states: Mutex<Vec<SpaceState>>,
    kv: MemoryCache<String>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self {
            users: DashMap::new(),
            user_states: Mutex::new(Vec::new()),
            space_states: Mutex::new(Vec::new()),
            kv: MemoryCache::new(16),
        }
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Memory(e.to_string())
}

#[async_trait]
impl UserRepository for MemoryStorage {
    async fn get_user_by_id(&self, id: u64) -> Result<Option<User>, StorageError> {
        Ok(self.users.get(&id).map(|user| user.value().clone()))
    }

    async fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>, StorageError> {
        let handle = handle.trim_start_matches('@').to_lowercase();

        Ok(self
            .users
            .iter()
            .find(|entry| {
                entry
                    .value()
                    .username
                    .as_ref()
                    .is_some_and(|username| username.to_lowercase() == handle)
            })
            .map(|entry| entry.value().clone()))
    }

    async fn add_user(&self, user: &User) -> Result<bool, StorageError> {
        if self.users.contains_key(&user.id) {
            return Ok(false);
        }
        self.users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn update_user(&self, id: u64, patch: UserPatch) -> Result<bool, StorageError> {
        match self.users.get_mut(&id) {
            Some(mut user) => {
                patch.apply(user.value_mut());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_users_by_role(&self, role: Role) -> Result<Vec<User>, StorageError> {
        Ok(self
            .users
            .iter()
            .filter(|entry| entry.value().has_role(role))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn get_users(&self) -> Result<Vec<User>, StorageError> {
        Ok(self.users.iter().map(|entry| entry.value().clone()).collect())
    }
}

#[async_trait]
impl StateRepository for MemoryStorage {
    async fn push_user_state(&self, mut state: UserState) -> Result<UserState, StorageError> {
        state.id = Some(Uuid::new_v4().to_string());
        self.user_states.lock().map_err(poisoned)?.push(state.clone());
        Ok(state)
    }

    async fn get_user_states_since(&self, since: DateTime<Utc>) -> Result<Vec<UserState>, StorageError> {
        let states = self.user_states.lock().map_err(poisoned)?;
        Ok(states.iter().filter(|state| state.date >= since).cloned().collect())
    }

    async fn get_user_states_for(&self, user_id: u64) -> Result<Vec<UserState>, StorageError> {
        let states = self.user_states.lock().map_err(poisoned)?;
        Ok(states.iter().filter(|state| state.user_id == user_id).cloned().collect())
    }

    async fn get_latest_space_state(&self) -> Result<Option<SpaceState>, StorageError> {
        let states = self.space_states.lock().map_err(poisoned)?;
        Ok(states.iter().max_by_key(|state| state.date).cloned())
    }

    async fn push_space_state(&self, mut state: SpaceState) -> Result<SpaceState, StorageError> {
        state.id = Some(Uuid::new_v4().to_string());
        self.space_states.lock().map_err(poisoned)?.push(state.clone());
        Ok(state)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.kv.get(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.kv.set(key, value);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        self.kv.del(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::state::{ChangeType, UserStatus};

    #[tokio::test]
    async fn test_handle_lookup_is_case_insensitive() {
        let storage = MemoryStorage::default();
        let user = User::new(1, Some("Neo".to_string()), None);
        assert!(storage.add_user(&user).await.unwrap());
        assert!(!storage.add_user(&user).await.unwrap());

        let found = storage.get_user_by_handle("@neo").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(1));
    }

    #[tokio::test]
    async fn test_pushed_states_get_ids() {
        let storage = MemoryStorage::default();
        let user = User::new(1, None, None);

        let pushed = storage
            .push_user_state(UserState::new(&user, UserStatus::Inside, ChangeType::Manual, Utc::now()))
            .await
            .unwrap();

        assert!(pushed.id.is_some());
        assert_eq!(storage.get_user_states_for(1).await.unwrap().len(), 1);
    }
}
