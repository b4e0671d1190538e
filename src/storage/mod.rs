mod error;
mod memory;
mod turso;
mod upstash;

pub use error::StorageError;
pub use memory::MemoryStorage;
pub use turso::TursoClient;
pub use upstash::RedisClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    config::StorageConfig,
    service::{
        state::{SpaceState, UserState},
        user::{Role, User, UserPatch},
    },
};

#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn get_user_by_id(&self, id: u64) -> Result<Option<User>, StorageError>;
    async fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>, StorageError>;
    async fn add_user(&self, user: &User) -> Result<bool, StorageError>;
    async fn update_user(&self, id: u64, patch: UserPatch) -> Result<bool, StorageError>;
    async fn get_users_by_role(&self, role: Role) -> Result<Vec<User>, StorageError>;
    async fn get_users(&self) -> Result<Vec<User>, StorageError>;
}

/// Append-only presence and space logs.
#[async_trait]
pub trait StateRepository: Send + Sync + 'static {
    async fn push_user_state(&self, state: UserState) -> Result<UserState, StorageError>;
    async fn get_user_states_since(&self, since: DateTime<Utc>) -> Result<Vec<UserState>, StorageError>;
    async fn get_user_states_for(&self, user_id: u64) -> Result<Vec<UserState>, StorageError>;
    async fn get_latest_space_state(&self) -> Result<Option<SpaceState>, StorageError>;
    async fn push_space_state(&self, state: SpaceState) -> Result<SpaceState, StorageError>;
}

#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
    async fn del(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Clone)]
pub struct StorageManager {
    pub users: Arc<dyn UserRepository>,
    pub states: Arc<dyn StateRepository>,
    pub kv: Arc<dyn KeyValueStore>,
}

impl StorageManager {
    pub async fn init(config: &StorageConfig) -> Result<Self, StorageError> {
        let turso = Arc::new(TursoClient::new(&config.turso_url, &config.turso_token).await?);
        turso.migrate().await?;

        let redis = Arc::new(RedisClient::new(&config.redis_url).await?);

        Ok(Self {
            users: turso.clone(),
            states: turso,
            kv: redis,
        })
    }

    pub fn memory() -> Self {
        let memory = Arc::new(MemoryStorage::default());

        Self {
            users: memory.clone(),
            states: memory.clone(),
            kv: memory,
        }
    }
}
