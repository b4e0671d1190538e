use crate::{platform::PlatformError, storage::StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Live handler error: {0}")]
    Live(String),
}
