use shuttle_runtime::Error as ShuttleError;
use teloxide::RequestError;

use crate::platform::PlatformError;
use crate::runtime::RuntimeError;
use crate::{service::ServiceError, storage::StorageError};

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("App state error: {0}")]
    AppStateError(String),

    #[error("Secret key error: {0}")]
    SecretKeyError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Platform error: {0}")]
    PlatformError(#[from] PlatformError),

    #[error("Runtime error: {0}")]
    RuntimeError(#[from] RuntimeError),

    #[error("Telegram error: {0}")]
    Telegram(#[from] RequestError),

    #[error("Route error: {0}")]
    RouteError(String),

    #[error(transparent)]
    Other(anyhow::Error),
}

impl From<BotError> for ShuttleError {
    fn from(error: BotError) -> Self {
        ShuttleError::Custom(anyhow::anyhow!(error))
    }
}

impl From<anyhow::Error> for BotError {
    fn from(error: anyhow::Error) -> Self {
        BotError::Other(error)
    }
}

impl From<regex::Error> for BotError {
    fn from(error: regex::Error) -> Self {
        BotError::RouteError(error.to_string())
    }
}

pub type HandlerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub type BotResult<T> = Result<T, BotError>;
