use crate::{platform::PlatformError, service::ServiceError};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("task error: {0}")]
    TaskError(String),
}
