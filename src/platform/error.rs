#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Unavailable: {0}")]
    Unavailable(String),
}
