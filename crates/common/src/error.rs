use http::StatusCode;
use thiserror::Error;

/// Message returned to callers for any internal failure. The underlying
/// error is only ever logged.
pub const INTERNAL_ERROR_MESSAGE: &str = "A problem occurred";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ProxyError {
    /// HTTP status the error is surfaced as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client. Client errors carry their own
    /// message; everything else collapses to a generic one.
    pub fn public_message(&self) -> String {
        match self {
            ProxyError::BadRequest(msg) | ProxyError::Forbidden(msg) => msg.clone(),
            _ => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
