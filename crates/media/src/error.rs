//! Error types for media transfer operations.

/// Errors produced while moving attachments to or from the media store.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("media store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("upload response carried no file identifier")]
    EmptyResponse,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
