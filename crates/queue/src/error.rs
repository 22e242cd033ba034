//! Queue and per-file error types.

use upqueue_protocol::EngineError;
use upqueue_response::{ResponseError, UploadResponse};

/// Errors returned by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("no element with id \"{0}\" exists to bind the uploader to")]
    MissingAnchor(String),

    #[error("transport engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("queue has been destroyed")]
    Destroyed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a file's upload did not succeed.
///
/// This is the rejection value carried by a file's completion signal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FileError {
    /// The server answered outside the success band.
    #[error("server answered with status {}", .0.status)]
    Http(UploadResponse),

    #[error("transport error: {0}")]
    Transport(EngineError),

    #[error("response with status {status} could not be parsed: {source}")]
    MalformedResponse { status: u16, source: ResponseError },

    #[error("session was destroyed before the upload settled")]
    SessionDestroyed,

    #[error("file entry was dropped before the upload settled")]
    Dropped,
}

impl FileError {
    /// The parsed server response, for HTTP-band failures.
    pub fn response(&self) -> Option<&UploadResponse> {
        match self {
            FileError::Http(resp) => Some(resp),
            _ => None,
        }
    }
}
