//! Upload response parsing.
//!
//! Turns the raw `(status, header block, body)` triple a transport engine
//! delivers with `FileUploaded` into an [`UploadResponse`] whose body has been
//! decoded according to the declared `Content-Type`. Nothing here touches
//! session or queue state.

pub mod headers;
pub mod markup;
mod parse;

pub use headers::{header, parse_headers};
pub use markup::{Element, Node};
pub use parse::{Body, ContentKind, UploadResponse, parse_response};

/// Errors produced while decoding a response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("invalid JSON body: {0}")]
    Json(String),

    #[error("invalid XML body: {0}")]
    Xml(String),
}

impl From<serde_json::Error> for ResponseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}
