use serde::{Deserialize, Serialize};

use crate::types::{RawFile, RawResponse, RuntimeInfo};

/// Error reported by a transport engine.
///
/// When `file` is set the failure concerns that single file; otherwise it is
/// a queue-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message} (code {code})")]
pub struct EngineError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<RawFile>,
    /// HTTP status, when the failure came back from the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Raw response body, when one was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl EngineError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            file: None,
            status: None,
            response: None,
        }
    }

    /// Attaches the file this error concerns.
    pub fn for_file(mut self, file: RawFile) -> Self {
        self.file = Some(file);
        self
    }

    pub fn file_id(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.id.as_str())
    }
}

/// Lifecycle events emitted by a transport engine session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// The engine finished initializing and picked a runtime.
    Init {
        #[serde(default)]
        runtime: RuntimeInfo,
    },
    /// Files were picked or dropped onto the anchor.
    FilesAdded { files: Vec<RawFile> },
    /// Files were removed from the engine's queue.
    FilesRemoved { files: Vec<RawFile> },
    /// A file is about to be dispatched.
    BeforeUpload { file: RawFile },
    /// Bytes were transferred for a file.
    UploadProgress { file: RawFile },
    /// A file finished transferring and the server answered.
    FileUploaded { file: RawFile, response: RawResponse },
    /// The session has nothing left to dispatch.
    UploadComplete,
    /// A file-level or queue-level failure.
    Error { error: EngineError },
}

impl EngineEvent {
    /// Event name, as used in log output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "Init",
            Self::FilesAdded { .. } => "FilesAdded",
            Self::FilesRemoved { .. } => "FilesRemoved",
            Self::BeforeUpload { .. } => "BeforeUpload",
            Self::UploadProgress { .. } => "UploadProgress",
            Self::FileUploaded { .. } => "FileUploaded",
            Self::UploadComplete => "UploadComplete",
            Self::Error { .. } => "Error",
        }
    }
}
