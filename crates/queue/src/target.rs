//! Host application collaborator.

use std::sync::Arc;

use upqueue_protocol::{EngineError, SessionId};

use crate::file::FileEntry;
use crate::queue::UploadQueue;

/// Where a newly tracked file came from.
#[derive(Clone, Copy)]
pub struct FileAddContext<'a> {
    pub queue_name: &'a str,
    pub session: SessionId,
    /// The queue, as it stands once the file has been added.
    pub queue: &'a UploadQueue,
}

/// The host side of a queue: resolves anchors and observes files and errors.
pub trait UploadTarget: Send + Sync {
    /// Whether a UI element with this id currently exists.
    fn has_anchor(&self, anchor: &str) -> bool;

    /// Called once per newly tracked file, including files that failed
    /// before they were ever queued.
    fn on_file_add(&self, file: &Arc<FileEntry>, ctx: &FileAddContext<'_>);

    /// Called for queue-level errors that concern no particular file.
    fn on_error(&self, error: &EngineError);

    /// Called when a tracked file's progress changed.
    fn on_progress(&self, _file: &FileEntry) {}
}
