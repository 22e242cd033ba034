//! Upload queue: one logical view over many transport engine sessions.
//!
//! Each UI anchor (browse button, drop region) gets its own transport engine
//! session. The [`UploadQueue`] owns those sessions, turns their lifecycle
//! events into [`FileEntry`] values kept in a single arrival-ordered
//! sequence, and reports aggregate size, loaded bytes and progress across
//! all of them.
//!
//! # Session lifecycle
//!
//! 1. **Configure**: an anchor is registered and a session is created for it.
//! 2. **Supersede**: re-registering the anchor (or calling
//!    [`UploadQueue::orphan`]) retires the previous session. It is torn down
//!    at once when idle, or kept as an *orphan* until it reports completion.
//! 3. **Collect**: orphans are garbage-collected on `UploadComplete`.
//!
//! All mutation happens inside event handlers that run one at a time on the
//! queue owner's task, so the queue itself needs no locking.

pub mod config;
pub mod engine;
pub mod error;
pub mod file;
pub mod queue;
pub mod refresh;
pub mod session;
pub mod target;
pub mod uploader;

#[cfg(test)]
mod test_support;

pub use config::{QueueConfig, SuccessBand};
pub use engine::{EngineFactory, EventSink, TransportEngine};
pub use error::{FileError, QueueError};
pub use file::{Completion, FileEntry, FileOutcome};
pub use queue::UploadQueue;
pub use refresh::RefreshScheduler;
pub use session::{SessionState, UploadSession};
pub use target::{FileAddContext, UploadTarget};
pub use uploader::Uploader;

pub use upqueue_protocol as protocol;
pub use upqueue_response as response;
