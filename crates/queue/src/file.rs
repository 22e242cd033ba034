//! A single tracked file and its completion signal.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use upqueue_protocol::{EngineError, RawFile, SessionId, Settings};
use upqueue_response::UploadResponse;

use crate::engine::TransportEngine;
use crate::error::FileError;
use crate::refresh::RefreshScheduler;

/// How a file's upload ended.
pub type FileOutcome = Result<UploadResponse, FileError>;

/// One file being uploaded through a session.
///
/// Entries are shared as `Arc<FileEntry>`: the queue drops its reference
/// when the file leaves the unified sequence, but the host may keep one to
/// inspect the outcome. The completion signal is settled at most once.
pub struct FileEntry {
    id: String,
    name: String,
    size: u64,
    session: SessionId,
    queue_name: String,
    engine: Arc<dyn TransportEngine>,
    refresher: RefreshScheduler,
    state: Mutex<FileState>,
    outcome: watch::Sender<Option<FileOutcome>>,
}

#[derive(Default)]
struct FileState {
    loaded: u64,
    settings: Settings,
    error: Option<EngineError>,
    /// Failed before it was queued; transfer operations fail immediately.
    stubbed: bool,
    destroyed: bool,
}

impl FileEntry {
    pub(crate) fn new(
        raw: &RawFile,
        session: SessionId,
        queue_name: &str,
        engine: Arc<dyn TransportEngine>,
        refresher: RefreshScheduler,
    ) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            size: raw.size,
            session,
            queue_name: queue_name.to_string(),
            engine,
            refresher,
            state: Mutex::new(FileState {
                loaded: raw.loaded.min(raw.size),
                ..FileState::default()
            }),
            outcome,
        }
    }

    fn state(&self) -> MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Engine-assigned id, unique within the owning session.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes transferred so far; never exceeds [`size`](Self::size).
    pub fn loaded(&self) -> u64 {
        self.state().loaded
    }

    /// Whole-percent progress, 0 when the file is empty.
    pub fn percent(&self) -> u8 {
        if self.size == 0 {
            return 0;
        }
        (u128::from(self.loaded()) * 100 / u128::from(self.size)) as u8
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Per-file settings merged over the session template before dispatch.
    pub fn settings(&self) -> Settings {
        self.state().settings.clone()
    }

    pub fn set_settings(&self, settings: Settings) {
        self.state().settings = settings;
    }

    /// The last transport error reported for this file.
    pub fn error(&self) -> Option<EngineError> {
        self.state().error.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    /// Whether the file failed before it was ever queued.
    pub fn failed_before_queue(&self) -> bool {
        self.state().stubbed
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// The outcome, if the upload has settled.
    pub fn outcome(&self) -> Option<FileOutcome> {
        self.outcome.borrow().clone()
    }

    /// A handle resolving once the upload settles.
    pub fn completion(&self) -> Completion {
        Completion {
            rx: self.outcome.subscribe(),
        }
    }

    /// Requests the upload of this file.
    ///
    /// `overrides`, when given, are merged into the per-file settings before
    /// the owning session is asked to start dispatching. Files that failed
    /// before being queued fail immediately with their recorded error.
    pub fn upload(&self, overrides: Option<Settings>) -> Result<Completion, FileError> {
        {
            let mut state = self.state();
            if state.stubbed {
                let error = state.error.clone();
                drop(state);
                self.refresher.schedule(self.session, Arc::clone(&self.engine));
                return Err(error.map_or(FileError::SessionDestroyed, FileError::Transport));
            }
            if state.destroyed {
                return Err(FileError::SessionDestroyed);
            }
            if let Some(overrides) = overrides {
                state.settings.extend(overrides);
            }
        }
        self.engine.start();
        Ok(self.completion())
    }

    pub(crate) fn set_loaded(&self, loaded: u64) {
        self.state().loaded = loaded.min(self.size);
    }

    pub(crate) fn record_error(&self, error: EngineError) {
        self.state().error = Some(error);
    }

    pub(crate) fn mark_failed_before_queue(&self) {
        self.state().stubbed = true;
    }

    /// Settles the completion signal. Returns `false` if it was already settled.
    pub(crate) fn settle(&self, outcome: FileOutcome) -> bool {
        self.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    /// Marks the entry destroyed, rejecting it if nothing settled it yet.
    pub(crate) fn destroy(&self) {
        self.state().destroyed = true;
        self.settle(Err(FileError::SessionDestroyed));
    }
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("loaded", &self.loaded())
            .field("session", &self.session)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Awaitable view of a file's completion signal.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<FileOutcome>>,
}

impl Completion {
    /// Waits for the upload to settle.
    ///
    /// Resolves to [`FileError::Dropped`] if the entry is dropped unsettled.
    pub async fn wait(mut self) -> FileOutcome {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(FileError::Dropped))
    }

    /// The outcome, if already settled.
    pub fn peek(&self) -> Option<FileOutcome> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use upqueue_response::Body;

    use super::*;
    use crate::test_support::MockEngine;

    fn entry(engine: &Arc<MockEngine>, raw: RawFile) -> FileEntry {
        FileEntry::new(
            &raw,
            SessionId::new(),
            "photos",
            engine.clone(),
            RefreshScheduler::new(Duration::from_millis(750)),
        )
    }

    fn ok_response(status: u16) -> UploadResponse {
        UploadResponse {
            status,
            body: Body::Raw("ok".into()),
            headers: HashMap::new(),
        }
    }

    #[test]
    fn loaded_is_clamped_to_size() {
        let engine = MockEngine::detached();
        let file = entry(&engine, RawFile::new("f1", "a.jpg", 100).with_loaded(250));
        assert_eq!(file.loaded(), 100);
        file.set_loaded(40);
        assert_eq!(file.loaded(), 40);
        assert_eq!(file.percent(), 40);
        file.set_loaded(1000);
        assert_eq!(file.loaded(), 100);
        assert_eq!(file.percent(), 100);
    }

    #[test]
    fn empty_file_reports_zero_percent() {
        let engine = MockEngine::detached();
        let file = entry(&engine, RawFile::new("f1", "empty.txt", 0));
        assert_eq!(file.percent(), 0);
    }

    #[test]
    fn settles_exactly_once() {
        let engine = MockEngine::detached();
        let file = entry(&engine, RawFile::new("f1", "a.jpg", 10));
        assert!(!file.is_settled());
        assert!(file.settle(Ok(ok_response(201))));
        assert!(!file.settle(Err(FileError::SessionDestroyed)));
        assert!(matches!(file.outcome(), Some(Ok(ref r)) if r.status == 201));
    }

    #[test]
    fn destroy_rejects_unsettled_entry() {
        let engine = MockEngine::detached();
        let file = entry(&engine, RawFile::new("f1", "a.jpg", 10));
        file.destroy();
        assert!(file.is_destroyed());
        assert_eq!(file.outcome(), Some(Err(FileError::SessionDestroyed)));
    }

    #[test]
    fn destroy_keeps_earlier_outcome() {
        let engine = MockEngine::detached();
        let file = entry(&engine, RawFile::new("f1", "a.jpg", 10));
        file.settle(Ok(ok_response(200)));
        file.destroy();
        assert!(matches!(file.outcome(), Some(Ok(_))));
    }

    #[test]
    fn upload_merges_overrides_and_starts_engine() {
        let engine = MockEngine::detached();
        let file = entry(&engine, RawFile::new("f1", "a.jpg", 10));
        let mut first = Settings::new();
        first.insert("multipart".into(), serde_json::json!(true));
        file.set_settings(first);

        let mut overrides = Settings::new();
        overrides.insert("headers".into(), serde_json::json!({"X-Key": "k"}));
        let completion = file.upload(Some(overrides)).unwrap();

        assert_eq!(engine.start_count(), 1);
        assert_eq!(file.settings().len(), 2);
        assert!(completion.peek().is_none());
    }

    #[test]
    fn stubbed_upload_fails_immediately_and_refreshes() {
        let engine = MockEngine::detached();
        let file = entry(&engine, RawFile::new("f1", "huge.iso", 10));
        let error = EngineError::new(-600, "File size error.");
        file.record_error(error.clone());
        file.mark_failed_before_queue();

        let result = file.upload(None);
        assert_eq!(result.unwrap_err(), FileError::Transport(error));
        assert_eq!(engine.start_count(), 0);
        assert_eq!(engine.refresh_count(), 1);
    }

    #[test]
    fn destroyed_entry_refuses_upload() {
        let engine = MockEngine::detached();
        let file = entry(&engine, RawFile::new("f1", "a.jpg", 10));
        file.destroy();
        assert_eq!(file.upload(None).unwrap_err(), FileError::SessionDestroyed);
    }

    #[tokio::test]
    async fn completion_resolves_for_every_waiter() {
        let engine = MockEngine::detached();
        let file = Arc::new(entry(&engine, RawFile::new("f1", "a.jpg", 10)));
        let first = file.completion();
        let second = file.completion();

        let settler = Arc::clone(&file);
        tokio::spawn(async move {
            settler.settle(Ok(ok_response(200)));
        });

        assert_eq!(first.wait().await.unwrap().status, 200);
        assert_eq!(second.wait().await.unwrap().status, 200);
    }

    #[tokio::test]
    async fn completion_reports_dropped_entry() {
        let engine = MockEngine::detached();
        let file = entry(&engine, RawFile::new("f1", "a.jpg", 10));
        let completion = file.completion();
        drop(file);
        assert_eq!(completion.wait().await, Err(FileError::Dropped));
    }
}
