//! The aggregation core: sessions in, one file sequence out.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use upqueue_protocol::{AnchorConfig, EngineError, EngineEvent, RawFile, RawResponse, SessionId};
use upqueue_response::parse_response;

use crate::config::QueueConfig;
use crate::engine::{EngineFactory, EventReceiver, EventSender, EventSink, TransportEngine};
use crate::error::{FileError, QueueError};
use crate::file::FileEntry;
use crate::refresh::RefreshScheduler;
use crate::session::{SessionState, UploadSession, effective_settings};
use crate::target::{FileAddContext, UploadTarget};

/// A named queue of uploads spread over any number of engine sessions.
///
/// Engines report through [`EventSink`]s; the owner drains them with
/// [`process_pending`](Self::process_pending) or
/// [`next_event`](Self::next_event), or feeds events directly to
/// [`handle_event`](Self::handle_event).
pub struct UploadQueue {
    name: String,
    config: QueueConfig,
    factory: Arc<dyn EngineFactory>,
    target: Arc<dyn UploadTarget>,
    /// Arrival order across all sessions.
    files: Vec<Arc<FileEntry>>,
    /// Creation order; destroyed sessions are removed.
    sessions: Vec<UploadSession>,
    error: Option<EngineError>,
    refresher: RefreshScheduler,
    events_tx: EventSender,
    events_rx: EventReceiver,
    destroyed: bool,
}

impl UploadQueue {
    pub fn new(
        name: impl Into<String>,
        config: QueueConfig,
        factory: Arc<dyn EngineFactory>,
        target: Arc<dyn UploadTarget>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let refresher = RefreshScheduler::new(config.refresh_delay());
        Self {
            name: name.into(),
            config,
            factory,
            target,
            files: Vec::new(),
            sessions: Vec::new(),
            error: None,
            refresher,
            events_tx,
            events_rx,
            destroyed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Replaces the host collaborator notified of new files and errors,
    /// returning the previous one.
    pub fn set_target(&mut self, target: Arc<dyn UploadTarget>) -> Arc<dyn UploadTarget> {
        std::mem::replace(&mut self.target, target)
    }

    /// Binds a new engine session to the anchor described by `config`.
    ///
    /// A browse button that does not exist is a caller error and no session
    /// is created. An active session already bound to the same anchor is
    /// superseded (see [`orphan`](Self::orphan)).
    pub fn configure(&mut self, config: &AnchorConfig) -> Result<SessionId, QueueError> {
        if self.destroyed {
            return Err(QueueError::Destroyed);
        }
        if let Some(button) = &config.browse_button {
            if !self.target.has_anchor(button) {
                return Err(QueueError::MissingAnchor(button.clone()));
            }
        }

        let id = SessionId::new();
        let sink = EventSink::new(id, self.events_tx.clone());
        let engine = self.factory.create(config, sink)?;
        if let Err(e) = engine.initialize(&effective_settings(config)) {
            warn!(queue = %self.name, error = %e, "engine failed to initialize");
            engine.unbind_all();
            return Err(e.into());
        }

        if let Some(anchor) = config.anchor() {
            let previous = self
                .sessions
                .iter()
                .find(|s| s.is_active() && s.anchor() == Some(anchor))
                .map(UploadSession::id);
            if let Some(previous) = previous {
                self.orphan_session(previous);
            }
        }

        self.sessions.push(UploadSession::new(id, config, engine));
        info!(
            queue = %self.name,
            session = %id,
            anchor = config.anchor().unwrap_or("-"),
            "session configured"
        );
        Ok(id)
    }

    /// Retires the most recently created active session.
    ///
    /// A session with queued files becomes orphaned and keeps draining until
    /// it reports completion; an idle one is torn down at once.
    pub fn orphan(&mut self) -> Option<SessionId> {
        let id = self.sessions.iter().rev().find(|s| s.is_active())?.id();
        self.orphan_session(id);
        Some(id)
    }

    fn orphan_session(&mut self, id: SessionId) {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id() == id) else {
            return;
        };
        let queued = session.queued();
        if queued > 0 {
            session.mark_orphaned();
            info!(queue = %self.name, session = %id, queued, "session orphaned");
        } else {
            self.garbage_collect(id);
        }
    }

    /// Tears a session down: its files are destroyed and dropped from the
    /// sequence and its engine is unbound. Returns `false` if the session
    /// was already gone.
    pub fn garbage_collect(&mut self, id: SessionId) -> bool {
        let Some(pos) = self.sessions.iter().position(|s| s.id() == id) else {
            return false;
        };
        let mut session = self.sessions.remove(pos);
        self.refresher.retire(id);

        let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|f| f.session() == id);
        self.files = kept;
        for file in &gone {
            file.destroy();
        }

        session.teardown();
        info!(
            queue = %self.name,
            session = %id,
            files = gone.len(),
            "session collected"
        );
        true
    }

    /// Unbinds every session and clears the sequence. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.refresher.cancel_all();
        for mut session in self.sessions.drain(..) {
            self.refresher.retire(session.id());
            session.teardown();
        }
        for file in self.files.drain(..) {
            file.destroy();
        }
        info!(queue = %self.name, "queue destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Asks every active session to re-check its anchor now.
    pub fn refresh(&self) {
        for session in self.sessions.iter().filter(|s| s.is_active()) {
            session.engine().refresh();
        }
    }

    /// Tracked files, in arrival order.
    pub fn files(&self) -> &[Arc<FileEntry>] {
        &self.files
    }

    /// First tracked file with this id, in any session.
    pub fn find(&self, id: &str) -> Option<&Arc<FileEntry>> {
        self.files.iter().find(|f| f.id() == id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Whether any file is tracked.
    pub fn uploading(&self) -> bool {
        !self.files.is_empty()
    }

    /// Total declared bytes of tracked files, saturating at `u64::MAX`.
    pub fn size(&self) -> u64 {
        self.files.iter().fold(0u64, |acc, f| acc.saturating_add(f.size()))
    }

    /// Bytes transferred so far across tracked files, saturating at `u64::MAX`.
    pub fn loaded(&self) -> u64 {
        self.files.iter().fold(0u64, |acc, f| acc.saturating_add(f.loaded()))
    }

    /// `floor(100 * loaded / size)`, 0 when nothing is tracked.
    pub fn progress(&self) -> u8 {
        let (loaded, size) = self.wide_totals();
        percent(loaded, size)
    }

    /// Exact `(loaded, size)` sums.
    pub(crate) fn wide_totals(&self) -> (u128, u128) {
        self.files.iter().fold((0u128, 0u128), |(loaded, size), f| {
            (loaded + u128::from(f.loaded()), size + u128::from(f.size()))
        })
    }

    /// The last queue-level error, if any.
    pub fn error(&self) -> Option<&EngineError> {
        self.error.as_ref()
    }

    pub fn sessions(&self) -> &[UploadSession] {
        &self.sessions
    }

    pub fn session(&self, id: SessionId) -> Option<&UploadSession> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    /// Handles every event already delivered. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok((session, event)) = self.events_rx.try_recv() {
            self.handle_event(session, event);
            handled += 1;
        }
        handled
    }

    /// Waits for the next event and handles it.
    pub async fn next_event(&mut self) {
        // The queue holds a sender itself, so the channel never closes.
        if let Some((session, event)) = self.events_rx.recv().await {
            self.handle_event(session, event);
        }
    }

    /// Applies one engine event.
    ///
    /// Events for sessions that were collected, or for a destroyed queue,
    /// are ignored.
    pub fn handle_event(&mut self, session: SessionId, event: EngineEvent) {
        if self.destroyed {
            debug!(queue = %self.name, event = event.name(), "queue destroyed, ignoring event");
            return;
        }
        let Some((state, engine)) = self
            .session(session)
            .map(|s| (s.state(), Arc::clone(s.engine())))
        else {
            warn!(
                queue = %self.name,
                session = %session,
                event = event.name(),
                "ignoring event from unknown session"
            );
            return;
        };
        trace!(queue = %self.name, session = %session, event = event.name(), "engine event");

        match event {
            EngineEvent::Init { runtime } => {
                if !runtime.can_summon_file_dialog {
                    debug!(session = %session, runtime = %runtime.runtime, "no file dialog, enabling capture");
                    engine.enable_capture_fallback();
                }
                if let Some(s) = self.sessions.iter_mut().find(|s| s.id() == session) {
                    s.set_runtime(runtime);
                }
            }
            EngineEvent::FilesAdded { files } => self.files_added(session, &engine, files),
            EngineEvent::FilesRemoved { files } => self.files_removed(session, files),
            EngineEvent::BeforeUpload { file } => {
                let overrides = self
                    .position(session, &file.id)
                    .map(|pos| self.files[pos].settings())
                    .unwrap_or_default();
                if let Some(s) = self.session(session) {
                    engine.apply_settings(s.settings_for(&overrides));
                }
                self.progress_changed(session, &file);
            }
            EngineEvent::UploadProgress { file } => self.progress_changed(session, &file),
            EngineEvent::FileUploaded { file, response } => {
                self.file_uploaded(session, &file, &response);
                self.refresher.schedule(session, engine);
            }
            EngineEvent::UploadComplete => {
                self.refresher.schedule(session, engine);
                if state == SessionState::Orphaned {
                    self.garbage_collect(session);
                }
            }
            EngineEvent::Error { error } => match error.file.clone() {
                Some(raw) => {
                    self.file_failed(session, &engine, &raw, error);
                    self.refresher.schedule(session, engine);
                }
                None => {
                    warn!(queue = %self.name, session = %session, error = %error, "queue error");
                    self.target.on_error(&error);
                    self.error = Some(error);
                }
            },
        }
    }

    fn position(&self, session: SessionId, id: &str) -> Option<usize> {
        self.files
            .iter()
            .position(|f| f.session() == session && f.id() == id)
    }

    fn new_entry(&self, session: SessionId, engine: &Arc<dyn TransportEngine>, raw: &RawFile) -> Arc<FileEntry> {
        Arc::new(FileEntry::new(
            raw,
            session,
            &self.name,
            Arc::clone(engine),
            self.refresher.clone(),
        ))
    }

    fn announce(&self, session: SessionId, entry: &Arc<FileEntry>) {
        let ctx = FileAddContext {
            queue_name: &self.name,
            session,
            queue: self,
        };
        self.target.on_file_add(entry, &ctx);
    }

    fn files_added(&mut self, session: SessionId, engine: &Arc<dyn TransportEngine>, files: Vec<RawFile>) {
        for raw in files {
            if self.position(session, &raw.id).is_some() {
                debug!(session = %session, file = %raw.id, "file already tracked");
                continue;
            }
            let entry = self.new_entry(session, engine, &raw);
            self.files.push(Arc::clone(&entry));
            debug!(
                queue = %self.name,
                session = %session,
                file = %raw.id,
                name = %raw.name,
                size = raw.size,
                "file added"
            );
            self.announce(session, &entry);
        }
    }

    fn files_removed(&mut self, session: SessionId, files: Vec<RawFile>) {
        for raw in files {
            if let Some(pos) = self.position(session, &raw.id) {
                self.files.remove(pos);
                debug!(queue = %self.name, session = %session, file = %raw.id, "file removed");
            }
        }
    }

    fn progress_changed(&mut self, session: SessionId, file: &RawFile) {
        let Some(pos) = self.position(session, &file.id) else {
            return;
        };
        let entry = Arc::clone(&self.files[pos]);
        entry.set_loaded(file.loaded);
        trace!(
            file = %file.id,
            loaded = entry.loaded(),
            percent = entry.percent(),
            queue_progress = self.progress(),
            "upload progress"
        );
        self.target.on_progress(&entry);
    }

    fn file_uploaded(&mut self, session: SessionId, file: &RawFile, response: &RawResponse) {
        let Some(pos) = self.position(session, &file.id) else {
            warn!(queue = %self.name, session = %session, file = %file.id, "upload finished for untracked file");
            return;
        };
        let entry = self.files.remove(pos);

        let outcome = match parse_response(response) {
            Ok(parsed) if self.config.success_band.is_success(parsed.status) => Ok(parsed),
            Ok(parsed) => Err(FileError::Http(parsed)),
            Err(source) => {
                warn!(file = %file.id, status = response.status, error = %source, "unparseable response");
                Err(FileError::MalformedResponse {
                    status: response.status,
                    source,
                })
            }
        };
        debug!(
            queue = %self.name,
            file = %file.id,
            status = response.status,
            success = outcome.is_ok(),
            "file uploaded"
        );
        entry.settle(outcome);
    }

    fn file_failed(
        &mut self,
        session: SessionId,
        engine: &Arc<dyn TransportEngine>,
        raw: &RawFile,
        error: EngineError,
    ) {
        if let Some(pos) = self.position(session, &raw.id) {
            let entry = Arc::clone(&self.files[pos]);
            warn!(queue = %self.name, file = %raw.id, error = %error, "file failed");
            entry.record_error(error.clone());
            entry.settle(Err(FileError::Transport(error)));
            return;
        }

        // Failed before it was queued: no FilesAdded fired, so the host has
        // never seen this file.
        warn!(queue = %self.name, file = %raw.id, error = %error, "file rejected before queueing");
        let entry = self.new_entry(session, engine, raw);
        entry.record_error(error.clone());
        entry.settle(Err(FileError::Transport(error)));
        entry.mark_failed_before_queue();
        self.announce(session, &entry);
        entry.destroy();
    }
}

pub(crate) fn percent(loaded: u128, size: u128) -> u8 {
    if size == 0 {
        return 0;
    }
    (loaded.min(size).saturating_mul(100) / size) as u8
}

impl fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadQueue")
            .field("name", &self.name)
            .field("files", &self.files.len())
            .field("sessions", &self.sessions)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl Drop for UploadQueue {
    fn drop(&mut self) {
        self.refresher.cancel_all();
    }
}
