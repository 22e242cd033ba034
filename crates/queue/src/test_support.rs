//! Recording mocks for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use upqueue_protocol::{
    AnchorConfig, EngineError, EngineEvent, EngineTotals, SessionId, Settings,
};

use crate::engine::{EngineFactory, EventSink, TransportEngine};
use crate::file::FileEntry;
use crate::target::{FileAddContext, UploadTarget};

#[derive(Default)]
pub struct MockEngine {
    refreshes: AtomicUsize,
    unbinds: AtomicUsize,
    starts: AtomicUsize,
    queued: AtomicUsize,
    capture_fallback: AtomicBool,
    fail_init: AtomicBool,
    initialized: Mutex<Option<Settings>>,
    applied: Mutex<Vec<Settings>>,
    sink: Mutex<Option<EventSink>>,
}

impl MockEngine {
    /// An engine whose events go nowhere.
    pub fn detached() -> Arc<Self> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = Self::default();
        *engine.sink.lock().unwrap() = Some(EventSink::new(SessionId::new(), tx));
        Arc::new(engine)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn unbind_count(&self) -> usize {
        self.unbinds.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn set_queued(&self, queued: usize) {
        self.queued.store(queued, Ordering::SeqCst);
    }

    pub fn capture_fallback(&self) -> bool {
        self.capture_fallback.load(Ordering::SeqCst)
    }

    pub fn initialized(&self) -> Option<Settings> {
        self.initialized.lock().unwrap().clone()
    }

    pub fn applied(&self) -> Vec<Settings> {
        self.applied.lock().unwrap().clone()
    }

    /// Emits an event as this engine's session.
    pub fn emit(&self, event: EngineEvent) {
        let sink = self.sink.lock().unwrap();
        sink.as_ref().expect("engine has a sink").emit(event);
    }
}

impl TransportEngine for MockEngine {
    fn initialize(&self, settings: &Settings) -> Result<(), EngineError> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(EngineError::new(-500, "Init error."));
        }
        *self.initialized.lock().unwrap() = Some(settings.clone());
        Ok(())
    }

    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn unbind_all(&self) {
        self.unbinds.fetch_add(1, Ordering::SeqCst);
    }

    fn apply_settings(&self, settings: Settings) {
        self.applied.lock().unwrap().push(settings);
    }

    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn totals(&self) -> EngineTotals {
        EngineTotals {
            queued: self.queued.load(Ordering::SeqCst),
            ..EngineTotals::default()
        }
    }

    fn enable_capture_fallback(&self) {
        self.capture_fallback.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockFactory {
    engines: Mutex<Vec<Arc<MockEngine>>>,
    pub fail_init: AtomicBool,
    pub fail_create: AtomicBool,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The engine created by the `n`th successful `create` call.
    pub fn engine(&self, n: usize) -> Arc<MockEngine> {
        Arc::clone(&self.engines.lock().unwrap()[n])
    }

    pub fn created(&self) -> usize {
        self.engines.lock().unwrap().len()
    }
}

impl EngineFactory for MockFactory {
    fn create(
        &self,
        _config: &AnchorConfig,
        events: EventSink,
    ) -> Result<Arc<dyn TransportEngine>, EngineError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::new(-500, "runtime unavailable"));
        }
        let engine = Arc::new(MockEngine {
            fail_init: AtomicBool::new(self.fail_init.load(Ordering::SeqCst)),
            sink: Mutex::new(Some(events)),
            ..MockEngine::default()
        });
        self.engines.lock().unwrap().push(Arc::clone(&engine));
        Ok(engine)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedFile {
    pub id: String,
    pub queue: String,
    pub session: SessionId,
    pub failed_before_queue: bool,
    /// Files tracked by the queue when this one was announced.
    pub tracked: usize,
}

#[derive(Default)]
pub struct MockTarget {
    anchors: Mutex<HashSet<String>>,
    added: Mutex<Vec<AddedFile>>,
    entries: Mutex<Vec<Arc<FileEntry>>>,
    errors: Mutex<Vec<EngineError>>,
    progress: AtomicUsize,
}

impl MockTarget {
    pub fn with_anchors(anchors: &[&str]) -> Arc<Self> {
        let target = Self::default();
        target
            .anchors
            .lock()
            .unwrap()
            .extend(anchors.iter().map(|a| a.to_string()));
        Arc::new(target)
    }

    pub fn added(&self) -> Vec<AddedFile> {
        self.added.lock().unwrap().clone()
    }

    /// Entries handed to `on_file_add`, kept alive like a host would.
    pub fn entries(&self) -> Vec<Arc<FileEntry>> {
        self.entries.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<EngineError> {
        self.errors.lock().unwrap().clone()
    }

    pub fn progress_ticks(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }
}

impl UploadTarget for MockTarget {
    fn has_anchor(&self, anchor: &str) -> bool {
        self.anchors.lock().unwrap().contains(anchor)
    }

    fn on_file_add(&self, file: &Arc<FileEntry>, ctx: &FileAddContext<'_>) {
        self.added.lock().unwrap().push(AddedFile {
            id: file.id().to_string(),
            queue: ctx.queue_name.to_string(),
            session: ctx.session,
            failed_before_queue: file.failed_before_queue(),
            tracked: ctx.queue.len(),
        });
        self.entries.lock().unwrap().push(Arc::clone(file));
    }

    fn on_error(&self, error: &EngineError) {
        self.errors.lock().unwrap().push(error.clone());
    }

    fn on_progress(&self, _file: &FileEntry) {
        self.progress.fetch_add(1, Ordering::SeqCst);
    }
}
