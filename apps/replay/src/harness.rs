//! Scripted engine and host used to replay traces.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{info, warn};
use upqueue_protocol::{
    AnchorConfig, EngineError, EngineEvent, EngineTotals, SessionId, Settings,
};
use upqueue_queue::{
    EngineFactory, EventSink, FileAddContext, FileEntry, QueueConfig, TransportEngine,
    UploadQueue, UploadTarget,
};

use crate::trace::{Step, Trace};

/// Engine driven entirely by the trace.
///
/// A file counts as queued from `FilesAdded` until it is uploaded, fails or
/// is removed, the way a live engine counts unfinished files.
pub struct ReplayEngine {
    sink: Mutex<Option<EventSink>>,
    pending: Mutex<HashSet<String>>,
}

impl ReplayEngine {
    fn new(sink: EventSink) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Forwards a scripted event to the queue.
    pub fn feed(&self, event: EngineEvent) {
        self.track(&event);
        let sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        match sink.as_ref() {
            Some(sink) => {
                sink.emit(event);
            }
            None => warn!(event = event.name(), "engine unbound, dropping event"),
        }
    }

    fn track(&self, event: &EngineEvent) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match event {
            EngineEvent::FilesAdded { files } => {
                pending.extend(files.iter().map(|f| f.id.clone()));
            }
            EngineEvent::FilesRemoved { files } => {
                for file in files {
                    pending.remove(&file.id);
                }
            }
            EngineEvent::FileUploaded { file, .. } => {
                pending.remove(&file.id);
            }
            EngineEvent::Error { error } => {
                if let Some(file) = &error.file {
                    pending.remove(&file.id);
                }
            }
            _ => {}
        }
    }
}

impl TransportEngine for ReplayEngine {
    fn initialize(&self, settings: &Settings) -> Result<(), EngineError> {
        info!(options = settings.len(), "engine initialized");
        Ok(())
    }

    fn refresh(&self) {
        tracing::debug!("anchor refreshed");
    }

    fn unbind_all(&self) {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn apply_settings(&self, settings: Settings) {
        tracing::debug!(keys = ?settings.keys().collect::<Vec<_>>(), "settings applied");
    }

    fn start(&self) {
        tracing::debug!("engine started");
    }

    fn totals(&self) -> EngineTotals {
        EngineTotals {
            queued: self.pending.lock().unwrap_or_else(|e| e.into_inner()).len(),
            ..EngineTotals::default()
        }
    }
}

#[derive(Default)]
pub struct ReplayFactory {
    created: Mutex<Vec<Arc<ReplayEngine>>>,
}

impl ReplayFactory {
    fn last(&self) -> Option<Arc<ReplayEngine>> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl EngineFactory for ReplayFactory {
    fn create(
        &self,
        _config: &AnchorConfig,
        events: EventSink,
    ) -> Result<Arc<dyn TransportEngine>, EngineError> {
        let engine = Arc::new(ReplayEngine::new(events));
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&engine));
        Ok(engine)
    }
}

/// Host page: every anchor exists unless the trace says otherwise.
pub struct ReplayTarget {
    missing: HashSet<String>,
    seen: Mutex<Vec<Arc<FileEntry>>>,
    errors: Mutex<Vec<String>>,
}

impl ReplayTarget {
    fn new(missing: &[String]) -> Self {
        Self {
            missing: missing.iter().cloned().collect(),
            seen: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }
}

impl UploadTarget for ReplayTarget {
    fn has_anchor(&self, anchor: &str) -> bool {
        !self.missing.contains(anchor)
    }

    fn on_file_add(&self, file: &Arc<FileEntry>, ctx: &FileAddContext<'_>) {
        info!(
            queue = ctx.queue_name,
            session = %ctx.session,
            file = file.id(),
            tracked = ctx.queue.len(),
            queue_size = ctx.queue.size(),
            "file announced"
        );
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(file));
    }

    fn on_error(&self, error: &EngineError) {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(error.to_string());
    }
}

/// Final state of one announced file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub id: String,
    pub name: String,
    /// `uploaded`, `failed` or `pending`.
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    fn of(file: &FileEntry) -> Self {
        let (state, status, error) = match file.outcome() {
            None => ("pending", None, None),
            Some(Ok(resp)) => ("uploaded", Some(resp.status), None),
            Some(Err(e)) => ("failed", e.response().map(|r| r.status), Some(e.to_string())),
        };
        Self {
            id: file.id().to_string(),
            name: file.name().to_string(),
            state,
            status,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub queue: String,
    pub files: usize,
    pub size: u64,
    pub loaded: u64,
    pub progress: u8,
    pub outcomes: Vec<Outcome>,
    pub errors: Vec<String>,
}

/// Runs every step of `trace` against a fresh queue.
///
/// Step failures (a missing anchor, an upload the queue refuses) are logged
/// and reported in the summary; only a malformed trace aborts the replay.
pub fn run(trace: &Trace, config: QueueConfig) -> Result<Summary> {
    let factory = Arc::new(ReplayFactory::default());
    let target = Arc::new(ReplayTarget::new(&trace.missing_anchors));
    let mut queue = UploadQueue::new(&trace.queue, config, factory.clone(), target.clone());
    let mut sessions: Vec<(SessionId, Arc<ReplayEngine>)> = Vec::new();
    let mut errors = Vec::new();

    for (index, step) in trace.steps.iter().enumerate() {
        match step {
            Step::Configure { config } => match queue.configure(config) {
                Ok(id) => {
                    if let Some(engine) = factory.last() {
                        sessions.push((id, engine));
                    }
                }
                Err(e) => {
                    warn!(step = index, error = %e, "configure failed");
                    errors.push(format!("step {index}: {e}"));
                }
            },
            Step::Event { session, event } => {
                let Some((_, engine)) = sessions.get(*session) else {
                    bail!("step {index}: no session #{session} has been configured");
                };
                engine.feed(event.clone());
            }
            Step::Orphan => {
                queue.orphan();
            }
            Step::Refresh => queue.refresh(),
            Step::Upload { file, settings } => match queue.find(file) {
                Some(entry) => {
                    if let Err(e) = entry.upload(settings.clone()) {
                        warn!(step = index, file = %file, error = %e, "upload refused");
                        errors.push(format!("step {index}: {e}"));
                    }
                }
                None => {
                    warn!(step = index, file = %file, "upload requested for untracked file");
                    errors.push(format!("step {index}: no tracked file {file}"));
                }
            },
        }
        queue.process_pending();
        info!(
            step = index,
            op = step.name(),
            files = queue.len(),
            size = queue.size(),
            loaded = queue.loaded(),
            progress = queue.progress(),
            "step replayed"
        );
    }

    errors.extend(
        target
            .errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned(),
    );
    let outcomes = target
        .seen
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .map(|f| Outcome::of(f))
        .collect();

    Ok(Summary {
        queue: trace.queue.clone(),
        files: queue.len(),
        size: queue.size(),
        loaded: queue.loaded(),
        progress: queue.progress(),
        outcomes,
        errors,
    })
}
