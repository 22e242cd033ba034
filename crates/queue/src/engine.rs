//! Transport engine capability traits.
//!
//! The queue never performs I/O itself. Hosts plug in an [`EngineFactory`]
//! that creates one [`TransportEngine`] per anchor registration; engines
//! report back through the [`EventSink`] they were created with.

use std::sync::Arc;

use tokio::sync::mpsc;
use upqueue_protocol::{AnchorConfig, EngineError, EngineEvent, EngineTotals, SessionId, Settings};

/// One bound instance of the transport engine.
///
/// Methods take `&self`; implementations keep their own interior state so a
/// handle can be shared between the queue and the entries it owns.
pub trait TransportEngine: Send + Sync {
    /// Initializes the engine with its effective settings and wires the
    /// anchor to the engine's trigger mechanism.
    fn initialize(&self, settings: &Settings) -> Result<(), EngineError>;

    /// Re-checks the anchor's position and size.
    fn refresh(&self);

    /// Detaches every event listener; the engine emits nothing afterwards.
    fn unbind_all(&self);

    /// Replaces the settings used for the next dispatched file.
    fn apply_settings(&self, settings: Settings);

    /// Begins dispatching queued files.
    fn start(&self);

    /// Current per-session totals. `queued` counts every file that has not
    /// finished, including one mid-transfer.
    fn totals(&self) -> EngineTotals;

    /// Falls back to camera capture on runtimes without a file dialog.
    fn enable_capture_fallback(&self) {}
}

/// Creates transport engines for anchor registrations.
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        config: &AnchorConfig,
        events: EventSink,
    ) -> Result<Arc<dyn TransportEngine>, EngineError>;
}

pub(crate) type EventSender = mpsc::UnboundedSender<(SessionId, EngineEvent)>;
pub(crate) type EventReceiver = mpsc::UnboundedReceiver<(SessionId, EngineEvent)>;

/// Delivers one session's events to its queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: EventSender,
}

impl EventSink {
    pub(crate) fn new(session: SessionId, tx: EventSender) -> Self {
        Self { session, tx }
    }

    /// The session these events are attributed to.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Queues an event for the owning queue.
    ///
    /// Returns `false` once the queue has been dropped.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx.send((self.session, event)).is_ok()
    }
}
