//! Debounced anchor refreshes.
//!
//! Uploading can shift an anchor on screen, so sessions are asked to refresh
//! shortly after each upload, completion or error. Requests for the same
//! session coalesce: scheduling again cancels the pending timer and starts a
//! new one, so a burst of events yields a single refresh. Sessions that were
//! torn down are retired and never refreshed again.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;
use upqueue_protocol::SessionId;

use crate::engine::TransportEngine;

#[derive(Default)]
struct Slots {
    pending: HashMap<SessionId, (u64, CancellationToken)>,
    retired: HashSet<SessionId>,
}

/// Schedules one-shot, per-session delayed refreshes.
#[derive(Clone)]
pub struct RefreshScheduler {
    delay: Duration,
    slots: Arc<Mutex<Slots>>,
    generation: Arc<AtomicU64>,
}

impl RefreshScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slots: Arc::new(Mutex::new(Slots::default())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules `engine.refresh()` after the delay, replacing any refresh
    /// already pending for `session`.
    ///
    /// Outside a tokio runtime there is no timer to wait on, so the refresh
    /// runs immediately. Retired sessions are ignored.
    pub fn schedule(&self, session: SessionId, engine: Arc<dyn TransportEngine>) {
        if lock(&self.slots).retired.contains(&session) {
            trace!(session = %session, "session retired, skipping refresh");
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            trace!(session = %session, "no runtime, refreshing immediately");
            engine.refresh();
            return;
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        if let Some((_, previous)) = lock(&self.slots)
            .pending
            .insert(session, (generation, token.clone()))
        {
            previous.cancel();
        }

        let slots = Arc::clone(&self.slots);
        let delay = self.delay;
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let current = {
                        let mut slots = lock(&slots);
                        let current = slots
                            .pending
                            .get(&session)
                            .is_some_and(|(g, _)| *g == generation);
                        if current {
                            slots.pending.remove(&session);
                        }
                        current
                    };
                    if current {
                        trace!(session = %session, "refreshing anchor");
                        engine.refresh();
                    }
                }
            }
        });
    }

    /// Drops the pending refresh for `session`, if any.
    pub fn cancel(&self, session: SessionId) {
        if let Some((_, token)) = lock(&self.slots).pending.remove(&session) {
            token.cancel();
        }
    }

    /// Cancels any pending refresh for `session` and ignores later requests.
    pub fn retire(&self, session: SessionId) {
        let mut slots = lock(&self.slots);
        if let Some((_, token)) = slots.pending.remove(&session) {
            token.cancel();
        }
        slots.retired.insert(session);
    }

    /// Drops every pending refresh.
    pub fn cancel_all(&self) {
        for (_, (_, token)) in lock(&self.slots).pending.drain() {
            token.cancel();
        }
    }

    /// Number of sessions with a refresh pending.
    pub fn pending(&self) -> usize {
        lock(&self.slots).pending.len()
    }
}

fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}
