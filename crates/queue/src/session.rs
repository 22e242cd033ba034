//! One bound transport engine instance.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use upqueue_protocol::{AnchorConfig, RuntimeInfo, SessionId, Settings};

use crate::engine::TransportEngine;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Bound to its anchor and accepting new files.
    Active,
    /// Superseded; kept alive only to drain files it already queued.
    Orphaned,
    /// Unbound and removed from its queue.
    Destroyed,
}

/// A transport engine bound to one anchor.
pub struct UploadSession {
    id: SessionId,
    anchor: Option<String>,
    engine: Arc<dyn TransportEngine>,
    template: Settings,
    state: SessionState,
    runtime: Option<RuntimeInfo>,
}

impl UploadSession {
    pub(crate) fn new(
        id: SessionId,
        config: &AnchorConfig,
        engine: Arc<dyn TransportEngine>,
    ) -> Self {
        let mut template = effective_settings(config);
        template.remove("url");
        Self {
            id,
            anchor: config.anchor().map(str::to_string),
            engine,
            template,
            state: SessionState::Active,
            runtime: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The anchor this session is (or was) bound to.
    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn is_orphaned(&self) -> bool {
        self.state == SessionState::Orphaned
    }

    /// Runtime reported by the engine's `Init` event.
    pub fn runtime(&self) -> Option<&RuntimeInfo> {
        self.runtime.as_ref()
    }

    /// Initialization settings minus the destination URL.
    pub fn template(&self) -> &Settings {
        &self.template
    }

    /// Files the engine has not finished yet (queued or uploading).
    pub fn queued(&self) -> usize {
        self.engine.totals().queued
    }

    pub(crate) fn engine(&self) -> &Arc<dyn TransportEngine> {
        &self.engine
    }

    /// A fresh copy of the template with `overrides` merged on top.
    pub fn settings_for(&self, overrides: &Settings) -> Settings {
        let mut settings = self.template.clone();
        for (key, value) in overrides {
            settings.insert(key.clone(), value.clone());
        }
        settings
    }

    pub(crate) fn set_runtime(&mut self, runtime: RuntimeInfo) {
        self.runtime = Some(runtime);
    }

    pub(crate) fn mark_orphaned(&mut self) {
        if self.state == SessionState::Active {
            self.state = SessionState::Orphaned;
        }
    }

    /// Detaches the engine. Safe to call more than once.
    pub(crate) fn teardown(&mut self) {
        if self.state != SessionState::Destroyed {
            self.state = SessionState::Destroyed;
            self.engine.unbind_all();
        }
    }
}

impl fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSession")
            .field("id", &self.id)
            .field("anchor", &self.anchor)
            .field("state", &self.state)
            .finish()
    }
}

/// Settings an engine is initialized with: the anchor's options plus the
/// destination URL and the anchor ids, each given as a one-element list.
pub(crate) fn effective_settings(config: &AnchorConfig) -> Settings {
    let mut settings = config.options.clone();
    settings.insert("url".into(), config.url.clone().into());
    if let Some(id) = &config.browse_button {
        settings.insert("browse_button".into(), serde_json::json!([id]));
    }
    if let Some(id) = &config.drop_element {
        settings.insert("drop_element".into(), serde_json::json!([id]));
    }
    settings
}
