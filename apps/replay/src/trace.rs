//! Recorded trace format.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use upqueue_protocol::{AnchorConfig, EngineEvent, Settings};

/// A scripted run against one queue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub queue: String,
    /// Anchors the page does not have; binding to them fails.
    #[serde(default)]
    pub missing_anchors: Vec<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    /// Binds a new session.
    Configure { config: AnchorConfig },
    /// Feeds an engine event to the `session`th configured session.
    Event { session: usize, event: EngineEvent },
    Orphan,
    Refresh,
    /// Requests the upload of a tracked file.
    Upload {
        file: String,
        #[serde(default)]
        settings: Option<Settings>,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Configure { .. } => "configure",
            Step::Event { .. } => "event",
            Step::Orphan => "orphan",
            Step::Refresh => "refresh",
            Step::Upload { .. } => "upload",
        }
    }
}

impl Trace {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading trace {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing trace {}", path.display()))
    }
}
