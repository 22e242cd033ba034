use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form transport settings, keyed by option name.
///
/// Used both for a session's effective configuration and for per-file
/// overrides merged on top of it.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Opaque handle identifying one transport engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Anchor registration: which UI trigger a session binds to and where it uploads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorConfig {
    /// Identifier of the element that opens the file picker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browse_button: Option<String>,
    /// Identifier of the drag-and-drop region, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_element: Option<String>,
    /// Destination URL for uploaded files.
    #[serde(default)]
    pub url: String,
    /// Arbitrary engine options passed through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: Settings,
}

impl AnchorConfig {
    /// Creates a configuration uploading to `url` with no anchors.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_browse_button(mut self, id: impl Into<String>) -> Self {
        self.browse_button = Some(id.into());
        self
    }

    pub fn with_drop_element(mut self, id: impl Into<String>) -> Self {
        self.drop_element = Some(id.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// The anchor identifying this binding: the browse button, falling back to
    /// the drop region.
    pub fn anchor(&self) -> Option<&str> {
        self.browse_button
            .as_deref()
            .or(self.drop_element.as_deref())
    }
}

/// A file as reported by the transport engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFile {
    /// Engine-assigned id, unique within its session.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Declared size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Bytes transferred so far.
    #[serde(default)]
    pub loaded: u64,
    #[serde(default)]
    pub percent: u8,
}

impl RawFile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            loaded: 0,
            percent: 0,
        }
    }

    /// Returns a copy reporting `loaded` bytes transferred.
    pub fn with_loaded(mut self, loaded: u64) -> Self {
        self.loaded = loaded;
        self.percent = if self.size == 0 {
            0
        } else {
            (u128::from(loaded.min(self.size)) * 100 / u128::from(self.size)) as u8
        };
        self
    }
}

/// Raw HTTP response delivered with a `FileUploaded` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResponse {
    pub status: u16,
    /// Header block, one `Name: value` pair per line.
    #[serde(default)]
    pub response_headers: String,
    /// Body text, untrimmed.
    #[serde(default)]
    pub response: String,
}

impl RawResponse {
    pub fn new(status: u16, headers: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            response_headers: headers.into(),
            response: body.into(),
        }
    }
}

/// Per-session totals as tracked by the engine itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineTotals {
    /// Files not yet finished: queued or uploading.
    pub queued: usize,
    pub size: u64,
    pub loaded: u64,
}

/// Runtime information reported on `Init`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    /// Name of the runtime the engine selected (e.g. `html5`).
    #[serde(default)]
    pub runtime: String,
    /// Whether the runtime can open a native file dialog.
    #[serde(default = "default_true")]
    pub can_summon_file_dialog: bool,
}

fn default_true() -> bool {
    true
}
