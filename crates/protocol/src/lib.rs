//! Value types exchanged between upload queues and transport engines.
//!
//! A transport engine performs the actual byte transfer for one session and
//! reports what happens through the closed [`EngineEvent`] set. Everything in
//! this crate is plain data and serializes with camelCase field names so
//! traces can be recorded and replayed.

pub mod events;
pub mod types;

pub use events::{EngineError, EngineEvent};
pub use types::{
    AnchorConfig, EngineTotals, RawFile, RawResponse, RuntimeInfo, SessionId, Settings,
};
