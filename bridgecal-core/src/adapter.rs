//! The capabilities the reconciliation engine demands of each calendar side.
//!
//! Adapters own every provider detail (COM automation, OAuth, API quirks);
//! the engine only needs the four operations below plus a health probe.
//! Within one adapter, operations from one tick are sequential.

use async_trait::async_trait;
use thiserror::Error;

use crate::event::{CanonicalEvent, Origin};
use crate::protocol::WireEvent;
use crate::window::SyncWindow;

/// Key for the origin marker in a Google mirror's extended private
/// properties. The exact name interoperates with existing installs.
pub const GOOGLE_MARKER_ORIGIN_KEY: &str = "bridgecal.origin";
/// Key for the Outlook id in a Google mirror's extended private properties.
pub const GOOGLE_MARKER_OUTLOOK_ID_KEY: &str = "bridgecal.outlook_id";
/// User-defined property naming the origin on an Outlook mirror appointment.
pub const OUTLOOK_MARKER_ORIGIN_PROP: &str = "BridgeCalOrigin";
/// User-defined property carrying the Google id on an Outlook mirror.
pub const OUTLOOK_MARKER_GOOGLE_ID_PROP: &str = "BridgeCalGoogleId";

/// Adapter failure classes, mirroring the engine's error taxonomy.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Missing prerequisite (binary not installed, bad adapter config).
    #[error("adapter configuration: {0}")]
    Config(String),

    /// Unrecoverable credential failure.
    #[error("authentication: {0}")]
    Auth(String),

    /// Network, rate limit, momentary provider unavailability.
    #[error("transient: {0}")]
    Transient(String),

    /// The targeted event does not exist (already deleted).
    #[error("target missing")]
    Missing,
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// One page of enumerated events plus the next incremental cursor, if the
/// adapter supports one.
#[derive(Debug, Clone)]
pub struct EventPage {
    pub events: Vec<WireEvent>,
    pub next_cursor: Option<String>,
}

/// Contract between the engine and one calendar side.
#[async_trait]
pub trait CalendarAdapter: Send + Sync {
    /// The platform this adapter speaks to.
    fn side(&self) -> Origin;

    /// Enumerate the complete window contents, recurring series expanded to
    /// per-instance entries, marker fields included. A cursor (when the
    /// adapter supports incremental listing) only changes how the adapter
    /// fetches, never what it returns.
    async fn list_events(
        &self,
        window: &SyncWindow,
        cursor: Option<&str>,
    ) -> AdapterResult<EventPage>;

    /// Create an event and return its native id. The adapter writes the
    /// marker derived from `event.mirror_marker` and must not send
    /// invitations or notifications.
    async fn create(&self, event: &CanonicalEvent) -> AdapterResult<String>;

    /// Update in place. The marker must be preserved.
    async fn update(&self, id: &str, event: &CanonicalEvent) -> AdapterResult<()>;

    /// Delete. A missing target is reported as [`AdapterError::Missing`],
    /// which callers treat as success.
    async fn delete(&self, id: &str) -> AdapterResult<()>;

    /// Cheap end-to-end connectivity probe, used by `doctor`.
    async fn health_check(&self) -> AdapterResult<()>;
}
