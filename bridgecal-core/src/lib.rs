//! Core types and reconciliation engine for BridgeCal.
//!
//! BridgeCal keeps one Outlook desktop calendar and one Google Calendar
//! mutually mirrored from a single polling process. This crate holds
//! everything the `bridgecal` binary builds on:
//! - the canonical event model and its content fingerprint
//! - the durable mapping store pairing source ids to mirror ids
//! - the adapter contract and the subprocess adapter that fulfils it
//! - the reconciliation engine and the tick driver

pub mod adapter;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod protocol;
pub mod store;
pub mod subprocess;
pub mod summary;
pub mod window;

pub use adapter::{AdapterError, AdapterResult, CalendarAdapter, EventPage};
pub use config::{AppConfig, RedactionMode};
pub use driver::TickDriver;
pub use engine::SyncEngine;
pub use error::{BridgeCalError, BridgeCalResult};
pub use event::{BusyStatus, CanonicalEvent, EventTime, MirrorMarker, Origin, Privacy};
pub use store::{MappingStore, PairRow};
pub use subprocess::AdapterProcess;
pub use summary::TickSummary;
pub use window::SyncWindow;
