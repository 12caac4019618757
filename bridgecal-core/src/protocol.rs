//! Adapter subprocess protocol.
//!
//! The engine talks to adapter binaries using JSON over stdin/stdout: one
//! request line in, one response line out. The protocol is
//! language-agnostic; any executable that speaks it can be an adapter.
//! Adapters manage their own credentials; nothing credential-shaped
//! crosses this boundary.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeCalError, BridgeCalResult};
use crate::event::{BusyStatus, CanonicalEvent, EventTime, MirrorMarker, Origin, Privacy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    ListEvents,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    HealthCheck,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    pub params: serde_json::Value,
}

/// Failure class reported by an adapter, mapped onto the engine taxonomy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Auth,
    #[default]
    Transient,
    Missing,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success {
        data: T,
    },
    Error {
        error: String,
        #[serde(default)]
        kind: ErrorKind,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListEventsParams {
    /// Window start, RFC 3339.
    pub from: String,
    /// Window end (exclusive), RFC 3339.
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListEventsData {
    pub events: Vec<WireEvent>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEventParams {
    pub event: WireEvent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedEventData {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateEventParams {
    pub event_id: String,
    pub event: WireEvent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteEventParams {
    pub event_id: String,
}

/// Empty acknowledgement payload.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Ack {}

/// Start or end of an event on the wire: a timed instant or an all-day
/// date, Google-style.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// Adapter-shaped event record, used both for enumeration results and write
/// payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(default)]
    pub id: String,
    pub start: Option<WireTime>,
    pub end: Option<WireTime>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_status: Option<BusyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<Privacy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    /// Mirror marker fields, round-tripped by the adapter to and from its
    /// provider-side storage: extended private properties
    /// [`crate::adapter::GOOGLE_MARKER_ORIGIN_KEY`] /
    /// [`crate::adapter::GOOGLE_MARKER_OUTLOOK_ID_KEY`] on Google,
    /// user-defined properties
    /// [`crate::adapter::OUTLOOK_MARKER_ORIGIN_PROP`] /
    /// [`crate::adapter::OUTLOOK_MARKER_GOOGLE_ID_PROP`] on Outlook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_origin: Option<Origin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_source_id: Option<String>,
}

impl WireEvent {
    /// Convert an enumerated record into canonical form.
    ///
    /// Fails with `MalformedEvent` when the id or either endpoint is
    /// missing, or when the end precedes the start. A marker naming the
    /// event's own side as the source is invalid and ignored: the item
    /// counts as a source.
    pub fn into_canonical(self, origin: Origin) -> BridgeCalResult<CanonicalEvent> {
        if self.id.is_empty() {
            return Err(BridgeCalError::MalformedEvent("missing id".to_string()));
        }
        let time = wire_time_pair(self.start, self.end)
            .map_err(|reason| BridgeCalError::MalformedEvent(format!("{}: {reason}", self.id)))?;

        let mirror_marker = match (self.marker_origin, self.marker_source_id) {
            (Some(marked), Some(source_id))
                if marked == origin.opposite() && !source_id.is_empty() =>
            {
                Some(MirrorMarker {
                    origin_of_source: marked,
                    source_id,
                })
            }
            _ => None,
        };

        Ok(CanonicalEvent {
            origin,
            source_id: self.id,
            time,
            summary: self.summary,
            location: self.location,
            description: self.description,
            busy_status: self.busy_status.unwrap_or(BusyStatus::Busy),
            privacy: self.privacy.unwrap_or(Privacy::Public),
            last_modified: self.updated,
            mirror_marker,
        })
    }

    /// Render a canonical payload for a create or update request.
    pub fn from_canonical(event: &CanonicalEvent) -> WireEvent {
        let (start, end) = match &event.time {
            EventTime::AllDay { start, end } => (
                WireTime {
                    date: Some(*start),
                    ..WireTime::default()
                },
                WireTime {
                    date: Some(*end),
                    ..WireTime::default()
                },
            ),
            EventTime::Timed { start, end } => (
                WireTime {
                    date_time: Some((*start).into()),
                    ..WireTime::default()
                },
                WireTime {
                    date_time: Some((*end).into()),
                    ..WireTime::default()
                },
            ),
        };

        WireEvent {
            id: String::new(),
            start: Some(start),
            end: Some(end),
            summary: event.summary.clone(),
            location: event.location.clone(),
            description: event.description.clone(),
            busy_status: Some(event.busy_status),
            privacy: Some(event.privacy),
            updated: None,
            marker_origin: event.mirror_marker.as_ref().map(|m| m.origin_of_source),
            marker_source_id: event.mirror_marker.as_ref().map(|m| m.source_id.clone()),
        }
    }
}

fn wire_time_pair(
    start: Option<WireTime>,
    end: Option<WireTime>,
) -> Result<EventTime, &'static str> {
    let start = start.ok_or("missing start")?;
    let end = end.unwrap_or_default();

    if let Some(start_date) = start.date {
        // All-day: the end date is exclusive; a missing or non-advancing end
        // means a single day.
        let end_date = match end.date {
            Some(d) if d > start_date => d,
            _ => start_date
                .succ_opt()
                .ok_or("start date out of range")?,
        };
        return Ok(EventTime::AllDay {
            start: start_date,
            end: end_date,
        });
    }

    let start_dt = start.date_time.ok_or("missing start")?;
    let end_dt = end.date_time.ok_or("missing end")?;
    let start_utc = start_dt.with_timezone(&Utc);
    let end_utc = end_dt.with_timezone(&Utc);
    if end_utc < start_utc {
        return Err("end precedes start");
    }
    Ok(EventTime::Timed {
        start: start_utc,
        end: end_utc,
    })
}
