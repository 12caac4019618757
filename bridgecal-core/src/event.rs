//! Platform-neutral event types.
//!
//! Both calendar adapters convert their native records into these types;
//! the reconciliation engine works exclusively with them. A canonical event
//! is an immutable value for the duration of a tick.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::RedactionMode;
use crate::fingerprint;

/// Which calendar platform an event lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Outlook,
    Google,
}

impl Origin {
    pub fn opposite(self) -> Origin {
        match self {
            Origin::Outlook => Origin::Google,
            Origin::Google => Origin::Outlook,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Outlook => "outlook",
            Origin::Google => "google",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the event blocks time on the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyStatus {
    Busy,
    Free,
}

/// Event visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Private,
    Public,
}

/// Event start/end, either as a timed UTC pair or an all-day date pair.
///
/// All-day ends are exclusive (a one-day event on March 1st is
/// `start = 2026-03-01, end = 2026-03-02`), matching the Google convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTime {
    AllDay { start: NaiveDate, end: NaiveDate },
    Timed { start: DateTime<Utc>, end: DateTime<Utc> },
}

impl EventTime {
    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::AllDay { .. })
    }

    /// Start instant in UTC; all-day dates anchor at UTC midnight.
    pub fn start_utc(&self) -> DateTime<Utc> {
        match self {
            EventTime::AllDay { start, .. } => date_midnight_utc(*start),
            EventTime::Timed { start, .. } => *start,
        }
    }

    /// Exclusive end instant in UTC.
    pub fn end_utc(&self) -> DateTime<Utc> {
        match self {
            EventTime::AllDay { end, .. } => date_midnight_utc(*end),
            EventTime::Timed { end, .. } => *end,
        }
    }
}

fn date_midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

/// The pair of provider-side properties that identifies a mirror.
///
/// `origin_of_source` names the platform the original lives on; it is always
/// the opposite of the platform the marked event lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorMarker {
    pub origin_of_source: Origin,
    pub source_id: String,
}

/// A single logical appointment instance in canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    pub origin: Origin,
    pub source_id: String,
    pub time: EventTime,
    pub summary: String,
    pub location: String,
    pub description: String,
    pub busy_status: BusyStatus,
    pub privacy: Privacy,
    pub last_modified: Option<DateTime<Utc>>,
    pub mirror_marker: Option<MirrorMarker>,
}

impl CanonicalEvent {
    /// An event carrying a marker was produced by bridgecal and is never
    /// treated as a source.
    pub fn is_mirror(&self) -> bool {
        self.mirror_marker.is_some()
    }

    pub fn fingerprint(&self) -> u64 {
        fingerprint::fingerprint(self)
    }

    pub fn fingerprint_hex(&self) -> String {
        fingerprint::fingerprint_hex(self)
    }

    /// True iff the fields participating in the fingerprint match.
    /// Defensive re-check; the primary comparison is by fingerprint.
    pub fn equals_for_sync(&self, other: &CanonicalEvent) -> bool {
        self.time == other.time
            && fingerprint::normalize_text(&self.summary)
                == fingerprint::normalize_text(&other.summary)
            && fingerprint::normalize_text(&self.location)
                == fingerprint::normalize_text(&other.location)
            && fingerprint::normalize_text(&self.description)
                == fingerprint::normalize_text(&other.description)
            && self.busy_status == other.busy_status
            && self.privacy == other.privacy
    }

    /// Build the payload written to this event's mirror on the opposite side.
    ///
    /// Mirrors are always busy and private and carry the marker pointing back
    /// at this event. In busy-only redaction mode the content collapses to a
    /// bare "Busy" block.
    pub fn mirror_payload(&self, redaction: RedactionMode) -> CanonicalEvent {
        let (summary, location, description) = match redaction {
            RedactionMode::None => (
                self.summary.clone(),
                self.location.clone(),
                self.description.clone(),
            ),
            RedactionMode::BusyOnly => ("Busy".to_string(), String::new(), String::new()),
        };

        CanonicalEvent {
            origin: self.origin.opposite(),
            source_id: String::new(),
            time: self.time.clone(),
            summary,
            location,
            description,
            busy_status: BusyStatus::Busy,
            privacy: Privacy::Private,
            last_modified: None,
            mirror_marker: Some(MirrorMarker {
                origin_of_source: self.origin,
                source_id: self.source_id.clone(),
            }),
        }
    }

    /// Copy this event's content onto `side` without any marker.
    ///
    /// Used when a conflict makes the mirror authoritative and its content
    /// must be written back over the source. A source must never gain a
    /// marker, so none is attached.
    pub fn content_payload(&self, side: Origin) -> CanonicalEvent {
        CanonicalEvent {
            origin: side,
            source_id: String::new(),
            time: self.time.clone(),
            summary: self.summary.clone(),
            location: self.location.clone(),
            description: self.description.clone(),
            busy_status: self.busy_status,
            privacy: self.privacy,
            last_modified: None,
            mirror_marker: None,
        }
    }
}
