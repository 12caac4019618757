//! Content fingerprinting for change detection.
//!
//! The fingerprint is a deterministic 64-bit hash over the user-visible
//! fields of a canonical event. Equality of fingerprints means no
//! user-visible change. The encoding is fixed for the lifetime of a
//! deployment: text is whitespace-normalized, timed instants are rendered as
//! UTC ISO-8601 to whole seconds, all-day dates as `YYYY-MM-DD`.

use sha2::{Digest, Sha256};

use crate::event::{BusyStatus, CanonicalEvent, EventTime, Privacy};

/// 64-bit content fingerprint (first 8 bytes of SHA-256, big-endian).
pub fn fingerprint(event: &CanonicalEvent) -> u64 {
    let digest = Sha256::digest(encode(event).as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Fingerprint rendered as a fixed-width lowercase hex string, the form
/// persisted in the mapping store.
pub fn fingerprint_hex(event: &CanonicalEvent) -> String {
    format!("{:016x}", fingerprint(event))
}

/// Trim and collapse internal whitespace runs to single spaces.
pub(crate) fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn encode(event: &CanonicalEvent) -> String {
    let (start, end, all_day) = match &event.time {
        EventTime::AllDay { start, end } => (
            start.format("%Y-%m-%d").to_string(),
            end.format("%Y-%m-%d").to_string(),
            "1",
        ),
        EventTime::Timed { start, end } => (
            start.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            end.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "0",
        ),
    };

    let busy = match event.busy_status {
        BusyStatus::Busy => "busy",
        BusyStatus::Free => "free",
    };
    let privacy = match event.privacy {
        Privacy::Private => "private",
        Privacy::Public => "public",
    };

    // One field per line; whitespace collapsing guarantees no embedded
    // newlines survive inside the text fields.
    format!(
        "start={start}\nend={end}\nall_day={all_day}\nsummary={}\nlocation={}\ndescription={}\nbusy={busy}\nprivacy={privacy}",
        normalize_text(&event.summary),
        normalize_text(&event.location),
        normalize_text(&event.description),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MirrorMarker, Origin};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn base() -> CanonicalEvent {
        CanonicalEvent {
            origin: Origin::Outlook,
            source_id: "o1".into(),
            time: EventTime::Timed {
                start: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            },
            summary: "Planning".into(),
            location: "".into(),
            description: "".into(),
            busy_status: BusyStatus::Busy,
            privacy: Privacy::Private,
            last_modified: None,
            mirror_marker: None,
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let a = base();
        let mut b = base();
        b.summary = "  Planning \t ".into();
        assert_eq!(fingerprint(&a), fingerprint(&b));

        let mut c = base();
        c.summary = "Planning  review".into();
        let mut d = base();
        d.summary = "Planning\nreview".into();
        assert_eq!(fingerprint(&c), fingerprint(&d));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn identity_fields_do_not_participate() {
        let a = base();
        let mut b = base();
        b.origin = Origin::Google;
        b.source_id = "g77".into();
        b.last_modified = Some(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
        b.mirror_marker = Some(MirrorMarker {
            origin_of_source: Origin::Outlook,
            source_id: "o1".into(),
        });
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn content_fields_participate() {
        let a = base();

        let mut b = base();
        b.location = "Room 4".into();
        assert_ne!(fingerprint(&a), fingerprint(&b));

        let mut c = base();
        c.busy_status = BusyStatus::Free;
        assert_ne!(fingerprint(&a), fingerprint(&c));

        let mut d = base();
        d.privacy = Privacy::Public;
        assert_ne!(fingerprint(&a), fingerprint(&d));

        let mut e = base();
        e.time = EventTime::Timed {
            start: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap(),
        };
        assert_ne!(fingerprint(&a), fingerprint(&e));
    }

    #[test]
    fn all_day_and_timed_never_collide() {
        let a = base();
        let mut b = base();
        b.time = EventTime::AllDay {
            start: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        };
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn hex_form_is_sixteen_lowercase_digits() {
        let hex = fingerprint_hex(&base());
        assert_eq!(hex.len(), 16);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hex, hex.to_lowercase());
    }

    #[test]
    fn encoding_is_stable_across_calls() {
        let a = base();
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
    }
}
