//! The rolling time interval scanned per tick.

use chrono::{DateTime, Duration, Utc};

use crate::event::EventTime;

/// Half-open window `[start, end)` around a reference instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// `[now - past_days, now + future_days)`.
    pub fn around(now: DateTime<Utc>, past_days: i64, future_days: i64) -> Self {
        SyncWindow {
            start: now - Duration::days(past_days),
            end: now + Duration::days(future_days),
        }
    }

    /// An event is in the window if any instant of it lies inside.
    /// All-day dates anchor at UTC midnight, end exclusive.
    pub fn contains_event(&self, time: &EventTime) -> bool {
        time.end_utc() > self.start && time.start_utc() < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn window() -> SyncWindow {
        SyncWindow::around(Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap(), 1, 1)
    }

    fn timed(start: (u32, u32), end: (u32, u32), day: u32) -> EventTime {
        EventTime::Timed {
            start: Utc.with_ymd_and_hms(2026, 3, day, start.0, start.1, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 3, day, end.0, end.1, 0).unwrap(),
        }
    }

    #[test]
    fn inside_and_outside() {
        let w = window();
        assert!(w.contains_event(&timed((9, 0), (10, 0), 15)));
        assert!(!w.contains_event(&timed((9, 0), (10, 0), 12)));
        assert!(!w.contains_event(&timed((9, 0), (10, 0), 18)));
    }

    #[test]
    fn boundary_crossing_events_are_included() {
        let w = window();
        // Starts before the left edge, ends inside.
        let crossing = EventTime::Timed {
            start: Utc.with_ymd_and_hms(2026, 3, 14, 11, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 3, 14, 13, 0, 0).unwrap(),
        };
        assert!(w.contains_event(&crossing));

        // Ends exactly at the left edge: no instant inside.
        let touching = EventTime::Timed {
            start: Utc.with_ymd_and_hms(2026, 3, 14, 11, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap(),
        };
        assert!(!w.contains_event(&touching));
    }

    #[test]
    fn all_day_overlap() {
        let w = window();
        let inside = EventTime::AllDay {
            start: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            end: NaiveDate::from_ymd_opt(2026, 3, 16).unwrap(),
        };
        assert!(w.contains_event(&inside));

        let before = EventTime::AllDay {
            start: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            end: NaiveDate::from_ymd_opt(2026, 3, 11).unwrap(),
        };
        assert!(!w.contains_event(&before));
    }
}
