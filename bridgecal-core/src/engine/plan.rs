//! Pure per-tick planning.
//!
//! Everything here is a function of the two scans, the stored mapping rows
//! and the redaction mode: no I/O, no clocks. Given identical inputs the
//! plan is identical, which is what makes conflict handling deterministic
//! and testable.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::config::RedactionMode;
use crate::event::{CanonicalEvent, Origin};
use crate::store::PairRow;

/// Normalized, deduplicated events of one side, indexed by native id.
pub struct SideScan {
    pub side: Origin,
    pub by_id: HashMap<String, CanonicalEvent>,
}

impl SideScan {
    /// Index events by id. When one side reports the same id twice within
    /// the window (expanded recurrences can), the copy with the newer
    /// `last_modified` wins; ties keep the first seen.
    pub fn new(side: Origin, events: Vec<CanonicalEvent>) -> SideScan {
        let mut by_id: HashMap<String, CanonicalEvent> = HashMap::new();
        for event in events {
            match by_id.get(&event.source_id) {
                Some(existing) if event.last_modified <= existing.last_modified => {}
                _ => {
                    by_id.insert(event.source_id.clone(), event);
                }
            }
        }
        SideScan { side, by_id }
    }

    pub fn sources(&self) -> usize {
        self.by_id.values().filter(|e| !e.is_mirror()).count()
    }

    pub fn mirrors(&self) -> usize {
        self.by_id.values().filter(|e| e.is_mirror()).count()
    }
}

/// What to do for one source/mirror pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairAction {
    Noop,
    CreateMirror,
    UpdateMirror,
    /// The mirror won a conflict: its content overwrites the source.
    UpdateSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairDecision {
    pub action: PairAction,
    pub conflict: bool,
}

/// The action decision table.
///
/// "Changed" means the current fingerprint differs from the stored one; a
/// stored fingerprint of none (first observation of a pair) counts as
/// unchanged. A pure function of its inputs.
pub fn decide_pair(
    source: &CanonicalEvent,
    mirror: Option<&CanonicalEvent>,
    row: Option<&PairRow>,
) -> PairDecision {
    let Some(mirror) = mirror else {
        return PairDecision {
            action: PairAction::CreateMirror,
            conflict: false,
        };
    };

    let source_changed = changed_since(source, row);
    let mirror_changed = changed_since(mirror, row);

    let action = match (source_changed, mirror_changed) {
        (false, false) => PairAction::Noop,
        // Source changed, or the mirror drifted: the source is
        // authoritative either way.
        (true, false) | (false, true) => PairAction::UpdateMirror,
        (true, true) => {
            return PairDecision {
                action: resolve_conflict(source, mirror, row),
                conflict: true,
            }
        }
    };
    PairDecision {
        action,
        conflict: false,
    }
}

fn changed_since(event: &CanonicalEvent, row: Option<&PairRow>) -> bool {
    match row.and_then(|r| r.fingerprint_for(event.origin)) {
        None => false,
        Some(stored) => stored != event.fingerprint_hex(),
    }
}

/// Last-write-wins by `last_modified`. A timestamp that is missing, or
/// equal to the stored one (it did not move although the content did), is
/// unusable for ordering; then the Outlook copy is authoritative.
fn resolve_conflict(
    source: &CanonicalEvent,
    mirror: &CanonicalEvent,
    row: Option<&PairRow>,
) -> PairAction {
    let source_ts = usable_timestamp(source, row);
    let mirror_ts = usable_timestamp(mirror, row);
    match (source_ts, mirror_ts) {
        (Some(s), Some(m)) if s >= m => PairAction::UpdateMirror,
        (Some(_), Some(_)) => PairAction::UpdateSource,
        _ => {
            if source.origin == Origin::Outlook {
                PairAction::UpdateMirror
            } else {
                PairAction::UpdateSource
            }
        }
    }
}

fn usable_timestamp(event: &CanonicalEvent, row: Option<&PairRow>) -> Option<DateTime<Utc>> {
    let current = event.last_modified?;
    let stored = row.and_then(|r| r.modified_for(event.origin));
    if stored == Some(current) {
        None
    } else {
        Some(current)
    }
}

/// Everything needed to build the mapping row once a create has an id.
#[derive(Debug, Clone)]
pub struct SourceRef {
    pub origin: Origin,
    pub id: String,
    pub fingerprint: String,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct PlannedDelete {
    /// Side the delete executes on.
    pub side: Origin,
    pub target_id: String,
    pub row_outlook_id: String,
}

#[derive(Debug, Clone)]
pub struct PlannedUpdate {
    /// Side the update executes on.
    pub side: Origin,
    pub target_id: String,
    pub payload: CanonicalEvent,
    /// Row state to persist once the write succeeds.
    pub row: PairRow,
}

#[derive(Debug, Clone)]
pub struct PlannedCreate {
    /// Side the create executes on.
    pub side: Origin,
    pub payload: CanonicalEvent,
    pub payload_fingerprint: String,
    pub source: SourceRef,
    /// Row to drop first when a dead mirror is being replaced.
    pub drop_row_outlook_id: Option<String>,
}

#[derive(Default)]
pub struct TickPlan {
    pub deletes: Vec<PlannedDelete>,
    pub updates: Vec<PlannedUpdate>,
    pub creates: Vec<PlannedCreate>,
    /// Rows to (re)write without any calendar write: first observations and
    /// pairs repaired through marker cross-lookup.
    pub row_refresh: Vec<PairRow>,
    pub conflicts: usize,
}

/// Pair sources to mirrors and decide every action for the tick.
///
/// Pairing rules, in order: mapping rows first; then, for sources no row
/// references, a marker cross-lookup among the other side's mirrors (this
/// repairs lost store state); anything still unmatched is new and gets a
/// create. Rows neither of whose ids appears in the scans are inert:
/// retained untouched, since the pair may merely lie outside the window.
pub fn build_plan(
    outlook: &SideScan,
    google: &SideScan,
    rows: &[PairRow],
    redaction: RedactionMode,
) -> TickPlan {
    let mut plan = TickPlan::default();
    let mut consumed: HashSet<(Origin, &str)> = HashSet::new();

    for row in rows {
        let source_scan = scan_for(row.origin, outlook, google);
        let mirror_scan = scan_for(row.origin.opposite(), outlook, google);

        let source = source_scan
            .by_id
            .get(row.source_id())
            .filter(|e| !e.is_mirror());
        let mirror = mirror_scan.by_id.get(row.mirror_id());

        match source {
            Some(source) => {
                consumed.insert((row.origin, row.source_id()));
                plan_pair(&mut plan, source, mirror, Some(row), redaction);
            }
            None if mirror.is_some() => {
                // The mirror is visible but its source is gone. The two
                // sides of a pair occupy the same instant, so a visible
                // mirror rules out the window as the reason for absence.
                plan.deletes.push(PlannedDelete {
                    side: row.origin.opposite(),
                    target_id: row.mirror_id().to_string(),
                    row_outlook_id: row.outlook_id.clone(),
                });
            }
            None => {} // Inert: possibly out of window, keep the row.
        }
    }

    for (scan, other) in [(outlook, google), (google, outlook)] {
        let mut ids: Vec<&str> = scan
            .by_id
            .values()
            .filter(|e| !e.is_mirror())
            .map(|e| e.source_id.as_str())
            .collect();
        ids.sort_unstable();

        for id in ids {
            if consumed.contains(&(scan.side, id)) {
                continue;
            }
            let source = &scan.by_id[id];
            let mirror = find_mirror_by_marker(other, scan.side, id);
            plan_pair(&mut plan, source, mirror, None, redaction);
        }
    }

    plan
}

fn scan_for<'a>(side: Origin, outlook: &'a SideScan, google: &'a SideScan) -> &'a SideScan {
    match side {
        Origin::Outlook => outlook,
        Origin::Google => google,
    }
}

fn find_mirror_by_marker<'a>(
    scan: &'a SideScan,
    source_side: Origin,
    source_id: &str,
) -> Option<&'a CanonicalEvent> {
    let mut matches: Vec<&CanonicalEvent> = scan
        .by_id
        .values()
        .filter(|e| {
            e.mirror_marker
                .as_ref()
                .is_some_and(|m| m.origin_of_source == source_side && m.source_id == source_id)
        })
        .collect();
    matches.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    matches.into_iter().next()
}

fn plan_pair(
    plan: &mut TickPlan,
    source: &CanonicalEvent,
    mirror: Option<&CanonicalEvent>,
    row: Option<&PairRow>,
    redaction: RedactionMode,
) {
    let decision = decide_pair(source, mirror, row);

    if decision.conflict {
        let mirror = mirror.expect("a conflict requires both sides");
        plan.conflicts += 1;
        let winner = match decision.action {
            PairAction::UpdateSource => mirror.origin,
            _ => source.origin,
        };
        info!(
            source_side = %source.origin,
            source_id = %source.source_id,
            mirror_id = %mirror.source_id,
            source_modified = ?source.last_modified,
            mirror_modified = ?mirror.last_modified,
            %winner,
            "conflict resolved"
        );
    }

    match decision.action {
        PairAction::Noop => {
            let mirror = mirror.expect("no-op requires a visible mirror");
            let needs_refresh = match row {
                None => true,
                Some(r) => {
                    r.fingerprint_for(source.origin).is_none()
                        || r.fingerprint_for(mirror.origin).is_none()
                }
            };
            if needs_refresh {
                plan.row_refresh.push(observed_row(source, mirror, row));
            } else if !source.mirror_payload(redaction).equals_for_sync(mirror) {
                // Stored fingerprints matched on both sides yet the mirror
                // does not carry the source's content: stale row state or a
                // fingerprint collision. Steer the mirror back.
                push_mirror_update(plan, source, mirror, row, redaction);
            }
        }
        PairAction::CreateMirror => {
            let payload = source.mirror_payload(redaction);
            plan.creates.push(PlannedCreate {
                side: source.origin.opposite(),
                payload_fingerprint: payload.fingerprint_hex(),
                payload,
                source: SourceRef {
                    origin: source.origin,
                    id: source.source_id.clone(),
                    fingerprint: source.fingerprint_hex(),
                    last_modified: source.last_modified,
                },
                drop_row_outlook_id: row.map(|r| r.outlook_id.clone()),
            });
        }
        PairAction::UpdateMirror => {
            let mirror = mirror.expect("update requires a visible mirror");
            if source.mirror_payload(redaction).equals_for_sync(mirror) {
                // The fingerprints moved but the content is already in
                // sync; refresh the row instead of issuing a redundant
                // write.
                plan.row_refresh.push(observed_row(source, mirror, row));
            } else {
                push_mirror_update(plan, source, mirror, row, redaction);
            }
        }
        PairAction::UpdateSource => {
            let mirror = mirror.expect("update requires a visible mirror");
            let payload = mirror.content_payload(source.origin);
            if payload.equals_for_sync(source) {
                plan.row_refresh.push(observed_row(source, mirror, row));
            } else {
                let mut new_row = base_row(source, mirror, row);
                new_row.set_side(
                    source.origin,
                    Some(payload.fingerprint_hex()),
                    source.last_modified,
                );
                new_row.set_side(
                    mirror.origin,
                    Some(mirror.fingerprint_hex()),
                    mirror.last_modified,
                );
                plan.updates.push(PlannedUpdate {
                    side: source.origin,
                    target_id: source.source_id.clone(),
                    payload,
                    row: new_row,
                });
            }
        }
    }
}

/// Row carrying both sides' currently observed fingerprints and timestamps.
fn observed_row(source: &CanonicalEvent, mirror: &CanonicalEvent, row: Option<&PairRow>) -> PairRow {
    let mut refreshed = base_row(source, mirror, row);
    refreshed.set_side(
        source.origin,
        Some(source.fingerprint_hex()),
        source.last_modified,
    );
    refreshed.set_side(
        mirror.origin,
        Some(mirror.fingerprint_hex()),
        mirror.last_modified,
    );
    refreshed
}

fn push_mirror_update(
    plan: &mut TickPlan,
    source: &CanonicalEvent,
    mirror: &CanonicalEvent,
    row: Option<&PairRow>,
    redaction: RedactionMode,
) {
    let payload = source.mirror_payload(redaction);
    let mut new_row = base_row(source, mirror, row);
    new_row.set_side(
        source.origin,
        Some(source.fingerprint_hex()),
        source.last_modified,
    );
    new_row.set_side(
        mirror.origin,
        Some(payload.fingerprint_hex()),
        mirror.last_modified,
    );
    plan.updates.push(PlannedUpdate {
        side: mirror.origin,
        target_id: mirror.source_id.clone(),
        payload,
        row: new_row,
    });
}

/// Row skeleton for a visible pair. The row's `origin` survives conflicts;
/// only brand-new pairs take the source's side.
fn base_row(source: &CanonicalEvent, mirror: &CanonicalEvent, row: Option<&PairRow>) -> PairRow {
    let origin = row.map(|r| r.origin).unwrap_or(source.origin);
    match source.origin {
        Origin::Outlook => PairRow::new(source.source_id.clone(), mirror.source_id.clone(), origin),
        Origin::Google => PairRow::new(mirror.source_id.clone(), source.source_id.clone(), origin),
    }
}

/// Build the mapping row for a freshly created mirror.
pub fn row_for_created(source: &SourceRef, new_id: &str, payload_fingerprint: &str) -> PairRow {
    let mut row = match source.origin {
        Origin::Outlook => PairRow::new(source.id.clone(), new_id.to_string(), Origin::Outlook),
        Origin::Google => PairRow::new(new_id.to_string(), source.id.clone(), Origin::Google),
    };
    row.set_side(
        source.origin,
        Some(source.fingerprint.clone()),
        source.last_modified,
    );
    row.set_side(
        source.origin.opposite(),
        Some(payload_fingerprint.to_string()),
        None,
    );
    row
}
