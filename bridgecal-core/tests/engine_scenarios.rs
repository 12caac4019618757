//! End-to-end reconciliation scenarios against in-memory fake adapters.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use bridgecal_core::adapter::{AdapterError, AdapterResult, CalendarAdapter, EventPage};
use bridgecal_core::protocol::WireEvent;
use bridgecal_core::{
    BridgeCalError, BusyStatus, CanonicalEvent, EventTime, MappingStore, MirrorMarker, Origin,
    Privacy, RedactionMode, SyncEngine, SyncWindow, TickSummary,
};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
}

fn window() -> SyncWindow {
    SyncWindow::around(base(), 1, 1)
}

fn timed_event(
    origin: Origin,
    id: &str,
    summary: &str,
    start_hour: i64,
    modified_min: i64,
) -> CanonicalEvent {
    let start = base() + Duration::hours(start_hour);
    CanonicalEvent {
        origin,
        source_id: id.to_string(),
        time: EventTime::Timed {
            start,
            end: start + Duration::hours(1),
        },
        summary: summary.to_string(),
        location: "room".to_string(),
        description: "notes".to_string(),
        busy_status: BusyStatus::Busy,
        privacy: Privacy::Public,
        last_modified: Some(base() + Duration::minutes(modified_min)),
        mirror_marker: None,
    }
}

fn wire_of(event: &CanonicalEvent) -> WireEvent {
    let mut wire = WireEvent::from_canonical(event);
    wire.id = event.source_id.clone();
    wire.updated = event.last_modified;
    wire
}

#[derive(Default)]
struct FakeState {
    events: BTreeMap<String, CanonicalEvent>,
    next_id: u64,
    created: Vec<CanonicalEvent>,
    updated: Vec<(String, CanonicalEvent)>,
    deleted: Vec<String>,
    fail_writes: Option<&'static str>,
    fail_list_auth: bool,
}

/// One side's calendar, recording every write it is asked to perform.
#[derive(Clone)]
struct FakeCalendar {
    side: Origin,
    state: Arc<Mutex<FakeState>>,
}

impl FakeCalendar {
    fn new(side: Origin) -> Self {
        FakeCalendar {
            side,
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    fn insert(&self, event: CanonicalEvent) {
        let mut state = self.state.lock().unwrap();
        state.events.insert(event.source_id.clone(), event);
    }

    fn remove(&self, id: &str) {
        self.state.lock().unwrap().events.remove(id);
    }

    fn get(&self, id: &str) -> Option<CanonicalEvent> {
        self.state.lock().unwrap().events.get(id).cloned()
    }

    fn events(&self) -> Vec<CanonicalEvent> {
        self.state.lock().unwrap().events.values().cloned().collect()
    }

    fn mutate(&self, id: &str, f: impl FnOnce(&mut CanonicalEvent)) {
        let mut state = self.state.lock().unwrap();
        let event = state.events.get_mut(id).expect("event to mutate");
        f(event);
    }

    fn created(&self) -> Vec<CanonicalEvent> {
        self.state.lock().unwrap().created.clone()
    }

    fn updated(&self) -> Vec<(String, CanonicalEvent)> {
        self.state.lock().unwrap().updated.clone()
    }

    fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn fail_writes(&self, message: Option<&'static str>) {
        self.state.lock().unwrap().fail_writes = message;
    }

    fn fail_list_auth(&self, fail: bool) {
        self.state.lock().unwrap().fail_list_auth = fail;
    }

    fn id_prefix(&self) -> &'static str {
        match self.side {
            Origin::Outlook => "om",
            Origin::Google => "gm",
        }
    }
}

#[async_trait]
impl CalendarAdapter for FakeCalendar {
    fn side(&self) -> Origin {
        self.side
    }

    async fn list_events(
        &self,
        _window: &SyncWindow,
        _cursor: Option<&str>,
    ) -> AdapterResult<EventPage> {
        let state = self.state.lock().unwrap();
        if state.fail_list_auth {
            return Err(AdapterError::Auth("invalid_grant".to_string()));
        }
        Ok(EventPage {
            events: state.events.values().map(wire_of).collect(),
            next_cursor: None,
        })
    }

    async fn create(&self, event: &CanonicalEvent) -> AdapterResult<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_writes {
            return Err(AdapterError::Transient(message.to_string()));
        }
        state.next_id += 1;
        let id = format!("{}-{}", self.id_prefix(), state.next_id);
        let mut stored = event.clone();
        stored.origin = self.side;
        stored.source_id = id.clone();
        state.created.push(event.clone());
        state.events.insert(id.clone(), stored);
        Ok(id)
    }

    async fn update(&self, id: &str, event: &CanonicalEvent) -> AdapterResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_writes {
            return Err(AdapterError::Transient(message.to_string()));
        }
        if !state.events.contains_key(id) {
            return Err(AdapterError::Missing);
        }
        let mut stored = event.clone();
        stored.origin = self.side;
        stored.source_id = id.to_string();
        state.updated.push((id.to_string(), event.clone()));
        state.events.insert(id.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, id: &str) -> AdapterResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_writes {
            return Err(AdapterError::Transient(message.to_string()));
        }
        state.deleted.push(id.to_string());
        state.events.remove(id);
        Ok(())
    }

    async fn health_check(&self) -> AdapterResult<()> {
        Ok(())
    }
}

struct Harness {
    outlook: FakeCalendar,
    google: FakeCalendar,
    engine: SyncEngine<FakeCalendar, FakeCalendar>,
    _dir: tempfile::TempDir,
}

fn harness_with(redaction: RedactionMode) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = MappingStore::open(&dir.path().join("state.db")).unwrap();
    let outlook = FakeCalendar::new(Origin::Outlook);
    let google = FakeCalendar::new(Origin::Google);
    let engine = SyncEngine::new(outlook.clone(), google.clone(), store, redaction);
    Harness {
        outlook,
        google,
        engine,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(RedactionMode::None)
}

async fn tick(h: &mut Harness) -> TickSummary {
    h.engine
        .run_tick(&window(), &CancellationToken::new())
        .await
        .unwrap()
}

fn zero_delta(summary: &TickSummary) -> bool {
    summary.writes() == 0 && summary.conflicts == 0 && summary.errors == 0
}

#[tokio::test]
async fn create_propagates_outlook_to_google() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "O1", "Planning", 9, 0));

    let summary = tick(&mut h).await;

    assert_eq!(summary.created_google, 1);
    assert_eq!(summary.outlook_src, 1);
    assert_eq!(summary.google_src, 0);
    assert_eq!(summary.writes(), 1);

    let mirrors = h.google.events();
    assert_eq!(mirrors.len(), 1);
    let mirror = &mirrors[0];
    assert_eq!(mirror.summary, "Planning");
    assert_eq!(mirror.privacy, Privacy::Private);
    assert_eq!(mirror.busy_status, BusyStatus::Busy);
    assert_eq!(
        mirror.mirror_marker,
        Some(MirrorMarker {
            origin_of_source: Origin::Outlook,
            source_id: "O1".to_string(),
        })
    );

    let rows = h.engine.store().list_all().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].outlook_id, "O1");
    assert_eq!(rows[0].google_id, mirror.source_id);
    assert_eq!(rows[0].origin, Origin::Outlook);
    assert!(rows[0].last_outlook_fingerprint.is_some());
    assert!(rows[0].last_google_fingerprint.is_some());
}

#[tokio::test]
async fn update_propagates_and_rewrites_fingerprint() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "O1", "Planning", 9, 0));
    tick(&mut h).await;

    let fp_before = h.engine.store().list_all().unwrap()[0]
        .last_outlook_fingerprint
        .clone();

    h.outlook
        .insert(timed_event(Origin::Outlook, "O1", "Planning v2", 9, 15));
    let summary = tick(&mut h).await;

    assert_eq!(summary.updated_google, 1);
    assert_eq!(summary.created_google, 0);

    let mirror = h.google.events().pop().unwrap();
    assert_eq!(mirror.summary, "Planning v2");
    assert!(mirror.mirror_marker.is_some());

    let fp_after = h.engine.store().list_all().unwrap()[0]
        .last_outlook_fingerprint
        .clone();
    assert_ne!(fp_before, fp_after);
}

#[tokio::test]
async fn delete_propagates_and_drops_the_row() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "O1", "Planning", 9, 0));
    tick(&mut h).await;

    h.outlook.remove("O1");
    let summary = tick(&mut h).await;

    assert_eq!(summary.deleted_google, 1);
    assert!(h.google.events().is_empty());
    assert!(h.engine.store().list_all().unwrap().is_empty());

    // Exactly once: a further tick deletes nothing more.
    let again = tick(&mut h).await;
    assert!(zero_delta(&again));
    assert_eq!(h.google.deleted().len(), 1);
}

#[tokio::test]
async fn conflict_newer_mirror_overwrites_the_source() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "O1", "Planning", 9, 0));
    tick(&mut h).await;
    let mirror_id = h.engine.store().list_all().unwrap()[0].google_id.clone();

    // Both sides mutate; the Google copy is newer.
    h.outlook
        .insert(timed_event(Origin::Outlook, "O1", "Outlook edit", 9, 30));
    h.google.mutate(&mirror_id, |event| {
        event.summary = "Google edit".to_string();
        event.last_modified = Some(base() + Duration::minutes(45));
    });

    let summary = tick(&mut h).await;

    assert_eq!(summary.conflicts, 1);
    assert_eq!(summary.updated_outlook, 1);
    assert_eq!(summary.updated_google, 0);

    let source = h.outlook.get("O1").unwrap();
    assert_eq!(source.summary, "Google edit");
    assert!(source.mirror_marker.is_none(), "a source never gains a marker");

    let row = &h.engine.store().list_all().unwrap()[0];
    assert_eq!(row.origin, Origin::Outlook, "conflicts never flip origin");

    // Converged: the next tick is quiet.
    let again = tick(&mut h).await;
    assert!(zero_delta(&again));
}

#[tokio::test]
async fn conflict_tie_prefers_outlook() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "O1", "Planning", 9, 0));
    tick(&mut h).await;
    let mirror_id = h.engine.store().list_all().unwrap()[0].google_id.clone();

    let tie = Some(base() + Duration::minutes(30));
    h.outlook
        .insert(timed_event(Origin::Outlook, "O1", "Outlook edit", 9, 30));
    h.google.mutate(&mirror_id, |event| {
        event.summary = "Google edit".to_string();
        event.last_modified = tie;
    });

    let summary = tick(&mut h).await;

    assert_eq!(summary.conflicts, 1);
    assert_eq!(summary.updated_google, 1);
    assert_eq!(summary.updated_outlook, 0);
    assert_eq!(h.google.get(&mirror_id).unwrap().summary, "Outlook edit");
}

#[tokio::test]
async fn second_tick_with_unchanged_inputs_is_quiet() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "O1", "Planning", 9, 0));
    h.google
        .insert(timed_event(Origin::Google, "G1", "Standup", 11, 0));

    let first = tick(&mut h).await;
    assert_eq!(first.created_google, 1);
    assert_eq!(first.created_outlook, 1);

    let calendars_before = (h.outlook.events(), h.google.events());
    let rows_before = h.engine.store().list_all().unwrap();

    let second = tick(&mut h).await;

    assert!(second.scanned_outlook > 0);
    assert!(second.scanned_google > 0);
    assert!(zero_delta(&second));
    assert_eq!((h.outlook.events(), h.google.events()), calendars_before);
    assert_eq!(h.engine.store().list_all().unwrap(), rows_before);
}

#[tokio::test]
async fn mirrors_are_never_treated_as_sources() {
    let mut h = harness();

    let o_src = timed_event(Origin::Outlook, "o-src", "Outlook source", 1, 0);
    let g_src = timed_event(Origin::Google, "g-src", "Google source", 3, 0);

    let mut o_mirror = g_src.mirror_payload(RedactionMode::None);
    o_mirror.source_id = "o-mirror".to_string();
    let mut g_mirror = o_src.mirror_payload(RedactionMode::None);
    g_mirror.source_id = "g-mirror".to_string();

    h.outlook.insert(o_src);
    h.outlook.insert(o_mirror);
    h.google.insert(g_src);
    h.google.insert(g_mirror);

    let summary = tick(&mut h).await;

    assert_eq!(summary.outlook_src, 1);
    assert_eq!(summary.outlook_mirror, 1);
    assert_eq!(summary.google_src, 1);
    assert_eq!(summary.google_mirror, 1);

    // Every pair already exists: marker cross-lookup repairs the lost rows
    // with zero calendar writes, and no mirror ever seeds a create.
    assert_eq!(summary.writes(), 0);
    assert!(h.outlook.created().is_empty());
    assert!(h.google.created().is_empty());

    let rows = h.engine.store().list_all().unwrap();
    assert_eq!(rows.len(), 2);
    for event in h.outlook.events().iter().chain(h.google.events().iter()) {
        if let Some(marker) = &event.mirror_marker {
            assert_eq!(marker.origin_of_source, event.origin.opposite());
        }
    }
}

#[tokio::test]
async fn marker_repair_survives_a_lost_store() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "O1", "Planning", 9, 0));
    tick(&mut h).await;
    let mirror_id = h.engine.store().list_all().unwrap()[0].google_id.clone();

    // Simulate losing the store: rebuild the engine on a fresh database.
    let dir = tempfile::tempdir().unwrap();
    let store = MappingStore::open(&dir.path().join("state.db")).unwrap();
    let mut engine = SyncEngine::new(
        h.outlook.clone(),
        h.google.clone(),
        store,
        RedactionMode::None,
    );

    let summary = engine
        .run_tick(&window(), &CancellationToken::new())
        .await
        .unwrap();

    // No duplicate mirror: the marker alone re-pairs the events.
    assert!(zero_delta(&summary));
    assert_eq!(h.google.events().len(), 1);
    let rows = engine.store().list_all().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].outlook_id, "O1");
    assert_eq!(rows[0].google_id, mirror_id);
}

#[tokio::test]
async fn both_directions_create_update_delete() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "o1", "Outlook A", 1, 0));
    h.google
        .insert(timed_event(Origin::Google, "g1", "Google A", 2, 0));

    let first = tick(&mut h).await;
    assert_eq!(first.created_google, 1);
    assert_eq!(first.created_outlook, 1);
    assert_eq!(h.engine.store().list_all().unwrap().len(), 2);

    h.outlook
        .insert(timed_event(Origin::Outlook, "o1", "Outlook B", 1, 15));
    h.google
        .insert(timed_event(Origin::Google, "g1", "Google B", 2, 20));

    let second = tick(&mut h).await;
    assert_eq!(second.updated_google, 1);
    assert_eq!(second.updated_outlook, 1);

    h.outlook.remove("o1");
    h.google.remove("g1");

    let third = tick(&mut h).await;
    assert_eq!(third.deleted_google, 1);
    assert_eq!(third.deleted_outlook, 1);
    assert!(h.engine.store().list_all().unwrap().is_empty());
}

#[tokio::test]
async fn every_mirror_write_is_private_and_busy() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "o1", "Board meeting", 1, 0));
    h.google
        .insert(timed_event(Origin::Google, "g1", "Dentist", 2, 0));
    tick(&mut h).await;

    h.outlook
        .insert(timed_event(Origin::Outlook, "o1", "Board meeting v2", 1, 9));
    tick(&mut h).await;

    for payload in h
        .google
        .created()
        .into_iter()
        .chain(h.outlook.created())
        .chain(h.google.updated().into_iter().map(|(_, e)| e))
    {
        assert_eq!(payload.privacy, Privacy::Private);
        assert_eq!(payload.busy_status, BusyStatus::Busy);
        assert!(payload.mirror_marker.is_some());
    }
}

#[tokio::test]
async fn busy_only_redaction_suppresses_content() {
    let mut h = harness_with(RedactionMode::BusyOnly);
    h.outlook
        .insert(timed_event(Origin::Outlook, "o1", "Salary review", 1, 0));
    tick(&mut h).await;

    let mirror = h.google.events().pop().unwrap();
    assert_eq!(mirror.summary, "Busy");
    assert_eq!(mirror.location, "");
    assert_eq!(mirror.description, "");
    assert_eq!(mirror.privacy, Privacy::Private);

    // Unchanged input stays quiet under redaction too.
    let second = tick(&mut h).await;
    assert!(zero_delta(&second));
}

#[tokio::test]
async fn all_day_events_mirror_with_exclusive_end() {
    let mut h = harness();
    let mut event = timed_event(Origin::Outlook, "o1", "Offsite", 1, 0);
    event.time = EventTime::AllDay {
        start: base().date_naive(),
        end: base().date_naive() + Duration::days(2),
    };
    h.outlook.insert(event.clone());

    let summary = tick(&mut h).await;
    assert_eq!(summary.created_google, 1);
    assert_eq!(h.google.events()[0].time, event.time);
}

#[tokio::test]
async fn transient_write_failures_skip_items_and_count_errors() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "o1", "One", 1, 0));
    h.outlook
        .insert(timed_event(Origin::Outlook, "o2", "Two", 2, 0));
    h.google.fail_writes(Some("rate limited"));

    let summary = tick(&mut h).await;
    assert_eq!(summary.errors, 2);
    assert_eq!(summary.created_google, 0);
    assert!(h.engine.store().list_all().unwrap().is_empty());

    // Recovery is clean: no duplicates, both mirrors created.
    h.google.fail_writes(None);
    let retry = tick(&mut h).await;
    assert_eq!(retry.errors, 0);
    assert_eq!(retry.created_google, 2);
    assert_eq!(h.google.events().len(), 2);
}

#[tokio::test]
async fn auth_failure_aborts_the_tick() {
    let mut h = harness();
    h.google.fail_list_auth(true);

    let result = h
        .engine
        .run_tick(&window(), &CancellationToken::new())
        .await;
    match result {
        Err(e @ BridgeCalError::Auth(_)) => assert_eq!(e.exit_code(), 3),
        other => panic!("expected an auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_tick_performs_no_writes() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "o1", "Planning", 1, 0));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = h.engine.run_tick(&window(), &cancel).await.unwrap();

    assert_eq!(summary.writes(), 0);
    assert!(h.google.events().is_empty());
    assert!(h.engine.store().list_all().unwrap().is_empty());
}

#[tokio::test]
async fn out_of_window_rows_are_retained() {
    let mut h = harness();
    h.outlook
        .insert(timed_event(Origin::Outlook, "O1", "Planning", 9, 0));
    tick(&mut h).await;

    // Slide the window far past the pair: neither side is visible.
    let far = SyncWindow::around(base() + Duration::days(30), 1, 1);
    let summary = h
        .engine
        .run_tick(&far, &CancellationToken::new())
        .await
        .unwrap();

    assert!(zero_delta(&summary));
    assert_eq!(
        h.engine.store().list_all().unwrap().len(),
        1,
        "pairs outside the window stay mapped"
    );
    assert_eq!(h.google.events().len(), 1, "no mirror is deleted");

    // Back in range everything is still paired, nothing to do.
    let back = tick(&mut h).await;
    assert!(zero_delta(&back));
}
