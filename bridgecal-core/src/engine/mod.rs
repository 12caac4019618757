//! The reconciliation engine.
//!
//! One tick enumerates both calendars for the window, classifies every
//! event as source or mirror by its marker, pairs sources to mirrors,
//! decides actions, executes them in delete/update/create order and
//! persists mapping changes at phase checkpoints. Classification alone
//! enforces loop prevention: a mirror is never treated as a source.

pub mod plan;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterError, CalendarAdapter, EventPage};
use crate::config::RedactionMode;
use crate::error::{BridgeCalError, BridgeCalResult};
use crate::event::Origin;
use crate::protocol::WireEvent;
use crate::store::{MappingStore, CURSOR_GOOGLE_SYNC_TOKEN, CURSOR_LAST_OUTLOOK_SCAN_AT};
use crate::summary::TickSummary;
use crate::window::SyncWindow;

use plan::{build_plan, row_for_created, SideScan};

pub struct SyncEngine<O, G> {
    outlook: O,
    google: G,
    store: MappingStore,
    redaction: RedactionMode,
}

impl<O: CalendarAdapter, G: CalendarAdapter> SyncEngine<O, G> {
    pub fn new(outlook: O, google: G, store: MappingStore, redaction: RedactionMode) -> Self {
        SyncEngine {
            outlook,
            google,
            store,
            redaction,
        }
    }

    /// Committed store state, for diagnostics.
    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    /// One reconciliation pass.
    ///
    /// Cancellation is observed between adapter operations; a cancelled tick
    /// keeps everything committed up to the last completed phase checkpoint.
    /// A single bad event or a transient adapter failure never aborts the
    /// tick; credential and configuration failures do.
    pub async fn run_tick(
        &mut self,
        window: &SyncWindow,
        cancel: &CancellationToken,
    ) -> BridgeCalResult<TickSummary> {
        let mut summary = TickSummary::default();
        if cancel.is_cancelled() {
            return Ok(summary);
        }

        let google_cursor = self.store.get_cursor(CURSOR_GOOGLE_SYNC_TOKEN)?;

        let outlook_page = self
            .outlook
            .list_events(window, None)
            .await
            .map_err(|e| enumeration_error(Origin::Outlook, e))?;
        if cancel.is_cancelled() {
            summary.scanned_outlook = outlook_page.events.len();
            return Ok(summary);
        }
        let google_page = self
            .google
            .list_events(window, google_cursor.as_deref())
            .await
            .map_err(|e| enumeration_error(Origin::Google, e))?;

        summary.scanned_outlook = outlook_page.events.len();
        summary.scanned_google = google_page.events.len();

        let outlook_scan = normalize_side(&outlook_page, Origin::Outlook, window);
        let google_scan = normalize_side(&google_page, Origin::Google, window);
        summary.outlook_src = outlook_scan.sources();
        summary.outlook_mirror = outlook_scan.mirrors();
        summary.google_src = google_scan.sources();
        summary.google_mirror = google_scan.mirrors();

        let rows = self.store.list_all()?;
        let plan = build_plan(&outlook_scan, &google_scan, &rows, self.redaction);
        summary.conflicts = plan.conflicts;
        debug!(
            deletes = plan.deletes.len(),
            updates = plan.updates.len(),
            creates = plan.creates.len(),
            refreshes = plan.row_refresh.len(),
            "tick planned"
        );

        let mut cancelled = false;

        // Phase 1: deletes. Surviving calendar state stays a subset of the
        // intended state no matter where the tick stops.
        let mut dropped: Vec<String> = Vec::new();
        for delete in &plan.deletes {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match self.delete_on(delete.side, &delete.target_id).await {
                Ok(()) | Err(AdapterError::Missing) => {
                    summary.record_deleted(delete.side);
                    dropped.push(delete.row_outlook_id.clone());
                }
                Err(e) => self.note_item_error(delete.side, &delete.target_id, e, &mut summary)?,
            }
        }
        if !cancelled {
            self.store.transaction(|tx| {
                for outlook_id in &dropped {
                    tx.delete_by_outlook(outlook_id)?;
                }
                Ok(())
            })?;
        }

        // Phase 2: updates.
        if !cancelled {
            let mut upserts = Vec::new();
            for update in &plan.updates {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                match self
                    .update_on(update.side, &update.target_id, &update.payload)
                    .await
                {
                    Ok(()) | Err(AdapterError::Missing) => {
                        summary.record_updated(update.side);
                        upserts.push(update.row.clone());
                    }
                    Err(e) => {
                        self.note_item_error(update.side, &update.target_id, e, &mut summary)?
                    }
                }
            }
            if !cancelled {
                self.store.transaction(|tx| {
                    for row in &upserts {
                        tx.upsert(row)?;
                    }
                    Ok(())
                })?;
            }
        }

        // Phase 3: creates. The payload carries the marker, so a crash
        // between the provider write and the row commit is repaired by
        // marker cross-lookup on the next tick instead of duplicating.
        if !cancelled {
            let mut created = Vec::new();
            for create in &plan.creates {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                match self.create_on(create.side, &create.payload).await {
                    Ok(new_id) => {
                        summary.record_created(create.side);
                        created.push((
                            create.drop_row_outlook_id.clone(),
                            row_for_created(&create.source, &new_id, &create.payload_fingerprint),
                        ));
                    }
                    Err(e) => self.note_item_error(create.side, create.source.id.as_str(), e, &mut summary)?,
                }
            }
            if !cancelled {
                self.store.transaction(|tx| {
                    for (drop_outlook_id, row) in &created {
                        if let Some(outlook_id) = drop_outlook_id {
                            tx.delete_by_outlook(outlook_id)?;
                        }
                        tx.upsert(row)?;
                    }
                    Ok(())
                })?;
            }
        }

        // Cursors and write-free row refreshes land only after a fault-free,
        // uncancelled tick.
        if !cancelled {
            let scan_stamp = Utc::now().to_rfc3339();
            let next_google_cursor = google_page.next_cursor.clone();
            self.store.transaction(|tx| {
                for row in &plan.row_refresh {
                    tx.upsert(row)?;
                }
                if let Some(token) = next_google_cursor.as_deref() {
                    tx.set_cursor(CURSOR_GOOGLE_SYNC_TOKEN, token)?;
                }
                tx.set_cursor(CURSOR_LAST_OUTLOOK_SCAN_AT, &scan_stamp)?;
                Ok(())
            })?;
        }

        if cancelled {
            info!(%summary, "tick cancelled");
        } else {
            info!(%summary, "tick complete");
        }
        Ok(summary)
    }

    async fn delete_on(&self, side: Origin, id: &str) -> Result<(), AdapterError> {
        match side {
            Origin::Outlook => self.outlook.delete(id).await,
            Origin::Google => self.google.delete(id).await,
        }
    }

    async fn update_on(
        &self,
        side: Origin,
        id: &str,
        payload: &crate::event::CanonicalEvent,
    ) -> Result<(), AdapterError> {
        match side {
            Origin::Outlook => self.outlook.update(id, payload).await,
            Origin::Google => self.google.update(id, payload).await,
        }
    }

    async fn create_on(
        &self,
        side: Origin,
        payload: &crate::event::CanonicalEvent,
    ) -> Result<String, AdapterError> {
        match side {
            Origin::Outlook => self.outlook.create(payload).await,
            Origin::Google => self.google.create(payload).await,
        }
    }

    /// Transient failures are logged and counted; the tick moves on to the
    /// next item. Credential and configuration failures abort the tick.
    fn note_item_error(
        &self,
        side: Origin,
        id: &str,
        error: AdapterError,
        summary: &mut TickSummary,
    ) -> BridgeCalResult<()> {
        match error {
            AdapterError::Auth(message) => Err(BridgeCalError::Auth(message)),
            AdapterError::Config(message) => Err(BridgeCalError::Config(message)),
            AdapterError::Transient(message) => {
                warn!(%side, id, error = %message, "adapter operation failed, continuing");
                summary.errors += 1;
                Ok(())
            }
            AdapterError::Missing => Ok(()),
        }
    }
}

fn enumeration_error(side: Origin, error: AdapterError) -> BridgeCalError {
    match error {
        AdapterError::Auth(message) => BridgeCalError::Auth(format!("{side}: {message}")),
        AdapterError::Config(message) => BridgeCalError::Config(format!("{side}: {message}")),
        AdapterError::Transient(message) => {
            BridgeCalError::Adapter(format!("{side} enumeration failed: {message}"))
        }
        AdapterError::Missing => {
            BridgeCalError::Adapter(format!("{side} enumeration failed: missing target"))
        }
    }
}

fn normalize_side(page: &EventPage, side: Origin, window: &SyncWindow) -> SideScan {
    let mut events = Vec::with_capacity(page.events.len());
    for wire in &page.events {
        match WireEvent::into_canonical(wire.clone(), side) {
            Ok(event) => {
                if window.contains_event(&event.time) {
                    events.push(event);
                } else {
                    debug!(%side, id = %event.source_id, "event outside window, ignoring");
                }
            }
            Err(error) => warn!(%side, error = %error, "skipping malformed event"),
        }
    }
    SideScan::new(side, events)
}
