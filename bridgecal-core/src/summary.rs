//! Per-tick counters.

use serde::Serialize;
use std::fmt;

use crate::event::Origin;

/// Summary of one reconciliation tick. Event content never appears here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub scanned_outlook: usize,
    pub scanned_google: usize,
    pub outlook_src: usize,
    pub google_src: usize,
    pub outlook_mirror: usize,
    pub google_mirror: usize,
    pub created_outlook: usize,
    pub created_google: usize,
    pub updated_outlook: usize,
    pub updated_google: usize,
    pub deleted_outlook: usize,
    pub deleted_google: usize,
    pub conflicts: usize,
    pub errors: usize,
}

impl TickSummary {
    pub(crate) fn record_created(&mut self, side: Origin) {
        match side {
            Origin::Outlook => self.created_outlook += 1,
            Origin::Google => self.created_google += 1,
        }
    }

    pub(crate) fn record_updated(&mut self, side: Origin) {
        match side {
            Origin::Outlook => self.updated_outlook += 1,
            Origin::Google => self.updated_google += 1,
        }
    }

    pub(crate) fn record_deleted(&mut self, side: Origin) {
        match side {
            Origin::Outlook => self.deleted_outlook += 1,
            Origin::Google => self.deleted_google += 1,
        }
    }

    /// Total successful calendar writes this tick.
    pub fn writes(&self) -> usize {
        self.created_outlook
            + self.created_google
            + self.updated_outlook
            + self.updated_google
            + self.deleted_outlook
            + self.deleted_google
    }
}

impl fmt::Display for TickSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "outlook={} google={} create_o={} create_g={} update_o={} update_g={} \
             delete_o={} delete_g={} conflicts={} errors={}",
            self.scanned_outlook,
            self.scanned_google,
            self.created_outlook,
            self.created_google,
            self.updated_outlook,
            self.updated_google,
            self.deleted_outlook,
            self.deleted_google,
            self.conflicts,
            self.errors,
        )
    }
}
