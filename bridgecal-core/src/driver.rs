//! Runs reconciliation ticks, once or on a fixed interval.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::adapter::CalendarAdapter;
use crate::config::WindowConfig;
use crate::engine::SyncEngine;
use crate::error::{BridgeCalError, BridgeCalResult};
use crate::summary::TickSummary;
use crate::window::SyncWindow;

pub struct TickDriver<O, G> {
    engine: SyncEngine<O, G>,
    window: WindowConfig,
    interval: Duration,
}

impl<O: CalendarAdapter, G: CalendarAdapter> TickDriver<O, G> {
    pub fn new(engine: SyncEngine<O, G>, window: WindowConfig, interval: Duration) -> Self {
        TickDriver {
            engine,
            window,
            interval,
        }
    }

    /// One reconciliation tick over the configured window.
    pub async fn run_once(&mut self, cancel: &CancellationToken) -> BridgeCalResult<TickSummary> {
        let window = SyncWindow::around(Utc::now(), self.window.past_days, self.window.future_days);
        self.engine.run_tick(&window, cancel).await
    }

    /// Tick, sleep, repeat until cancelled.
    ///
    /// Cancellation at a sleep point is immediate; a tick in flight runs to
    /// its next checkpoint first. Transient tick failures are logged and the
    /// loop keeps going; configuration and credential failures stop it.
    pub async fn run_loop(&mut self, cancel: &CancellationToken) -> BridgeCalResult<()> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            match self.run_once(cancel).await {
                Ok(_) => {}
                Err(e @ (BridgeCalError::Config(_) | BridgeCalError::Auth(_))) => {
                    return Err(e);
                }
                Err(e) => error!(error = %e, "sync pass failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
