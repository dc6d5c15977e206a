//! Periodic reconciliation loop.
//!
//! Re-reads the config store on a fixed interval and feeds the result into
//! [`ConnectionManager::reconcile`], so edits made by any process converge
//! onto this one. A store outage skips the tick and the loop keeps going.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::manager::ConnectionManager;

pub struct Reconciler {
    handle: JoinHandle<()>,
}

impl Reconciler {
    /// Start the loop. The first reconcile runs one full interval after
    /// spawn; callers that want immediate convergence call
    /// `manager.initialize()` or `reconcile_from_store()` themselves.
    pub fn spawn(manager: Arc<ConnectionManager>, interval: Duration) -> Self {
        info!(interval_ms = interval.as_millis() as u64, "starting reconciliation loop");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately once; consume that tick.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match manager.reconcile_from_store().await {
                    Ok(()) => debug!("reconcile tick complete"),
                    Err(e) => warn!("skipping reconcile tick: {e}"),
                }
            }
        });
        Self { handle }
    }

    /// Stop the loop. Live connections are untouched; only the timer dies.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
