//! Reconciliation scheduling.
//!
//! One background task drives the reconciler: a delayed initial run shortly
//! after startup, then a fixed-interval loop. On-demand triggers spawn a run
//! that queues behind any in-flight one via the reconciler's run lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::ReconcileConfig;
use crate::reconcile::Reconciler;

/// Start the background reconciliation loop.
pub fn start(reconciler: Arc<Reconciler>, config: &ReconcileConfig) -> JoinHandle<()> {
    let initial_delay = Duration::from_secs(config.initial_delay_secs);
    let interval = Duration::from_secs(config.interval_secs);

    tokio::spawn(async move {
        tokio::time::sleep(initial_delay).await;
        reconciler.reconcile().await;

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; the initial run just happened.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            reconciler.reconcile().await;
        }
    })
}

/// Trigger a reconciliation without blocking the caller.
pub fn trigger(reconciler: Arc<Reconciler>) {
    tokio::spawn(async move {
        reconciler.reconcile().await;
    });
}
