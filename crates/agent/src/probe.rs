//! Backend reachability probe.
//!
//! Pings the row store on a fixed interval and reports the outcome to a
//! [`ConnectivityMonitor`]. Only transitions wake the sync engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use continuity_db::RowStore;
use continuity_sync::{Connectivity, ConnectivityMonitor};

/// Ping once, bounded by `timeout`.
pub async fn check(rows: &dyn RowStore, timeout: Duration) -> Connectivity {
    match tokio::time::timeout(timeout, rows.ping()).await {
        Ok(Ok(())) => Connectivity::Online,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Backend ping failed");
            Connectivity::Offline
        }
        Err(_) => {
            tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Backend ping timed out");
            Connectivity::Offline
        }
    }
}

/// Probe until `cancel` fires. The first probe runs immediately.
pub async fn run(
    rows: Arc<dyn RowStore>,
    monitor: Arc<ConnectivityMonitor>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let connectivity = check(rows.as_ref(), interval).await;
                monitor.set(connectivity);
            }
        }
    }
}
