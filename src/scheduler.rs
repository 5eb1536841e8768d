//! Background tasks owned by the process runtime. Each returns its
//! `JoinHandle`; abort it to stop the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::blacklist::BlacklistTracker;
use crate::prober::LatencyProber;

/// Run the blacklist recovery sweep every `interval`, starting immediately.
pub fn spawn_recovery_sweep(tracker: Arc<BlacklistTracker>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "Blacklist recovery sweep started");

        loop {
            ticker.tick().await;
            let tracker = tracker.clone();
            match tokio::task::spawn_blocking(move || tracker.auto_recover_expired()).await {
                Ok(Ok(recovered)) => debug!(recovered, "Blacklist recovery sweep finished"),
                Ok(Err(e)) => warn!(error = %e, "Blacklist recovery sweep failed"),
                Err(e) => error!(error = %e, "Blacklist recovery sweep task panicked"),
            }
        }
    })
}

/// Probe every registered endpoint every `interval`, starting immediately.
pub fn spawn_probe_loop(
    prober: Arc<LatencyProber>,
    interval: Duration,
    timeout_secs: Option<i64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = interval.as_secs(), "Endpoint probe loop started");

        loop {
            ticker.tick().await;
            match prober.test_registered_endpoints(timeout_secs).await {
                Ok(results) => {
                    let reachable = results.iter().filter(|r| r.is_success()).count();
                    info!(total = results.len(), reachable, "Endpoint probe pass finished");
                }
                Err(e) => warn!(error = %e, "Endpoint probe pass failed"),
            }
        }
    })
}
