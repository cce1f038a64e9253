//! Host-platform duties the daemon takes on: reachability probing,
//! background wakes and periodic wakes.
//!
//! A restore reaches the coordinator only through its connectivity
//! handler. Background registrations are fired here just once, at startup,
//! for edits left by a previous run; after that, passes release them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fieldcare_core::sync::WakeOutcome;
use fieldcare_core::{BackgroundSync, ConnectivityMonitor, HttpRemote, SyncConfig, SyncCoordinator};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Answers "is the remote service reachable right now".
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

#[async_trait]
impl ReachabilityProbe for HttpRemote {
    async fn probe(&self) -> bool {
        HttpRemote::probe(self).await
    }
}

/// Spawn the sync worker and every platform task. Abort the handles to stop.
pub fn spawn(
    coordinator: &Arc<SyncCoordinator>,
    probe: Arc<dyn ReachabilityProbe>,
    config: &SyncConfig,
) -> Vec<JoinHandle<()>> {
    let background = BackgroundSync::new(coordinator.clone());

    let mut tasks = vec![
        coordinator.spawn_worker(),
        tokio::spawn(probe_loop(
            probe,
            coordinator.connectivity().clone(),
            config.probe_interval(),
        )),
        tokio::spawn(startup_wake(background)),
    ];
    if let Some(interval) = config.wake_interval() {
        tasks.push(tokio::spawn(periodic_wake(coordinator.clone(), interval)));
    }
    tasks
}

/// Probe the remote on an interval and feed the result to the monitor.
async fn probe_loop(
    probe: Arc<dyn ReachabilityProbe>,
    connectivity: Arc<ConnectivityMonitor>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let reachable = probe.probe().await;
        connectivity.report(reachable);
    }
}

/// Fire registrations left by a previous run, if already reachable.
///
/// When starting offline there is nothing to do: the restore handler runs
/// the pass, and the pass releases the registration.
async fn startup_wake(background: BackgroundSync) {
    if !background.coordinator().connectivity().is_reachable() {
        debug!("Starting offline; background registrations wait for a restore");
        return;
    }

    let tags = match background.registered_tags() {
        Ok(tags) => tags,
        Err(e) => {
            error!(error = %e, "Failed to read background registrations");
            return;
        }
    };

    for tag in tags {
        match background.wake(&tag).await {
            Ok(WakeOutcome::Completed { attempted, synced, cleared }) => {
                info!(%tag, attempted, synced, cleared, "Startup background wake finished");
            }
            Ok(outcome) => debug!(%tag, ?outcome, "Startup background wake did not run a pass"),
            Err(e) => error!(%tag, error = %e, "Startup background wake failed"),
        }
    }
}

/// Request a pass on an interval while reachable.
async fn periodic_wake(coordinator: Arc<SyncCoordinator>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately; startup is covered elsewhere
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if coordinator.connectivity().is_reachable() {
            debug!("Periodic wake");
            coordinator.request_sync();
        }
    }
}
