//! Sync coordinator: runs passes over the pending visits.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::{
    ConnectivityMonitor, SyncError, SyncResult, Transition, VisitRemote, VisitStore,
};
use crate::config::SyncConfig;
use crate::models::Visit;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Coordinator state. A pass can only start from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Running,
}

/// What happened to one visit during a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum VisitOutcome {
    /// Acknowledged and marked synced
    Synced,
    /// Acknowledged, but edited locally during the push; stays pending
    Superseded,
    /// Not acknowledged; stays pending
    PushFailed(String),
    /// Acknowledged, but the local status write failed; stays pending and
    /// will be re-submitted
    StatusUpdateFailed(String),
}

/// One visit's attempt within a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitAttempt {
    pub visit_id: i64,
    pub outcome: VisitOutcome,
}

/// Result of a completed pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    /// One entry per visit in the snapshot, in snapshot order
    pub attempts: Vec<VisitAttempt>,
    /// Set if the pending snapshot itself could not be read
    pub snapshot_error: Option<String>,
    pub duration_ms: u64,
}

impl PassReport {
    pub fn attempted(&self) -> usize {
        self.attempts.len()
    }

    pub fn synced(&self) -> usize {
        self.count(|o| matches!(o, VisitOutcome::Synced))
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.synced()
    }

    /// IDs of visits acknowledged and marked synced.
    pub fn synced_ids(&self) -> Vec<i64> {
        self.attempts
            .iter()
            .filter(|a| a.outcome == VisitOutcome::Synced)
            .map(|a| a.visit_id)
            .collect()
    }

    fn count(&self, pred: impl Fn(&VisitOutcome) -> bool) -> usize {
        self.attempts.iter().filter(|a| pred(&a.outcome)).count()
    }
}

/// Result of asking for a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// Another pass was running; this request was dropped
    Skipped,
    Completed(PassReport),
}

impl PassOutcome {
    pub fn report(&self) -> Option<&PassReport> {
        match self {
            PassOutcome::Skipped => None,
            PassOutcome::Completed(report) => Some(report),
        }
    }
}

/// Restores `Idle` when a pass ends, however it ends.
struct RunningGuard<'a>(&'a AtomicU8);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(IDLE, Ordering::Release);
    }
}

/// Drives reconciliation of pending visits with the remote service.
///
/// Construct one per process with [`SyncCoordinator::new`] and hand the
/// `Arc` to whatever needs to trigger syncs. At most one pass runs at a
/// time; requests that arrive while a pass is running are dropped, and the
/// next pass re-reads the pending set from the store.
pub struct SyncCoordinator {
    store: Arc<dyn VisitStore>,
    remote: Arc<dyn VisitRemote>,
    connectivity: Arc<ConnectivityMonitor>,
    background_tag: String,
    state: AtomicU8,
    trigger: Notify,
    reports: broadcast::Sender<PassReport>,
    passes_completed: AtomicU64,
}

impl SyncCoordinator {
    /// Create a coordinator and subscribe it to connectivity transitions.
    pub fn new(
        store: Arc<dyn VisitStore>,
        remote: Arc<dyn VisitRemote>,
        connectivity: Arc<ConnectivityMonitor>,
        config: &SyncConfig,
    ) -> Arc<Self> {
        let (reports, _) = broadcast::channel(16);
        let coordinator = Arc::new(Self {
            store,
            remote,
            connectivity,
            background_tag: config.background_tag.clone(),
            state: AtomicU8::new(IDLE),
            trigger: Notify::new(),
            reports,
            passes_completed: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&coordinator);
        coordinator.connectivity.subscribe(move |transition| {
            if transition != Transition::Restored {
                return;
            }
            if let Some(coordinator) = weak.upgrade() {
                coordinator.request_sync();
            }
        });

        coordinator
    }

    pub fn state(&self) -> CoordinatorState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => CoordinatorState::Running,
            _ => CoordinatorState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == CoordinatorState::Running
    }

    pub fn store(&self) -> &Arc<dyn VisitStore> {
        &self.store
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn background_tag(&self) -> &str {
        &self.background_tag
    }

    /// Number of passes that ran to completion.
    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Acquire)
    }

    /// Receive a report for every completed pass.
    pub fn subscribe(&self) -> broadcast::Receiver<PassReport> {
        self.reports.subscribe()
    }

    /// Run one pass over the visits pending right now.
    ///
    /// Returns [`PassOutcome::Skipped`] without touching anything if a pass
    /// is already running. Never fails as a whole: per-visit problems are
    /// recorded in the report.
    pub async fn run_sync_pass(&self) -> PassOutcome {
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync pass already running; request dropped");
            return PassOutcome::Skipped;
        }

        let guard = RunningGuard(&self.state);
        let report = self.execute_pass().await;
        if report.snapshot_error.is_none() {
            self.release_background_sync();
        }
        drop(guard);

        self.passes_completed.fetch_add(1, Ordering::AcqRel);
        // No subscribers is fine
        let _ = self.reports.send(report.clone());

        PassOutcome::Completed(report)
    }

    /// Mark a visit as needing sync, e.g. after an edit has been saved.
    ///
    /// While reachable this also requests a pass without waiting for it.
    /// While unreachable it leaves a durable background registration so the
    /// visit is pushed once connectivity returns.
    #[instrument(skip(self))]
    pub fn mark_for_sync(&self, visit_id: i64) -> SyncResult<()> {
        if !self.store.set_visit_pending(visit_id)? {
            return Err(SyncError::VisitNotFound(visit_id));
        }

        if self.connectivity.is_reachable() {
            self.request_sync();
        } else {
            self.register_background_sync()?;
            debug!("Offline; visit left pending for background sync");
        }
        Ok(())
    }

    /// Ask the worker for a pass without waiting.
    ///
    /// Requests made while a pass runs are dropped. Requests made while
    /// idle coalesce into a single pending trigger. Returns whether the
    /// request was accepted.
    pub fn request_sync(&self) -> bool {
        if self.is_running() {
            debug!("Sync pass running; trigger dropped");
            return false;
        }
        self.trigger.notify_one();
        true
    }

    /// Leave a durable registration for the background trigger.
    pub fn register_background_sync(&self) -> SyncResult<()> {
        self.store.register_background_sync(&self.background_tag)
    }

    /// Drop the background registration once nothing is left pending, so a
    /// foreground pass that drained the queue is not followed by a wake.
    fn release_background_sync(&self) {
        match self.store.release_background_sync(&self.background_tag) {
            Ok(true) => info!(tag = %self.background_tag, "Nothing pending; background registration cleared"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Failed to release background registration"),
        }
    }

    /// Spawn the task that turns triggers into passes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            debug!("Sync worker started");
            loop {
                coordinator.trigger.notified().await;
                coordinator.run_sync_pass().await;
            }
        })
    }

    async fn execute_pass(&self) -> PassReport {
        let started = Instant::now();

        let snapshot = match self.store.pending_visits() {
            Ok(visits) => visits,
            Err(e) => {
                error!(error = %e, "Failed to read pending visits; pass ends early");
                return PassReport {
                    snapshot_error: Some(e.to_string()),
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..PassReport::default()
                };
            }
        };

        info!(pending = snapshot.len(), "Sync pass started");

        let mut attempts = Vec::with_capacity(snapshot.len());
        for visit in snapshot {
            // Snapshot rows always come from the store and carry an ID
            let Some(visit_id) = visit.id else {
                warn!(local_uuid = %visit.local_uuid, "Pending visit without an ID skipped");
                continue;
            };
            let outcome = self.push_visit(visit_id, &visit).await;
            attempts.push(VisitAttempt { visit_id, outcome });
        }

        let report = PassReport {
            attempts,
            snapshot_error: None,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            attempted = report.attempted(),
            synced = report.synced(),
            failed = report.failed(),
            duration_ms = report.duration_ms,
            "Sync pass completed"
        );
        report
    }

    async fn push_visit(&self, visit_id: i64, visit: &Visit) -> VisitOutcome {
        let pushed_hash = visit.content_hash();

        let result = AssertUnwindSafe(self.remote.submit_visit(visit))
            .catch_unwind()
            .await;

        let error = match result {
            Ok(Ok(receipt)) => {
                debug!(visit_id, status = receipt.status, "Visit acknowledged");
                return self.confirm_synced(visit_id, &pushed_hash);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "remote panicked during push".to_string(),
        };

        warn!(visit_id, error = %error, "Push failed; visit stays pending");
        if let Err(e) = self.store.record_push_failure(visit_id, &error) {
            error!(visit_id, error = %e, "Failed to record push failure");
        }
        VisitOutcome::PushFailed(error)
    }

    fn confirm_synced(&self, visit_id: i64, pushed_hash: &str) -> VisitOutcome {
        match self.store.set_visit_synced(visit_id, pushed_hash) {
            Ok(true) => VisitOutcome::Synced,
            Ok(false) => {
                info!(visit_id, "Visit changed during push; left pending");
                VisitOutcome::Superseded
            }
            Err(e) => {
                error!(
                    visit_id,
                    error = %e,
                    "Remote acknowledged visit but status update failed; it will be re-submitted"
                );
                VisitOutcome::StatusUpdateFailed(e.to_string())
            }
        }
    }
}
