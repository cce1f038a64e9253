//! Background sync trigger.
//!
//! Edits made while offline leave a durable registration under a fixed tag.
//! The host platform calls [`BackgroundSync::wake`] once it sees
//! connectivity again, whether or not the app is in the foreground. A wake
//! runs the regular pass, so it shares the coordinator's one-pass-at-a-time
//! guard with the foreground triggers.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{PassOutcome, SyncCoordinator, SyncResult};

/// What a wake did.
#[derive(Debug, Clone, PartialEq)]
pub enum WakeOutcome {
    /// Tag is not ours; nothing ran
    UnknownTag,
    /// Tag is not registered; nothing ran
    NotRegistered,
    /// Another pass was running; registration kept for a later wake
    Skipped,
    /// A pass ran. `cleared` is true if nothing is left pending and the
    /// registration was removed.
    Completed { attempted: usize, synced: usize, cleared: bool },
}

/// Wake-side of the durable background registration.
pub struct BackgroundSync {
    coordinator: Arc<SyncCoordinator>,
}

impl BackgroundSync {
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn tag(&self) -> &str {
        self.coordinator.background_tag()
    }

    /// Register the background trigger. Idempotent.
    pub fn register(&self) -> SyncResult<()> {
        self.coordinator.register_background_sync()
    }

    pub fn registered_tags(&self) -> SyncResult<Vec<String>> {
        self.coordinator.store().background_sync_tags()
    }

    pub fn is_registered(&self) -> SyncResult<bool> {
        self.coordinator.store().is_background_sync_registered(self.tag())
    }

    /// Platform callback: connectivity is available, run the pass for `tag`.
    ///
    /// The registration survives until a completed pass leaves no visit
    /// pending, so failed pushes get another wake. Foreground passes release
    /// it the same way.
    pub async fn wake(&self, tag: &str) -> SyncResult<WakeOutcome> {
        if tag != self.tag() {
            warn!(tag, "Background wake for unknown tag ignored");
            return Ok(WakeOutcome::UnknownTag);
        }
        if !self.is_registered()? {
            debug!(tag, "Background wake without registration ignored");
            return Ok(WakeOutcome::NotRegistered);
        }

        let store = self.coordinator.store();
        store.mark_background_sync_fired(tag)?;

        let report = match self.coordinator.run_sync_pass().await {
            PassOutcome::Skipped => {
                debug!(tag, "Pass already running; background registration kept");
                return Ok(WakeOutcome::Skipped);
            }
            PassOutcome::Completed(report) => report,
        };

        // The pass itself releases the registration once nothing is pending
        let cleared = !store.is_background_sync_registered(tag)?;
        if !cleared {
            info!(tag, failed = report.failed(), "Background sync incomplete; registration kept");
        }

        Ok(WakeOutcome::Completed {
            attempted: report.attempted(),
            synced: report.synced(),
            cleared,
        })
    }
}
