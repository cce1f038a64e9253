//! Offline synchronization.
//!
//! Visits are written locally first and carry a `pending`/`synced` marker.
//! The [`SyncCoordinator`] pushes pending visits to the remote service, one
//! pass at a time, when connectivity returns, when a visit is marked for
//! sync while online, or when a background wake fires.
//!
//! ```text
//!   ConnectivityMonitor ──(restored)──┐
//!                                     ▼
//!   mark_for_sync ──(online)──► request_sync ──► [single-slot trigger] ──► worker
//!        │                                                                  │
//!     (offline)                                                             ▼
//!        ▼                                                           run_sync_pass
//!   background registration ──► BackgroundSync::wake ─────────────────────►│
//!                                                            (at most one at a time)
//! ```

mod background;
mod connectivity;
mod coordinator;
mod remote;
mod store;

pub use background::*;
pub use connectivity::*;
pub use coordinator::*;
pub use remote::*;
pub use store::*;

use thiserror::Error;

use crate::db::DbError;

/// Errors surfaced to callers of the sync subsystem.
///
/// Per-visit push failures never show up here; they are recorded on the
/// visit and reported in the [`PassReport`].
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local store error: {0}")]
    Store(#[from] DbError),

    #[error("Local store lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Visit not found: {0}")]
    VisitNotFound(i64),
}

impl<T> From<std::sync::PoisonError<T>> for SyncError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        SyncError::LockPoisoned(e.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
