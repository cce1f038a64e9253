//! The slice of the local store the sync subsystem depends on.

use std::sync::Mutex;

use super::SyncResult;
use crate::db::Database;
use crate::models::Visit;

/// Local store operations needed by the coordinator.
///
/// Implementations must be usable from any thread, outside any UI context.
pub trait VisitStore: Send + Sync {
    /// Point-in-time, stably ordered snapshot of pending visits.
    fn pending_visits(&self) -> SyncResult<Vec<Visit>>;

    /// Mark a visit pending. `Ok(false)` if it does not exist.
    fn set_visit_pending(&self, visit_id: i64) -> SyncResult<bool>;

    /// Mark a visit synced if its content still hashes to `content_hash`.
    fn set_visit_synced(&self, visit_id: i64, content_hash: &str) -> SyncResult<bool>;

    fn record_push_failure(&self, visit_id: i64, error: &str) -> SyncResult<()>;

    fn register_background_sync(&self, tag: &str) -> SyncResult<()>;

    /// Drop the registration if no visit is pending. Returns whether it was removed.
    fn release_background_sync(&self, tag: &str) -> SyncResult<bool>;

    fn is_background_sync_registered(&self, tag: &str) -> SyncResult<bool>;

    fn background_sync_tags(&self) -> SyncResult<Vec<String>>;

    fn mark_background_sync_fired(&self, tag: &str) -> SyncResult<()>;
}

// Each call holds the lock for a single statement and never across an await.
impl VisitStore for Mutex<Database> {
    fn pending_visits(&self) -> SyncResult<Vec<Visit>> {
        Ok(self.lock()?.pending_visits()?)
    }

    fn set_visit_pending(&self, visit_id: i64) -> SyncResult<bool> {
        Ok(self.lock()?.set_visit_pending(visit_id)?)
    }

    fn set_visit_synced(&self, visit_id: i64, content_hash: &str) -> SyncResult<bool> {
        Ok(self.lock()?.set_visit_synced(visit_id, content_hash)?)
    }

    fn record_push_failure(&self, visit_id: i64, error: &str) -> SyncResult<()> {
        self.lock()?.record_push_failure(visit_id, error)?;
        Ok(())
    }

    fn register_background_sync(&self, tag: &str) -> SyncResult<()> {
        self.lock()?.register_background_sync(tag)?;
        Ok(())
    }

    fn release_background_sync(&self, tag: &str) -> SyncResult<bool> {
        Ok(self.lock()?.release_background_sync(tag)?)
    }

    fn is_background_sync_registered(&self, tag: &str) -> SyncResult<bool> {
        Ok(self.lock()?.is_background_sync_registered(tag)?)
    }

    fn background_sync_tags(&self) -> SyncResult<Vec<String>> {
        Ok(self.lock()?.background_sync_tags()?)
    }

    fn mark_background_sync_fired(&self, tag: &str) -> SyncResult<()> {
        self.lock()?.mark_background_sync_fired(tag)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Patient, SyncStatus};
    use std::sync::Arc;

    #[test]
    fn test_mutex_database_store() {
        let db = Database::open_in_memory().unwrap();
        let mut patient = Patient::new("Ada Obi".into(), "1984-03-02".into());
        db.insert_patient(&mut patient).unwrap();
        let mut visit = Visit::new(patient.id.unwrap(), "2024-04-01".into());
        let id = db.insert_visit(&mut visit).unwrap();

        let store: Arc<dyn VisitStore> = Arc::new(Mutex::new(db));

        let pending = store.pending_visits().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sync_status, SyncStatus::Pending);

        assert!(store.set_visit_synced(id, &visit.content_hash()).unwrap());
        assert!(store.pending_visits().unwrap().is_empty());

        assert!(store.set_visit_pending(id).unwrap());
        assert!(!store.set_visit_pending(id + 1).unwrap());
        assert_eq!(store.pending_visits().unwrap().len(), 1);
    }
}
