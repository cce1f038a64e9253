//! Durable background sync registrations.

use rusqlite::params;

use super::{Database, DbResult};

impl Database {
    /// Register a background sync tag. Re-registering an existing tag is a no-op.
    pub fn register_background_sync(&self, tag: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "INSERT OR IGNORE INTO background_sync (tag) VALUES (?)",
            [tag],
        )?;
        Ok(rows_affected > 0)
    }

    /// Remove a background sync registration once no visit is pending.
    ///
    /// The pending check and the delete are one statement, so a visit
    /// marked offline in between cannot lose its registration.
    pub fn release_background_sync(&self, tag: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            DELETE FROM background_sync
            WHERE tag = ?
              AND NOT EXISTS (SELECT 1 FROM visits WHERE sync_status = 'pending')
            "#,
            [tag],
        )?;
        Ok(rows_affected > 0)
    }

    /// All registered tags, oldest registration first.
    pub fn background_sync_tags(&self) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM background_sync ORDER BY registered_at, tag")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Whether a tag is currently registered.
    pub fn is_background_sync_registered(&self, tag: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM background_sync WHERE tag = ?",
            [tag],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Stamp the time a registration was last fired.
    pub fn mark_background_sync_fired(&self, tag: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE background_sync SET last_fired_at = ?2 WHERE tag = ?1",
            params![tag, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Patient, Visit};

    #[test]
    fn test_register_is_idempotent() {
        let db = Database::open_in_memory().unwrap();

        assert!(db.register_background_sync("sync-visits").unwrap());
        assert!(!db.register_background_sync("sync-visits").unwrap());
        assert_eq!(db.background_sync_tags().unwrap(), vec!["sync-visits"]);
    }

    #[test]
    fn test_release_waits_for_pending_visits() {
        let db = Database::open_in_memory().unwrap();
        let mut patient = Patient::new("Ada Obi".into(), "1984-03-02".into());
        db.insert_patient(&mut patient).unwrap();
        let mut visit = Visit::new(patient.id.unwrap(), "2024-08-01".into());
        let visit_id = db.insert_visit(&mut visit).unwrap();
        db.register_background_sync("sync-visits").unwrap();

        // Still pending: registration stays
        assert!(!db.release_background_sync("sync-visits").unwrap());
        assert!(db.is_background_sync_registered("sync-visits").unwrap());

        db.set_visit_synced(visit_id, &visit.content_hash()).unwrap();
        assert!(db.release_background_sync("sync-visits").unwrap());
        assert!(!db.is_background_sync_registered("sync-visits").unwrap());
        assert!(!db.release_background_sync("sync-visits").unwrap());
    }

    #[test]
    fn test_mark_fired() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.mark_background_sync_fired("sync-visits").unwrap());

        db.register_background_sync("sync-visits").unwrap();
        assert!(db.mark_background_sync_fired("sync-visits").unwrap());

        let fired: Option<String> = db
            .conn()
            .query_row(
                "SELECT last_fired_at FROM background_sync WHERE tag = 'sync-visits'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(fired.is_some());
    }
}
