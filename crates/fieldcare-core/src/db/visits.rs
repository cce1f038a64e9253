//! Visit database operations, including the per-visit sync status markers.

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DbError, DbResult};
use crate::models::{SyncStatus, Visit, VitalSigns};

const VISIT_COLUMNS: &str = r#"
    id, local_uuid, patient_id, date, notes, vital_signs, medications,
    sync_status, created_at, updated_at
"#;

/// Sync bookkeeping for a single visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitSyncInfo {
    pub visit_id: i64,
    pub status: SyncStatus,
    /// Hash of the content currently stored
    pub content_hash: String,
    /// Hash of the content last acknowledged by the remote
    pub synced_hash: Option<String>,
    /// Failed pushes since the last acknowledgement
    pub push_attempts: u32,
    pub last_sync_error: Option<String>,
    pub last_synced_at: Option<String>,
}

impl Database {
    /// Insert a new visit, assigning its ID.
    ///
    /// New visits are always stored as pending, whatever the caller set.
    pub fn insert_visit(&self, visit: &mut Visit) -> DbResult<i64> {
        if visit.id.is_some() {
            return Err(DbError::Constraint("Visit already has an ID".into()));
        }
        visit.sync_status = SyncStatus::Pending;

        let vital_signs_json = serde_json::to_string(&visit.vital_signs)?;
        let medications_json = serde_json::to_string(&visit.medications)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO visits (
                local_uuid, patient_id, date, notes, vital_signs, medications,
                sync_status, content_hash, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                visit.local_uuid,
                visit.patient_id,
                visit.date,
                visit.notes,
                vital_signs_json,
                medications_json,
                visit.sync_status.as_str(),
                visit.content_hash(),
                visit.created_at,
                visit.updated_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        touch_last_visit(&tx, visit.patient_id, &visit.date)?;
        tx.commit()?;

        visit.id = Some(id);
        Ok(id)
    }

    /// Save edited visit content.
    ///
    /// Any content edit resets the visit to pending, even if it was synced.
    pub fn update_visit(&self, visit: &mut Visit) -> DbResult<bool> {
        let id = visit
            .id
            .ok_or_else(|| DbError::Constraint("Visit ID is required for update".into()))?;

        let vital_signs_json = serde_json::to_string(&visit.vital_signs)?;
        let medications_json = serde_json::to_string(&visit.medications)?;

        let tx = self.conn.unchecked_transaction()?;
        let rows_affected = tx.execute(
            r#"
            UPDATE visits SET
                patient_id = ?2,
                date = ?3,
                notes = ?4,
                vital_signs = ?5,
                medications = ?6,
                content_hash = ?7,
                sync_status = 'pending',
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![
                id,
                visit.patient_id,
                visit.date,
                visit.notes,
                vital_signs_json,
                medications_json,
                visit.content_hash(),
            ],
        )?;
        if rows_affected > 0 {
            touch_last_visit(&tx, visit.patient_id, &visit.date)?;
        }
        tx.commit()?;

        if rows_affected > 0 {
            visit.sync_status = SyncStatus::Pending;
        }
        Ok(rows_affected > 0)
    }

    /// Get a visit by ID.
    pub fn get_visit(&self, id: i64) -> DbResult<Option<Visit>> {
        self.conn
            .query_row(
                &format!("SELECT {VISIT_COLUMNS} FROM visits WHERE id = ?"),
                [id],
                VisitRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List a patient's visits, most recent date first.
    pub fn list_visits_for_patient(&self, patient_id: i64) -> DbResult<Vec<Visit>> {
        self.query_visits(
            &format!(
                "SELECT {VISIT_COLUMNS} FROM visits WHERE patient_id = ? ORDER BY date DESC, id DESC"
            ),
            [patient_id],
        )
    }

    /// Delete a single visit.
    pub fn delete_visit(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM visits WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    // =========================================================================
    // Sync status markers
    // =========================================================================

    /// All pending visits, in ID order.
    ///
    /// One SELECT, so the result is a point-in-time snapshot with no duplicates.
    pub fn pending_visits(&self) -> DbResult<Vec<Visit>> {
        self.query_visits(
            &format!(
                "SELECT {VISIT_COLUMNS} FROM visits WHERE sync_status = 'pending' ORDER BY id"
            ),
            [],
        )
    }

    /// Mark a visit pending. Touches only the status column.
    ///
    /// Returns `false` if the visit does not exist.
    pub fn set_visit_pending(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE visits SET sync_status = 'pending' WHERE id = ?",
            [id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Mark a visit synced, provided its content still matches what was pushed.
    ///
    /// Returns `false` if the visit was edited (or deleted) since `content_hash`
    /// was computed; the visit then stays pending.
    pub fn set_visit_synced(&self, id: i64, content_hash: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE visits SET
                sync_status = 'synced',
                synced_hash = ?2,
                push_attempts = 0,
                last_sync_error = NULL,
                last_synced_at = datetime('now')
            WHERE id = ?1 AND content_hash = ?2
            "#,
            params![id, content_hash],
        )?;
        Ok(rows_affected > 0)
    }

    /// Record a failed push against a visit. Status is left untouched.
    pub fn record_push_failure(&self, id: i64, error: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE visits SET
                push_attempts = push_attempts + 1,
                last_sync_error = ?2
            WHERE id = ?1
            "#,
            params![id, error],
        )?;
        Ok(rows_affected > 0)
    }

    /// Sync bookkeeping for a visit.
    pub fn visit_sync_info(&self, id: i64) -> DbResult<Option<VisitSyncInfo>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, sync_status, content_hash, synced_hash, push_attempts,
                       last_sync_error, last_synced_at
                FROM visits
                WHERE id = ?
                "#,
                [id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;

        row.map(
            |(visit_id, status, content_hash, synced_hash, push_attempts, last_sync_error, last_synced_at)| {
                Ok(VisitSyncInfo {
                    visit_id,
                    status: parse_status(&status)?,
                    content_hash,
                    synced_hash,
                    push_attempts,
                    last_sync_error,
                    last_synced_at,
                })
            },
        )
        .transpose()
    }

    /// Count visits in a given sync state.
    pub fn count_visits_by_status(&self, status: SyncStatus) -> DbResult<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM visits WHERE sync_status = ?",
            [status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    fn query_visits<P: rusqlite::Params>(&self, sql: &str, params: P) -> DbResult<Vec<Visit>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, VisitRow::from_row)?;

        let mut visits = Vec::new();
        for row in rows {
            visits.push(row?.try_into()?);
        }
        Ok(visits)
    }
}

/// Keep the patient's `last_visit` pointing at their newest visit date.
fn touch_last_visit(conn: &rusqlite::Connection, patient_id: i64, date: &str) -> DbResult<()> {
    conn.execute(
        r#"
        UPDATE patients SET last_visit = ?2, updated_at = datetime('now')
        WHERE id = ?1 AND (last_visit IS NULL OR last_visit < ?2)
        "#,
        params![patient_id, date],
    )?;
    Ok(())
}

fn parse_status(s: &str) -> DbResult<SyncStatus> {
    SyncStatus::parse(s).ok_or_else(|| DbError::Constraint(format!("Unknown sync status: {}", s)))
}

/// Raw visit row before JSON columns are decoded.
struct VisitRow {
    id: i64,
    local_uuid: String,
    patient_id: i64,
    date: String,
    notes: String,
    vital_signs: String,
    medications: String,
    sync_status: String,
    created_at: String,
    updated_at: String,
}

impl VisitRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(VisitRow {
            id: row.get(0)?,
            local_uuid: row.get(1)?,
            patient_id: row.get(2)?,
            date: row.get(3)?,
            notes: row.get(4)?,
            vital_signs: row.get(5)?,
            medications: row.get(6)?,
            sync_status: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl TryFrom<VisitRow> for Visit {
    type Error = DbError;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        let vital_signs: VitalSigns = serde_json::from_str(&row.vital_signs)?;
        let medications: Vec<String> = serde_json::from_str(&row.medications)?;

        Ok(Visit {
            id: Some(row.id),
            local_uuid: row.local_uuid,
            patient_id: row.patient_id,
            date: row.date,
            notes: row.notes,
            vital_signs,
            medications,
            sync_status: parse_status(&row.sync_status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Patient;

    fn setup_db() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let mut patient = Patient::new("Ada Obi".into(), "1984-03-02".into());
        let patient_id = db.insert_patient(&mut patient).unwrap();
        (db, patient_id)
    }

    fn make_visit(patient_id: i64, date: &str) -> Visit {
        let mut visit = Visit::new(patient_id, date.into());
        visit.notes = "Routine check".into();
        visit.vital_signs.blood_pressure = Some("120/80".into());
        visit.medications = vec!["paracetamol".into()];
        visit
    }

    #[test]
    fn test_insert_and_get() {
        let (db, patient_id) = setup_db();

        let mut visit = make_visit(patient_id, "2024-02-01");
        let id = db.insert_visit(&mut visit).unwrap();

        let retrieved = db.get_visit(id).unwrap().unwrap();
        assert_eq!(retrieved, visit);
        assert_eq!(retrieved.vital_signs.blood_pressure, Some("120/80".into()));
    }

    #[test]
    fn test_insert_forces_pending() {
        let (db, patient_id) = setup_db();

        let mut visit = make_visit(patient_id, "2024-02-01");
        visit.sync_status = SyncStatus::Synced;
        let id = db.insert_visit(&mut visit).unwrap();

        assert_eq!(db.get_visit(id).unwrap().unwrap().sync_status, SyncStatus::Pending);
    }

    #[test]
    fn test_insert_updates_last_visit() {
        let (db, patient_id) = setup_db();

        db.insert_visit(&mut make_visit(patient_id, "2024-02-01")).unwrap();
        db.insert_visit(&mut make_visit(patient_id, "2024-01-15")).unwrap();

        let patient = db.get_patient(patient_id).unwrap().unwrap();
        assert_eq!(patient.last_visit, Some("2024-02-01".into()));
    }

    #[test]
    fn test_edit_resets_synced_to_pending() {
        let (db, patient_id) = setup_db();

        let mut visit = make_visit(patient_id, "2024-02-01");
        let id = db.insert_visit(&mut visit).unwrap();
        assert!(db.set_visit_synced(id, &visit.content_hash()).unwrap());
        assert_eq!(db.get_visit(id).unwrap().unwrap().sync_status, SyncStatus::Synced);

        visit.notes = "Routine check, BP re-measured".into();
        assert!(db.update_visit(&mut visit).unwrap());

        let retrieved = db.get_visit(id).unwrap().unwrap();
        assert_eq!(retrieved.sync_status, SyncStatus::Pending);
        assert_eq!(retrieved.notes, "Routine check, BP re-measured");
    }

    #[test]
    fn test_set_synced_rejects_stale_hash() {
        let (db, patient_id) = setup_db();

        let mut visit = make_visit(patient_id, "2024-02-01");
        let id = db.insert_visit(&mut visit).unwrap();
        let pushed_hash = visit.content_hash();

        // Edited while the push was in flight
        visit.medications.push("ibuprofen".into());
        db.update_visit(&mut visit).unwrap();

        assert!(!db.set_visit_synced(id, &pushed_hash).unwrap());
        assert_eq!(db.get_visit(id).unwrap().unwrap().sync_status, SyncStatus::Pending);
    }

    #[test]
    fn test_status_updates_are_idempotent() {
        let (db, patient_id) = setup_db();

        let mut visit = make_visit(patient_id, "2024-02-01");
        let id = db.insert_visit(&mut visit).unwrap();
        let hash = visit.content_hash();

        assert!(db.set_visit_synced(id, &hash).unwrap());
        assert!(db.set_visit_synced(id, &hash).unwrap());
        assert!(db.set_visit_pending(id).unwrap());
        assert!(db.set_visit_pending(id).unwrap());

        // Status changes never touch content
        let retrieved = db.get_visit(id).unwrap().unwrap();
        assert_eq!(retrieved.notes, visit.notes);
        assert_eq!(retrieved.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn test_status_update_missing_visit() {
        let (db, _) = setup_db();
        assert!(!db.set_visit_pending(404).unwrap());
        assert!(!db.set_visit_synced(404, "hash").unwrap());
    }

    #[test]
    fn test_pending_visits_snapshot() {
        let (db, patient_id) = setup_db();

        let mut ids = Vec::new();
        for day in 1..=4 {
            let mut visit = make_visit(patient_id, &format!("2024-03-0{}", day));
            ids.push(db.insert_visit(&mut visit).unwrap());
        }
        let synced = db.get_visit(ids[1]).unwrap().unwrap();
        db.set_visit_synced(ids[1], &synced.content_hash()).unwrap();

        let pending: Vec<i64> = db
            .pending_visits()
            .unwrap()
            .into_iter()
            .filter_map(|v| v.id)
            .collect();
        assert_eq!(pending, vec![ids[0], ids[2], ids[3]]);
        assert_eq!(db.count_visits_by_status(SyncStatus::Pending).unwrap(), 3);
        assert_eq!(db.count_visits_by_status(SyncStatus::Synced).unwrap(), 1);
    }

    #[test]
    fn test_push_failure_bookkeeping() {
        let (db, patient_id) = setup_db();

        let mut visit = make_visit(patient_id, "2024-02-01");
        let id = db.insert_visit(&mut visit).unwrap();

        db.record_push_failure(id, "timed out").unwrap();
        db.record_push_failure(id, "HTTP 503").unwrap();

        let info = db.visit_sync_info(id).unwrap().unwrap();
        assert_eq!(info.status, SyncStatus::Pending);
        assert_eq!(info.push_attempts, 2);
        assert_eq!(info.last_sync_error, Some("HTTP 503".into()));

        db.set_visit_synced(id, &visit.content_hash()).unwrap();
        let info = db.visit_sync_info(id).unwrap().unwrap();
        assert_eq!(info.push_attempts, 0);
        assert!(info.last_sync_error.is_none());
        assert!(info.last_synced_at.is_some());
        assert_eq!(info.synced_hash, Some(visit.content_hash()));
    }

    #[test]
    fn test_list_visits_newest_first() {
        let (db, patient_id) = setup_db();

        for date in ["2024-01-10", "2024-03-05", "2024-02-20"] {
            db.insert_visit(&mut make_visit(patient_id, date)).unwrap();
        }

        let dates: Vec<String> = db
            .list_visits_for_patient(patient_id)
            .unwrap()
            .into_iter()
            .map(|v| v.date)
            .collect();
        assert_eq!(dates, vec!["2024-03-05", "2024-02-20", "2024-01-10"]);
    }

    #[test]
    fn test_delete_visit() {
        let (db, patient_id) = setup_db();
        let mut visit = make_visit(patient_id, "2024-02-01");
        let id = db.insert_visit(&mut visit).unwrap();

        assert!(db.delete_visit(id).unwrap());
        assert!(db.get_visit(id).unwrap().is_none());
        assert!(db.visit_sync_info(id).unwrap().is_none());
    }
}
