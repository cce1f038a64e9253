//! Patient database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::Patient;

const PATIENT_COLUMNS: &str = r#"
    id, name, date_of_birth, address, phone_number, last_visit,
    created_at, updated_at
"#;

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        name: row.get(1)?,
        date_of_birth: row.get(2)?,
        address: row.get(3)?,
        phone_number: row.get(4)?,
        last_visit: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl Database {
    /// Insert a new patient, assigning its ID.
    pub fn insert_patient(&self, patient: &mut Patient) -> DbResult<i64> {
        if patient.id.is_some() {
            return Err(DbError::Constraint("Patient already has an ID".into()));
        }

        self.conn.execute(
            r#"
            INSERT INTO patients (
                name, date_of_birth, address, phone_number, last_visit,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                patient.name,
                patient.date_of_birth,
                patient.address,
                patient.phone_number,
                patient.last_visit,
                patient.created_at,
                patient.updated_at,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        patient.id = Some(id);
        Ok(id)
    }

    /// Update an existing patient.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let id = patient
            .id
            .ok_or_else(|| DbError::Constraint("Patient ID is required for update".into()))?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                name = ?2,
                date_of_birth = ?3,
                address = ?4,
                phone_number = ?5,
                last_visit = ?6,
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![
                id,
                patient.name,
                patient.date_of_birth,
                patient.address,
                patient.phone_number,
                patient.last_visit,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: i64) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?"),
                [id],
                patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Search patients by name (prefix match).
    pub fn search_patients(&self, query: &str, limit: usize) -> DbResult<Vec<Patient>> {
        let pattern = format!("{}%", query);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE name LIKE ? ORDER BY name LIMIT ?"
        ))?;

        let rows = stmt.query_map(params![pattern, limit as i64], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List all patients.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY name"
        ))?;

        let rows = stmt.query_map([], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a patient together with all of their visits.
    ///
    /// Both collections change in one transaction, or neither does.
    pub fn delete_patient(&self, id: i64) -> DbResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM visits WHERE patient_id = ?", [id])?;
        let rows_affected = tx.execute("DELETE FROM patients WHERE id = ?", [id])?;
        tx.commit()?;
        Ok(rows_affected > 0)
    }
}
