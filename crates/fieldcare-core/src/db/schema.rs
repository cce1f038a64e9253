//! SQLite schema definition.

/// Complete database schema for fieldcare.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    date_of_birth TEXT NOT NULL DEFAULT '',
    address TEXT NOT NULL DEFAULT '',
    phone_number TEXT NOT NULL DEFAULT '',
    last_visit TEXT,                             -- date of most recent visit
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name);
CREATE INDEX IF NOT EXISTS idx_patients_dob ON patients(date_of_birth);

-- ============================================================================
-- Visits (the only entity with sync state)
-- ============================================================================

CREATE TABLE IF NOT EXISTS visits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    local_uuid TEXT NOT NULL UNIQUE,             -- remote idempotency key
    patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    date TEXT NOT NULL,
    notes TEXT NOT NULL DEFAULT '',
    vital_signs TEXT NOT NULL DEFAULT '{}',      -- JSON object
    medications TEXT NOT NULL DEFAULT '[]',      -- JSON array of strings
    sync_status TEXT NOT NULL DEFAULT 'pending'
        CHECK (sync_status IN ('pending', 'synced')),
    content_hash TEXT NOT NULL,                  -- SHA-256 of current content
    synced_hash TEXT,                            -- content hash last acknowledged
    push_attempts INTEGER NOT NULL DEFAULT 0,    -- failed pushes since last ack
    last_sync_error TEXT,
    last_synced_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_visits_patient ON visits(patient_id);
CREATE INDEX IF NOT EXISTS idx_visits_date ON visits(date);
CREATE INDEX IF NOT EXISTS idx_visits_sync_status ON visits(sync_status);

-- ============================================================================
-- Background Sync Registrations (survive restarts)
-- ============================================================================

CREATE TABLE IF NOT EXISTS background_sync (
    tag TEXT PRIMARY KEY,
    registered_at TEXT NOT NULL DEFAULT (datetime('now')),
    last_fired_at TEXT
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_sync_status_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute("INSERT INTO patients (name) VALUES ('Ada')", [])
            .unwrap();

        let result = conn.execute(
            "INSERT INTO visits (local_uuid, patient_id, date, sync_status, content_hash)
             VALUES ('u1', 1, '2024-01-01', 'uploaded', 'h')",
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO visits (local_uuid, patient_id, date, content_hash)
             VALUES ('u1', 1, '2024-01-01', 'h')",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_visit_requires_patient() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO visits (local_uuid, patient_id, date, content_hash)
             VALUES ('u1', 99, '2024-01-01', 'h')",
            [],
        );
        assert!(result.is_err());
    }
}
