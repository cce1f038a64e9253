//! Visit models.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sync state of a visit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Current content has not been acknowledged by the remote service
    Pending,
    /// Current content was acknowledged by the remote service
    Synced,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "synced" => Some(SyncStatus::Synced),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vital signs captured during a visit. All free-text, as entered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalSigns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oxygen_saturation: Option<String>,
}

/// A patient visit.
///
/// The only entity with sync semantics. Everything except `id`, `local_uuid`
/// and the sync bookkeeping is opaque payload to the sync subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    /// Store-assigned ID - `None` until first insert
    pub id: Option<i64>,
    /// Stable client-generated UUID, used as the remote idempotency key
    pub local_uuid: String,
    /// Owning patient. Not validated by the sync subsystem.
    pub patient_id: i64,
    /// Visit date (YYYY-MM-DD)
    pub date: String,
    /// Clinical notes
    pub notes: String,
    pub vital_signs: VitalSigns,
    pub medications: Vec<String>,
    pub sync_status: SyncStatus,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

/// Fields covered by the content hash, in a fixed order.
#[derive(Serialize)]
struct VisitContent<'a> {
    patient_id: i64,
    date: &'a str,
    notes: &'a str,
    vital_signs: &'a VitalSigns,
    medications: &'a [String],
}

impl Visit {
    /// Create a new, not yet persisted visit. New visits are always pending.
    pub fn new(patient_id: i64, date: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: None,
            local_uuid: uuid::Uuid::new_v4().to_string(),
            patient_id,
            date,
            notes: String::new(),
            vital_signs: VitalSigns::default(),
            medications: Vec::new(),
            sync_status: SyncStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.sync_status == SyncStatus::Pending
    }

    /// SHA-256 over the canonical JSON of the visit's content.
    ///
    /// Sync status, IDs and timestamps are excluded, so the hash only changes
    /// when something a clinician entered changes.
    pub fn content_hash(&self) -> String {
        let content = VisitContent {
            patient_id: self.patient_id,
            date: &self.date,
            notes: &self.notes,
            vital_signs: &self.vital_signs,
            medications: &self.medications,
        };
        // Serializing a struct of strings and integers cannot fail.
        let json = serde_json::to_vec(&content).unwrap_or_default();
        hex::encode(Sha256::digest(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_visit() -> Visit {
        let mut visit = Visit::new(7, "2024-05-01".into());
        visit.notes = "Follow-up, wound healing well".into();
        visit.vital_signs.temperature = Some("37.1".into());
        visit.medications = vec!["amoxicillin 500mg".into()];
        visit
    }

    #[test]
    fn test_new_visit_is_pending() {
        let visit = Visit::new(1, "2024-05-01".into());
        assert!(visit.is_pending());
        assert!(visit.id.is_none());
        assert_eq!(visit.local_uuid.len(), 36);
    }

    #[test]
    fn test_content_hash_ignores_sync_state() {
        let visit = make_visit();
        let mut synced = visit.clone();
        synced.sync_status = SyncStatus::Synced;
        synced.id = Some(42);
        synced.updated_at = "2030-01-01T00:00:00Z".into();

        assert_eq!(visit.content_hash(), synced.content_hash());
    }

    #[test]
    fn test_content_hash_tracks_edits() {
        let visit = make_visit();
        let mut edited = visit.clone();
        edited.vital_signs.heart_rate = Some("88".into());

        assert_ne!(visit.content_hash(), edited.content_hash());
        assert_eq!(visit.content_hash().len(), 64);
    }

    #[test]
    fn test_wire_format() {
        let visit = make_visit();
        let json = serde_json::to_value(&visit).unwrap();

        assert_eq!(json["syncStatus"], "pending");
        assert_eq!(json["patientId"], 7);
        assert_eq!(json["vitalSigns"]["temperature"], "37.1");
        assert!(json["vitalSigns"].get("bloodPressure").is_none());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(SyncStatus::parse("pending"), Some(SyncStatus::Pending));
        assert_eq!(SyncStatus::parse("synced"), Some(SyncStatus::Synced));
        assert_eq!(SyncStatus::parse("done"), None);
    }
}
