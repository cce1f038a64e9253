//! Patient models.

use serde::{Deserialize, Serialize};

/// A patient record.
///
/// Patients carry no sync state of their own; only their visits are pushed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Store-assigned ID - `None` until first insert
    pub id: Option<i64>,
    /// Full name
    pub name: String,
    /// Date of birth (YYYY-MM-DD)
    pub date_of_birth: String,
    /// Home address
    pub address: String,
    /// Contact phone number
    pub phone_number: String,
    /// Date of the most recent visit, if any
    pub last_visit: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Patient {
    /// Create a new, not yet persisted patient.
    pub fn new(name: String, date_of_birth: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: None,
            name,
            date_of_birth,
            address: String::new(),
            phone_number: String::new(),
            last_visit: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Whether the store has assigned an ID yet.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_patient() {
        let patient = Patient::new("Ada Obi".into(), "1984-03-02".into());
        assert_eq!(patient.name, "Ada Obi");
        assert_eq!(patient.date_of_birth, "1984-03-02");
        assert!(!patient.is_persisted());
        assert!(patient.last_visit.is_none());
    }
}
