//! FieldCare Core Library
//!
//! Local-first patient visit record keeping with offline synchronization.
//!
//! # Architecture
//!
//! ```text
//!   UI save ──► Local Store (SQLite) ──► visit.sync_status = pending
//!                                                 │
//!          ┌──────────────────────┬───────────────┼──────────────────┐
//!          │                      │               │                  │
//!   connectivity restored   mark_for_sync   background wake    periodic wake
//!          │                 (if online)     (tag: sync-visits)      │
//!          └──────────────────────┴───────────────┼──────────────────┘
//!                                                 ▼
//!                                  ┌──────────────────────────────┐
//!                                  │   Sync Coordinator (1 pass)  │
//!                                  │   snapshot pending visits    │
//!                                  │   push each → POST /api/...  │
//!                                  │   ack → mark synced          │
//!                                  └──────────────────────────────┘
//! ```
//!
//! # Core Principle
//!
//! **No visit is silently lost.** A visit only becomes `synced` after the
//! remote acknowledged its current content; anything else leaves it pending.
//!
//! # Modules
//!
//! - [`db`]: SQLite local store
//! - [`models`]: Domain types (Patient, Visit, SyncStatus)
//! - [`sync`]: Connectivity monitor, sync coordinator, background trigger
//! - [`config`]: Sync settings

pub mod config;
pub mod db;
pub mod models;
pub mod sync;

// Re-export commonly used types
pub use config::SyncConfig;
pub use db::Database;
pub use models::{Patient, SyncStatus, Visit, VitalSigns};
pub use sync::{
    BackgroundSync, ConnectivityMonitor, HttpRemote, PassOutcome, PassReport, SyncCoordinator,
    VisitRemote, VisitStore,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum FieldCareError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Sync error: {0}")]
    SyncError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<db::DbError> for FieldCareError {
    fn from(e: db::DbError) -> Self {
        FieldCareError::DatabaseError(e.to_string())
    }
}

impl From<sync::SyncError> for FieldCareError {
    fn from(e: sync::SyncError) -> Self {
        match e {
            sync::SyncError::VisitNotFound(id) => FieldCareError::NotFound(format!("visit {}", id)),
            sync::SyncError::Store(e) => FieldCareError::DatabaseError(e.to_string()),
            other => FieldCareError::SyncError(other.to_string()),
        }
    }
}

impl From<sync::PushError> for FieldCareError {
    fn from(e: sync::PushError) -> Self {
        FieldCareError::SyncError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for FieldCareError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        FieldCareError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
///
/// `reachable` is the platform's current network reachability.
#[uniffi::export]
pub fn open_database(
    path: String,
    endpoint: String,
    reachable: bool,
) -> Result<Arc<FieldCareCore>, FieldCareError> {
    let db = Database::open(&path)?;
    FieldCareCore::start(db, endpoint, reachable)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory(
    endpoint: String,
    reachable: bool,
) -> Result<Arc<FieldCareCore>, FieldCareError> {
    let db = Database::open_in_memory()?;
    FieldCareCore::start(db, endpoint, reachable)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe handle to the store and sync subsystem, for FFI.
///
/// Owns the tokio runtime the sync worker runs on; lives as long as the
/// host application holds it.
#[derive(uniffi::Object)]
pub struct FieldCareCore {
    db: Arc<Mutex<Database>>,
    coordinator: Arc<SyncCoordinator>,
    background: BackgroundSync,
    runtime: tokio::runtime::Runtime,
}

impl FieldCareCore {
    fn start(db: Database, endpoint: String, reachable: bool) -> Result<Arc<Self>, FieldCareError> {
        let config = SyncConfig {
            endpoint,
            ..SyncConfig::default()
        };
        Self::with_remote(db, Arc::new(HttpRemote::new(&config)?), reachable, &config)
    }

    /// Build a core around any push implementation.
    pub fn with_remote(
        db: Database,
        remote: Arc<dyn VisitRemote>,
        reachable: bool,
        config: &SyncConfig,
    ) -> Result<Arc<Self>, FieldCareError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("fieldcare-sync")
            .enable_all()
            .build()
            .map_err(|e| FieldCareError::RuntimeError(e.to_string()))?;

        let db = Arc::new(Mutex::new(db));
        let connectivity = Arc::new(ConnectivityMonitor::new(reachable));
        let coordinator = SyncCoordinator::new(db.clone(), remote, connectivity, config);
        {
            let _guard = runtime.enter();
            coordinator.spawn_worker();
        }

        Ok(Arc::new(Self {
            db,
            background: BackgroundSync::new(coordinator.clone()),
            coordinator,
            runtime,
        }))
    }

    /// Save an edited or new visit, then mark it for sync.
    fn save_and_mark(&self, visit_id: i64) -> Result<FfiVisit, FieldCareError> {
        self.coordinator.mark_for_sync(visit_id)?;
        let db = self.db.lock()?;
        let visit = db
            .get_visit(visit_id)?
            .ok_or_else(|| FieldCareError::NotFound(format!("visit {}", visit_id)))?;
        Ok(visit.into())
    }
}

#[uniffi::export]
impl FieldCareCore {
    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Create a new patient.
    pub fn create_patient(&self, input: FfiPatientInput) -> Result<FfiPatient, FieldCareError> {
        input.validate()?;
        let db = self.db.lock()?;
        let mut patient = Patient::new(input.name, input.date_of_birth);
        patient.address = input.address;
        patient.phone_number = input.phone_number;
        db.insert_patient(&mut patient)?;
        Ok(patient.into())
    }

    /// Update a patient's details.
    pub fn update_patient(
        &self,
        patient_id: i64,
        input: FfiPatientInput,
    ) -> Result<FfiPatient, FieldCareError> {
        input.validate()?;
        let db = self.db.lock()?;
        let mut patient = db
            .get_patient(patient_id)?
            .ok_or_else(|| FieldCareError::NotFound(format!("patient {}", patient_id)))?;
        patient.name = input.name;
        patient.date_of_birth = input.date_of_birth;
        patient.address = input.address;
        patient.phone_number = input.phone_number;
        db.update_patient(&patient)?;
        Ok(patient.into())
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, patient_id: i64) -> Result<Option<FfiPatient>, FieldCareError> {
        let db = self.db.lock()?;
        let patient = db.get_patient(patient_id)?;
        Ok(patient.map(|p| p.into()))
    }

    /// List all patients by name.
    pub fn list_patients(&self) -> Result<Vec<FfiPatient>, FieldCareError> {
        let db = self.db.lock()?;
        let patients = db.list_patients()?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    /// Search patients by name.
    pub fn search_patients(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<FfiPatient>, FieldCareError> {
        let db = self.db.lock()?;
        let patients = db.search_patients(&query, limit as usize)?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    /// Delete a patient and all of their visits.
    pub fn delete_patient(&self, patient_id: i64) -> Result<bool, FieldCareError> {
        let db = self.db.lock()?;
        Ok(db.delete_patient(patient_id)?)
    }

    // =========================================================================
    // Visit Operations
    // =========================================================================

    /// Record a new visit. It starts pending and is pushed when possible.
    pub fn add_visit(
        &self,
        patient_id: i64,
        input: FfiVisitInput,
    ) -> Result<FfiVisit, FieldCareError> {
        input.validate()?;
        let visit_id = {
            let db = self.db.lock()?;
            let mut visit = Visit::new(patient_id, input.date.clone());
            input.apply(&mut visit);
            db.insert_visit(&mut visit)?
        };
        self.save_and_mark(visit_id)
    }

    /// Edit a visit. Any edit puts it back to pending.
    pub fn update_visit(
        &self,
        visit_id: i64,
        input: FfiVisitInput,
    ) -> Result<FfiVisit, FieldCareError> {
        input.validate()?;
        {
            let db = self.db.lock()?;
            let mut visit = db
                .get_visit(visit_id)?
                .ok_or_else(|| FieldCareError::NotFound(format!("visit {}", visit_id)))?;
            visit.date = input.date.clone();
            input.apply(&mut visit);
            db.update_visit(&mut visit)?;
        }
        self.save_and_mark(visit_id)
    }

    /// Get a visit by ID.
    pub fn get_visit(&self, visit_id: i64) -> Result<Option<FfiVisit>, FieldCareError> {
        let db = self.db.lock()?;
        let visit = db.get_visit(visit_id)?;
        Ok(visit.map(|v| v.into()))
    }

    /// A patient's visits, most recent first.
    pub fn list_visits_for_patient(&self, patient_id: i64) -> Result<Vec<FfiVisit>, FieldCareError> {
        let db = self.db.lock()?;
        let visits = db.list_visits_for_patient(patient_id)?;
        Ok(visits.into_iter().map(|v| v.into()).collect())
    }

    /// Delete a visit.
    pub fn delete_visit(&self, visit_id: i64) -> Result<bool, FieldCareError> {
        let db = self.db.lock()?;
        Ok(db.delete_visit(visit_id)?)
    }

    // =========================================================================
    // Sync Operations
    // =========================================================================

    /// Mark a visit as needing sync.
    pub fn mark_for_sync(&self, visit_id: i64) -> Result<(), FieldCareError> {
        Ok(self.coordinator.mark_for_sync(visit_id)?)
    }

    /// Platform reachability callback.
    pub fn set_network_reachable(&self, reachable: bool) {
        self.coordinator.connectivity().report(reachable);
    }

    /// Current reachability belief.
    pub fn is_network_reachable(&self) -> bool {
        self.coordinator.connectivity().is_reachable()
    }

    /// Run a pass now and wait for it. `None` if a pass was already running.
    pub fn run_sync_pass(&self) -> Option<FfiPassReport> {
        match self.runtime.block_on(self.coordinator.run_sync_pass()) {
            PassOutcome::Skipped => None,
            PassOutcome::Completed(report) => Some(report.into()),
        }
    }

    /// Platform background-sync callback. Returns whether a pass ran.
    pub fn on_background_sync(&self, tag: String) -> Result<bool, FieldCareError> {
        let outcome = self.runtime.block_on(self.background.wake(&tag))?;
        Ok(matches!(outcome, sync::WakeOutcome::Completed { .. }))
    }

    /// Snapshot of sync progress for status displays.
    pub fn sync_summary(&self) -> Result<FfiSyncSummary, FieldCareError> {
        let (pending, synced) = {
            let db = self.db.lock()?;
            (
                db.count_visits_by_status(SyncStatus::Pending)?,
                db.count_visits_by_status(SyncStatus::Synced)?,
            )
        };
        Ok(FfiSyncSummary {
            pending,
            synced,
            reachable: self.coordinator.connectivity().is_reachable(),
            running: self.coordinator.is_running(),
            background_registered: self.background.is_registered()?,
            passes_completed: self.coordinator.passes_completed(),
        })
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: i64,
    pub name: String,
    pub date_of_birth: String,
    pub address: String,
    pub phone_number: String,
    pub last_visit: Option<String>,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id.unwrap_or_default(),
            name: patient.name,
            date_of_birth: patient.date_of_birth,
            address: patient.address,
            phone_number: patient.phone_number,
            last_visit: patient.last_visit,
        }
    }
}

/// FFI-safe patient form input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientInput {
    pub name: String,
    pub date_of_birth: String,
    pub address: String,
    pub phone_number: String,
}

impl FfiPatientInput {
    fn validate(&self) -> Result<(), FieldCareError> {
        if self.name.trim().is_empty() {
            return Err(FieldCareError::InvalidInput("Patient name is required".into()));
        }
        Ok(())
    }
}

/// FFI-safe visit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisit {
    pub id: i64,
    pub local_uuid: String,
    pub patient_id: i64,
    pub date: String,
    pub notes: String,
    pub blood_pressure: Option<String>,
    pub temperature: Option<String>,
    pub heart_rate: Option<String>,
    pub oxygen_saturation: Option<String>,
    pub medications: Vec<String>,
    pub sync_status: String,
}

impl From<Visit> for FfiVisit {
    fn from(visit: Visit) -> Self {
        Self {
            id: visit.id.unwrap_or_default(),
            local_uuid: visit.local_uuid,
            patient_id: visit.patient_id,
            date: visit.date,
            notes: visit.notes,
            blood_pressure: visit.vital_signs.blood_pressure,
            temperature: visit.vital_signs.temperature,
            heart_rate: visit.vital_signs.heart_rate,
            oxygen_saturation: visit.vital_signs.oxygen_saturation,
            medications: visit.medications,
            sync_status: visit.sync_status.to_string(),
        }
    }
}

/// FFI-safe visit form input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitInput {
    pub date: String,
    pub notes: String,
    pub blood_pressure: Option<String>,
    pub temperature: Option<String>,
    pub heart_rate: Option<String>,
    pub oxygen_saturation: Option<String>,
    pub medications: Vec<String>,
}

impl FfiVisitInput {
    fn validate(&self) -> Result<(), FieldCareError> {
        if self.date.trim().is_empty() {
            return Err(FieldCareError::InvalidInput("Visit date is required".into()));
        }
        if self.notes.trim().is_empty() {
            return Err(FieldCareError::InvalidInput("Visit notes are required".into()));
        }
        Ok(())
    }

    /// Copy everything but the date onto a visit.
    fn apply(&self, visit: &mut Visit) {
        // Blank form fields are stored as absent
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());

        visit.notes = self.notes.clone();
        visit.vital_signs = VitalSigns {
            blood_pressure: non_empty(&self.blood_pressure),
            temperature: non_empty(&self.temperature),
            heart_rate: non_empty(&self.heart_rate),
            oxygen_saturation: non_empty(&self.oxygen_saturation),
        };
        visit.medications = self
            .medications
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
    }
}

/// FFI-safe pass report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPassReport {
    pub attempted: u32,
    pub synced: u32,
    pub failed: u32,
    pub synced_ids: Vec<i64>,
    pub snapshot_error: Option<String>,
    pub duration_ms: u64,
}

impl From<PassReport> for FfiPassReport {
    fn from(report: PassReport) -> Self {
        Self {
            attempted: report.attempted() as u32,
            synced: report.synced() as u32,
            failed: report.failed() as u32,
            synced_ids: report.synced_ids(),
            snapshot_error: report.snapshot_error,
            duration_ms: report.duration_ms,
        }
    }
}

/// FFI-safe sync status summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSyncSummary {
    pub pending: u32,
    pub synced: u32,
    pub reachable: bool,
    pub running: bool,
    pub background_registered: bool,
    pub passes_completed: u64,
}
