//! Consult-Flow Core Library
//!
//! Lifecycle engine for a single clinical consultation: vitals, diagnosis,
//! prescriptions, and an asynchronous lab request that pauses the encounter
//! until results arrive.
//!
//! # Architecture
//!
//! ```text
//!   Doctor edits ──▶ ConsultationSession ──▶ ValidationGate
//!                          │
//!                          ▼
//!                 WorkflowStateMachine
//!                          │
//!     DRAFT ──sendToLab──▶ WAITING_FOR_LAB_RESULTS ──labCompleted──▶ READY_FOR_REVIEW
//!       │                          ▲                                      │
//!       │                     LabPoller (every 20s)                       │
//!       └─────────────finish──────────▶ COMPLETED ◀──────────finish───────┘
//!                          │
//!                          ▼
//!             DraftPersistenceGateway (save draft, then finish)
//!                          │
//!              ┌───────────┴───────────┐
//!              ▼                       ▼
//!        LocalBackend             HttpBackend
//!      (SQLite, this crate)   (consult-flow-http)
//! ```
//!
//! # Core Principle
//!
//! **A consultation is never reported COMPLETED unless the store confirmed
//! both the draft save and the finish.**
//!
//! # Modules
//!
//! - [`models`]: Domain types (ConsultationRecord, Vitals, LabTest, etc.)
//! - [`validation`]: Vital-sign ranges and required-field checks
//! - [`workflow`]: Lifecycle state machine and field gating
//! - [`lab`]: Lab catalog lookup and status polling
//! - [`gateway`]: Backend traits and draft-then-finish persistence
//! - [`session`]: Orchestrator for one open consultation
//! - [`db`]: SQLite-backed local store
//! - [`config`]: Session configuration

pub mod config;
pub mod db;
pub mod gateway;
pub mod lab;
pub mod models;
pub mod session;
pub mod validation;
pub mod workflow;

// Re-export commonly used types
pub use config::SessionConfig;
pub use db::{Database, LocalBackend};
pub use gateway::{
    ConsultationBackend, DraftPersistenceGateway, GatewayError, GatewayResult, LabStatusSource,
};
pub use models::{
    ConsultationRecord, ConsultationStatus, LabRequest, LabRequestStatus, LabTest, Prescription,
    Urgency, VitalSign, Vitals,
};
pub use session::{ConsultationEdit, ConsultationSession, SessionError, SessionSnapshot, TextField};
pub use validation::{validate, ValidationReport};
pub use workflow::{EditableFields, FieldGroup, WorkflowError, WorkflowStateMachine};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ConsultFlowError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Field locked: {0}")]
    FieldLocked(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<db::DbError> for ConsultFlowError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => ConsultFlowError::NotFound(what),
            other => ConsultFlowError::DatabaseError(other.to_string()),
        }
    }
}

impl From<GatewayError> for ConsultFlowError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::NotFound(what) => ConsultFlowError::NotFound(what),
            GatewayError::Store(what) => ConsultFlowError::DatabaseError(what),
            other => ConsultFlowError::NetworkError(other.to_string()),
        }
    }
}

impl From<SessionError> for ConsultFlowError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Validation(report) => {
                let details: Vec<String> = report
                    .errors()
                    .iter()
                    .map(|(field, message)| format!("{}: {}", field, message))
                    .collect();
                ConsultFlowError::ValidationFailed(details.join("; "))
            }
            SessionError::Workflow(e) => ConsultFlowError::InvalidTransition(e.to_string()),
            SessionError::Network(e) => e.into(),
            e @ SessionError::FinishNotConfirmed(_) => ConsultFlowError::NetworkError(e.to_string()),
            e @ SessionError::FieldLocked { .. } => ConsultFlowError::FieldLocked(e.to_string()),
            SessionError::InvalidEdit(what) => ConsultFlowError::InvalidInput(what),
            SessionError::UnknownLabTest { name, suggestion } => {
                ConsultFlowError::InvalidInput(match suggestion {
                    Some(suggestion) => {
                        format!("unknown lab test '{}', did you mean '{}'?", name, suggestion)
                    }
                    None => format!("unknown lab test '{}'", name),
                })
            }
        }
    }
}

impl From<config::ConfigError> for ConsultFlowError {
    fn from(e: config::ConfigError) -> Self {
        ConsultFlowError::InvalidInput(e.to_string())
    }
}

impl From<std::io::Error> for ConsultFlowError {
    fn from(e: std::io::Error) -> Self {
        ConsultFlowError::RuntimeError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ConsultFlowError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ConsultFlowError::RuntimeError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Install a `tracing` subscriber. Returns false if one was already set.
#[uniffi::export]
pub fn init_logging(filter: String) -> bool {
    let filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .is_ok()
}

/// Open or create a database at the given path.
///
/// `poll_interval_secs` overrides the lab poll interval; when absent the
/// configuration is read from the environment.
#[uniffi::export]
pub fn open_database(
    path: String,
    poll_interval_secs: Option<u64>,
) -> Result<Arc<ConsultFlowCore>, ConsultFlowError> {
    let backend = LocalBackend::open(&path)?;
    ConsultFlowCore::build(backend, resolve_config(poll_interval_secs)?)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ConsultFlowCore>, ConsultFlowError> {
    let backend = LocalBackend::open_in_memory()?;
    ConsultFlowCore::build(backend, SessionConfig::default())
}

fn resolve_config(poll_interval_secs: Option<u64>) -> Result<SessionConfig, ConsultFlowError> {
    let from_env = SessionConfig::from_env()?;
    Ok(match poll_interval_secs {
        Some(secs) => SessionConfig::new(
            Duration::from_secs(secs),
            from_env.enforce_lab_catalog(),
        )?,
        None => from_env,
    })
}

// =========================================================================
// Main API Object
// =========================================================================

/// Local store plus the runtime that drives lab polling.
#[derive(uniffi::Object)]
pub struct ConsultFlowCore {
    runtime: Arc<Runtime>,
    backend: Arc<LocalBackend>,
    config: SessionConfig,
}

impl ConsultFlowCore {
    fn build(
        backend: LocalBackend,
        config: SessionConfig,
    ) -> Result<Arc<Self>, ConsultFlowError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("consult-flow")
            .enable_all()
            .build()?;
        Ok(Arc::new(Self {
            runtime: Arc::new(runtime),
            backend: Arc::new(backend),
            config,
        }))
    }
}

#[uniffi::export]
impl ConsultFlowCore {
    // =========================================================================
    // Appointment & Catalog Operations
    // =========================================================================

    /// Make an appointment available for consultation.
    pub fn register_appointment(
        &self,
        appointment_id: String,
        patient_id: String,
        doctor_id: String,
    ) -> Result<(), ConsultFlowError> {
        self.backend.register_appointment(&models::AppointmentRef {
            appointment_id,
            patient_id,
            doctor_id,
        })?;
        Ok(())
    }

    /// Add or update a lab catalog test.
    pub fn upsert_lab_test(&self, test: FfiLabTest) -> Result<(), ConsultFlowError> {
        self.backend.upsert_lab_test(&test.into())?;
        Ok(())
    }

    /// Hide a test from the catalog. Returns false for an unknown name.
    pub fn deactivate_lab_test(&self, test_name: String) -> Result<bool, ConsultFlowError> {
        Ok(self.backend.deactivate_lab_test(&test_name)?)
    }

    /// Active lab catalog.
    pub fn lab_tests(&self) -> Result<Vec<FfiLabTest>, ConsultFlowError> {
        let tests = self.runtime.block_on(self.backend.lab_tests_catalog())?;
        Ok(tests.into_iter().map(|t| t.into()).collect())
    }

    // =========================================================================
    // Lab-Side Operations
    // =========================================================================

    /// Lab has started processing a request.
    pub fn start_lab_request(&self, lab_request_id: String) -> Result<bool, ConsultFlowError> {
        Ok(self.backend.start_lab_request(&lab_request_id)?)
    }

    /// Lab has a result. Waiting consultations pick it up on their next poll.
    pub fn complete_lab_request(
        &self,
        lab_request_id: String,
        result: Option<String>,
    ) -> Result<bool, ConsultFlowError> {
        Ok(self
            .backend
            .complete_lab_request(&lab_request_id, result.as_deref())?)
    }

    // =========================================================================
    // Listings
    // =========================================================================

    /// A doctor's consultations that are not yet completed.
    pub fn ongoing_consultations(
        &self,
        doctor_id: String,
    ) -> Result<Vec<FfiOngoingConsultation>, ConsultFlowError> {
        let ongoing = self
            .runtime
            .block_on(self.backend.ongoing_consultations(&doctor_id))?;
        Ok(ongoing.into_iter().map(|c| c.into()).collect())
    }

    /// Completed consultations and lab results for a patient.
    pub fn medical_history(
        &self,
        patient_id: String,
    ) -> Result<FfiMedicalHistory, ConsultFlowError> {
        let history = self
            .runtime
            .block_on(self.backend.patient_medical_history(&patient_id))?;
        Ok(history.into())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Open (or create) the consultation for an appointment.
    pub fn open_session(
        &self,
        appointment_id: String,
    ) -> Result<Arc<FfiConsultationSession>, ConsultFlowError> {
        let backend: Arc<dyn ConsultationBackend> = self.backend.clone();
        let session = self.runtime.block_on(ConsultationSession::open(
            backend,
            &appointment_id,
            self.config.clone(),
        ))?;
        Ok(Arc::new(FfiConsultationSession {
            runtime: self.runtime.clone(),
            session: Mutex::new(session),
        }))
    }
}

/// One open consultation, driven synchronously from the host app.
#[derive(uniffi::Object)]
pub struct FfiConsultationSession {
    runtime: Arc<Runtime>,
    session: Mutex<ConsultationSession>,
}

impl FfiConsultationSession {
    fn edit(&self, edit: ConsultationEdit) -> Result<FfiSessionState, ConsultFlowError> {
        let mut session = self.session.lock()?;
        session.apply_edit(edit)?;
        Ok(session.current_state().into())
    }
}

#[uniffi::export]
impl FfiConsultationSession {
    // =========================================================================
    // Reads
    // =========================================================================

    pub fn current_state(&self) -> Result<FfiSessionState, ConsultFlowError> {
        let mut session = self.session.lock()?;
        session.drain_lab_events();
        Ok(session.current_state().into())
    }

    pub fn record(&self) -> Result<FfiConsultation, ConsultFlowError> {
        let session = self.session.lock()?;
        Ok(session.record().clone().into())
    }

    /// Apply any lab completion the poller has delivered.
    pub fn refresh_lab_status(&self) -> Result<FfiSessionState, ConsultFlowError> {
        self.current_state()
    }

    // =========================================================================
    // Edits
    // =========================================================================

    pub fn set_text(
        &self,
        field: FfiTextField,
        value: String,
    ) -> Result<FfiSessionState, ConsultFlowError> {
        self.edit(ConsultationEdit::SetText {
            field: field.into(),
            value,
        })
    }

    pub fn set_vital(
        &self,
        sign: FfiVitalSign,
        value: Option<f64>,
    ) -> Result<FfiSessionState, ConsultFlowError> {
        self.edit(ConsultationEdit::SetVital {
            sign: sign.into(),
            value,
        })
    }

    pub fn add_prescription(
        &self,
        prescription: FfiPrescription,
    ) -> Result<FfiSessionState, ConsultFlowError> {
        self.edit(ConsultationEdit::AddPrescription(prescription.into()))
    }

    pub fn update_prescription(
        &self,
        index: u32,
        prescription: FfiPrescription,
    ) -> Result<FfiSessionState, ConsultFlowError> {
        self.edit(ConsultationEdit::UpdatePrescription {
            index: index as usize,
            prescription: prescription.into(),
        })
    }

    pub fn remove_prescription(&self, index: u32) -> Result<FfiSessionState, ConsultFlowError> {
        self.edit(ConsultationEdit::RemovePrescription {
            index: index as usize,
        })
    }

    pub fn add_lab_request(
        &self,
        request: FfiLabRequest,
    ) -> Result<FfiSessionState, ConsultFlowError> {
        self.edit(ConsultationEdit::AddLabRequest(request.try_into()?))
    }

    pub fn update_lab_request(
        &self,
        index: u32,
        request: FfiLabRequest,
    ) -> Result<FfiSessionState, ConsultFlowError> {
        self.edit(ConsultationEdit::UpdateLabRequest {
            index: index as usize,
            request: request.try_into()?,
        })
    }

    pub fn remove_lab_request(&self, index: u32) -> Result<FfiSessionState, ConsultFlowError> {
        self.edit(ConsultationEdit::RemoveLabRequest {
            index: index as usize,
        })
    }

    // =========================================================================
    // Workflow
    // =========================================================================

    /// Reload the lab catalog used to check test names. Returns its size.
    pub fn refresh_lab_catalog(&self) -> Result<u32, ConsultFlowError> {
        let mut session = self.session.lock()?;
        let count = self.runtime.block_on(session.refresh_catalog())?;
        Ok(count as u32)
    }

    pub fn send_to_lab(&self) -> Result<FfiSessionState, ConsultFlowError> {
        let mut session = self.session.lock()?;
        let state = self.runtime.block_on(session.send_to_lab())?;
        Ok(state.into())
    }

    pub fn submit_prescription(&self) -> Result<FfiSessionState, ConsultFlowError> {
        let mut session = self.session.lock()?;
        let state = self.runtime.block_on(session.submit_prescription())?;
        Ok(state.into())
    }

    pub fn save_draft(&self) -> Result<FfiSessionState, ConsultFlowError> {
        let mut session = self.session.lock()?;
        let state = self.runtime.block_on(session.save_draft())?;
        Ok(state.into())
    }

    pub fn finish(&self) -> Result<FfiSessionState, ConsultFlowError> {
        let mut session = self.session.lock()?;
        let state = self.runtime.block_on(session.finish())?;
        Ok(state.into())
    }

    /// Stop lab polling for this session.
    pub fn close(&self) -> Result<(), ConsultFlowError> {
        self.session.lock()?.shutdown();
        Ok(())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe free-text field selector.
#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiTextField {
    Symptoms,
    Diagnosis,
    IcdCode,
    Notes,
}

impl From<FfiTextField> for TextField {
    fn from(field: FfiTextField) -> Self {
        match field {
            FfiTextField::Symptoms => TextField::Symptoms,
            FfiTextField::Diagnosis => TextField::Diagnosis,
            FfiTextField::IcdCode => TextField::IcdCode,
            FfiTextField::Notes => TextField::Notes,
        }
    }
}

/// FFI-safe vital sign selector.
#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiVitalSign {
    Systolic,
    Diastolic,
    HeartRate,
    Temperature,
    Height,
    Weight,
    SpO2,
}

impl From<FfiVitalSign> for VitalSign {
    fn from(sign: FfiVitalSign) -> Self {
        match sign {
            FfiVitalSign::Systolic => VitalSign::Systolic,
            FfiVitalSign::Diastolic => VitalSign::Diastolic,
            FfiVitalSign::HeartRate => VitalSign::HeartRate,
            FfiVitalSign::Temperature => VitalSign::Temperature,
            FfiVitalSign::Height => VitalSign::Height,
            FfiVitalSign::Weight => VitalSign::Weight,
            FfiVitalSign::SpO2 => VitalSign::SpO2,
        }
    }
}

/// FFI-safe session snapshot.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSessionState {
    pub consultation_id: Option<String>,
    pub status: String,
    pub vitals_editable: bool,
    pub diagnosis_editable: bool,
    pub prescriptions_editable: bool,
    pub lab_requests_editable: bool,
    pub prescription_submitted: bool,
    pub active_lab_request_id: Option<String>,
    pub bmi: Option<f64>,
    pub lab_polling: bool,
}

impl From<SessionSnapshot> for FfiSessionState {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            consultation_id: snapshot.consultation_id,
            status: snapshot.status.as_str().to_string(),
            vitals_editable: snapshot.editable_fields.vitals,
            diagnosis_editable: snapshot.editable_fields.diagnosis,
            prescriptions_editable: snapshot.editable_fields.prescriptions,
            lab_requests_editable: snapshot.editable_fields.lab_requests,
            prescription_submitted: snapshot.prescription_submitted,
            active_lab_request_id: snapshot.active_lab_request_id,
            bmi: snapshot.bmi,
            lab_polling: snapshot.lab_polling,
        }
    }
}

/// FFI-safe vitals.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVitals {
    pub blood_pressure_systolic: Option<f64>,
    pub blood_pressure_diastolic: Option<f64>,
    pub heart_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub spo2: Option<f64>,
}

impl From<Vitals> for FfiVitals {
    fn from(v: Vitals) -> Self {
        Self {
            blood_pressure_systolic: v.blood_pressure_systolic,
            blood_pressure_diastolic: v.blood_pressure_diastolic,
            heart_rate: v.heart_rate,
            temperature: v.temperature,
            height: v.height,
            weight: v.weight,
            spo2: v.spo2,
        }
    }
}

/// FFI-safe prescription.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescription {
    pub drug_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: String,
}

impl From<FfiPrescription> for Prescription {
    fn from(p: FfiPrescription) -> Self {
        Prescription {
            drug_name: p.drug_name,
            dosage: p.dosage,
            frequency: p.frequency,
            duration: p.duration,
            instructions: p.instructions,
        }
    }
}

impl From<Prescription> for FfiPrescription {
    fn from(p: Prescription) -> Self {
        Self {
            drug_name: p.drug_name,
            dosage: p.dosage,
            frequency: p.frequency,
            duration: p.duration,
            instructions: p.instructions,
        }
    }
}

/// FFI-safe lab request. Urgency is "normal", "urgent" or "stat".
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLabRequest {
    pub test_name: String,
    pub test_type: Option<String>,
    pub urgency: String,
    pub instructions: String,
}

impl TryFrom<FfiLabRequest> for LabRequest {
    type Error = ConsultFlowError;

    fn try_from(r: FfiLabRequest) -> Result<Self, Self::Error> {
        let urgency = match r.urgency.trim().to_ascii_lowercase().as_str() {
            "" | "normal" => Urgency::Normal,
            "urgent" => Urgency::Urgent,
            "stat" => Urgency::Stat,
            other => {
                return Err(ConsultFlowError::InvalidInput(format!(
                    "unknown urgency '{}'",
                    other
                )))
            }
        };
        Ok(LabRequest {
            test_name: r.test_name,
            test_type: r.test_type,
            urgency,
            instructions: r.instructions,
        })
    }
}

impl From<LabRequest> for FfiLabRequest {
    fn from(r: LabRequest) -> Self {
        Self {
            test_name: r.test_name,
            test_type: r.test_type,
            urgency: r.urgency.as_str().to_string(),
            instructions: r.instructions,
        }
    }
}

/// FFI-safe consultation record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConsultation {
    pub id: Option<String>,
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub vitals: FfiVitals,
    pub bmi: Option<f64>,
    pub symptoms: String,
    pub diagnosis: String,
    pub icd_code: String,
    pub notes: String,
    pub prescriptions: Vec<FfiPrescription>,
    pub lab_requests: Vec<FfiLabRequest>,
    pub status: String,
    pub prescription_submitted: bool,
    pub active_lab_request_id: Option<String>,
    pub updated_at: String,
}

impl From<ConsultationRecord> for FfiConsultation {
    fn from(record: ConsultationRecord) -> Self {
        let bmi = record.bmi();
        Self {
            id: record.id,
            appointment_id: record.appointment_id,
            patient_id: record.patient_id,
            doctor_id: record.doctor_id,
            vitals: record.vitals.into(),
            bmi,
            symptoms: record.symptoms,
            diagnosis: record.diagnosis,
            icd_code: record.icd_code,
            notes: record.notes,
            prescriptions: record.prescriptions.into_iter().map(|p| p.into()).collect(),
            lab_requests: record.lab_requests.into_iter().map(|r| r.into()).collect(),
            status: record.status.as_str().to_string(),
            prescription_submitted: record.prescription_submitted,
            active_lab_request_id: record.active_lab_request_id,
            updated_at: record.updated_at,
        }
    }
}

/// FFI-safe lab catalog test.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLabTest {
    pub test_name: String,
    pub test_code: Option<String>,
    pub test_type: String,
    pub category: Option<String>,
}

impl From<FfiLabTest> for LabTest {
    fn from(t: FfiLabTest) -> Self {
        LabTest {
            test_name: t.test_name,
            test_code: t.test_code,
            test_type: t.test_type,
            category: t.category,
        }
    }
}

impl From<LabTest> for FfiLabTest {
    fn from(t: LabTest) -> Self {
        Self {
            test_name: t.test_name,
            test_code: t.test_code,
            test_type: t.test_type,
            category: t.category,
        }
    }
}

/// FFI-safe ongoing consultation row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOngoingConsultation {
    pub id: String,
    pub appointment_id: String,
    pub patient_id: String,
    pub status: String,
    pub updated_at: String,
}

impl From<models::OngoingConsultation> for FfiOngoingConsultation {
    fn from(c: models::OngoingConsultation) -> Self {
        Self {
            id: c.id,
            appointment_id: c.appointment_id,
            patient_id: c.patient_id,
            status: c.status.as_str().to_string(),
            updated_at: c.updated_at,
        }
    }
}

/// FFI-safe past consultation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPastConsultation {
    pub id: String,
    pub date: String,
    pub symptoms: String,
    pub diagnosis: String,
    pub icd_code: String,
    pub prescriptions: Vec<FfiPrescription>,
}

/// FFI-safe lab result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLabResult {
    pub lab_request_id: String,
    pub test_name: String,
    pub result: Option<String>,
    pub completed_at: Option<String>,
}

/// FFI-safe medical history.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedicalHistory {
    pub patient_id: String,
    pub diagnoses: Vec<String>,
    pub previous_consultations: Vec<FfiPastConsultation>,
    pub lab_results: Vec<FfiLabResult>,
}

impl From<models::MedicalHistory> for FfiMedicalHistory {
    fn from(history: models::MedicalHistory) -> Self {
        let diagnoses = history.diagnoses().into_iter().map(String::from).collect();
        Self {
            patient_id: history.patient_id,
            diagnoses,
            previous_consultations: history
                .previous_consultations
                .into_iter()
                .map(|c| FfiPastConsultation {
                    id: c.id,
                    date: c.date,
                    symptoms: c.symptoms,
                    diagnosis: c.diagnosis,
                    icd_code: c.icd_code,
                    prescriptions: c.prescriptions.into_iter().map(|p| p.into()).collect(),
                })
                .collect(),
            lab_results: history
                .lab_results
                .into_iter()
                .map(|r| FfiLabResult {
                    lab_request_id: r.lab_request_id,
                    test_name: r.test_name,
                    result: r.result,
                    completed_at: r.completed_at,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prescription(drug: &str, dose: &str) -> FfiPrescription {
        FfiPrescription {
            drug_name: drug.into(),
            dosage: dose.into(),
            frequency: "twice daily".into(),
            duration: "5 days".into(),
            instructions: String::new(),
        }
    }

    #[test]
    fn test_ffi_session_round_trip() {
        let core = open_database_in_memory().unwrap();
        core.register_appointment("apt-1".into(), "pat-1".into(), "doc-1".into())
            .unwrap();

        let session = core.open_session("apt-1".into()).unwrap();
        let state = session.current_state().unwrap();
        assert_eq!(state.status, "DRAFT");
        assert!(state.diagnosis_editable);

        session
            .add_prescription(prescription("Amoxicillin", "500mg"))
            .unwrap();
        let state = session.submit_prescription().unwrap();
        assert!(state.prescription_submitted);

        let record = session.record().unwrap();
        assert_eq!(record.prescriptions.len(), 1);
        assert_eq!(core.ongoing_consultations("doc-1".into()).unwrap().len(), 1);
        session.close().unwrap();
    }

    #[test]
    fn test_ffi_validation_error_lists_fields() {
        let core = open_database_in_memory().unwrap();
        core.register_appointment("apt-1".into(), "pat-1".into(), "doc-1".into())
            .unwrap();
        let session = core.open_session("apt-1".into()).unwrap();

        match session.finish().unwrap_err() {
            ConsultFlowError::ValidationFailed(details) => {
                assert!(details.contains("symptoms: Symptoms is required"));
                assert!(details.contains("prescriptions: At least one prescription is required"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ffi_lab_request_rejects_unknown_urgency() {
        let request = FfiLabRequest {
            test_name: "CBC".into(),
            test_type: None,
            urgency: "whenever".into(),
            instructions: String::new(),
        };
        let result: Result<LabRequest, _> = request.try_into();
        assert!(matches!(result, Err(ConsultFlowError::InvalidInput(_))));
    }

    #[test]
    fn test_ffi_catalog_deactivation_reaches_open_session() {
        let core = open_database_in_memory().unwrap();
        core.register_appointment("apt-1".into(), "pat-1".into(), "doc-1".into())
            .unwrap();
        for name in ["Lipid Panel", "Urinalysis"] {
            core.upsert_lab_test(FfiLabTest {
                test_name: name.into(),
                test_code: None,
                test_type: "blood".into(),
                category: None,
            })
            .unwrap();
        }

        let session = core.open_session("apt-1".into()).unwrap();
        assert!(core.deactivate_lab_test("Urinalysis".into()).unwrap());
        assert!(!core.deactivate_lab_test("Unknown Test".into()).unwrap());
        assert_eq!(core.lab_tests().unwrap().len(), 1);
        assert_eq!(session.refresh_lab_catalog().unwrap(), 1);

        session
            .add_lab_request(FfiLabRequest {
                test_name: "Urinalysis".into(),
                test_type: None,
                urgency: "normal".into(),
                instructions: String::new(),
            })
            .unwrap();
        assert!(matches!(
            session.send_to_lab().unwrap_err(),
            ConsultFlowError::InvalidInput(_)
        ));
        session.close().unwrap();
    }

    #[test]
    fn test_unknown_appointment_is_not_found() {
        let core = open_database_in_memory().unwrap();
        let err = core.open_session("missing".into()).err().unwrap();
        assert!(matches!(err, ConsultFlowError::NotFound(_)));
    }
}
