//! [`ConsultationBackend`] over the local SQLite store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Database, DbError, DbResult};
use crate::gateway::{ConsultationBackend, GatewayError, GatewayResult, LabStatusSource};
use crate::models::{
    AppointmentRef, CompletionReceipt, ConsultationRecord, ConsultationStatus, LabRequest,
    LabRequestStatus, LabTest, MedicalHistory, OngoingConsultation,
};

/// History limits shown next to an open consultation.
pub const HISTORY_CONSULTATION_LIMIT: usize = 10;
pub const HISTORY_LAB_RESULT_LIMIT: usize = 20;

impl From<DbError> for GatewayError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => GatewayError::NotFound(what),
            DbError::Constraint(what) => GatewayError::Conflict(what),
            other => GatewayError::Store(other.to_string()),
        }
    }
}

/// Embedded store that behaves like the clinic server.
pub struct LocalBackend {
    db: Mutex<Database>,
}

impl LocalBackend {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make an appointment known to the store.
    pub fn register_appointment(&self, appointment: &AppointmentRef) -> DbResult<()> {
        self.lock().upsert_appointment(appointment)
    }

    pub fn upsert_lab_test(&self, test: &LabTest) -> DbResult<()> {
        self.lock().upsert_lab_test(test)
    }

    pub fn deactivate_lab_test(&self, test_name: &str) -> DbResult<bool> {
        self.lock().deactivate_lab_test(test_name)
    }

    /// Lab-side entry point: mark a request as being processed.
    pub fn start_lab_request(&self, lab_request_id: &str) -> DbResult<bool> {
        self.lock().mark_lab_request_in_progress(lab_request_id)
    }

    /// Lab-side entry point: record the result.
    pub fn complete_lab_request(&self, lab_request_id: &str, result: Option<&str>) -> DbResult<bool> {
        let completed = self.lock().complete_lab_request(lab_request_id, result)?;
        if completed {
            info!(lab_request_id, "lab request completed");
        }
        Ok(completed)
    }

    pub fn get_consultation(&self, id: &str) -> DbResult<Option<ConsultationRecord>> {
        self.lock().get_consultation(id)
    }
}

#[async_trait]
impl LabStatusSource for LocalBackend {
    async fn lab_request_status(&self, lab_request_id: &str) -> GatewayResult<LabRequestStatus> {
        self.lock()
            .get_lab_request_status(lab_request_id)?
            .ok_or_else(|| GatewayError::NotFound(format!("lab request {}", lab_request_id)))
    }
}

#[async_trait]
impl ConsultationBackend for LocalBackend {
    async fn consultation_or_create(
        &self,
        appointment_id: &str,
    ) -> GatewayResult<ConsultationRecord> {
        let db = self.lock();
        if let Some(existing) = db.get_consultation_by_appointment(appointment_id)? {
            return Ok(existing);
        }

        let appointment = db
            .get_appointment(appointment_id)?
            .ok_or_else(|| GatewayError::NotFound(format!("appointment {}", appointment_id)))?;

        let mut record = ConsultationRecord::new(
            appointment.appointment_id,
            appointment.patient_id,
            appointment.doctor_id,
        );
        record.id = Some(uuid::Uuid::new_v4().to_string());
        db.insert_consultation(&record)?;
        debug!(appointment_id, consultation_id = ?record.id, "created consultation");
        Ok(record)
    }

    async fn lab_tests_catalog(&self) -> GatewayResult<Vec<LabTest>> {
        Ok(self.lock().list_lab_tests()?)
    }

    async fn save_draft(&self, record: &ConsultationRecord) -> GatewayResult<ConsultationRecord> {
        let db = self.lock();

        let existing = match record.id.as_deref() {
            Some(id) => db.get_consultation(id)?,
            None => db.get_consultation_by_appointment(&record.appointment_id)?,
        };

        let id = match existing {
            Some(existing) if existing.status.is_terminal() => {
                return Err(GatewayError::Conflict(format!(
                    "consultation {} is completed",
                    existing.id.unwrap_or_default()
                )));
            }
            Some(existing) => {
                let mut update = record.clone();
                update.id = existing.id.clone();
                db.update_consultation_fields(&update)?;
                existing.id.unwrap_or_default()
            }
            None => {
                if db.get_appointment(&record.appointment_id)?.is_none() {
                    return Err(GatewayError::NotFound(format!(
                        "appointment {}",
                        record.appointment_id
                    )));
                }
                let mut insert = record.clone();
                let id = uuid::Uuid::new_v4().to_string();
                insert.id = Some(id.clone());
                insert.status = ConsultationStatus::Draft;
                insert.active_lab_request_id = None;
                db.insert_consultation(&insert)?;
                id
            }
        };

        db.get_consultation(&id)?
            .ok_or_else(|| GatewayError::NotFound(format!("consultation {}", id)))
    }

    async fn finish(&self, consultation_id: &str) -> GatewayResult<CompletionReceipt> {
        let db = self.lock();
        let existing = db
            .get_consultation(consultation_id)?
            .ok_or_else(|| GatewayError::NotFound(format!("consultation {}", consultation_id)))?;

        match existing.status {
            ConsultationStatus::WaitingForLabResults => {
                return Err(GatewayError::Conflict(
                    "consultation is waiting for lab results".into(),
                ));
            }
            ConsultationStatus::Completed => {}
            ConsultationStatus::Draft | ConsultationStatus::ReadyForReview => {
                db.set_consultation_status(consultation_id, ConsultationStatus::Completed, None)?;
            }
        }

        Ok(CompletionReceipt {
            consultation_id: consultation_id.to_string(),
            status: ConsultationStatus::Completed,
        })
    }

    async fn send_lab_request(
        &self,
        consultation_id: &str,
        requests: &[LabRequest],
    ) -> GatewayResult<String> {
        Ok(self.lock().dispatch_lab_requests(consultation_id, requests)?)
    }

    async fn patient_medical_history(&self, patient_id: &str) -> GatewayResult<MedicalHistory> {
        let db = self.lock();
        Ok(MedicalHistory {
            patient_id: patient_id.to_string(),
            previous_consultations: db
                .list_completed_consultations(patient_id, HISTORY_CONSULTATION_LIMIT)?,
            lab_results: db.list_lab_results(patient_id, HISTORY_LAB_RESULT_LIMIT)?,
        })
    }

    async fn ongoing_consultations(
        &self,
        doctor_id: &str,
    ) -> GatewayResult<Vec<OngoingConsultation>> {
        Ok(self.lock().list_ongoing_consultations(doctor_id)?)
    }
}
