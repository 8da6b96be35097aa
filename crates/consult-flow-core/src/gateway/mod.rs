//! Boundary to the backing store and the lab.
//!
//! [`ConsultationBackend`] is the full request/response surface; the lab
//! status query is split into [`LabStatusSource`] so the poller depends on
//! nothing else. [`DraftPersistenceGateway`] enforces draft-then-finish.

mod persistence;

pub use persistence::*;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    CompletionReceipt, ConsultationRecord, LabRequest, LabRequestStatus, LabTest, MedicalHistory,
    OngoingConsultation,
};

/// Failures reaching or answered by the backing store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl GatewayError {
    /// Whether the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_) | GatewayError::Store(_) => true,
            GatewayError::Status { status, .. } => {
                !(400..500).contains(status) || matches!(status, 408 | 429)
            }
            GatewayError::NotFound(_) | GatewayError::Conflict(_) | GatewayError::Decode(_) => {
                false
            }
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Answers "is this lab request done yet?".
#[async_trait]
pub trait LabStatusSource: Send + Sync {
    async fn lab_request_status(&self, lab_request_id: &str) -> GatewayResult<LabRequestStatus>;
}

/// Everything a consultation session needs from the outside world.
#[async_trait]
pub trait ConsultationBackend: LabStatusSource {
    /// Existing consultation for the appointment, or a newly created DRAFT.
    async fn consultation_or_create(&self, appointment_id: &str)
        -> GatewayResult<ConsultationRecord>;

    async fn lab_tests_catalog(&self) -> GatewayResult<Vec<LabTest>>;

    /// Upsert. The returned record always carries an id.
    async fn save_draft(&self, record: &ConsultationRecord) -> GatewayResult<ConsultationRecord>;

    /// Mark an already-saved consultation COMPLETED.
    async fn finish(&self, consultation_id: &str) -> GatewayResult<CompletionReceipt>;

    /// Dispatch lab requests; returns the id to poll.
    async fn send_lab_request(
        &self,
        consultation_id: &str,
        requests: &[LabRequest],
    ) -> GatewayResult<String>;

    async fn patient_medical_history(&self, patient_id: &str) -> GatewayResult<MedicalHistory>;

    async fn ongoing_consultations(&self, doctor_id: &str)
        -> GatewayResult<Vec<OngoingConsultation>>;
}
