//! Display-only views: appointment references, ongoing lists, medical history.

use serde::{Deserialize, Serialize};

use super::catalog::LabRequestStatus;
use super::consultation::{ConsultationStatus, Prescription};

/// The parts of an appointment a consultation needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentRef {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
}

impl AppointmentRef {
    pub fn new(
        appointment_id: impl Into<String>,
        patient_id: impl Into<String>,
        doctor_id: impl Into<String>,
    ) -> Self {
        Self {
            appointment_id: appointment_id.into(),
            patient_id: patient_id.into(),
            doctor_id: doctor_id.into(),
        }
    }
}

/// A consultation a doctor has not yet completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OngoingConsultation {
    pub id: String,
    pub appointment_id: String,
    pub patient_id: String,
    pub status: ConsultationStatus,
    pub updated_at: String,
}

/// A completed consultation as shown in patient history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PastConsultation {
    pub id: String,
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub icd_code: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub prescriptions: Vec<Prescription>,
    /// When the consultation was last updated
    pub date: String,
}

/// A lab request and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabResult {
    pub lab_request_id: String,
    pub test_name: String,
    #[serde(default)]
    pub test_type: Option<String>,
    pub status: LabRequestStatus,
    /// Free-text result entered by the lab
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// Patient history shown alongside an open consultation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MedicalHistory {
    pub patient_id: String,
    /// Completed consultations, newest first
    #[serde(default)]
    pub previous_consultations: Vec<PastConsultation>,
    /// Completed lab requests, newest first
    #[serde(default)]
    pub lab_results: Vec<LabResult>,
}

impl MedicalHistory {
    /// Distinct non-empty diagnoses, in order of first appearance.
    pub fn diagnoses(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for consultation in &self.previous_consultations {
            let diagnosis = consultation.diagnosis.trim();
            if !diagnosis.is_empty() && !seen.contains(&diagnosis) {
                seen.push(diagnosis);
            }
        }
        seen
    }
}
