//! The consultation record and its line items.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::vitals::Vitals;

/// Lifecycle status of a consultation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsultationStatus {
    /// Being filled in by the doctor
    Draft,
    /// Lab tests dispatched, diagnosis and prescriptions locked
    WaitingForLabResults,
    /// Lab results back, doctor reviewing
    ReadyForReview,
    /// Finalized; read-only
    Completed,
}

impl ConsultationStatus {
    pub const ALL: [ConsultationStatus; 4] = [
        ConsultationStatus::Draft,
        ConsultationStatus::WaitingForLabResults,
        ConsultationStatus::ReadyForReview,
        ConsultationStatus::Completed,
    ];

    /// Wire and storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::Draft => "DRAFT",
            ConsultationStatus::WaitingForLabResults => "WAITING_FOR_LAB_RESULTS",
            ConsultationStatus::ReadyForReview => "READY_FOR_REVIEW",
            ConsultationStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsultationStatus::Completed)
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single prescription line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    /// Drug name as entered
    pub drug_name: String,
    /// Dose, e.g. "500mg"
    pub dosage: String,
    /// e.g. "twice daily"
    #[serde(default)]
    pub frequency: String,
    /// e.g. "5 days"
    #[serde(default)]
    pub duration: String,
    /// Free-text instructions for the patient
    #[serde(default)]
    pub instructions: String,
}

impl Prescription {
    pub fn new(drug_name: impl Into<String>, dosage: impl Into<String>) -> Self {
        Self {
            drug_name: drug_name.into(),
            dosage: dosage.into(),
            ..Default::default()
        }
    }

    /// A prescription counts only once both drug name and dosage are filled in.
    pub fn is_complete(&self) -> bool {
        !self.drug_name.trim().is_empty() && !self.dosage.trim().is_empty()
    }
}

/// Lab request urgency.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Normal,
    Urgent,
    Stat,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Normal => "normal",
            Urgency::Urgent => "urgent",
            Urgency::Stat => "stat",
        }
    }
}

/// A lab test requested for this consultation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LabRequest {
    /// Catalog test name, e.g. "Complete Blood Count"
    pub test_name: String,
    /// Catalog test type, e.g. "blood"
    #[serde(default)]
    pub test_type: Option<String>,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub instructions: String,
}

impl LabRequest {
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            ..Default::default()
        }
    }

    pub fn has_test_name(&self) -> bool {
        !self.test_name.trim().is_empty()
    }
}

/// One clinical encounter, from first open to completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsultationRecord {
    /// Assigned by the store on first save
    pub id: Option<String>,
    /// Appointment this consultation belongs to
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    /// Measured vital signs
    #[serde(default)]
    pub vitals: Vitals,
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub icd_code: String,
    #[serde(default)]
    pub notes: String,
    /// Ordered prescription lines
    #[serde(default)]
    pub prescriptions: Vec<Prescription>,
    /// Ordered lab request lines
    #[serde(default)]
    pub lab_requests: Vec<LabRequest>,
    pub status: ConsultationStatus,
    /// True once prescriptions reached the pharmacy queue
    #[serde(default)]
    pub prescription_submitted: bool,
    /// Set only while waiting for lab results
    #[serde(default)]
    pub active_lab_request_id: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl ConsultationRecord {
    /// Create a new, unsaved draft for an appointment.
    pub fn new(
        appointment_id: impl Into<String>,
        patient_id: impl Into<String>,
        doctor_id: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: None,
            appointment_id: appointment_id.into(),
            patient_id: patient_id.into(),
            doctor_id: doctor_id.into(),
            vitals: Vitals::default(),
            symptoms: String::new(),
            diagnosis: String::new(),
            icd_code: String::new(),
            notes: String::new(),
            prescriptions: Vec::new(),
            lab_requests: Vec::new(),
            status: ConsultationStatus::Draft,
            prescription_submitted: false,
            active_lab_request_id: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Prescriptions with both drug name and dosage.
    pub fn complete_prescriptions(&self) -> impl Iterator<Item = &Prescription> {
        self.prescriptions.iter().filter(|p| p.is_complete())
    }

    pub fn has_complete_prescription(&self) -> bool {
        self.complete_prescriptions().next().is_some()
    }

    /// Derived BMI; see [`Vitals::bmi`].
    pub fn bmi(&self) -> Option<f64> {
        self.vitals.bmi()
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Result of the finish endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionReceipt {
    pub consultation_id: String,
    pub status: ConsultationStatus,
}
