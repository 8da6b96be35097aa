//! Which parts of a consultation accept writes in a given status.

use std::fmt;

use crate::models::ConsultationStatus;

/// Editable field groups of a consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    /// The seven vital signs
    Vitals,
    /// Symptoms, diagnosis, ICD code and notes
    Diagnosis,
    Prescriptions,
    LabRequests,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 4] = [
        FieldGroup::Vitals,
        FieldGroup::Diagnosis,
        FieldGroup::Prescriptions,
        FieldGroup::LabRequests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldGroup::Vitals => "vitals",
            FieldGroup::Diagnosis => "diagnosis",
            FieldGroup::Prescriptions => "prescriptions",
            FieldGroup::LabRequests => "lab_requests",
        }
    }
}

impl fmt::Display for FieldGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of field groups that accept writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditableFields {
    pub vitals: bool,
    pub diagnosis: bool,
    pub prescriptions: bool,
    pub lab_requests: bool,
}

impl EditableFields {
    pub const ALL: EditableFields = EditableFields {
        vitals: true,
        diagnosis: true,
        prescriptions: true,
        lab_requests: true,
    };

    pub const NONE: EditableFields = EditableFields {
        vitals: false,
        diagnosis: false,
        prescriptions: false,
        lab_requests: false,
    };

    pub fn contains(&self, group: FieldGroup) -> bool {
        match group {
            FieldGroup::Vitals => self.vitals,
            FieldGroup::Diagnosis => self.diagnosis,
            FieldGroup::Prescriptions => self.prescriptions,
            FieldGroup::LabRequests => self.lab_requests,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    /// The editable groups, in [`FieldGroup::ALL`] order.
    pub fn groups(&self) -> Vec<FieldGroup> {
        FieldGroup::ALL
            .into_iter()
            .filter(|group| self.contains(*group))
            .collect()
    }
}

/// Diagnosis and prescriptions lock while waiting on the lab; everything locks on completion.
pub fn editable_fields(status: ConsultationStatus) -> EditableFields {
    match status {
        ConsultationStatus::Draft | ConsultationStatus::ReadyForReview => EditableFields::ALL,
        ConsultationStatus::WaitingForLabResults => EditableFields {
            vitals: true,
            lab_requests: true,
            ..EditableFields::NONE
        },
        ConsultationStatus::Completed => EditableFields::NONE,
    }
}
