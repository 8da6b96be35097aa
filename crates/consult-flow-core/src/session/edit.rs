//! User edits to an open consultation.

use crate::models::{ConsultationRecord, LabRequest, Prescription, VitalSign};
use crate::workflow::FieldGroup;

/// Free-text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Symptoms,
    Diagnosis,
    IcdCode,
    Notes,
}

/// One change to the record.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsultationEdit {
    SetText { field: TextField, value: String },
    SetVital { sign: VitalSign, value: Option<f64> },
    AddPrescription(Prescription),
    UpdatePrescription { index: usize, prescription: Prescription },
    RemovePrescription { index: usize },
    AddLabRequest(LabRequest),
    UpdateLabRequest { index: usize, request: LabRequest },
    RemoveLabRequest { index: usize },
}

impl ConsultationEdit {
    /// The field group this edit writes to.
    pub fn group(&self) -> FieldGroup {
        match self {
            ConsultationEdit::SetText { .. } => FieldGroup::Diagnosis,
            ConsultationEdit::SetVital { .. } => FieldGroup::Vitals,
            ConsultationEdit::AddPrescription(_)
            | ConsultationEdit::UpdatePrescription { .. }
            | ConsultationEdit::RemovePrescription { .. } => FieldGroup::Prescriptions,
            ConsultationEdit::AddLabRequest(_)
            | ConsultationEdit::UpdateLabRequest { .. }
            | ConsultationEdit::RemoveLabRequest { .. } => FieldGroup::LabRequests,
        }
    }

    /// Apply to the record. On error the record is untouched.
    pub(crate) fn apply(self, record: &mut ConsultationRecord) -> Result<(), String> {
        match self {
            ConsultationEdit::SetText { field, value } => {
                let slot = match field {
                    TextField::Symptoms => &mut record.symptoms,
                    TextField::Diagnosis => &mut record.diagnosis,
                    TextField::IcdCode => &mut record.icd_code,
                    TextField::Notes => &mut record.notes,
                };
                *slot = value;
            }
            ConsultationEdit::SetVital { sign, value } => {
                record.vitals.set(sign, value);
            }
            ConsultationEdit::AddPrescription(prescription) => {
                record.prescriptions.push(prescription);
            }
            ConsultationEdit::UpdatePrescription {
                index,
                prescription,
            } => {
                *row_mut(&mut record.prescriptions, index, "prescription")? = prescription;
            }
            ConsultationEdit::RemovePrescription { index } => {
                row_mut(&mut record.prescriptions, index, "prescription")?;
                record.prescriptions.remove(index);
            }
            ConsultationEdit::AddLabRequest(request) => {
                record.lab_requests.push(request);
            }
            ConsultationEdit::UpdateLabRequest { index, request } => {
                *row_mut(&mut record.lab_requests, index, "lab request")? = request;
            }
            ConsultationEdit::RemoveLabRequest { index } => {
                row_mut(&mut record.lab_requests, index, "lab request")?;
                record.lab_requests.remove(index);
            }
        }
        Ok(())
    }
}

fn row_mut<'a, T>(rows: &'a mut [T], index: usize, what: &str) -> Result<&'a mut T, String> {
    let len = rows.len();
    rows.get_mut(index)
        .ok_or_else(|| format!("no {} at index {} (have {})", what, index, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups() {
        let edit = ConsultationEdit::SetText {
            field: TextField::Notes,
            value: "x".into(),
        };
        assert_eq!(edit.group(), FieldGroup::Diagnosis);
        assert_eq!(
            ConsultationEdit::RemoveLabRequest { index: 0 }.group(),
            FieldGroup::LabRequests
        );
    }

    #[test]
    fn test_out_of_range_leaves_record_untouched() {
        let mut record = ConsultationRecord::new("apt-1", "pat-1", "doc-1");
        record.prescriptions.push(Prescription::new("Aspirin", "75mg"));
        let before = record.clone();

        let err = ConsultationEdit::RemovePrescription { index: 3 }
            .apply(&mut record)
            .unwrap_err();
        assert_eq!(err, "no prescription at index 3 (have 1)");
        assert_eq!(record, before);
    }

    #[test]
    fn test_update_and_remove_rows() {
        let mut record = ConsultationRecord::new("apt-1", "pat-1", "doc-1");
        ConsultationEdit::AddLabRequest(LabRequest::new("CBC"))
            .apply(&mut record)
            .unwrap();
        ConsultationEdit::AddLabRequest(LabRequest::new("TSH"))
            .apply(&mut record)
            .unwrap();
        ConsultationEdit::UpdateLabRequest {
            index: 1,
            request: LabRequest::new("Lipid Panel"),
        }
        .apply(&mut record)
        .unwrap();
        ConsultationEdit::RemoveLabRequest { index: 0 }
            .apply(&mut record)
            .unwrap();

        assert_eq!(record.lab_requests, vec![LabRequest::new("Lipid Panel")]);
    }
}
