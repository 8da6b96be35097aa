//! Completeness and range checks run before a consultation is finalized.
//!
//! Every rule is evaluated; the report lists all failing fields at once.

mod rules;

pub use rules::*;

use std::collections::BTreeMap;
use std::fmt;

use crate::models::{ConsultationRecord, VitalSign};

/// Field name → message for every failed rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    errors: BTreeMap<String, String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// Message for a single field, if it failed.
    pub fn error_for(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Names of the failing fields, sorted.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    fn record(&mut self, field: &str, message: Option<String>) {
        if let Some(message) = message {
            self.errors.insert(field.to_string(), message);
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields().collect();
        write!(f, "{} invalid field(s): {}", fields.len(), fields.join(", "))
    }
}

/// Run every rule against the record.
pub fn validate(record: &ConsultationRecord) -> ValidationReport {
    let mut report = ValidationReport::default();
    let vitals = &record.vitals;

    report.record("symptoms", check_required_text(&record.symptoms, "Symptoms"));
    report.record("diagnosis", check_required_text(&record.diagnosis, "Diagnosis"));

    if let Some(message) =
        check_blood_pressure(vitals.blood_pressure_systolic, vitals.blood_pressure_diastolic)
    {
        report.record(VitalSign::Systolic.field_name(), Some(message.clone()));
        report.record(VitalSign::Diastolic.field_name(), Some(message));
    }

    let ranged = [
        (VitalSign::HeartRate, &HEART_RATE_RANGE),
        (VitalSign::Temperature, &TEMPERATURE_RANGE),
        (VitalSign::SpO2, &SPO2_RANGE),
        (VitalSign::Height, &HEIGHT_RANGE),
        (VitalSign::Weight, &WEIGHT_RANGE),
    ];
    for (sign, range) in ranged {
        report.record(sign.field_name(), check_vital(vitals.get(sign), range));
    }

    report.record("prescriptions", check_prescriptions(&record.prescriptions));

    report
}

/// Prescriptions-only check used before submitting to the pharmacy queue.
pub fn validate_prescriptions(record: &ConsultationRecord) -> ValidationReport {
    let mut report = ValidationReport::default();
    report.record("prescriptions", check_prescriptions(&record.prescriptions));
    report
}
