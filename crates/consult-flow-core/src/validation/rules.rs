//! Individual field rules. Each returns the error message, or `None` if valid.

use crate::models::Prescription;

/// Inclusive physiological range for a vital sign.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VitalRange {
    /// Human label used in messages
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    /// Unit suffix used in messages
    pub unit: &'static str,
}

impl VitalRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn out_of_range_message(&self) -> String {
        format!(
            "{} must be between {}-{}{}",
            self.label, self.min, self.max, self.unit
        )
    }
}

pub const SYSTOLIC_RANGE: VitalRange = VitalRange {
    label: "Systolic pressure",
    min: 50.0,
    max: 250.0,
    unit: " mmHg",
};

pub const DIASTOLIC_RANGE: VitalRange = VitalRange {
    label: "Diastolic pressure",
    min: 30.0,
    max: 150.0,
    unit: " mmHg",
};

pub const HEART_RATE_RANGE: VitalRange = VitalRange {
    label: "Pulse rate",
    min: 30.0,
    max: 220.0,
    unit: " bpm",
};

pub const TEMPERATURE_RANGE: VitalRange = VitalRange {
    label: "Temperature",
    min: 35.0,
    max: 42.0,
    unit: "°C",
};

pub const SPO2_RANGE: VitalRange = VitalRange {
    label: "SpO2",
    min: 70.0,
    max: 100.0,
    unit: "%",
};

pub const HEIGHT_RANGE: VitalRange = VitalRange {
    label: "Height",
    min: 30.0,
    max: 300.0,
    unit: " cm",
};

pub const WEIGHT_RANGE: VitalRange = VitalRange {
    label: "Weight",
    min: 0.5,
    max: 500.0,
    unit: " kg",
};

/// Non-blank free text.
pub fn check_required_text(value: &str, label: &str) -> Option<String> {
    if value.trim().is_empty() {
        Some(format!("{} is required", label))
    } else {
        None
    }
}

/// A single vital sign against its range.
pub fn check_vital(value: Option<f64>, range: &VitalRange) -> Option<String> {
    match value {
        None => Some(format!("{} is required", range.label)),
        Some(v) if !v.is_finite() => Some(format!("{} must be a number", range.label)),
        Some(v) if !range.contains(v) => Some(range.out_of_range_message()),
        Some(_) => None,
    }
}

/// Systolic and diastolic are checked together; one message covers both fields.
pub fn check_blood_pressure(systolic: Option<f64>, diastolic: Option<f64>) -> Option<String> {
    let (systolic, diastolic) = match (systolic, diastolic) {
        (Some(s), Some(d)) => (s, d),
        _ => return Some("Blood pressure is required".to_string()),
    };

    if let Some(message) = check_vital(Some(systolic), &SYSTOLIC_RANGE) {
        return Some(message);
    }
    if let Some(message) = check_vital(Some(diastolic), &DIASTOLIC_RANGE) {
        return Some(message);
    }
    if systolic <= diastolic {
        return Some("Systolic must be greater than diastolic".to_string());
    }
    None
}

/// At least one prescription with drug name and dosage.
pub fn check_prescriptions(prescriptions: &[Prescription]) -> Option<String> {
    if prescriptions.is_empty() {
        return Some("At least one prescription is required".to_string());
    }
    if !prescriptions.iter().any(Prescription::is_complete) {
        return Some("At least one prescription with drug name and dosage is required".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_messages() {
        assert_eq!(
            check_vital(Some(29.0), &HEART_RATE_RANGE).unwrap(),
            "Pulse rate must be between 30-220 bpm"
        );
        assert_eq!(
            check_vital(Some(34.9), &TEMPERATURE_RANGE).unwrap(),
            "Temperature must be between 35-42°C"
        );
        assert_eq!(
            check_vital(Some(0.4), &WEIGHT_RANGE).unwrap(),
            "Weight must be between 0.5-500 kg"
        );
        assert_eq!(check_vital(None, &SPO2_RANGE).unwrap(), "SpO2 is required");
        assert_eq!(
            check_vital(Some(f64::INFINITY), &HEIGHT_RANGE).unwrap(),
            "Height must be a number"
        );
    }

    #[test]
    fn test_blood_pressure_ordering() {
        assert_eq!(check_blood_pressure(Some(120.0), Some(80.0)), None);
        assert_eq!(
            check_blood_pressure(Some(90.0), Some(90.0)).unwrap(),
            "Systolic must be greater than diastolic"
        );
        assert_eq!(
            check_blood_pressure(Some(120.0), None).unwrap(),
            "Blood pressure is required"
        );
        assert_eq!(
            check_blood_pressure(Some(260.0), Some(80.0)).unwrap(),
            "Systolic pressure must be between 50-250 mmHg"
        );
    }

    #[test]
    fn test_prescription_messages() {
        assert_eq!(
            check_prescriptions(&[]).unwrap(),
            "At least one prescription is required"
        );
        assert_eq!(
            check_prescriptions(&[Prescription::new("Ibuprofen", "")]).unwrap(),
            "At least one prescription with drug name and dosage is required"
        );
        assert_eq!(
            check_prescriptions(&[
                Prescription::new("", ""),
                Prescription::new("Ibuprofen", "400mg"),
            ]),
            None
        );
    }

    #[test]
    fn test_required_text_ignores_whitespace() {
        assert_eq!(check_required_text("   ", "Symptoms").unwrap(), "Symptoms is required");
        assert_eq!(check_required_text("cough", "Symptoms"), None);
    }
}
