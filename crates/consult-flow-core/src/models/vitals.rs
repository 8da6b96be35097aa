//! Vital signs captured during a consultation.

use serde::{Deserialize, Serialize};

/// The seven measured vital signs. Each is optional until entered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Vitals {
    /// Systolic blood pressure (mmHg)
    #[serde(default)]
    pub blood_pressure_systolic: Option<f64>,
    /// Diastolic blood pressure (mmHg)
    #[serde(default)]
    pub blood_pressure_diastolic: Option<f64>,
    /// Heart rate (bpm)
    #[serde(default)]
    pub heart_rate: Option<f64>,
    /// Body temperature (°C)
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Height (cm)
    #[serde(default)]
    pub height: Option<f64>,
    /// Weight (kg)
    #[serde(default)]
    pub weight: Option<f64>,
    /// Oxygen saturation (%)
    #[serde(default)]
    pub spo2: Option<f64>,
}

/// Identifies a single vital sign, used for targeted edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VitalSign {
    Systolic,
    Diastolic,
    HeartRate,
    Temperature,
    Height,
    Weight,
    SpO2,
}

impl VitalSign {
    /// All vital signs in display order.
    pub const ALL: [VitalSign; 7] = [
        VitalSign::Systolic,
        VitalSign::Diastolic,
        VitalSign::HeartRate,
        VitalSign::Temperature,
        VitalSign::Height,
        VitalSign::Weight,
        VitalSign::SpO2,
    ];

    /// Field name used in validation reports and wire payloads.
    pub fn field_name(&self) -> &'static str {
        match self {
            VitalSign::Systolic => "blood_pressure_systolic",
            VitalSign::Diastolic => "blood_pressure_diastolic",
            VitalSign::HeartRate => "heart_rate",
            VitalSign::Temperature => "temperature",
            VitalSign::Height => "height",
            VitalSign::Weight => "weight",
            VitalSign::SpO2 => "spo2",
        }
    }
}

impl Vitals {
    /// Read a single vital sign.
    pub fn get(&self, sign: VitalSign) -> Option<f64> {
        match sign {
            VitalSign::Systolic => self.blood_pressure_systolic,
            VitalSign::Diastolic => self.blood_pressure_diastolic,
            VitalSign::HeartRate => self.heart_rate,
            VitalSign::Temperature => self.temperature,
            VitalSign::Height => self.height,
            VitalSign::Weight => self.weight,
            VitalSign::SpO2 => self.spo2,
        }
    }

    /// Overwrite a single vital sign. `None` clears it.
    pub fn set(&mut self, sign: VitalSign, value: Option<f64>) {
        let slot = match sign {
            VitalSign::Systolic => &mut self.blood_pressure_systolic,
            VitalSign::Diastolic => &mut self.blood_pressure_diastolic,
            VitalSign::HeartRate => &mut self.heart_rate,
            VitalSign::Temperature => &mut self.temperature,
            VitalSign::Height => &mut self.height,
            VitalSign::Weight => &mut self.weight,
            VitalSign::SpO2 => &mut self.spo2,
        };
        *slot = value;
    }

    /// Body-mass index derived from height and weight. Never stored.
    pub fn bmi(&self) -> Option<f64> {
        calculate_bmi(self.weight, self.height)
    }
}

/// `weight / (height_m)²`, rounded to two decimals.
///
/// Undefined when either input is missing, non-finite or not positive.
pub fn calculate_bmi(weight_kg: Option<f64>, height_cm: Option<f64>) -> Option<f64> {
    let weight = weight_kg.filter(|w| w.is_finite() && *w > 0.0)?;
    let height = height_cm.filter(|h| h.is_finite() && *h > 0.0)?;

    let height_m = height / 100.0;
    let bmi = weight / (height_m * height_m);
    Some((bmi * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmi_rounds_to_two_decimals() {
        assert_eq!(calculate_bmi(Some(70.0), Some(170.0)), Some(24.22));
        assert_eq!(calculate_bmi(Some(80.0), Some(180.0)), Some(24.69));
    }

    #[test]
    fn test_bmi_undefined_for_missing_or_non_positive() {
        assert_eq!(calculate_bmi(None, Some(170.0)), None);
        assert_eq!(calculate_bmi(Some(70.0), None), None);
        assert_eq!(calculate_bmi(Some(0.0), Some(170.0)), None);
        assert_eq!(calculate_bmi(Some(70.0), Some(-1.0)), None);
        assert_eq!(calculate_bmi(Some(f64::NAN), Some(170.0)), None);
    }

    #[test]
    fn test_get_set_round_trip_every_sign() {
        let mut vitals = Vitals::default();
        for (i, sign) in VitalSign::ALL.iter().enumerate() {
            vitals.set(*sign, Some(i as f64 + 1.0));
        }
        for (i, sign) in VitalSign::ALL.iter().enumerate() {
            assert_eq!(vitals.get(*sign), Some(i as f64 + 1.0));
        }

        vitals.set(VitalSign::Weight, None);
        assert_eq!(vitals.weight, None);
        assert_eq!(vitals.bmi(), None);
    }
}
