//! JSON shapes exchanged with the clinic API.
//!
//! Responses arrive wrapped in [`ApiEnvelope`]. Numeric columns may be sent
//! as strings and ids as numbers, so both are parsed leniently.

use consult_flow_core::gateway::{GatewayError, GatewayResult};
use consult_flow_core::models::{
    CompletionReceipt, ConsultationRecord, ConsultationStatus, LabRequest, LabRequestStatus,
    Prescription, Urgency, Vitals,
};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Upper bound the server accepts for the DECIMAL(4,2) bmi column.
pub const MAX_BMI: f64 = 99.99;

const DEFAULT_TEST_TYPE: &str = "blood";

// ============================================================================
// Envelope
// ============================================================================

/// `{success, data, message?, error?}`
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

impl<T> ApiEnvelope<T> {
    /// Server-provided failure text, preferring `error` over `message`.
    pub fn failure_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .filter(|m| !m.trim().is_empty())
    }

    /// Payload of a successful response.
    pub fn into_data(self, status: u16) -> GatewayResult<T> {
        if !self.success {
            return Err(GatewayError::Status {
                status,
                message: self
                    .failure_message()
                    .unwrap_or("request was not successful")
                    .to_string(),
            });
        }
        self.data
            .ok_or_else(|| GatewayError::Decode("response has no data".into()))
    }
}

/// Decode an envelope body.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> GatewayResult<ApiEnvelope<T>> {
    serde_json::from_slice(body).map_err(|e| GatewayError::Decode(e.to_string()))
}

/// Best-effort message from an error response body.
pub fn error_message(body: &[u8]) -> Option<String> {
    if let Ok(envelope) = serde_json::from_slice::<ApiEnvelope<Value>>(body) {
        if let Some(message) = envelope.failure_message() {
            return Some(message.to_string());
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

// ============================================================================
// Requests
// ============================================================================

/// Flat snake_case consultation body for save-draft.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConsultationPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_id: Option<String>,
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub blood_pressure_systolic: Option<f64>,
    pub blood_pressure_diastolic: Option<f64>,
    pub heart_rate: Option<f64>,
    /// Mirror of `heart_rate`
    pub pulse_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub spo2: Option<f64>,
    pub bmi: Option<f64>,
    pub symptoms: String,
    pub diagnosis: String,
    pub icd_code: String,
    pub notes: String,
    pub prescriptions: Vec<Prescription>,
    /// Absent while waiting for lab results; the server replaces the stored
    /// rows, including the one being polled, whenever this is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_requests: Option<Vec<LabRequestPayload>>,
    pub prescription_submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConsultationStatus>,
}

impl ConsultationPayload {
    pub fn from_record(record: &ConsultationRecord) -> Self {
        let vitals = &record.vitals;
        let waiting = record.status == ConsultationStatus::WaitingForLabResults;
        Self {
            consultation_id: record.id.clone(),
            appointment_id: record.appointment_id.clone(),
            patient_id: record.patient_id.clone(),
            doctor_id: record.doctor_id.clone(),
            blood_pressure_systolic: vitals.blood_pressure_systolic,
            blood_pressure_diastolic: vitals.blood_pressure_diastolic,
            heart_rate: vitals.heart_rate,
            pulse_rate: vitals.heart_rate,
            temperature: vitals.temperature,
            height: vitals.height,
            weight: vitals.weight,
            spo2: vitals.spo2,
            bmi: capped_bmi(record.bmi()),
            symptoms: record.symptoms.clone(),
            diagnosis: record.diagnosis.clone(),
            icd_code: record.icd_code.clone(),
            notes: record.notes.clone(),
            prescriptions: record.complete_prescriptions().cloned().collect(),
            lab_requests: (!waiting).then(|| LabRequestPayload::named(&record.lab_requests)),
            prescription_submitted: record.prescription_submitted,
            status: (!waiting).then_some(record.status),
        }
    }
}

fn capped_bmi(bmi: Option<f64>) -> Option<f64> {
    bmi.filter(|b| b.is_finite() && *b >= 0.0)
        .map(|b| b.min(MAX_BMI))
}

/// Lab request row as the server stores it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LabRequestPayload {
    pub test_name: String,
    pub test_type: String,
    pub urgency: Urgency,
    pub instructions: String,
}

impl LabRequestPayload {
    /// Requests with a test name, in order.
    pub fn named(requests: &[LabRequest]) -> Vec<Self> {
        requests
            .iter()
            .filter(|r| r.has_test_name())
            .map(|r| Self {
                test_name: r.test_name.trim().to_string(),
                test_type: r
                    .test_type
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TEST_TYPE.to_string()),
                urgency: r.urgency,
                instructions: r.instructions.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FinishRequest<'a> {
    pub consultation_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendLabRequestBody<'a> {
    pub consultation_id: &'a str,
    pub lab_requests: Vec<LabRequestPayload>,
}

// ============================================================================
// Responses
// ============================================================================

/// Consultation as returned by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsultationDto {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub appointment_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub patient_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub doctor_id: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub blood_pressure_systolic: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub blood_pressure_diastolic: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub heart_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pulse_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub height: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub spo2: Option<f64>,
    pub symptoms: Option<String>,
    pub diagnosis: Option<String>,
    pub icd_code: Option<String>,
    pub notes: Option<String>,
    pub prescriptions: Option<Vec<Prescription>>,
    pub lab_requests: Option<Vec<LabRequest>>,
    pub status: Option<ConsultationStatus>,
    pub prescription_submitted: Option<bool>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub lab_request_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl ConsultationDto {
    pub fn into_record(self) -> ConsultationRecord {
        let mut record =
            ConsultationRecord::new(self.appointment_id, self.patient_id, self.doctor_id);
        let prescriptions = self.prescriptions.unwrap_or_default();

        record.id = self.id;
        record.vitals = Vitals {
            blood_pressure_systolic: self.blood_pressure_systolic,
            blood_pressure_diastolic: self.blood_pressure_diastolic,
            heart_rate: self.heart_rate.or(self.pulse_rate),
            temperature: self.temperature,
            height: self.height,
            weight: self.weight,
            spo2: self.spo2,
        };
        record.symptoms = self.symptoms.unwrap_or_default();
        record.diagnosis = self.diagnosis.unwrap_or_default();
        record.icd_code = self.icd_code.unwrap_or_default();
        record.notes = self.notes.unwrap_or_default();
        record.prescription_submitted = self
            .prescription_submitted
            .unwrap_or(!prescriptions.is_empty());
        record.prescriptions = prescriptions;
        record.lab_requests = self.lab_requests.unwrap_or_default();
        record.status = self.status.unwrap_or(ConsultationStatus::Draft);
        record.active_lab_request_id = self.lab_request_id;
        if let Some(created_at) = self.created_at {
            record.created_at = created_at;
        }
        if let Some(updated_at) = self.updated_at {
            record.updated_at = updated_at;
        }
        record
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveDraftResponse {
    #[serde(alias = "consultation_id", deserialize_with = "lenient_string")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinishResponse {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub consultation_id: Option<String>,
    pub status: ConsultationStatus,
}

impl FinishResponse {
    pub fn into_receipt(self, consultation_id: &str) -> CompletionReceipt {
        CompletionReceipt {
            consultation_id: self
                .consultation_id
                .unwrap_or_else(|| consultation_id.to_string()),
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendLabResponse {
    #[serde(alias = "id", deserialize_with = "lenient_string")]
    pub lab_request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabStatusResponse {
    pub status: LabRequestStatus,
}

// ============================================================================
// Lenient scalars
// ============================================================================

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_opt_string(deserializer)?
        .ok_or_else(|| de::Error::custom("expected a string or number, found null"))
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string or number, found {}",
            other
        ))),
    }
}
