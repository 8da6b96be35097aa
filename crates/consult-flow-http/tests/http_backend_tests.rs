//! HttpBackend against an in-process mock of the clinic API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use consult_flow_core::gateway::{
    ConsultationBackend, DraftPersistenceGateway, GatewayError, LabStatusSource,
};
use consult_flow_core::models::{
    ConsultationRecord, ConsultationStatus, LabRequest, LabRequestStatus, Prescription,
};
use consult_flow_http::{ClientConfig, HttpBackend};
use serde_json::{json, Value};

/// Bodies received by the mock, in order.
#[derive(Clone, Default)]
struct Recorded {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

impl Recorded {
    fn push(&self, headers: &HeaderMap, body: Value) {
        self.auth.lock().unwrap().push(
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
        self.bodies.lock().unwrap().push(body);
    }

    fn last_body(&self) -> Value {
        self.bodies.lock().unwrap().last().cloned().unwrap()
    }
}

fn ok(data: Value) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

async fn consultation_or_create(Path(appointment_id): Path<String>) -> (StatusCode, Json<Value>) {
    if appointment_id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Appointment not found" })),
        );
    }
    (
        StatusCode::OK,
        ok(json!({
            "id": 101,
            "appointment_id": appointment_id,
            "patient_id": "pat-1",
            "doctor_id": "doc-1",
            "blood_pressure_systolic": "118.00",
            "blood_pressure_diastolic": "76.00",
            "pulse_rate": 70,
            "prescriptions": [{ "drug_name": "Lisinopril", "dosage": "10mg" }],
            "status": "DRAFT"
        })),
    )
}

async fn save_draft(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    recorded.push(&headers, body.clone());
    if body["diagnosis"] == "reject me" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "success": false, "error": "Diagnosis is invalid" })),
        );
    }
    let id = body
        .get("consultation_id")
        .cloned()
        .unwrap_or_else(|| json!(555));
    (StatusCode::OK, ok(json!({ "id": id })))
}

async fn finish(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    recorded.push(&headers, body.clone());
    match body["consultation_id"].as_str() {
        Some("locked") => (
            StatusCode::CONFLICT,
            Json(json!({ "success": false, "message": "Consultation is waiting for lab results" })),
        ),
        Some("soft-fail") => (
            StatusCode::OK,
            Json(json!({ "success": false, "message": "Pharmacy queue unavailable" })),
        ),
        Some(id) => (
            StatusCode::OK,
            ok(json!({ "consultation_id": id, "status": "COMPLETED" })),
        ),
        None => (StatusCode::BAD_REQUEST, Json(json!({ "success": false }))),
    }
}

async fn send_lab_request(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    recorded.push(&headers, body);
    ok(json!({ "lab_request_id": 9001 }))
}

async fn lab_status(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    match id.as_str() {
        "done" => (StatusCode::OK, ok(json!({ "status": "completed" }))),
        "fresh" => (StatusCode::OK, ok(json!({ "status": "pending" }))),
        "garbled" => (StatusCode::OK, ok(json!({ "status": 17 }))),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "message": "Lab system offline" })),
        ),
    }
}

async fn lab_tests() -> Json<Value> {
    ok(json!([
        { "test_name": "Complete Blood Count", "test_code": "CBC", "category": "Hematology" },
        { "test_name": "Urinalysis", "test_type": "urine" }
    ]))
}

async fn ongoing(Query(query): Query<std::collections::HashMap<String, String>>) -> Json<Value> {
    let doctor_id = query.get("doctorId").cloned().unwrap_or_default();
    ok(json!([{
        "id": "c-1",
        "appointment_id": "apt-1",
        "patient_id": "pat-1",
        "status": "WAITING_FOR_LAB_RESULTS",
        "updated_at": format!("2024-05-01T10:00:00Z/{}", doctor_id)
    }]))
}

async fn medical_history(Path(patient_id): Path<String>) -> Json<Value> {
    ok(json!({
        "patient_id": patient_id,
        "previous_consultations": [{
            "id": "c-0",
            "diagnosis": "Hypertension",
            "date": "2024-01-10T09:00:00Z"
        }],
        "lab_results": [{
            "lab_request_id": "lab-0",
            "test_name": "Lipid Panel",
            "status": "completed",
            "result": "LDL 3.1 mmol/L"
        }]
    }))
}

async fn start_server() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route(
            "/api/appointments/:id/consultation-or-create",
            get(consultation_or_create),
        )
        .route("/api/consultations/save-draft", post(save_draft))
        .route("/api/consultations/finish", post(finish))
        .route("/api/consultations/send-lab-request", post(send_lab_request))
        .route("/api/consultations/ongoing", get(ongoing))
        .route("/api/lab-requests/:id/status", get(lab_status))
        .route("/api/lab/tests", get(lab_tests))
        .route("/api/patients/:id/medical-history", get(medical_history))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/api", addr), recorded)
}

fn backend(base_url: &str) -> HttpBackend {
    HttpBackend::new(
        ClientConfig::new(base_url)
            .unwrap()
            .with_timeout(Duration::from_secs(5))
            .with_bearer_token("token-123"),
    )
    .unwrap()
}

fn draft() -> ConsultationRecord {
    let mut record = ConsultationRecord::new("apt-1", "pat-1", "doc-1");
    record.symptoms = "Palpitations".into();
    record.diagnosis = "Sinus tachycardia".into();
    record.vitals.heart_rate = Some(112.0);
    record.vitals.weight = Some(400.0);
    record.vitals.height = Some(100.0);
    record.prescriptions = vec![
        Prescription::new("Propranolol", "10mg"),
        Prescription::new("", "5mg"),
    ];
    record.lab_requests = vec![LabRequest::new("Thyroid Panel"), LabRequest::new("  ")];
    record
}

#[tokio::test]
async fn test_consultation_or_create_parses_lenient_record() {
    let (base, _) = start_server().await;
    let record = backend(&base).consultation_or_create("apt-1").await.unwrap();

    assert_eq!(record.id.as_deref(), Some("101"));
    assert_eq!(record.vitals.blood_pressure_systolic, Some(118.0));
    assert_eq!(record.vitals.heart_rate, Some(70.0));
    assert!(record.prescription_submitted);
    assert_eq!(record.status, ConsultationStatus::Draft);
}

#[tokio::test]
async fn test_not_found_maps_to_gateway_not_found() {
    let (base, _) = start_server().await;
    let err = backend(&base)
        .consultation_or_create("missing")
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::NotFound("Appointment not found".into()));
}

#[tokio::test]
async fn test_save_draft_sends_flat_payload() {
    let (base, recorded) = start_server().await;
    let record = draft();
    let saved = backend(&base).save_draft(&record).await.unwrap();

    assert_eq!(saved.id.as_deref(), Some("555"));
    assert_eq!(saved.diagnosis, record.diagnosis);

    let body = recorded.last_body();
    assert!(body.get("consultation_id").is_none());
    assert_eq!(body["pulse_rate"], 112.0);
    assert_eq!(body["heart_rate"], 112.0);
    assert_eq!(body["bmi"], 99.99);
    assert_eq!(body["prescriptions"].as_array().unwrap().len(), 1);
    assert_eq!(body["lab_requests"].as_array().unwrap().len(), 1);
    assert_eq!(body["lab_requests"][0]["test_type"], "blood");
    assert_eq!(
        recorded.auth.lock().unwrap().last().cloned().flatten().as_deref(),
        Some("Bearer token-123")
    );
}

#[tokio::test]
async fn test_save_while_waiting_keeps_dispatched_lab_rows() {
    let (base, recorded) = start_server().await;
    let mut record = draft();
    record.id = Some("c-8".into());
    record.status = ConsultationStatus::WaitingForLabResults;
    record.active_lab_request_id = Some("lab-3".into());
    record.symptoms = "Palpitations at rest".into();

    let saved = backend(&base).save_draft(&record).await.unwrap();
    assert_eq!(saved.id.as_deref(), Some("c-8"));
    assert_eq!(saved.status, ConsultationStatus::WaitingForLabResults);

    let body = recorded.last_body();
    assert_eq!(body["symptoms"], "Palpitations at rest");
    assert!(body.get("lab_requests").is_none());
    assert!(body.get("status").is_none());
}

#[tokio::test]
async fn test_rejected_save_carries_server_message() {
    let (base, _) = start_server().await;
    let mut record = draft();
    record.diagnosis = "reject me".into();

    let err = backend(&base).save_draft(&record).await.unwrap_err();
    assert_eq!(
        err,
        GatewayError::Status {
            status: 422,
            message: "Diagnosis is invalid".into()
        }
    );
}

#[tokio::test]
async fn test_finish_outcomes() {
    let (base, _) = start_server().await;
    let backend = backend(&base);

    let receipt = backend.finish("c-7").await.unwrap();
    assert_eq!(receipt.consultation_id, "c-7");
    assert_eq!(receipt.status, ConsultationStatus::Completed);

    assert!(matches!(
        backend.finish("locked").await,
        Err(GatewayError::Conflict(_))
    ));
    assert_eq!(
        backend.finish("soft-fail").await.unwrap_err(),
        GatewayError::Status {
            status: 200,
            message: "Pharmacy queue unavailable".into()
        }
    );
}

#[tokio::test]
async fn test_save_then_finish_over_http() {
    let (base, recorded) = start_server().await;
    let gateway = DraftPersistenceGateway::new(Arc::new(backend(&base)));

    let mut record = draft();
    record.id = Some("c-42".into());
    let completed = gateway.save_then_finish(&record).await.unwrap();

    assert_eq!(completed.status, ConsultationStatus::Completed);
    assert_eq!(completed.id.as_deref(), Some("c-42"));
    let bodies = recorded.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[1], json!({ "consultation_id": "c-42" }));
}

#[tokio::test]
async fn test_send_lab_request_returns_id() {
    let (base, recorded) = start_server().await;
    let id = backend(&base)
        .send_lab_request("c-1", &[LabRequest::new("Ferritin"), LabRequest::new("")])
        .await
        .unwrap();

    assert_eq!(id, "9001");
    let body = recorded.last_body();
    assert_eq!(body["consultation_id"], "c-1");
    assert_eq!(body["lab_requests"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_lab_status_mapping() {
    let (base, _) = start_server().await;
    let backend = backend(&base);

    assert_eq!(
        backend.lab_request_status("done").await.unwrap(),
        LabRequestStatus::Completed
    );
    assert_eq!(
        backend.lab_request_status("fresh").await.unwrap(),
        LabRequestStatus::Requested
    );
    assert!(matches!(
        backend.lab_request_status("garbled").await,
        Err(GatewayError::Decode(_))
    ));
    assert_eq!(
        backend.lab_request_status("other").await.unwrap_err(),
        GatewayError::Status {
            status: 500,
            message: "Lab system offline".into()
        }
    );
}

#[tokio::test]
async fn test_catalog_history_and_ongoing() {
    let (base, _) = start_server().await;
    let backend = backend(&base);

    let tests = backend.lab_tests_catalog().await.unwrap();
    assert_eq!(tests.len(), 2);
    assert_eq!(tests[0].test_type, "blood");
    assert_eq!(tests[1].test_type, "urine");

    let history = backend.patient_medical_history("pat-1").await.unwrap();
    assert_eq!(history.patient_id, "pat-1");
    assert_eq!(history.diagnoses(), vec!["Hypertension"]);
    assert_eq!(history.lab_results[0].result.as_deref(), Some("LDL 3.1 mmol/L"));

    let ongoing = backend.ongoing_consultations("doc-9").await.unwrap();
    assert_eq!(ongoing.len(), 1);
    assert_eq!(ongoing[0].status, ConsultationStatus::WaitingForLabResults);
    assert!(ongoing[0].updated_at.ends_with("/doc-9"));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = backend(&format!("http://{}/api", addr))
        .lab_request_status("lab-1")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
}
