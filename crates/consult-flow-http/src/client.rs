//! [`ConsultationBackend`] over the clinic REST API.

use async_trait::async_trait;
use consult_flow_core::gateway::{
    ConsultationBackend, GatewayError, GatewayResult, LabStatusSource,
};
use consult_flow_core::models::{
    CompletionReceipt, ConsultationRecord, LabRequest, LabRequestStatus, LabTest, MedicalHistory,
    OngoingConsultation,
};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ClientError, ClientResult};
use crate::wire::{
    decode_envelope, error_message, ConsultationDto, ConsultationPayload, FinishRequest,
    FinishResponse, LabRequestPayload, LabStatusResponse, SaveDraftResponse, SendLabRequestBody,
    SendLabResponse,
};

/// HTTP-backed store and lab.
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
    bearer_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let base = Url::parse(config.base_url()).map_err(|e| ClientError::InvalidConfig {
            name: "base_url",
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidConfig {
                name: "base_url",
                reason: format!("'{}' cannot carry a path", base),
            });
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base,
            bearer_token: config.bearer_token().map(str::to_string),
        })
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Base URL with percent-encoded path segments appended.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.endpoint(segments);
        debug!(%method, %url, "api request");
        let builder = self.client.request(method, url);
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send, check the status, and unwrap the envelope.
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> GatewayResult<T> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").into());
            warn!(status = status.as_u16(), %message, "api request failed");
            return Err(match status {
                StatusCode::NOT_FOUND => GatewayError::NotFound(message),
                StatusCode::CONFLICT => GatewayError::Conflict(message),
                _ => GatewayError::Status {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        decode_envelope::<T>(&body)?.into_data(status.as_u16())
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    GatewayError::Transport(e.to_string())
}

#[async_trait]
impl LabStatusSource for HttpBackend {
    async fn lab_request_status(&self, lab_request_id: &str) -> GatewayResult<LabRequestStatus> {
        let response: LabStatusResponse = self
            .call(self.request(Method::GET, &["lab-requests", lab_request_id, "status"]))
            .await?;
        Ok(response.status)
    }
}

#[async_trait]
impl ConsultationBackend for HttpBackend {
    async fn consultation_or_create(
        &self,
        appointment_id: &str,
    ) -> GatewayResult<ConsultationRecord> {
        let dto: ConsultationDto = self
            .call(self.request(
                Method::GET,
                &["appointments", appointment_id, "consultation-or-create"],
            ))
            .await?;
        let record = dto.into_record();
        if record.id.is_none() {
            return Err(GatewayError::Decode("consultation has no id".into()));
        }
        Ok(record)
    }

    async fn lab_tests_catalog(&self) -> GatewayResult<Vec<LabTest>> {
        self.call(self.request(Method::GET, &["lab", "tests"])).await
    }

    async fn save_draft(&self, record: &ConsultationRecord) -> GatewayResult<ConsultationRecord> {
        let payload = ConsultationPayload::from_record(record);
        let response: SaveDraftResponse = self
            .call(
                self.request(Method::POST, &["consultations", "save-draft"])
                    .json(&payload),
            )
            .await?;

        let mut saved = record.clone();
        saved.id = Some(response.id);
        Ok(saved)
    }

    async fn finish(&self, consultation_id: &str) -> GatewayResult<CompletionReceipt> {
        let response: FinishResponse = self
            .call(
                self.request(Method::POST, &["consultations", "finish"])
                    .json(&FinishRequest { consultation_id }),
            )
            .await?;
        Ok(response.into_receipt(consultation_id))
    }

    async fn send_lab_request(
        &self,
        consultation_id: &str,
        requests: &[LabRequest],
    ) -> GatewayResult<String> {
        let body = SendLabRequestBody {
            consultation_id,
            lab_requests: LabRequestPayload::named(requests),
        };
        let response: SendLabResponse = self
            .call(
                self.request(Method::POST, &["consultations", "send-lab-request"])
                    .json(&body),
            )
            .await?;
        Ok(response.lab_request_id)
    }

    async fn patient_medical_history(&self, patient_id: &str) -> GatewayResult<MedicalHistory> {
        self.call(self.request(Method::GET, &["patients", patient_id, "medical-history"]))
            .await
    }

    async fn ongoing_consultations(
        &self,
        doctor_id: &str,
    ) -> GatewayResult<Vec<OngoingConsultation>> {
        self.call(
            self.request(Method::GET, &["consultations", "ongoing"])
                .query(&[("doctorId", doctor_id)]),
        )
        .await
    }
}
