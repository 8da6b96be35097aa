//! One open consultation.
//!
//! ```text
//!   edits ──▶ ConsultationSession ──▶ WorkflowStateMachine
//!                 │        ▲
//!                 │        └── LabEvent (mpsc) ◀── LabPoller task
//!                 ▼
//!        DraftPersistenceGateway ──▶ ConsultationBackend
//! ```
//!
//! All record mutation happens through `&mut self`. The poller never touches
//! the record; it only sends a [`LabEvent`], which the session applies the
//! next time it is driven ([`ConsultationSession::drain_lab_events`] runs at
//! the start of every operation).

mod edit;

pub use edit::*;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::gateway::{ConsultationBackend, DraftPersistenceGateway, FinishError, GatewayError};
use crate::lab::{LabCatalog, LabPoller};
use crate::models::{ConsultationRecord, ConsultationStatus, MedicalHistory, OngoingConsultation};
use crate::validation::{validate, validate_prescriptions, ValidationReport};
use crate::workflow::{
    EditableFields, FieldGroup, Trigger, TriggerKind, WorkflowError, WorkflowStateMachine,
};

/// Session errors. The record and state are unchanged when one is returned,
/// except that a successful draft save may have assigned the record its id.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Network error: {0}")]
    Network(#[from] GatewayError),

    #[error("Draft saved but completion was not confirmed: {0}")]
    FinishNotConfirmed(GatewayError),

    #[error("{group} cannot be edited while consultation is {status}")]
    FieldLocked {
        group: FieldGroup,
        status: ConsultationStatus,
    },

    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    #[error("Unknown lab test: {name}")]
    UnknownLabTest {
        name: String,
        suggestion: Option<String>,
    },
}

impl SessionError {
    /// Failures worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Network(e) => e.is_retryable(),
            SessionError::FinishNotConfirmed(_) => true,
            _ => false,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Sent by the poller task into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabEvent {
    Completed { lab_request_id: String },
}

/// Read-only view for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub consultation_id: Option<String>,
    pub status: ConsultationStatus,
    pub editable_fields: EditableFields,
    pub prescription_submitted: bool,
    pub active_lab_request_id: Option<String>,
    pub bmi: Option<f64>,
    /// Whether a lab status poll loop is running
    pub lab_polling: bool,
}

/// Drives one consultation from open to completion.
pub struct ConsultationSession {
    backend: Arc<dyn ConsultationBackend>,
    gateway: DraftPersistenceGateway,
    record: ConsultationRecord,
    machine: WorkflowStateMachine,
    poller: LabPoller<dyn ConsultationBackend>,
    catalog: LabCatalog,
    config: SessionConfig,
    lab_events_tx: mpsc::UnboundedSender<LabEvent>,
    lab_events_rx: mpsc::UnboundedReceiver<LabEvent>,
}

impl ConsultationSession {
    /// Fetch or create the consultation for an appointment and load the lab
    /// catalog. Resumes polling if the consultation is waiting on the lab.
    pub async fn open(
        backend: Arc<dyn ConsultationBackend>,
        appointment_id: &str,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let record = backend.consultation_or_create(appointment_id).await?;

        let catalog = match backend.lab_tests_catalog().await {
            Ok(tests) => LabCatalog::new(tests),
            Err(e) => {
                warn!(appointment_id, error = %e, "lab catalog unavailable");
                LabCatalog::default()
            }
        };

        Self::resume(backend, record, catalog, config)
    }

    /// Build a session around an already-fetched record.
    ///
    /// Must be called inside a Tokio runtime when the record is waiting for
    /// lab results, since polling starts immediately.
    pub fn resume(
        backend: Arc<dyn ConsultationBackend>,
        mut record: ConsultationRecord,
        catalog: LabCatalog,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let machine = WorkflowStateMachine::from_record(&record)?;
        machine.apply_to(&mut record);

        let (lab_events_tx, lab_events_rx) = mpsc::unbounded_channel();
        let mut session = Self {
            gateway: DraftPersistenceGateway::new(backend.clone()),
            poller: LabPoller::new(backend.clone(), config.poll_interval()),
            backend,
            record,
            machine,
            catalog,
            config,
            lab_events_tx,
            lab_events_rx,
        };

        if let Some(lab_request_id) = session.machine.active_lab_request_id().map(str::to_string) {
            session.start_polling(lab_request_id);
        }

        info!(
            appointment_id = %session.record.appointment_id,
            consultation_id = ?session.record.id,
            status = %session.machine.status(),
            "consultation session opened"
        );
        Ok(session)
    }

    pub fn record(&self) -> &ConsultationRecord {
        &self.record
    }

    pub fn status(&self) -> ConsultationStatus {
        self.machine.status()
    }

    pub fn lab_catalog(&self) -> &LabCatalog {
        &self.catalog
    }

    pub fn current_state(&self) -> SessionSnapshot {
        SessionSnapshot {
            consultation_id: self.record.id.clone(),
            status: self.machine.status(),
            editable_fields: self.machine.editable_fields(),
            prescription_submitted: self.record.prescription_submitted,
            active_lab_request_id: self.machine.active_lab_request_id().map(str::to_string),
            bmi: self.record.bmi(),
            lab_polling: self.poller.is_running(),
        }
    }

    /// Apply one edit if its field group is editable in the current state.
    pub fn apply_edit(&mut self, edit: ConsultationEdit) -> SessionResult<()> {
        self.drain_lab_events();

        let group = edit.group();
        let status = self.machine.status();
        if !self.machine.editable_fields().contains(group) {
            return Err(SessionError::FieldLocked { group, status });
        }

        if status == ConsultationStatus::WaitingForLabResults
            && matches!(edit, ConsultationEdit::RemoveLabRequest { .. })
            && self.record.lab_requests.len() <= 1
        {
            return Err(SessionError::InvalidEdit(
                "cannot remove the last lab request while waiting for results".into(),
            ));
        }

        edit.apply(&mut self.record).map_err(SessionError::InvalidEdit)?;
        self.record.touch();
        Ok(())
    }

    /// Save the draft, dispatch the lab requests and wait for the lab.
    pub async fn send_to_lab(&mut self) -> SessionResult<SessionSnapshot> {
        self.drain_lab_events();
        self.machine.check(&Trigger::SendToLab {
            requests: &self.record.lab_requests,
        })?;

        if self.config.enforce_lab_catalog() {
            self.catalog
                .check_requests(&self.record.lab_requests)
                .map_err(|unknown| SessionError::UnknownLabTest {
                    name: unknown.name,
                    suggestion: unknown.suggestion,
                })?;
        }

        let mut outgoing = self.record.clone();
        for request in &mut outgoing.lab_requests {
            self.catalog.complete_request(request);
        }

        let saved = self.gateway.save_draft(&outgoing).await?;
        let consultation_id = saved.id().to_string();
        self.adopt(saved.into_record());

        let lab_request_id = self
            .backend
            .send_lab_request(&consultation_id, &self.record.lab_requests)
            .await?;

        self.machine
            .send_to_lab(&self.record.lab_requests, lab_request_id.clone())?;
        self.machine.apply_to(&mut self.record);
        self.start_polling(lab_request_id);

        Ok(self.current_state())
    }

    /// Persist prescriptions to the pharmacy queue.
    pub async fn submit_prescription(&mut self) -> SessionResult<SessionSnapshot> {
        self.drain_lab_events();

        let status = self.machine.status();
        if !self.machine.editable_fields().contains(FieldGroup::Prescriptions) {
            return Err(SessionError::FieldLocked {
                group: FieldGroup::Prescriptions,
                status,
            });
        }

        let report = validate_prescriptions(&self.record);
        if !report.is_valid() {
            return Err(SessionError::Validation(report));
        }

        let mut outgoing = self.record.clone();
        outgoing.prescription_submitted = true;
        let saved = self.gateway.save_draft(&outgoing).await?;
        self.adopt(saved.into_record());

        info!(
            consultation_id = ?self.record.id,
            count = self.record.complete_prescriptions().count(),
            "prescriptions submitted"
        );
        Ok(self.current_state())
    }

    /// Persist the current record without changing state.
    pub async fn save_draft(&mut self) -> SessionResult<SessionSnapshot> {
        self.drain_lab_events();
        self.machine.save_draft()?;

        let saved = self.gateway.save_draft(&self.record).await?;
        self.adopt(saved.into_record());
        Ok(self.current_state())
    }

    /// Validate, save, then finalize. COMPLETED only once the store confirms.
    pub async fn finish(&mut self) -> SessionResult<SessionSnapshot> {
        self.drain_lab_events();
        self.machine.ensure_permitted(TriggerKind::Finish)?;

        let report = validate(&self.record);
        if !report.is_valid() {
            return Err(SessionError::Validation(report));
        }
        let prescription_submitted = self.record.prescription_submitted;
        self.machine.check(&Trigger::Finish {
            report: &report,
            prescription_submitted,
        })?;

        match self.gateway.save_then_finish(&self.record).await {
            Ok(completed) => {
                self.machine.finish(&report, prescription_submitted)?;
                self.adopt(completed);
                self.poller.stop();
                Ok(self.current_state())
            }
            Err(FinishError::DraftNotSaved(e)) => Err(SessionError::Network(e)),
            Err(FinishError::NotConfirmed { draft, source }) => {
                self.adopt(*draft);
                Err(SessionError::FinishNotConfirmed(source))
            }
        }
    }

    /// Apply any lab events already delivered. Never blocks.
    pub fn drain_lab_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.lab_events_rx.try_recv() {
            if self.handle_lab_event(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait until the active lab request completes.
    ///
    /// Returns immediately when not waiting or when polling has been stopped.
    pub async fn wait_for_lab_result(&mut self) -> SessionSnapshot {
        loop {
            self.drain_lab_events();
            if self.machine.active_lab_request_id().is_none() || !self.poller.is_running() {
                break;
            }
            match self.lab_events_rx.recv().await {
                Some(event) => {
                    self.handle_lab_event(event);
                }
                None => break,
            }
        }
        self.current_state()
    }

    /// Patient history for display.
    pub async fn medical_history(&self) -> SessionResult<MedicalHistory> {
        Ok(self
            .backend
            .patient_medical_history(&self.record.patient_id)
            .await?)
    }

    /// The doctor's other open consultations.
    pub async fn ongoing_consultations(&self) -> SessionResult<Vec<OngoingConsultation>> {
        Ok(self
            .backend
            .ongoing_consultations(&self.record.doctor_id)
            .await?)
    }

    /// Reload the lab catalog, keeping the old one on failure.
    pub async fn refresh_catalog(&mut self) -> SessionResult<usize> {
        let tests = self.backend.lab_tests_catalog().await?;
        self.catalog = LabCatalog::new(tests);
        Ok(self.catalog.tests().len())
    }

    /// Stop polling. The session stays usable for reads and saves.
    pub fn shutdown(&mut self) {
        self.poller.stop();
    }

    fn start_polling(&mut self, lab_request_id: String) {
        let tx = self.lab_events_tx.clone();
        self.poller.start(lab_request_id, move |lab_request_id| {
            let _ = tx.send(LabEvent::Completed { lab_request_id });
        });
    }

    fn handle_lab_event(&mut self, event: LabEvent) -> bool {
        match event {
            LabEvent::Completed { lab_request_id } => {
                match self.machine.lab_completed(&lab_request_id) {
                    Ok(_) => {
                        self.machine.apply_to(&mut self.record);
                        self.poller.stop();
                        true
                    }
                    Err(e) => {
                        debug!(lab_request_id = %lab_request_id, error = %e, "discarding lab completion");
                        false
                    }
                }
            }
        }
    }

    /// Take the store's copy; local lifecycle state stays authoritative.
    fn adopt(&mut self, saved: ConsultationRecord) {
        self.record = saved;
        self.machine.apply_to(&mut self.record);
    }
}
