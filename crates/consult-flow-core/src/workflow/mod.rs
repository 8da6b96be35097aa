//! Consultation lifecycle state machine.
//!
//! ```text
//!   DRAFT ──sendToLab──▶ WAITING_FOR_LAB_RESULTS ──labCompleted──▶ READY_FOR_REVIEW
//!     │                                                                 │
//!     └──────────────────────────finish──────────▶ COMPLETED ◀──finish──┘
//! ```
//!
//! `saveDraft` is legal in every non-terminal state and never changes state.
//! Anything not in the table is an [`WorkflowError::InvalidTransition`].

mod gating;

pub use gating::*;

use std::fmt;

use thiserror::Error;
use tracing::info;

use crate::models::{ConsultationRecord, ConsultationStatus, LabRequest};
use crate::validation::ValidationReport;

/// Workflow errors. State is never changed when one is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("{trigger} is not allowed while consultation is {from}")]
    InvalidTransition {
        from: ConsultationStatus,
        trigger: TriggerKind,
    },

    #[error("{trigger} rejected: {reason}")]
    GuardRejected { trigger: TriggerKind, reason: String },

    #[error("lab completion for {received} does not match active request {active}")]
    StaleCallback { received: String, active: String },

    #[error("Inconsistent consultation record: {0}")]
    InconsistentRecord(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Lifecycle state. The waiting state owns the active lab request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Draft,
    WaitingForLabResults { lab_request_id: String },
    ReadyForReview,
    Completed,
}

impl WorkflowState {
    pub fn status(&self) -> ConsultationStatus {
        match self {
            WorkflowState::Draft => ConsultationStatus::Draft,
            WorkflowState::WaitingForLabResults { .. } => ConsultationStatus::WaitingForLabResults,
            WorkflowState::ReadyForReview => ConsultationStatus::ReadyForReview,
            WorkflowState::Completed => ConsultationStatus::Completed,
        }
    }

    pub fn active_lab_request_id(&self) -> Option<&str> {
        match self {
            WorkflowState::WaitingForLabResults { lab_request_id } => Some(lab_request_id),
            _ => None,
        }
    }
}

/// Trigger names, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    SendToLab,
    LabCompleted,
    Finish,
    SaveDraft,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 4] = [
        TriggerKind::SendToLab,
        TriggerKind::LabCompleted,
        TriggerKind::Finish,
        TriggerKind::SaveDraft,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::SendToLab => "sendToLab",
            TriggerKind::LabCompleted => "labCompleted",
            TriggerKind::Finish => "finish",
            TriggerKind::SaveDraft => "saveDraft",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trigger together with the data its guard inspects.
#[derive(Debug, Clone, Copy)]
pub enum Trigger<'a> {
    SendToLab { requests: &'a [LabRequest] },
    LabCompleted { request_id: &'a str },
    Finish {
        report: &'a ValidationReport,
        prescription_submitted: bool,
    },
    SaveDraft,
}

impl Trigger<'_> {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::SendToLab { .. } => TriggerKind::SendToLab,
            Trigger::LabCompleted { .. } => TriggerKind::LabCompleted,
            Trigger::Finish { .. } => TriggerKind::Finish,
            Trigger::SaveDraft => TriggerKind::SaveDraft,
        }
    }
}

/// The transition table, without guards.
pub fn is_permitted(status: ConsultationStatus, trigger: TriggerKind) -> bool {
    use ConsultationStatus::*;
    use TriggerKind::*;

    matches!(
        (status, trigger),
        (Draft, SendToLab)
            | (WaitingForLabResults, LabCompleted)
            | (Draft, Finish)
            | (ReadyForReview, Finish)
            | (Draft, SaveDraft)
            | (WaitingForLabResults, SaveDraft)
            | (ReadyForReview, SaveDraft)
    )
}

/// A successful state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConsultationStatus,
    pub to: ConsultationStatus,
    pub trigger: TriggerKind,
}

/// Owns the lifecycle state of one consultation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStateMachine {
    state: WorkflowState,
}

impl Default for WorkflowStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowStateMachine {
    /// A fresh machine in DRAFT.
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Draft,
        }
    }

    /// Resume from a persisted record.
    pub fn from_record(record: &ConsultationRecord) -> WorkflowResult<Self> {
        let state = match record.status {
            ConsultationStatus::Draft => WorkflowState::Draft,
            ConsultationStatus::ReadyForReview => WorkflowState::ReadyForReview,
            ConsultationStatus::Completed => WorkflowState::Completed,
            ConsultationStatus::WaitingForLabResults => {
                let lab_request_id = record
                    .active_lab_request_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        WorkflowError::InconsistentRecord(
                            "waiting for lab results without an active lab request".into(),
                        )
                    })?;
                if record.lab_requests.is_empty() {
                    return Err(WorkflowError::InconsistentRecord(
                        "waiting for lab results with no lab requests".into(),
                    ));
                }
                WorkflowState::WaitingForLabResults {
                    lab_request_id: lab_request_id.to_string(),
                }
            }
        };
        Ok(Self { state })
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn status(&self) -> ConsultationStatus {
        self.state.status()
    }

    pub fn active_lab_request_id(&self) -> Option<&str> {
        self.state.active_lab_request_id()
    }

    /// Field groups that accept writes right now.
    pub fn editable_fields(&self) -> EditableFields {
        editable_fields(self.status())
    }

    /// Table check only.
    pub fn ensure_permitted(&self, trigger: TriggerKind) -> WorkflowResult<()> {
        if is_permitted(self.status(), trigger) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                from: self.status(),
                trigger,
            })
        }
    }

    /// Table check plus guard, without changing state.
    pub fn check(&self, trigger: &Trigger<'_>) -> WorkflowResult<()> {
        self.ensure_permitted(trigger.kind())?;

        match *trigger {
            Trigger::SendToLab { requests } => {
                if requests.is_empty() {
                    return Err(guard(TriggerKind::SendToLab, "no lab requests"));
                }
                if let Some(position) = requests.iter().position(|r| !r.has_test_name()) {
                    return Err(guard(
                        TriggerKind::SendToLab,
                        format!("lab request {} has no test name", position + 1),
                    ));
                }
                Ok(())
            }
            Trigger::LabCompleted { request_id } => match self.active_lab_request_id() {
                Some(active) if active == request_id => Ok(()),
                Some(active) => Err(WorkflowError::StaleCallback {
                    received: request_id.to_string(),
                    active: active.to_string(),
                }),
                None => Err(WorkflowError::InvalidTransition {
                    from: self.status(),
                    trigger: TriggerKind::LabCompleted,
                }),
            },
            Trigger::Finish {
                report,
                prescription_submitted,
            } => {
                if !report.is_valid() {
                    return Err(guard(TriggerKind::Finish, report.to_string()));
                }
                if !prescription_submitted {
                    return Err(guard(
                        TriggerKind::Finish,
                        "prescriptions have not been submitted",
                    ));
                }
                Ok(())
            }
            Trigger::SaveDraft => Ok(()),
        }
    }

    /// DRAFT → WAITING_FOR_LAB_RESULTS.
    pub fn send_to_lab(
        &mut self,
        requests: &[LabRequest],
        lab_request_id: impl Into<String>,
    ) -> WorkflowResult<Transition> {
        self.check(&Trigger::SendToLab { requests })?;
        let lab_request_id = lab_request_id.into();
        if lab_request_id.trim().is_empty() {
            return Err(guard(TriggerKind::SendToLab, "empty lab request id"));
        }
        Ok(self.transition(
            TriggerKind::SendToLab,
            WorkflowState::WaitingForLabResults { lab_request_id },
        ))
    }

    /// WAITING_FOR_LAB_RESULTS → READY_FOR_REVIEW, only for the active request.
    pub fn lab_completed(&mut self, request_id: &str) -> WorkflowResult<Transition> {
        self.check(&Trigger::LabCompleted { request_id })?;
        Ok(self.transition(TriggerKind::LabCompleted, WorkflowState::ReadyForReview))
    }

    /// DRAFT or READY_FOR_REVIEW → COMPLETED.
    pub fn finish(
        &mut self,
        report: &ValidationReport,
        prescription_submitted: bool,
    ) -> WorkflowResult<Transition> {
        self.check(&Trigger::Finish {
            report,
            prescription_submitted,
        })?;
        Ok(self.transition(TriggerKind::Finish, WorkflowState::Completed))
    }

    /// No state change; fails only once completed.
    pub fn save_draft(&self) -> WorkflowResult<()> {
        self.check(&Trigger::SaveDraft)
    }

    /// Copy status and active lab request id onto the record.
    pub fn apply_to(&self, record: &mut ConsultationRecord) {
        record.status = self.status();
        record.active_lab_request_id = self.active_lab_request_id().map(str::to_string);
    }

    fn transition(&mut self, trigger: TriggerKind, next: WorkflowState) -> Transition {
        let from = self.status();
        self.state = next;
        let to = self.status();
        info!(%from, %to, %trigger, "consultation transition");
        Transition { from, to, trigger }
    }
}

fn guard(trigger: TriggerKind, reason: impl Into<String>) -> WorkflowError {
    WorkflowError::GuardRejected {
        trigger,
        reason: reason.into(),
    }
}
