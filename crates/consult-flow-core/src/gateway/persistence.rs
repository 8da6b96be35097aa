//! Draft saves and finalization.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{ConsultationBackend, GatewayError, GatewayResult};
use crate::models::{ConsultationRecord, ConsultationStatus};

/// A record the store has durably accepted. Only the gateway creates these.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedDraft {
    record: ConsultationRecord,
    id: String,
}

impl SavedDraft {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn record(&self) -> &ConsultationRecord {
        &self.record
    }

    pub fn into_record(self) -> ConsultationRecord {
        self.record
    }
}

/// Which step of draft-then-finish failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FinishError {
    /// Nothing was persisted.
    #[error("Draft was not saved: {0}")]
    DraftNotSaved(GatewayError),

    /// The draft is durable but completion was not confirmed.
    #[error("Draft saved but completion was not confirmed: {source}")]
    NotConfirmed {
        draft: Box<ConsultationRecord>,
        source: GatewayError,
    },
}

/// Persists drafts and finalizes consultations through a backend.
#[derive(Clone)]
pub struct DraftPersistenceGateway {
    backend: Arc<dyn ConsultationBackend>,
}

impl DraftPersistenceGateway {
    pub fn new(backend: Arc<dyn ConsultationBackend>) -> Self {
        Self { backend }
    }

    /// Upsert a non-final record.
    pub async fn save_draft(&self, record: &ConsultationRecord) -> GatewayResult<SavedDraft> {
        if record.status.is_terminal() {
            return Err(GatewayError::Conflict(format!(
                "consultation {} is completed and read-only",
                record.id.as_deref().unwrap_or("<unsaved>")
            )));
        }

        let saved = self.backend.save_draft(record).await?;
        let id = saved
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::Decode("saved draft has no id".into()))?;

        debug!(consultation_id = %id, status = %saved.status, "draft saved");
        Ok(SavedDraft { record: saved, id })
    }

    /// Finalize a saved draft. Only the draft's id is sent.
    pub async fn finish(&self, draft: SavedDraft) -> Result<ConsultationRecord, FinishError> {
        match self.backend.finish(&draft.id).await {
            Ok(receipt) if receipt.status == ConsultationStatus::Completed => {
                let mut record = draft.record;
                record.status = ConsultationStatus::Completed;
                record.active_lab_request_id = None;
                record.touch();
                info!(consultation_id = %draft.id, "consultation completed");
                Ok(record)
            }
            Ok(receipt) => {
                warn!(consultation_id = %draft.id, status = %receipt.status, "finish not confirmed");
                Err(FinishError::NotConfirmed {
                    draft: Box::new(draft.record),
                    source: GatewayError::Decode(format!(
                        "finish returned status {}",
                        receipt.status
                    )),
                })
            }
            Err(source) => {
                warn!(consultation_id = %draft.id, error = %source, "finish failed after draft save");
                Err(FinishError::NotConfirmed {
                    draft: Box::new(draft.record),
                    source,
                })
            }
        }
    }

    /// Save the record, then finalize it by id.
    ///
    /// A save refused with `Conflict` for a record the caller still holds as
    /// open means an earlier finish reached the store but its reply was lost.
    /// That is confirmed by finishing the id again before reporting success.
    pub async fn save_then_finish(
        &self,
        record: &ConsultationRecord,
    ) -> Result<ConsultationRecord, FinishError> {
        let draft = match self.save_draft(record).await {
            Ok(draft) => draft,
            Err(GatewayError::Conflict(message)) if !record.status.is_terminal() => {
                return self.confirm_completed(record, message).await;
            }
            Err(e) => return Err(FinishError::DraftNotSaved(e)),
        };
        self.finish(draft).await
    }

    async fn confirm_completed(
        &self,
        record: &ConsultationRecord,
        conflict: String,
    ) -> Result<ConsultationRecord, FinishError> {
        let Some(id) = record.id.as_deref() else {
            return Err(FinishError::DraftNotSaved(GatewayError::Conflict(conflict)));
        };

        match self.backend.finish(id).await {
            Ok(receipt) if receipt.status == ConsultationStatus::Completed => {
                let mut completed = record.clone();
                completed.status = ConsultationStatus::Completed;
                completed.active_lab_request_id = None;
                completed.touch();
                warn!(
                    consultation_id = %id,
                    "store already completed consultation; edits since the last save were not stored"
                );
                Ok(completed)
            }
            Ok(receipt) => {
                debug!(consultation_id = %id, status = %receipt.status, "conflict not resolved by finish");
                Err(FinishError::DraftNotSaved(GatewayError::Conflict(conflict)))
            }
            Err(e) => Err(FinishError::DraftNotSaved(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalBackend;
    use crate::models::{AppointmentRef, Prescription};

    async fn setup() -> (Arc<LocalBackend>, ConsultationRecord) {
        let backend = Arc::new(LocalBackend::open_in_memory().unwrap());
        backend
            .register_appointment(&AppointmentRef::new("apt-1", "pat-1", "doc-1"))
            .unwrap();
        let record = backend.consultation_or_create("apt-1").await.unwrap();
        (backend, record)
    }

    #[tokio::test]
    async fn test_save_draft_assigns_id() {
        let (backend, mut record) = setup().await;
        let gateway = DraftPersistenceGateway::new(backend);

        record.symptoms = "Headache".into();
        let saved = gateway.save_draft(&record).await.unwrap();
        assert!(!saved.id().is_empty());
        assert_eq!(saved.record().symptoms, "Headache");
    }

    #[tokio::test]
    async fn test_save_draft_rejects_completed() {
        let (backend, mut record) = setup().await;
        let gateway = DraftPersistenceGateway::new(backend);

        record.status = ConsultationStatus::Completed;
        let err = gateway.save_draft(&record).await.unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_save_then_finish_completes() {
        let (backend, mut record) = setup().await;
        let gateway = DraftPersistenceGateway::new(backend.clone());

        record.prescriptions.push(Prescription::new("Ibuprofen", "400mg"));
        record.prescription_submitted = true;
        let completed = gateway.save_then_finish(&record).await.unwrap();
        assert_eq!(completed.status, ConsultationStatus::Completed);

        let stored = backend.consultation_or_create("apt-1").await.unwrap();
        assert_eq!(stored.status, ConsultationStatus::Completed);
        assert_eq!(stored.prescriptions.len(), 1);
    }

    #[tokio::test]
    async fn test_save_then_finish_confirms_earlier_completion() {
        let (backend, mut record) = setup().await;
        let gateway = DraftPersistenceGateway::new(backend.clone());

        record.symptoms = "Sore throat".into();
        let draft = gateway.save_draft(&record).await.unwrap();
        backend.finish(draft.id()).await.unwrap();

        let mut local = draft.into_record();
        local.notes = "Rest".into();
        let completed = gateway.save_then_finish(&local).await.unwrap();
        assert_eq!(completed.status, ConsultationStatus::Completed);
        assert_eq!(completed.id, local.id);
    }

    #[tokio::test]
    async fn test_save_then_finish_conflict_without_id_is_not_saved() {
        let (backend, record) = setup().await;
        let gateway = DraftPersistenceGateway::new(backend.clone());
        backend.finish(record.id.as_deref().unwrap()).await.unwrap();

        let mut unsaved = record.clone();
        unsaved.id = None;
        let err = gateway.save_then_finish(&unsaved).await.unwrap_err();
        assert!(matches!(
            err,
            FinishError::DraftNotSaved(GatewayError::Conflict(_))
        ));
    }
}
