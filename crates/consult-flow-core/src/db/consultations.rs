//! Consultation database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{
    ConsultationRecord, ConsultationStatus, LabRequest, OngoingConsultation, PastConsultation,
    Prescription, Vitals,
};

const CONSULTATION_COLUMNS: &str = r#"
    id, appointment_id, patient_id, doctor_id, vitals, symptoms, diagnosis,
    icd_code, notes, prescriptions, lab_requests, status,
    prescription_submitted, lab_request_id, created_at, updated_at
"#;

impl Database {
    /// Insert a new consultation. The record must already carry an id.
    pub fn insert_consultation(&self, record: &ConsultationRecord) -> DbResult<()> {
        let id = record
            .id
            .as_deref()
            .ok_or_else(|| DbError::Constraint("consultation has no id".into()))?;

        self.conn.execute(
            r#"
            INSERT INTO consultations (
                id, appointment_id, patient_id, doctor_id, vitals, symptoms,
                diagnosis, icd_code, notes, prescriptions, lab_requests, status,
                prescription_submitted, lab_request_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                id,
                record.appointment_id,
                record.patient_id,
                record.doctor_id,
                serde_json::to_string(&record.vitals)?,
                record.symptoms,
                record.diagnosis,
                record.icd_code,
                record.notes,
                serde_json::to_string(&record.prescriptions)?,
                serde_json::to_string(&record.lab_requests)?,
                record.status.as_str(),
                record.prescription_submitted,
                record.active_lab_request_id,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Overwrite the editable fields of a non-completed consultation.
    ///
    /// Status and active lab request are left alone, and the
    /// prescription-submitted flag only ever moves from false to true.
    pub fn update_consultation_fields(&self, record: &ConsultationRecord) -> DbResult<bool> {
        let id = record
            .id
            .as_deref()
            .ok_or_else(|| DbError::Constraint("consultation has no id".into()))?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE consultations SET
                vitals = ?2,
                symptoms = ?3,
                diagnosis = ?4,
                icd_code = ?5,
                notes = ?6,
                prescriptions = ?7,
                lab_requests = ?8,
                prescription_submitted = MAX(prescription_submitted, ?9),
                updated_at = ?10
            WHERE id = ?1 AND status != 'COMPLETED'
            "#,
            params![
                id,
                serde_json::to_string(&record.vitals)?,
                record.symptoms,
                record.diagnosis,
                record.icd_code,
                record.notes,
                serde_json::to_string(&record.prescriptions)?,
                serde_json::to_string(&record.lab_requests)?,
                record.prescription_submitted,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Set status and active lab request id together.
    pub fn set_consultation_status(
        &self,
        id: &str,
        status: ConsultationStatus,
        lab_request_id: Option<&str>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE consultations SET status = ?2, lab_request_id = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, status.as_str(), lab_request_id, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a consultation by ID.
    pub fn get_consultation(&self, id: &str) -> DbResult<Option<ConsultationRecord>> {
        let sql = format!("SELECT {} FROM consultations WHERE id = ?", CONSULTATION_COLUMNS);
        self.conn
            .query_row(&sql, [id], read_consultation_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get the consultation for an appointment.
    pub fn get_consultation_by_appointment(
        &self,
        appointment_id: &str,
    ) -> DbResult<Option<ConsultationRecord>> {
        let sql = format!(
            "SELECT {} FROM consultations WHERE appointment_id = ?",
            CONSULTATION_COLUMNS
        );
        self.conn
            .query_row(&sql, [appointment_id], read_consultation_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// A doctor's non-completed consultations, most recently updated first.
    pub fn list_ongoing_consultations(&self, doctor_id: &str) -> DbResult<Vec<OngoingConsultation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, appointment_id, patient_id, status, updated_at
            FROM consultations
            WHERE doctor_id = ? AND status != 'COMPLETED'
            ORDER BY updated_at DESC
            "#,
        )?;

        let rows = stmt.query_map([doctor_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut ongoing = Vec::new();
        for row in rows {
            let (id, appointment_id, patient_id, status, updated_at) = row?;
            ongoing.push(OngoingConsultation {
                id,
                appointment_id,
                patient_id,
                status: string_to_status(&status)?,
                updated_at,
            });
        }
        Ok(ongoing)
    }

    /// A patient's completed consultations, newest first.
    pub fn list_completed_consultations(
        &self,
        patient_id: &str,
        limit: usize,
    ) -> DbResult<Vec<PastConsultation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, symptoms, diagnosis, icd_code, notes, prescriptions, updated_at
            FROM consultations
            WHERE patient_id = ? AND status = 'COMPLETED'
            ORDER BY updated_at DESC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![patient_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut past = Vec::new();
        for row in rows {
            let (id, symptoms, diagnosis, icd_code, notes, prescriptions, date) = row?;
            let prescriptions: Vec<Prescription> = serde_json::from_str(&prescriptions)?;
            past.push(PastConsultation {
                id,
                symptoms,
                diagnosis,
                icd_code,
                notes,
                prescriptions,
                date,
            });
        }
        Ok(past)
    }
}

fn read_consultation_row(row: &Row<'_>) -> rusqlite::Result<ConsultationRow> {
    Ok(ConsultationRow {
        id: row.get(0)?,
        appointment_id: row.get(1)?,
        patient_id: row.get(2)?,
        doctor_id: row.get(3)?,
        vitals: row.get(4)?,
        symptoms: row.get(5)?,
        diagnosis: row.get(6)?,
        icd_code: row.get(7)?,
        notes: row.get(8)?,
        prescriptions: row.get(9)?,
        lab_requests: row.get(10)?,
        status: row.get(11)?,
        prescription_submitted: row.get(12)?,
        lab_request_id: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

/// Intermediate row struct for database mapping.
struct ConsultationRow {
    id: String,
    appointment_id: String,
    patient_id: String,
    doctor_id: String,
    vitals: String,
    symptoms: String,
    diagnosis: String,
    icd_code: String,
    notes: String,
    prescriptions: String,
    lab_requests: String,
    status: String,
    prescription_submitted: bool,
    lab_request_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ConsultationRow> for ConsultationRecord {
    type Error = DbError;

    fn try_from(row: ConsultationRow) -> Result<Self, Self::Error> {
        let vitals: Vitals = serde_json::from_str(&row.vitals)?;
        let prescriptions: Vec<Prescription> = serde_json::from_str(&row.prescriptions)?;
        let lab_requests: Vec<LabRequest> = serde_json::from_str(&row.lab_requests)?;
        let status = string_to_status(&row.status)?;

        Ok(ConsultationRecord {
            id: Some(row.id),
            appointment_id: row.appointment_id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            vitals,
            symptoms: row.symptoms,
            diagnosis: row.diagnosis,
            icd_code: row.icd_code,
            notes: row.notes,
            prescriptions,
            lab_requests,
            status,
            prescription_submitted: row.prescription_submitted,
            active_lab_request_id: row.lab_request_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn string_to_status(s: &str) -> Result<ConsultationStatus, DbError> {
    ConsultationStatus::ALL
        .into_iter()
        .find(|status| status.as_str() == s)
        .ok_or_else(|| DbError::Constraint(format!("Unknown consultation status: {}", s)))
}
