//! Appointment references.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};
use crate::models::AppointmentRef;

impl Database {
    /// Insert or replace an appointment reference.
    pub fn upsert_appointment(&self, appointment: &AppointmentRef) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO appointments (appointment_id, patient_id, doctor_id)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(appointment_id) DO UPDATE SET
                patient_id = excluded.patient_id,
                doctor_id = excluded.doctor_id
            "#,
            params![
                appointment.appointment_id,
                appointment.patient_id,
                appointment.doctor_id,
            ],
        )?;
        Ok(())
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, appointment_id: &str) -> DbResult<Option<AppointmentRef>> {
        Ok(self
            .conn
            .query_row(
                "SELECT appointment_id, patient_id, doctor_id FROM appointments WHERE appointment_id = ?",
                [appointment_id],
                |row| {
                    Ok(AppointmentRef {
                        appointment_id: row.get(0)?,
                        patient_id: row.get(1)?,
                        doctor_id: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }
}
