//! SQLite schema definition.

/// Complete database schema for the local consultation store.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Appointments (copied from the scheduling system)
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    appointment_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    doctor_id TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Consultations
-- ============================================================================

CREATE TABLE IF NOT EXISTS consultations (
    id TEXT PRIMARY KEY,
    appointment_id TEXT NOT NULL UNIQUE REFERENCES appointments(appointment_id),
    patient_id TEXT NOT NULL,
    doctor_id TEXT NOT NULL,
    vitals TEXT NOT NULL DEFAULT '{}',            -- JSON object
    symptoms TEXT NOT NULL DEFAULT '',
    diagnosis TEXT NOT NULL DEFAULT '',
    icd_code TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    prescriptions TEXT NOT NULL DEFAULT '[]',     -- JSON array
    lab_requests TEXT NOT NULL DEFAULT '[]',      -- JSON array of requested rows
    status TEXT NOT NULL DEFAULT 'DRAFT'
        CHECK (status IN ('DRAFT', 'WAITING_FOR_LAB_RESULTS', 'READY_FOR_REVIEW', 'COMPLETED')),
    prescription_submitted INTEGER NOT NULL DEFAULT 0,
    lab_request_id TEXT,                          -- active lab request while waiting
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_consultations_doctor ON consultations(doctor_id, status);
CREATE INDEX IF NOT EXISTS idx_consultations_patient ON consultations(patient_id, status);

-- ============================================================================
-- Lab Test Catalog
-- ============================================================================

CREATE TABLE IF NOT EXISTS lab_tests (
    test_name TEXT PRIMARY KEY,
    test_code TEXT,
    test_type TEXT NOT NULL DEFAULT 'blood',
    category TEXT,
    active INTEGER NOT NULL DEFAULT 1
);

-- ============================================================================
-- Dispatched Lab Requests
-- ============================================================================

CREATE TABLE IF NOT EXISTS lab_requests (
    id TEXT PRIMARY KEY,
    consultation_id TEXT NOT NULL REFERENCES consultations(id),
    test_name TEXT NOT NULL,
    test_type TEXT,
    urgency TEXT NOT NULL DEFAULT 'normal',
    instructions TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'requested'
        CHECK (status IN ('requested', 'in_progress', 'completed')),
    result TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_lab_requests_consultation ON lab_requests(consultation_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_applies_twice() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
    }

    #[test]
    fn test_status_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO appointments (appointment_id, patient_id, doctor_id) VALUES ('a', 'p', 'd')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO consultations (id, appointment_id, patient_id, doctor_id, status, created_at, updated_at)
             VALUES ('c', 'a', 'p', 'd', 'ARCHIVED', 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
