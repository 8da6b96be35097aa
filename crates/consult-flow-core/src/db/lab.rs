//! Lab catalog and dispatched lab request operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{ConsultationStatus, LabRequest, LabRequestStatus, LabResult, LabTest};

impl Database {
    /// Add or update a catalog test.
    pub fn upsert_lab_test(&self, test: &LabTest) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO lab_tests (test_name, test_code, test_type, category, active)
            VALUES (?1, ?2, ?3, ?4, 1)
            ON CONFLICT(test_name) DO UPDATE SET
                test_code = excluded.test_code,
                test_type = excluded.test_type,
                category = excluded.category,
                active = 1
            "#,
            params![test.test_name, test.test_code, test.test_type, test.category],
        )?;
        Ok(())
    }

    /// Hide a test from the catalog without deleting history.
    pub fn deactivate_lab_test(&self, test_name: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("UPDATE lab_tests SET active = 0 WHERE test_name = ?", [test_name])?;
        Ok(rows_affected > 0)
    }

    /// Active catalog tests, grouped by category.
    pub fn list_lab_tests(&self) -> DbResult<Vec<LabTest>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT test_name, test_code, test_type, category
            FROM lab_tests
            WHERE active = 1
            ORDER BY category, test_name
            "#,
        )?;

        let tests = stmt
            .query_map([], |row| {
                Ok(LabTest {
                    test_name: row.get(0)?,
                    test_code: row.get(1)?,
                    test_type: row.get(2)?,
                    category: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tests)
    }

    /// Record one row per named request and put the consultation into the
    /// waiting state. Returns the id of the first request, which is the one
    /// polled for completion.
    pub fn dispatch_lab_requests(
        &mut self,
        consultation_id: &str,
        requests: &[LabRequest],
    ) -> DbResult<String> {
        let named: Vec<&LabRequest> = requests.iter().filter(|r| r.has_test_name()).collect();
        if named.is_empty() {
            return Err(DbError::Constraint("no named lab requests".into()));
        }

        let tx = self.transaction()?;

        let status: String = tx
            .query_row(
                "SELECT status FROM consultations WHERE id = ?",
                [consultation_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("consultation {}", consultation_id)))?;
        if status != ConsultationStatus::Draft.as_str() {
            return Err(DbError::Constraint(format!(
                "cannot send lab requests for consultation in status {}",
                status
            )));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let mut ids = Vec::with_capacity(named.len());
        for request in &named {
            let id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                r#"
                INSERT INTO lab_requests (
                    id, consultation_id, test_name, test_type, urgency,
                    instructions, status, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'requested', ?7)
                "#,
                params![
                    id,
                    consultation_id,
                    request.test_name.trim(),
                    request.test_type.as_deref().unwrap_or("blood"),
                    request.urgency.as_str(),
                    request.instructions,
                    now,
                ],
            )?;
            ids.push(id);
        }

        let active_id = ids.swap_remove(0);
        tx.execute(
            r#"
            UPDATE consultations SET
                status = ?2,
                lab_request_id = ?3,
                lab_requests = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
            params![
                consultation_id,
                ConsultationStatus::WaitingForLabResults.as_str(),
                active_id,
                serde_json::to_string(&named)?,
                now,
            ],
        )?;

        tx.commit()?;
        Ok(active_id)
    }

    /// Current status of a dispatched request.
    pub fn get_lab_request_status(&self, id: &str) -> DbResult<Option<LabRequestStatus>> {
        let status: Option<String> = self
            .conn
            .query_row("SELECT status FROM lab_requests WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()?;
        status.map(|s| string_to_lab_status(&s)).transpose()
    }

    /// Lab marks a request as being processed.
    pub fn mark_lab_request_in_progress(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE lab_requests SET status = 'in_progress' WHERE id = ? AND status = 'requested'",
            [id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Lab reports a result. If this was the consultation's active request the
    /// consultation moves to READY_FOR_REVIEW.
    pub fn complete_lab_request(&mut self, id: &str, result: Option<&str>) -> DbResult<bool> {
        let tx = self.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();

        let consultation_id: Option<String> = tx
            .query_row(
                "SELECT consultation_id FROM lab_requests WHERE id = ?",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        let consultation_id = match consultation_id {
            Some(consultation_id) => consultation_id,
            None => return Ok(false),
        };

        tx.execute(
            r#"
            UPDATE lab_requests SET status = 'completed', result = ?2, completed_at = ?3
            WHERE id = ?1
            "#,
            params![id, result, now],
        )?;

        tx.execute(
            r#"
            UPDATE consultations SET status = ?3, lab_request_id = NULL, updated_at = ?4
            WHERE id = ?1 AND lab_request_id = ?2 AND status = ?5
            "#,
            params![
                consultation_id,
                id,
                ConsultationStatus::ReadyForReview.as_str(),
                now,
                ConsultationStatus::WaitingForLabResults.as_str(),
            ],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// A patient's completed lab requests, newest first.
    pub fn list_lab_results(&self, patient_id: &str, limit: usize) -> DbResult<Vec<LabResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT r.id, r.test_name, r.test_type, r.status, r.result, r.completed_at
            FROM lab_requests r
            JOIN consultations c ON c.id = r.consultation_id
            WHERE c.patient_id = ? AND r.status = 'completed'
            ORDER BY r.completed_at DESC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![patient_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (lab_request_id, test_name, test_type, status, result, completed_at) = row?;
            results.push(LabResult {
                lab_request_id,
                test_name,
                test_type,
                status: string_to_lab_status(&status)?,
                result,
                completed_at,
            });
        }
        Ok(results)
    }
}

fn string_to_lab_status(s: &str) -> Result<LabRequestStatus, DbError> {
    match s {
        "requested" => Ok(LabRequestStatus::Requested),
        "in_progress" => Ok(LabRequestStatus::InProgress),
        "completed" => Ok(LabRequestStatus::Completed),
        _ => Err(DbError::Constraint(format!("Unknown lab request status: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentRef, ConsultationRecord};

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_appointment(&AppointmentRef::new("apt-1", "pat-1", "doc-1"))
            .unwrap();
        let mut record = ConsultationRecord::new("apt-1", "pat-1", "doc-1");
        record.id = Some("c-1".into());
        db.insert_consultation(&record).unwrap();
        db
    }

    #[test]
    fn test_catalog_upsert_and_deactivate() {
        let db = setup_db();
        let mut cbc = LabTest::new("Complete Blood Count", "blood");
        cbc.category = Some("Hematology".into());
        db.upsert_lab_test(&cbc).unwrap();
        db.upsert_lab_test(&LabTest::new("Urinalysis", "urine")).unwrap();

        assert_eq!(db.list_lab_tests().unwrap().len(), 2);

        assert!(db.deactivate_lab_test("Urinalysis").unwrap());
        let tests = db.list_lab_tests().unwrap();
        assert_eq!(tests, vec![cbc]);
    }

    #[test]
    fn test_dispatch_sets_waiting_with_first_id() {
        let mut db = setup_db();
        let requests = vec![
            LabRequest::new("CBC"),
            LabRequest::new(""),
            LabRequest::new("Lipid Panel"),
        ];

        let active = db.dispatch_lab_requests("c-1", &requests).unwrap();
        let record = db.get_consultation("c-1").unwrap().unwrap();
        assert_eq!(record.status, ConsultationStatus::WaitingForLabResults);
        assert_eq!(record.active_lab_request_id.as_deref(), Some(active.as_str()));
        assert_eq!(record.lab_requests.len(), 2);
        assert_eq!(
            db.get_lab_request_status(&active).unwrap(),
            Some(LabRequestStatus::Requested)
        );
    }

    #[test]
    fn test_dispatch_twice_is_rejected() {
        let mut db = setup_db();
        db.dispatch_lab_requests("c-1", &[LabRequest::new("CBC")]).unwrap();
        let err = db
            .dispatch_lab_requests("c-1", &[LabRequest::new("CBC")])
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[test]
    fn test_dispatch_unknown_consultation() {
        let mut db = setup_db();
        let err = db
            .dispatch_lab_requests("missing", &[LabRequest::new("CBC")])
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn test_complete_active_request_moves_to_review() {
        let mut db = setup_db();
        let active = db.dispatch_lab_requests("c-1", &[LabRequest::new("CBC")]).unwrap();

        assert!(db.mark_lab_request_in_progress(&active).unwrap());
        assert!(db.complete_lab_request(&active, Some("WBC 6.1")).unwrap());

        let record = db.get_consultation("c-1").unwrap().unwrap();
        assert_eq!(record.status, ConsultationStatus::ReadyForReview);
        assert!(record.active_lab_request_id.is_none());

        let results = db.list_lab_results("pat-1", 20).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result.as_deref(), Some("WBC 6.1"));
    }

    #[test]
    fn test_complete_unknown_request() {
        let mut db = setup_db();
        assert!(!db.complete_lab_request("nope", None).unwrap());
        assert_eq!(db.get_lab_request_status("nope").unwrap(), None);
    }
}
