//! Lab test catalog entries and lab request status.

use serde::{Deserialize, Serialize};

/// A test offered by the laboratory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabTest {
    /// Display name, e.g. "Complete Blood Count"
    pub test_name: String,
    /// Short code, e.g. "CBC"
    #[serde(default)]
    pub test_code: Option<String>,
    /// Specimen type, e.g. "blood", "urine"
    #[serde(default = "default_test_type")]
    pub test_type: String,
    /// Grouping for display, e.g. "Hematology"
    #[serde(default)]
    pub category: Option<String>,
}

fn default_test_type() -> String {
    "blood".to_string()
}

impl LabTest {
    pub fn new(test_name: impl Into<String>, test_type: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            test_code: None,
            test_type: test_type.into(),
            category: None,
        }
    }

    /// Case-insensitive match on name or code.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim();
        self.test_name.eq_ignore_ascii_case(name)
            || self
                .test_code
                .as_deref()
                .is_some_and(|code| code.eq_ignore_ascii_case(name))
    }
}

/// Status reported by the lab for a dispatched request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabRequestStatus {
    /// Accepted by the lab, not started
    #[serde(alias = "pending")]
    Requested,
    /// Specimen being processed
    InProgress,
    /// Results available
    Completed,
}

impl LabRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabRequestStatus::Requested => "requested",
            LabRequestStatus::InProgress => "in_progress",
            LabRequestStatus::Completed => "completed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, LabRequestStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_name_or_code() {
        let mut test = LabTest::new("Complete Blood Count", "blood");
        test.test_code = Some("CBC".into());

        assert!(test.matches("complete blood count"));
        assert!(test.matches(" cbc "));
        assert!(!test.matches("Lipid Panel"));
    }

    #[test]
    fn test_status_accepts_pending_alias() {
        let status: LabRequestStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(status, LabRequestStatus::Requested);

        let status: LabRequestStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert!(!status.is_completed());

        let status: LabRequestStatus = serde_json::from_str("\"completed\"").unwrap();
        assert!(status.is_completed());
    }

    #[test]
    fn test_test_type_defaults_to_blood() {
        let test: LabTest = serde_json::from_str(r#"{"test_name":"Glucose"}"#).unwrap();
        assert_eq!(test.test_type, "blood");
    }
}
