//! Available lab tests with fuzzy "did you mean" lookup.

use strsim::{jaro_winkler, normalized_levenshtein};

use crate::models::{LabRequest, LabTest};

/// Minimum combined similarity for a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.7;

/// A lab request naming a test the catalog does not offer.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownLabTest {
    pub name: String,
    pub suggestion: Option<String>,
}

/// Catalog of tests the lab offers.
#[derive(Debug, Clone, Default)]
pub struct LabCatalog {
    tests: Vec<LabTest>,
}

impl LabCatalog {
    pub fn new(tests: Vec<LabTest>) -> Self {
        Self { tests }
    }

    pub fn tests(&self) -> &[LabTest] {
        &self.tests
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Exact (case-insensitive) lookup by name or code.
    pub fn find(&self, name: &str) -> Option<&LabTest> {
        self.tests.iter().find(|test| test.matches(name))
    }

    /// Closest test by name or code, if any is similar enough.
    pub fn suggest(&self, name: &str) -> Option<&LabTest> {
        let query = name.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }

        self.tests
            .iter()
            .map(|test| {
                let by_name = fuzzy_match(&query, &test.test_name.to_lowercase());
                let by_code = test
                    .test_code
                    .as_deref()
                    .map(|code| fuzzy_match(&query, &code.to_lowercase()))
                    .unwrap_or(0.0);
                (test, by_name.max(by_code))
            })
            .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(test, _)| test)
    }

    /// First request whose test is not in the catalog.
    ///
    /// An empty catalog accepts everything.
    pub fn check_requests(&self, requests: &[LabRequest]) -> Result<(), UnknownLabTest> {
        if self.is_empty() {
            return Ok(());
        }
        for request in requests {
            if self.find(&request.test_name).is_none() {
                return Err(UnknownLabTest {
                    name: request.test_name.clone(),
                    suggestion: self.suggest(&request.test_name).map(|t| t.test_name.clone()),
                });
            }
        }
        Ok(())
    }

    /// Adopt the catalog spelling, and its test type where the request has none.
    pub fn complete_request(&self, request: &mut LabRequest) {
        if let Some(test) = self.find(&request.test_name) {
            request.test_name = test.test_name.clone();
            if request.test_type.is_none() {
                request.test_type = Some(test.test_type.clone());
            }
        }
    }
}

/// Jaro-Winkler catches typos and prefixes; Levenshtein overall shape.
fn fuzzy_match(a: &str, b: &str) -> f64 {
    jaro_winkler(a, b) * 0.6 + normalized_levenshtein(a, b) * 0.4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> LabCatalog {
        let mut cbc = LabTest::new("Complete Blood Count", "blood");
        cbc.test_code = Some("CBC".into());
        let mut lipid = LabTest::new("Lipid Panel", "blood");
        lipid.test_code = Some("LIPID".into());
        LabCatalog::new(vec![cbc, lipid, LabTest::new("Urinalysis", "urine")])
    }

    #[test]
    fn test_find_by_name_or_code() {
        let catalog = catalog();
        assert_eq!(catalog.find("cbc").unwrap().test_name, "Complete Blood Count");
        assert!(catalog.find("Thyroid Panel").is_none());
    }

    #[test]
    fn test_suggest_typo() {
        let catalog = catalog();
        assert_eq!(catalog.suggest("Lipid Panl").unwrap().test_name, "Lipid Panel");
        assert_eq!(catalog.suggest("urinalisys").unwrap().test_name, "Urinalysis");
        assert!(catalog.suggest("xyz").is_none());
    }

    #[test]
    fn test_check_requests_reports_unknown_with_suggestion() {
        let catalog = catalog();
        let requests = vec![LabRequest::new("CBC"), LabRequest::new("Lipid Panl")];

        let err = catalog.check_requests(&requests).unwrap_err();
        assert_eq!(err.name, "Lipid Panl");
        assert_eq!(err.suggestion.as_deref(), Some("Lipid Panel"));
    }

    #[test]
    fn test_empty_catalog_accepts_anything() {
        let catalog = LabCatalog::default();
        assert!(catalog.check_requests(&[LabRequest::new("Anything")]).is_ok());
    }

    #[test]
    fn test_complete_request_fills_type() {
        let catalog = catalog();
        let mut request = LabRequest::new("urinalysis");
        catalog.complete_request(&mut request);
        assert_eq!(request.test_name, "Urinalysis");
        assert_eq!(request.test_type.as_deref(), Some("urine"));

        let mut request = LabRequest::new("cbc");
        request.test_type = Some("serum".into());
        catalog.complete_request(&mut request);
        assert_eq!(request.test_name, "Complete Blood Count");
        assert_eq!(request.test_type.as_deref(), Some("serum"));
    }
}
