//! Case queries and their cache fingerprints.

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;
use crate::cache::hash::compute_fingerprint;

/// Earliest filing year accepted by the portal search form.
pub const MIN_FILING_YEAR: i32 = 1950;

/// A validated case lookup: case type, case number and filing year.
///
/// Fields are normalized on construction and cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    case_type: String,
    case_number: u32,
    filing_year: i32,
}

impl Query {
    /// Build a query, validating the filing year against the current year.
    pub fn new(case_type: impl AsRef<str>, case_number: u32, filing_year: i32) -> Result<Self, Error> {
        Self::new_in_year(case_type, case_number, filing_year, Utc::now().year())
    }

    /// Build a query with an explicit upper bound for the filing year.
    pub fn new_in_year(
        case_type: impl AsRef<str>, case_number: u32, filing_year: i32, current_year: i32,
    ) -> Result<Self, Error> {
        let case_type = normalize_case_type(case_type.as_ref());
        if case_type.is_empty() {
            return Err(Error::InvalidQuery("case type is required".into()));
        }
        if case_number == 0 {
            return Err(Error::InvalidQuery("case number must be a positive integer".into()));
        }
        if !(MIN_FILING_YEAR..=current_year).contains(&filing_year) {
            return Err(Error::InvalidQuery(format!(
                "filing year must be between {MIN_FILING_YEAR} and {current_year}"
            )));
        }

        Ok(Self { case_type, case_number, filing_year })
    }

    /// Build a query from raw form text.
    pub fn parse(case_type: &str, case_number: &str, filing_year: &str) -> Result<Self, Error> {
        let number = case_number.trim();
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidQuery("case number must be numeric".into()));
        }
        let case_number: u32 = number
            .parse()
            .map_err(|_| Error::InvalidQuery(format!("case number out of range: {number}")))?;

        let filing_year: i32 = filing_year
            .trim()
            .parse()
            .map_err(|_| Error::InvalidQuery(format!("invalid filing year: {}", filing_year.trim())))?;

        Self::new(case_type, case_number, filing_year)
    }

    pub fn case_type(&self) -> &str {
        &self.case_type
    }

    pub fn case_number(&self) -> u32 {
        self.case_number
    }

    pub fn filing_year(&self) -> i32 {
        self.filing_year
    }

    /// The cache key for this query.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(compute_fingerprint(&self.case_type, self.case_number, self.filing_year))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.case_type, self.case_number, self.filing_year)
    }
}

/// Collapse runs of whitespace and trim the ends.
pub fn normalize_case_type(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable cache key derived from a query's normalized fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Accept a previously issued fingerprint (64 lowercase hex characters).
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let hex = hex.trim();
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(Error::InvalidInput(format!("invalid fingerprint: {hex}")));
        }
        Ok(Self(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let q = Query::new_in_year("Writ Petition", 1234, 2022, 2025).unwrap();
        assert_eq!(q.fingerprint(), q.fingerprint());
        assert_eq!(q.fingerprint(), q.clone().fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_whitespace_and_case() {
        let a = Query::new_in_year("Writ Petition", 1234, 2022, 2025).unwrap();
        let b = Query::new_in_year("  writ   PETITION ", 1234, 2022, 2025).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_fields() {
        let base = Query::new_in_year("Writ Petition", 1234, 2022, 2025).unwrap();
        let other_number = Query::new_in_year("Writ Petition", 1235, 2022, 2025).unwrap();
        let other_year = Query::new_in_year("Writ Petition", 1234, 2021, 2025).unwrap();
        let other_type = Query::new_in_year("Civil Appeal", 1234, 2022, 2025).unwrap();
        assert_ne!(base.fingerprint(), other_number.fingerprint());
        assert_ne!(base.fingerprint(), other_year.fingerprint());
        assert_ne!(base.fingerprint(), other_type.fingerprint());
    }

    #[test]
    fn test_parse_normalizes_text_fields() {
        let parsed = Query::parse(" Civil Appeal ", " 0042 ", " 2020 ").unwrap();
        assert_eq!(parsed.case_type(), "Civil Appeal");
        assert_eq!(parsed.case_number(), 42);
        assert_eq!(parsed.filing_year(), 2020);
    }

    #[test]
    fn test_parse_rejects_non_numeric_case_number() {
        assert!(matches!(Query::parse("Civil Appeal", "12a", "2020"), Err(Error::InvalidQuery(_))));
        assert!(matches!(Query::parse("Civil Appeal", "-1", "2020"), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_rejects_out_of_range_year() {
        assert!(Query::new_in_year("Civil Appeal", 1, 1949, 2025).is_err());
        assert!(Query::new_in_year("Civil Appeal", 1, 2026, 2025).is_err());
        assert!(Query::new_in_year("Civil Appeal", 1, 1950, 2025).is_ok());
        assert!(Query::new_in_year("Civil Appeal", 1, 2025, 2025).is_ok());
    }

    #[test]
    fn test_rejects_empty_case_type_and_zero_number() {
        assert!(Query::new_in_year("   ", 1, 2020, 2025).is_err());
        assert!(Query::new_in_year("Civil Appeal", 0, 2020, 2025).is_err());
    }

    #[test]
    fn test_fingerprint_from_hex() {
        let fp = Query::new_in_year("Civil Appeal", 7, 2020, 2025).unwrap().fingerprint();
        assert_eq!(Fingerprint::from_hex(fp.as_str()).unwrap(), fp);
        assert!(Fingerprint::from_hex("not-a-hash").is_err());
    }
}
