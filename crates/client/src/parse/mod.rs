//! Result Parser: case result page HTML to [`ParsedRecord`].
//!
//! Parsing is a pure function of the page text. Optional fields fall back to
//! empty values; the identity fields (case type, number, year) and the case
//! status are mandatory, and a page without them is rejected.

pub mod dates;
pub mod documents;
pub mod fields;
pub mod history;

use courtfetch_core::{AppConfig, Error, ParsedRecord, Party, PartyRole};
use scraper::Html;
use thiserror::Error;
use url::Url;

pub use dates::normalize_date;
pub use documents::extract_documents;
pub use fields::Field;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("mandatory field missing: {0}")]
    MissingField(&'static str),

    #[error("field {field} has unusable value {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// The portal answered that no such case exists.
    #[error("portal reported no records")]
    NoRecords,

    /// Nothing on the page looks like case details.
    #[error("page shape not recognized")]
    Unrecognized,
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::NoRecords => Error::CaseNotFound(err.to_string()),
            other => Error::ParseFailed(other.to_string()),
        }
    }
}

/// Parser bound to one portal's link base and "no records" wording.
#[derive(Debug, Clone)]
pub struct ResultParser {
    base_url: Url,
    no_records_text: Vec<String>,
}

impl ResultParser {
    pub fn new(base_url: Url, no_records_text: Vec<String>) -> Self {
        let no_records_text = no_records_text.into_iter().map(|t| t.to_lowercase()).collect();
        Self { base_url, no_records_text }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&config.portal_base_url)
            .map_err(|e| Error::InvalidInput(format!("portal_base_url: {e}")))?;
        Ok(Self::new(base_url, config.selectors.no_records_text.clone()))
    }

    /// Whether the page text carries a "no records" indicator.
    pub fn reports_no_records(&self, html: &str) -> bool {
        let text = Html::parse_document(html).root_element().text().collect::<String>().to_lowercase();
        self.no_records_text.iter().any(|t| text.contains(t.as_str()))
    }

    pub fn parse(&self, html: &str) -> Result<ParsedRecord, ParseError> {
        if self.reports_no_records(html) {
            return Err(ParseError::NoRecords);
        }

        let document = Html::parse_document(html);
        let history = history::extract_history(&document);
        let skip: Vec<_> = history.iter().map(|(table, _)| *table).collect();
        let harvest = fields::harvest(&document, &skip);

        if harvest.pairs_seen == 0 {
            return Err(ParseError::Unrecognized);
        }

        let case_type = harvest.text(Field::CaseType).ok_or(ParseError::MissingField("case type"))?;
        let number_text = harvest.text(Field::CaseNumber).ok_or(ParseError::MissingField("case number"))?;
        let year_text = harvest.text(Field::FilingYear).ok_or(ParseError::MissingField("filing year"))?;
        let status = harvest.text(Field::Status).ok_or(ParseError::MissingField("case status"))?;

        let case_number = leading_number(&number_text)
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .ok_or(ParseError::InvalidField { field: "case number", value: number_text.clone() })?;
        let filing_year = leading_number(&year_text)
            .and_then(|n| n.parse::<i32>().ok())
            .ok_or(ParseError::InvalidField { field: "filing year", value: year_text.clone() })?;

        let mut parties = Vec::new();
        for (field, role) in [(Field::Petitioner, PartyRole::Petitioner), (Field::Respondent, PartyRole::Respondent)] {
            parties.extend(fields::split_parties(harvest.segments(field)).into_iter().map(|name| Party { name, role }));
        }

        let record = ParsedRecord {
            case_type,
            case_number,
            filing_year,
            parties,
            status,
            judge: harvest.text(Field::Judge),
            filing_date: harvest.text(Field::FilingDate).map(|d| normalize_date(&d)),
            next_hearing_date: harvest.text(Field::NextHearing).map(|d| normalize_date(&d)),
            history: history.map(|(_, entries)| entries).unwrap_or_default(),
            documents: extract_documents(&document, &self.base_url),
        };

        tracing::debug!(
            case_number = record.case_number,
            parties = record.parties.len(),
            history = record.history.len(),
            documents = record.documents.len(),
            "parsed case page"
        );
        Ok(record)
    }
}

/// First run of ASCII digits, e.g. `"1234 / 2022"` gives `"1234"`.
fn leading_number(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    Some(&rest[..end])
}
