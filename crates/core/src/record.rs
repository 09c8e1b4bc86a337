//! Structured case data produced by the result parser.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fully parsed case record.
///
/// Only the result parser builds these; cached results store them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub case_type: String,
    pub case_number: u32,
    pub filing_year: i32,
    /// Parties in page order.
    pub parties: Vec<Party>,
    pub status: String,
    pub judge: Option<String>,
    pub filing_date: Option<CaseDate>,
    pub next_hearing_date: Option<CaseDate>,
    /// Hearing history in page order.
    pub history: Vec<HistoryEntry>,
    /// Document links in page order, unique by URL.
    pub documents: Vec<Document>,
}

impl ParsedRecord {
    pub fn parties_with_role(&self, role: PartyRole) -> impl Iterator<Item = &Party> {
        self.parties.iter().filter(move |p| p.role == role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub role: PartyRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Petitioner,
    Respondent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: CaseDate,
    pub purpose: String,
    pub outcome: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub label: String,
    pub url: String,
    pub kind: DocumentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Order,
    Judgment,
    Notice,
    Petition,
    Application,
    Document,
}

impl DocumentKind {
    /// Classify a document from its link text.
    pub fn classify(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("order") {
            DocumentKind::Order
        } else if text.contains("judgment") || text.contains("judgement") {
            DocumentKind::Judgment
        } else if text.contains("notice") {
            DocumentKind::Notice
        } else if text.contains("petition") {
            DocumentKind::Petition
        } else if text.contains("application") {
            DocumentKind::Application
        } else {
            DocumentKind::Document
        }
    }
}

/// A calendar date as published by the portal.
///
/// Dates the parser recognizes are stored as `Date`; anything else is kept
/// verbatim as `Unparsed` so no published value is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CaseDate {
    Date(NaiveDate),
    Unparsed(String),
}

impl CaseDate {
    pub fn is_normalized(&self) -> bool {
        matches!(self, CaseDate::Date(_))
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CaseDate::Date(d) => Some(*d),
            CaseDate::Unparsed(_) => None,
        }
    }
}

impl fmt::Display for CaseDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseDate::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CaseDate::Unparsed(raw) => f.write_str(raw),
        }
    }
}
