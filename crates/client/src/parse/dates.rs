//! Date normalization for portal text.

use chrono::NaiveDate;
use courtfetch_core::CaseDate;

/// Formats seen on the portal, tried in order. `%b` takes only the
/// three-letter month; `%B` takes the full name.
const DATE_FORMATS: &[&str] = &[
    "%d-%b-%Y",
    "%d-%B-%Y",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y-%m-%d",
    "%d %b %Y",
    "%d %B %Y",
    "%B %d, %Y",
];

/// Normalize portal date text. Anything unrecognized is kept verbatim.
pub fn normalize_date(raw: &str) -> CaseDate {
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
        .map(CaseDate::Date)
        .unwrap_or(CaseDate::Unparsed(text))
}
