//! Hearing history tables.

use courtfetch_core::HistoryEntry;
use scraper::{ElementRef, Html, Selector};

use super::dates::normalize_date;
use super::fields::{cell_text, is_placeholder};

const PURPOSE_HEADERS: &[&str] = &["purpose", "proceeding", "business", "stage", "particular"];
const OUTCOME_HEADERS: &[&str] = &["outcome", "order", "result", "remark", "action", "disposal"];

/// Column positions resolved from a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    date: usize,
    purpose: usize,
    outcome: Option<usize>,
}

/// A header names a date column and at least one purpose or outcome
/// column. A cell that is itself a date marks a label/value row instead.
fn header_columns(headers: &[String]) -> Option<Columns> {
    if headers.len() < 2 || headers.iter().any(|h| normalize_date(h).is_normalized()) {
        return None;
    }
    let find = |words: &[&str]| headers.iter().position(|h| words.iter().any(|w| h.contains(w)));
    let date = headers.iter().position(|h| h.contains("date"))?;
    let named_purpose = find(PURPOSE_HEADERS).filter(|&i| i != date);
    let named_outcome = find(OUTCOME_HEADERS).filter(|&i| i != date);
    if named_purpose.is_none() && named_outcome.is_none() {
        return None;
    }
    let purpose = named_purpose.unwrap_or(if date == 0 { 1 } else { 0 });
    let outcome = named_outcome.filter(|&i| i != purpose);
    Some(Columns { date, purpose, outcome })
}

/// The hearing history table and its entries, in source row order.
///
/// A history table starts with a header row, in `<th>` or `<td>` cells,
/// naming a date column. The first such table wins.
pub fn extract_history<'a>(document: &'a Html) -> Option<(ElementRef<'a>, Vec<HistoryEntry>)> {
    let tables = Selector::parse("table").expect("invalid selector");
    let rows = Selector::parse("tr").expect("invalid selector");
    let cells = Selector::parse("td, th").expect("invalid selector");

    for table in document.select(&tables) {
        let mut table_rows = table.select(&rows);
        let Some(header) = table_rows.next() else {
            continue;
        };

        let headers: Vec<String> = header.select(&cells).map(|c| cell_text(c).to_lowercase()).collect();
        let Some(columns) = header_columns(&headers) else {
            continue;
        };

        let entries = table_rows
            .filter_map(|row| {
                let values: Vec<String> = row.select(&cells).map(cell_text).collect();
                let date = values.get(columns.date)?;
                let purpose = values.get(columns.purpose)?;
                if is_placeholder(date) || is_placeholder(purpose) {
                    return None;
                }
                let outcome = columns
                    .outcome
                    .and_then(|i| values.get(i))
                    .filter(|v| !is_placeholder(v))
                    .cloned()
                    .unwrap_or_default();
                Some(HistoryEntry { date: normalize_date(date), purpose: purpose.clone(), outcome })
            })
            .collect();

        return Some((table, entries));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtfetch_core::CaseDate;

    #[test]
    fn test_header_columns() {
        let headers = vec!["s.no".to_string(), "date".into(), "business".into(), "order".into()];
        assert_eq!(header_columns(&headers), Some(Columns { date: 1, purpose: 2, outcome: Some(3) }));

        let plain = vec!["hearing date".to_string(), "proceedings".into()];
        assert_eq!(header_columns(&plain), Some(Columns { date: 0, purpose: 1, outcome: None }));

        assert_eq!(header_columns(&["judge".to_string(), "court".into()]), None);
        assert_eq!(header_columns(&["next date".to_string(), "to be listed".into()]), None);
    }

    #[test]
    fn test_header_row_of_td_cells() {
        let html = Html::parse_document(
            r#"<table>
                <tr><td>Date</td><td>Purpose</td><td>Order</td></tr>
                <tr><td>10-02-2023</td><td>Admission</td><td>Notice issued</td></tr>
                <tr><td>05-06-2023</td><td>Hearing</td><td>Adjourned</td></tr>
            </table>"#,
        );
        let (_, entries) = extract_history(&html).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].purpose, "Admission");
        assert_eq!(entries[1].outcome, "Adjourned");
        assert_eq!(entries[0].date, CaseDate::Date(chrono::NaiveDate::from_ymd_opt(2023, 2, 10).unwrap()));
    }

    #[test]
    fn test_rows_keep_source_order() {
        let html = Html::parse_document(
            r#"<table>
                <tr><th>Date</th><th>Purpose</th><th>Outcome</th></tr>
                <tr><td>01-08-2025</td><td>Arguments</td><td>Reserved</td></tr>
                <tr><td>15-01-2022</td><td>Filed</td><td>-</td></tr>
                <tr><td>soon</td><td>Mention</td><td>Adjourned</td></tr>
                <tr><td>-</td><td>-</td><td>-</td></tr>
            </table>"#,
        );
        let (_, entries) = extract_history(&html).unwrap();
        let purposes: Vec<&str> = entries.iter().map(|e| e.purpose.as_str()).collect();
        assert_eq!(purposes, vec!["Arguments", "Filed", "Mention"]);
        assert_eq!(entries[1].outcome, "");
        assert_eq!(entries[2].date, CaseDate::Unparsed("soon".into()));
    }

    #[test]
    fn test_label_value_tables_are_not_history() {
        let html = Html::parse_document(
            r#"<table><tr><th>Date of Filing</th><td>15-01-2022</td></tr></table>"#,
        );
        assert!(extract_history(&html).is_none());

        let details = Html::parse_document(
            r#"<table>
                <tr><td>Next Date</td><td>To be listed</td></tr>
                <tr><td>Status</td><td>Pending</td></tr>
            </table>"#,
        );
        assert!(extract_history(&details).is_none());
    }
}
