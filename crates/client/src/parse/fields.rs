//! Label/value harvesting from case detail regions.
//!
//! Portal pages present case facts as two-cell table rows or as
//! `Label: value` text. Labels are matched against keyword lists; the first
//! value found for a field in page order wins.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// A case fact the parser knows how to recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Petitioner,
    Respondent,
    FilingDate,
    NextHearing,
    Status,
    Judge,
    CaseType,
    CaseNumber,
    FilingYear,
}

/// Keyword lists in match priority order.
const FIELD_KEYWORDS: &[(Field, &[&str])] = &[
    (Field::Petitioner, &["petitioner", "appellant", "applicant", "plaintiff"]),
    (Field::Respondent, &["respondent", "defendant", "opposite party"]),
    (
        Field::FilingDate,
        &["filing date", "date of filing", "filed on", "date filed", "registration date", "date of registration"],
    ),
    (
        Field::NextHearing,
        &["next date", "next hearing", "next listing", "date of next hearing"],
    ),
    (Field::Status, &["status", "stage of case"]),
    (Field::Judge, &["judge", "bench", "coram", "before", "hon'ble", "justice"]),
    (Field::CaseType, &["case type", "type of case"]),
    (Field::CaseNumber, &["case no", "case number", "case num"]),
    (Field::FilingYear, &["filing year", "case year", "year"]),
];

const PLACEHOLDERS: &[&str] = &["-", "--", "na", "n/a", "nil", "not available"];

/// Elements whose own text may carry a `Label: value` pair.
const TEXT_CONTAINERS: &str = "div, span, li, p, dd";
const BLOCK_CHILDREN: &[&str] = &["div", "table", "ul", "ol", "li", "p", "tr", "form"];

static NUMBERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\s)\d{1,2}[.)]\s+").expect("invalid regex"));

/// Collected values per field, each a list of text segments in page order.
#[derive(Debug, Default)]
pub struct Harvest {
    values: HashMap<Field, Vec<String>>,
    /// Label/value pairs seen, recognized or not.
    pub pairs_seen: usize,
}

impl Harvest {
    /// Single-line value of a field.
    pub fn text(&self, field: Field) -> Option<String> {
        self.values.get(&field).map(|segments| segments.join(" "))
    }

    /// Raw text segments of a field (one per line break in the source).
    pub fn segments(&self, field: Field) -> &[String] {
        self.values.get(&field).map(Vec::as_slice).unwrap_or_default()
    }

    fn offer(&mut self, label: &str, segments: Vec<String>) {
        self.pairs_seen += 1;
        let Some(field) = classify_label(label) else {
            return;
        };
        if self.values.contains_key(&field) || is_placeholder(&segments.join(" ")) {
            return;
        }
        self.values.insert(field, segments);
    }
}

pub fn classify_label(label: &str) -> Option<Field> {
    let label = label.trim().trim_end_matches(':').trim().to_lowercase();
    if label.is_empty() {
        return None;
    }
    FIELD_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| label.contains(k)))
        .map(|(field, _)| *field)
}

pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value.is_empty() || PLACEHOLDERS.contains(&value.as_str())
}

/// Whitespace-collapsed text nodes of an element, dropping empty ones.
pub fn text_segments(element: ElementRef<'_>) -> Vec<String> {
    element
        .text()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn cell_text(element: ElementRef<'_>) -> String {
    text_segments(element).join(" ")
}

/// Split a party cell into individual names.
///
/// Line breaks and `1.` / `2)` numbering both separate names.
pub fn split_parties(segments: &[String]) -> Vec<String> {
    segments
        .iter()
        .flat_map(|segment| NUMBERED.split(segment).map(str::to_string).collect::<Vec<_>>())
        .map(|name| name.trim().trim_end_matches(',').trim().to_string())
        .filter(|name| !is_placeholder(name))
        .collect()
}

fn is_leaf_container(element: ElementRef<'_>) -> bool {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .all(|child| !BLOCK_CHILDREN.contains(&child.value().name()))
}

/// Harvest label/value pairs from every table except `skip_tables`, then
/// from `Label: value` text containers.
pub fn harvest(document: &Html, skip_tables: &[ElementRef<'_>]) -> Harvest {
    let tables = Selector::parse("table").expect("invalid selector");
    let rows = Selector::parse("tr").expect("invalid selector");
    let cells = Selector::parse("td, th").expect("invalid selector");
    let containers = Selector::parse(TEXT_CONTAINERS).expect("invalid selector");

    let mut harvest = Harvest::default();

    for table in document.select(&tables) {
        if skip_tables.iter().any(|skip| skip.id() == table.id()) {
            continue;
        }
        for row in table.select(&rows) {
            let row_cells: Vec<ElementRef<'_>> = row.select(&cells).collect();
            if row_cells.len() < 2 {
                continue;
            }
            let label = cell_text(row_cells[0]);
            harvest.offer(&label, text_segments(row_cells[1]));
        }
    }

    for element in document.select(&containers) {
        if !is_leaf_container(element) {
            continue;
        }
        let text = cell_text(element);
        let Some((label, value)) = text.split_once(':') else {
            continue;
        };
        if label.len() > 60 {
            continue;
        }
        harvest.offer(label, vec![value.trim().to_string()]);
    }

    harvest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_labels() {
        assert_eq!(classify_label("Petitioner(s)"), Some(Field::Petitioner));
        assert_eq!(classify_label("Respondent(s):"), Some(Field::Respondent));
        assert_eq!(classify_label("Date of Filing"), Some(Field::FilingDate));
        assert_eq!(classify_label("Next Date of Hearing"), Some(Field::NextHearing));
        assert_eq!(classify_label("Case Status"), Some(Field::Status));
        assert_eq!(classify_label("Coram"), Some(Field::Judge));
        assert_eq!(classify_label("Case Type"), Some(Field::CaseType));
        assert_eq!(classify_label("Case No."), Some(Field::CaseNumber));
        assert_eq!(classify_label("Filing Year"), Some(Field::FilingYear));
        assert_eq!(classify_label("Remarks"), None);
    }

    #[test]
    fn test_placeholders() {
        for value in ["", " - ", "NA", "Not available", "nil"] {
            assert!(is_placeholder(value), "{value:?}");
        }
        assert!(!is_placeholder("Pending"));
    }

    #[test]
    fn test_split_parties() {
        let segments = vec!["1. Union of India".to_string(), "2. Ministry of Home Affairs".to_string()];
        assert_eq!(split_parties(&segments), vec!["Union of India", "Ministry of Home Affairs"]);

        let inline = vec!["1) Ravi Kumar 2) Sita Devi".to_string()];
        assert_eq!(split_parties(&inline), vec!["Ravi Kumar", "Sita Devi"]);

        let single = vec!["Appellant No. 42".to_string()];
        assert_eq!(split_parties(&single), vec!["Appellant No. 42"]);
    }

    #[test]
    fn test_first_value_wins_and_placeholders_skip() {
        let html = Html::parse_document(
            r#"<table>
                <tr><td>Status</td><td>-</td></tr>
                <tr><td>Case Status</td><td>Pending</td></tr>
                <tr><td>Status</td><td>Disposed</td></tr>
            </table>"#,
        );
        let harvest = harvest(&html, &[]);
        assert_eq!(harvest.text(Field::Status).as_deref(), Some("Pending"));
    }

    #[test]
    fn test_text_containers() {
        let html = Html::parse_document(
            r#"<div class="details">
                <div>Case Type: LPA</div>
                <span>Judge: Hon'ble Justice X</span>
                <p>Some prose without a label</p>
            </div>"#,
        );
        let harvest = harvest(&html, &[]);
        assert_eq!(harvest.text(Field::CaseType).as_deref(), Some("LPA"));
        assert_eq!(harvest.text(Field::Judge).as_deref(), Some("Hon'ble Justice X"));
    }
}
