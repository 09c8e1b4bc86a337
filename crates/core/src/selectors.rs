//! Portal selector lookup table.
//!
//! Every piece of knowledge about the portal's markup lives here. Each target
//! has an ordered list of CSS selectors; the first one that matches the
//! current page wins. When the portal layout drifts, this table changes and
//! the control flow does not.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorTable {
    /// Any of these means the search form has loaded.
    pub form_ready: Vec<String>,
    pub case_type: Vec<String>,
    pub case_number: Vec<String>,
    pub filing_year: Vec<String>,
    pub submit: Vec<String>,
    pub captcha_image: Vec<String>,
    pub captcha_input: Vec<String>,
    /// Any of these means a result page has rendered.
    pub results_ready: Vec<String>,
    /// Lowercase page text indicating a rejected CAPTCHA answer.
    pub captcha_error_text: Vec<String>,
    /// Lowercase page text indicating the case does not exist.
    pub no_records_text: Vec<String>,
    /// Lowercase page text indicating the portal is down.
    pub maintenance_text: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for SelectorTable {
    fn default() -> Self {
        Self {
            form_ready: owned(&["form", "[name='case_type']", "#case_type", ".form-control"]),
            case_type: owned(&[
                "select[name='case_type']",
                "select#case_type",
                "select.case-type",
                "select[name*='case'][name*='type']",
                "select[id*='case'][id*='type']",
            ]),
            case_number: owned(&[
                "input[name='case_no']",
                "input[name='case_number']",
                "input#case_no",
                "input#case_number",
                "input[name*='case'][name*='no']",
                "input[name*='case'][name*='number']",
            ]),
            filing_year: owned(&[
                "[name='case_year']",
                "[name='filing_year']",
                "[name='year']",
                "#case_year",
                "#filing_year",
                "input[name*='year']",
                "select[name*='year']",
            ]),
            submit: owned(&[
                "input[type='submit']",
                "button[type='submit']",
                "input[value='Search']",
                "button.search",
            ]),
            captcha_image: owned(&[
                "img[src*='captcha']",
                "img[alt*='captcha']",
                "img[id*='captcha']",
                "img[class*='captcha']",
                "canvas[id*='captcha']",
            ]),
            captcha_input: owned(&[
                "input[name*='captcha']",
                "input[id*='captcha']",
                "input[placeholder*='captcha']",
                "input[class*='captcha']",
            ]),
            results_ready: owned(&["table.case-details", "#case-details", "table"]),
            captcha_error_text: owned(&["invalid captcha", "wrong captcha", "incorrect captcha", "captcha mismatch"]),
            no_records_text: owned(&["no records found", "no data found", "case not found", "invalid case"]),
            maintenance_text: owned(&["under maintenance", "temporarily unavailable", "service unavailable"]),
        }
    }
}

impl SelectorTable {
    /// Names of selector lists that are empty.
    pub fn empty_lists(&self) -> Vec<&'static str> {
        [
            ("form_ready", &self.form_ready),
            ("case_type", &self.case_type),
            ("case_number", &self.case_number),
            ("filing_year", &self.filing_year),
            ("submit", &self.submit),
            ("captcha_image", &self.captcha_image),
            ("captcha_input", &self.captcha_input),
            ("results_ready", &self.results_ready),
        ]
        .into_iter()
        .filter(|(_, list)| list.is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_complete() {
        assert!(SelectorTable::default().empty_lists().is_empty());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let table: SelectorTable = serde_json::from_str(r##"{"captcha_input":["#solution"]}"##).unwrap();
        assert_eq!(table.captcha_input, vec!["#solution".to_string()]);
        assert_eq!(table.case_type, SelectorTable::default().case_type);
    }

    #[test]
    fn test_empty_lists_reported() {
        let table = SelectorTable { submit: Vec::new(), ..Default::default() };
        assert_eq!(table.empty_lists(), vec!["submit"]);
    }
}
