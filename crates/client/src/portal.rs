//! Portal form flow.
//!
//! Drives one browser session through the search form: find a working entry
//! point, fill the query, submit, and classify the page that comes back.
//! All markup knowledge comes from the [`SelectorTable`]; this module only
//! decides the order in which targets are tried.

use std::time::Duration;

use courtfetch_core::{AppConfig, Error, Query, SelectorTable};
use scraper::{ElementRef, Html, Selector};

use crate::browser::{BrowserSession, DriverError, wait_for};
use crate::captcha::{CaptchaFound, Detection, detect_captcha};

/// First selector in list order that matches the document.
///
/// Selectors that fail to parse are skipped so one bad table entry does not
/// disable the others.
pub fn first_match<'a>(document: &Html, selectors: &'a [String]) -> Option<&'a str> {
    selectors.iter().map(String::as_str).find(|raw| match Selector::parse(raw) {
        Ok(selector) => document.select(&selector).next().is_some(),
        Err(e) => {
            tracing::debug!(selector = raw, error = %e, "skipping unparsable selector");
            false
        }
    })
}

/// Lowercased visible text of the whole page.
pub fn page_text(document: &Html) -> String {
    document.root_element().text().collect::<String>().to_lowercase()
}

fn mentions(text: &str, indicators: &[String]) -> bool {
    indicators.iter().any(|i| text.contains(&i.to_lowercase()))
}

/// Where a submitted search ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Captcha(CaptchaFound),
    /// A result page, with its HTML.
    Results(String),
    NoRecords,
}

enum Probe {
    Settled(PageState),
    CaptchaUnreadable(String),
}

enum FormProbe {
    Ready,
    Maintenance,
}

/// Target selector and the value to put there.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldPlan {
    selector: String,
    value: String,
    is_select: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FillPlan {
    case_type: FieldPlan,
    case_number: FieldPlan,
    filing_year: FieldPlan,
}

#[derive(Debug, Clone)]
pub struct PortalFlow {
    selectors: SelectorTable,
    entry_urls: Vec<String>,
    step_timeout: Duration,
}

impl PortalFlow {
    pub fn new(selectors: SelectorTable, entry_urls: Vec<String>, step_timeout: Duration) -> Self {
        Self { selectors, entry_urls, step_timeout }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.selectors.clone(), config.entry_urls().map(str::to_string).collect(), config.step_timeout())
    }

    /// Navigate entry points in order until one shows the search form.
    ///
    /// Returns the URL that worked. Maintenance pages and pages where no
    /// form appears within the step timeout move on to the next entry.
    pub async fn open_search_form(&self, session: &dyn BrowserSession) -> Result<String, DriverError> {
        let mut last_error = DriverError::Navigation("no entry URLs configured".into());

        for url in &self.entry_urls {
            if let Err(e) = session.navigate(url).await {
                tracing::warn!(url = %url, error = %e, "portal entry point failed");
                last_error = e;
                continue;
            }

            match wait_for(session, self.step_timeout, "search form", |html| self.probe_form(html)).await {
                Ok(FormProbe::Ready) => {
                    tracing::debug!(url = %url, "search form ready");
                    return Ok(url.clone());
                }
                Ok(FormProbe::Maintenance) => {
                    tracing::warn!(url = %url, "portal reports maintenance");
                    last_error = DriverError::Navigation(format!("{url}: under maintenance"));
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "search form did not load");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn probe_form(&self, html: &str) -> Option<FormProbe> {
        let document = Html::parse_document(html);
        if mentions(&page_text(&document), &self.selectors.maintenance_text) {
            return Some(FormProbe::Maintenance);
        }
        first_match(&document, &self.selectors.form_ready).map(|_| FormProbe::Ready)
    }

    /// Whether the page carries the query fields (a form to fill).
    pub fn shows_search_form(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        first_match(&document, &self.selectors.case_type).is_some()
            && first_match(&document, &self.selectors.case_number).is_some()
    }

    /// Put the query into the search form on the current page.
    ///
    /// A case type the dropdown does not offer is an `InvalidQuery`, not a
    /// browser fault, so it is never retried.
    pub async fn fill_query(&self, session: &dyn BrowserSession, query: &Query) -> Result<(), Error> {
        let html = session.content().await?;
        let plan = self.plan_fill(&html, query)?;

        for field in [&plan.case_type, &plan.case_number, &plan.filing_year] {
            if field.is_select {
                session.select_option(&field.selector, &field.value).await?;
            } else {
                session.fill(&field.selector, &field.value).await?;
            }
        }

        tracing::debug!(query = %query, case_type = %plan.case_type.value, "search form filled");
        Ok(())
    }

    fn plan_fill(&self, html: &str, query: &Query) -> Result<FillPlan, Error> {
        let document = Html::parse_document(html);

        let (type_selector, case_type) = self.field(&document, &self.selectors.case_type, "case type")?;
        let case_type_plan = if is_select(case_type) {
            let value = choose_option(case_type, query.case_type()).ok_or_else(|| {
                Error::InvalidQuery(format!("case type {:?} is not offered by the portal", query.case_type()))
            })?;
            FieldPlan { selector: type_selector.to_string(), value, is_select: true }
        } else {
            FieldPlan { selector: type_selector.to_string(), value: query.case_type().to_string(), is_select: false }
        };

        let (number_selector, _) = self.field(&document, &self.selectors.case_number, "case number")?;

        let (year_selector, year) = self.field(&document, &self.selectors.filing_year, "filing year")?;
        let year_text = query.filing_year().to_string();
        let year_plan = if is_select(year) {
            let value = choose_option(year, &year_text)
                .ok_or_else(|| Error::InvalidQuery(format!("filing year {year_text} is not offered by the portal")))?;
            FieldPlan { selector: year_selector.to_string(), value, is_select: true }
        } else {
            FieldPlan { selector: year_selector.to_string(), value: year_text, is_select: false }
        };

        Ok(FillPlan {
            case_type: case_type_plan,
            case_number: FieldPlan {
                selector: number_selector.to_string(),
                value: query.case_number().to_string(),
                is_select: false,
            },
            filing_year: year_plan,
        })
    }

    /// The winning selector for a target and the element it matched.
    fn field<'d, 's>(
        &self, document: &'d Html, selectors: &'s [String], target: &str,
    ) -> Result<(&'s str, ElementRef<'d>), Error> {
        let raw = first_match(document, selectors)
            .ok_or_else(|| DriverError::ElementNotFound(format!("{target} field")))?;
        let selector = Selector::parse(raw).map_err(|e| DriverError::Script(format!("{raw}: {e}")))?;
        let element = document
            .select(&selector)
            .next()
            .ok_or_else(|| DriverError::ElementNotFound(format!("{target} field")))?;
        tracing::debug!(target_field = target, selector = raw, "resolved form field");
        Ok((raw, element))
    }

    /// Visible labels of the case type dropdown, in page order.
    ///
    /// Empty when the field is a free-text input or has only placeholders.
    pub fn case_type_options(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let Ok((_, field)) = self.field(&document, &self.selectors.case_type, "case type") else {
            return Vec::new();
        };
        if !is_select(field) {
            return Vec::new();
        }

        let option_selector = Selector::parse("option").expect("invalid selector");
        let mut labels: Vec<String> = Vec::new();
        for option in field.select(&option_selector) {
            let text = collapse(&option.text().collect::<String>());
            let value = option.value().attr("value").unwrap_or(&text);
            if value.trim().is_empty() || is_placeholder(&text) || labels.contains(&text) {
                continue;
            }
            labels.push(text);
        }
        labels
    }

    /// Click the first submit control the page offers.
    pub async fn submit(&self, session: &dyn BrowserSession) -> Result<(), DriverError> {
        let html = session.content().await?;
        let selector = {
            let document = Html::parse_document(&html);
            first_match(&document, &self.selectors.submit).map(str::to_string)
        }
        .ok_or_else(|| DriverError::ElementNotFound("submit control".into()))?;

        tracing::debug!(selector = %selector, "submitting form");
        session.click(&selector).await
    }

    /// Classify the current page without waiting.
    pub fn detect(&self, html: &str) -> Detection {
        detect_captcha(html, &self.selectors)
    }

    /// Wait for the page after a submit to settle on a challenge, a result
    /// page or a "no records" answer.
    ///
    /// A CAPTCHA image seen without an input when the wait runs out is a
    /// `CaptchaExtraction` failure; any other timeout is a browser fault.
    pub async fn wait_for_transition(&self, session: &dyn BrowserSession) -> Result<PageState, Error> {
        let mut unreadable = None;
        let waited = wait_for(session, self.step_timeout, "page transition", |html| match self.classify(html) {
            Some(Probe::Settled(state)) => Some(state),
            Some(Probe::CaptchaUnreadable(selector)) => {
                unreadable = Some(selector);
                None
            }
            None => None,
        })
        .await;

        match waited {
            Ok(state) => Ok(state),
            Err(DriverError::Timeout { .. }) if unreadable.is_some() => Err(Error::CaptchaExtraction(format!(
                "captcha image {} shown without an answer field",
                unreadable.unwrap_or_default()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn classify(&self, html: &str) -> Option<Probe> {
        match detect_captcha(html, &self.selectors) {
            Detection::Found(found) => return Some(Probe::Settled(PageState::Captcha(found))),
            Detection::Partial { image_selector } => return Some(Probe::CaptchaUnreadable(image_selector)),
            Detection::Absent => {}
        }

        let document = Html::parse_document(html);
        if mentions(&page_text(&document), &self.selectors.no_records_text) {
            return Some(Probe::Settled(PageState::NoRecords));
        }
        first_match(&document, &self.selectors.results_ready).map(|_| Probe::Settled(PageState::Results(html.to_string())))
    }
}

fn is_select(element: ElementRef<'_>) -> bool {
    element.value().name() == "select"
}

fn is_placeholder(text: &str) -> bool {
    let text = text.trim_start_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
    text.is_empty() || text.starts_with("select") || text.starts_with("choose")
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pick the `<option>` value for `wanted`: exact visible text (or value)
/// first, then a case-insensitive partial match in either direction.
/// Placeholder options are never chosen.
pub fn choose_option(select: ElementRef<'_>, wanted: &str) -> Option<String> {
    let option_selector = Selector::parse("option").expect("invalid selector");
    let wanted = collapse(wanted);
    let wanted_lower = wanted.to_lowercase();

    let options: Vec<(String, String)> = select
        .select(&option_selector)
        .map(|option| {
            let text = collapse(&option.text().collect::<String>());
            let value = option.value().attr("value").map(str::to_string).unwrap_or_else(|| text.clone());
            (text, value)
        })
        .filter(|(text, value)| !value.trim().is_empty() && !is_placeholder(text))
        .collect();

    if let Some((_, value)) = options.iter().find(|(text, value)| *text == wanted || *value == wanted) {
        return Some(value.clone());
    }

    options
        .iter()
        .find(|(text, _)| {
            let text = text.to_lowercase();
            text.contains(&wanted_lower) || wanted_lower.contains(&text)
        })
        .map(|(_, value)| value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserDriver, FixtureOptions, FixturePortal};

    fn flow() -> PortalFlow {
        PortalFlow::new(SelectorTable::default(), vec!["https://portal.test/case-status".into()], Duration::from_millis(500))
    }

    fn select_of(html: &str) -> Html {
        Html::parse_document(html)
    }

    #[test]
    fn test_choose_option_exact_then_partial() {
        let document = select_of(
            r#"<select name="case_type">
                <option value="">Select Case Type</option>
                <option value="WP">Writ Petition (Civil)</option>
                <option value="WPC">Writ Petition</option>
                <option value="LPA">LPA (Letters Patent Appeal)</option>
            </select>"#,
        );
        let select = document.select(&Selector::parse("select").unwrap()).next().unwrap();

        assert_eq!(choose_option(select, "Writ Petition"), Some("WPC".into()));
        assert_eq!(choose_option(select, "letters patent"), Some("LPA".into()));
        assert_eq!(choose_option(select, "LPA (Letters Patent Appeal) - Delhi"), Some("LPA".into()));
        assert_eq!(choose_option(select, "Bail Application"), None);
    }

    #[test]
    fn test_choose_option_skips_placeholders() {
        let document = select_of(r#"<select><option value="">Select</option><option>2022</option></select>"#);
        let select = document.select(&Selector::parse("select").unwrap()).next().unwrap();
        assert_eq!(choose_option(select, "select"), None);
        assert_eq!(choose_option(select, "2022"), Some("2022".into()));
    }

    #[test]
    fn test_case_type_options() {
        let html = r#"<form>
            <select id="case_type" name="case_type">
                <option value="">Select Case Type</option>
                <option value="choose">-- Choose --</option>
                <option value="LPA">LPA (Letters Patent Appeal)</option>
                <option value="RFA">  RFA
                    (Regular First Appeal) </option>
                <option value="LPA">LPA (Letters Patent Appeal)</option>
            </select>
        </form>"#;
        assert_eq!(flow().case_type_options(html), ["LPA (Letters Patent Appeal)", "RFA (Regular First Appeal)"]);

        let free_text = r#"<input type="text" name="case_type">"#;
        assert!(flow().case_type_options(free_text).is_empty());
        assert!(flow().case_type_options("<p>no form</p>").is_empty());
    }

    #[test]
    fn test_first_match_order_and_bad_selectors() {
        let document = Html::parse_document(r#"<input id="case_no" name="case_number">"#);
        let selectors = vec!["[[broken".to_string(), "input[name='case_no']".into(), "input#case_no".into()];
        assert_eq!(first_match(&document, &selectors), Some("input#case_no"));
        assert_eq!(first_match(&document, &[]), None);
    }

    #[test]
    fn test_classify_priority() {
        let flow = flow();
        let both = r#"<table class="case-details"></table><img src="/captcha.png"><input name="captcha_code">"#;
        assert!(matches!(flow.classify(both), Some(Probe::Settled(PageState::Captcha(_)))));

        let none = "<div>No records found</div><table></table>";
        assert!(matches!(flow.classify(none), Some(Probe::Settled(PageState::NoRecords))));

        let results = r#"<table class="case-details"><tr><td>Case Type</td><td>LPA</td></tr></table>"#;
        assert!(matches!(flow.classify(results), Some(Probe::Settled(PageState::Results(_)))));

        assert!(flow.classify("<p>loading</p>").is_none());
    }

    #[tokio::test]
    async fn test_fill_and_submit_against_fixture() {
        let portal = FixturePortal::new(FixtureOptions::default());
        let session = portal.open().await.unwrap();
        let flow = flow();

        let url = flow.open_search_form(session.as_ref()).await.unwrap();
        assert_eq!(url, "https://portal.test/case-status");

        let query = Query::new("Writ Petition", 1234, 2022).unwrap();
        flow.fill_query(session.as_ref(), &query).await.unwrap();
        flow.submit(session.as_ref()).await.unwrap();

        match flow.wait_for_transition(session.as_ref()).await.unwrap() {
            PageState::Results(html) => {
                assert!(html.contains("Writ Petition (Civil)"));
                assert!(html.contains("<td>1234</td>"));
            }
            other => panic!("expected results, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_case_type_is_invalid_query() {
        let portal = FixturePortal::new(FixtureOptions::default());
        let session = portal.open().await.unwrap();
        let flow = flow();
        flow.open_search_form(session.as_ref()).await.unwrap();

        let query = Query::new("Martian Appeal", 1, 2022).unwrap();
        let err = flow.fill_query(session.as_ref(), &query).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_entry_points_fall_through() {
        let portal = FixturePortal::new(FixtureOptions { fail_navigations: 1, ..Default::default() });
        let session = portal.open().await.unwrap();
        let flow = PortalFlow::new(
            SelectorTable::default(),
            vec!["https://primary.test".into(), "https://fallback.test".into()],
            Duration::from_millis(500),
        );
        assert_eq!(flow.open_search_form(session.as_ref()).await.unwrap(), "https://fallback.test");
    }

    #[tokio::test]
    async fn test_form_never_appears() {
        let portal = FixturePortal::new(FixtureOptions::default());
        let session = portal.open().await.unwrap();
        let table = SelectorTable { form_ready: vec!["#never".into()], ..Default::default() };
        let flow = PortalFlow::new(table, vec!["https://portal.test".into()], Duration::from_millis(300));
        let err = flow.open_search_form(session.as_ref()).await.unwrap_err();
        assert!(matches!(err, DriverError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_submit_reaches_challenge() {
        let portal = FixturePortal::new(FixtureOptions::with_captcha("ABC123"));
        let session = portal.open().await.unwrap();
        let flow = flow();
        flow.open_search_form(session.as_ref()).await.unwrap();
        flow.fill_query(session.as_ref(), &Query::new("Civil Appeal", 9, 2020).unwrap()).await.unwrap();
        flow.submit(session.as_ref()).await.unwrap();

        let state = flow.wait_for_transition(session.as_ref()).await.unwrap();
        assert!(matches!(state, PageState::Captcha(CaptchaFound { rejected_answer: false, .. })));
    }
}
