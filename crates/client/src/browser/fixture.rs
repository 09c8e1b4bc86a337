//! Deterministic in-memory court portal.
//!
//! Serves a search form, a CAPTCHA challenge and case result pages without
//! any network or browser. Sessions live in memory shared by every clone of
//! the portal, so a handle produced through one clone restores through
//! another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use courtfetch_core::case_types::{KNOWN_CASE_TYPES, display_label};
use courtfetch_core::query::MIN_FILING_YEAR;
use courtfetch_core::{CaptchaImage, SessionCookie, SessionHandle};
use scraper::{Html, Selector};

use super::{BrowserDriver, BrowserSession, DriverError};

const DRIVER_NAME: &str = "fixture";

/// Case types offered ahead of the portal's own list, one per demo scenario.
const DEMO_CASE_TYPES: &[&str] = &["Civil Appeal", "Criminal Appeal", "Writ Petition (Civil)"];

/// Behaviour switches for the fixture portal.
#[derive(Debug, Clone, Default)]
pub struct FixtureOptions {
    /// Accepted CAPTCHA answer. `None` serves results without a challenge.
    pub captcha: Option<String>,
    /// Show the CAPTCHA on the search form instead of after submitting it.
    pub captcha_on_form: bool,
    /// Number of navigations that fail before the portal starts answering.
    pub fail_navigations: usize,
    /// Answer every search with "No records found".
    pub no_records: bool,
    /// Leave the case status row out of result pages.
    pub missing_status: bool,
}

impl FixtureOptions {
    pub fn with_captcha(solution: impl Into<String>) -> Self {
        Self { captcha: Some(solution.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone)]
enum View {
    Blank,
    Form { rejected: bool },
    Challenge { rejected: bool },
    Results { case_type: String, case_number: String, filing_year: String },
    NoRecords,
}

#[derive(Debug)]
struct FixtureTab {
    url: String,
    view: View,
    /// Form values keyed by element name.
    fields: HashMap<String, String>,
    challenges: usize,
}

#[derive(Debug, Default)]
struct FixtureState {
    options: FixtureOptions,
    tabs: Mutex<HashMap<String, FixtureTab>>,
    opened: AtomicUsize,
    failed_navigations: AtomicUsize,
}

impl FixtureState {
    fn tabs(&self) -> MutexGuard<'_, HashMap<String, FixtureTab>> {
        self.tabs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fixture portal and driver in one.
#[derive(Debug, Clone)]
pub struct FixturePortal {
    state: Arc<FixtureState>,
}

impl FixturePortal {
    pub fn new(options: FixtureOptions) -> Self {
        Self { state: Arc::new(FixtureState { options, ..Default::default() }) }
    }

    /// Sessions opened since creation.
    pub fn opened_sessions(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Sessions not yet released.
    pub fn live_sessions(&self) -> usize {
        self.state.tabs().len()
    }
}

#[async_trait]
impl BrowserDriver for FixturePortal {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    async fn open(&self) -> Result<Box<dyn BrowserSession>, DriverError> {
        let n = self.state.opened.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("fixture-{n}");
        self.state.tabs().insert(
            id.clone(),
            FixtureTab { url: "about:blank".into(), view: View::Blank, fields: HashMap::new(), challenges: 0 },
        );
        tracing::debug!(session_id = %id, "fixture session opened");
        Ok(Box::new(FixtureSession { id, state: Arc::clone(&self.state) }))
    }

    async fn restore(&self, handle: &SessionHandle) -> Result<Box<dyn BrowserSession>, DriverError> {
        if handle.driver != DRIVER_NAME {
            return Err(DriverError::SessionLost(format!("handle belongs to driver {}", handle.driver)));
        }
        if !self.state.tabs().contains_key(&handle.session_id) {
            return Err(DriverError::SessionLost(handle.session_id.clone()));
        }
        Ok(Box::new(FixtureSession { id: handle.session_id.clone(), state: Arc::clone(&self.state) }))
    }

    async fn release(&self, handle: &SessionHandle) -> Result<(), DriverError> {
        if self.state.tabs().remove(&handle.session_id).is_some() {
            tracing::debug!(session_id = %handle.session_id, "fixture session released");
        }
        Ok(())
    }
}

struct FixtureSession {
    id: String,
    state: Arc<FixtureState>,
}

impl FixtureSession {
    fn with_tab<T>(&self, f: impl FnOnce(&mut FixtureTab) -> Result<T, DriverError>) -> Result<T, DriverError> {
        let mut tabs = self.state.tabs();
        let tab = tabs.get_mut(&self.id).ok_or(DriverError::Closed)?;
        f(tab)
    }

    /// Name attribute of the element `selector` matches on the current page.
    fn element_name(&self, tab: &FixtureTab, selector: &str) -> Result<String, DriverError> {
        let html = render(&self.state.options, &self.id, tab);
        let document = Html::parse_document(&html);
        let parsed = Selector::parse(selector).map_err(|e| DriverError::Script(format!("bad selector {selector}: {e}")))?;
        let element = document
            .select(&parsed)
            .next()
            .ok_or_else(|| DriverError::ElementNotFound(selector.to_string()))?;
        Ok(element.value().attr("name").unwrap_or(selector).to_string())
    }

    fn submit(&self, tab: &mut FixtureTab) {
        let options = &self.state.options;
        let answer = tab.fields.remove("captcha_code").unwrap_or_default();
        let solved = options.captcha.as_deref().is_none_or(|expected| answer == expected);

        let on_form = matches!(tab.view, View::Form { .. });
        let on_challenge = matches!(tab.view, View::Challenge { .. });
        let guarded = options.captcha.is_some();

        tab.view = match (on_form, on_challenge) {
            (true, _) if guarded && options.captcha_on_form && !solved => {
                tab.challenges += 1;
                View::Form { rejected: true }
            }
            (true, _) if guarded && !options.captcha_on_form => {
                tab.challenges += 1;
                View::Challenge { rejected: false }
            }
            (_, true) if !solved => {
                tab.challenges += 1;
                View::Challenge { rejected: true }
            }
            _ if options.no_records => View::NoRecords,
            _ => View::Results {
                case_type: tab.fields.get("case_type").cloned().unwrap_or_default(),
                case_number: tab.fields.get("case_no").cloned().unwrap_or_default(),
                filing_year: tab.fields.get("case_year").cloned().unwrap_or_default(),
            },
        };
    }
}

#[async_trait]
impl BrowserSession for FixtureSession {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let failed = self.state.failed_navigations.fetch_add(1, Ordering::SeqCst);
        if failed < self.state.options.fail_navigations {
            return Err(DriverError::Navigation(format!("{url}: connection reset")));
        }

        let captcha_on_form = self.state.options.captcha.is_some() && self.state.options.captcha_on_form;
        self.with_tab(|tab| {
            tab.url = url.to_string();
            tab.view = View::Form { rejected: false };
            tab.fields.clear();
            if captcha_on_form {
                tab.challenges += 1;
            }
            Ok(())
        })
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.with_tab(|tab| Ok(render(&self.state.options, &self.id, tab)))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        self.with_tab(|tab| {
            let name = self.element_name(tab, selector)?;
            tab.fields.insert(name, value.to_string());
            Ok(())
        })
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        self.fill(selector, value).await
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        self.with_tab(|tab| {
            self.element_name(tab, selector)?;
            self.submit(tab);
            Ok(())
        })
    }

    async fn screenshot_element(&self, selector: &str) -> Result<CaptchaImage, DriverError> {
        self.with_tab(|tab| {
            self.element_name(tab, selector).map_err(|e| DriverError::Screenshot(e.to_string()))?;
            let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
            png.extend_from_slice(format!("challenge {} #{}", self.id, tab.challenges).as_bytes());
            Ok(CaptchaImage::png(png))
        })
    }

    async fn handle(&self) -> Result<SessionHandle, DriverError> {
        self.with_tab(|tab| {
            Ok(SessionHandle {
                driver: DRIVER_NAME.into(),
                session_id: self.id.clone(),
                endpoint: None,
                target_id: None,
                url: Some(tab.url.clone()),
                cookies: vec![SessionCookie {
                    name: "PHPSESSID".into(),
                    value: self.id.clone(),
                    domain: None,
                    path: Some("/".into()),
                }],
            })
        })
    }
}

fn render(options: &FixtureOptions, id: &str, tab: &FixtureTab) -> String {
    let body = match &tab.view {
        View::Blank => String::new(),
        View::Form { rejected } => render_form(options.captcha.is_some() && options.captcha_on_form, *rejected, id, tab),
        View::Challenge { rejected } => render_challenge(*rejected, id, tab),
        View::Results { case_type, case_number, filing_year } => {
            render_results(case_type, case_number, filing_year, options.missing_status)
        }
        View::NoRecords => "<div class=\"alert\">No records found for the given case details.</div>".into(),
    };
    format!("<html><head><title>Case Status</title></head><body>{body}</body></html>")
}

fn captcha_block(rejected: bool, id: &str, tab: &FixtureTab) -> String {
    let notice = if rejected { "<p class=\"error\">Invalid captcha, please try again.</p>" } else { "" };
    format!(
        "{notice}<img id=\"captcha-image\" src=\"/captcha.png?s={id}&n={}\" alt=\"captcha\">\
         <input type=\"text\" name=\"captcha_code\" id=\"captcha_code\">",
        tab.challenges
    )
}

fn render_form(with_captcha: bool, rejected: bool, id: &str, tab: &FixtureTab) -> String {
    let mut case_types = String::from("<option value=\"\">Select Case Type</option>");
    let labels = DEMO_CASE_TYPES
        .iter()
        .map(|s| s.to_string())
        .chain(KNOWN_CASE_TYPES.iter().map(|(abbr, desc)| display_label(abbr, desc)));
    for label in labels {
        case_types.push_str(&format!("<option value=\"{label}\">{label}</option>"));
    }

    let mut years = String::from("<option value=\"\">Year</option>");
    for year in (MIN_FILING_YEAR..=Utc::now().year()).rev() {
        years.push_str(&format!("<option value=\"{year}\">{year}</option>"));
    }

    let captcha = if with_captcha { captcha_block(rejected, id, tab) } else { String::new() };
    format!(
        "<form id=\"case-search\" method=\"post\">\
         <select name=\"case_type\" id=\"case_type\">{case_types}</select>\
         <input type=\"text\" name=\"case_no\" id=\"case_no\">\
         <select name=\"case_year\" id=\"case_year\">{years}</select>\
         {captcha}<input type=\"submit\" value=\"Search\"></form>"
    )
}

fn render_challenge(rejected: bool, id: &str, tab: &FixtureTab) -> String {
    format!(
        "<div class=\"captcha-box\"><p>Enter the characters shown to continue.</p>\
         <form method=\"post\">{}<input type=\"submit\" value=\"Submit\"></form></div>",
        captcha_block(rejected, id, tab)
    )
}

struct Scenario {
    petitioner: String,
    respondents: &'static [&'static str],
    filing_date: String,
    next_hearing: &'static str,
    status: &'static str,
    judge: &'static str,
}

fn scenario(case_type: &str, case_number: &str, year: &str) -> Scenario {
    match case_type {
        "Criminal Appeal" => Scenario {
            petitioner: format!("Appellant No. {case_number}"),
            respondents: &["State of Delhi"],
            filing_date: format!("10-Mar-{year}"),
            next_hearing: "30-Aug-2025",
            status: "Matter for final hearing",
            judge: "Hon'ble Justice Priya Sharma",
        },
        "Writ Petition (Civil)" => Scenario {
            petitioner: format!("Citizen Petitioner {case_number}"),
            respondents: &["Union of India", "Ministry of Home Affairs"],
            filing_date: format!("05-Jun-{year}"),
            next_hearing: "15-Sep-2025",
            status: "Notice issued, awaiting response",
            judge: "Hon'ble Justice A.K. Mehta",
        },
        _ => Scenario {
            petitioner: "M/s Delhi Construction Company Ltd.".into(),
            respondents: &["Municipal Corporation of Delhi", "Delhi Development Authority"],
            filing_date: format!("15-Jan-{year}"),
            next_hearing: "25-Aug-2025",
            status: "Arguments concluded, judgment reserved",
            judge: "Hon'ble Justice Rajesh Kumar",
        },
    }
}

fn render_results(case_type: &str, case_number: &str, year: &str, missing_status: bool) -> String {
    let s = scenario(case_type, case_number, year);
    let respondents = s
        .respondents
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}. {name}", i + 1))
        .collect::<Vec<_>>()
        .join("<br>");
    let status = if missing_status { String::new() } else { format!("<tr><td>Case Status</td><td>{}</td></tr>", s.status) };

    let history = [
        (format!("15-Jan-{year}"), format!("{case_type} filed and registered"), "Listed before registrar"),
        (format!("20-Jan-{year}"), "Notice issued to respondent parties".to_string(), "Notice issued"),
        ("05-Feb-2025".to_string(), "Counter affidavit filed by respondent".to_string(), "Taken on record"),
        ("15-Mar-2025".to_string(), "Rejoinder filed by petitioner".to_string(), "Taken on record"),
        ("01-Aug-2025".to_string(), "Arguments heard".to_string(), "Reserved for judgment"),
    ]
    .iter()
    .map(|(date, purpose, outcome)| format!("<tr><td>{date}</td><td>{purpose}</td><td>{outcome}</td></tr>"))
    .collect::<String>();

    format!(
        "<h2>Case Details</h2>\
         <table class=\"case-details\">\
         <tr><td>Case Type</td><td>{case_type}</td></tr>\
         <tr><td>Case No.</td><td>{case_number}</td></tr>\
         <tr><td>Filing Year</td><td>{year}</td></tr>\
         <tr><td>Petitioner(s)</td><td>{}</td></tr>\
         <tr><td>Respondent(s)</td><td>{respondents}</td></tr>\
         <tr><td>Date of Filing</td><td>{}</td></tr>\
         <tr><td>Next Date of Hearing</td><td>{}</td></tr>\
         {status}\
         <tr><td>Coram</td><td>{}</td></tr>\
         </table>\
         <table class=\"case-history\"><tr><th>Date</th><th>Purpose</th><th>Outcome</th></tr>{history}</table>\
         <div class=\"orders\">\
         <a href=\"/orders/{case_number}-{year}-01082025.pdf\">Order dated 01-Aug-2025 in {case_type} {case_number}/{year}</a>\
         <a href=\"/judgments/{case_number}-{year}-15072025.pdf\">Judgment dated 15-Jul-2025</a>\
         <a href=\"#\">Back to search</a>\
         </div>",
        s.petitioner, s.filing_date, s.next_hearing, s.judge
    )
}
