//! Query Orchestrator.
//!
//! Composes the cache, the portal flow, the CAPTCHA interrupt and the result
//! parser into the two-call protocol callers see:
//!
//! - [`Orchestrator::submit`] answers from the cache, or drives a fresh
//!   browser session until it has a record, a challenge or a failure.
//! - [`Orchestrator::resume`] consumes a token, continues the suspended
//!   session with the human's answer and finishes the same way.
//!
//! The orchestrator owns no persistent state. Work for one fingerprint is
//! serialized through an [`InflightGate`]; every call runs under a hard
//! ceiling, and a browser session survives a call only while a pending
//! session points at it.

mod gate;

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use courtfetch_core::{
    AppConfig, CacheDb, CachedResult, Error, Fingerprint, NewQueryLog, Outcome, ParsedRecord, PendingSession, Query,
    QueryJournal, ResultCache, SessionHandle, SessionStore,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::browser::{BrowserDriver, BrowserSession};
use crate::captcha::{self, Detection};
use crate::parse::ResultParser;
use crate::portal::{PageState, PortalFlow};

pub use gate::{GateGuard, InflightGate};

/// Attempts, spacing and the hard ceiling for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub ceiling: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            delay: config.retry_delay(),
            ceiling: config.orchestration_timeout(),
        }
    }
}

/// The browser session a call currently owns, so a call cut off by the
/// ceiling can still tear it down.
#[derive(Debug, Default)]
struct HandleSlot(Mutex<Option<SessionHandle>>);

impl HandleSlot {
    fn holding(handle: SessionHandle) -> Self {
        Self(Mutex::new(Some(handle)))
    }

    fn set(&self, handle: SessionHandle) {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
    }

    fn take(&self) -> Option<SessionHandle> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take()
    }
}

pub struct Orchestrator {
    driver: Arc<dyn BrowserDriver>,
    cache: Arc<dyn ResultCache>,
    sessions: Arc<dyn SessionStore>,
    journal: Option<Arc<dyn QueryJournal>>,
    portal: PortalFlow,
    parser: ResultParser,
    gate: InflightGate,
    policy: RetryPolicy,
}

impl Orchestrator {
    /// Engine over one SQLite database serving as cache, session store and
    /// query log.
    pub fn new(config: &AppConfig, driver: Arc<dyn BrowserDriver>, db: CacheDb) -> Result<Self, Error> {
        let db = Arc::new(db);
        let orchestrator = Self::with_stores(config, driver, db.clone(), db.clone())?;
        Ok(orchestrator.with_journal(db))
    }

    /// Engine over arbitrary cache and session store implementations, with
    /// no query log.
    pub fn with_stores(
        config: &AppConfig, driver: Arc<dyn BrowserDriver>, cache: Arc<dyn ResultCache>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, Error> {
        Ok(Self {
            driver,
            cache,
            sessions,
            journal: None,
            portal: PortalFlow::from_config(config),
            parser: ResultParser::from_config(config)?,
            gate: InflightGate::new(),
            policy: RetryPolicy::from_config(config),
        })
    }

    pub fn with_journal(mut self, journal: Arc<dyn QueryJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    /// Fingerprints with an automation running or queued.
    pub fn in_flight(&self) -> usize {
        self.gate.in_flight()
    }

    /// Answer a query from the cache or the portal.
    pub async fn submit(&self, query: &Query) -> Outcome {
        let fingerprint = query.fingerprint();

        if let Some(record) = self.cached_record(&fingerprint).await {
            tracing::info!(fingerprint = %fingerprint, query = %query, "cache hit");
            return self.finish(query, Outcome::ready(record), true).await;
        }

        let _guard = self.gate.acquire(&fingerprint).await;

        // Whoever held the gate before us may have answered already.
        if let Some(record) = self.cached_record(&fingerprint).await {
            tracing::info!(fingerprint = %fingerprint, "cache filled by concurrent request");
            return self.finish(query, Outcome::ready(record), true).await;
        }
        match self.sessions.find_active(&fingerprint).await {
            Ok(Some(pending)) => {
                tracing::info!(fingerprint = %fingerprint, token = %pending.token, "joining pending captcha challenge");
                return self.finish(query, Outcome::manual(pending.challenge()), false).await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(fingerprint = %fingerprint, error = %e, "pending session lookup failed"),
        }

        let slot = HandleSlot::default();
        let outcome = self.bounded(&slot, "search", self.fetch_with_retries(query, &slot)).await;
        self.finish(query, outcome, false).await
    }

    /// Validate raw form text, then [`submit`](Self::submit).
    pub async fn submit_form(&self, case_type: &str, case_number: &str, filing_year: &str) -> Outcome {
        match Query::parse(case_type, case_number, filing_year) {
            Ok(query) => self.submit(&query).await,
            Err(e) => {
                tracing::info!(error = %e, "query rejected");
                self.record(NewQueryLog::rejected(case_type, case_number, filing_year, &e)).await;
                e.into()
            }
        }
    }

    /// Continue a suspended session with a human's CAPTCHA answer.
    ///
    /// The token is consumed whatever happens next. A wrong answer yields a
    /// new `ManualActionRequired` with a new token on the same browser
    /// session.
    pub async fn resume(&self, token: &str, solution: &str) -> Outcome {
        let solution = solution.trim();
        if solution.is_empty() {
            return Error::InvalidInput("captcha solution is required".into()).into();
        }

        let token = token.trim();

        // Hold the gate before consuming the token so a concurrent search for
        // the same case keeps seeing the pending session.
        let _guard = match self.sessions.get(token).await {
            Ok(Some(live)) => Some(self.gate.acquire(&live.fingerprint).await),
            Ok(None) => None,
            Err(e) => return e.into(),
        };

        let pending = match self.sessions.take(token).await {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                tracing::info!(token, "resume with unknown or consumed token");
                return Error::SessionExpired("token is unknown or already used, search again".into()).into();
            }
            Err(e) => return e.into(),
        };

        if pending.is_expired_at(Utc::now()) {
            tracing::info!(token = %pending.token, fingerprint = %pending.fingerprint, "resume after expiry");
            self.release(&pending.handle).await;
            let outcome = Error::SessionExpired(format!("captcha expired at {}, search again", pending.expires_at)).into();
            return self.finish(&pending.query, outcome, false).await;
        }

        let slot = HandleSlot::holding(pending.handle.clone());
        let outcome = self.bounded(&slot, "resume", self.continue_session(&pending, solution, &slot)).await;
        self.finish(&pending.query, outcome, false).await
    }

    /// Invalidate a token and tear down its browser.
    ///
    /// Returns false for unknown, consumed or expired tokens.
    pub async fn abandon(&self, token: &str) -> Result<bool, Error> {
        let Some(pending) = self.sessions.take(token.trim()).await? else {
            return Ok(false);
        };
        self.release(&pending.handle).await;

        if pending.is_expired_at(Utc::now()) {
            return Ok(false);
        }
        tracing::info!(token = %pending.token, fingerprint = %pending.fingerprint, "captcha session abandoned");
        Ok(true)
    }

    /// Reclaim expired pending sessions and release their browsers.
    pub async fn sweep(&self) -> Result<usize, Error> {
        let handles = self.sessions.purge_expired().await?;
        for handle in &handles {
            self.release(handle).await;
        }
        if !handles.is_empty() {
            tracing::info!(count = handles.len(), "expired captcha sessions reclaimed");
        }
        Ok(handles.len())
    }

    /// Run [`sweep`](Self::sweep) every `every` until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = orchestrator.sweep().await {
                    tracing::warn!(error = %e, "session sweep failed");
                }
            }
        })
    }

    /// Case type labels the portal's search form offers right now.
    ///
    /// Opens a throwaway browser session under the call ceiling. Empty when
    /// the form asks for the case type as free text.
    pub async fn live_case_types(&self) -> Result<Vec<String>, Error> {
        let session = self.driver.open().await?;
        let handle = session.handle().await?;

        let read = async {
            self.portal.open_search_form(session.as_ref()).await?;
            let html = session.content().await?;
            Ok::<_, Error>(self.portal.case_type_options(&html))
        };
        let result = match tokio::time::timeout(self.policy.ceiling, read).await {
            Ok(result) => result,
            Err(_) => Err(Error::FetchFailed(format!(
                "case types not read within {}ms",
                self.policy.ceiling.as_millis()
            ))),
        };

        self.release(&handle).await;
        result
    }

    /// Read-only cache lookup; never touches the browser.
    pub async fn cached(&self, query: &Query) -> Result<Option<CachedResult>, Error> {
        self.cache.get(&query.fingerprint()).await
    }

    async fn cached_record(&self, fingerprint: &Fingerprint) -> Option<ParsedRecord> {
        match self.cache.get(fingerprint).await {
            Ok(hit) => hit.map(|cached| cached.record),
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "cache unavailable, treating as miss");
                None
            }
        }
    }

    async fn fetch_with_retries(&self, query: &Query, slot: &HandleSlot) -> Outcome {
        let attempts = self.policy.max_attempts;
        let mut attempt = 1;
        loop {
            match self.attempt(query, slot).await {
                Ok(outcome) => return outcome,
                Err(Error::FetchFailed(reason)) if attempt < attempts => {
                    tracing::warn!(query = %query, attempt, error = %reason, "browser fault, retrying with a fresh session");
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(Error::FetchFailed(reason)) => {
                    tracing::warn!(query = %query, attempts, error = %reason, "retries exhausted");
                    return Error::FetchFailed(format!("gave up after {attempts} attempts: {reason}")).into();
                }
                Err(e) => return e.into(),
            }
        }
    }

    /// One run on a fresh session.
    async fn attempt(&self, query: &Query, slot: &HandleSlot) -> Result<Outcome, Error> {
        let session = self.driver.open().await?;
        let handle = session.handle().await?;
        slot.set(handle.clone());
        tracing::debug!(session_id = %handle.session_id, query = %query, "browser session opened");

        let result = self.drive(session.as_ref(), query).await;
        self.settle(slot, &handle, result).await
    }

    async fn drive(&self, session: &dyn BrowserSession, query: &Query) -> Result<Outcome, Error> {
        self.portal.open_search_form(session).await?;
        self.portal.fill_query(session, query).await?;

        let html = session.content().await?;
        let state = match self.portal.detect(&html) {
            Detection::Found(found) => PageState::Captcha(found),
            Detection::Partial { image_selector } => {
                return Err(Error::CaptchaExtraction(format!(
                    "captcha image {image_selector} shown without an answer field"
                )));
            }
            Detection::Absent => {
                self.portal.submit(session).await?;
                self.portal.wait_for_transition(session).await?
            }
        };

        self.conclude(session, query, state).await
    }

    async fn continue_session(&self, pending: &PendingSession, solution: &str, slot: &HandleSlot) -> Outcome {
        let session = match self.driver.restore(&pending.handle).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(token = %pending.token, error = %e, "suspended browser session could not be restored");
                slot.take();
                self.release(&pending.handle).await;
                return Error::from(e).into();
            }
        };

        let result = self.answer(session.as_ref(), pending, solution).await;
        self.settle(slot, &pending.handle, result).await.unwrap_or_else(Outcome::from)
    }

    async fn answer(&self, session: &dyn BrowserSession, pending: &PendingSession, solution: &str) -> Result<Outcome, Error> {
        let html = session.content().await?;
        let input = match self.portal.detect(&html) {
            Detection::Found(found) => found.input_selector,
            _ => return Err(Error::CaptchaExtraction("captcha answer field is no longer on the page".into())),
        };

        if self.portal.shows_search_form(&html) {
            self.portal.fill_query(session, &pending.query).await?;
        }
        session
            .fill(&input, solution)
            .await
            .map_err(|e| Error::CaptchaExtraction(format!("{input}: {e}")))?;
        self.portal.submit(session).await?;

        let state = self.portal.wait_for_transition(session).await?;
        let outcome = self.conclude(session, &pending.query, state).await?;
        if outcome.record().is_some() {
            tracing::info!(token = %pending.token, fingerprint = %pending.fingerprint, "resume completed");
        }
        Ok(outcome)
    }

    /// Turn a settled page into an outcome.
    async fn conclude(&self, session: &dyn BrowserSession, query: &Query, state: PageState) -> Result<Outcome, Error> {
        match state {
            PageState::Captcha(found) => {
                if found.rejected_answer {
                    tracing::info!(query = %query, "portal rejected the captcha answer");
                }
                captcha::interrupt(session, self.sessions.as_ref(), query, &found).await
            }
            PageState::NoRecords => Err(Error::CaseNotFound(format!("portal has no records for {query}"))),
            PageState::Results(html) => {
                let record = self.parser.parse(&html)?;
                if record.case_number != query.case_number() || record.filing_year != query.filing_year() {
                    return Err(Error::ParseFailed(format!(
                        "result page is for {}/{}, expected {query}",
                        record.case_number, record.filing_year
                    )));
                }

                let fingerprint = query.fingerprint();
                if let Err(e) = self.cache.put(&fingerprint, &record).await {
                    tracing::warn!(fingerprint = %fingerprint, error = %e, "result not cached");
                }
                tracing::info!(fingerprint = %fingerprint, status = %record.status, "case record fetched");
                Ok(Outcome::ready(record))
            }
        }
    }

    /// Keep the browser only when the outcome suspends on it.
    async fn settle(
        &self, slot: &HandleSlot, handle: &SessionHandle, result: Result<Outcome, Error>,
    ) -> Result<Outcome, Error> {
        slot.take();
        let suspended = matches!(&result, Ok(outcome) if outcome.challenge().is_some());
        if !suspended {
            self.release(handle).await;
        }
        result
    }

    async fn bounded(&self, slot: &HandleSlot, what: &str, work: impl Future<Output = Outcome>) -> Outcome {
        match tokio::time::timeout(self.policy.ceiling, work).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let ceiling_ms = self.policy.ceiling.as_millis();
                tracing::warn!(what, ceiling_ms = ceiling_ms as u64, "orchestration ceiling reached");
                if let Some(handle) = slot.take() {
                    self.release(&handle).await;
                }
                Error::FetchFailed(format!("{what} did not finish within {ceiling_ms}ms")).into()
            }
        }
    }

    async fn release(&self, handle: &SessionHandle) {
        if let Err(e) = self.driver.release(handle).await {
            tracing::warn!(session_id = %handle.session_id, error = %e, "failed to release browser session");
        }
    }

    async fn finish(&self, query: &Query, outcome: Outcome, cached: bool) -> Outcome {
        self.record(NewQueryLog::for_outcome(query, &outcome, cached)).await;
        outcome
    }

    async fn record(&self, entry: NewQueryLog) {
        let Some(journal) = &self.journal else {
            return;
        };
        if let Err(e) = journal.record(entry).await {
            tracing::warn!(error = %e, "query log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{FixtureOptions, FixturePortal};
    use async_trait::async_trait;
    use courtfetch_core::ErrorKind;

    fn config() -> AppConfig {
        AppConfig {
            fallback_urls: Vec::new(),
            step_timeout_ms: 1_000,
            retry_delay_ms: 10,
            orchestration_timeout_ms: 10_000,
            ..Default::default()
        }
    }

    fn engine_with(options: FixtureOptions, db: CacheDb, config: &AppConfig) -> (Orchestrator, FixturePortal) {
        let portal = FixturePortal::new(options);
        let orchestrator = Orchestrator::new(config, Arc::new(portal.clone()), db).unwrap();
        (orchestrator, portal)
    }

    async fn engine(options: FixtureOptions) -> (Orchestrator, FixturePortal, CacheDb) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (orchestrator, portal) = engine_with(options, db.clone(), &config());
        (orchestrator, portal, db)
    }

    fn writ_petition() -> Query {
        Query::new("Writ Petition", 1234, 2022).unwrap()
    }

    fn kind(outcome: &Outcome) -> Option<ErrorKind> {
        outcome.failure().map(|f| f.kind)
    }

    struct FailingCache;

    #[async_trait]
    impl ResultCache for FailingCache {
        async fn get(&self, _: &Fingerprint) -> Result<Option<CachedResult>, Error> {
            Err(Error::Serialization("cache offline".into()))
        }

        async fn put(&self, _: &Fingerprint, _: &ParsedRecord) -> Result<(), Error> {
            Err(Error::Serialization("cache offline".into()))
        }
    }

    #[tokio::test]
    async fn test_ready_without_captcha() {
        let (orchestrator, portal, db) = engine(FixtureOptions::default()).await;

        let outcome = orchestrator.submit(&writ_petition()).await;
        let record = outcome.record().expect("ready outcome");
        assert_eq!(record.case_number, 1234);
        assert_eq!(record.filing_year, 2022);
        assert_eq!(record.history.len(), 5);
        assert_eq!(portal.live_sessions(), 0);
        assert_eq!(db.count_results().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_browser() {
        let (orchestrator, portal, db) = engine(FixtureOptions::default()).await;
        let first = orchestrator.submit(&writ_petition()).await;
        let second = orchestrator.submit(&writ_petition()).await;

        assert_eq!(first.record(), second.record());
        assert_eq!(portal.opened_sessions(), 1);
        assert!(orchestrator.cached(&writ_petition()).await.unwrap().is_some());

        let stats = db.query_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_captcha_then_correct_answer() {
        let (orchestrator, portal, db) = engine(FixtureOptions::with_captcha("ABC123")).await;

        let outcome = orchestrator.submit(&writ_petition()).await;
        let challenge = outcome.challenge().expect("manual action required").clone();
        assert_eq!(challenge.image.content_type, "image/png");
        assert_eq!(portal.live_sessions(), 1);

        let resumed = orchestrator.resume(&challenge.token, "ABC123").await;
        assert_eq!(resumed.record().map(|r| r.case_number), Some(1234));
        assert_eq!(portal.live_sessions(), 0);
        assert_eq!(portal.opened_sessions(), 1);
        assert_eq!(db.count_active_sessions().await.unwrap(), 0);
        assert_eq!(db.count_results().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wrong_answer_issues_new_token() {
        let (orchestrator, portal, _db) = engine(FixtureOptions::with_captcha("ABC123")).await;

        let first = orchestrator.submit(&writ_petition()).await;
        let first = first.challenge().unwrap().clone();

        let retry = orchestrator.resume(&first.token, "wrong").await;
        let second = retry.challenge().expect("fresh challenge").clone();
        assert_ne!(second.token, first.token);
        assert_ne!(second.image, first.image);
        assert_eq!(portal.opened_sessions(), 1);

        let stale = orchestrator.resume(&first.token, "ABC123").await;
        assert_eq!(kind(&stale), Some(ErrorKind::SessionExpiredError));

        let done = orchestrator.resume(&second.token, "ABC123").await;
        assert!(done.record().is_some());
    }

    #[tokio::test]
    async fn test_captcha_on_search_form() {
        let options = FixtureOptions { captcha_on_form: true, ..FixtureOptions::with_captcha("ABC123") };
        let (orchestrator, portal, _db) = engine(options).await;

        let query = Query::new("Criminal Appeal", 77, 2021).unwrap();
        let outcome = orchestrator.submit(&query).await;
        let token = outcome.challenge().unwrap().token.clone();

        let wrong = orchestrator.resume(&token, "nope").await;
        let token = wrong.challenge().expect("re-challenged on the form").token.clone();

        let done = orchestrator.resume(&token, "ABC123").await;
        let record = done.record().expect("ready");
        assert_eq!(record.case_type, "Criminal Appeal");
        assert_eq!(record.case_number, 77);
        assert_eq!(portal.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_submits_share_one_run() {
        let (orchestrator, portal, _db) = engine(FixtureOptions::default()).await;
        let query = writ_petition();

        let (a, b) = tokio::join!(orchestrator.submit(&query), orchestrator.submit(&query));
        assert!(a.record().is_some());
        assert_eq!(a.record(), b.record());
        assert_eq!(portal.opened_sessions(), 1);
        assert_eq!(orchestrator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_submits_share_one_challenge() {
        let (orchestrator, portal, _db) = engine(FixtureOptions::with_captcha("ABC123")).await;
        let query = writ_petition();

        let (a, b) = tokio::join!(orchestrator.submit(&query), orchestrator.submit(&query));
        let (a, b) = (a.challenge().unwrap(), b.challenge().unwrap());
        assert_eq!(a.token, b.token);
        assert_eq!(a.image, b.image);
        assert_eq!(portal.opened_sessions(), 1);
    }

    #[tokio::test]
    async fn test_transient_fault_then_success() {
        let (orchestrator, portal, _db) = engine(FixtureOptions { fail_navigations: 1, ..Default::default() }).await;

        let outcome = orchestrator.submit(&writ_petition()).await;
        assert!(outcome.record().is_some());
        assert_eq!(portal.opened_sessions(), 2);
        assert_eq!(portal.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (orchestrator, portal, db) = engine(FixtureOptions { fail_navigations: 100, ..Default::default() }).await;

        let outcome = orchestrator.submit(&writ_petition()).await;
        assert_eq!(kind(&outcome), Some(ErrorKind::FetchError));
        assert!(outcome.failure().unwrap().message.contains("3 attempts"));
        assert_eq!(portal.opened_sessions(), 3);
        assert_eq!(portal.live_sessions(), 0);
        assert_eq!(db.count_results().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_records_is_terminal() {
        let (orchestrator, portal, _db) = engine(FixtureOptions { no_records: true, ..Default::default() }).await;

        let outcome = orchestrator.submit(&writ_petition()).await;
        assert_eq!(kind(&outcome), Some(ErrorKind::CaseNotFound));
        assert_eq!(portal.opened_sessions(), 1);
        assert_eq!(portal.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_missing_status_is_parse_error_and_not_cached() {
        let (orchestrator, portal, db) = engine(FixtureOptions { missing_status: true, ..Default::default() }).await;

        let outcome = orchestrator.submit(&writ_petition()).await;
        assert_eq!(kind(&outcome), Some(ErrorKind::ParseError));
        assert_eq!(portal.opened_sessions(), 1);
        assert_eq!(db.count_results().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failing_cache_is_a_miss() {
        let portal = FixturePortal::new(FixtureOptions::default());
        let db = Arc::new(CacheDb::open_in_memory().await.unwrap());
        let orchestrator =
            Orchestrator::with_stores(&config(), Arc::new(portal.clone()), Arc::new(FailingCache), db).unwrap();

        let first = orchestrator.submit(&writ_petition()).await;
        let second = orchestrator.submit(&writ_petition()).await;
        assert!(first.record().is_some());
        assert!(second.record().is_some());
        assert_eq!(portal.opened_sessions(), 2);
    }

    #[tokio::test]
    async fn test_resume_keeps_session_visible_until_gate_is_free() {
        let (orchestrator, portal, db) = engine(FixtureOptions::with_captcha("ABC123")).await;
        let query = writ_petition();
        let outcome = orchestrator.submit(&query).await;
        let token = outcome.challenge().unwrap().token.clone();

        let guard = orchestrator.gate.acquire(&query.fingerprint()).await;
        let (resumed, still_pending) = tokio::join!(orchestrator.resume(&token, "ABC123"), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let still_pending = db.get_session(&token).await.unwrap().is_some();
            drop(guard);
            still_pending
        });

        assert!(still_pending);
        assert!(resumed.record().is_some());
        assert_eq!(portal.opened_sessions(), 1);
        assert_eq!(db.count_active_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_live_case_types() {
        let (orchestrator, portal, _db) = engine(FixtureOptions::default()).await;

        let labels = orchestrator.live_case_types().await.unwrap();
        assert_eq!(labels[0], "Civil Appeal");
        assert!(labels.contains(&"LPA (Letters Patent Appeal)".to_string()));
        assert!(!labels.iter().any(|l| l.starts_with("Select")));
        assert_eq!(portal.opened_sessions(), 1);
        assert_eq!(portal.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_live_case_types_unreachable_portal() {
        let (orchestrator, portal, _db) = engine(FixtureOptions { fail_navigations: 100, ..Default::default() }).await;

        let result = orchestrator.live_case_types().await;
        assert!(matches!(result, Err(Error::FetchFailed(_))));
        assert_eq!(portal.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let db = CacheDb::open_in_memory().await.unwrap().with_ttl(chrono::Duration::hours(24), chrono::Duration::zero());
        let (orchestrator, portal) = engine_with(FixtureOptions::with_captcha("ABC123"), db, &config());

        let outcome = orchestrator.submit(&writ_petition()).await;
        let token = outcome.challenge().unwrap().token.clone();

        let resumed = orchestrator.resume(&token, "ABC123").await;
        assert_eq!(kind(&resumed), Some(ErrorKind::SessionExpiredError));
        assert_eq!(portal.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_unknown_token_and_empty_answer() {
        let (orchestrator, _portal, db) = engine(FixtureOptions::with_captcha("ABC123")).await;

        let unknown = orchestrator.resume("deadbeef", "ABC123").await;
        assert_eq!(kind(&unknown), Some(ErrorKind::SessionExpiredError));

        let outcome = orchestrator.submit(&writ_petition()).await;
        let token = outcome.challenge().unwrap().token.clone();
        let empty = orchestrator.resume(&token, "   ").await;
        assert_eq!(kind(&empty), Some(ErrorKind::InvalidQuery));
        assert!(db.get_session(&token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_abandon() {
        let (orchestrator, portal, _db) = engine(FixtureOptions::with_captcha("ABC123")).await;
        let outcome = orchestrator.submit(&writ_petition()).await;
        let token = outcome.challenge().unwrap().token.clone();

        assert!(orchestrator.abandon(&token).await.unwrap());
        assert_eq!(portal.live_sessions(), 0);
        assert!(!orchestrator.abandon(&token).await.unwrap());

        let resumed = orchestrator.resume(&token, "ABC123").await;
        assert_eq!(kind(&resumed), Some(ErrorKind::SessionExpiredError));
    }

    #[tokio::test]
    async fn test_sweep_releases_expired_sessions() {
        let db = CacheDb::open_in_memory().await.unwrap().with_ttl(chrono::Duration::hours(24), chrono::Duration::zero());
        let (orchestrator, portal) = engine_with(FixtureOptions::with_captcha("ABC123"), db, &config());

        orchestrator.submit(&writ_petition()).await;
        assert_eq!(portal.live_sessions(), 1);

        assert_eq!(orchestrator.sweep().await.unwrap(), 1);
        assert_eq!(portal.live_sessions(), 0);
        assert_eq!(orchestrator.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lost_browser_on_resume() {
        let (orchestrator, portal, db) = engine(FixtureOptions::with_captcha("ABC123")).await;
        let outcome = orchestrator.submit(&writ_petition()).await;
        let token = outcome.challenge().unwrap().token.clone();

        let handle = db.get_session(&token).await.unwrap().unwrap().handle;
        portal.release(&handle).await.unwrap();

        let resumed = orchestrator.resume(&token, "ABC123").await;
        assert_eq!(kind(&resumed), Some(ErrorKind::FetchError));
    }

    #[tokio::test]
    async fn test_ceiling_releases_browser() {
        let mut config = config();
        config.orchestration_timeout_ms = 300;
        config.step_timeout_ms = 5_000;
        config.selectors.form_ready = vec!["#never-rendered".into()];

        let db = CacheDb::open_in_memory().await.unwrap();
        let (orchestrator, portal) = engine_with(FixtureOptions::default(), db, &config);

        let outcome = orchestrator.submit(&writ_petition()).await;
        assert_eq!(kind(&outcome), Some(ErrorKind::FetchError));
        assert_eq!(portal.opened_sessions(), 1);
        assert_eq!(portal.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_invalid_form_input_never_opens_browser() {
        let (orchestrator, portal, db) = engine(FixtureOptions::default()).await;

        let outcome = orchestrator.submit_form("Civil Appeal", "12a", "2020").await;
        assert_eq!(kind(&outcome), Some(ErrorKind::InvalidQuery));
        assert_eq!(portal.opened_sessions(), 0);

        let log = db.recent_queries(10).await.unwrap();
        assert_eq!(log[0].case_number, "12a");
        assert_eq!(log[0].outcome, "failed");
    }

    #[tokio::test]
    async fn test_unknown_case_type_is_not_retried() {
        let (orchestrator, portal, _db) = engine(FixtureOptions::default()).await;

        let outcome = orchestrator.submit(&Query::new("Martian Appeal", 1, 2022).unwrap()).await;
        assert_eq!(kind(&outcome), Some(ErrorKind::InvalidQuery));
        assert_eq!(portal.opened_sessions(), 1);
    }
}
