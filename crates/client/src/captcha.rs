//! CAPTCHA Interrupt Handler.
//!
//! Detection is a pure check over page HTML against the selector table. An
//! interrupt captures the challenge image, persists the live session behind
//! a fresh token and hands back `ManualActionRequired`; the browser stays
//! open until the token is resumed, abandoned or swept.

use courtfetch_core::{Error, Outcome, Query, SelectorTable, SessionStore};
use scraper::Html;

use crate::browser::BrowserSession;
use crate::portal::{first_match, page_text};

/// Selectors that located a challenge on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaFound {
    pub image_selector: String,
    pub input_selector: String,
    /// The page also says the previous answer was wrong.
    pub rejected_answer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Absent,
    /// An image matched but no input did: a challenge we cannot answer.
    Partial { image_selector: String },
    Found(CaptchaFound),
}

/// Look for a CAPTCHA using every image and input strategy in table order.
pub fn detect_captcha(html: &str, selectors: &SelectorTable) -> Detection {
    let document = Html::parse_document(html);
    let Some(image) = first_match(&document, &selectors.captcha_image) else {
        return Detection::Absent;
    };
    let Some(input) = first_match(&document, &selectors.captcha_input) else {
        return Detection::Partial { image_selector: image.to_string() };
    };

    let text = page_text(&document);
    let rejected_answer = selectors.captcha_error_text.iter().any(|t| text.contains(&t.to_lowercase()));

    tracing::debug!(image_selector = image, input_selector = input, rejected_answer, "captcha detected");
    Detection::Found(CaptchaFound {
        image_selector: image.to_string(),
        input_selector: input.to_string(),
        rejected_answer,
    })
}

/// Suspend the orchestration on a detected challenge.
///
/// Returns `CaptchaExtraction` when the image cannot be captured. The caller
/// keeps the browser session alive only when this returns `Ok`.
pub async fn interrupt(
    session: &dyn BrowserSession, store: &dyn SessionStore, query: &Query, found: &CaptchaFound,
) -> Result<Outcome, Error> {
    let image = session
        .screenshot_element(&found.image_selector)
        .await
        .map_err(|e| Error::CaptchaExtraction(format!("{}: {e}", found.image_selector)))?;
    if image.data.is_empty() {
        return Err(Error::CaptchaExtraction(format!("{}: empty image", found.image_selector)));
    }

    let handle = session.handle().await?;
    let pending = store.create(query, &handle, &image).await?;

    tracing::info!(
        fingerprint = %pending.fingerprint,
        token = %pending.token,
        session_id = %handle.session_id,
        expires_at = %pending.expires_at,
        "captcha challenge suspended"
    );
    Ok(Outcome::manual(pending.challenge()))
}
