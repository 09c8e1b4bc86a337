//! Portal connectivity probe and document download.
//!
//! Plain HTTP, independent of the browser: GET the portal's base URL, search
//! page and fallbacks in order and report the first one that answers, or
//! download a document a case record links to.

use std::time::{Duration, Instant};

use courtfetch_core::{AppConfig, Error};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use url::Url;

/// Largest document body buffered in memory.
const MAX_DOCUMENT_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalStatus {
    Reachable,
    Unreachable,
    /// Demo mode: the fixture portal answers, nothing is contacted.
    Demo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub status: PortalStatus,
    /// The URL that answered, if any.
    pub url: Option<String>,
    pub http_status: Option<u16>,
    /// URLs tried, in order, with the reason each one failed.
    pub attempts: Vec<ProbeAttempt>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeAttempt {
    pub url: String,
    pub error: String,
}

/// A document downloaded from the portal.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects.
    pub url: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

pub struct PortalProbe {
    http: Client,
    urls: Vec<String>,
    /// The first URL; documents must live on its host.
    base: Option<Url>,
    demo: bool,
}

impl PortalProbe {
    pub fn new(urls: Vec<String>, user_agent: &str, timeout: Duration) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::FetchFailed(format!("failed to build HTTP client: {e}")))?;
        let base = urls.first().and_then(|url| Url::parse(url).ok());
        Ok(Self { http, urls, base, demo: false })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let mut urls = vec![config.portal_base_url.clone()];
        urls.extend(config.entry_urls().map(str::to_string));
        urls.dedup();

        let mut probe = Self::new(urls, &config.user_agent, config.step_timeout())?;
        probe.demo = config.demo_mode;
        Ok(probe)
    }

    pub async fn check(&self) -> ProbeReport {
        let start = Instant::now();
        if self.demo {
            return ProbeReport {
                status: PortalStatus::Demo,
                url: None,
                http_status: None,
                attempts: Vec::new(),
                elapsed_ms: 0,
            };
        }

        let mut attempts = Vec::new();
        let mut last_status = None;

        for url in &self.urls {
            let response = self
                .http
                .get(url)
                .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    let status = response.status().as_u16();
                    tracing::debug!(url = %url, status, "portal reachable");
                    return ProbeReport {
                        status: PortalStatus::Reachable,
                        url: Some(url.clone()),
                        http_status: Some(status),
                        attempts,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    };
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    last_status = Some(status);
                    attempts.push(ProbeAttempt { url: url.clone(), error: format!("status {status}") });
                }
                Err(e) => {
                    attempts.push(ProbeAttempt { url: url.clone(), error: format!("network error: {e}") });
                }
            }
        }

        tracing::warn!(tried = attempts.len(), "portal unreachable");
        ProbeReport {
            status: PortalStatus::Unreachable,
            url: None,
            http_status: last_status,
            attempts,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Download a document linked from a case record.
    ///
    /// Relative links resolve against the portal base URL. Links to any other
    /// host are `InvalidInput`; redirects off the portal are `FetchFailed`.
    /// Demo mode returns a generated one-page PDF without any network access.
    pub async fn fetch_document(&self, link: &str) -> Result<FetchedDocument, Error> {
        let base = self.base.as_ref().ok_or_else(|| Error::InvalidInput("no portal URL configured".into()))?;
        let url = resolve_document(base, link)?;

        if self.demo {
            return Ok(FetchedDocument {
                url: url.to_string(),
                content_type: "application/pdf".to_string(),
                data: demo_pdf(url.path()),
            });
        }

        let response = self
            .http
            .get(url.clone())
            .header("Accept", "application/pdf,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| Error::FetchFailed(format!("{url}: {e}")))?;

        let final_url = response.url().clone();
        if !same_site(base, &final_url) {
            return Err(Error::FetchFailed(format!("{url} redirected off the portal to {final_url}")));
        }
        if !response.status().is_success() {
            return Err(Error::FetchFailed(format!("{final_url}: status {}", response.status().as_u16())));
        }
        if response.content_length().is_some_and(|len| len > MAX_DOCUMENT_BYTES) {
            return Err(Error::FetchFailed(format!("{final_url}: larger than {MAX_DOCUMENT_BYTES} bytes")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let data = response.bytes().await.map_err(|e| Error::FetchFailed(format!("{final_url}: {e}")))?;
        if data.len() as u64 > MAX_DOCUMENT_BYTES {
            return Err(Error::FetchFailed(format!("{final_url}: larger than {MAX_DOCUMENT_BYTES} bytes")));
        }

        tracing::info!(url = %final_url, bytes = data.len(), content_type = %content_type, "document fetched");
        Ok(FetchedDocument { url: final_url.to_string(), content_type, data: data.to_vec() })
    }
}

fn resolve_document(base: &Url, link: &str) -> Result<Url, Error> {
    let link = link.trim();
    if link.is_empty() {
        return Err(Error::InvalidInput("document url is required".into()));
    }
    let url = base.join(link).map_err(|e| Error::InvalidInput(format!("invalid document url {link}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!("unsupported scheme in {url}")));
    }
    if !same_site(base, &url) {
        return Err(Error::InvalidInput(format!(
            "{url} is not on the portal host {}",
            base.host_str().unwrap_or_default()
        )));
    }
    Ok(url)
}

/// Same host as the portal, or one of its subdomains.
fn same_site(base: &Url, url: &Url) -> bool {
    let (Some(portal), Some(host)) = (base.host_str(), url.host_str()) else {
        return false;
    };
    let (portal, host) = (portal.to_ascii_lowercase(), host.to_ascii_lowercase());
    host == portal || host.ends_with(&format!(".{portal}"))
}

/// A one-page PDF naming the requested path.
fn demo_pdf(path: &str) -> Vec<u8> {
    let name: String = path.chars().filter(|c| c.is_ascii_graphic() && !matches!(*c, '(' | ')' | '\\')).collect();
    let stream = format!("BT /F1 12 Tf 72 720 Td (Demo document {name}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{body}\nendobj\n", index + 1));
    }
    let xref = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!("trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n", objects.len() + 1));
    pdf.into_bytes()
}
