//! Document link harvesting from result pages.

use courtfetch_core::{Document, DocumentKind};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

const DOCUMENT_WORDS: &[&str] = &["order", "judgment", "judgement", "notice", "document", "download"];

fn is_document(href: &str, text: &str) -> bool {
    let href = href.to_lowercase();
    let text = text.to_lowercase();
    href.contains("pdf") || DOCUMENT_WORDS.iter().any(|w| text.contains(w))
}

/// Extract document links from a result page, resolving relative URLs
/// against the base URL.
///
/// Links are kept in page order and de-duplicated by resolved URL, keeping
/// the first occurrence.
pub fn extract_documents(document: &Html, base_url: &Url) -> Vec<Document> {
    let selector = Selector::parse("a[href]").expect("invalid selector");

    let mut seen = HashSet::new();
    let mut documents = Vec::new();

    for element in document.select(&selector) {
        let href = match element.value().attr("href") {
            Some(h) => h.trim(),
            None => continue,
        };
        if href.is_empty() || href.starts_with('#') || href.to_lowercase().starts_with("javascript:") {
            continue;
        }

        let text = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !is_document(href, &text) {
            continue;
        }

        let resolved = match base_url.join(href) {
            Ok(u) => u.to_string(),
            Err(_) => continue,
        };

        if !seen.insert(resolved.clone()) {
            continue;
        }

        let label = if text.is_empty() { "Court Document".to_string() } else { text };
        let kind = DocumentKind::classify(&label);
        documents.push(Document { label, url: resolved, kind });
    }

    documents
}
