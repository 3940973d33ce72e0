//! Message text cleanup applied by record sources before handing records to the vault.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[allow(clippy::expect_used)]
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("valid url regex"));
#[allow(clippy::expect_used)]
static TRAILING_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.,;!?)]+$").expect("valid punctuation regex"));
#[allow(clippy::expect_used)]
static LINK_ARTIFACT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"http\S*|\[link\]|\[/link\]|\(link\)|\(/link\)").expect("valid artifact regex")
});
#[allow(clippy::expect_used)]
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
#[allow(clippy::expect_used)]
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#?[A-Za-z0-9]+;").expect("valid entity regex"));

/// Cleaned body plus what was stripped from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredBody {
    pub clean_text: String,
    pub urls: Vec<String>,
    pub length: usize,
}

/// URLs in `text`, with trailing punctuation trimmed.
#[must_use]
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_RE
        .find_iter(text)
        .map(|m| TRAILING_PUNCT_RE.replace(m.as_str(), "").into_owned())
        .filter(|url| !url.is_empty())
        .collect()
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    ENTITY_RE.replace_all(text, |caps: &regex::Captures<'_>| {
        let entity = &caps[0];
        unescape_with(entity, resolve_html5_entity)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| entity.to_string())
    })
}

/// Strip URLs, link markers, zero-width characters and HTML entities; collapse whitespace.
#[must_use]
pub fn clean_body(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut cleaned = text.to_string();
    for url in extract_urls(text) {
        cleaned = cleaned.replace(&url, "");
    }
    let cleaned = WHITESPACE_RE.replace_all(&cleaned, " ");
    let cleaned = decode_entities(&cleaned);
    let cleaned = cleaned.replace(['\u{200c}', '\u{feff}'], "");
    let cleaned = LINK_ARTIFACT_RE.replace_all(&cleaned, "");
    WHITESPACE_RE.replace_all(&cleaned, " ").trim().to_string()
}

#[must_use]
pub fn structure_body(raw: &str) -> StructuredBody {
    let urls = extract_urls(raw);
    let clean_text = clean_body(raw);
    StructuredBody {
        length: clean_text.chars().count(),
        clean_text,
        urls,
    }
}

/// Parse an RFC 2822 `Date` header.
///
/// Accepts the forms seen in the wild: single-digit days, obsolete named zones, `UTC`,
/// and a trailing parenthesized zone comment (`... +0000 (UTC)`), which is also used as
/// the zone when the main part carries none.
#[must_use]
pub fn parse_mail_date(header: &str) -> Option<DateTime<Utc>> {
    let header = header.trim();
    if header.is_empty() {
        return None;
    }
    let (main, comment) = match header.split_once('(') {
        Some((main, rest)) => (main.trim(), rest.split(')').next().map(str::trim)),
        None => (header, None),
    };

    let mut candidates = vec![normalize_zone(main)];
    if let Some(zone) = comment.filter(|zone| !zone.is_empty()) {
        candidates.push(normalize_zone(&format!("{main} {zone}")));
    }
    for candidate in &candidates {
        if let Ok(parsed) = DateTime::parse_from_rfc2822(candidate) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    tracing::debug!(header, "unparseable date header");
    None
}

fn normalize_zone(value: &str) -> String {
    match value.strip_suffix(" UTC") {
        Some(stripped) => format!("{stripped} +0000"),
        None => value.to_string(),
    }
}
