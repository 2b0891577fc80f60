//! `web_fetch` shaping: status check, JSON pretty-printing, and text truncation on top of a
//! [`FetchBackend`].

use serde::Serialize;
use toolpipe_core::{Error, FetchBackend, FetchRequest, FetchResponse, Result};

/// Text bodies longer than this (in chars) are cut and marked.
pub const MAX_TEXT_CHARS: usize = 10_000;
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated...]";
pub const FETCH_TIMEOUT_MS: u64 = 20_000;
/// Byte cap on the raw body; well above what survives truncation.
pub const FETCH_MAX_BYTES: u64 = 2_000_000;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FetchedPage {
    pub url: String,
    pub content_type: String,
    pub content: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// Only absolute http(s) URLs are fetched.
pub fn parse_fetch_url(raw: &str) -> Result<url::Url> {
    let u = url::Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;
    match u.scheme() {
        "http" | "https" => Ok(u),
        other => Err(Error::InvalidUrl(format!(
            "unsupported scheme {other:?} (must include http:// or https://)"
        ))),
    }
}

pub async fn web_fetch(backend: &dyn FetchBackend, raw_url: &str) -> Result<FetchedPage> {
    let url = parse_fetch_url(raw_url)?;
    let req = FetchRequest {
        url: url.to_string(),
        timeout_ms: Some(FETCH_TIMEOUT_MS),
        max_bytes: Some(FETCH_MAX_BYTES),
    };
    let resp = backend.fetch(&req).await?;
    shape_response(raw_url.trim(), &resp)
}

pub fn shape_response(requested_url: &str, resp: &FetchResponse) -> Result<FetchedPage> {
    if !resp.is_success() {
        return Err(Error::Fetch(format!(
            "HTTP {}: {}",
            resp.status,
            resp.reason.as_deref().unwrap_or_default()
        )));
    }

    let content_type = resp.content_type.clone().unwrap_or_default();
    if content_type.to_ascii_lowercase().contains("application/json") {
        let v: serde_json::Value = serde_json::from_slice(&resp.bytes)
            .map_err(|e| Error::Fetch(format!("invalid JSON body: {e}")))?;
        let content =
            serde_json::to_string_pretty(&v).map_err(|e| Error::Fetch(e.to_string()))?;
        return Ok(FetchedPage {
            url: requested_url.to_string(),
            content_type,
            content,
            truncated: false,
        });
    }

    let (content, truncated) = truncate_text(&resp.text_lossy(), MAX_TEXT_CHARS);
    Ok(FetchedPage {
        url: requested_url.to_string(),
        content_type,
        content,
        truncated: truncated || resp.truncated,
    })
}

fn truncate_text(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => (format!("{}{TRUNCATION_MARKER}", &text[..cut]), true),
        None => (text.to_string(), false),
    }
}
