//! `text_utils` tool operations.

use base64::Engine as _;
use serde_json::{json, Value};
use toolpipe_core::{Error, Result};

pub const DEFAULT_TRUNCATE_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    WordCount,
    CharCount,
    Uppercase,
    Lowercase,
    TitleCase,
    Reverse,
    Base64Encode,
    Base64Decode,
    UrlEncode,
    UrlDecode,
    Slugify,
    Truncate,
}

impl TextOp {
    pub const ALL: &'static [&'static str] = &[
        "wordCount",
        "charCount",
        "uppercase",
        "lowercase",
        "titleCase",
        "reverse",
        "base64Encode",
        "base64Decode",
        "urlEncode",
        "urlDecode",
        "slugify",
        "truncate",
    ];

    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "wordCount" => Self::WordCount,
            "charCount" => Self::CharCount,
            "uppercase" => Self::Uppercase,
            "lowercase" => Self::Lowercase,
            "titleCase" => Self::TitleCase,
            "reverse" => Self::Reverse,
            "base64Encode" => Self::Base64Encode,
            "base64Decode" => Self::Base64Decode,
            "urlEncode" => Self::UrlEncode,
            "urlDecode" => Self::UrlDecode,
            "slugify" => Self::Slugify,
            "truncate" => Self::Truncate,
            other => {
                return Err(Error::InvalidParams(format!(
                    "unknown operation {other:?} (allowed: {})",
                    Self::ALL.join(", ")
                )))
            }
        })
    }
}

/// Result fields for one operation (merged into the tool payload next to `success`/`operation`).
pub fn apply(op: TextOp, text: &str, max_length: Option<usize>) -> Result<Value> {
    Ok(match op {
        TextOp::WordCount => json!({ "result": text.split_whitespace().count() }),
        TextOp::CharCount => json!({
            "withSpaces": text.chars().count(),
            "withoutSpaces": text.chars().filter(|c| !c.is_whitespace()).count(),
        }),
        TextOp::Uppercase => json!({ "result": text.to_uppercase() }),
        TextOp::Lowercase => json!({ "result": text.to_lowercase() }),
        TextOp::TitleCase => json!({ "result": title_case(text) }),
        TextOp::Reverse => json!({ "result": text.chars().rev().collect::<String>() }),
        TextOp::Base64Encode => {
            json!({ "result": base64::engine::general_purpose::STANDARD.encode(text) })
        }
        TextOp::Base64Decode => json!({ "result": base64_decode(text)? }),
        TextOp::UrlEncode => json!({ "result": urlencoding::encode(text) }),
        TextOp::UrlDecode => {
            let s = urlencoding::decode(text)
                .map_err(|e| Error::Tool(format!("URI malformed: {e}")))?;
            json!({ "result": s })
        }
        TextOp::Slugify => json!({ "result": slugify(text) }),
        TextOp::Truncate => {
            json!({ "result": truncate(text, max_length.unwrap_or(DEFAULT_TRUNCATE_CHARS)) })
        }
    })
}

fn base64_decode(text: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|e| Error::Tool(format!("invalid base64: {e}")))?;
    String::from_utf8(bytes).map_err(|_| Error::Tool("decoded bytes are not UTF-8".to_string()))
}

/// Uppercase the first char of every whitespace-separated word, lowercase the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            at_word_start = false;
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Lowercase; drop everything except ASCII word chars, whitespace, and `-`; whitespace runs
/// and hyphen runs become a single `-`.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash {
                out.push('-');
                pending_dash = false;
            }
            out.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    if pending_dash {
        out.push('-');
    }
    out
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
