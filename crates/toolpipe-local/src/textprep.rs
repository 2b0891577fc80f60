//! Minimal, deterministic text normalization for markup fragments.
//!
//! Lossy on purpose: the output is display text for search snippets, not something to
//! round-trip back into HTML.

/// Longest entity body we try to decode (`&` + body + `;`).
const MAX_ENTITY_LEN: usize = 32;

/// Markup fragment -> single-line display text.
///
/// - decodes HTML entities (single pass, so `&amp;lt;` yields the text `&lt;`)
/// - replaces every tag with a space
/// - replaces any stray `<`/`>` (unterminated tags, decoded `&lt;`) with a space
/// - collapses whitespace runs and trims
///
/// Never fails; empty input yields an empty string.
pub fn normalize(fragment: &str) -> String {
    if fragment.is_empty() {
        return String::new();
    }
    let decoded = decode_entities(fragment);
    let stripped = strip_tags(&decoded);
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match entity_body(after) {
            Some(body) => {
                out.push(decode_entity(body));
                rest = &after[body.len() + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity_body(after_amp: &str) -> Option<&str> {
    let len = after_amp
        .bytes()
        .take(MAX_ENTITY_LEN + 1)
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'#')
        .count();
    if len == 0 || len > MAX_ENTITY_LEN || after_amp.as_bytes().get(len) != Some(&b';') {
        return None;
    }
    Some(&after_amp[..len])
}

fn decode_entity(body: &str) -> char {
    match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        _ => {
            let code = if let Some(hex) = body
                .strip_prefix("#x")
                .or_else(|| body.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok()
            } else {
                None
            };
            code.filter(|c| *c != 0)
                .and_then(char::from_u32)
                .unwrap_or(' ')
        }
    }
}

/// Replace `<...>` spans (and lone angle brackets) with a space.
pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find(['<', '>']) {
        out.push_str(&rest[..pos]);
        out.push(' ');
        let tail = &rest[pos + 1..];
        if rest.as_bytes()[pos] == b'<' {
            rest = match tail.find('>') {
                Some(gt) => &tail[gt + 1..],
                None => tail,
            };
        } else {
            rest = tail;
        }
    }
    out.push_str(rest);
    out
}
