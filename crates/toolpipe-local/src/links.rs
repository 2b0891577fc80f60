//! Redirect unwrapping for search-result hrefs.
//!
//! Result anchors point at the engine's own redirector (`//duckduckgo.com/l/?uddg=<dest>&rut=…`)
//! rather than at the destination. The two surfaces encode this slightly differently, so each
//! rule below stands on its own.

const REDIRECT_BASE: &str = "https://duckduckgo.com";
const REDIRECT_PATH_PREFIX: &str = "/l/?uddg=";
const INTERNAL_MARKERS: &[&str] = &["duckduckgo.com/y.js", "duckduckgo-help-pages"];

/// Raw result href -> absolute destination URL, or `""` when the link is not a usable
/// external result (ads, help pages, site-relative paths).
///
/// Never returns a value beginning with `/`.
pub fn resolve_url(raw_href: &str) -> String {
    let href = raw_href.trim().replace("&amp;", "&");
    if href.is_empty() {
        return String::new();
    }
    let out = resolve_inner(&href);
    if out.starts_with('/') {
        return String::new();
    }
    out
}

fn resolve_inner(href: &str) -> String {
    if href.contains("uddg=") {
        if let Some(dest) = uddg_param(href) {
            return dest;
        }
    }

    if let Some(encoded) = href.strip_prefix(REDIRECT_PATH_PREFIX) {
        let segment = encoded.split('&').next().unwrap_or_default();
        return match urlencoding::decode(segment) {
            Ok(dest) => dest.trim().to_string(),
            Err(_) => String::new(),
        };
    }

    if href.starts_with('/') || INTERNAL_MARKERS.iter().any(|m| href.contains(m)) {
        return String::new();
    }

    href.to_string()
}

fn uddg_param(href: &str) -> Option<String> {
    let base = url::Url::parse(REDIRECT_BASE).ok()?;
    let joined = base.join(href).ok()?;
    joined
        .query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
