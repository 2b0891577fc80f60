//! Result-page extractors for the two DuckDuckGo surfaces.
//!
//! Both extractors scan raw markup with `regex` (no DOM): inert blocks are dropped first, then
//! `<a>`/`<td>` elements are matched flat and filtered by class token. They share the element
//! scan, the normalizer and the URL resolver, but never each other's matching rules.

mod html;
mod lite;

pub use html::extract_primary;
pub use lite::extract_fallback;

use crate::links::resolve_url;
use crate::textprep::normalize;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::OnceLock;
use toolpipe_core::SearchResult;

/// Upper bound on candidates taken from one page, before `maxResults` trimming.
pub const MAX_CANDIDATES: usize = 15;

static INERT_RE: OnceLock<Regex> = OnceLock::new();
static ANCHOR_RE: OnceLock<Regex> = OnceLock::new();
static CELL_RE: OnceLock<Regex> = OnceLock::new();
static ATTR_RE: OnceLock<Regex> = OnceLock::new();

// Attribute run of a start tag: quoted values may contain `>`.
const ATTRS: &str = r#"((?:[^>"']|"[^"]*"|'[^']*')*)"#;

fn get_inert_re() -> &'static Regex {
    INERT_RE.get_or_init(|| {
        Regex::new(r"(?is)<!--.*?-->|<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
            .expect("inert block regex")
    })
}

fn get_anchor_re() -> &'static Regex {
    ANCHOR_RE.get_or_init(|| {
        Regex::new(&format!(r"(?is)<a\b{ATTRS}>(.*?)</a\s*>")).expect("anchor regex")
    })
}

fn get_cell_re() -> &'static Regex {
    CELL_RE.get_or_init(|| {
        Regex::new(&format!(r"(?is)<td\b{ATTRS}>(.*?)</td\s*>")).expect("cell regex")
    })
}

fn get_attr_re() -> &'static Regex {
    ATTR_RE.get_or_init(|| {
        Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*(?:=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
            .expect("attribute regex")
    })
}

/// Comments, `<script>` and `<style>` bodies removed so their contents never match as elements.
fn strip_inert(html: &str) -> Cow<'_, str> {
    get_inert_re().replace_all(html, " ")
}

/// One flat element match: raw attribute run and raw inner markup.
#[derive(Debug, Clone, Copy)]
struct Element<'a> {
    attrs: &'a str,
    inner: &'a str,
}

impl<'a> Element<'a> {
    /// Raw attribute value (entities are not decoded).
    fn attr(&self, name: &str) -> Option<&'a str> {
        get_attr_re()
            .captures_iter(self.attrs)
            .find(|c| c.get(1).is_some_and(|n| n.as_str().eq_ignore_ascii_case(name)))
            .map(|c| {
                c.get(2)
                    .or_else(|| c.get(3))
                    .or_else(|| c.get(4))
                    .map_or("", |m| m.as_str())
            })
    }

    /// Exact class-token match: `has_class("result__a")` does not match `result__url`.
    fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|t| t == class))
    }
}

fn elements<'a>(re: &'static Regex, html: &'a str) -> impl Iterator<Item = Element<'a>> + 'a {
    re.captures_iter(html).filter_map(|c| {
        Some(Element {
            attrs: c.get(1)?.as_str(),
            inner: c.get(2)?.as_str(),
        })
    })
}

/// `<a>` elements in document order.
fn anchors(html: &str) -> impl Iterator<Item = Element<'_>> + '_ {
    elements(get_anchor_re(), html)
}

/// `<td>` elements in document order.
fn cells(html: &str) -> impl Iterator<Item = Element<'_>> + '_ {
    elements(get_cell_re(), html)
}

/// Raw href + inner markup -> cleaned candidate (possibly with empty fields).
fn candidate(raw_href: &str, title_markup: &str, snippet_markup: &str) -> SearchResult {
    SearchResult {
        title: normalize(title_markup),
        url: resolve_url(raw_href),
        snippet: normalize(snippet_markup),
    }
}

/// Ordered, URL-deduplicated accumulator capped at [`MAX_CANDIDATES`].
#[derive(Debug, Default)]
struct ResultSet {
    seen: HashSet<String>,
    items: Vec<SearchResult>,
}

impl ResultSet {
    fn is_full(&self) -> bool {
        self.items.len() >= MAX_CANDIDATES
    }

    /// Returns whether the candidate was kept.
    fn push(&mut self, r: SearchResult) -> bool {
        if self.is_full() || r.url.is_empty() || r.title.is_empty() {
            return false;
        }
        if !self.seen.insert(r.url.clone()) {
            return false;
        }
        self.items.push(r);
        true
    }

    fn into_vec(self) -> Vec<SearchResult> {
        self.items
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Markup shaped like the live surfaces, trimmed to what the extractors look at.

    pub(crate) fn redirect(dest: &str) -> String {
        format!(
            "//duckduckgo.com/l/?uddg={}&amp;rut=7f3c",
            urlencoding::encode(dest)
        )
    }

    pub(crate) fn html_result(dest: &str, title: &str, snippet: &str) -> String {
        let href = redirect(dest);
        format!(
            r#"<div class="result results_links results_links_deep web-result ">
  <div class="links_main links_deep result__body">
    <h2 class="result__title">
      <a rel="nofollow" class="result__a" href="{href}">{title}</a>
    </h2>
    <div class="result__extras"><div class="result__extras__url">
      <a class="result__url" href="{href}">{dest}</a>
    </div></div>
    <a class="result__snippet" href="{href}">{snippet}</a>
    <div class="clear"></div>
  </div>
</div>
"#
        )
    }

    pub(crate) fn html_page(results: &[String]) -> String {
        format!(
            r#"<!DOCTYPE html>
<html><head><title>rust at DuckDuckGo</title>
<script type="text/javascript">var x = "<a class=\"result__a\" href=\"https://script.invalid\">no</a>";</script>
</head><body>
<div id="links" class="results">
{}
</div>
<form action="/html/" method="post"><input type="hidden" name="s" value="30"></form>
</body></html>"#,
            results.concat()
        )
    }

    /// `n` distinct well-formed results: `https://example.com/{i}`, titles `Result {i}`.
    pub(crate) fn html_page_n(n: usize) -> String {
        let results: Vec<String> = (0..n)
            .map(|i| {
                html_result(
                    &format!("https://example.com/{i}"),
                    &format!("Result <b>{i}</b>"),
                    &format!("Snippet {i} &amp; more"),
                )
            })
            .collect();
        html_page(&results)
    }

    pub(crate) fn lite_link_row(n: usize, dest: &str, title: &str) -> String {
        format!(
            r#"<tr><td valign="top">{n}.&nbsp;</td><td><a rel="nofollow" href="{}" class='result-link'>{title}</a></td></tr>
"#,
            redirect(dest)
        )
    }

    pub(crate) fn lite_snippet_row(snippet: &str) -> String {
        format!(
            r#"<tr><td>&nbsp;&nbsp;&nbsp;</td><td class='result-snippet'>{snippet}</td></tr>
<tr><td>&nbsp;&nbsp;&nbsp;</td><td><span class='link-text'>example.com</span></td></tr>
"#
        )
    }

    pub(crate) fn lite_page(rows: &[String]) -> String {
        format!(
            r#"<html><head><meta name="referrer" content="origin"><title>DuckDuckGo</title></head>
<body><form action="/lite/" method="post"><input type="text" name="q"></form>
<table border="0">
{}
</table></body></html>"#,
            rows.concat()
        )
    }

    /// `n` distinct lite results, each link row followed by its snippet row.
    pub(crate) fn lite_page_n(n: usize) -> String {
        let rows: Vec<String> = (0..n)
            .flat_map(|i| {
                [
                    lite_link_row(
                        i + 1,
                        &format!("https://lite.example.com/{i}"),
                        &format!("Lite {i}"),
                    ),
                    lite_snippet_row(&format!("About {i}")),
                ]
            })
            .collect();
        lite_page(&rows)
    }
}
