use super::{anchors, cells, strip_inert, ResultSet, MAX_CANDIDATES};
use crate::links::resolve_url;
use crate::textprep::normalize;
use toolpipe_core::SearchResult;

const LINK_CLASS: &str = "result-link";
const SNIPPET_CLASS: &str = "result-snippet";

/// Parse the table-based `lite` results page.
///
/// Links and snippets are collected in two independent passes and joined by position; a link
/// with no snippet at its index gets an empty snippet.
pub fn extract_fallback(html: &str) -> Vec<SearchResult> {
    let html = strip_inert(html);

    let links: Vec<(String, String)> = anchors(&html)
        .filter(|a| a.has_class(LINK_CLASS))
        .filter_map(|a| {
            let url = resolve_url(a.attr("href").unwrap_or_default());
            let title = normalize(a.inner);
            (!url.is_empty() && !title.is_empty()).then_some((url, title))
        })
        .collect();

    let snippets: Vec<&str> = cells(&html)
        .filter(|td| td.has_class(SNIPPET_CLASS))
        .map(|td| td.inner)
        .collect();

    let mut out = ResultSet::default();
    for (i, (url, title)) in links.into_iter().take(MAX_CANDIDATES).enumerate() {
        let snippet = snippets.get(i).copied().map(normalize).unwrap_or_default();
        out.push(SearchResult {
            title,
            url,
            snippet,
        });
    }
    out.into_vec()
}
