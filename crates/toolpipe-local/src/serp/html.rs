use super::{anchors, candidate, strip_inert, Element, ResultSet};
use toolpipe_core::SearchResult;

const TITLE_CLASS: &str = "result__a";
const SNIPPET_CLASS: &str = "result__snippet";

/// Parse the full `html` results page.
///
/// Title and snippet are matched as one unit: a `result__a` anchor arms a pending pair and the
/// next `result__snippet` anchor completes it. A title that never meets a snippet is dropped,
/// and a second title before any snippet replaces the first, so a malformed unit cannot shift
/// every later snippet onto the wrong title.
pub fn extract_primary(html: &str) -> Vec<SearchResult> {
    let html = strip_inert(html);
    let mut out = ResultSet::default();
    let mut pending: Option<Element<'_>> = None;

    for a in anchors(&html) {
        if out.is_full() {
            break;
        }
        match anchor_role(&a) {
            Some(Role::Title) => pending = Some(a),
            Some(Role::Snippet) => {
                if let Some(title) = pending.take() {
                    out.push(candidate(
                        title.attr("href").unwrap_or_default(),
                        title.inner,
                        a.inner,
                    ));
                }
            }
            None => {}
        }
    }

    out.into_vec()
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Title,
    Snippet,
}

fn anchor_role(a: &Element<'_>) -> Option<Role> {
    if a.has_class(TITLE_CLASS) {
        Some(Role::Title)
    } else if a.has_class(SNIPPET_CLASS) {
        Some(Role::Snippet)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serp::fixtures::{html_page, html_page_n, html_result};
    use crate::serp::MAX_CANDIDATES;

    #[test]
    fn extracts_paired_results_in_order() {
        let page = html_page(&[
            html_result(
                "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html",
                "What is <b>Ownership</b>? - The Rust Programming Language",
                "<b>Ownership</b> is a set of rules that govern how a Rust program manages memory.",
            ),
            html_result(
                "https://www.rust-lang.org/",
                "Rust Programming Language",
                "A language empowering everyone.",
            ),
        ]);
        let rs = extract_primary(&page);
        assert_eq!(rs.len(), 2);
        assert_eq!(
            rs[0].url,
            "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html"
        );
        assert_eq!(
            rs[0].title,
            "What is Ownership ? - The Rust Programming Language"
        );
        assert!(rs[0].snippet.starts_with("Ownership is a set of rules"));
        assert_eq!(rs[1].url, "https://www.rust-lang.org/");
    }

    #[test]
    fn dedups_by_resolved_url() {
        let page = html_page(&[
            html_result("https://example.com/same", "First", "one"),
            html_result("https://example.com/same", "Second", "two"),
            html_result("https://example.com/other", "Third", "three"),
        ]);
        let rs = extract_primary(&page);
        assert_eq!(rs.len(), 2);
        assert_eq!(rs[0].title, "First");
        assert_eq!(rs[1].title, "Third");
    }

    #[test]
    fn caps_candidates() {
        let rs = extract_primary(&html_page_n(25));
        assert_eq!(rs.len(), MAX_CANDIDATES);
        assert_eq!(rs[14].url, "https://example.com/14");
    }

    #[test]
    fn ignores_anchors_inside_scripts_and_ads() {
        let ad = r#"<div class="result result--ad"><a class="result__a" href="https://duckduckgo.com/y.js?ad_domain=x">Ad</a>
            <a class="result__snippet" href="https://duckduckgo.com/y.js?ad_domain=x">Buy</a></div>"#;
        let page = html_page(&[
            ad.to_string(),
            html_result("https://example.com/real", "Real", "ok"),
        ]);
        let rs = extract_primary(&page);
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].url, "https://example.com/real");
    }

    #[test]
    fn title_without_snippet_does_not_shift_pairs() {
        let orphan = r#"<a class="result__a" href="https://orphan.example/">Orphan</a>"#;
        let page = html_page(&[
            orphan.to_string(),
            html_result("https://example.com/a", "A", "snippet a"),
            html_result("https://example.com/b", "B", "snippet b"),
        ]);
        let rs = extract_primary(&page);
        let pairs: Vec<(&str, &str)> = rs
            .iter()
            .map(|r| (r.title.as_str(), r.snippet.as_str()))
            .collect();
        assert_eq!(pairs, vec![("A", "snippet a"), ("B", "snippet b")]);
    }

    #[test]
    fn unrelated_or_drifted_markup_yields_nothing() {
        assert!(extract_primary("").is_empty());
        assert!(extract_primary("<html><body><p>No results.</p></body></html>").is_empty());
        // Lite markup is not mistaken for the full page.
        let lite = crate::serp::fixtures::lite_page_n(3);
        assert!(extract_primary(&lite).is_empty());
    }

    #[test]
    fn skips_pairs_with_empty_title() {
        let page = html_page(&[
            html_result("https://example.com/empty", "<span> </span>", "x"),
            html_result("https://example.com/ok", "Ok", "y"),
        ]);
        let rs = extract_primary(&page);
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].title, "Ok");
    }
}
