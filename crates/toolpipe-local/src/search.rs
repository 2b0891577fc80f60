use crate::serp::{extract_fallback, extract_primary};
use rand::Rng;
use reqwest::header;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use toolpipe_core::{
    AttemptOutcome, Error, Result, SearchOutcome, SearchReport, SearchRequest, SearchResult,
    SourceAttempt, Surface, SurfaceResponse, SurfaceTransport,
};
use tracing::{debug, warn};

pub const DEFAULT_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
pub const DEFAULT_LITE_ENDPOINT: &str = "https://lite.duckduckgo.com/lite/";
pub const DEFAULT_DEADLINE_MS: u64 = 15_000;

/// Substrings that mark a challenge/anomaly page instead of results.
const BLOCK_MARKERS: &[&str] = &[
    "anomaly-modal__modal",
    "challenge-form",
    "detected unusual traffic",
];

/// Browser signatures rotated per call. Camouflage only.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

fn html_endpoint_from_env() -> Option<String> {
    std::env::var("TOOLPIPE_DDG_HTML_ENDPOINT")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn lite_endpoint_from_env() -> Option<String> {
    std::env::var("TOOLPIPE_DDG_LITE_ENDPOINT")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub const MIN_DEADLINE_MS: u64 = 1_000;
pub const MAX_DEADLINE_MS: u64 = 60_000;

/// Caller-supplied deadline kept within 1s..=60s.
pub fn clamp_deadline(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_DEADLINE_MS, MAX_DEADLINE_MS))
}

/// Whole-search deadline. Unparseable values fall back to the default; the result is clamped
/// like [`clamp_deadline`] so a typo cannot disable the deadline.
pub fn search_deadline_from_env() -> Duration {
    let ms = std::env::var("TOOLPIPE_SEARCH_DEADLINE_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_DEADLINE_MS);
    clamp_deadline(ms)
}

pub fn is_blocked(body: &str) -> bool {
    BLOCK_MARKERS.iter().any(|m| body.contains(m))
}

pub fn random_user_agent() -> &'static str {
    USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())]
}

/// Absolute point in time shared by every attempt of one search.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// The error reported when the deadline fires; names the full budget, not what was left.
    pub fn timeout_error(&self) -> Error {
        Error::Timeout(self.budget)
    }

    /// Run `fut` until it completes or the deadline passes (the future is dropped on expiry).
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(r) => r,
            Err(_) => Err(self.timeout_error()),
        }
    }
}

/// Form-POST transport against the live (or overridden) surfaces.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    html_endpoint: String,
    lite_endpoint: String,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoints(client, DEFAULT_HTML_ENDPOINT, DEFAULT_LITE_ENDPOINT)
    }

    pub fn from_env(client: reqwest::Client) -> Self {
        let html = html_endpoint_from_env().unwrap_or_else(|| DEFAULT_HTML_ENDPOINT.to_string());
        let lite = lite_endpoint_from_env().unwrap_or_else(|| DEFAULT_LITE_ENDPOINT.to_string());
        Self::with_endpoints(client, html, lite)
    }

    pub fn with_endpoints(
        client: reqwest::Client,
        html_endpoint: impl Into<String>,
        lite_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client,
            html_endpoint: html_endpoint.into(),
            lite_endpoint: lite_endpoint.into(),
        }
    }

    pub fn endpoint(&self, surface: Surface) -> &str {
        match surface {
            Surface::Html => &self.html_endpoint,
            Surface::Lite => &self.lite_endpoint,
        }
    }
}

fn origin_of(endpoint: &str) -> Option<String> {
    let u = url::Url::parse(endpoint).ok()?;
    let origin = u.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

#[async_trait::async_trait]
impl SurfaceTransport for ReqwestTransport {
    async fn post_query(
        &self,
        surface: Surface,
        query: &str,
        user_agent: &str,
    ) -> Result<SurfaceResponse> {
        let endpoint = self.endpoint(surface);
        let accept = match surface {
            Surface::Html => {
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
            }
            Surface::Lite => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        };

        // Content-Type comes from `.form`; Accept-Encoding from reqwest's decompression features.
        let mut rb = self
            .client
            .post(endpoint)
            .header(header::USER_AGENT, user_agent)
            .header(header::ACCEPT, accept)
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "same-origin")
            .header("Sec-Fetch-User", "?1");
        if let Some(origin) = origin_of(endpoint) {
            rb = rb
                .header(header::REFERER, format!("{origin}/"))
                .header(header::ORIGIN, origin);
        }
        rb = match surface {
            Surface::Html => rb
                .header(header::UPGRADE_INSECURE_REQUESTS, "1")
                .form(&[("q", query), ("b", "")]),
            Surface::Lite => rb.form(&[("q", query)]),
        };

        let resp = rb
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(SurfaceResponse { status, body })
    }
}

/// Primary/fallback search over the two DuckDuckGo surfaces.
#[derive(Clone)]
pub struct DuckDuckGoSearch {
    transport: Arc<dyn SurfaceTransport>,
    deadline: Duration,
}

impl std::fmt::Debug for DuckDuckGoSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDuckGoSearch")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl DuckDuckGoSearch {
    pub fn new(transport: Arc<dyn SurfaceTransport>) -> Self {
        Self {
            transport,
            deadline: Duration::from_millis(DEFAULT_DEADLINE_MS),
        }
    }

    pub fn from_env(client: reqwest::Client) -> Self {
        Self::new(Arc::new(ReqwestTransport::from_env(client)))
            .with_deadline(search_deadline_from_env())
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Validate raw tool input, then search. Validation failures become a `Failure` outcome
    /// with no attempts.
    pub async fn search_raw(&self, query: &str, max_results: Option<usize>) -> SearchReport {
        match SearchRequest::new(query, max_results) {
            Ok(req) => self.search(&req).await,
            Err(e) => SearchReport {
                outcome: SearchOutcome::from_error(query, &e),
                attempts: Vec::new(),
                elapsed_ms: 0,
            },
        }
    }

    pub async fn search(&self, req: &SearchRequest) -> SearchReport {
        let started = Instant::now();
        let deadline = Deadline::after(self.deadline);
        let user_agent = random_user_agent();
        let mut attempts = Vec::with_capacity(2);

        let primary = self
            .attempt(Surface::Html, &req.query, user_agent, &deadline, &mut attempts)
            .await;
        let result = match primary {
            Ok(results) => Ok(results),
            Err(e @ Error::Timeout(_)) => Err(e),
            Err(e) if deadline.expired() => {
                debug!(error = %e, "primary failed at the deadline; skipping fallback");
                Err(deadline.timeout_error())
            }
            Err(e) => {
                warn!(
                    error = %e,
                    remaining_ms = deadline.remaining().as_millis() as u64,
                    "html surface failed, trying lite"
                );
                self.attempt(Surface::Lite, &req.query, user_agent, &deadline, &mut attempts)
                    .await
            }
        };

        let outcome = match result {
            Ok(results) => SearchOutcome::from_results(&req.query, results, req.max_results),
            Err(e) => SearchOutcome::from_error(&req.query, &e),
        };
        SearchReport {
            outcome,
            attempts,
            elapsed_ms: started.elapsed().as_millis(),
        }
    }

    async fn attempt(
        &self,
        surface: Surface,
        query: &str,
        user_agent: &str,
        deadline: &Deadline,
        attempts: &mut Vec<SourceAttempt>,
    ) -> Result<Vec<SearchResult>> {
        let t0 = Instant::now();
        let res = deadline
            .run(self.fetch_and_extract(surface, query, user_agent))
            .await;
        let outcome = match &res {
            Ok(_) => AttemptOutcome::Success,
            Err(e) => AttemptOutcome::from_error(e),
        };
        let elapsed_ms = t0.elapsed().as_millis();
        debug!(
            surface = surface.name(),
            ?outcome,
            elapsed_ms = elapsed_ms as u64,
            "search attempt finished"
        );
        attempts.push(SourceAttempt {
            surface,
            outcome,
            elapsed_ms,
        });
        res
    }

    async fn fetch_and_extract(
        &self,
        surface: Surface,
        query: &str,
        user_agent: &str,
    ) -> Result<Vec<SearchResult>> {
        let resp = self
            .transport
            .post_query(surface, query, user_agent)
            .await?;
        if !resp.is_success() {
            return Err(Error::Http(resp.status));
        }
        if is_blocked(&resp.body) {
            warn!(surface = surface.name(), "anti-bot page detected");
            return Err(Error::Blocked);
        }
        let results = match surface {
            Surface::Html => extract_primary(&resp.body),
            Surface::Lite => extract_fallback(&resp.body),
        };
        debug!(surface = surface.name(), n = results.len(), "extracted candidates");
        Ok(results)
    }
}
