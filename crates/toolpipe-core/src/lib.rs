use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad tool input; the message is surfaced verbatim, the kind travels as an error code.
    #[error("{0}")]
    InvalidParams(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("Search timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("Search blocked by DuckDuckGo anti-bot measures")]
    Blocked,
    #[error("HTTP {0}")]
    Http(u16),
    /// Network/DNS/TLS failure; the message is surfaced verbatim.
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Fetch(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    /// A compute tool rejected its input or produced no usable value.
    #[error("{0}")]
    Tool(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub const MAX_QUERY_CHARS: usize = 500;
pub const DEFAULT_MAX_RESULTS: usize = 5;
pub const MAX_RESULTS_LIMIT: usize = 10;

/// One search invocation. Construct through [`SearchRequest::new`] so the bounds hold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, max_results: Option<usize>) -> Result<Self> {
        let query = query.into();
        let n_chars = query.chars().count();
        if n_chars == 0 {
            return Err(Error::InvalidParams("query must be non-empty".to_string()));
        }
        if n_chars > MAX_QUERY_CHARS {
            return Err(Error::InvalidParams(format!(
                "query must be at most {MAX_QUERY_CHARS} characters (got {n_chars})"
            )));
        }
        let max_results = max_results.unwrap_or(DEFAULT_MAX_RESULTS);
        if !(1..=MAX_RESULTS_LIMIT).contains(&max_results) {
            return Err(Error::InvalidParams(format!(
                "maxResults must be between 1 and {MAX_RESULTS_LIMIT} (got {max_results})"
            )));
        }
        Ok(Self { query, max_results })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// The two HTML renderings of the search engine we know how to parse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    /// Full HTML results page (`result__a` / `result__snippet` anchors).
    Html,
    /// Table-based lite page (`result-link` anchors, `result-snippet` cells).
    Lite,
}

impl Surface {
    pub fn name(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Lite => "lite",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SurfaceResponse {
    pub status: u16,
    pub body: String,
}

impl SurfaceResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound seam for the search orchestrator: one form POST against one surface.
///
/// Implementations report network-level failures as [`Error::Transport`] and return
/// non-2xx responses as a normal [`SurfaceResponse`]; status and anti-bot checks belong
/// to the caller.
#[async_trait::async_trait]
pub trait SurfaceTransport: Send + Sync {
    async fn post_query(
        &self,
        surface: Surface,
        query: &str,
        user_agent: &str,
    ) -> Result<SurfaceResponse>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Blocked,
    HttpError,
    Timeout,
    TransportError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceAttempt {
    pub surface: Surface,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidParams,
    Timeout,
    Blocked,
    HttpError,
    TransportError,
}

impl FailureKind {
    pub fn from_error(e: &Error) -> Self {
        match e {
            Error::InvalidParams(_)
            | Error::InvalidUrl(_)
            | Error::NotSupported(_)
            | Error::Tool(_) => Self::InvalidParams,
            Error::Timeout(_) => Self::Timeout,
            Error::Blocked => Self::Blocked,
            Error::Http(_) => Self::HttpError,
            Error::Transport(_) | Error::Fetch(_) => Self::TransportError,
        }
    }
}

impl AttemptOutcome {
    pub fn from_error(e: &Error) -> Self {
        match FailureKind::from_error(e) {
            FailureKind::Timeout => Self::Timeout,
            FailureKind::Blocked => Self::Blocked,
            FailureKind::HttpError => Self::HttpError,
            FailureKind::InvalidParams | FailureKind::TransportError => Self::TransportError,
        }
    }
}

pub const NO_RESULTS_MESSAGE: &str = "No results found for this query";

/// Every way a search can end. Serializes to the tool wire shape:
///
/// - `{ success: true, query, resultCount, results }`
/// - `{ success: true, query, message, results: [] }`
/// - `{ success: false, error, query }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Success {
        query: String,
        results: Vec<SearchResult>,
    },
    Empty {
        query: String,
        message: String,
    },
    Failure {
        query: String,
        kind: FailureKind,
        error: String,
    },
}

impl SearchOutcome {
    /// Shapes a (possibly untruncated) result list; empty lists become [`SearchOutcome::Empty`].
    pub fn from_results(query: &str, mut results: Vec<SearchResult>, max_results: usize) -> Self {
        results.truncate(max_results);
        if results.is_empty() {
            return Self::Empty {
                query: query.to_string(),
                message: NO_RESULTS_MESSAGE.to_string(),
            };
        }
        Self::Success {
            query: query.to_string(),
            results,
        }
    }

    pub fn from_error(query: &str, e: &Error) -> Self {
        Self::Failure {
            query: query.to_string(),
            kind: FailureKind::from_error(e),
            error: e.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure { .. })
    }

    pub fn query(&self) -> &str {
        match self {
            Self::Success { query, .. } | Self::Empty { query, .. } | Self::Failure { query, .. } => {
                query
            }
        }
    }

    pub fn results(&self) -> &[SearchResult] {
        match self {
            Self::Success { results, .. } => results,
            Self::Empty { .. } | Self::Failure { .. } => &[],
        }
    }

    pub fn result_count(&self) -> usize {
        self.results().len()
    }
}

impl Serialize for SearchOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Wire<'a> {
            success: bool,
            query: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            result_count: Option<usize>,
            #[serde(skip_serializing_if = "Option::is_none")]
            message: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            results: Option<&'a [SearchResult]>,
        }

        let wire = match self {
            Self::Success { query, results } => Wire {
                success: true,
                query: query.as_str(),
                result_count: Some(results.len()),
                message: None,
                error: None,
                results: Some(results.as_slice()),
            },
            Self::Empty { query, message } => Wire {
                success: true,
                query: query.as_str(),
                result_count: None,
                message: Some(message.as_str()),
                error: None,
                results: Some(&[][..]),
            },
            Self::Failure { query, error, .. } => Wire {
                success: false,
                query: query.as_str(),
                result_count: None,
                message: None,
                error: Some(error.as_str()),
                results: None,
            },
        };
        wire.serialize(serializer)
    }
}

/// Outcome plus the path the orchestrator took to reach it.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub outcome: SearchOutcome,
    pub attempts: Vec<SourceAttempt>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for the whole request (connect + body).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
}

impl FetchRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub reason: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}
