use std::time::Duration;
use toolpipe_core::{Error, FetchBackend, FetchRequest, FetchResponse, Result};

pub mod calculator;
pub mod datetime;
pub mod links;
pub mod random;
pub mod search;
pub mod serp;
pub mod textprep;
pub mod textutil;
pub mod webfetch;

pub const USER_AGENT: &str = concat!("toolpipe/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "text/html,application/json,text/plain,*/*";

/// Shared HTTP client owner. The same `reqwest::Client` also backs the search transport so
/// connection pools are reused.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
}

impl LocalFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            // Per-request timeouts (FetchRequest.timeout_ms, the search deadline) sit inside these.
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait::async_trait]
impl FetchBackend for LocalFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let url = url::Url::parse(&req.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let mut rb = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT);
        if let Some(to) = req.timeout() {
            rb = rb.timeout(to);
        }
        let resp = rb.send().await.map_err(|e| Error::Fetch(e.to_string()))?;
        let final_url = resp.url().to_string();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let max_bytes = req.max_bytes.unwrap_or(u64::MAX) as usize;
        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        tracing::debug!(
            url = %req.url,
            status = status.as_u16(),
            n_bytes = bytes.len(),
            truncated,
            "fetched"
        );
        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            content_type,
            bytes,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn req(url: String, max_bytes: Option<u64>) -> FetchRequest {
        FetchRequest {
            url,
            timeout_ms: Some(2_000),
            max_bytes,
        }
    }

    #[tokio::test]
    async fn local_fetcher_sends_identity_and_accept() {
        let app = Router::new().route(
            "/",
            get(|headers: axum::http::HeaderMap| async move {
                let ua = headers
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let accept = headers
                    .get(header::ACCEPT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                ([(header::CONTENT_TYPE, "text/plain")], format!("{ua}|{accept}"))
            }),
        );
        let addr = serve(app).await;

        let fetcher = LocalFetcher::new().unwrap();
        let resp = fetcher
            .fetch(&req(format!("http://{addr}/"), Some(10_000)))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type.as_deref(), Some("text/plain"));
        assert_eq!(resp.text_lossy(), format!("{USER_AGENT}|{ACCEPT}"));
        assert!(!resp.truncated);
    }

    #[tokio::test]
    async fn local_fetcher_caps_body_bytes() {
        let app = Router::new().route("/big", get(|| async { "x".repeat(50_000) }));
        let addr = serve(app).await;

        let fetcher = LocalFetcher::new().unwrap();
        let resp = fetcher
            .fetch(&req(format!("http://{addr}/big"), Some(1_000)))
            .await
            .unwrap();
        assert_eq!(resp.bytes.len(), 1_000);
        assert!(resp.truncated);
    }

    #[tokio::test]
    async fn web_fetch_reports_status_and_reason() {
        let app = Router::new().route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, "nope") }),
        );
        let addr = serve(app).await;

        let fetcher = LocalFetcher::new().unwrap();
        let err = webfetch::web_fetch(&fetcher, &format!("http://{addr}/missing"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
    }

    #[tokio::test]
    async fn web_fetch_pretty_prints_json_over_http() {
        let app = Router::new().route(
            "/api",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/json")],
                    r#"{"name":"toolpipe","tags":["a","b"]}"#,
                )
            }),
        );
        let addr = serve(app).await;

        let fetcher = LocalFetcher::new().unwrap();
        let url = format!("http://{addr}/api");
        let page = webfetch::web_fetch(&fetcher, &url).await.unwrap();
        assert_eq!(page.url, url);
        assert_eq!(page.content_type, "application/json");
        let reparsed: serde_json::Value = serde_json::from_str(&page.content).unwrap();
        assert_eq!(reparsed["name"], "toolpipe");
        assert!(page.content.contains("\n  \"tags\": ["));
    }

    #[tokio::test]
    async fn invalid_urls_never_reach_the_network() {
        let fetcher = LocalFetcher::new().unwrap();
        let err = fetcher.fetch(&req("not a url".to_string(), None)).await;
        assert!(matches!(err, Err(Error::InvalidUrl(_))));
    }
}
