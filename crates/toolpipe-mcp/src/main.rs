use anyhow::Result;
use clap::{Parser, Subcommand};
use toolpipe_core::Surface;
use toolpipe_local::search::{clamp_deadline, DuckDuckGoSearch, ReqwestTransport};
use toolpipe_local::LocalFetcher;

#[derive(Parser, Debug)]
#[command(name = "toolpipe")]
#[command(about = "Chat tool plumbing: DuckDuckGo search, fetch, and small compute tools (MCP stdio server)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server (for MCP clients).
    #[cfg(feature = "stdio")]
    McpStdio,
    /// Run one web search and print the result (json).
    Search(SearchCmd),
    /// Fetch one URL and print the shaped page (json).
    Fetch(FetchCmd),
    /// Diagnose configuration/launch issues (json).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    /// Search query (1-500 chars).
    #[arg(long)]
    query: String,
    /// Number of results (1-10).
    #[arg(long)]
    max_results: Option<usize>,
    /// Overall search deadline (ms, clamped to 1000-60000). Defaults to TOOLPIPE_SEARCH_DEADLINE_MS
    /// or 15000.
    #[arg(long)]
    deadline_ms: Option<u64>,
    /// Include the per-surface attempt log and elapsed time.
    #[arg(long, default_value_t = false)]
    attempts: bool,
}

#[derive(clap::Args, Debug)]
struct FetchCmd {
    /// Absolute http(s) URL.
    #[arg(long)]
    url: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Attempt a local stdio MCP handshake (list_tools) to prove a client can start the server.
    ///
    /// Spawns a child `toolpipe mcp-stdio` process and calls `list_tools`. No search or fetch
    /// traffic is sent.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_stdio: bool,
    /// Timeout for the stdio handshake (ms).
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// `KEY=VALUE` lines; blank lines and `#` comments are skipped. Never overrides variables that
/// are already set.
fn load_env_file(path: &str) {
    let Ok(txt) = std::fs::read_to_string(path) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolpipe=info"));
    // stdout carries MCP framing; logs go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_search(fetcher: &LocalFetcher, deadline_ms: Option<u64>) -> DuckDuckGoSearch {
    let search = DuckDuckGoSearch::from_env(fetcher.client().clone());
    match deadline_ms {
        Some(ms) => search.with_deadline(clamp_deadline(ms)),
        None => search,
    }
}

#[cfg(feature = "stdio")]
mod mcp {
    use super::*;
    use rmcp::{
        handler::server::router::tool::ToolRouter as RmcpToolRouter,
        handler::server::wrapper::Parameters,
        model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
        tool, tool_handler, tool_router,
        transport::stdio,
        ErrorData as McpError, ServiceExt,
    };
    use schemars::JsonSchema;
    use serde::Deserialize;
    use std::sync::Arc;
    use toolpipe_core::Error as ToolError;
    use toolpipe_local::{calculator, datetime, random, textutil, webfetch};

    const SCHEMA_VERSION: u64 = 1;

    #[path = "envelope.rs"]
    mod envelope;
    use envelope::*;

    pub(crate) const TOOL_NAMES: &[&str] = &[
        "toolpipe_meta",
        "web_search",
        "web_fetch",
        "calculator",
        "date_time",
        "random_generator",
        "text_utils",
    ];

    #[derive(Debug, Deserialize, JsonSchema, Default)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct WebSearchArgs {
        /// Search query (1-500 chars).
        #[serde(default)]
        pub(crate) query: Option<String>,
        /// Number of results to return (1-10, default 5).
        #[serde(default)]
        pub(crate) max_results: Option<usize>,
    }

    #[derive(Debug, Deserialize, JsonSchema, Default)]
    pub(crate) struct WebFetchArgs {
        /// Absolute http:// or https:// URL.
        #[serde(default)]
        pub(crate) url: Option<String>,
    }

    #[derive(Debug, Deserialize, JsonSchema, Default)]
    pub(crate) struct CalculatorArgs {
        /// Arithmetic expression, e.g. `2 * (3 + 4)`, `sqrt(16)`, `2 ** 10`, `PI * 2`.
        #[serde(default)]
        pub(crate) expression: Option<String>,
    }

    #[derive(Debug, Deserialize, JsonSchema, Default)]
    pub(crate) struct DateTimeArgs {
        /// Operation: now|format|diff|add
        #[serde(default)]
        pub(crate) operation: Option<String>,
        /// Display zone: UTC (default), a fixed offset like +05:30, or an IANA name like
        /// America/New_York.
        #[serde(default)]
        pub(crate) timezone: Option<String>,
        /// Date input (ISO 8601 / RFC 3339 / RFC 2822) for format, diff, and add.
        #[serde(default)]
        pub(crate) date: Option<String>,
        /// Second date for diff (result is date2 - date).
        #[serde(default)]
        pub(crate) date2: Option<String>,
        /// Amount for add (may be negative).
        #[serde(default)]
        pub(crate) amount: Option<i64>,
        /// Unit for add: seconds|minutes|hours|days|weeks|months|years
        #[serde(default)]
        pub(crate) unit: Option<String>,
    }

    #[derive(Debug, Deserialize, JsonSchema, Default)]
    pub(crate) struct RandomArgs {
        /// Type: number|uuid|password|pick
        #[serde(default, rename = "type")]
        pub(crate) kind: Option<String>,
        /// Inclusive lower bound for number (default 0).
        #[serde(default)]
        pub(crate) min: Option<i64>,
        /// Inclusive upper bound for number (default 100).
        #[serde(default)]
        pub(crate) max: Option<i64>,
        /// Password length (default 16).
        #[serde(default)]
        pub(crate) length: Option<usize>,
        /// Items to pick from (pick only).
        #[serde(default)]
        pub(crate) items: Option<Vec<String>>,
        /// How many values to generate (default 1; 1 returns a single value).
        #[serde(default)]
        pub(crate) count: Option<usize>,
    }

    #[derive(Debug, Deserialize, JsonSchema, Default)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct TextUtilsArgs {
        /// Operation: wordCount|charCount|uppercase|lowercase|titleCase|reverse|base64Encode|base64Decode|urlEncode|urlDecode|slugify|truncate
        #[serde(default)]
        pub(crate) operation: Option<String>,
        /// Input text.
        #[serde(default)]
        pub(crate) text: Option<String>,
        /// Max chars for truncate (default 100).
        #[serde(default)]
        pub(crate) max_length: Option<usize>,
    }

    fn tool_result(payload: serde_json::Value) -> CallToolResult {
        // Structured content for machine consumers plus a text copy for clients that only read
        // `content[0].text`.
        let mut r = CallToolResult::structured(payload.clone());
        r.content = vec![Content::text(payload.to_string())];
        r
    }

    /// Merge `fields` (an object) into `{success: true, ...head}`.
    fn success(head: serde_json::Value, fields: serde_json::Value) -> serde_json::Value {
        let mut out = serde_json::json!({ "success": true });
        for part in [head, fields] {
            if let serde_json::Value::Object(m) = part {
                for (k, v) in m {
                    out[k] = v;
                }
            }
        }
        out
    }

    fn to_fields<T: serde::Serialize>(v: &T) -> Result<serde_json::Value, ToolError> {
        serde_json::to_value(v).map_err(|e| ToolError::Tool(e.to_string()))
    }

    fn required<'a>(v: &'a Option<String>, msg: &str) -> Result<&'a str, ToolError> {
        v.as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidParams(msg.to_string()))
    }

    #[derive(Clone)]
    pub(crate) struct ToolpipeMcp {
        tool_router: RmcpToolRouter<Self>,
        search: Arc<DuckDuckGoSearch>,
        fetcher: Arc<LocalFetcher>,
    }

    #[tool_router]
    impl ToolpipeMcp {
        pub(crate) fn new() -> Result<Self, McpError> {
            let fetcher =
                LocalFetcher::new().map_err(|e| McpError::internal_error(e.to_string(), None))?;
            let search = build_search(&fetcher, None);
            Ok(Self::with_parts(search, fetcher))
        }

        pub(crate) fn with_parts(search: DuckDuckGoSearch, fetcher: LocalFetcher) -> Self {
            Self {
                tool_router: Self::tool_router(),
                search: Arc::new(search),
                fetcher: Arc::new(fetcher),
            }
        }

        #[tool(description = "Report toolpipe configuration + version")]
        async fn toolpipe_meta(&self) -> Result<CallToolResult, McpError> {
            let t0 = std::time::Instant::now();
            let transport = ReqwestTransport::from_env(self.fetcher.client().clone());
            let mut payload = serde_json::json!({
                "ok": true,
                "name": "toolpipe",
                "version": env!("CARGO_PKG_VERSION"),
                "tools": TOOL_NAMES,
                "configured": {
                    "search": {
                        "html_endpoint": transport.endpoint(Surface::Html),
                        "lite_endpoint": transport.endpoint(Surface::Lite),
                        "deadline_ms": self.search.deadline().as_millis(),
                    },
                    "fetch": {
                        "user_agent": toolpipe_local::USER_AGENT,
                        "timeout_ms": webfetch::FETCH_TIMEOUT_MS,
                        "max_text_chars": webfetch::MAX_TEXT_CHARS,
                    },
                },
                "limits": {
                    "query_max_chars": toolpipe_core::MAX_QUERY_CHARS,
                    "max_results_default": toolpipe_core::DEFAULT_MAX_RESULTS,
                    "max_results_limit": toolpipe_core::MAX_RESULTS_LIMIT,
                    "calculator_max_chars": calculator::MAX_EXPRESSION_CHARS,
                    "random_max_count": random::MAX_COUNT,
                },
            });
            add_envelope_fields(&mut payload, "toolpipe_meta", t0.elapsed().as_millis());
            Ok(tool_result(payload))
        }

        #[tool(
            description = "Search the web via DuckDuckGo (HTML surface with a lite fallback). Returns titles, URLs, and snippets."
        )]
        async fn web_search(
            &self,
            params: Parameters<Option<WebSearchArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let args = params.0.unwrap_or_default();
            let query = args.query.unwrap_or_default();
            let report = self.search.search_raw(&query, args.max_results).await;
            tracing::info!(
                success = report.outcome.is_success(),
                results = report.outcome.result_count(),
                attempts = report.attempts.len(),
                elapsed_ms = report.elapsed_ms as u64,
                "web_search"
            );
            let payload = serde_json::to_value(&report.outcome)
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            Ok(tool_result(payload))
        }

        #[tool(
            description = "Fetch a URL and return its text content (JSON is pretty-printed; long text is truncated)."
        )]
        async fn web_fetch(
            &self,
            params: Parameters<Option<WebFetchArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let args = params.0.unwrap_or_default();
            let url = args.url.unwrap_or_default();
            let payload = match webfetch::web_fetch(self.fetcher.as_ref(), &url).await {
                Ok(page) => serde_json::json!({
                    "success": true,
                    "url": page.url,
                    "contentType": page.content_type,
                    "content": page.content,
                }),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "web_fetch failed");
                    failure(&e)
                }
            };
            Ok(tool_result(payload))
        }

        #[tool(
            description = "Evaluate an arithmetic expression: + - * / % ** and parentheses; sqrt abs sin cos tan log log10 log2 exp pow round floor ceil min max random; constants PI and E."
        )]
        async fn calculator(
            &self,
            params: Parameters<Option<CalculatorArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let args = params.0.unwrap_or_default();
            let expression = args.expression.unwrap_or_default();
            let payload = match calculator::evaluate(&expression) {
                Ok(v) => serde_json::json!({
                    "success": true,
                    "expression": expression,
                    "result": calculator::to_json_number(v),
                }),
                Err(e) => {
                    let mut v = failure(&e);
                    v["expression"] = serde_json::json!(expression);
                    v
                }
            };
            Ok(tool_result(payload))
        }

        #[tool(
            description = "Date/time helper: now, format a date, diff two dates, or add an amount of time to a date."
        )]
        async fn date_time(
            &self,
            params: Parameters<Option<DateTimeArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let args = params.0.unwrap_or_default();
            let payload = match Self::date_time_payload(&args) {
                Ok(v) => v,
                Err(e) => failure(&e),
            };
            Ok(tool_result(payload))
        }

        #[tool(
            description = "Generate random values: number (inclusive min/max), uuid, password, or pick from items."
        )]
        async fn random_generator(
            &self,
            params: Parameters<Option<RandomArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let args = params.0.unwrap_or_default();
            let payload = match Self::random_payload(&args) {
                Ok(v) => v,
                Err(e) => failure(&e),
            };
            Ok(tool_result(payload))
        }

        #[tool(
            description = "Text utilities: wordCount, charCount, uppercase, lowercase, titleCase, reverse, base64Encode, base64Decode, urlEncode, urlDecode, slugify, truncate."
        )]
        async fn text_utils(
            &self,
            params: Parameters<Option<TextUtilsArgs>>,
        ) -> Result<CallToolResult, McpError> {
            let args = params.0.unwrap_or_default();
            let payload = match Self::text_payload(&args) {
                Ok(v) => v,
                Err(e) => failure(&e),
            };
            Ok(tool_result(payload))
        }
    }

    impl ToolpipeMcp {
        fn date_time_payload(args: &DateTimeArgs) -> Result<serde_json::Value, ToolError> {
            let op = datetime::DateOp::parse(required(&args.operation, "operation is required")?)?;
            let zone = datetime::parse_timezone(args.timezone.as_deref())?;
            let fields = match op {
                datetime::DateOp::Now => to_fields(&datetime::now(&zone))?,
                datetime::DateOp::Format => {
                    let date = required(&args.date, "Date is required for format operation")?;
                    to_fields(&datetime::format(date, &zone)?)?
                }
                datetime::DateOp::Diff => {
                    let msg = "Two dates are required for diff operation";
                    let (d1, d2) = (required(&args.date, msg)?, required(&args.date2, msg)?);
                    to_fields(&datetime::diff(d1, d2)?)?
                }
                datetime::DateOp::Add => {
                    let msg = "Date, amount, and unit are required for add operation";
                    let date = required(&args.date, msg)?;
                    let amount = args
                        .amount
                        .ok_or_else(|| ToolError::InvalidParams(msg.to_string()))?;
                    let unit = datetime::TimeUnit::parse(required(&args.unit, msg)?)?;
                    to_fields(&datetime::add(date, amount, unit, &zone)?)?
                }
            };
            Ok(success(serde_json::json!({}), fields))
        }

        fn random_payload(args: &RandomArgs) -> Result<serde_json::Value, ToolError> {
            let kind = random::RandomKind::parse(required(&args.kind, "type is required")?)?;
            let count = random::check_count(args.count)?;
            Ok(match kind {
                random::RandomKind::Number => {
                    let min = args.min.unwrap_or(random::DEFAULT_MIN);
                    let max = args.max.unwrap_or(random::DEFAULT_MAX);
                    serde_json::json!({
                        "success": true,
                        "type": "number",
                        "range": { "min": min, "max": max },
                        "result": random::one_or_many(random::numbers(min, max, count)?),
                    })
                }
                random::RandomKind::Uuid => serde_json::json!({
                    "success": true,
                    "type": "uuid",
                    "result": random::one_or_many(random::uuids(count)),
                }),
                random::RandomKind::Password => {
                    let length = args.length.unwrap_or(random::DEFAULT_PASSWORD_LENGTH);
                    serde_json::json!({
                        "success": true,
                        "type": "password",
                        "length": length,
                        "result": random::one_or_many(random::passwords(length, count)?),
                    })
                }
                random::RandomKind::Pick => {
                    let items = args.items.as_deref().unwrap_or_default();
                    let picked = random::pick(items, count)?;
                    serde_json::json!({
                        "success": true,
                        "type": "pick",
                        "from": items,
                        "result": random::one_or_many(picked),
                    })
                }
            })
        }

        fn text_payload(args: &TextUtilsArgs) -> Result<serde_json::Value, ToolError> {
            let op_name = required(&args.operation, "operation is required")?;
            let op = textutil::TextOp::parse(op_name)?;
            let text = args
                .text
                .as_deref()
                .ok_or_else(|| ToolError::InvalidParams("text is required".to_string()))?;
            let fields = textutil::apply(op, text, args.max_length)?;
            Ok(success(
                serde_json::json!({ "operation": op_name.trim() }),
                fields,
            ))
        }
    }

    #[tool_handler]
    impl rmcp::ServerHandler for ToolpipeMcp {
        fn get_info(&self) -> ServerInfo {
            ServerInfo {
                instructions: Some(
                    "Web search (DuckDuckGo), URL fetch, and small compute tools. Outputs are JSON; failures are values with success=false."
                        .to_string(),
                ),
                capabilities: ServerCapabilities::builder().enable_tools().build(),
                ..Default::default()
            }
        }
    }

    pub(crate) async fn serve_stdio() -> Result<(), McpError> {
        let svc = ToolpipeMcp::new()?;
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            tools = TOOL_NAMES.len(),
            "mcp stdio server starting"
        );
        let running = svc
            .serve(stdio())
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        // Keep the stdio server alive until the client closes.
        running
            .waiting()
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use axum::{routing::get, routing::post, Router};
        use std::net::SocketAddr;
        use std::time::Duration;

        fn p<T>(v: T) -> Parameters<Option<T>> {
            Parameters(Some(v))
        }

        struct EnvGuard {
            // Hold the lock for the full test (env vars are process-global).
            _lock: std::sync::MutexGuard<'static, ()>,
            saved: Vec<(String, Option<String>)>,
        }

        impl EnvGuard {
            fn new(keys: &[&str]) -> Self {
                let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
                let saved: Vec<(String, Option<String>)> = keys
                    .iter()
                    .map(|k| (k.to_string(), std::env::var(k).ok()))
                    .collect();
                for (k, _) in &saved {
                    std::env::remove_var(k);
                }
                Self { _lock: lock, saved }
            }

            fn set(&self, k: &str, v: &str) {
                std::env::set_var(k, v);
            }
        }

        impl Drop for EnvGuard {
            fn drop(&mut self) {
                for (k, v) in self.saved.drain(..) {
                    match v {
                        Some(val) => std::env::set_var(k, val),
                        None => std::env::remove_var(k),
                    }
                }
            }
        }

        static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
        const SEARCH_ENV_KEYS: [&str; 3] = [
            "TOOLPIPE_DDG_HTML_ENDPOINT",
            "TOOLPIPE_DDG_LITE_ENDPOINT",
            "TOOLPIPE_SEARCH_DEADLINE_MS",
        ];

        fn payload_from_call_tool_result(r: &CallToolResult) -> serde_json::Value {
            let s = r
                .content
                .first()
                .and_then(|c| c.as_text())
                .map(|t| t.text.clone())
                .unwrap_or_default();
            serde_json::from_str(&s).expect("tool result should be a JSON string")
        }

        async fn serve(app: Router) -> SocketAddr {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            addr
        }

        fn html_result(url: &str, title: &str, snippet: &str) -> String {
            let href = format!(
                "//duckduckgo.com/l/?uddg={}&amp;rut=x",
                urlencoding::encode(url)
            );
            format!(
                r#"<div class="result"><h2><a class="result__a" href="{href}">{title}</a></h2>
                <a class="result__snippet" href="{href}">{snippet}</a></div>"#
            )
        }

        async fn svc_for(html: String, lite: String) -> ToolpipeMcp {
            let app = Router::new()
                .route("/html/", post(move || async move { html }))
                .route("/lite/", post(move || async move { lite }));
            let addr = serve(app).await;
            let fetcher = LocalFetcher::new().unwrap();
            let transport = ReqwestTransport::with_endpoints(
                fetcher.client().clone(),
                format!("http://{addr}/html/"),
                format!("http://{addr}/lite/"),
            );
            let search =
                DuckDuckGoSearch::new(Arc::new(transport)).with_deadline(Duration::from_secs(5));
            ToolpipeMcp::with_parts(search, fetcher)
        }

        fn offline_svc() -> ToolpipeMcp {
            let fetcher = LocalFetcher::new().unwrap();
            let transport = ReqwestTransport::with_endpoints(
                fetcher.client().clone(),
                "http://127.0.0.1:9/html/",
                "http://127.0.0.1:9/lite/",
            );
            ToolpipeMcp::with_parts(DuckDuckGoSearch::new(Arc::new(transport)), fetcher)
        }

        #[tokio::test]
        async fn web_search_returns_exact_success_shape() {
            let page = format!(
                "<html><body>{}{}{}</body></html>",
                html_result(
                    "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html",
                    "What is <b>Ownership</b>?",
                    "Ownership is a set of rules",
                ),
                html_result("https://rust-lang.org/learn", "Learn Rust", "Get started"),
                html_result("https://example.com/3", "Third", "third snippet"),
            );
            let svc = svc_for(page, String::new()).await;
            let r = svc
                .web_search(p(WebSearchArgs {
                    query: Some("rust ownership".to_string()),
                    max_results: Some(2),
                }))
                .await
                .unwrap();
            let v = payload_from_call_tool_result(&r);
            assert_eq!(v["success"], true);
            assert_eq!(v["query"], "rust ownership");
            assert_eq!(v["resultCount"], 2);
            let results = v["results"].as_array().unwrap();
            assert_eq!(results.len(), 2);
            assert_eq!(results[0]["title"], "What is Ownership ?");
            assert_eq!(
                results[0]["url"],
                "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html"
            );
            assert_eq!(results[0]["snippet"], "Ownership is a set of rules");
            assert_eq!(r.structured_content, Some(v.clone()));
        }

        #[tokio::test]
        async fn web_search_falls_back_to_lite_on_block() {
            let blocked = "<html><body><div class=\"anomaly-modal__modal\">Unfortunately, bots use DuckDuckGo too.</div></body></html>".to_string();
            let lite = r#"<table>
                <tr><td><a class="result-link" href="https://lite.example.com/a">Lite A</a></td></tr>
                <tr><td class="result-snippet">About A</td></tr>
                </table>"#
                .to_string();
            let svc = svc_for(blocked, lite).await;
            let v = payload_from_call_tool_result(
                &svc.web_search(p(WebSearchArgs {
                    query: Some("anything".to_string()),
                    max_results: None,
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], true);
            assert_eq!(v["results"][0]["url"], "https://lite.example.com/a");
            assert_eq!(v["results"][0]["snippet"], "About A");
        }

        #[tokio::test]
        async fn web_search_zero_results_is_a_success_with_message() {
            let svc = svc_for("<html><body>nothing</body></html>".to_string(), String::new()).await;
            let v = payload_from_call_tool_result(
                &svc.web_search(p(WebSearchArgs {
                    query: Some("zzqxv".to_string()),
                    max_results: Some(3),
                }))
                .await
                .unwrap(),
            );
            assert_eq!(
                v,
                serde_json::json!({
                    "success": true,
                    "query": "zzqxv",
                    "message": "No results found for this query",
                    "results": [],
                })
            );
        }

        #[tokio::test]
        async fn web_search_invalid_input_is_a_failure_value() {
            let svc = offline_svc();
            let v = payload_from_call_tool_result(
                &svc.web_search(p(WebSearchArgs::default())).await.unwrap(),
            );
            assert_eq!(v["success"], false);
            assert_eq!(v["query"], "");
            assert!(v["error"].as_str().unwrap().contains("non-empty"));

            let v = payload_from_call_tool_result(
                &svc.web_search(p(WebSearchArgs {
                    query: Some("ok".to_string()),
                    max_results: Some(11),
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], false);
            assert!(v["error"].as_str().unwrap().contains("maxResults"));

            let v = payload_from_call_tool_result(
                &svc.web_search(Parameters(None)).await.unwrap(),
            );
            assert_eq!(v["success"], false);
        }

        #[tokio::test]
        async fn web_search_transport_failure_keeps_query() {
            let svc = offline_svc();
            let v = payload_from_call_tool_result(
                &svc.web_search(p(WebSearchArgs {
                    query: Some("rust".to_string()),
                    max_results: None,
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], false);
            assert_eq!(v["query"], "rust");
            assert!(!v["error"].as_str().unwrap_or("").is_empty());
            assert!(v.get("results").is_none());
        }

        #[tokio::test]
        async fn web_fetch_shapes_success_and_failure() {
            let app = Router::new()
                .route(
                    "/page",
                    get(|| async { ([("content-type", "text/plain")], "hello fetch") }),
                )
                .route(
                    "/gone",
                    get(|| async { (axum::http::StatusCode::GONE, "gone") }),
                );
            let addr = serve(app).await;
            let svc = offline_svc();

            let url = format!("http://{addr}/page");
            let v = payload_from_call_tool_result(
                &svc.web_fetch(p(WebFetchArgs { url: Some(url.clone()) }))
                    .await
                    .unwrap(),
            );
            assert_eq!(
                v,
                serde_json::json!({
                    "success": true,
                    "url": url,
                    "contentType": "text/plain",
                    "content": "hello fetch",
                })
            );

            let v = payload_from_call_tool_result(
                &svc.web_fetch(p(WebFetchArgs {
                    url: Some(format!("http://{addr}/gone")),
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], false);
            assert_eq!(v["error"], "HTTP 410: Gone");
            assert_eq!(v["details"]["code"], "fetch_failed");

            let v = payload_from_call_tool_result(
                &svc.web_fetch(p(WebFetchArgs {
                    url: Some("ftp://example.com/x".to_string()),
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], false);
            assert_eq!(v["details"]["code"], "invalid_url");
        }

        #[tokio::test]
        async fn calculator_tool_payloads() {
            let svc = offline_svc();
            let v = payload_from_call_tool_result(
                &svc.calculator(p(CalculatorArgs {
                    expression: Some("(5 * 3) + 10".to_string()),
                }))
                .await
                .unwrap(),
            );
            assert_eq!(
                v,
                serde_json::json!({ "success": true, "expression": "(5 * 3) + 10", "result": 25 })
            );

            let v = payload_from_call_tool_result(
                &svc.calculator(p(CalculatorArgs {
                    expression: Some("1/0".to_string()),
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], false);
            assert_eq!(v["error"], "Invalid calculation result");
            assert_eq!(v["expression"], "1/0");
            assert_eq!(v["details"]["code"], "tool_failed");
        }

        #[tokio::test]
        async fn date_time_tool_payloads() {
            let svc = offline_svc();
            let v = payload_from_call_tool_result(
                &svc.date_time(p(DateTimeArgs {
                    operation: Some("diff".to_string()),
                    date: Some("2024-01-01T00:00:00Z".to_string()),
                    date2: Some("2024-01-02T12:00:00Z".to_string()),
                    ..Default::default()
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], true);
            assert_eq!(v["days"], 1);
            assert_eq!(v["hours"], 36);

            let v = payload_from_call_tool_result(
                &svc.date_time(p(DateTimeArgs {
                    operation: Some("add".to_string()),
                    date: Some("2024-01-31T00:00:00Z".to_string()),
                    amount: Some(1),
                    unit: Some("months".to_string()),
                    ..Default::default()
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], true);
            assert_eq!(v["added"], "1 months");
            assert_eq!(v["result"], "2024-02-29T00:00:00.000Z");

            let v = payload_from_call_tool_result(
                &svc.date_time(p(DateTimeArgs {
                    operation: Some("format".to_string()),
                    ..Default::default()
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], false);
            assert!(v["error"]
                .as_str()
                .unwrap()
                .contains("Date is required for format operation"));

            let v = payload_from_call_tool_result(
                &svc.date_time(p(DateTimeArgs {
                    operation: Some("now".to_string()),
                    timezone: Some("+05:30".to_string()),
                    ..Default::default()
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], true);
            assert_eq!(v["timezone"], "+05:30");
            assert!(v["timestamp"].as_i64().unwrap() > 0);

            let v = payload_from_call_tool_result(
                &svc.date_time(p(DateTimeArgs {
                    operation: Some("format".to_string()),
                    timezone: Some("America/New_York".to_string()),
                    date: Some("2024-07-04T16:00:00Z".to_string()),
                    ..Default::default()
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], true);
            assert_eq!(v["formatted"], "7/4/2024, 12:00:00 PM");

            let v = payload_from_call_tool_result(
                &svc.date_time(p(DateTimeArgs {
                    operation: Some("now".to_string()),
                    timezone: Some("+aé1".to_string()),
                    ..Default::default()
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], false);
            assert_eq!(v["details"]["code"], "invalid_params");
        }

        #[tokio::test]
        async fn random_generator_tool_payloads() {
            let svc = offline_svc();
            let v = payload_from_call_tool_result(
                &svc.random_generator(p(RandomArgs {
                    kind: Some("number".to_string()),
                    min: Some(1),
                    max: Some(6),
                    count: Some(4),
                    ..Default::default()
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["type"], "number");
            assert_eq!(v["range"], serde_json::json!({ "min": 1, "max": 6 }));
            let xs = v["result"].as_array().unwrap();
            assert_eq!(xs.len(), 4);
            assert!(xs.iter().all(|x| (1..=6).contains(&x.as_i64().unwrap())));

            let v = payload_from_call_tool_result(
                &svc.random_generator(p(RandomArgs {
                    kind: Some("uuid".to_string()),
                    ..Default::default()
                }))
                .await
                .unwrap(),
            );
            assert!(v["result"].is_string());

            let v = payload_from_call_tool_result(
                &svc.random_generator(p(RandomArgs {
                    kind: Some("pick".to_string()),
                    ..Default::default()
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], false);
            assert_eq!(v["error"], "Items array is required for pick operation");
            assert_eq!(v["details"]["code"], "invalid_params");
        }

        #[tokio::test]
        async fn text_utils_tool_payloads() {
            let svc = offline_svc();
            let v = payload_from_call_tool_result(
                &svc.text_utils(p(TextUtilsArgs {
                    operation: Some("charCount".to_string()),
                    text: Some("a b c".to_string()),
                    max_length: None,
                }))
                .await
                .unwrap(),
            );
            assert_eq!(
                v,
                serde_json::json!({
                    "success": true,
                    "operation": "charCount",
                    "withSpaces": 5,
                    "withoutSpaces": 3,
                })
            );

            let v = payload_from_call_tool_result(
                &svc.text_utils(p(TextUtilsArgs {
                    operation: Some("truncate".to_string()),
                    text: Some("abcdefgh".to_string()),
                    max_length: Some(4),
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["result"], "abcd...");

            let v = payload_from_call_tool_result(
                &svc.text_utils(p(TextUtilsArgs {
                    operation: Some("rot13".to_string()),
                    text: Some("x".to_string()),
                    max_length: None,
                }))
                .await
                .unwrap(),
            );
            assert_eq!(v["success"], false);
            assert_eq!(v["details"]["code"], "invalid_params");
        }

        #[tokio::test]
        async fn meta_reports_endpoint_overrides() {
            let env = EnvGuard::new(&SEARCH_ENV_KEYS);
            env.set("TOOLPIPE_DDG_HTML_ENDPOINT", "http://127.0.0.1:1/html/");
            let svc = offline_svc();
            let v = payload_from_call_tool_result(&svc.toolpipe_meta().await.unwrap());
            assert_eq!(v["ok"], true);
            assert_eq!(v["kind"], "toolpipe_meta");
            assert_eq!(v["schema_version"], SCHEMA_VERSION);
            assert_eq!(
                v["configured"]["search"]["html_endpoint"],
                "http://127.0.0.1:1/html/"
            );
            assert_eq!(
                v["configured"]["search"]["lite_endpoint"],
                toolpipe_local::search::DEFAULT_LITE_ENDPOINT
            );
            assert_eq!(v["tools"].as_array().unwrap().len(), TOOL_NAMES.len());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Opt-in env file for MCP hosts that don't start the server from an interactive shell.
    if let Ok(p) = std::env::var("TOOLPIPE_ENV_FILE") {
        let p = p.trim();
        if !p.is_empty() {
            load_env_file(p);
        }
    }
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            mcp::serve_stdio()
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::Search(args) => {
            let fetcher = LocalFetcher::new()?;
            let search = build_search(&fetcher, args.deadline_ms);
            let report = search.search_raw(&args.query, args.max_results).await;
            let mut payload = serde_json::to_value(&report.outcome)?;
            if args.attempts {
                payload["attempts"] = serde_json::to_value(&report.attempts)?;
                payload["elapsed_ms"] = serde_json::json!(report.elapsed_ms);
            }
            println!("{payload}");
        }
        Commands::Fetch(args) => {
            let fetcher = LocalFetcher::new()?;
            let payload = match toolpipe_local::webfetch::web_fetch(&fetcher, &args.url).await {
                Ok(page) => serde_json::json!({
                    "success": true,
                    "url": page.url,
                    "contentType": page.content_type,
                    "content": page.content,
                    "truncated": page.truncated,
                }),
                Err(e) => serde_json::json!({ "success": false, "error": e.to_string() }),
            };
            println!("{payload}");
        }
        Commands::Doctor(args) => {
            fn has_env(k: &str) -> bool {
                std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
            }

            let t0 = std::time::Instant::now();
            let mut checks: Vec<serde_json::Value> = Vec::new();

            let client_ok = LocalFetcher::new();
            checks.push(serde_json::json!({
                "name": "http_client",
                "ok": client_ok.is_ok(),
                "message": match &client_ok {
                    Ok(_) => "HTTP client (rustls) initialized".to_string(),
                    Err(e) => format!("HTTP client failed to initialize: {e}"),
                },
            }));

            let (html_endpoint, lite_endpoint, deadline_ms) = match &client_ok {
                Ok(f) => {
                    let t = ReqwestTransport::from_env(f.client().clone());
                    (
                        Some(t.endpoint(Surface::Html).to_string()),
                        Some(t.endpoint(Surface::Lite).to_string()),
                        toolpipe_local::search::search_deadline_from_env().as_millis(),
                    )
                }
                Err(_) => (
                    None,
                    None,
                    toolpipe_local::search::search_deadline_from_env().as_millis(),
                ),
            };
            let endpoints_ok = [&html_endpoint, &lite_endpoint]
                .iter()
                .all(|e| e.as_deref().is_some_and(|u| url::Url::parse(u).is_ok()));
            checks.push(serde_json::json!({
                "name": "search_endpoints",
                "ok": endpoints_ok,
                "message": if endpoints_ok { "search endpoints parse as URLs" } else { "a search endpoint is not a valid URL" },
                "hint": if endpoints_ok { "" } else { "Check TOOLPIPE_DDG_HTML_ENDPOINT / TOOLPIPE_DDG_LITE_ENDPOINT." },
            }));

            // Check: stdio MCP handshake (optional).
            let mut stdio_ok: Option<bool> = None;
            let mut stdio_tool_count: Option<usize> = None;
            let mut stdio_error: Option<serde_json::Value> = None;
            let mut stdio_elapsed_ms: Option<u128> = None;

            #[cfg(feature = "stdio")]
            if args.check_stdio {
                use rmcp::service::ServiceExt;
                use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
                use tokio::process::Command;

                let exe = std::env::current_exe()
                    .unwrap_or_else(|_| std::path::PathBuf::from("toolpipe"));
                let child = TokioChildProcess::new(Command::new(exe).configure(|cmd| {
                    cmd.args(["mcp-stdio"]);
                    cmd.env("RUST_LOG", "error");
                }))?;

                let service = ().serve(child).await?;
                let check_t0 = std::time::Instant::now();
                let res = tokio::time::timeout(
                    std::time::Duration::from_millis(args.timeout_ms),
                    service.list_tools(Default::default()),
                )
                .await;
                stdio_elapsed_ms = Some(check_t0.elapsed().as_millis());

                match res {
                    Ok(Ok(tools)) => {
                        stdio_ok = Some(true);
                        stdio_tool_count = Some(tools.tools.len());
                    }
                    Ok(Err(e)) => {
                        stdio_ok = Some(false);
                        stdio_error = Some(serde_json::json!({
                            "code": "handshake_failed",
                            "message": e.to_string(),
                            "hint": "The child closed the stdio transport early. Check that nothing prints to stdout in mcp-stdio mode.",
                        }));
                    }
                    Err(_elapsed) => {
                        stdio_ok = Some(false);
                        stdio_error = Some(serde_json::json!({
                            "code": "timeout",
                            "message": format!("stdio handshake timed out after {}ms", args.timeout_ms),
                            "hint": "The child did not respond to list_tools in time.",
                        }));
                    }
                }

                let _ = service.cancel().await;
            }

            #[cfg(not(feature = "stdio"))]
            if args.check_stdio {
                stdio_ok = Some(false);
            }

            checks.push(serde_json::json!({
                "name": "mcp_stdio_handshake",
                "ok": if args.check_stdio { stdio_ok.unwrap_or(false) } else { true },
                "skipped": !args.check_stdio,
                "message": if !args.check_stdio {
                    "stdio MCP handshake skipped"
                } else if stdio_ok.unwrap_or(false) {
                    "stdio MCP handshake succeeded"
                } else {
                    "stdio MCP handshake failed"
                },
                "tool_count": stdio_tool_count,
                "elapsed_ms": stdio_elapsed_ms,
                "error": stdio_error,
            }));

            let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "ok": ok,
                "name": "toolpipe",
                "version": env!("CARGO_PKG_VERSION"),
                "platform": {
                    "os": std::env::consts::OS,
                    "arch": std::env::consts::ARCH,
                },
                "features": {
                    "stdio": cfg!(feature = "stdio"),
                },
                "elapsed_ms": t0.elapsed().as_millis(),
                "configured": {
                    "html_endpoint": html_endpoint,
                    "lite_endpoint": lite_endpoint,
                    "html_endpoint_overridden": has_env("TOOLPIPE_DDG_HTML_ENDPOINT"),
                    "lite_endpoint_overridden": has_env("TOOLPIPE_DDG_LITE_ENDPOINT"),
                    "search_deadline_ms": deadline_ms,
                    "env_file": has_env("TOOLPIPE_ENV_FILE"),
                },
                "checks": checks,
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    println!("toolpipe {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
                    println!(
                        "search: html={} lite={} deadline_ms={}",
                        payload["configured"]["html_endpoint"].as_str().unwrap_or("?"),
                        payload["configured"]["lite_endpoint"].as_str().unwrap_or("?"),
                        deadline_ms,
                    );
                    println!("checks:");
                    if let Some(arr) = payload["checks"].as_array() {
                        for c in arr {
                            let name = c["name"].as_str().unwrap_or("?");
                            let ok = c["ok"].as_bool().unwrap_or(false);
                            let skipped = c["skipped"].as_bool().unwrap_or(false);
                            if skipped {
                                println!("- {}: skipped", name);
                            } else {
                                println!("- {}: {}", name, if ok { "ok" } else { "fail" });
                            }
                        }
                    }
                }
                _ => println!("{payload}"),
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "toolpipe",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("toolpipe {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }

    Ok(())
}
