use crate::config::{GerritConfig, GitLabConfig};
use crate::error::ToolError;
use base64::Engine;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// How the response body is expected to look; selects the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Text,
}

/// A fully described REST call, built without I/O and without credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the backend root, already percent-encoded.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub format: ResponseFormat,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
            format: ResponseFormat::Json,
        }
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body,
            format: ResponseFormat::Json,
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn text(mut self) -> Self {
        self.format = ResponseFormat::Text;
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
    /// GitLab `X-Next-Page`, when the remote reports one.
    pub next_page: Option<String>,
}

#[derive(Clone)]
pub enum Auth {
    /// GitLab personal access token.
    PrivateToken(String),
    /// Gerrit HTTP credentials.
    Basic { user: String, password: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::PrivateToken(_) => f.write_str("PrivateToken(***)"),
            Auth::Basic { user, .. } => write!(f, "Basic({}:***)", user),
        }
    }
}

impl Auth {
    fn apply(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ToolError> {
        match self {
            Auth::PrivateToken(token) => {
                let value = HeaderValue::from_str(token).map_err(|_| {
                    ToolError::NotConfigured("GITLAB_TOKEN is not a valid header value".into())
                })?;
                Ok(builder.header("PRIVATE-TOKEN", value))
            }
            Auth::Basic { user, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", user, password));
                let value = HeaderValue::from_str(&format!("Basic {}", encoded)).map_err(|_| {
                    let reason = "Gerrit credentials are not a valid header value";
                    ToolError::NotConfigured(reason.into())
                })?;
                Ok(builder.header(AUTHORIZATION, value))
            }
        }
    }
}

/// Authenticated client for one REST backend, with bounded retries.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    auth: Auth,
    max_retries: u32,
}

pub fn build_client(user_agent: &str, timeout_secs: u64) -> Result<Client, ToolError> {
    let mut default_headers = HeaderMap::new();
    let ua = HeaderValue::from_str(user_agent)
        .map_err(|_| ToolError::NotConfigured(format!("invalid USER_AGENT: {:?}", user_agent)))?;
    default_headers.insert(USER_AGENT, ua);
    Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(timeout_secs))
        .use_rustls_tls()
        .build()
        .map_err(|e| ToolError::NotConfigured(format!("failed to build HTTP client: {}", e)))
}

impl RestClient {
    pub fn new(client: Client, base_url: impl Into<String>, auth: Auth, max_retries: u32) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            max_retries,
        }
    }

    pub fn gitlab(client: Client, cfg: &GitLabConfig, max_retries: u32) -> Self {
        Self::new(client, &cfg.api_url, Auth::PrivateToken(cfg.token.clone()), max_retries)
    }

    pub fn gerrit(client: Client, cfg: &GerritConfig, max_retries: u32) -> Self {
        let auth = Auth::Basic {
            user: cfg.user.clone(),
            password: cfg.http_password.clone(),
        };
        Self::new(client, &cfg.base_url, auth, max_retries)
    }

    pub fn url_for(&self, req: &ApiRequest) -> Result<Url, ToolError> {
        let raw = format!("{}/{}", self.base_url, req.path.trim_start_matches('/'));
        let mut url = Url::parse(&raw)
            .map_err(|e| ToolError::invalid(format!("cannot build URL {}: {}", raw, e)))?;
        if !req.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &req.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Execute `req`, retrying transient failures (connection errors,
    /// timeouts, 429, 5xx) up to `max_retries` times.
    pub async fn execute(&self, req: &ApiRequest) -> Result<RawResponse, ToolError> {
        let url = self.url_for(req)?;
        let accept = match req.format {
            ResponseFormat::Json => "application/json",
            ResponseFormat::Text => "text/plain",
        };
        let mut attempt: u32 = 0;
        loop {
            let mut builder = self
                .client
                .request(req.method.clone(), url.clone())
                .header(ACCEPT, HeaderValue::from_static(accept));
            builder = self.auth.apply(builder)?;
            if let Some(body) = &req.body {
                builder = builder.json(body);
            }
            debug!("{} {} (attempt {})", req.method, url, attempt + 1);

            let res = match builder.send().await {
                Ok(r) => r,
                Err(e) => {
                    if attempt < self.max_retries {
                        let backoff = compute_backoff(attempt, None);
                        warn!("{} {} failed: {}; retrying in {:?}", req.method, url, e, backoff);
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ToolError::UpstreamUnavailable {
                        message: format!("{} after {} attempt(s)", e, attempt + 1),
                        status: None,
                    });
                }
            };

            let status = res.status();
            let retry_after = res
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let next_page = res
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());

            if is_transient(status) {
                if attempt < self.max_retries {
                    let backoff = compute_backoff(attempt, retry_after);
                    warn!("{} {} returned {}; retrying in {:?}", req.method, url, status, backoff);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                    continue;
                }
                let text = res.text().await.unwrap_or_default();
                return Err(ToolError::UpstreamUnavailable {
                    message: format!(
                        "status {} after {} attempt(s): {}",
                        status.as_u16(),
                        attempt + 1,
                        text.trim()
                    ),
                    status: Some(status.as_u16()),
                });
            }

            let body = res
                .text()
                .await
                .map_err(|e| ToolError::malformed(format!("failed to read response body: {}", e)))?;
            if status.is_success() {
                return Ok(RawResponse {
                    status,
                    body,
                    next_page,
                });
            }
            return Err(map_status_to_error(status, body));
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Non-success, non-transient statuses are rejected without retrying.
pub fn map_status_to_error(status: StatusCode, body: String) -> ToolError {
    if is_transient(status) {
        return ToolError::UpstreamUnavailable {
            message: body,
            status: Some(status.as_u16()),
        };
    }
    ToolError::RequestRejected {
        status: status.as_u16(),
        body,
    }
}

pub fn compute_backoff(attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(d) = retry_after {
        return d.min(Duration::from_secs(30));
    }
    // Exponential backoff with jitter: base 200ms * 2^attempt, max 5s.
    let base = 200u64.saturating_mul(1u64 << attempt.min(5));
    let max = 5_000u64.min(base);
    let jitter = fastrand::u64(0..=max / 2);
    Duration::from_millis(max / 2 + jitter)
}

/// Percent-encode a value for use as a single URL path segment.
pub fn encode_path_segment(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}
