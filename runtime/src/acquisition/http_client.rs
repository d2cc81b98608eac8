//! Async HTTP client wrapping reqwest.
//!
//! Not a browser, just HTTP requests. Handles timeouts, retry with
//! exponential backoff on transient failures, and rate-limit aware waits on
//! 429 driven by the response's hint headers.

use super::rate_limit::{self, RateLimitDecision};
use crate::config::FetchConfig;
use crate::error::FetchError;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Statuses worth another attempt.
const RETRYABLE_STATUS: &[u16] = &[408, 413, 429, 500, 502, 503, 504, 521, 522, 524];

/// Base delay for exponential backoff.
const BACKOFF_BASE_MS: u64 = 500;

/// Normalized response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    /// The body parsed as JSON.
    Json(Value),
    /// The raw body, when it is not JSON.
    Text(String),
}

impl ResponseData {
    fn from_body(body: &str) -> Self {
        match serde_json::from_str(body) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(body.to_string()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Text(_) => None,
        }
    }
}

/// Response from an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Response body as text.
    pub body: String,
    /// Body decoded as JSON where possible.
    pub data: ResponseData,
}

impl HttpResponse {
    /// First header value with the given (lowercase) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

impl RequestBody {
    fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Empty => builder,
            Self::Json(v) => builder.json(v),
            Self::Form(fields) => builder.form(fields),
        }
    }
}

/// Retry bookkeeping for a single in-flight request.
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    last_error: Option<String>,
    next_delay: Duration,
}

impl RetryState {
    fn can_retry(&self, budget: u32) -> bool {
        self.attempt <= budget
    }
}

/// HTTP client for the acquisition layer.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
    retry_budget: u32,
    rate_limit_threshold: Duration,
    default_rate_limit_wait: Duration,
}

impl HttpClient {
    /// Build a client from the fetch configuration.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout: config.timeout(),
            retry_budget: config.retry_budget,
            rate_limit_threshold: config.rate_limit_wait_threshold(),
            default_rate_limit_wait: config.default_rate_limit_wait(),
        })
    }

    /// GET with retry.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        self.request(Method::GET, url, RequestBody::Empty).await
    }

    /// POST a JSON body. POST is never retried.
    pub async fn post_json(&self, url: &str, body: Value) -> Result<HttpResponse, FetchError> {
        self.request(Method::POST, url, RequestBody::Json(body)).await
    }

    /// POST form data (url-encoded). POST is never retried.
    pub async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<HttpResponse, FetchError> {
        self.request(Method::POST, url, RequestBody::Form(fields.to_vec()))
            .await
    }

    /// Single GET bounded by `timeout` instead of the per-attempt timeout.
    ///
    /// Never retried: for calls where each attempt is expensive on the other
    /// side, such as a render service launching a browser.
    pub async fn get_once(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
        self.send(Method::GET, url, &RequestBody::Empty, timeout, 0)
            .await
    }

    /// Send a request, retrying transient failures within the retry budget.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
    ) -> Result<HttpResponse, FetchError> {
        self.send(method, url, &body, self.timeout, self.retry_budget)
            .await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: &RequestBody,
        timeout: Duration,
        retry_budget: u32,
    ) -> Result<HttpResponse, FetchError> {
        let idempotent = is_idempotent(&method);
        let mut state = RetryState::default();

        loop {
            state.attempt += 1;

            let builder = self.client.request(method.clone(), url).timeout(timeout);
            let result = body.apply(builder).send().await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if !is_failure(status) {
                        return normalize(url, resp, state.attempt).await;
                    }

                    let retryable = idempotent
                        && state.can_retry(retry_budget)
                        && RETRYABLE_STATUS.contains(&status.as_u16());
                    if !retryable {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }

                    state.last_error = Some(format!("HTTP {status}"));
                    state.next_delay = if status == StatusCode::TOO_MANY_REQUESTS {
                        let wait =
                            rate_limit::hinted_wait(resp.headers(), self.default_rate_limit_wait);
                        match rate_limit::decide(wait, self.rate_limit_threshold) {
                            RateLimitDecision::Abort(wait) => {
                                warn!(
                                    url,
                                    wait_secs = wait.as_secs_f64(),
                                    "rate limit exceeded, aborting request"
                                );
                                return Err(FetchError::RateLimitExceeded {
                                    url: url.to_string(),
                                    wait,
                                });
                            }
                            RateLimitDecision::Wait(wait) => {
                                warn!(
                                    url,
                                    wait_secs = wait.as_secs_f64(),
                                    "rate limit exceeded, retrying after backoff"
                                );
                                wait
                            }
                        }
                    } else {
                        backoff(state.attempt)
                    };
                }
                Err(e) => {
                    let retryable = idempotent
                        && state.can_retry(retry_budget)
                        && (e.is_timeout() || e.is_connect() || e.is_request());
                    if !retryable {
                        return Err(FetchError::Transport {
                            url: url.to_string(),
                            attempts: state.attempt,
                            source: e,
                        });
                    }
                    state.last_error = Some(e.to_string());
                    state.next_delay = backoff(state.attempt);
                }
            }

            warn!(
                url,
                attempt = state.attempt,
                error = state.last_error.as_deref().unwrap_or_default(),
                "request failed, retrying"
            );
            tokio::time::sleep(state.next_delay).await;
        }
    }
}

/// Methods safe to replay.
fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

fn is_failure(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

/// 500ms, 1s, 2s, ...
fn backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    Duration::from_millis(BACKOFF_BASE_MS * 2u64.pow(exp))
}

async fn normalize(
    url: &str,
    resp: reqwest::Response,
    attempts: u32,
) -> Result<HttpResponse, FetchError> {
    let status = resp.status().as_u16();
    let final_url = resp.url().to_string();
    let headers: Vec<(String, String)> = resp
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();

    let body = resp.text().await.map_err(|e| FetchError::Transport {
        url: url.to_string(),
        attempts,
        source: e,
    })?;
    let data = ResponseData::from_body(&body);

    Ok(HttpResponse {
        url: url.to_string(),
        final_url,
        status,
        headers,
        body,
        data,
    })
}
