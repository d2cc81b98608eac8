//! Fetch orchestration.
//!
//! [`Fetcher`] is what callers use. It picks plain HTTP or a browser render
//! per request, bounds the whole operation with the request's timeout, and
//! owns the one place where failures collapse into empty content.

use crate::acquisition::http_client::{HttpClient, HttpResponse};
use crate::acquisition::readiness;
use crate::config::{BrowserBackend, FetchConfig};
use crate::error::FetchError;
use crate::renderer::chromium::ChromiumLauncher;
use crate::renderer::remote::RemoteRenderer;
use crate::renderer::session::{LocalRenderer, RenderTiming};
use crate::renderer::PageRenderer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Selector used for browser fetches that name none.
const DEFAULT_READINESS_SELECTOR: &str = "body";

/// How a request should be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Plain HTTP only.
    Plain,
    /// Always render in a browser.
    Browser,
    /// Plain HTTP first, browser when the static page is not ready.
    Auto,
}

/// A single fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub readiness_selector: Option<String>,
    pub mode: FetchMode,
    /// Bound for the whole operation, retries and rendering included.
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, mode: FetchMode, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            readiness_selector: None,
            mode,
            timeout,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.readiness_selector = Some(selector.into());
        self
    }
}

/// Collapsed outcome handed to callers that only want content.
///
/// Empty content with `succeeded == true` means the page had nothing to
/// offer; `succeeded == false` means the fetch itself failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub content: String,
    pub succeeded: bool,
}

impl From<Result<String, FetchError>> for FetchResult {
    fn from(result: Result<String, FetchError>) -> Self {
        match result {
            Ok(content) => Self {
                content,
                succeeded: true,
            },
            Err(_) => Self::default(),
        }
    }
}

/// The fetch orchestrator.
#[derive(Clone)]
pub struct Fetcher {
    config: FetchConfig,
    http: HttpClient,
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl Fetcher {
    /// Build a fetcher with the browser backend named by `config`.
    ///
    /// Fails fast with [`FetchError::Configuration`] when neither a render
    /// service nor a browser executable is configured.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http = HttpClient::new(&config)?;
        let renderer: Arc<dyn PageRenderer> = match config.browser_backend()? {
            BrowserBackend::RemoteService(endpoint) => {
                info!(%endpoint, "using remote rendering service");
                Arc::new(RemoteRenderer::new(
                    endpoint,
                    http.clone(),
                    config.render_timeout(),
                ))
            }
            BrowserBackend::Local { executable } => {
                info!(executable = %executable.display(), "using local browser");
                let launcher = ChromiumLauncher::new(executable, config.headless);
                Arc::new(LocalRenderer::new(
                    Arc::new(launcher),
                    RenderTiming::from(&config),
                ))
            }
        };

        Ok(Self {
            config,
            http,
            renderer: Some(renderer),
        })
    }

    /// Build a fetcher with no browser backend; browser requests fail.
    pub fn http_only(config: FetchConfig) -> Result<Self, FetchError> {
        let http = HttpClient::new(&config)?;
        Ok(Self {
            config,
            http,
            renderer: None,
        })
    }

    /// Build a fetcher around an existing renderer.
    pub fn with_renderer(
        config: FetchConfig,
        renderer: Arc<dyn PageRenderer>,
    ) -> Result<Self, FetchError> {
        let http = HttpClient::new(&config)?;
        Ok(Self {
            config,
            http,
            renderer: Some(renderer),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The underlying transport, for callers that need raw responses.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Browser request for `url` with the configured overall timeout.
    pub fn page_request(&self, url: &str, selector: &str) -> FetchRequest {
        FetchRequest::new(url, FetchMode::Browser, self.config.browser_fetch_timeout())
            .with_selector(selector)
    }

    /// Fetch and keep the failure reason.
    pub async fn try_fetch(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let work = async {
            match request.mode {
                FetchMode::Plain => self.http.get(&request.url).await.map(|r| r.body),
                FetchMode::Browser => self.fetch_rendered(request).await,
                FetchMode::Auto => self.fetch_auto(request).await,
            }
        };

        match tokio::time::timeout(request.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: request.url.clone(),
                after: request.timeout,
            }),
        }
    }

    /// Fetch, collapsing any failure into empty content.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchResult {
        let result = self.try_fetch(request).await;
        match &result {
            Err(e) if e.is_configuration() => error!(url = %request.url, "{e}"),
            Err(e) => warn!(url = %request.url, "fetch failed, returning empty content: {e}"),
            Ok(_) => {}
        }
        FetchResult::from(result)
    }

    /// Rendered HTML for `url` once `selector` appears, or empty string.
    ///
    /// Empty means "no usable content": the page may not exist, may have no
    /// matching content, or the fetch failed. Callers cannot tell which.
    pub async fn fetch_page(&self, url: &str, selector: &str) -> String {
        self.fetch(&self.page_request(url, selector)).await.content
    }

    fn renderer(&self) -> Result<&Arc<dyn PageRenderer>, FetchError> {
        self.renderer.as_ref().ok_or_else(|| {
            FetchError::Configuration(
                "browser fetch requested but no rendering backend is configured".to_string(),
            )
        })
    }

    async fn fetch_rendered(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let renderer = self.renderer()?;
        let selector = request
            .readiness_selector
            .as_deref()
            .unwrap_or(DEFAULT_READINESS_SELECTOR);
        Ok(renderer.render(&request.url, selector).await?)
    }

    async fn fetch_auto(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let plain = self.http.get(&request.url).await;
        let selector = request.readiness_selector.as_deref();

        match (&plain, &self.renderer) {
            (Ok(resp), _) if readiness::is_ready(resp, selector) => {
                debug!(url = %request.url, "static content ready");
            }
            // The browser would hit the same limit.
            (Err(FetchError::RateLimitExceeded { .. }), _) => {}
            (_, None) => {}
            (_, Some(_)) => {
                describe_escalation(&request.url, &plain);
                return self.fetch_rendered(request).await;
            }
        }

        plain.map(|resp| resp.body)
    }
}

fn describe_escalation(url: &str, plain: &Result<HttpResponse, FetchError>) {
    match plain {
        Ok(resp) if readiness::looks_like_challenge(resp) => {
            info!(url, "bot challenge detected, escalating to browser")
        }
        Ok(_) => info!(url, "readiness selector missing from static page, escalating to browser"),
        Err(e) => info!(url, "plain fetch failed ({e}), escalating to browser"),
    }
}
