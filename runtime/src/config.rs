//! Fetch configuration.
//!
//! Every knob the acquisition layer consumes lives in [`FetchConfig`]. Values
//! come from `Default`, from serde (any format the caller likes), or from the
//! process environment via [`FetchConfig::from_env`].

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Chrome user-agent sent when `UA` is not configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/131.0.0.0 Safari/537.36";

/// Retry budget when `REQUEST_RETRY` is unset.
pub const DEFAULT_RETRY_BUDGET: u32 = 2;
/// Per-attempt request timeout when `REQUEST_TIMEOUT` is unset.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Longest rate-limit wait the transport will sleep through.
pub const DEFAULT_RATE_LIMIT_THRESHOLD_MS: u64 = 15_000;
/// Wait used when a 429 carries no usable hint header.
pub const DEFAULT_RATE_LIMIT_WAIT_MS: u64 = 10_000;
/// Readiness polling deadline for browser renders.
pub const DEFAULT_RENDER_DEADLINE_MS: u64 = 50_000;
/// Navigation timeout for browser renders.
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 50_000;
/// Interval between readiness checks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Top-level configuration for the fetch layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Number of retries after the first attempt.
    pub retry_budget: u32,
    /// Per-attempt HTTP timeout.
    pub timeout_ms: u64,
    pub user_agent: String,
    /// Rate-limit waits above this abort with `RateLimitExceeded`.
    pub rate_limit_wait_threshold_ms: u64,
    /// Wait used for a 429 without a parseable hint.
    pub default_rate_limit_wait_ms: u64,
    pub render_deadline_ms: u64,
    pub navigation_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Remote rendering service endpoint. Takes precedence over a local browser.
    pub render_service_url: Option<String>,
    /// Local browser executable, absolute path or a name looked up on `PATH`.
    pub browser_executable_path: Option<PathBuf>,
    /// Run the local browser without a window.
    pub headless: bool,
    pub cache: CacheConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            rate_limit_wait_threshold_ms: DEFAULT_RATE_LIMIT_THRESHOLD_MS,
            default_rate_limit_wait_ms: DEFAULT_RATE_LIMIT_WAIT_MS,
            render_deadline_ms: DEFAULT_RENDER_DEADLINE_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            render_service_url: None,
            browser_executable_path: None,
            headless: true,
            cache: CacheConfig::default(),
        }
    }
}

/// Cache lifetime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a computed value stays live.
    pub ttl_secs: u64,
    /// Upper bound on stored entries before eviction.
    pub max_entries: usize,
    /// Whether a hit pushes the expiry forward.
    pub refresh_on_hit: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 1024,
            refresh_on_hit: true,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// The browser backend selected by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserBackend {
    /// Delegate rendering to a remote service over HTTP.
    RemoteService(Url),
    /// Drive a local browser process.
    Local { executable: PathBuf },
}

impl FetchConfig {
    /// Load configuration from the process environment on top of defaults.
    pub fn from_env() -> Result<Self, FetchError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FetchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("REQUEST_RETRY") {
            config.retry_budget = parse_number("REQUEST_RETRY", &v)?;
        }
        if let Some(v) = var("REQUEST_TIMEOUT") {
            config.timeout_ms = parse_number("REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = var("UA") {
            config.user_agent = v;
        }
        if let Some(v) = var("PUPPETEER_REAL_BROWSER_SERVICE") {
            config.render_service_url = Some(v);
        }
        if let Some(v) = var("CHROMIUM_EXECUTABLE_PATH") {
            config.browser_executable_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var("BROWSER_HEADLESS") {
            config.headless = !matches!(v.trim(), "0" | "false" | "no");
        }
        if let Some(v) = var("CACHE_CONTENT_EXPIRE") {
            config.cache.ttl_secs = parse_number("CACHE_CONTENT_EXPIRE", &v)?;
        }
        if let Some(v) = var("CACHE_MAX_ENTRIES") {
            config.cache.max_entries = parse_number("CACHE_MAX_ENTRIES", &v)?;
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn rate_limit_wait_threshold(&self) -> Duration {
        Duration::from_millis(self.rate_limit_wait_threshold_ms)
    }

    pub fn default_rate_limit_wait(&self) -> Duration {
        Duration::from_millis(self.default_rate_limit_wait_ms)
    }

    pub fn render_deadline(&self) -> Duration {
        Duration::from_millis(self.render_deadline_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Time a single render may take: navigation, then readiness polling.
    pub fn render_timeout(&self) -> Duration {
        self.navigation_timeout() + self.render_deadline()
    }

    /// Upper bound for a whole browser fetch: navigation, polling, capture.
    pub fn browser_fetch_timeout(&self) -> Duration {
        self.render_timeout() + self.timeout()
    }

    /// Resolve which browser backend to use.
    ///
    /// Fails with [`FetchError::Configuration`] when neither a render service
    /// nor a browser executable is configured, or when the configured value
    /// is unusable.
    pub fn browser_backend(&self) -> Result<BrowserBackend, FetchError> {
        if let Some(raw) = &self.render_service_url {
            let url = Url::parse(raw).map_err(|e| {
                FetchError::Configuration(format!("invalid render service url {raw:?}: {e}"))
            })?;
            if self.browser_executable_path.is_some() {
                tracing::debug!("render service configured, ignoring local browser path");
            }
            return Ok(BrowserBackend::RemoteService(url));
        }

        if let Some(path) = &self.browser_executable_path {
            return resolve_executable(path).map(|executable| BrowserBackend::Local { executable });
        }

        Err(FetchError::Configuration(
            "PUPPETEER_REAL_BROWSER_SERVICE or CHROMIUM_EXECUTABLE_PATH is required for browser fetches"
                .to_string(),
        ))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, FetchError> {
    value
        .trim()
        .parse()
        .map_err(|_| FetchError::Configuration(format!("{key} must be a number, got {value:?}")))
}

/// Absolute paths are taken as-is; bare names are looked up on `PATH`.
fn resolve_executable(path: &Path) -> Result<PathBuf, FetchError> {
    if path.components().count() > 1 || path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    which::which(path).map_err(|e| {
        FetchError::Configuration(format!(
            "browser executable {} not found on PATH: {e}",
            path.display()
        ))
    })
}
