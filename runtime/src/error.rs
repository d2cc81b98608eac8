//! Error taxonomy for the acquisition layer.
//!
//! Transport failures are retried locally before they surface here. Render
//! failures are absorbed at the [`Fetcher`](crate::fetcher::Fetcher) boundary.
//! Only configuration errors and "no usable content" are meant for end users.

use std::time::Duration;

/// All errors that can occur while acquiring a page.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("request {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error(
        "rate limit exceeded for {url}, the request has been aborted, please try again after {}s",
        wait.as_secs_f64()
    )]
    RateLimitExceeded { url: String, wait: Duration },

    #[error("render failed: {0}")]
    Render(#[from] RenderFailure),

    #[error("fetching {url} timed out after {}ms", after.as_millis())]
    Timeout { url: String, after: Duration },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to fetch {url}: page may not exist or has no content")]
    NoContent { url: String },
}

impl FetchError {
    /// Whether this error came from configuration rather than the network.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// The rate-limit wait carried by [`FetchError::RateLimitExceeded`].
    pub fn rate_limit_wait(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { wait, .. } => Some(*wait),
            _ => None,
        }
    }
}

/// Why a browser render produced no content.
///
/// Readiness timeouts are deliberately absent: they degrade to best-effort
/// content instead of failing.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderFailure {
    #[error("failed to start browser session: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("failed to capture page content: {0}")]
    Capture(String),

    #[error("render service request failed: {0}")]
    Service(String),
}
