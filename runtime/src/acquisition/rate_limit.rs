//! Rate-limit hint parsing for 429 responses.

use reqwest::header::HeaderMap;
use std::time::Duration;

/// Header consulted first for the wait hint.
pub const RETRY_AFTER: &str = "retry-after";
/// Fallback hint header when `retry-after` is absent.
pub const RATE_LIMIT_REMAINING: &str = "x-rate-limit-remaining";

/// What to do with a rate-limited response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Sleep for the duration, then retry the same request.
    Wait(Duration),
    /// The wait is over the threshold; fail with the required wait.
    Abort(Duration),
}

/// Read the wait hint from the response headers.
///
/// `retry-after` wins over `x-rate-limit-remaining`. A present header that
/// is not a number yields `default`, it does not fall through to the next
/// header. A blank value or a negative number means no wait; `Infinity`
/// means a wait no threshold allows.
pub fn hinted_wait(headers: &HeaderMap, default: Duration) -> Duration {
    let raw = headers
        .get(RETRY_AFTER)
        .or_else(|| headers.get(RATE_LIMIT_REMAINING));

    raw.and_then(|v| v.to_str().ok())
        .and_then(parse_seconds)
        .unwrap_or(default)
}

/// Decide between sleeping and aborting.
pub fn decide(wait: Duration, threshold: Duration) -> RateLimitDecision {
    if wait > threshold {
        RateLimitDecision::Abort(wait)
    } else {
        RateLimitDecision::Wait(wait)
    }
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return Some(Duration::ZERO);
    }
    let secs: f64 = value.parse().ok()?;
    if secs.is_nan() {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX))
}
