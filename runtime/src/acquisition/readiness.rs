//! Static readiness checks on plain-HTTP responses.
//!
//! Used to decide whether a page fetched without a browser is good enough, or
//! whether the fetch must escalate to a rendered session.

use super::http_client::HttpResponse;
use scraper::{Html, Selector};

/// Body markers left by common bot-verification interstitials.
const CHALLENGE_MARKERS: &[&str] = &[
    "challenge-platform",
    "cf-browser-verification",
    "cf_chl_opt",
    "<title>Just a moment...</title>",
    "Checking your browser before accessing",
];

/// Whether an element matching `selector` exists in static `html`.
///
/// An invalid selector never matches.
pub fn selector_present(html: &str, selector: &str) -> bool {
    let Ok(selector) = Selector::parse(selector) else {
        tracing::debug!("invalid readiness selector: {selector}");
        return false;
    };
    Html::parse_document(html).select(&selector).next().is_some()
}

/// Whether the response looks like a bot challenge instead of the page.
pub fn looks_like_challenge(resp: &HttpResponse) -> bool {
    if resp
        .header("cf-mitigated")
        .is_some_and(|v| v.eq_ignore_ascii_case("challenge"))
    {
        return true;
    }
    CHALLENGE_MARKERS.iter().any(|m| resp.body.contains(m))
}

/// Whether a plain response can be returned without a browser.
pub fn is_ready(resp: &HttpResponse, selector: Option<&str>) -> bool {
    if looks_like_challenge(resp) {
        return false;
    }
    match selector {
        Some(sel) => selector_present(&resp.body, sel),
        None => true,
    }
}
