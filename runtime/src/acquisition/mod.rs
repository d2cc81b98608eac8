//! Plain-HTTP acquisition.
//!
//! The cheapest way to get a page: no browser, just a retrying HTTP client
//! and static checks that tell the orchestrator when to escalate.

pub mod http_client;
pub mod rate_limit;
pub mod readiness;
