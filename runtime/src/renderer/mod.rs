//! Renderer abstraction for browser-based page rendering.
//!
//! [`PageRenderer`] is the contract the orchestrator sees: a URL and a
//! readiness selector in, rendered HTML out. Two backends implement it, a
//! remote rendering service ([`remote::RemoteRenderer`]) and a local browser
//! ([`session::LocalRenderer`]) driven through the [`BrowserLauncher`] and
//! [`BrowserSession`] traits (currently Chromium via chromiumoxide).

pub mod chromium;
pub mod remote;
pub mod session;

use crate::error::RenderFailure;
use anyhow::Result;
use async_trait::async_trait;

/// Renders a page until it is ready and returns its HTML.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render `url`, waiting for `selector` to appear.
    ///
    /// An exhausted readiness deadline is not an error: whatever was rendered
    /// by then is returned.
    async fn render(&self, url: &str, selector: &str) -> Result<String, RenderFailure>;
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Start a fresh session. Each call owns a new browser; nothing is reused.
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, RenderFailure>;
}

/// A live browser with one page, owned by a single render.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate the page to a URL.
    async fn navigate(&mut self, url: &str) -> Result<()>;
    /// Whether an element matching the CSS selector exists in the document.
    async fn selector_present(&self, selector: &str) -> Result<bool>;
    /// Full rendered HTML of the page.
    async fn content(&self) -> Result<String>;
    /// Close the page and shut the browser down.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Script that reports whether `selector` matches anything.
pub(crate) fn selector_check_script(selector: &str) -> String {
    // JSON string literals are valid JS string literals.
    let literal = serde_json::Value::String(selector.to_string()).to_string();
    format!("document.querySelector({literal}) !== null")
}
