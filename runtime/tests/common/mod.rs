//! Scripted browser sessions and renderers shared by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use pagefetch_runtime::renderer::{BrowserLauncher, BrowserSession, PageRenderer};
use pagefetch_runtime::RenderFailure;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a scripted session behaves.
#[derive(Debug, Clone)]
pub struct SessionScript {
    pub fail_launch: bool,
    pub navigate_fails: bool,
    pub navigate_delay: Duration,
    /// Readiness check that first succeeds; `None` never matches.
    pub ready_after: Option<u32>,
    /// Readiness checks throw instead of answering `false`.
    pub check_errors: bool,
    pub capture_fails: bool,
    pub content: String,
}

impl Default for SessionScript {
    fn default() -> Self {
        Self {
            fail_launch: false,
            navigate_fails: false,
            navigate_delay: Duration::ZERO,
            ready_after: Some(1),
            check_errors: false,
            capture_fails: false,
            content: "<html><body><div class=\"view\">ok</div></body></html>".to_string(),
        }
    }
}

/// Counts launched and closed sessions.
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub launched: AtomicUsize,
    pub closed: AtomicUsize,
    pub navigations: AtomicUsize,
}

impl SessionCounters {
    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct ScriptedLauncher {
    pub script: SessionScript,
    pub counters: Arc<SessionCounters>,
}

impl ScriptedLauncher {
    pub fn new(script: SessionScript) -> (Arc<Self>, Arc<SessionCounters>) {
        let counters = Arc::new(SessionCounters::default());
        let launcher = Arc::new(Self {
            script,
            counters: Arc::clone(&counters),
        });
        (launcher, counters)
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, RenderFailure> {
        if self.script.fail_launch {
            return Err(RenderFailure::Launch("executable not found".into()));
        }
        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
            checks: AtomicUsize::new(0),
        }))
    }
}

struct ScriptedSession {
    script: SessionScript,
    counters: Arc<SessionCounters>,
    checks: AtomicUsize,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.script.navigate_delay).await;
        if self.script.navigate_fails {
            bail!("net::ERR_NAME_NOT_RESOLVED at {url}");
        }
        Ok(())
    }

    async fn selector_present(&self, _selector: &str) -> Result<bool> {
        let n = self.checks.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        if self.script.check_errors {
            return Err(anyhow!("Execution context was destroyed"));
        }
        Ok(matches!(self.script.ready_after, Some(after) if n >= after))
    }

    async fn content(&self) -> Result<String> {
        if self.script.capture_fails {
            bail!("Target closed");
        }
        Ok(self.script.content.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Renderer answering from a fixed URL → HTML table.
#[derive(Default)]
pub struct TableRenderer {
    pages: HashMap<String, std::result::Result<String, RenderFailure>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl TableRenderer {
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), Ok(html.to_string()));
        self
    }

    pub fn with_failure(mut self, url: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Err(RenderFailure::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".into(),
            }),
        );
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl PageRenderer for TableRenderer {
    async fn render(&self, url: &str, _selector: &str) -> std::result::Result<String, RenderFailure> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        tokio::time::sleep(self.delay).await;
        self.pages.get(url).cloned().unwrap_or_else(|| Ok(String::new()))
    }
}
