//! Chromium-based browser sessions using chromiumoxide.

use super::{selector_check_script, BrowserLauncher, BrowserSession};
use crate::error::RenderFailure;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use tokio::task::JoinHandle;

/// Launches one Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: PathBuf,
    headless: bool,
}

impl ChromiumLauncher {
    pub fn new(executable: PathBuf, headless: bool) -> Self {
        Self {
            executable,
            headless,
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, RenderFailure> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&self.executable)
            .arg("--start-maximized")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled");
        if !self.headless {
            builder = builder.with_head();
        }
        builder
            .build()
            .map_err(|e| RenderFailure::Launch(format!("failed to build browser config: {e}")))
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, RenderFailure> {
        let config = self.browser_config()?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderFailure::Launch(format!("failed to launch Chromium: {e}")))?;

        // Spawn the handler task
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let session = ChromiumSession::without_page(browser, handler);
                session.shutdown().await;
                return Err(RenderFailure::Launch(format!("failed to create new page: {e}")));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page: Some(page),
            handler,
        }))
    }
}

/// A Chromium process and its single page.
pub struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    fn without_page(browser: Browser, handler: JoinHandle<()>) -> Self {
        Self {
            browser,
            page: None,
            handler,
        }
    }

    fn page(&self) -> Result<&Page> {
        self.page.as_ref().context("session has no page")
    }

    async fn shutdown(mut self) {
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }
        if let Err(e) = self.browser.close().await {
            tracing::debug!("browser close failed: {e}");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page()?
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        Ok(())
    }

    async fn selector_present(&self, selector: &str) -> Result<bool> {
        let result = self
            .page()?
            .evaluate(selector_check_script(selector))
            .await
            .context("readiness check failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert readiness result: {e:?}"))
    }

    async fn content(&self) -> Result<String> {
        self.page()?
            .content()
            .await
            .context("failed to get HTML")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        (*self).shutdown().await;
        Ok(())
    }
}
