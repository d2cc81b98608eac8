//! Local browser rendering as an explicit state machine.
//!
//! ```text
//! Navigating ──ok──▶ Polling ──match──▶ Ready
//!     │                 │
//!     │                 └──deadline──▶ TimedOut
//!     └──error/timeout──▶ Failed
//! ```
//!
//! Every terminal state funnels into one terminal action: capture the content
//! (Ready and TimedOut only), then close the session.

use super::{BrowserLauncher, BrowserSession, PageRenderer};
use crate::config::FetchConfig;
use crate::error::RenderFailure;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Upper bound for shutting a session down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a render is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    Navigating,
    Polling,
    /// The readiness selector matched.
    Ready,
    /// The deadline passed without a match. Content is still captured.
    TimedOut,
    Failed(RenderFailure),
}

impl RenderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::TimedOut | Self::Failed(_))
    }
}

/// What a render produced, before the orchestrator collapses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    pub content: String,
    pub state: RenderState,
    /// Readiness checks performed.
    pub polls: u32,
}

impl RenderOutcome {
    fn failed(failure: RenderFailure) -> Self {
        Self {
            content: String::new(),
            state: RenderState::Failed(failure),
            polls: 0,
        }
    }

    /// Best-effort content for Ready and TimedOut, the failure otherwise.
    pub fn into_result(self) -> Result<String, RenderFailure> {
        match self.state {
            RenderState::Failed(failure) => Err(failure),
            _ => Ok(self.content),
        }
    }
}

/// Time bounds for one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTiming {
    pub navigation_timeout: Duration,
    /// Polling deadline, counted from the end of navigation.
    pub deadline: Duration,
    pub poll_interval: Duration,
}

impl From<&FetchConfig> for RenderTiming {
    fn from(config: &FetchConfig) -> Self {
        Self {
            navigation_timeout: config.navigation_timeout(),
            deadline: config.render_deadline(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Drive an owned session from navigation to close.
///
/// The session is closed before this returns, on every path.
pub async fn drive(
    mut session: Box<dyn BrowserSession>,
    url: &str,
    selector: &str,
    timing: RenderTiming,
) -> RenderOutcome {
    let mut state = RenderState::Navigating;
    let mut polls = 0u32;
    let mut polling_since = Instant::now();

    while !state.is_terminal() {
        state = match state {
            RenderState::Navigating => {
                match timeout(timing.navigation_timeout, session.navigate(url)).await {
                    Ok(Ok(())) => {
                        polling_since = Instant::now();
                        RenderState::Polling
                    }
                    Ok(Err(e)) => RenderState::Failed(RenderFailure::Navigation {
                        url: url.to_string(),
                        reason: format!("{e:#}"),
                    }),
                    Err(_) => RenderState::Failed(RenderFailure::Navigation {
                        url: url.to_string(),
                        reason: format!(
                            "timed out after {}ms",
                            timing.navigation_timeout.as_millis()
                        ),
                    }),
                }
            }
            RenderState::Polling => {
                polls += 1;
                // A check that errors or hangs means "not yet".
                let ready = matches!(
                    timeout(timing.poll_interval, session.selector_present(selector)).await,
                    Ok(Ok(true))
                );
                if ready {
                    RenderState::Ready
                } else if polling_since.elapsed() >= timing.deadline {
                    RenderState::TimedOut
                } else {
                    sleep(timing.poll_interval).await;
                    RenderState::Polling
                }
            }
            terminal => terminal,
        };
        debug!(url, ?state, polls, "render state");
    }

    let mut content = String::new();
    if matches!(state, RenderState::Ready | RenderState::TimedOut) {
        if state == RenderState::TimedOut {
            warn!(url, selector, "readiness deadline elapsed, capturing current content");
        }
        match timeout(timing.navigation_timeout, session.content()).await {
            Ok(Ok(html)) => content = html,
            Ok(Err(e)) => state = RenderState::Failed(RenderFailure::Capture(format!("{e:#}"))),
            Err(_) => {
                state = RenderState::Failed(RenderFailure::Capture("capture timed out".into()))
            }
        }
    }

    release(session, url).await;

    RenderOutcome {
        content,
        state,
        polls,
    }
}

async fn release(session: Box<dyn BrowserSession>, url: &str) {
    match timeout(CLOSE_TIMEOUT, session.close()).await {
        Ok(Ok(())) => debug!(url, "browser session closed"),
        Ok(Err(e)) => warn!(url, "failed to close browser session: {e:#}"),
        Err(_) => warn!(url, "closing browser session timed out"),
    }
}

/// Session counters for a [`LocalRenderer`].
#[derive(Debug, Default)]
struct SessionStats {
    launched: AtomicUsize,
    active: AtomicUsize,
}

/// Renders pages with a locally launched browser, one session per render.
pub struct LocalRenderer {
    launcher: Arc<dyn BrowserLauncher>,
    timing: RenderTiming,
    stats: Arc<SessionStats>,
}

impl LocalRenderer {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, timing: RenderTiming) -> Self {
        Self {
            launcher,
            timing,
            stats: Arc::new(SessionStats::default()),
        }
    }

    /// Render and keep the terminal state for inspection.
    ///
    /// The session work runs on its own task, so dropping this future (for
    /// example on an outer timeout) never skips closing the session.
    pub async fn render_outcome(&self, url: &str, selector: &str) -> RenderOutcome {
        let launcher = Arc::clone(&self.launcher);
        let stats = Arc::clone(&self.stats);
        let timing = self.timing;
        let url = url.to_string();
        let selector = selector.to_string();

        let task = tokio::spawn(async move {
            let session = match launcher.launch().await {
                Ok(session) => session,
                Err(failure) => {
                    warn!(url = %url, "failed to launch browser session: {failure}");
                    return RenderOutcome::failed(failure);
                }
            };
            stats.launched.fetch_add(1, Ordering::Relaxed);
            stats.active.fetch_add(1, Ordering::Relaxed);
            info!(url = %url, selector = %selector, "browser session started");

            let outcome = drive(session, &url, &selector, timing).await;
            stats.active.fetch_sub(1, Ordering::Relaxed);
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => RenderOutcome::failed(RenderFailure::Launch(format!(
                "render task aborted: {e}"
            ))),
        }
    }

    /// Sessions launched over this renderer's lifetime.
    pub fn sessions_launched(&self) -> usize {
        self.stats.launched.load(Ordering::Relaxed)
    }

    /// Sessions currently open.
    pub fn active_sessions(&self) -> usize {
        self.stats.active.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PageRenderer for LocalRenderer {
    async fn render(&self, url: &str, selector: &str) -> Result<String, RenderFailure> {
        self.render_outcome(url, selector).await.into_result()
    }
}
