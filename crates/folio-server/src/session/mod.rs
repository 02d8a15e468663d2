//! Browser Session Manager
//!
//! One long-lived automated-browser session per source. The session lives in
//! a slot behind an async mutex: [`SessionManager::acquire`] hands out a
//! [`SessionHandle`] that borrows the slot, so a second acquisition for the
//! same source waits instead of launching a second browser, and a handle
//! cannot outlive the call that borrowed it.

pub mod chrome;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::BrowserConfig;
use crate::source::SourceId;

pub use chrome::ChromeLauncher;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("Browser resource unavailable for {source_id}: {reason}")]
    ResourceUnavailable { source_id: SourceId, reason: String },

    #[error("Browser command failed: {0}")]
    Command(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Unknown,
    Alive,
    Dead,
}

impl Liveness {
    fn as_u8(self) -> u8 {
        match self {
            Liveness::Unknown => 0,
            Liveness::Alive => 1,
            Liveness::Dead => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Liveness::Alive,
            2 => Liveness::Dead,
            _ => Liveness::Unknown,
        }
    }
}

/// Startup profile for one source's browser.
#[derive(Debug, Clone)]
pub struct LaunchProfile {
    /// Persistent profile directory, so cookies and unlocked state survive restarts
    pub user_data_dir: PathBuf,
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub window: (u32, u32),
    pub args: Vec<String>,
    /// Budget for a single DevTools command
    pub request_timeout: Duration,
}

impl LaunchProfile {
    pub fn from_config(browser: &BrowserConfig, user_data_dir: PathBuf, request_timeout: Duration) -> Self {
        let mut args: Vec<String> = chrome::STEALTH_ARGS.iter().map(|a| a.to_string()).collect();
        args.extend(browser.extra_args.iter().cloned());
        Self {
            user_data_dir,
            executable: browser.executable.clone(),
            headless: browser.headless,
            window: (browser.window_width, browser.window_height),
            args,
            request_timeout,
        }
    }
}

/// Page-level commands a source needs from a live browser.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Cheap no-op used as the health probe.
    async fn current_url(&self) -> Result<String, SessionError>;

    async fn navigate(&self, url: &str) -> Result<(), SessionError>;

    /// Wait until `selector` matches something. `Ok(false)` when the wait ran out.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, SessionError>;

    /// Evaluate a script in the page and return its JSON result.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SessionError>;

    /// Scroll to the bottom and back to trigger lazily rendered content.
    async fn scroll_cycle(&self, pause: Duration) -> Result<(), SessionError> {
        self.evaluate("window.scrollTo(0, document.body.scrollHeight); true").await?;
        tokio::time::sleep(pause).await;
        self.evaluate("window.scrollTo(0, 0); true").await?;
        Ok(())
    }

    /// Close the underlying resource. Errors are swallowed.
    async fn terminate(&self);
}

/// Starts browser sessions. Startup is not retried here; callers decide.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(
        &self,
        source: SourceId,
        profile: &LaunchProfile,
    ) -> Result<Box<dyn BrowserSession>, SessionError>;
}

struct SessionSlot {
    session: Option<Box<dyn BrowserSession>>,
}

pub struct SessionManager {
    source: SourceId,
    launcher: Arc<dyn BrowserLauncher>,
    profile: LaunchProfile,
    startup_timeout: Duration,
    slot: Mutex<SessionSlot>,
    /// Mirror of the slot's liveness, readable without taking the slot lock
    liveness: AtomicU8,
    launches: AtomicU64,
}

impl SessionManager {
    pub fn new(
        source: SourceId,
        launcher: Arc<dyn BrowserLauncher>,
        profile: LaunchProfile,
        startup_timeout: Duration,
    ) -> Self {
        tracing::debug!(source = %source, profile_dir = %profile.user_data_dir.display(), "Creating session manager");
        Self {
            source,
            launcher,
            profile,
            startup_timeout,
            slot: Mutex::new(SessionSlot { session: None }),
            liveness: AtomicU8::new(Liveness::Unknown.as_u8()),
            launches: AtomicU64::new(0),
        }
    }

    /// Last known liveness. Never waits on an in-flight extraction.
    pub fn liveness(&self) -> Liveness {
        Liveness::from_u8(self.liveness.load(Ordering::Acquire))
    }

    /// Number of browser launches attempted so far.
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }

    fn publish(&self, liveness: Liveness) {
        self.liveness.store(liveness.as_u8(), Ordering::Release);
    }

    /// Return the live session, connecting first unless it is known `Alive`.
    pub async fn acquire(&self) -> Result<SessionHandle<'_>, SessionError> {
        let mut slot = self.slot.lock().await;
        if self.liveness() != Liveness::Alive || slot.session.is_none() {
            self.connect(&mut slot).await?;
        }
        Ok(SessionHandle { manager: self, slot })
    }

    /// Release is a no-op: sessions are reused across ticks. Dropping the
    /// handle returns the slot.
    pub fn release(handle: SessionHandle<'_>) {
        drop(handle);
    }

    /// Close the session for good (shutdown path).
    pub async fn terminate(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(session) = slot.session.take() {
            tracing::info!(source = %self.source, "Terminating browser session");
            session.terminate().await;
        }
        self.publish(Liveness::Unknown);
    }

    /// Tear down whatever is in the slot, then launch a fresh session.
    async fn connect(&self, slot: &mut SessionSlot) -> Result<(), SessionError> {
        if let Some(stale) = slot.session.take() {
            tracing::debug!(source = %self.source, "Tearing down previous session before connect");
            stale.terminate().await;
        }
        self.publish(Liveness::Unknown);

        let start = Instant::now();
        self.launches.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            source = %self.source,
            startup_timeout_secs = %self.startup_timeout.as_secs(),
            "Starting browser session"
        );

        match tokio::time::timeout(self.startup_timeout, self.launcher.launch(self.source, &self.profile)).await {
            Ok(Ok(session)) => {
                slot.session = Some(session);
                self.publish(Liveness::Alive);
                tracing::info!(
                    source = %self.source,
                    duration_ms = %start.elapsed().as_millis(),
                    "Browser session started"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                self.publish(Liveness::Dead);
                tracing::error!(source = %self.source, error = %e, "Browser session failed to start");
                Err(SessionError::ResourceUnavailable {
                    source_id: self.source,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                self.publish(Liveness::Dead);
                tracing::error!(
                    source = %self.source,
                    startup_timeout_secs = %self.startup_timeout.as_secs(),
                    "Browser session startup timed out"
                );
                Err(SessionError::ResourceUnavailable {
                    source_id: self.source,
                    reason: format!("startup timed out after {}s", self.startup_timeout.as_secs()),
                })
            }
        }
    }
}

/// Exclusive borrow of a source's session for the duration of one use.
pub struct SessionHandle<'a> {
    manager: &'a SessionManager,
    slot: MutexGuard<'a, SessionSlot>,
}

impl<'a> SessionHandle<'a> {
    pub fn liveness(&self) -> Liveness {
        self.manager.liveness()
    }

    pub fn session(&self) -> Result<&dyn BrowserSession, SessionError> {
        match &self.slot.session {
            Some(session) if self.liveness() != Liveness::Dead => Ok(session.as_ref()),
            _ => Err(SessionError::ResourceUnavailable {
                source_id: self.manager.source,
                reason: "session is not alive".to_string(),
            }),
        }
    }

    /// Probe the session with a cheap command; any failure means `Dead`.
    pub async fn health_check(&mut self) -> Liveness {
        let liveness = match &self.slot.session {
            None => Liveness::Dead,
            Some(session) => match session.current_url().await {
                Ok(_) => Liveness::Alive,
                Err(e) => {
                    tracing::warn!(source = %self.manager.source, error = %e, "Browser session failed health check");
                    Liveness::Dead
                }
            },
        };
        self.manager.publish(liveness);
        liveness
    }

    /// Best-effort teardown of the current session followed by a fresh connect.
    pub async fn reconnect(&mut self) -> Result<(), SessionError> {
        tracing::info!(source = %self.manager.source, "Reconnecting browser session");
        self.manager.connect(&mut self.slot).await
    }
}
