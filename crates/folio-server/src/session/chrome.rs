//! Chrome DevTools backend for [`BrowserLauncher`].

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{BrowserLauncher, BrowserSession, LaunchProfile, SessionError};
use crate::source::SourceId;

/// Flags that keep the page from advertising automation.
pub const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-dev-shm-usage",
    "--disable-software-rasterizer",
];

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(
        &self,
        source: SourceId,
        profile: &LaunchProfile,
    ) -> Result<Box<dyn BrowserSession>, SessionError> {
        let unavailable = |reason: String| SessionError::ResourceUnavailable {
            source_id: source,
            reason,
        };

        std::fs::create_dir_all(&profile.user_data_dir)
            .map_err(|e| unavailable(format!("profile dir {}: {}", profile.user_data_dir.display(), e)))?;

        let mut builder = CdpConfig::builder()
            .user_data_dir(&profile.user_data_dir)
            .window_size(profile.window.0, profile.window.1)
            .request_timeout(profile.request_timeout)
            .args(profile.args.clone());
        if !profile.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &profile.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(unavailable)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!(source = %source, error = %e, "CDP handler event error");
                }
            }
            tracing::debug!(source = %source, "CDP handler finished");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let mut browser = browser;
                let _ = browser.close().await;
                handler_task.abort();
                return Err(unavailable(e.to_string()));
            }
        };

        tracing::debug!(source = %source, "Chrome page opened");
        Ok(Box::new(ChromeSession {
            source,
            page,
            browser: Mutex::new(Some(browser)),
            handler_task: std::sync::Mutex::new(Some(handler_task)),
        }))
    }
}

pub struct ChromeSession {
    source: SourceId,
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

fn command_error(e: impl std::fmt::Display) -> SessionError {
    SessionError::Command(e.to_string())
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn current_url(&self) -> Result<String, SessionError> {
        let url = self.page.url().await.map_err(command_error)?;
        Ok(url.unwrap_or_default())
    }

    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        tracing::debug!(source = %self.source, url = %url, "Navigating");
        self.page.goto(url).await.map_err(command_error)?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, SessionError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SessionError> {
        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(command_error)?;
        let result = self.page.evaluate_expression(params).await.map_err(command_error)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn terminate(&self) {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                tracing::debug!(source = %self.source, error = %e, "Browser close failed, ignoring");
            }
            let _ = browser.wait().await;
        }
        let task = self.handler_task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            task.abort();
        }
    }
}
