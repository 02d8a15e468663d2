//! Portfolio sources
//!
//! Each source turns one rendered dashboard page into a [`PortfolioSnapshot`].
//! Sources are stateless: the browser session is borrowed per call from the
//! session manager, and a failed call leaves nothing behind.

pub mod debank;
pub mod jupiter;
pub mod raw;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use folio_core::{ChainKind, PortfolioSnapshot, WalletAddress};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::{FilterConfig, SourceConfig};
use crate::session::{BrowserSession, SessionError};

pub use debank::DebankSource;
pub use jupiter::JupiterSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Jupiter,
    Debank,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Jupiter => "jupiter",
            SourceId::Debank => "debank",
        }
    }

    pub fn chain(&self) -> ChainKind {
        match self {
            SourceId::Jupiter => ChainKind::Solana,
            SourceId::Debank => ChainKind::Evm,
        }
    }

    /// Source serving a chain family. Every chain routes to exactly one source.
    pub fn for_chain(chain: ChainKind) -> Self {
        match chain {
            ChainKind::Solana => SourceId::Jupiter,
            ChainKind::Evm => SourceId::Debank,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extraction timed out: {0}")]
    Timeout(String),

    #[error("Portfolio content not found: {0}")]
    NotFound(String),

    #[error("Failed to parse page content: {0}")]
    ParseFailure(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ExtractionError {
    /// True when the failure came from the browser rather than the page.
    pub fn is_session_fault(&self) -> bool {
        matches!(self, ExtractionError::Session(_))
    }
}

#[async_trait]
pub trait PortfolioSource: Send + Sync {
    fn id(&self) -> SourceId;

    fn chain(&self) -> ChainKind {
        self.id().chain()
    }

    /// One fresh extraction attempt. Never resumes a previous attempt.
    async fn extract(
        &self,
        session: &dyn BrowserSession,
        wallet: &WalletAddress,
    ) -> Result<PortfolioSnapshot, ExtractionError>;
}

/// Page timing and filtering shared by the dashboard sources.
#[derive(Debug, Clone)]
pub struct PageSettings {
    pub base_url: String,
    pub page_timeout: Duration,
    /// How long to wait for the first project container to render
    pub interactive_wait: Duration,
    /// Pause after the container appears so lazy values fill in
    pub settle: Duration,
    pub min_usd_value: Decimal,
}

impl PageSettings {
    pub fn from_config(source: &SourceConfig, filters: &FilterConfig) -> Self {
        Self {
            base_url: source.base_url.trim_end_matches('/').to_string(),
            page_timeout: source.page_timeout(),
            interactive_wait: source.interactive_wait(),
            settle: source.settle(),
            min_usd_value: filters.min_usd_value,
        }
    }

    /// Navigate to `url` and wait for `marker` to render, then settle.
    pub(crate) async fn open(
        &self,
        session: &dyn BrowserSession,
        url: &str,
        marker: &str,
    ) -> Result<(), ExtractionError> {
        match tokio::time::timeout(self.page_timeout, session.navigate(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExtractionError::Timeout(format!(
                    "page load exceeded {}s",
                    self.page_timeout.as_secs()
                )))
            }
        }

        if !session.wait_for(marker, self.interactive_wait).await? {
            return Err(ExtractionError::NotFound(format!(
                "no project container rendered within {}s",
                self.interactive_wait.as_secs()
            )));
        }

        tokio::time::sleep(self.settle).await;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::{Duration as ChronoDuration, Utc};
    use folio_core::{Asset, Project, Section};
    use rust_decimal_macros::dec;

    /// What a scripted attempt does.
    #[derive(Debug, Clone)]
    pub enum Step {
        Succeed,
        Fail(ExtractionError),
        /// Sleep before succeeding, to trip the extraction timeout
        Hang(Duration),
    }

    /// Source that replays scripted outcomes and counts calls.
    pub struct ScriptedSource {
        id: SourceId,
        steps: Mutex<VecDeque<Step>>,
        fallback: Step,
        pub calls: AtomicUsize,
        pub calls_by_wallet: Mutex<Vec<String>>,
        /// Shifts captured_at, so a test can produce older snapshots
        pub clock_offset_secs: Mutex<i64>,
    }

    impl ScriptedSource {
        pub fn new(id: SourceId, steps: Vec<Step>, fallback: Step) -> Self {
            Self {
                id,
                steps: Mutex::new(steps.into()),
                fallback,
                calls: AtomicUsize::new(0),
                calls_by_wallet: Mutex::new(Vec::new()),
                clock_offset_secs: Mutex::new(0),
            }
        }

        pub fn always(id: SourceId, step: Step) -> Self {
            Self::new(id, vec![], step)
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub fn snapshot_for(wallet: &WalletAddress) -> PortfolioSnapshot {
        let project = Project {
            name: "Kamino".to_string(),
            chain_tag: wallet.chain().to_string(),
            total_value: dec!(120),
            sections: vec![Section::Farming {
                assets: vec![Asset {
                    token: "JLP".to_string(),
                    balance: dec!(30),
                    value: dec!(120),
                    apy: None,
                }],
            }],
        };
        PortfolioSnapshot::new(wallet.clone(), Utc::now(), vec![project])
    }

    #[async_trait]
    impl PortfolioSource for ScriptedSource {
        fn id(&self) -> SourceId {
            self.id
        }

        async fn extract(
            &self,
            session: &dyn BrowserSession,
            wallet: &WalletAddress,
        ) -> Result<PortfolioSnapshot, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.calls_by_wallet.lock().unwrap().push(wallet.to_string());
            session.current_url().await?;

            let step = self.steps.lock().unwrap().pop_front().unwrap_or_else(|| self.fallback.clone());
            match step {
                Step::Succeed => {}
                Step::Fail(e) => return Err(e),
                Step::Hang(d) => tokio::time::sleep(d).await,
            }

            let mut snapshot = snapshot_for(wallet);
            let offset = *self.clock_offset_secs.lock().unwrap();
            snapshot.captured_at += ChronoDuration::seconds(offset);
            Ok(snapshot)
        }
    }
}
