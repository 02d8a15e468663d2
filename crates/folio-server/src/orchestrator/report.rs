//! Per-run outcome accounting.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use folio_core::WalletAddress;
use serde::Serialize;

use crate::source::ExtractionError;

/// Why a wallet produced no snapshot this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    Timeout(String),
    NotFound(String),
    ParseFailure(String),
    /// The browser died or a command failed during extraction
    SessionLost(String),
    /// No session could be started or restored for the source
    SessionUnavailable(String),
    Cancelled,
}

impl From<ExtractionError> for FailureReason {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::Timeout(d) => FailureReason::Timeout(d),
            ExtractionError::NotFound(d) => FailureReason::NotFound(d),
            ExtractionError::ParseFailure(d) => FailureReason::ParseFailure(d),
            ExtractionError::Session(e) => FailureReason::SessionLost(e.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout(d) => write!(f, "timeout: {}", d),
            FailureReason::NotFound(d) => write!(f, "not found: {}", d),
            FailureReason::ParseFailure(d) => write!(f, "parse failure: {}", d),
            FailureReason::SessionLost(d) => write!(f, "session lost: {}", d),
            FailureReason::SessionUnavailable(d) => write!(f, "session unavailable: {}", d),
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WalletOutcome {
    Success { attempts: u32, projects_count: usize },
    Failed { reason: FailureReason, attempts: u32 },
}

impl WalletOutcome {
    pub fn failed(reason: FailureReason, attempts: u32) -> Self {
        WalletOutcome::Failed { reason, attempts }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, WalletOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub attempted: usize,
    pub succeeded: usize,
    pub per_wallet_outcome: BTreeMap<String, WalletOutcome>,
}

impl RunReport {
    pub fn begin() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
            attempted: 0,
            succeeded: 0,
            per_wallet_outcome: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, wallet: &WalletAddress, outcome: WalletOutcome) {
        self.attempted += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        }
        self.per_wallet_outcome.insert(wallet.to_string(), outcome);
    }

    pub fn finish(&mut self) {
        let now = Utc::now();
        self.duration_ms = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.finished_at = Some(now);
    }

    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }

    /// A run counts as successful when at least one wallet succeeded.
    pub fn is_success(&self) -> bool {
        self.succeeded > 0
    }

    pub fn outcome(&self, wallet: &WalletAddress) -> Option<&WalletOutcome> {
        self.per_wallet_outcome.get(wallet.as_str())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: self.duration_ms,
            attempted: self.attempted,
            succeeded: self.succeeded,
            failed: self.failed(),
        }
    }
}

/// Report without the per-wallet map, for health output.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}
