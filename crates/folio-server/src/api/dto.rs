use chrono::{DateTime, Utc};
use folio_core::PortfolioSnapshot;
use serde::{Deserialize, Serialize};

use crate::orchestrator::{RunReport, RunSummary};
use crate::session::Liveness;
use crate::source::SourceId;
use crate::store::{CacheEntry, CacheStatus};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct PortfolioQuery {
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub wait: bool,
}

// =============================================================================
// Responses
// =============================================================================

/// Cached snapshot plus staleness annotations.
#[derive(Debug, Serialize)]
pub struct PortfolioResponse {
    #[serde(flatten)]
    pub snapshot: PortfolioSnapshot,
    /// Time of the last run with at least one success
    pub cached_at: Option<DateTime<Utc>>,
    pub captured_at: DateTime<Utc>,
    pub age_seconds: i64,
    pub stale: bool,
    pub scrape_interval_minutes: u64,
}

impl PortfolioResponse {
    /// A snapshot is stale once it is older than two refresh intervals.
    pub fn new(
        entry: &CacheEntry,
        cached_at: Option<DateTime<Utc>>,
        interval_minutes: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let captured_at = entry.snapshot.captured_at;
        let age_seconds = (now - captured_at).num_seconds().max(0);
        let stale_after = (interval_minutes * 2 * 60) as i64;
        Self {
            snapshot: (*entry.snapshot).clone(),
            cached_at,
            captured_at,
            age_seconds,
            stale: age_seconds > stale_after,
            scrape_interval_minutes: interval_minutes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub source: SourceId,
    pub liveness: Liveness,
    pub wallets: usize,
    pub launches: u64,
}

#[derive(Debug, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub runs_completed: u64,
    pub last_run: Option<RunSummary>,
    pub sessions: Vec<SessionStatus>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub scrape_interval_minutes: u64,
    pub orchestrator: OrchestratorStatus,
    pub cache: CacheStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Started,
    AlreadyRunning,
    Completed,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub status: RefreshStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
}
