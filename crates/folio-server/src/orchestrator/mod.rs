//! Scheduler/Orchestrator
//!
//! `run_once` is the only place that drives browser sessions. Runs are
//! serialized by `run_lock`; a trigger that finds a run in progress is
//! coalesced into it. Sources run concurrently, each on its own lane, and the
//! wallets of a lane are processed one after another.

pub mod report;
pub mod scheduler;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use folio_core::WalletAddress;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::config::SourceConfig;
use crate::session::{Liveness, SessionError, SessionHandle, SessionManager};
use crate::source::{PortfolioSource, SourceId};
use crate::store::{PutOutcome, ResultCache};

pub use report::{FailureReason, RunReport, RunSummary, WalletOutcome};
pub use scheduler::Scheduler;

/// Attempts to start a session before giving up on a lane for this run.
const STARTUP_ATTEMPTS: u32 = 2;

/// Consecutive failed reconnects that abort the rest of a lane.
const MAX_RECONNECT_FAILURES: u32 = 2;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per wallet, including the first
    pub attempts: u32,
    pub delay: Duration,
    pub extraction_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(source: &SourceConfig) -> Self {
        Self {
            attempts: source.retries + 1,
            delay: source.retry_delay(),
            extraction_timeout: source.extraction_timeout(),
        }
    }
}

/// One source, its session and the wallets routed to it.
pub struct SourceLane {
    source: Arc<dyn PortfolioSource>,
    sessions: Arc<SessionManager>,
    wallets: Vec<WalletAddress>,
    policy: RetryPolicy,
}

impl SourceLane {
    pub fn new(
        source: Arc<dyn PortfolioSource>,
        sessions: Arc<SessionManager>,
        wallets: Vec<WalletAddress>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            sessions,
            wallets,
            policy,
        }
    }

    pub fn id(&self) -> SourceId {
        self.source.id()
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn wallets(&self) -> &[WalletAddress] {
        &self.wallets
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
}

pub struct Orchestrator {
    lanes: Vec<SourceLane>,
    cache: Arc<ResultCache>,
    run_lock: Arc<Mutex<()>>,
    last_report: RwLock<Option<RunReport>>,
    runs_completed: AtomicU64,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(lanes: Vec<SourceLane>, cache: Arc<ResultCache>, cancel: CancellationToken) -> Self {
        Self {
            lanes,
            cache,
            run_lock: Arc::new(Mutex::new(())),
            last_report: RwLock::new(None),
            runs_completed: AtomicU64::new(0),
            cancel,
        }
    }

    pub fn lanes(&self) -> &[SourceLane] {
        &self.lanes
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    pub fn runs_completed(&self) -> u64 {
        self.runs_completed.load(Ordering::Relaxed)
    }

    pub async fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().await.clone()
    }

    /// Run a full refresh, waiting for any run already in progress first.
    pub async fn run_once(&self) -> RunReport {
        let _guard = self.run_lock.lock().await;
        self.execute().await
    }

    /// Run a full refresh unless one is already in progress (`Ok(None)`).
    ///
    /// The run is spawned holding the lock, so dropping the returned future
    /// detaches the run rather than abandoning it partway through.
    pub async fn try_run_once(self: &Arc<Self>) -> Result<Option<RunReport>, JoinError> {
        let Ok(guard) = self.run_lock.clone().try_lock_owned() else {
            return Ok(None);
        };
        let this = self.clone();
        let run = tokio::spawn(async move {
            let _guard = guard;
            this.execute().await
        });
        run.await.map(Some)
    }

    /// Start a refresh in the background, or report the one in progress.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        let Ok(guard) = self.run_lock.clone().try_lock_owned() else {
            tracing::info!("Refresh requested while a run is in progress, coalescing");
            return TriggerOutcome::AlreadyRunning;
        };
        let this = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            this.execute().await;
        });
        TriggerOutcome::Started
    }

    /// Start every lane's session ahead of the first run.
    ///
    /// Fails only when every lane with wallets failed to start.
    pub async fn prewarm(&self) -> Result<usize, SessionError> {
        let mut started = 0;
        let mut last_error = None;
        for lane in self.lanes.iter().filter(|l| !l.wallets.is_empty()) {
            match self.ensure_session(lane).await {
                Ok(handle) => {
                    SessionManager::release(handle);
                    started += 1;
                }
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            Some(e) if started == 0 => Err(e),
            _ => Ok(started),
        }
    }

    /// Close every session. Waits for an in-flight lane to let go of its slot.
    pub async fn terminate_sessions(&self) {
        for lane in &self.lanes {
            lane.sessions.terminate().await;
        }
    }

    async fn execute(&self) -> RunReport {
        let start = Instant::now();
        let mut report = RunReport::begin();
        let wallet_count: usize = self.lanes.iter().map(|l| l.wallets.len()).sum();
        println!("[ORCHESTRATOR] Run {} starting for {} wallets", &report.run_id[..8], wallet_count);
        tracing::info!(run_id = %report.run_id, wallets = wallet_count, "Refresh run starting");

        let lanes = futures::future::join_all(self.lanes.iter().map(|lane| self.run_lane(lane))).await;
        for outcomes in lanes {
            for (wallet, outcome) in outcomes {
                report.record(&wallet, outcome);
            }
        }
        report.finish();

        if let Some(finished_at) = report.finished_at.filter(|_| report.is_success()) {
            self.cache.mark_run_success(finished_at).await;
        }

        println!(
            "[ORCHESTRATOR] Run {} finished: {}/{} wallets succeeded in {}ms",
            &report.run_id[..8],
            report.succeeded,
            report.attempted,
            start.elapsed().as_millis()
        );
        tracing::info!(
            run_id = %report.run_id,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed(),
            duration_ms = %start.elapsed().as_millis(),
            "Refresh run finished"
        );

        *self.last_report.write().await = Some(report.clone());
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        report
    }

    /// Acquire the lane's session, retrying startup once after the lane's delay.
    async fn ensure_session<'a>(&self, lane: &'a SourceLane) -> Result<SessionHandle<'a>, SessionError> {
        let mut attempt = 1;
        loop {
            match lane.sessions.acquire().await {
                Ok(handle) => return Ok(handle),
                Err(e) if attempt < STARTUP_ATTEMPTS => {
                    tracing::warn!(
                        source = %lane.id(),
                        attempt,
                        error = %e,
                        "Session startup failed, retrying"
                    );
                    tokio::time::sleep(lane.policy.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_lane(&self, lane: &SourceLane) -> Vec<(WalletAddress, WalletOutcome)> {
        let mut outcomes = Vec::with_capacity(lane.wallets.len());
        if lane.wallets.is_empty() {
            return outcomes;
        }
        let start = Instant::now();

        let mut handle = match self.ensure_session(lane).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(source = %lane.id(), error = %e, "No browser session, skipping source for this run");
                let reason = FailureReason::SessionUnavailable(e.to_string());
                return lane
                    .wallets
                    .iter()
                    .map(|w| (w.clone(), WalletOutcome::failed(reason.clone(), 0)))
                    .collect();
            }
        };

        let mut reconnect_failures = 0;
        let mut aborted: Option<FailureReason> = None;

        for wallet in &lane.wallets {
            if self.cancel.is_cancelled() {
                outcomes.push((wallet.clone(), WalletOutcome::failed(FailureReason::Cancelled, 0)));
                continue;
            }
            if let Some(reason) = &aborted {
                outcomes.push((wallet.clone(), WalletOutcome::failed(reason.clone(), 0)));
                continue;
            }

            if handle.health_check().await == Liveness::Dead {
                tracing::warn!(source = %lane.id(), wallet = %wallet.short(), "Session dead, reconnecting");
                match handle.reconnect().await {
                    Ok(()) => reconnect_failures = 0,
                    Err(e) => {
                        reconnect_failures += 1;
                        let reason = FailureReason::SessionUnavailable(e.to_string());
                        if reconnect_failures >= MAX_RECONNECT_FAILURES {
                            tracing::error!(
                                source = %lane.id(),
                                failures = reconnect_failures,
                                "Reconnect failed repeatedly, aborting remaining wallets for this run"
                            );
                            aborted = Some(reason.clone());
                        }
                        outcomes.push((wallet.clone(), WalletOutcome::failed(reason, 0)));
                        continue;
                    }
                }
            }

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => WalletOutcome::failed(FailureReason::Cancelled, 0),
                outcome = self.extract_with_retry(lane, &mut handle, wallet) => outcome,
            };
            outcomes.push((wallet.clone(), outcome));
        }

        tracing::info!(
            source = %lane.id(),
            wallets = lane.wallets.len(),
            succeeded = outcomes.iter().filter(|(_, o)| o.is_success()).count(),
            duration_ms = %start.elapsed().as_millis(),
            "Source lane finished"
        );
        outcomes
    }

    async fn extract_with_retry(
        &self,
        lane: &SourceLane,
        handle: &mut SessionHandle<'_>,
        wallet: &WalletAddress,
    ) -> WalletOutcome {
        let policy = &lane.policy;
        let mut last_reason = FailureReason::Cancelled;
        let mut attempts = 0;

        while attempts < policy.attempts {
            if attempts > 0 {
                tokio::time::sleep(policy.delay).await;
            }
            attempts += 1;

            let session = match handle.session() {
                Ok(session) => session,
                Err(e) => {
                    last_reason = FailureReason::SessionLost(e.to_string());
                    break;
                }
            };

            let attempt_start = Instant::now();
            let result = tokio::time::timeout(policy.extraction_timeout, lane.source.extract(session, wallet)).await;

            match result {
                Ok(Ok(snapshot)) => {
                    let projects_count = snapshot.project_count();
                    let total_usd = snapshot.total_value();
                    match self.cache.put(snapshot).await {
                        Ok(PutOutcome::Stored) => {}
                        Ok(PutOutcome::Rejected) => {
                            tracing::warn!(wallet = %wallet.short(), "Extraction older than cached snapshot, cache kept");
                        }
                        Err(e) => {
                            tracing::error!(wallet = %wallet.short(), error = %e, "Failed to persist snapshot");
                        }
                    }
                    tracing::info!(
                        source = %lane.id(),
                        wallet = %wallet.short(),
                        attempt = attempts,
                        projects = projects_count,
                        total_usd = %total_usd,
                        duration_ms = %attempt_start.elapsed().as_millis(),
                        "Wallet refreshed"
                    );
                    return WalletOutcome::Success {
                        attempts,
                        projects_count,
                    };
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        source = %lane.id(),
                        wallet = %wallet.short(),
                        attempt = attempts,
                        max_attempts = policy.attempts,
                        error = %e,
                        "Extraction attempt failed"
                    );
                    let session_fault = e.is_session_fault();
                    last_reason = e.into();
                    // A dead session is handled by the next wallet's health check
                    if session_fault && handle.health_check().await == Liveness::Dead {
                        break;
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        source = %lane.id(),
                        wallet = %wallet.short(),
                        attempt = attempts,
                        max_attempts = policy.attempts,
                        timeout_secs = policy.extraction_timeout.as_secs(),
                        "Extraction attempt timed out"
                    );
                    last_reason = FailureReason::Timeout(format!(
                        "extraction exceeded {}s",
                        policy.extraction_timeout.as_secs()
                    ));
                }
            }
        }

        tracing::error!(
            source = %lane.id(),
            wallet = %wallet.short(),
            attempts,
            reason = %last_reason,
            "Wallet refresh failed"
        );
        WalletOutcome::failed(last_reason, attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{profile, FakeLauncher};
    use crate::source::testing::{ScriptedSource, Step};
    use crate::source::ExtractionError;
    use crate::store::SnapshotStore;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    const SOL: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";

    fn evm_wallets(n: usize) -> Vec<WalletAddress> {
        (1..=n)
            .map(|i| WalletAddress::parse(&format!("0x{:040x}", i)).unwrap())
            .collect()
    }

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            attempts: retries + 1,
            delay: Duration::from_secs(3),
            extraction_timeout: Duration::from_secs(180),
        }
    }

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        launcher: Arc<FakeLauncher>,
        source: Arc<ScriptedSource>,
        cache: Arc<ResultCache>,
        cancel: CancellationToken,
        _dir: TempDir,
    }

    fn lane(
        source: &Arc<ScriptedSource>,
        launcher: &Arc<FakeLauncher>,
        wallets: Vec<WalletAddress>,
        retries: u32,
    ) -> SourceLane {
        let sessions = Arc::new(SessionManager::new(
            source.id(),
            launcher.clone(),
            profile(),
            Duration::from_secs(30),
        ));
        SourceLane::new(source.clone(), sessions, wallets, policy(retries))
    }

    fn harness(source: ScriptedSource, wallets: Vec<WalletAddress>, retries: u32) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::new();
        let source = Arc::new(source);
        let cache = Arc::new(ResultCache::new(SnapshotStore::new(dir.path())));
        let cancel = CancellationToken::new();
        let orchestrator = Arc::new(Orchestrator::new(
            vec![lane(&source, &launcher, wallets, retries)],
            cache.clone(),
            cancel.clone(),
        ));
        Harness {
            orchestrator,
            launcher,
            source,
            cache,
            cancel,
            _dir: dir,
        }
    }

    fn not_found() -> Step {
        Step::Fail(ExtractionError::NotFound("no project titles".to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let wallets = evm_wallets(1);
        let source = ScriptedSource::new(
            SourceId::Debank,
            vec![
                Step::Fail(ExtractionError::Timeout("page load exceeded 30s".to_string())),
                not_found(),
            ],
            Step::Succeed,
        );
        let h = harness(source, wallets.clone(), 2);

        let start = tokio::time::Instant::now();
        let report = h.orchestrator.run_once().await;

        assert_eq!(h.source.call_count(), 3);
        assert_eq!(
            report.outcome(&wallets[0]),
            Some(&WalletOutcome::Success {
                attempts: 3,
                projects_count: 1
            })
        );
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert!(h.cache.get(&wallets[0]).await.is_some());
        assert_eq!(h.cache.last_update().await, report.finished_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_source_uses_exact_budget() {
        for retries in [0, 2] {
            let wallets = evm_wallets(1);
            let source = ScriptedSource::always(
                SourceId::Debank,
                Step::Fail(ExtractionError::ParseFailure("bad json".to_string())),
            );
            let h = harness(source, wallets.clone(), retries);

            let report = h.orchestrator.run_once().await;

            assert_eq!(h.source.call_count(), retries as usize + 1);
            match report.outcome(&wallets[0]) {
                Some(WalletOutcome::Failed { reason, attempts }) => {
                    assert_eq!(*attempts, retries + 1);
                    assert!(matches!(reason, FailureReason::ParseFailure(_)));
                }
                other => panic!("unexpected outcome {:?}", other),
            }
            assert!(h.cache.get(&wallets[0]).await.is_none());
            assert_eq!(h.cache.last_update().await, None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_timeout() {
        let wallets = evm_wallets(1);
        let source = ScriptedSource::always(SourceId::Debank, Step::Hang(Duration::from_secs(600)));
        let h = harness(source, wallets.clone(), 0);

        let report = h.orchestrator.run_once().await;

        assert!(matches!(
            report.outcome(&wallets[0]),
            Some(WalletOutcome::Failed {
                reason: FailureReason::Timeout(_),
                attempts: 1
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_keeps_cached_snapshot() {
        let wallets = evm_wallets(1);
        let source = ScriptedSource::new(SourceId::Debank, vec![Step::Succeed], not_found());
        let h = harness(source, wallets.clone(), 1);

        let first = h.orchestrator.run_once().await;
        let cached = h.cache.get(&wallets[0]).await.unwrap();

        let second = h.orchestrator.run_once().await;
        assert_eq!(second.succeeded, 0);
        assert_eq!(h.cache.get(&wallets[0]).await.unwrap(), cached);
        assert_eq!(h.cache.last_update().await, first.finished_at);
        assert_eq!(h.orchestrator.runs_completed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_wallet_failure_does_not_block_others() {
        let wallets = evm_wallets(3);
        let source = ScriptedSource::new(
            SourceId::Debank,
            vec![Step::Succeed, not_found(), Step::Succeed],
            Step::Succeed,
        );
        let h = harness(source, wallets.clone(), 0);

        let report = h.orchestrator.run_once().await;

        assert_eq!((report.attempted, report.succeeded), (3, 2));
        assert!(h.cache.get(&wallets[1]).await.is_none());
        assert!(h.cache.get(&wallets[2]).await.is_some());
        assert!(report.is_success());

        let order: Vec<String> = wallets.iter().map(|w| w.to_string()).collect();
        assert_eq!(*h.source.calls_by_wallet.lock().unwrap(), order);
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_extraction_keeps_newer_cache_entry() {
        let wallets = evm_wallets(1);
        let h = harness(ScriptedSource::always(SourceId::Debank, Step::Succeed), wallets.clone(), 0);

        h.orchestrator.run_once().await;
        let cached = h.cache.get(&wallets[0]).await.unwrap();

        // Next extraction reports a capture time from an hour ago
        *h.source.clock_offset_secs.lock().unwrap() = -3600;
        let report = h.orchestrator.run_once().await;

        assert!(report.is_success());
        assert_eq!(h.cache.get(&wallets[0]).await.unwrap(), cached);
        assert_eq!(h.cache.store().read(&wallets[0]).await.unwrap().as_ref(), Some(&*cached));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_session_is_reconnected() {
        let wallets = evm_wallets(2);
        let h = harness(ScriptedSource::always(SourceId::Debank, Step::Succeed), wallets, 0);

        h.orchestrator.run_once().await;
        h.launcher.kill_current();
        let report = h.orchestrator.run_once().await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 2);
        assert_eq!(h.launcher.max_live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_reconnect_failure_aborts_source() {
        let wallets = evm_wallets(3);
        let h = harness(ScriptedSource::always(SourceId::Debank, Step::Succeed), wallets.clone(), 2);

        h.orchestrator.run_once().await;
        assert_eq!(h.source.call_count(), 3);

        h.launcher.kill_current();
        h.launcher.fail_next.store(2, Ordering::SeqCst);
        let report = h.orchestrator.run_once().await;

        assert_eq!(report.succeeded, 0);
        assert_eq!(h.source.call_count(), 3);
        assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 3);
        for wallet in &wallets {
            assert!(matches!(
                report.outcome(wallet),
                Some(WalletOutcome::Failed {
                    reason: FailureReason::SessionUnavailable(_),
                    attempts: 0
                })
            ));
        }
        // Earlier snapshots survive the failed run
        assert!(h.cache.get(&wallets[2]).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_is_retried_once() {
        let wallets = evm_wallets(1);
        let h = harness(ScriptedSource::always(SourceId::Debank, Step::Succeed), wallets.clone(), 0);
        h.launcher.fail_next.store(1, Ordering::SeqCst);

        let report = h.orchestrator.run_once().await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_source_does_not_abort_other_source() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ResultCache::new(SnapshotStore::new(dir.path())));

        let sol_launcher = FakeLauncher::new();
        let sol_source = Arc::new(ScriptedSource::always(SourceId::Jupiter, Step::Succeed));
        let sol_wallet = WalletAddress::parse(SOL).unwrap();

        let evm_launcher = FakeLauncher::new();
        evm_launcher.fail_next.store(2, Ordering::SeqCst);
        let evm_source = Arc::new(ScriptedSource::always(SourceId::Debank, Step::Succeed));
        let evm = evm_wallets(2);

        let orchestrator = Orchestrator::new(
            vec![
                lane(&sol_source, &sol_launcher, vec![sol_wallet.clone()], 0),
                lane(&evm_source, &evm_launcher, evm.clone(), 2),
            ],
            cache.clone(),
            CancellationToken::new(),
        );

        let report = orchestrator.run_once().await;

        assert_eq!((report.attempted, report.succeeded), (3, 1));
        assert!(report.outcome(&sol_wallet).unwrap().is_success());
        assert_eq!(evm_source.call_count(), 0);
        assert!(matches!(
            report.outcome(&evm[0]),
            Some(WalletOutcome::Failed {
                reason: FailureReason::SessionUnavailable(_),
                ..
            })
        ));
        assert!(cache.last_update().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_never_overlap() {
        let wallets = evm_wallets(1);
        let source = ScriptedSource::always(SourceId::Debank, Step::Hang(Duration::from_secs(60)));
        let h = harness(source, wallets, 0);

        let running = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.run_once().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(h.orchestrator.is_running());
        assert!(h.orchestrator.try_run_once().await.unwrap().is_none());
        assert_eq!(h.orchestrator.trigger(), TriggerOutcome::AlreadyRunning);

        let report = running.await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(h.source.call_count(), 1);
        assert_eq!(h.launcher.max_live.load(Ordering::SeqCst), 1);
        assert!(!h.orchestrator.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_wait_still_completes_run() {
        let wallets = evm_wallets(2);
        let source = ScriptedSource::new(
            SourceId::Debank,
            vec![Step::Succeed],
            Step::Hang(Duration::from_secs(60)),
        );
        let h = harness(source, wallets.clone(), 0);

        // Caller gives up while the second wallet is still extracting
        let waited = tokio::time::timeout(Duration::from_secs(10), h.orchestrator.try_run_once()).await;
        assert!(waited.is_err());
        assert!(h.orchestrator.is_running());
        assert!(h.cache.get(&wallets[0]).await.is_some());

        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(!h.orchestrator.is_running());
        assert_eq!(h.orchestrator.runs_completed(), 1);
        let report = h.orchestrator.last_report().await.unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(h.cache.last_update().await, report.finished_at);
        assert!(h.cache.get(&wallets[1]).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_runs_in_background() {
        let wallets = evm_wallets(1);
        let h = harness(ScriptedSource::always(SourceId::Debank, Step::Succeed), wallets, 0);

        assert_eq!(h.orchestrator.trigger(), TriggerOutcome::Started);
        // Blocks until the background run releases the lock
        let report = h.orchestrator.run_once().await;

        assert_eq!(h.orchestrator.runs_completed(), 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(h.source.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_skips_remaining_wallets() {
        let wallets = evm_wallets(2);
        let h = harness(ScriptedSource::always(SourceId::Debank, Step::Succeed), wallets.clone(), 0);
        h.cancel.cancel();

        let report = h.orchestrator.run_once().await;

        assert_eq!(report.succeeded, 0);
        assert_eq!(h.source.call_count(), 0);
        assert!(matches!(
            report.outcome(&wallets[1]),
            Some(WalletOutcome::Failed {
                reason: FailureReason::Cancelled,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prewarm() {
        let h = harness(ScriptedSource::always(SourceId::Debank, Step::Succeed), evm_wallets(1), 0);
        assert_eq!(h.orchestrator.prewarm().await.unwrap(), 1);
        assert_eq!(h.orchestrator.lanes()[0].sessions().liveness(), Liveness::Alive);

        h.orchestrator.terminate_sessions().await;
        assert_eq!(h.launcher.live.load(Ordering::SeqCst), 0);

        let broken = harness(ScriptedSource::always(SourceId::Debank, Step::Succeed), evm_wallets(1), 0);
        broken.launcher.fail_next.store(10, Ordering::SeqCst);
        assert!(broken.orchestrator.prewarm().await.is_err());
    }
}
