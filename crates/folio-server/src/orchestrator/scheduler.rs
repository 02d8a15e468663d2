//! Interval timer driving `run_once`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::Orchestrator;

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration, run_on_start: bool) -> Self {
        Self {
            orchestrator,
            interval,
            run_on_start,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Tick until cancelled. A tick that lands on a run in progress is dropped.
    pub async fn run(self, cancel: CancellationToken) {
        let first = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut ticker = interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        println!("[SCHEDULER] Started, interval {} minutes", self.interval.as_secs() / 60);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            run_on_start = self.run_on_start,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::info!("Scheduler cancelled while a run is in flight");
                            break;
                        }
                        report = self.orchestrator.try_run_once() => match report {
                            Ok(Some(report)) => tracing::debug!(
                                run_id = %report.run_id,
                                succeeded = report.succeeded,
                                "Scheduled run complete"
                            ),
                            Ok(None) => tracing::info!("Run already in progress, skipping tick"),
                            Err(e) => tracing::error!(error = %e, "Scheduled run task failed"),
                        },
                    }
                }
            }
        }

        println!("[SCHEDULER] Stopped");
        tracing::info!("Scheduler stopped");
    }
}
