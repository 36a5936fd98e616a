// Cycle scheduler: one immediate cycle, then one per tick until stopped.
// Cycles run inline in the worker task, so at most one is ever in flight.

use std::future::Future;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tracing::Instrument;

// Roughly 30 years.
const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// What one cycle achieved; failures inside it are already logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub source_failures: usize,
    pub persisted: bool,
    pub delivered: bool,
    /// The snapshot could not be encoded; persistence and delivery were skipped.
    pub aborted: bool,
}

/// Running totals, logged periodically and returned on stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub persisted: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
    pub aborted: u64,
}

impl SchedulerStats {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        if report.aborted {
            self.aborted += 1;
            return;
        }
        if report.persisted {
            self.persisted += 1;
        }
        if report.delivered {
            self.delivered += 1;
        } else {
            self.delivery_failures += 1;
        }
    }
}

/// One collect, persist, deliver pass.
pub trait CycleRunner: Send + 'static {
    fn run_cycle(&mut self) -> impl Future<Output = CycleReport> + Send;
}

/// Worker timing config.
pub struct WorkerConfig {
    pub interval: Duration,
    pub shutdown_grace: Duration,
    /// How often to log scheduler stats. Never triggers a cycle.
    pub stats_log_interval: Duration,
}

pub struct SchedulerHandle {
    shutdown_tx: oneshot::Sender<()>,
    state_rx: watch::Receiver<SchedulerState>,
    join: JoinHandle<SchedulerStats>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state_rx.clone()
    }

    /// Request a stop and wait for the worker to reach `Stopped`. A cycle in
    /// progress finishes first. Stopped is final. Errors if the worker task
    /// panicked or was cancelled.
    pub async fn stop(self) -> Result<SchedulerStats, JoinError> {
        let _ = self.shutdown_tx.send(());
        self.join.await
    }
}

/// Dropping the handle without calling `stop` also stops the worker.
pub fn spawn<R: CycleRunner>(mut runner: R, config: WorkerConfig) -> SchedulerHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
    let WorkerConfig {
        interval,
        shutdown_grace,
        stats_log_interval,
    } = config;

    let join = tokio::spawn(async move {
        let mut stats = SchedulerStats::default();
        run_one(&mut runner, &state_tx, &mut stats).await;

        let start = Instant::now();
        let mut tick = interval_at(deadline(start, interval), interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_log_tick =
            interval_at(deadline(start, stats_log_interval), stats_log_interval);
        stats_log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                _ = tick.tick() => run_one(&mut runner, &state_tx, &mut stats).await,
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        cycles = stats.cycles,
                        persisted = stats.persisted,
                        delivered = stats.delivered,
                        delivery_failures = stats.delivery_failures,
                        aborted = stats.aborted,
                        "scheduler stats"
                    );
                }
            }
        }

        state_tx.send_replace(SchedulerState::Stopping);
        tracing::info!(grace_ms = shutdown_grace.as_millis() as u64, "scheduler stopping");
        tokio::time::sleep(shutdown_grace).await;
        state_tx.send_replace(SchedulerState::Stopped);
        tracing::info!(cycles = stats.cycles, "scheduler stopped");
        stats
    });

    SchedulerHandle {
        shutdown_tx,
        state_rx,
        join,
    }
}

/// `start + after`, clamped to a distant instant instead of overflowing.
fn deadline(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .unwrap_or_else(|| start + Duration::from_secs(FAR_FUTURE_SECS))
}

async fn run_one<R: CycleRunner>(
    runner: &mut R,
    state_tx: &watch::Sender<SchedulerState>,
    stats: &mut SchedulerStats,
) {
    state_tx.send_replace(SchedulerState::Running);
    let span = tracing::info_span!("cycle", n = stats.cycles + 1);
    let report = runner.run_cycle().instrument(span).await;
    stats.record(&report);
    state_tx.send_replace(SchedulerState::Idle);
}
