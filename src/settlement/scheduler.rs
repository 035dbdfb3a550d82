// Settlement Scheduler - one cooperative loop over three timers
//
// - Expiry scan (60s): settle contracts the ledger reports as due
// - Retry queue (30s)
// - Funding watch (10s)
//
// Handlers run to completion inside the loop, so a slow expiry scan delays
// every other timer. Missed ticks are skipped, not replayed.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};
use tracing::info;

use crate::error::{AppError, AppResult};

/// Work driven by the scheduler's timers
#[async_trait]
pub trait ScheduledJobs: Send + Sync + 'static {
    async fn scan_expired(&self);
    async fn process_retry_queue(&self);
    async fn watch_funding(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub expiry_scan: Duration,
    pub retry_queue: Duration,
    pub funding_watch: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            expiry_scan: Duration::from_secs(60),
            retry_queue: Duration::from_secs(30),
            funding_watch: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Created,
    Running,
    Stopped,
}

/// Single-use scheduler: Created -> Running -> Stopped
pub struct Scheduler<J> {
    jobs: Arc<J>,
    config: ScheduleConfig,
    state: Arc<Mutex<SchedulerState>>,
    stop: watch::Sender<bool>,
}

impl<J: ScheduledJobs> Scheduler<J> {
    pub fn new(jobs: Arc<J>, config: ScheduleConfig) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            jobs,
            config,
            state: Arc::new(Mutex::new(SchedulerState::Created)),
            stop,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Start the run loop in the background. The loop exits when `stop` is
    /// called or `cancel` turns true. Fails unless the scheduler is fresh.
    pub fn start(&self, cancel: watch::Receiver<bool>) -> AppResult<JoinHandle<()>> {
        {
            let mut state = self.state.lock();
            if *state != SchedulerState::Created {
                return Err(AppError::Internal(format!(
                    "scheduler cannot start from state {:?}",
                    *state
                )));
            }
            *state = SchedulerState::Running;
        }

        let jobs = self.jobs.clone();
        let config = self.config;
        let state = self.state.clone();
        let stop = self.stop.subscribe();

        Ok(tokio::spawn(async move {
            run_loop(jobs, config, stop, cancel).await;
            *state.lock() = SchedulerState::Stopped;
        }))
    }

    /// Signal the loop to exit. Safe to call any number of times; a
    /// scheduler stopped before starting can never start.
    pub fn stop(&self) {
        self.stop.send_replace(true);
        let mut state = self.state.lock();
        if *state == SchedulerState::Created {
            *state = SchedulerState::Stopped;
        }
    }
}

fn timer(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Resolves once the flag is true. A dropped sender never fires.
async fn raised(flag: &mut watch::Receiver<bool>) {
    if flag.wait_for(|raised| *raised).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn run_loop<J: ScheduledJobs>(
    jobs: Arc<J>,
    config: ScheduleConfig,
    mut stop: watch::Receiver<bool>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut expiry = timer(config.expiry_scan);
    let mut retry = timer(config.retry_queue);
    let mut funding = timer(config.funding_watch);

    info!("⏰ Scheduler started");

    loop {
        tokio::select! {
            biased;
            _ = raised(&mut stop) => {
                info!("Scheduler stopped");
                return;
            }
            _ = raised(&mut cancel) => {
                info!("Scheduler cancelled");
                return;
            }
            _ = expiry.tick() => jobs.scan_expired().await,
            _ = retry.tick() => jobs.process_retry_queue().await,
            _ = funding.tick() => jobs.watch_funding().await,
        }
    }
}
