//! Scheduler: periodic reminder scans plus fixed daily broadcast drains.
//!
//! Host-clock driven, single process. Each job kind runs under a
//! single-flight run-guard: a tick that lands while the previous
//! invocation of the same kind is still executing is skipped, never
//! queued. Ticks missed while the process was down are not caught up;
//! the idempotency flags make the next tick correct on their own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::domain::DomainError;
use crate::shared::config::{DEFAULT_SCAN_INITIAL_DELAY_SECS, DEFAULT_SCAN_INTERVAL_MINUTES};
use crate::usecases::{BroadcastService, ReminderService};

/// Single-flight guard, one per job kind.
pub struct RunGuard {
    job: &'static str,
    slot: tokio::sync::Mutex<()>,
}

impl RunGuard {
    pub fn new(job: &'static str) -> Self {
        Self {
            job,
            slot: tokio::sync::Mutex::new(()),
        }
    }

    /// Run `job` unless the previous invocation is still executing.
    /// Returns None when the tick was skipped.
    pub async fn run<F, Fut>(&self, job: F) -> Option<Result<(), DomainError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), DomainError>>,
    {
        match self.slot.try_lock() {
            Ok(_held) => Some(job().await),
            Err(_) => {
                warn!(job = self.job, "previous run still in progress; skipping tick");
                None
            }
        }
    }
}

/// Schedule tuning. Defaults match the production cadence.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub scan_interval: Duration,
    pub scan_initial_delay: Duration,
    /// Host-local wall-clock slots; each drains one broadcast entry.
    pub drain_times: Vec<NaiveTime>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_MINUTES * 60),
            scan_initial_delay: Duration::from_secs(DEFAULT_SCAN_INITIAL_DELAY_SECS),
            drain_times: vec![
                NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default(),
                NaiveTime::from_hms_opt(19, 0, 0).unwrap_or_default(),
            ],
        }
    }
}

/// Owns the timer tasks that drive the reminder and broadcast services.
pub struct Scheduler {
    reminders: Arc<ReminderService>,
    broadcasts: Arc<BroadcastService>,
    schedule: Schedule,
}

impl Scheduler {
    pub fn new(
        reminders: Arc<ReminderService>,
        broadcasts: Arc<BroadcastService>,
        schedule: Schedule,
    ) -> Self {
        Self {
            reminders,
            broadcasts,
            schedule,
        }
    }

    /// Spawn all timer tasks. Aborting the returned handles stops the
    /// timers; there is no persisted timer state to recover.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        info!(
            scan_interval_secs = self.schedule.scan_interval.as_secs(),
            drain_slots = self.schedule.drain_times.len(),
            "scheduler starting"
        );

        let reminders = self.reminders;
        let period = self.schedule.scan_interval;
        let initial_delay = self.schedule.scan_initial_delay;
        let scan_guard = RunGuard::new("reminder-scan");
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Some(Err(e)) = scan_guard.run(|| reminders.scan_once()).await {
                    error!(error = %e, "reminder scan failed");
                }
            }
        }));

        // One timer task per slot; the guard is shared across slots so two
        // adjacent drains can never overlap.
        let drain_guard = Arc::new(RunGuard::new("broadcast-drain"));
        for at in self.schedule.drain_times {
            let broadcasts = Arc::clone(&self.broadcasts);
            let guard = Arc::clone(&drain_guard);
            handles.push(tokio::spawn(async move {
                loop {
                    let wait = time_until(chrono::Local::now().naive_local(), at);
                    tokio::time::sleep(wait).await;
                    if let Some(Err(e)) = guard.run(|| broadcasts.drain_one()).await {
                        error!(error = %e, at = %at, "broadcast drain failed");
                    }
                }
            }));
        }

        handles
    }
}

/// Time from `now` until the next wall-clock occurrence of `at`. Firing
/// exactly at `at` schedules the following run for tomorrow.
fn time_until(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let mut next = now.date().and_time(at);
    if next <= now {
        next += TimeDelta::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}
