use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, trace, warn};

use super::config::{ConfigError, ScheduledMonitor};
use super::pipeline::CheckPipeline;
use crate::database::Database;
use crate::database::models::MonitorRecord;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("monitor {monitor_id} has an invalid configuration: {source}")]
    InvalidConfig {
        monitor_id: i64,
        #[source]
        source: ConfigError,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Liveness and overlap state shared by a monitor's timer and its ticks
#[derive(Debug)]
pub struct Registration {
    active: AtomicBool,
    in_flight: AtomicBool,
}

impl Default for Registration {
    fn default() -> Self {
        Self::new()
    }
}

impl Registration {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Claim the in-flight slot; `None` while a previous tick is still running
    pub fn try_begin(self: &Arc<Self>) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(self.clone()))
    }
}

/// Releases the in-flight slot when the tick finishes, even by panic
pub struct InFlightGuard(Arc<Registration>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

struct ScheduledTask {
    device_id: i64,
    registration: Arc<Registration>,
    timer: JoinHandle<()>,
}

impl ScheduledTask {
    /// Stop future ticks and make any in-flight tick discard its result
    fn cancel(self) {
        self.registration.deactivate();
        self.timer.abort();
    }
}

/// Running tick tasks of every monitor
#[derive(Default)]
struct TickSet {
    tasks: JoinSet<()>,
    /// Set by `shutdown`; no new ticks are started afterwards
    closed: bool,
}

type Ticks = Arc<std::sync::Mutex<TickSet>>;

fn lock_ticks(ticks: &Ticks) -> MutexGuard<'_, TickSet> {
    ticks
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn report_tick(result: Result<(), JoinError>) {
    match result {
        Err(e) if e.is_panic() => error!("Monitor tick panicked: {}", e),
        _ => {}
    }
}

/// Monitoring scheduler - owns one recurring timer per enabled monitor
pub struct MonitoringScheduler {
    pipeline: Arc<CheckPipeline>,
    database: Arc<dyn Database>,
    registry: Mutex<HashMap<i64, ScheduledTask>>,
    ticks: Ticks,
}

impl MonitoringScheduler {
    pub fn new(pipeline: Arc<CheckPipeline>, database: Arc<dyn Database>) -> Self {
        Self {
            pipeline,
            database,
            registry: Mutex::new(HashMap::new()),
            ticks: Ticks::default(),
        }
    }

    /// Schedule every enabled monitor in the store. Invalid monitors are
    /// logged and left out; returns how many were scheduled.
    pub async fn start(&self) -> Result<usize, SchedulerError> {
        let records = self.database.get_monitors().await?;
        let mut scheduled = 0;

        for record in &records {
            match self.schedule_monitor(record).await {
                Ok(true) => scheduled += 1,
                Ok(false) => {}
                Err(e) => warn!("Skipping monitor {}: {}", record.id, e),
            }
        }

        info!("Scheduled {} of {} monitors", scheduled, records.len());
        Ok(scheduled)
    }

    /// (Re)schedule a monitor. Any previous timer for the same id is
    /// cancelled first, so repeated calls leave exactly one. Returns `false`
    /// for disabled monitors.
    pub async fn schedule_monitor(&self, record: &MonitorRecord) -> Result<bool, SchedulerError> {
        let mut registry = self.registry.lock().await;

        if let Some(previous) = registry.remove(&record.id) {
            debug!("Cancelling previous schedule of monitor {}", record.id);
            previous.cancel();
        }

        if !record.enabled {
            debug!("Monitor {} is disabled, not scheduling", record.id);
            return Ok(false);
        }

        let monitor = ScheduledMonitor::from_record(record)
            .map_err(|source| SchedulerError::InvalidConfig { monitor_id: record.id, source })?;

        info!(
            "Scheduling {} monitor {} every {}s",
            monitor.config.kind_name(),
            monitor.id,
            monitor.interval.as_secs()
        );

        let registration = Arc::new(Registration::new());
        let device_id = monitor.device_id;
        let timer = spawn_timer(
            self.pipeline.clone(),
            self.ticks.clone(),
            monitor,
            registration.clone(),
        );
        registry.insert(
            record.id,
            ScheduledTask {
                device_id,
                registration,
                timer,
            },
        );

        Ok(true)
    }

    /// Cancel a monitor's timer; `false` if it was not scheduled
    pub async fn unschedule_monitor(&self, monitor_id: i64) -> bool {
        let removed = self.registry.lock().await.remove(&monitor_id);
        match removed {
            Some(task) => {
                task.cancel();
                info!("Unscheduled monitor {}", monitor_id);
                true
            }
            None => false,
        }
    }

    /// Cancel every monitor of a device, returning the removed monitor ids
    pub async fn unschedule_device(&self, device_id: i64) -> Vec<i64> {
        let mut registry = self.registry.lock().await;
        let mut ids: Vec<i64> = registry
            .iter()
            .filter(|(_, task)| task.device_id == device_id)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();

        for id in &ids {
            if let Some(task) = registry.remove(id) {
                task.cancel();
            }
        }
        if !ids.is_empty() {
            info!("Unscheduled {} monitors of device {}", ids.len(), device_id);
        }
        ids
    }

    /// Abort every timer. Ticks already running finish and record normally.
    pub async fn stop(&self) {
        let mut registry = self.registry.lock().await;
        let count = registry.len();
        for (_, task) in registry.drain() {
            task.timer.abort();
        }
        info!("Monitoring scheduler stopped ({} timers cancelled)", count);
    }

    /// Stop every timer, then wait up to `grace` for running ticks to
    /// finish. Ticks still running after that are aborted; returns how many.
    /// No tick starts after this, even if monitors are scheduled again.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        self.stop().await;

        let mut tasks = {
            let mut ticks = lock_ticks(&self.ticks);
            ticks.closed = true;
            std::mem::take(&mut ticks.tasks)
        };
        if !tasks.is_empty() {
            info!("Waiting for {} running checks to finish", tasks.len());
        }

        let drained = timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                report_tick(result);
            }
        })
        .await;

        match drained {
            Ok(()) => 0,
            Err(_) => {
                let remaining = tasks.len();
                warn!(
                    "Aborting {} checks still running after {}s",
                    remaining,
                    grace.as_secs()
                );
                tasks.abort_all();
                remaining
            }
        }
    }

    pub async fn is_scheduled(&self, monitor_id: i64) -> bool {
        self.registry.lock().await.contains_key(&monitor_id)
    }

    /// Ids of all scheduled monitors, ascending
    pub async fn scheduled_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.registry.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Start a tick in the shared set, reaping the ones already finished
fn spawn_tick(
    ticks: &Ticks,
    pipeline: Arc<CheckPipeline>,
    monitor: Arc<ScheduledMonitor>,
    registration: Arc<Registration>,
    guard: InFlightGuard,
) {
    let mut ticks = lock_ticks(ticks);
    while let Some(result) = ticks.tasks.try_join_next() {
        report_tick(result);
    }
    if ticks.closed {
        return;
    }

    ticks.tasks.spawn(async move {
        let _guard = guard;
        let outcome = pipeline.run(&monitor, &registration).await;
        trace!("Monitor {} tick finished: {:?}", monitor.id, outcome);
    });
}

/// Tick immediately, then every `monitor.interval`. Each tick runs as its
/// own task; a tick that comes due while the previous one is still running
/// is skipped.
fn spawn_timer(
    pipeline: Arc<CheckPipeline>,
    ticks: Ticks,
    monitor: ScheduledMonitor,
    registration: Arc<Registration>,
) -> JoinHandle<()> {
    let monitor = Arc::new(monitor);
    tokio::spawn(async move {
        let mut timer = interval(monitor.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;

            let Some(guard) = registration.try_begin() else {
                debug!("Monitor {} is still being checked, skipping tick", monitor.id);
                continue;
            };

            spawn_tick(
                &ticks,
                pipeline.clone(),
                monitor.clone(),
                registration.clone(),
                guard,
            );
        }
    })
}
