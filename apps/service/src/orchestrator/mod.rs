/// Orchestrator module - wires the engine together
///
/// The orchestrator owns the store, event publisher, recorder and scheduler,
/// and exposes the lifecycle hooks an administrative layer calls when
/// monitors or devices change.

#[cfg(test)]
mod tests;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::Database;
use crate::database::models::MonitorRecord;
use crate::events::{DomainEvent, EventBus, EventPublisher};
use crate::monitoring::pipeline::CheckPipeline;
use crate::monitoring::{MonitoringExecutor, MonitoringScheduler, ResultRecorder, SchedulerError};

/// Main orchestrator for the monitoring engine
pub struct Orchestrator {
    database: Arc<dyn Database>,
    publisher: Arc<EventPublisher>,
    bus: Arc<EventBus>,
    recorder: Arc<ResultRecorder>,
    scheduler: MonitoringScheduler,
}

impl Orchestrator {
    /// Create an orchestrator with the real network probes
    pub fn new(config: &Config, database: Arc<dyn Database>) -> Result<Self> {
        let executor = MonitoringExecutor::new(config.thresholds.clone())?;
        Ok(Self::with_executor(config, database, executor))
    }

    pub fn with_executor(
        config: &Config,
        database: Arc<dyn Database>,
        executor: MonitoringExecutor,
    ) -> Self {
        let publisher = Arc::new(EventPublisher::new());
        let bus = Arc::new(EventBus::new(config.engine.event_channel_capacity));
        publisher.subscribe(bus.clone());

        let recorder = Arc::new(ResultRecorder::new(
            database.clone(),
            config.engine.max_results_per_monitor,
        ));
        let pipeline = Arc::new(CheckPipeline::new(
            database.clone(),
            Arc::new(executor),
            recorder.clone(),
            publisher.clone(),
        ));
        let scheduler = MonitoringScheduler::new(pipeline, database.clone());

        Self {
            database,
            publisher,
            bus,
            recorder,
            scheduler,
        }
    }

    /// Schedule every enabled monitor in the store
    pub async fn start(&self) -> Result<usize> {
        info!("Starting monitoring engine...");
        Ok(self.scheduler.start().await?)
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    /// Stop scheduling and wait up to `grace` for running checks to record
    /// their results. Returns how many checks had to be aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        self.scheduler.shutdown(grace).await
    }

    /// A monitor was created or updated
    pub async fn monitor_saved(&self, record: &MonitorRecord) -> Result<bool, SchedulerError> {
        self.scheduler.schedule_monitor(record).await
    }

    /// A monitor was deleted; its history stays in the store
    pub async fn monitor_deleted(&self, monitor_id: i64) -> bool {
        let unscheduled = self.scheduler.unschedule_monitor(monitor_id).await;
        self.recorder.forget(monitor_id).await;
        unscheduled
    }

    /// Enable or disable a monitor, persisting the flag first
    pub async fn set_monitor_enabled(&self, monitor_id: i64, enabled: bool) -> Result<bool> {
        let Some(mut record) = self.database.get_monitor(monitor_id).await? else {
            return Ok(false);
        };
        record.enabled = enabled;
        self.database.update_monitor(&record).await?;
        Ok(self.scheduler.schedule_monitor(&record).await?)
    }

    /// A device was edited (for example its address); reschedule its monitors
    /// so they pick up the change on the next tick
    pub async fn device_updated(&self, device_id: i64) -> Result<usize> {
        let monitors = self.database.get_monitors_by_device(device_id).await?;
        let mut scheduled = 0;
        for record in &monitors {
            match self.scheduler.schedule_monitor(record).await {
                Ok(true) => scheduled += 1,
                Ok(false) => {}
                Err(e) => warn!("Skipping monitor {}: {}", record.id, e),
            }
        }
        Ok(scheduled)
    }

    /// A device was deleted; unschedule its monitors and drop their cached
    /// histories. Returns how many monitors were unscheduled.
    pub async fn device_deleted(&self, device_id: i64) -> usize {
        let removed = self.scheduler.unschedule_device(device_id).await;
        for monitor_id in &removed {
            self.recorder.forget(*monitor_id).await;
        }
        removed.len()
    }

    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    /// Receive every domain event through a broadcast channel
    pub fn subscribe_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.bus.subscribe()
    }

    pub fn recorder(&self) -> &Arc<ResultRecorder> {
        &self.recorder
    }

    pub fn scheduler(&self) -> &MonitoringScheduler {
        &self.scheduler
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }
}
