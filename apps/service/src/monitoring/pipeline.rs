use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::alerts::detect;
use super::config::ScheduledMonitor;
use super::executor::MonitoringExecutor;
use super::recorder::ResultRecorder;
use super::scheduler::Registration;
use super::types::MonitorStatus;
use crate::database::Database;
use crate::events::{DeviceStatusEvent, DomainEvent, EventPublisher, MonitorResultEvent};

/// What a single tick ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Recorded {
        status: MonitorStatus,
        alert: Option<i64>,
    },
    /// The monitor was unscheduled while the probe ran
    Discarded,
    /// Device missing or the store failed
    Skipped,
}

/// One pass of probe, classify, record, detect and publish
pub struct CheckPipeline {
    database: Arc<dyn Database>,
    executor: Arc<MonitoringExecutor>,
    recorder: Arc<ResultRecorder>,
    publisher: Arc<EventPublisher>,
}

impl CheckPipeline {
    pub fn new(
        database: Arc<dyn Database>,
        executor: Arc<MonitoringExecutor>,
        recorder: Arc<ResultRecorder>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            database,
            executor,
            recorder,
            publisher,
        }
    }

    pub async fn run(
        &self,
        monitor: &ScheduledMonitor,
        registration: &Registration,
    ) -> TickOutcome {
        let device = match self.database.get_device(monitor.device_id).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                warn!(
                    "Device {} for monitor {} not found, skipping check",
                    monitor.device_id, monitor.id
                );
                return TickOutcome::Skipped;
            }
            Err(e) => {
                error!(
                    "Failed to load device {} for monitor {}: {:#}",
                    monitor.device_id, monitor.id, e
                );
                return TickOutcome::Skipped;
            }
        };

        let classification = self.executor.execute_check(&device, monitor).await;

        if !registration.is_active() {
            debug!("Monitor {} was unscheduled during its check, discarding result", monitor.id);
            return TickOutcome::Discarded;
        }

        let recorded = match self
            .recorder
            .append(
                monitor.id,
                classification.status,
                classification.response_time,
                classification.details,
            )
            .await
        {
            Ok(recorded) => recorded,
            Err(e) => {
                error!("Failed to record result for monitor {}: {:#}", monitor.id, e);
                return TickOutcome::Skipped;
            }
        };

        if !registration.is_active() {
            debug!(
                "Monitor {} was unscheduled while recording, suppressing alert and events",
                monitor.id
            );
            return TickOutcome::Discarded;
        }

        let mut alert_id = None;
        if let Some(new_alert) = detect(recorded.previous, &recorded.result, &device, monitor) {
            match self.database.create_alert(new_alert).await {
                Ok(alert) => {
                    info!(
                        "Alert {} raised for monitor {}: {}",
                        alert.id, monitor.id, alert.message
                    );
                    alert_id = Some(alert.id);
                    self.publisher.emit(&DomainEvent::Alert(alert));
                }
                Err(e) => {
                    error!("Failed to create alert for monitor {}: {:#}", monitor.id, e);
                    self.recorder
                        .replay_transition(monitor.id, recorded.previous)
                        .await;
                    return TickOutcome::Skipped;
                }
            }
        }

        let result = recorded.result;
        let status = result.status;
        self.publisher.emit(&DomainEvent::DeviceStatus(DeviceStatusEvent {
            id: device.id,
            name: device.name,
            status,
            last_check: result.timestamp,
            response_time: result.response_time,
        }));
        self.publisher.emit(&DomainEvent::MonitorResult(MonitorResultEvent {
            monitor_id: monitor.id,
            device_id: device.id,
            result,
        }));

        TickOutcome::Recorded {
            status,
            alert: alert_id,
        }
    }
}
