use anyhow::Result;
use tracing::debug;

use super::classifier::{Classification, Thresholds, classify, unsupported};
use super::config::ScheduledMonitor;
use super::probe::ProbeSet;
use crate::database::models::Device;

/// Monitoring executor - runs one probe and classifies its outcome
pub struct MonitoringExecutor {
    probes: ProbeSet,
    thresholds: Thresholds,
}

impl MonitoringExecutor {
    /// Create an executor backed by the real network probes
    pub fn new(thresholds: Thresholds) -> Result<Self> {
        Ok(Self::with_probes(ProbeSet::new()?, thresholds))
    }

    pub fn with_probes(probes: ProbeSet, thresholds: Thresholds) -> Self {
        Self { probes, thresholds }
    }

    /// Execute a monitoring check against the monitor's device
    pub async fn execute_check(
        &self,
        device: &Device,
        monitor: &ScheduledMonitor,
    ) -> Classification {
        let Some(kind) = monitor.config.kind() else {
            return unsupported(monitor.config.kind_name());
        };

        let outcome = self
            .probes
            .for_kind(kind)
            .probe(&device.address, &monitor.config)
            .await;
        debug!(
            "{} check for monitor {} on {}: success={} latency={:?}",
            kind.label(),
            monitor.id,
            device.address,
            outcome.success,
            outcome.latency_ms
        );

        classify(&outcome, kind, &self.thresholds)
    }
}
