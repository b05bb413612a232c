//! Transition detection.

use super::config::{ProbeConfig, ScheduledMonitor};
use super::types::MonitorStatus;
use crate::database::models::{AlertSeverity, AlertStatus, Device, MonitorResult, NewAlert};

/// Only a move from a healthy (or unknown) state into a degraded one alerts
pub fn should_alert(previous: MonitorStatus, current: MonitorStatus) -> bool {
    current.is_degraded() && matches!(previous, MonitorStatus::Online | MonitorStatus::Unknown)
}

/// Build the alert for `result`, if the transition from `previous` warrants one
pub fn detect(
    previous: MonitorStatus,
    result: &MonitorResult,
    device: &Device,
    monitor: &ScheduledMonitor,
) -> Option<NewAlert> {
    if !should_alert(previous, result.status) {
        return None;
    }

    let severity = match result.status {
        MonitorStatus::Down => AlertSeverity::Danger,
        _ => AlertSeverity::Warning,
    };

    Some(NewAlert {
        device_id: device.id,
        monitor_id: monitor.id,
        message: alert_message(result.status, device, &monitor.config),
        severity,
        status: AlertStatus::Active,
    })
}

pub fn alert_message(status: MonitorStatus, device: &Device, config: &ProbeConfig) -> String {
    let state = if status == MonitorStatus::Down { "Offline" } else { "Warning" };
    match config {
        ProbeConfig::Icmp(_) => format!("{} {} - ICMP failed", device.name, state),
        ProbeConfig::Snmp(_) => format!("{} {} - SNMP check failed", device.name, state),
        ProbeConfig::Http(http) => format!("HTTP Endpoint {} - {}", state, http.url),
        ProbeConfig::Tcp(tcp) => format!("{} Port {} {}", device.name, tcp.port, state),
        ProbeConfig::Unsupported { kind } => {
            format!("{} {} - {} check failed", device.name, state, kind)
        }
    }
}
