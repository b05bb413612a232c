use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::monitoring::types::MonitorStatus;

/// Device model - a monitored network target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: i64,
    pub name: String,
    #[serde(alias = "ipAddress", alias = "ip_address")]
    pub address: String,
    #[serde(alias = "type")]
    pub device_type: String,
    pub location: Option<String>,
    #[serde(default)]
    pub maintenance_mode: bool,
}

/// Device fields supplied when creating a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub name: String,
    pub address: String,
    pub device_type: String,
    pub location: Option<String>,
}

impl NewDevice {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            device_type: device_type.into(),
            location: None,
        }
    }
}

/// Monitor model - the stored record of a configured check.
///
/// `kind` and `config` are kept loosely typed here because they come straight
/// from the store; the scheduler validates them into a
/// [`ScheduledMonitor`](crate::monitoring::config::ScheduledMonitor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorRecord {
    pub id: i64,
    pub device_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: Value,
    pub enabled: bool,
    #[serde(alias = "interval")]
    pub interval_seconds: u64,
}

/// Monitor fields supplied when creating a monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMonitor {
    pub device_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: Value,
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl NewMonitor {
    /// Enabled monitor polling every 60 seconds
    pub fn new(device_id: i64, kind: impl Into<String>, config: Value) -> Self {
        Self {
            device_id,
            kind: kind.into(),
            config,
            enabled: true,
            interval_seconds: 60,
        }
    }

    pub fn interval(mut self, seconds: u64) -> Self {
        self.interval_seconds = seconds;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// MonitorResult model - one recorded check outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorResult {
    pub id: i64,
    pub monitor_id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: MonitorStatus,
    pub response_time: Option<u64>,
    pub details: Value,
}

/// Result fields handed to the store by the recorder
#[derive(Debug, Clone, PartialEq)]
pub struct NewMonitorResult {
    pub monitor_id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: MonitorStatus,
    pub response_time: Option<u64>,
    pub details: Value,
}

impl NewMonitorResult {
    pub fn into_result(self, id: i64) -> MonitorResult {
        MonitorResult {
            id,
            monitor_id: self.monitor_id,
            timestamp: self.timestamp,
            status: self.status,
            response_time: self.response_time,
            details: self.details,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Danger,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Danger => "danger",
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AlertSeverity::Info),
            "warning" => Ok(AlertSeverity::Warning),
            "danger" => Ok(AlertSeverity::Danger),
            other => Err(format!("unknown alert severity: {other}")),
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Escalated,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Escalated => "escalated",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "escalated" => Ok(AlertStatus::Escalated),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("unknown alert status: {other}")),
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert model - a persisted degrade transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: i64,
    pub device_id: i64,
    pub monitor_id: i64,
    pub message: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Apply an administrative status change, stamping the matching timestamp
    /// the first time a state is reached.
    pub fn apply_status(&mut self, status: AlertStatus, now: DateTime<Utc>) {
        self.status = status;
        match status {
            AlertStatus::Acknowledged => {
                self.acknowledged_at.get_or_insert(now);
            }
            AlertStatus::Resolved => {
                self.resolved_at.get_or_insert(now);
            }
            AlertStatus::Active => self.resolved_at = None,
            AlertStatus::Escalated => {}
        }
    }
}

/// Alert fields produced by the alert generator
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub device_id: i64,
    pub monitor_id: i64,
    pub message: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
}

impl NewAlert {
    pub fn into_alert(self, id: i64, created_at: DateTime<Utc>) -> Alert {
        Alert {
            id,
            device_id: self.device_id,
            monitor_id: self.monitor_id,
            message: self.message,
            severity: self.severity,
            status: self.status,
            created_at,
            acknowledged_at: None,
            resolved_at: None,
        }
    }
}

/// Convert a timestamp to unix milliseconds for storage
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored unix milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
