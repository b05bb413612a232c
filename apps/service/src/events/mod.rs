//! Domain events fanned out to presentation layers.

pub mod bus;
pub mod publisher;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::models::{Alert, MonitorResult};
use crate::monitoring::types::MonitorStatus;

pub use bus::EventBus;
pub use publisher::{EventListener, EventPublisher, ListenerId};

/// Latest status of a device, derived from one of its monitors
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusEvent {
    pub id: i64,
    pub name: String,
    pub status: MonitorStatus,
    pub last_check: DateTime<Utc>,
    pub response_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorResultEvent {
    pub monitor_id: i64,
    pub device_id: i64,
    pub result: MonitorResult,
}

/// Serialized as `{"type": "...", "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum DomainEvent {
    DeviceStatus(DeviceStatusEvent),
    MonitorResult(MonitorResultEvent),
    Alert(Alert),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    DeviceStatus,
    MonitorResult,
    Alert,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::DeviceStatus => "deviceStatus",
            EventKind::MonitorResult => "monitorResult",
            EventKind::Alert => "alert",
        }
    }
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::DeviceStatus(_) => EventKind::DeviceStatus,
            DomainEvent::MonitorResult(_) => EventKind::MonitorResult,
            DomainEvent::Alert(_) => EventKind::Alert,
        }
    }
}
