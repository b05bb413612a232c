//! In-process store.
//!
//! Keeps everything in maps behind one async lock. Result lists are capped
//! per monitor so a long-running engine does not grow without bound even if
//! nobody prunes.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::RwLock;

use super::models::{
    Alert, AlertStatus, Device, MonitorRecord, MonitorResult, NewAlert, NewDevice, NewMonitor,
    NewMonitorResult,
};
use super::repository::Database;

pub const DEFAULT_RESULTS_PER_MONITOR: usize = 100;

#[derive(Default)]
struct State {
    devices: BTreeMap<i64, Device>,
    monitors: BTreeMap<i64, MonitorRecord>,
    results: BTreeMap<i64, VecDeque<MonitorResult>>,
    alerts: BTreeMap<i64, Alert>,
    next_device_id: i64,
    next_monitor_id: i64,
    next_result_id: i64,
    next_alert_id: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Memory-backed [`Database`]
pub struct MemoryDatabase {
    state: RwLock<State>,
    max_results_per_monitor: usize,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RESULTS_PER_MONITOR)
    }

    /// Keep at most `max_results_per_monitor` results per monitor
    pub fn with_capacity(max_results_per_monitor: usize) -> Self {
        Self {
            state: RwLock::new(State::default()),
            max_results_per_monitor: max_results_per_monitor.max(1),
        }
    }

    /// Insert or replace a device as-is, keeping its id
    pub async fn put_device(&self, device: Device) {
        let mut state = self.state.write().await;
        state.next_device_id = state.next_device_id.max(device.id);
        state.devices.insert(device.id, device);
    }

    pub async fn remove_device(&self, id: i64) -> Option<Device> {
        self.state.write().await.devices.remove(&id)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn get_device(&self, id: i64) -> Result<Option<Device>> {
        Ok(self.state.read().await.devices.get(&id).cloned())
    }

    async fn get_monitors(&self) -> Result<Vec<MonitorRecord>> {
        Ok(self.state.read().await.monitors.values().cloned().collect())
    }

    async fn get_monitors_by_device(&self, device_id: i64) -> Result<Vec<MonitorRecord>> {
        let state = self.state.read().await;
        Ok(state.monitors.values().filter(|m| m.device_id == device_id).cloned().collect())
    }

    async fn get_monitor(&self, id: i64) -> Result<Option<MonitorRecord>> {
        Ok(self.state.read().await.monitors.get(&id).cloned())
    }

    async fn create_monitor_result(&self, result: NewMonitorResult) -> Result<MonitorResult> {
        let mut state = self.state.write().await;
        let id = next(&mut state.next_result_id);
        let stored = result.into_result(id);

        let list = state.results.entry(stored.monitor_id).or_default();
        list.push_back(stored.clone());
        while list.len() > self.max_results_per_monitor {
            list.pop_front();
        }
        Ok(stored)
    }

    async fn get_monitor_results(
        &self,
        monitor_id: i64,
        limit: usize,
    ) -> Result<Vec<MonitorResult>> {
        let state = self.state.read().await;
        let Some(list) = state.results.get(&monitor_id) else {
            return Ok(Vec::new());
        };
        let skip = list.len().saturating_sub(limit);
        Ok(list.iter().skip(skip).cloned().collect())
    }

    async fn prune_monitor_results(&self, monitor_id: i64, keep: usize) -> Result<u64> {
        let mut state = self.state.write().await;
        let Some(list) = state.results.get_mut(&monitor_id) else {
            return Ok(0);
        };
        let excess = list.len().saturating_sub(keep);
        list.drain(..excess);
        Ok(excess as u64)
    }

    async fn create_alert(&self, alert: NewAlert) -> Result<Alert> {
        let mut state = self.state.write().await;
        let id = next(&mut state.next_alert_id);
        let stored = alert.into_alert(id, Utc::now());
        state.alerts.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_alerts(&self, status: Option<AlertStatus>) -> Result<Vec<Alert>> {
        let state = self.state.read().await;
        Ok(state
            .alerts
            .values()
            .rev()
            .filter(|alert| status.is_none_or(|s| alert.status == s))
            .cloned()
            .collect())
    }

    async fn update_alert_status(&self, id: i64, status: AlertStatus) -> Result<Option<Alert>> {
        let mut state = self.state.write().await;
        Ok(state.alerts.get_mut(&id).map(|alert| {
            alert.apply_status(status, Utc::now());
            alert.clone()
        }))
    }

    async fn create_device(&self, device: NewDevice) -> Result<Device> {
        let mut state = self.state.write().await;
        let id = next(&mut state.next_device_id);
        let stored = Device {
            id,
            name: device.name,
            address: device.address,
            device_type: device.device_type,
            location: device.location,
            maintenance_mode: false,
        };
        state.devices.insert(id, stored.clone());
        Ok(stored)
    }

    async fn create_monitor(&self, monitor: NewMonitor) -> Result<MonitorRecord> {
        let mut state = self.state.write().await;
        let id = next(&mut state.next_monitor_id);
        let stored = MonitorRecord {
            id,
            device_id: monitor.device_id,
            kind: monitor.kind,
            config: monitor.config,
            enabled: monitor.enabled,
            interval_seconds: monitor.interval_seconds,
        };
        state.monitors.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_monitor(&self, monitor: &MonitorRecord) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.monitors.get_mut(&monitor.id) {
            Some(existing) => {
                *existing = monitor.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_monitor(&self, id: i64) -> Result<bool> {
        let mut state = self.state.write().await;
        state.results.remove(&id);
        Ok(state.monitors.remove(&id).is_some())
    }
}
