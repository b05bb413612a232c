//! Bounded per-monitor result history.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::types::MonitorStatus;
use crate::database::Database;
use crate::database::models::{MonitorResult, NewMonitorResult};

/// A stored result and the status recorded before it
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub result: MonitorResult,
    /// `Unknown` when the monitor had no history
    pub previous: MonitorStatus,
}

#[derive(Default)]
struct History {
    hydrated: bool,
    results: VecDeque<MonitorResult>,
    /// Reported as the previous status of the next append instead of the
    /// last stored one, until that append succeeds
    replay_previous: Option<MonitorStatus>,
}

impl History {
    fn last(&self) -> Option<&MonitorResult> {
        self.results.back()
    }
}

/// Persists results and keeps the latest `capacity` of them per monitor.
///
/// Each monitor has its own slot and lock, so appends for different
/// monitors never wait on each other's store I/O.
pub struct ResultRecorder {
    database: Arc<dyn Database>,
    capacity: usize,
    histories: RwLock<HashMap<i64, Arc<Mutex<History>>>>,
}

impl ResultRecorder {
    pub fn new(database: Arc<dyn Database>, capacity: usize) -> Self {
        Self {
            database,
            capacity: capacity.max(1),
            histories: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, monitor_id: i64) -> Arc<Mutex<History>> {
        if let Some(slot) = self.histories.read().await.get(&monitor_id) {
            return slot.clone();
        }
        self.histories
            .write()
            .await
            .entry(monitor_id)
            .or_default()
            .clone()
    }

    async fn hydrate(&self, monitor_id: i64, history: &mut History) -> Result<()> {
        if history.hydrated {
            return Ok(());
        }
        let stored = self
            .database
            .get_monitor_results(monitor_id, self.capacity)
            .await?;
        debug!("Loaded {} stored results for monitor {}", stored.len(), monitor_id);
        history.results = stored.into();
        history.hydrated = true;
        Ok(())
    }

    /// Persist a result and return it together with the previous status
    pub async fn append(
        &self,
        monitor_id: i64,
        status: MonitorStatus,
        response_time: Option<u64>,
        details: Value,
    ) -> Result<Recorded> {
        let slot = self.slot(monitor_id).await;
        let mut history = slot.lock().await;
        self.hydrate(monitor_id, &mut history).await?;

        let previous = match history.replay_previous {
            Some(status) => status,
            None => history.last().map(|r| r.status).unwrap_or_default(),
        };
        let timestamp = clamp_timestamp(Utc::now(), history.last().map(|r| r.timestamp));

        let result = self
            .database
            .create_monitor_result(NewMonitorResult {
                monitor_id,
                timestamp,
                status,
                response_time,
                details,
            })
            .await?;

        history.replay_previous = None;
        history.results.push_back(result.clone());
        if history.results.len() > self.capacity {
            while history.results.len() > self.capacity {
                history.results.pop_front();
            }
            if let Err(e) = self
                .database
                .prune_monitor_results(monitor_id, self.capacity)
                .await
            {
                // The in-memory view is already bounded, the store catches up next time
                warn!("Failed to prune results for monitor {}: {:#}", monitor_id, e);
            }
        }

        Ok(Recorded { result, previous })
    }

    /// Retained results, oldest first
    pub async fn history(&self, monitor_id: i64) -> Result<Vec<MonitorResult>> {
        let slot = self.slot(monitor_id).await;
        let mut history = slot.lock().await;
        self.hydrate(monitor_id, &mut history).await?;
        Ok(history.results.iter().cloned().collect())
    }

    pub async fn last_status(&self, monitor_id: i64) -> Result<MonitorStatus> {
        let slot = self.slot(monitor_id).await;
        let mut history = slot.lock().await;
        self.hydrate(monitor_id, &mut history).await?;
        Ok(history.last().map(|r| r.status).unwrap_or_default())
    }

    /// Make the next append report `previous` again, so a transition whose
    /// alert could not be stored is detected once more on the next result
    pub async fn replay_transition(&self, monitor_id: i64, previous: MonitorStatus) {
        let slot = self.slot(monitor_id).await;
        slot.lock().await.replay_previous = Some(previous);
    }

    #[cfg(test)]
    pub(crate) async fn is_cached(&self, monitor_id: i64) -> bool {
        self.histories.read().await.contains_key(&monitor_id)
    }

    /// Drop the cached history of a monitor; the store keeps its rows
    pub async fn forget(&self, monitor_id: i64) {
        self.histories.write().await.remove(&monitor_id);
    }
}

/// Timestamps never go backwards within one monitor's history
fn clamp_timestamp(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match last {
        Some(last) if last > now => last,
        _ => now,
    }
}
