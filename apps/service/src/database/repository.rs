use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use libsql::{Row, params};
use serde_json::Value;

use super::models::{
    Alert, AlertStatus, Device, MonitorRecord, MonitorResult, NewAlert, NewDevice, NewMonitor,
    NewMonitorResult, from_millis, to_millis,
};
use crate::monitoring::types::MonitorStatus;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Store interface used by the monitoring engine
#[async_trait]
pub trait Database: Send + Sync {
    /// Get a device by id
    async fn get_device(&self, id: i64) -> Result<Option<Device>>;

    /// Get every monitor, enabled or not
    async fn get_monitors(&self) -> Result<Vec<MonitorRecord>>;

    async fn get_monitors_by_device(&self, device_id: i64) -> Result<Vec<MonitorRecord>>;

    async fn get_monitor(&self, id: i64) -> Result<Option<MonitorRecord>>;

    /// Append a result, assigning its id
    async fn create_monitor_result(&self, result: NewMonitorResult) -> Result<MonitorResult>;

    /// The most recent `limit` results for a monitor, oldest first
    async fn get_monitor_results(
        &self,
        monitor_id: i64,
        limit: usize,
    ) -> Result<Vec<MonitorResult>>;

    /// Delete all but the newest `keep` results, returning how many were removed
    async fn prune_monitor_results(&self, monitor_id: i64, keep: usize) -> Result<u64>;

    async fn create_alert(&self, alert: NewAlert) -> Result<Alert>;

    /// Alerts, newest first, optionally filtered by status
    async fn get_alerts(&self, status: Option<AlertStatus>) -> Result<Vec<Alert>>;

    /// Administrative status change; `None` when the alert does not exist
    async fn update_alert_status(&self, id: i64, status: AlertStatus) -> Result<Option<Alert>>;

    async fn create_device(&self, device: NewDevice) -> Result<Device>;

    async fn create_monitor(&self, monitor: NewMonitor) -> Result<MonitorRecord>;

    /// Replace a stored monitor; `false` when it does not exist
    async fn update_monitor(&self, monitor: &MonitorRecord) -> Result<bool>;

    /// Delete a monitor and its results; `false` when it does not exist
    async fn delete_monitor(&self, id: i64) -> Result<bool>;
}

const MONITOR_COLUMNS: &str = "id, device_id, kind, config, enabled, interval_seconds";
const RESULT_COLUMNS: &str = "id, monitor_id, timestamp, status, response_time, details";
const ALERT_COLUMNS: &str =
    "id, device_id, monitor_id, message, severity, status, created_at, acknowledged_at, resolved_at";

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn query_monitors(
        &self,
        filter: &str,
        args: impl libsql::params::IntoParams,
    ) -> Result<Vec<MonitorRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors {filter} ORDER BY id");
        let mut rows = conn.query(&sql, args).await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn get_alert(&self, id: i64) -> Result<Option<Alert>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?");
        let mut rows = conn.query(&sql, params![id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(alert_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

/// Parse a JSON column, keeping unparseable text as a string value
fn json_column(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn device_from_row(row: &Row) -> Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        device_type: row.get(3)?,
        location: row.get(4)?,
        maintenance_mode: row.get::<i64>(5)? != 0,
    })
}

fn monitor_from_row(row: &Row) -> Result<MonitorRecord> {
    Ok(MonitorRecord {
        id: row.get(0)?,
        device_id: row.get(1)?,
        kind: row.get(2)?,
        config: json_column(row.get(3)?),
        enabled: row.get::<i64>(4)? != 0,
        interval_seconds: row.get::<i64>(5)?.max(0) as u64,
    })
}

fn result_from_row(row: &Row) -> Result<MonitorResult> {
    let status: String = row.get(3)?;
    Ok(MonitorResult {
        id: row.get(0)?,
        monitor_id: row.get(1)?,
        timestamp: from_millis(row.get(2)?),
        status: MonitorStatus::parse(&status),
        response_time: row.get::<Option<i64>>(4)?.map(|v| v.max(0) as u64),
        details: json_column(row.get(5)?),
    })
}

fn alert_from_row(row: &Row) -> Result<Alert> {
    let severity: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(Alert {
        id: row.get(0)?,
        device_id: row.get(1)?,
        monitor_id: row.get(2)?,
        message: row.get(3)?,
        severity: severity.parse().map_err(anyhow::Error::msg)?,
        status: status.parse().map_err(anyhow::Error::msg)?,
        created_at: from_millis(row.get(6)?),
        acknowledged_at: row.get::<Option<i64>>(7)?.map(from_millis),
        resolved_at: row.get::<Option<i64>>(8)?.map(from_millis),
    })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn get_device(&self, id: i64) -> Result<Option<Device>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare("SELECT id, name, address, device_type, location, maintenance_mode FROM devices WHERE id = ?")
            .await?;

        let mut rows = stmt.query(params![id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(device_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_monitors(&self) -> Result<Vec<MonitorRecord>> {
        self.query_monitors("", ()).await
    }

    async fn get_monitors_by_device(&self, device_id: i64) -> Result<Vec<MonitorRecord>> {
        self.query_monitors("WHERE device_id = ?", params![device_id])
            .await
    }

    async fn get_monitor(&self, id: i64) -> Result<Option<MonitorRecord>> {
        Ok(self.query_monitors("WHERE id = ?", params![id]).await?.into_iter().next())
    }

    async fn create_monitor_result(&self, result: NewMonitorResult) -> Result<MonitorResult> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitor_results (monitor_id, timestamp, status, response_time, details) VALUES (?, ?, ?, ?, ?)",
            params![
                result.monitor_id,
                to_millis(result.timestamp),
                result.status.as_str(),
                result.response_time.map(|v| v as i64),
                result.details.to_string()
            ],
        )
        .await?;

        Ok(result.into_result(conn.last_insert_rowid()))
    }

    async fn get_monitor_results(
        &self,
        monitor_id: i64,
        limit: usize,
    ) -> Result<Vec<MonitorResult>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM monitor_results WHERE monitor_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?"
        );
        let mut rows = conn.query(&sql, params![monitor_id, limit as i64]).await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(result_from_row(&row)?);
        }
        results.reverse();
        Ok(results)
    }

    async fn prune_monitor_results(&self, monitor_id: i64, keep: usize) -> Result<u64> {
        let conn = self.get_conn().await?;
        let removed = conn
            .execute(
                "DELETE FROM monitor_results WHERE monitor_id = ?1 AND id NOT IN (
                    SELECT id FROM monitor_results WHERE monitor_id = ?1
                    ORDER BY timestamp DESC, id DESC LIMIT ?2
                )",
                params![monitor_id, keep as i64],
            )
            .await?;
        Ok(removed)
    }

    async fn create_alert(&self, alert: NewAlert) -> Result<Alert> {
        let conn = self.get_conn().await?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO alerts (device_id, monitor_id, message, severity, status, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                alert.device_id,
                alert.monitor_id,
                alert.message.clone(),
                alert.severity.as_str(),
                alert.status.as_str(),
                to_millis(created_at)
            ],
        )
        .await?;

        // Round-trip through millis so the returned alert matches a later read
        Ok(alert.into_alert(conn.last_insert_rowid(), from_millis(to_millis(created_at))))
    }

    async fn get_alerts(&self, status: Option<AlertStatus>) -> Result<Vec<Alert>> {
        let conn = self.get_conn().await?;
        let mut rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {ALERT_COLUMNS} FROM alerts WHERE status = ? ORDER BY created_at DESC, id DESC"
                );
                conn.query(&sql, params![status.as_str()]).await?
            }
            None => {
                let sql =
                    format!("SELECT {ALERT_COLUMNS} FROM alerts ORDER BY created_at DESC, id DESC");
                conn.query(&sql, ()).await?
            }
        };

        let mut alerts = Vec::new();
        while let Some(row) = rows.next().await? {
            alerts.push(alert_from_row(&row)?);
        }
        Ok(alerts)
    }

    async fn update_alert_status(&self, id: i64, status: AlertStatus) -> Result<Option<Alert>> {
        let Some(mut alert) = self.get_alert(id).await? else {
            return Ok(None);
        };
        alert.apply_status(status, from_millis(to_millis(Utc::now())));

        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE alerts SET status = ?, acknowledged_at = ?, resolved_at = ? WHERE id = ?",
            params![
                alert.status.as_str(),
                alert.acknowledged_at.map(to_millis),
                alert.resolved_at.map(to_millis),
                id
            ],
        )
        .await?;
        Ok(Some(alert))
    }

    async fn create_device(&self, device: NewDevice) -> Result<Device> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO devices (name, address, device_type, location, maintenance_mode) VALUES (?, ?, ?, ?, 0)",
            params![
                device.name.clone(),
                device.address.clone(),
                device.device_type.clone(),
                device.location.clone()
            ],
        )
        .await?;

        Ok(Device {
            id: conn.last_insert_rowid(),
            name: device.name,
            address: device.address,
            device_type: device.device_type,
            location: device.location,
            maintenance_mode: false,
        })
    }

    async fn create_monitor(&self, monitor: NewMonitor) -> Result<MonitorRecord> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitors (device_id, kind, config, enabled, interval_seconds) VALUES (?, ?, ?, ?, ?)",
            params![
                monitor.device_id,
                monitor.kind.clone(),
                monitor.config.to_string(),
                if monitor.enabled { 1 } else { 0 },
                monitor.interval_seconds as i64
            ],
        )
        .await?;

        Ok(MonitorRecord {
            id: conn.last_insert_rowid(),
            device_id: monitor.device_id,
            kind: monitor.kind,
            config: monitor.config,
            enabled: monitor.enabled,
            interval_seconds: monitor.interval_seconds,
        })
    }

    async fn update_monitor(&self, monitor: &MonitorRecord) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE monitors SET device_id = ?, kind = ?, config = ?, enabled = ?, interval_seconds = ? WHERE id = ?",
                params![
                    monitor.device_id,
                    monitor.kind.clone(),
                    monitor.config.to_string(),
                    if monitor.enabled { 1 } else { 0 },
                    monitor.interval_seconds as i64,
                    monitor.id
                ],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn delete_monitor(&self, id: i64) -> Result<bool> {
        let conn = self.get_conn().await?;
        conn.execute("DELETE FROM monitor_results WHERE monitor_id = ?", params![id])
            .await
            .with_context(|| format!("deleting results of monitor {id}"))?;
        let removed = conn
            .execute("DELETE FROM monitors WHERE id = ?", params![id])
            .await?;
        Ok(removed > 0)
    }
}
