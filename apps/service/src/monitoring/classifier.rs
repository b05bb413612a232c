//! Maps probe outcomes onto monitor statuses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::probe::snmp::metrics::SnmpMetrics;
use super::types::{MonitorStatus, ProbeOutcome, ProtocolKind};

/// Latency and utilisation limits above which a healthy check is `warning`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub icmp_latency_ms: u64,
    pub http_latency_ms: u64,
    pub tcp_latency_ms: u64,
    pub snmp_cpu_percent: f64,
    pub snmp_memory_percent: f64,
    pub snmp_disk_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            icmp_latency_ms: 100,
            http_latency_ms: 1000,
            tcp_latency_ms: 500,
            snmp_cpu_percent: 80.0,
            snmp_memory_percent: 80.0,
            snmp_disk_percent: 90.0,
        }
    }
}

impl Thresholds {
    fn latency_limit(&self, kind: ProtocolKind) -> Option<(u64, &'static str)> {
        match kind {
            ProtocolKind::Icmp => Some((self.icmp_latency_ms, "High latency")),
            ProtocolKind::Http => Some((self.http_latency_ms, "High response time")),
            ProtocolKind::Tcp => Some((self.tcp_latency_ms, "High latency")),
            ProtocolKind::Snmp => None,
        }
    }
}

/// Status plus the fields recorded with it
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: MonitorStatus,
    pub response_time: Option<u64>,
    pub details: Value,
}

pub fn classify(
    outcome: &ProbeOutcome,
    kind: ProtocolKind,
    thresholds: &Thresholds,
) -> Classification {
    let mut details = outcome.payload.clone();

    if !outcome.success {
        if outcome.error().is_none() {
            details.insert("error".into(), Value::from(format!("{} check failed", kind.label())));
        }
        return Classification {
            status: MonitorStatus::Down,
            response_time: outcome.latency_ms,
            details: Value::Object(details),
        };
    }

    let status = match kind {
        ProtocolKind::Snmp => classify_snmp(outcome, thresholds, &mut details),
        _ => classify_latency(outcome, kind, thresholds, &mut details),
    };

    Classification {
        status,
        response_time: outcome.latency_ms,
        details: Value::Object(details),
    }
}

fn classify_latency(
    outcome: &ProbeOutcome,
    kind: ProtocolKind,
    thresholds: &Thresholds,
    details: &mut Map<String, Value>,
) -> MonitorStatus {
    let (Some(limit), Some(latency)) = (thresholds.latency_limit(kind), outcome.latency_ms) else {
        return MonitorStatus::Online;
    };

    let (threshold, warning) = limit;
    if latency > threshold {
        details.insert("warning".into(), Value::from(warning));
        MonitorStatus::Warning
    } else {
        MonitorStatus::Online
    }
}

fn classify_snmp(
    outcome: &ProbeOutcome,
    thresholds: &Thresholds,
    details: &mut Map<String, Value>,
) -> MonitorStatus {
    let values = outcome
        .payload
        .get("values")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let metrics = SnmpMetrics::from_values(&values);

    let mut warnings = Vec::new();
    if metrics.cpu.is_some_and(|cpu| cpu > thresholds.snmp_cpu_percent) {
        warnings.push("High CPU usage");
    }
    if metrics.memory.is_some_and(|mem| mem > thresholds.snmp_memory_percent) {
        warnings.push("High memory usage");
    }
    if metrics.disk.is_some_and(|disk| disk > thresholds.snmp_disk_percent) {
        warnings.push("High disk usage");
    }

    details.insert("metrics".into(), json!(metrics));
    details.insert("data".into(), Value::Object(values));

    if warnings.is_empty() {
        MonitorStatus::Online
    } else {
        details.insert("warning".into(), Value::from(warnings.join(", ")));
        MonitorStatus::Warning
    }
}

/// Result recorded for a monitor whose protocol has no probe
pub fn unsupported(kind: &str) -> Classification {
    Classification {
        status: MonitorStatus::Unknown,
        response_time: None,
        details: json!({ "error": format!("Unknown monitor type: {kind}") }),
    }
}
