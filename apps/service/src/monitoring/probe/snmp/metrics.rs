use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::oids::{OidCategory, categorize};

/// Host metrics derived from an SNMP `values` map
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_octets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_octets: Option<u64>,
}

impl SnmpMetrics {
    /// Derive metrics from OID → value pairs. Keys may be symbolic, they are
    /// resolved the same way monitor configs are.
    pub fn from_values(values: &Map<String, Value>) -> Self {
        let mut cpu_loads = Vec::new();
        let mut cpu_idle = None;
        let mut mem_total = None;
        let mut mem_avail = None;
        let mut disk_percent: Option<f64> = None;
        let mut storage_size: HashMap<String, f64> = HashMap::new();
        let mut storage_used: HashMap<String, f64> = HashMap::new();
        let mut metrics = SnmpMetrics::default();

        for (key, value) in values {
            let Some(number) = as_number(value) else {
                continue;
            };
            let numeric = super::oids::resolve_oid(key).unwrap_or_else(|_| key.clone());
            match categorize(&numeric) {
                OidCategory::Uptime => metrics.uptime = Some(number as u64),
                OidCategory::IfInOctets => {
                    *metrics.in_octets.get_or_insert(0) += number as u64;
                }
                OidCategory::IfOutOctets => {
                    *metrics.out_octets.get_or_insert(0) += number as u64;
                }
                OidCategory::ProcessorLoad => cpu_loads.push(number),
                OidCategory::CpuIdle => cpu_idle = Some(number),
                OidCategory::MemTotal => mem_total = Some(number),
                OidCategory::MemAvail => mem_avail = Some(number),
                OidCategory::StorageSize => {
                    storage_size.insert(index_of(&numeric), number);
                }
                OidCategory::StorageUsed => {
                    storage_used.insert(index_of(&numeric), number);
                }
                OidCategory::DiskPercent => {
                    disk_percent = Some(disk_percent.map_or(number, |d| d.max(number)));
                }
                OidCategory::Other => {}
            }
        }

        metrics.cpu = if cpu_loads.is_empty() {
            cpu_idle.map(|idle| 100.0 - idle)
        } else {
            Some(cpu_loads.iter().sum::<f64>() / cpu_loads.len() as f64)
        };

        metrics.memory = match (mem_total, mem_avail) {
            (Some(total), Some(avail)) if total > 0.0 => Some((total - avail) / total * 100.0),
            _ => None,
        };

        let storage = storage_used
            .iter()
            .filter_map(|(index, used)| {
                storage_size
                    .get(index)
                    .filter(|size| **size > 0.0)
                    .map(|size| used / size * 100.0)
            })
            .fold(None, |acc: Option<f64>, pct| Some(acc.map_or(pct, |a| a.max(pct))));
        metrics.disk = match (disk_percent, storage) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        metrics
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Table row index: the last arc of the OID
fn index_of(numeric: &str) -> String {
    numeric.rsplit('.').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_cpu_average_and_idle_fallback() {
        let m = SnmpMetrics::from_values(&values(json!({
            "hrProcessorLoad.196608": 70,
            "hrProcessorLoad.196609": 90,
        })));
        assert_eq!(m.cpu, Some(80.0));

        let m = SnmpMetrics::from_values(&values(json!({ "1.3.6.1.4.1.2021.11.11.0": 15 })));
        assert_eq!(m.cpu, Some(85.0));
    }

    #[test]
    fn test_memory_and_disk() {
        let m = SnmpMetrics::from_values(&values(json!({
            "memTotalReal.0": 1000,
            "memAvailReal.0": 100,
            "dskPercent.1": 40,
            "hrStorageSize.31": 200,
            "hrStorageUsed.31": 190,
        })));
        assert_eq!(m.memory, Some(90.0));
        assert_eq!(m.disk, Some(95.0));
    }

    #[test]
    fn test_counters_and_uptime() {
        let m = SnmpMetrics::from_values(&values(json!({
            "sysUpTime.0": 123456,
            "ifInOctets.1": 10,
            "ifInOctets.2": 5,
            "ifOutOctets.1": 7,
            "sysDescr.0": "Linux",
        })));
        assert_eq!(m.uptime, Some(123_456));
        assert_eq!(m.in_octets, Some(15));
        assert_eq!(m.out_octets, Some(7));
        assert_eq!(m.cpu, None);
        assert_eq!(SnmpMetrics::from_values(&Map::new()), SnmpMetrics::default());
    }
}
