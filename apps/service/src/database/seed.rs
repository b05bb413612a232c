use anyhow::Result;
use serde_json::json;
use tracing::info;

use super::models::{NewDevice, NewMonitor};
use super::repository::Database;

const DEMO_DEVICES: &[(&str, &str, &str)] = &[
    ("Core Router", "192.168.1.1", "router"),
    ("Main Switch", "192.168.1.2", "switch"),
    ("Web Server", "192.168.1.100", "server"),
    ("Database Server", "192.168.1.101", "server"),
    ("Mail Server", "192.168.1.102", "server"),
    ("AP Office 1", "192.168.1.150", "access_point"),
    ("Firewall", "192.168.1.254", "firewall"),
    ("NAS Storage", "192.168.1.200", "storage"),
];

/// Populate an empty store with a small demo network. Returns the number of
/// monitors created; a store that already has monitors is left alone.
pub async fn seed_demo(db: &dyn Database) -> Result<usize> {
    if !db.get_monitors().await?.is_empty() {
        info!("Store already has monitors, skipping demo seed");
        return Ok(0);
    }

    let mut created = 0;
    let mut by_name = std::collections::HashMap::new();
    for (name, address, device_type) in DEMO_DEVICES {
        let device = db
            .create_device(NewDevice::new(*name, *address, *device_type))
            .await?;
        db.create_monitor(NewMonitor::new(
            device.id,
            "icmp",
            json!({ "timeout": 5, "packet_size": 56, "count": 3 }),
        ))
        .await?;
        created += 1;
        by_name.insert(*name, device);
    }

    let extra = [
        (
            "Web Server",
            "http",
            json!({
                "url": "http://192.168.1.100",
                "method": "GET",
                "expected_status": 200,
                "timeout": 5,
                "validate_ssl": false
            }),
        ),
        (
            "Mail Server",
            "http",
            json!({
                "url": "http://192.168.1.102/webmail",
                "expected_status": 200,
                "validate_ssl": false
            }),
        ),
        ("Database Server", "tcp", json!({ "port": 5432, "timeout": 5 })),
        ("Mail Server", "tcp", json!({ "port": 25, "timeout": 5 })),
        (
            "Core Router",
            "snmp",
            json!({
                "community": "public",
                "version": "2c",
                "oids": ["sysUpTime.0", "ifInOctets.1", "ifOutOctets.1"]
            }),
        ),
        (
            "NAS Storage",
            "snmp",
            json!({ "oids": ["hrProcessorLoad.196608", "dskPercent.1"] }),
        ),
    ];
    for (device_name, kind, config) in extra {
        let Some(device) = by_name.get(device_name) else {
            continue;
        };
        db.create_monitor(NewMonitor::new(device.id, kind, config).interval(60))
            .await?;
        created += 1;
    }

    info!("Seeded {} demo devices with {} monitors", by_name.len(), created);
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDatabase;
    use crate::monitoring::config::ScheduledMonitor;

    #[tokio::test]
    async fn test_seed_once_with_valid_configs() {
        let db = MemoryDatabase::new();
        let created = seed_demo(&db).await.unwrap();
        assert_eq!(created, DEMO_DEVICES.len() + 6);
        assert_eq!(seed_demo(&db).await.unwrap(), 0);

        for record in db.get_monitors().await.unwrap() {
            ScheduledMonitor::from_record(&record)
                .unwrap_or_else(|e| panic!("seeded monitor {} invalid: {e}", record.id));
        }
    }
}
