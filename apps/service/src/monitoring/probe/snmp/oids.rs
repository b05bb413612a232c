//! Well-known OID names accepted in monitor configs.

use super::ber::{BerError, Oid};

/// Symbolic prefixes and their numeric OIDs
pub const KNOWN_OIDS: &[(&str, &str)] = &[
    ("sysDescr", "1.3.6.1.2.1.1.1"),
    ("sysUpTime", "1.3.6.1.2.1.1.3"),
    ("sysName", "1.3.6.1.2.1.1.5"),
    ("ifInOctets", "1.3.6.1.2.1.2.2.1.10"),
    ("ifOutOctets", "1.3.6.1.2.1.2.2.1.16"),
    ("hrMemorySize", "1.3.6.1.2.1.25.2.2"),
    ("hrStorageSize", "1.3.6.1.2.1.25.2.3.1.5"),
    ("hrStorageUsed", "1.3.6.1.2.1.25.2.3.1.6"),
    ("hrProcessorLoad", "1.3.6.1.2.1.25.3.3.1.2"),
    ("ssCpuIdle", "1.3.6.1.4.1.2021.11.11"),
    ("memTotalReal", "1.3.6.1.4.1.2021.4.5"),
    ("memAvailReal", "1.3.6.1.4.1.2021.4.6"),
    ("dskPercent", "1.3.6.1.4.1.2021.9.1.9"),
];

/// Resolve `name[.suffix]` or a dotted numeric OID to its numeric form
pub fn resolve_oid(value: &str) -> Result<String, BerError> {
    let trimmed = value.trim();
    let (head, suffix) = match trimmed.split_once('.') {
        Some((head, suffix)) => (head, Some(suffix)),
        None => (trimmed, None),
    };

    let numeric = match KNOWN_OIDS.iter().find(|(name, _)| *name == head) {
        Some((_, base)) => match suffix {
            Some(suffix) => format!("{base}.{suffix}"),
            None => (*base).to_string(),
        },
        None => trimmed.to_string(),
    };

    let oid: Oid = numeric
        .parse()
        .map_err(|_| BerError::InvalidOid(value.to_string()))?;
    Ok(oid.to_string())
}

/// Category of a numeric OID, used to derive host metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OidCategory {
    Uptime,
    IfInOctets,
    IfOutOctets,
    ProcessorLoad,
    CpuIdle,
    MemTotal,
    MemAvail,
    StorageSize,
    StorageUsed,
    DiskPercent,
    Other,
}

const CATEGORIES: &[(&str, OidCategory)] = &[
    ("1.3.6.1.2.1.1.3", OidCategory::Uptime),
    ("1.3.6.1.2.1.2.2.1.10", OidCategory::IfInOctets),
    ("1.3.6.1.2.1.2.2.1.16", OidCategory::IfOutOctets),
    ("1.3.6.1.2.1.25.3.3.1.2", OidCategory::ProcessorLoad),
    ("1.3.6.1.4.1.2021.11.11", OidCategory::CpuIdle),
    ("1.3.6.1.4.1.2021.4.5", OidCategory::MemTotal),
    ("1.3.6.1.2.1.25.2.2", OidCategory::MemTotal),
    ("1.3.6.1.4.1.2021.4.6", OidCategory::MemAvail),
    ("1.3.6.1.2.1.25.2.3.1.5", OidCategory::StorageSize),
    ("1.3.6.1.2.1.25.2.3.1.6", OidCategory::StorageUsed),
    ("1.3.6.1.4.1.2021.9.1.9", OidCategory::DiskPercent),
];

pub fn categorize(numeric: &str) -> OidCategory {
    CATEGORIES
        .iter()
        .find(|(prefix, _)| {
            numeric == *prefix
                || numeric
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
        .map(|(_, category)| *category)
        .unwrap_or(OidCategory::Other)
}
