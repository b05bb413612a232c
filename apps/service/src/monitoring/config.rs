//! Typed per-protocol monitor configuration.
//!
//! Records come out of the store with a free-form JSON `config`; they are
//! parsed into a [`ProbeConfig`] once, when the monitor is scheduled.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use super::types::ProtocolKind;
use super::validation::{
    ValidationError, validate_check_interval, validate_expected_status, validate_headers,
    validate_http_url, validate_oids, validate_packet_size, validate_ping_count, validate_port,
    validate_timeout,
};
use crate::database::models::MonitorRecord;

const DEFAULT_TIMEOUT: u64 = 5;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcmpConfig {
    #[serde(default = "default_timeout", alias = "timeout", alias = "timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "IcmpConfig::default_packet_size", alias = "packet_size")]
    pub packet_size: u32,
    #[serde(default = "IcmpConfig::default_count")]
    pub count: u32,
    /// TCP port tried when ICMP is unavailable on this host
    #[serde(default = "IcmpConfig::default_fallback_port", alias = "fallback_port")]
    pub fallback_port: u16,
}

impl IcmpConfig {
    fn default_packet_size() -> u32 {
        56
    }

    fn default_count() -> u32 {
        3
    }

    fn default_fallback_port() -> u16 {
        80
    }
}

impl Default for IcmpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT,
            packet_size: Self::default_packet_size(),
            count: Self::default_count(),
            fallback_port: Self::default_fallback_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnmpVersion {
    #[serde(rename = "1", alias = "v1")]
    V1,
    #[default]
    #[serde(rename = "2c", alias = "v2c", alias = "2")]
    V2c,
    #[serde(rename = "3", alias = "v3")]
    V3,
}

impl SnmpVersion {
    /// Version field as encoded in the message header
    pub fn wire_value(self) -> i64 {
        match self {
            SnmpVersion::V1 => 0,
            SnmpVersion::V2c => 1,
            SnmpVersion::V3 => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpConfig {
    #[serde(default = "SnmpConfig::default_community")]
    pub community: String,
    #[serde(default, deserialize_with = "version_from_any")]
    pub version: SnmpVersion,
    #[serde(default = "SnmpConfig::default_port")]
    pub port: u16,
    #[serde(default)]
    pub oids: Vec<String>,
    #[serde(default = "default_timeout", alias = "timeout", alias = "timeout_seconds")]
    pub timeout_seconds: u64,
}

impl SnmpConfig {
    fn default_community() -> String {
        "public".to_string()
    }

    fn default_port() -> u16 {
        161
    }
}

/// Accepts `"2c"` as well as bare numbers such as `1`
fn version_from_any<'de, D>(deserializer: D) -> Result<SnmpVersion, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s,
        other => other.to_string(),
    };
    SnmpVersion::deserialize(Value::String(text.to_ascii_lowercase()))
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
}

impl HttpMethod {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "HttpConfig::default_status", alias = "expected_status")]
    pub expected_status: u16,
    #[serde(default = "default_timeout", alias = "timeout", alias = "timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(
        default = "HttpConfig::default_validate_ssl",
        rename = "validateSSL",
        alias = "validateSsl",
        alias = "validate_ssl"
    )]
    pub validate_ssl: bool,
}

impl HttpConfig {
    fn default_status() -> u16 {
        200
    }

    fn default_validate_ssl() -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpConfig {
    pub port: u16,
    #[serde(default = "default_timeout", alias = "timeout", alias = "timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Validated probe configuration, one variant per protocol
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeConfig {
    Icmp(IcmpConfig),
    Snmp(SnmpConfig),
    Http(HttpConfig),
    Tcp(TcpConfig),
    /// Scheduled anyway; every tick records `unknown`
    Unsupported { kind: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed {kind} config: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {kind} config: {source}")]
    Invalid {
        kind: &'static str,
        #[source]
        source: ValidationError,
    },

    #[error("invalid interval: {0}")]
    Interval(#[source] ValidationError),
}

impl ProbeConfig {
    /// Parse and validate a stored config for the given protocol kind
    pub fn parse(kind: &str, config: &Value) -> Result<Self, ConfigError> {
        let Some(protocol) = ProtocolKind::from_name(kind) else {
            return Ok(ProbeConfig::Unsupported {
                kind: kind.to_string(),
            });
        };

        let value = match config {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        let name = protocol.as_str();
        let malformed = |source| ConfigError::Malformed { kind: name, source };
        let invalid = |source| ConfigError::Invalid { kind: name, source };

        let parsed = match protocol {
            ProtocolKind::Icmp => {
                let cfg: IcmpConfig = serde_json::from_value(value).map_err(malformed)?;
                validate_timeout(cfg.timeout_seconds).map_err(invalid)?;
                validate_packet_size(cfg.packet_size).map_err(invalid)?;
                validate_ping_count(cfg.count).map_err(invalid)?;
                validate_port(cfg.fallback_port).map_err(invalid)?;
                ProbeConfig::Icmp(cfg)
            }
            ProtocolKind::Snmp => {
                let cfg: SnmpConfig = serde_json::from_value(value).map_err(malformed)?;
                if cfg.version == SnmpVersion::V3 {
                    return Err(invalid(ValidationError::UnsupportedSnmpVersion));
                }
                validate_port(cfg.port).map_err(invalid)?;
                validate_oids(&cfg.oids).map_err(invalid)?;
                validate_timeout(cfg.timeout_seconds).map_err(invalid)?;
                ProbeConfig::Snmp(cfg)
            }
            ProtocolKind::Http => {
                let cfg: HttpConfig = serde_json::from_value(value).map_err(malformed)?;
                validate_http_url(&cfg.url).map_err(invalid)?;
                if let Some(headers) = &cfg.headers {
                    validate_headers(headers).map_err(invalid)?;
                }
                validate_expected_status(cfg.expected_status).map_err(invalid)?;
                validate_timeout(cfg.timeout_seconds).map_err(invalid)?;
                ProbeConfig::Http(cfg)
            }
            ProtocolKind::Tcp => {
                let cfg: TcpConfig = serde_json::from_value(value).map_err(malformed)?;
                validate_port(cfg.port).map_err(invalid)?;
                validate_timeout(cfg.timeout_seconds).map_err(invalid)?;
                ProbeConfig::Tcp(cfg)
            }
        };

        Ok(parsed)
    }

    pub fn kind(&self) -> Option<ProtocolKind> {
        match self {
            ProbeConfig::Icmp(_) => Some(ProtocolKind::Icmp),
            ProbeConfig::Snmp(_) => Some(ProtocolKind::Snmp),
            ProbeConfig::Http(_) => Some(ProtocolKind::Http),
            ProbeConfig::Tcp(_) => Some(ProtocolKind::Tcp),
            ProbeConfig::Unsupported { .. } => None,
        }
    }

    pub fn kind_name(&self) -> &str {
        match self {
            ProbeConfig::Unsupported { kind } => kind.as_str(),
            other => other.kind().map(ProtocolKind::as_str).unwrap_or_default(),
        }
    }

    /// Per-attempt timeout
    pub fn timeout(&self) -> Duration {
        let seconds = match self {
            ProbeConfig::Icmp(cfg) => cfg.timeout_seconds,
            ProbeConfig::Snmp(cfg) => cfg.timeout_seconds,
            ProbeConfig::Http(cfg) => cfg.timeout_seconds,
            ProbeConfig::Tcp(cfg) => cfg.timeout_seconds,
            ProbeConfig::Unsupported { .. } => DEFAULT_TIMEOUT,
        };
        Duration::from_secs(seconds)
    }
}

/// Runtime form of a monitor, produced once per schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledMonitor {
    pub id: i64,
    pub device_id: i64,
    pub interval: Duration,
    pub config: ProbeConfig,
}

impl ScheduledMonitor {
    pub fn from_record(record: &MonitorRecord) -> Result<Self, ConfigError> {
        validate_check_interval(record.interval_seconds).map_err(ConfigError::Interval)?;
        Ok(Self {
            id: record.id,
            device_id: record.device_id,
            interval: Duration::from_secs(record.interval_seconds),
            config: ProbeConfig::parse(&record.kind, &record.config)?,
        })
    }
}
