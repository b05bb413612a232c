use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Health status of a monitoring check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Online,
    Warning,
    Down,
    #[default]
    Unknown,
}

impl MonitorStatus {
    /// Parse a stored status, mapping anything unrecognised to `Unknown`
    pub fn parse(value: &str) -> Self {
        match value {
            "online" => MonitorStatus::Online,
            "warning" => MonitorStatus::Warning,
            "down" => MonitorStatus::Down,
            _ => MonitorStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MonitorStatus::Online => "online",
            MonitorStatus::Warning => "warning",
            MonitorStatus::Down => "down",
            MonitorStatus::Unknown => "unknown",
        }
    }

    /// `true` for the states that may raise an alert
    pub fn is_degraded(self) -> bool {
        matches!(self, MonitorStatus::Warning | MonitorStatus::Down)
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol used by a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Icmp,
    Snmp,
    Http,
    Tcp,
}

impl ProtocolKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "icmp" => Some(ProtocolKind::Icmp),
            "snmp" => Some(ProtocolKind::Snmp),
            "http" | "https" => Some(ProtocolKind::Http),
            "tcp" => Some(ProtocolKind::Tcp),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolKind::Icmp => "icmp",
            ProtocolKind::Snmp => "snmp",
            ProtocolKind::Http => "http",
            ProtocolKind::Tcp => "tcp",
        }
    }

    /// Upper-case label used in log lines and alert messages
    pub fn label(self) -> &'static str {
        match self {
            ProtocolKind::Icmp => "ICMP",
            ProtocolKind::Snmp => "SNMP",
            ProtocolKind::Http => "HTTP",
            ProtocolKind::Tcp => "TCP",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure class reported by a probe in `payload.errorKind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeErrorKind {
    Timeout,
    Refused,
    Unreachable,
    Dns,
    Tls,
    Http,
    Protocol,
    Config,
}

impl ProbeErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeErrorKind::Timeout => "timeout",
            ProbeErrorKind::Refused => "refused",
            ProbeErrorKind::Unreachable => "unreachable",
            ProbeErrorKind::Dns => "dns",
            ProbeErrorKind::Tls => "tls",
            ProbeErrorKind::Http => "http",
            ProbeErrorKind::Protocol => "protocol",
            ProbeErrorKind::Config => "config",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "timeout" => ProbeErrorKind::Timeout,
            "refused" => ProbeErrorKind::Refused,
            "unreachable" => ProbeErrorKind::Unreachable,
            "dns" => ProbeErrorKind::Dns,
            "tls" => ProbeErrorKind::Tls,
            "http" => ProbeErrorKind::Http,
            "protocol" => ProbeErrorKind::Protocol,
            "config" => ProbeErrorKind::Config,
            _ => return None,
        })
    }
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed network operation inside a probe, before it is folded into an
/// outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub kind: ProbeErrorKind,
    pub message: String,
}

impl ProbeFailure {
    pub fn new(kind: ProbeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ProbeFailure> for ProbeOutcome {
    fn from(failure: ProbeFailure) -> Self {
        ProbeOutcome::failure(failure.kind, failure.message)
    }
}

/// Normalized result of a single probe execution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub success: bool,
    pub latency_ms: Option<u64>,
    pub payload: Map<String, Value>,
}

impl ProbeOutcome {
    /// Successful probe with the measured latency
    pub fn success(latency_ms: u64) -> Self {
        Self {
            success: true,
            latency_ms: Some(latency_ms),
            payload: Map::new(),
        }
    }

    /// Failed probe; `error` and `errorKind` are always present in the payload
    pub fn failure(kind: ProbeErrorKind, message: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("error".into(), Value::String(message.into()));
        payload.insert("errorKind".into(), Value::String(kind.as_str().into()));
        Self {
            success: false,
            latency_ms: None,
            payload,
        }
    }

    /// Attach a payload entry
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn error(&self) -> Option<&str> {
        self.payload.get("error").and_then(Value::as_str)
    }

    pub fn error_kind(&self) -> Option<ProbeErrorKind> {
        self.payload
            .get("errorKind")
            .and_then(Value::as_str)
            .and_then(ProbeErrorKind::parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_round_trip() {
        for status in [
            MonitorStatus::Online,
            MonitorStatus::Warning,
            MonitorStatus::Down,
            MonitorStatus::Unknown,
        ] {
            assert_eq!(MonitorStatus::parse(status.as_str()), status);
        }
        assert_eq!(MonitorStatus::parse("degraded"), MonitorStatus::Unknown);
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(ProtocolKind::from_name("ICMP"), Some(ProtocolKind::Icmp));
        assert_eq!(ProtocolKind::from_name("https"), Some(ProtocolKind::Http));
        assert_eq!(ProtocolKind::from_name("modbus"), None);
    }

    #[test]
    fn test_failure_payload() {
        let outcome = ProbeOutcome::failure(ProbeErrorKind::Refused, "ECONNREFUSED");
        assert!(!outcome.success);
        assert_eq!(outcome.error(), Some("ECONNREFUSED"));
        assert_eq!(outcome.error_kind(), Some(ProbeErrorKind::Refused));
    }
}
