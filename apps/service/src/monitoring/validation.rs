//! Monitor-type specific validation.
//!
//! Every check here runs when a monitor is loaded into the scheduler, so a bad
//! record is rejected with a clear message instead of failing on every tick.

use reqwest::header::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use super::probe::snmp::oids;

pub const MIN_INTERVAL: u64 = 1;
pub const MAX_INTERVAL: u64 = 86_400; // 24 hours
pub const MIN_TIMEOUT: u64 = 1;
pub const MAX_TIMEOUT: u64 = 300; // 5 minutes
pub const MAX_PACKET_SIZE: u32 = 65_500;
pub const MAX_PING_COUNT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Check interval too short: {0} seconds (minimum: {MIN_INTERVAL})")]
    IntervalTooShort(u64),

    #[error("Check interval too long: {0} seconds (maximum: {MAX_INTERVAL})")]
    IntervalTooLong(u64),

    #[error("Timeout too short: {0} seconds (minimum: {MIN_TIMEOUT})")]
    TimeoutTooShort(u64),

    #[error("Timeout too long: {0} seconds (maximum: {MAX_TIMEOUT})")]
    TimeoutTooLong(u64),

    #[error("Port 0 is not valid")]
    InvalidPort,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid scheme for HTTP monitor: {0}")]
    InvalidScheme(String),

    #[error("Expected status {0} is outside 100..=599")]
    ExpectedStatus(u16),

    #[error("Invalid HTTP header {0:?}")]
    InvalidHeader(String),

    #[error("No OIDs specified")]
    NoOids,

    #[error("Invalid OID: {0}")]
    InvalidOid(String),

    #[error("SNMP version 3 is not supported (v1 and v2c only)")]
    UnsupportedSnmpVersion,

    #[error("Packet size {0} is outside 1..={MAX_PACKET_SIZE} bytes")]
    PacketSize(u32),

    #[error("Ping count {0} is outside 1..={MAX_PING_COUNT}")]
    PingCount(u32),
}

/// Validate HTTP/HTTPS target URL
pub fn validate_http_url(target: &str) -> Result<Url, ValidationError> {
    let url =
        Url::parse(target).map_err(|e| ValidationError::InvalidUrl(format!("{target}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::InvalidScheme(other.to_string())),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ValidationError::InvalidUrl(format!("{target}: missing host")));
    }

    if let Some(port) = url.port() {
        validate_port(port)?;
    }

    Ok(url)
}

/// Validate that every configured header can be sent as-is
pub fn validate_headers<'a>(
    headers: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> Result<(), ValidationError> {
    for (name, value) in headers {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ValidationError::InvalidHeader(name.clone()))?;
        HeaderValue::from_str(value).map_err(|_| ValidationError::InvalidHeader(name.clone()))?;
    }
    Ok(())
}

pub fn validate_expected_status(status: u16) -> Result<(), ValidationError> {
    if (100..=599).contains(&status) {
        Ok(())
    } else {
        Err(ValidationError::ExpectedStatus(status))
    }
}

/// Validate port is in valid range
pub fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::InvalidPort);
    }
    Ok(())
}

/// Validate a list of OIDs, numeric or well-known symbolic names
pub fn validate_oids(list: &[String]) -> Result<(), ValidationError> {
    if list.is_empty() {
        return Err(ValidationError::NoOids);
    }
    for oid in list {
        oids::resolve_oid(oid).map_err(|_| ValidationError::InvalidOid(oid.clone()))?;
    }
    Ok(())
}

/// Validate check interval
pub fn validate_check_interval(interval_seconds: u64) -> Result<(), ValidationError> {
    if interval_seconds < MIN_INTERVAL {
        return Err(ValidationError::IntervalTooShort(interval_seconds));
    }

    if interval_seconds > MAX_INTERVAL {
        return Err(ValidationError::IntervalTooLong(interval_seconds));
    }

    Ok(())
}

/// Validate timeout is reasonable
pub fn validate_timeout(timeout_seconds: u64) -> Result<(), ValidationError> {
    if timeout_seconds < MIN_TIMEOUT {
        return Err(ValidationError::TimeoutTooShort(timeout_seconds));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(ValidationError::TimeoutTooLong(timeout_seconds));
    }

    Ok(())
}

/// Validate ICMP payload size
pub fn validate_packet_size(size: u32) -> Result<(), ValidationError> {
    if size == 0 || size > MAX_PACKET_SIZE {
        return Err(ValidationError::PacketSize(size));
    }
    Ok(())
}

/// Validate echo requests per check
pub fn validate_ping_count(count: u32) -> Result<(), ValidationError> {
    if count == 0 || count > MAX_PING_COUNT {
        return Err(ValidationError::PingCount(count));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("https://example.com").is_ok());
        assert!(validate_http_url("http://192.168.1.100:8080/health").is_ok());

        assert_eq!(
            validate_http_url("ftp://example.com"),
            Err(ValidationError::InvalidScheme("ftp".into()))
        );
        assert!(matches!(validate_http_url("not a url"), Err(ValidationError::InvalidUrl(_))));
        assert_eq!(validate_http_url("http://example.com:0"), Err(ValidationError::InvalidPort));
    }

    #[test]
    fn test_validate_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        assert!(validate_headers(&headers).is_ok());

        headers.insert("bad header".to_string(), "x".to_string());
        assert_eq!(
            validate_headers(&headers),
            Err(ValidationError::InvalidHeader("bad header".into()))
        );
    }

    #[test]
    fn test_validate_check_interval() {
        assert!(validate_check_interval(1).is_ok()); // Min
        assert!(validate_check_interval(60).is_ok()); // Normal
        assert!(validate_check_interval(86400).is_ok()); // Max

        assert_eq!(validate_check_interval(0), Err(ValidationError::IntervalTooShort(0)));
        assert_eq!(
            validate_check_interval(100_000),
            Err(ValidationError::IntervalTooLong(100_000))
        );
    }

    #[test]
    fn test_validate_timeout() {
        assert!(validate_timeout(5).is_ok());
        assert!(validate_timeout(0).is_err());
        assert!(validate_timeout(301).is_err());
    }

    #[test]
    fn test_validate_oids() {
        assert_eq!(validate_oids(&[]), Err(ValidationError::NoOids));
        let oids = ["1.3.6.1.2.1.1.3.0".into(), "hrProcessorLoad.196608".into()];
        assert!(validate_oids(&oids).is_ok());
        assert_eq!(
            validate_oids(&["notAnOid".into()]),
            Err(ValidationError::InvalidOid("notAnOid".into()))
        );
    }

    #[test]
    fn test_expected_status_range() {
        assert!(validate_expected_status(204).is_ok());
        assert!(validate_expected_status(99).is_err());
        assert!(validate_expected_status(600).is_err());
    }

    #[test]
    fn test_validate_packet_size() {
        assert!(validate_packet_size(56).is_ok());
        assert!(validate_packet_size(MAX_PACKET_SIZE).is_ok());

        assert_eq!(validate_packet_size(0), Err(ValidationError::PacketSize(0)));
        assert_eq!(
            validate_packet_size(10_000_000),
            Err(ValidationError::PacketSize(10_000_000))
        );
    }

    #[test]
    fn test_validate_ping_count() {
        assert!(validate_ping_count(3).is_ok());
        assert_eq!(validate_ping_count(0), Err(ValidationError::PingCount(0)));
        assert_eq!(validate_ping_count(101), Err(ValidationError::PingCount(101)));
    }
}
