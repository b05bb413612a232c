//! SNMP v1/v2c GET probe over UDP.

pub mod ber;
pub mod metrics;
pub mod oids;

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use self::ber::{GetRequest, Oid, decode_response, encode_get_request};
use super::tcp::resolve;
use super::{Probe, elapsed_ms, mismatched};
use crate::monitoring::config::{ProbeConfig, SnmpConfig};
use crate::monitoring::types::{ProbeErrorKind, ProbeFailure, ProbeOutcome, ProtocolKind};

const MAX_DATAGRAM: usize = 65_507;

/// SNMP GET checker
pub struct SnmpProbe {
    next_request_id: AtomicI32,
}

impl Default for SnmpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SnmpProbe {
    pub fn new() -> Self {
        Self {
            next_request_id: AtomicI32::new(1),
        }
    }

    fn request_id(&self) -> i32 {
        // Keep ids positive so they encode in at most four bytes
        self.next_request_id.fetch_add(1, Ordering::Relaxed) & i32::MAX
    }

    async fn get(
        &self,
        host: &str,
        cfg: &SnmpConfig,
        limit: Duration,
    ) -> Result<ProbeOutcome, ProbeFailure> {
        let mut targets = Vec::with_capacity(cfg.oids.len());
        for configured in &cfg.oids {
            let numeric = oids::resolve_oid(configured)
                .map_err(|e| ProbeFailure::new(ProbeErrorKind::Config, e.to_string()))?;
            let oid: Oid = numeric.parse().map_err(|e: ber::BerError| {
                ProbeFailure::new(ProbeErrorKind::Config, e.to_string())
            })?;
            targets.push((configured.as_str(), oid));
        }

        let target = resolve(host, cfg.port, limit).await?;

        let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind).await.map_err(unreachable)?;
        socket.connect(target).await.map_err(unreachable)?;

        let request_id = self.request_id();
        let request_oids: Vec<Oid> = targets.iter().map(|(_, oid)| oid.clone()).collect();
        let packet = encode_get_request(&GetRequest {
            version: cfg.version.wire_value(),
            community: &cfg.community,
            request_id,
            oids: &request_oids,
        });

        let start = Instant::now();
        socket.send(&packet).await.map_err(unreachable)?;

        let exchange = async {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let len = match socket.recv(&mut buf).await {
                    Ok(len) => len,
                    Err(e) => return Err(unreachable(e)),
                };
                match decode_response(&buf[..len]) {
                    Ok(response) if response.request_id == request_id => return Ok(response),
                    // Stale or foreign datagram: keep waiting
                    Ok(_) | Err(_) => continue,
                }
            }
        };
        let response = match timeout(limit, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProbeFailure::new(
                    ProbeErrorKind::Timeout,
                    format!("SNMP request to {target} timed out"),
                ));
            }
        };
        let latency = elapsed_ms(start);

        if response.error_status != 0 {
            return Err(ProbeFailure::new(
                ProbeErrorKind::Protocol,
                format!(
                    "SNMP error status {} at index {}",
                    response.error_status, response.error_index
                ),
            ));
        }

        let mut values = Map::new();
        for (configured, oid) in &targets {
            let value = response
                .varbinds
                .iter()
                .find(|(returned, _)| returned == oid)
                .map(|(_, v)| v);
            match value {
                Some(value) if !value.is_exception() => {
                    values.insert((*configured).to_string(), value.to_json());
                }
                _ => {
                    return Err(ProbeFailure::new(
                        ProbeErrorKind::Protocol,
                        format!("No value returned for OID {configured}"),
                    ));
                }
            }
        }

        Ok(ProbeOutcome::success(latency).with("values", Value::Object(values)))
    }
}

fn unreachable(e: std::io::Error) -> ProbeFailure {
    let kind = match e.kind() {
        std::io::ErrorKind::ConnectionRefused => ProbeErrorKind::Refused,
        _ => ProbeErrorKind::Unreachable,
    };
    ProbeFailure::new(kind, format!("SNMP transport error: {e}"))
}

#[async_trait::async_trait]
impl Probe for SnmpProbe {
    async fn probe(&self, host: &str, config: &ProbeConfig) -> ProbeOutcome {
        let ProbeConfig::Snmp(cfg) = config else {
            return mismatched(ProtocolKind::Snmp, config);
        };

        match self.get(host, cfg, config.timeout()).await {
            Ok(outcome) => outcome,
            Err(failure) => failure.into(),
        }
    }
}
