use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;

use super::{Probe, elapsed_ms, mismatched};
use crate::monitoring::config::ProbeConfig;
use crate::monitoring::types::{ProbeErrorKind, ProbeFailure, ProbeOutcome, ProtocolKind};

/// TCP port checker
pub struct TcpProbe;

/// Resolve `host` to its first address, giving up after `limit`
pub async fn resolve(host: &str, port: u16, limit: Duration) -> Result<SocketAddr, ProbeFailure> {
    first_address(host, limit, lookup_host((host, port))).await
}

async fn first_address<I>(
    host: &str,
    limit: Duration,
    lookup: impl Future<Output = io::Result<I>>,
) -> Result<SocketAddr, ProbeFailure>
where
    I: Iterator<Item = SocketAddr>,
{
    let mut addrs = match timeout(limit, lookup).await {
        Ok(Ok(addrs)) => addrs,
        Ok(Err(e)) => {
            return Err(ProbeFailure::new(
                ProbeErrorKind::Dns,
                format!("Failed to resolve {host}: {e}"),
            ));
        }
        Err(_) => {
            return Err(ProbeFailure::new(
                ProbeErrorKind::Timeout,
                format!("Resolving {host} timed out"),
            ));
        }
    };
    addrs.next().ok_or_else(|| {
        ProbeFailure::new(ProbeErrorKind::Dns, format!("No addresses found for {host}"))
    })
}

/// Resolve `host` and open a connection to `port`, returning the connect
/// latency in milliseconds. Resolution is not counted.
pub async fn timed_connect(host: &str, port: u16, limit: Duration) -> Result<u64, ProbeFailure> {
    let addr = resolve(host, port, limit).await?;

    let start = Instant::now();
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(elapsed_ms(start)),
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => Err(ProbeFailure::new(
            ProbeErrorKind::Refused,
            format!("Connection refused by {addr}"),
        )),
        Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => {
            Err(ProbeFailure::new(ProbeErrorKind::Timeout, format!("TCP connection timeout: {e}")))
        }
        Ok(Err(e)) => Err(ProbeFailure::new(
            ProbeErrorKind::Unreachable,
            format!("TCP connection failed: {e}"),
        )),
        Err(_) => Err(ProbeFailure::new(
            ProbeErrorKind::Timeout,
            format!("TCP connection timeout after {}s", limit.as_secs()),
        )),
    }
}

#[async_trait::async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, host: &str, config: &ProbeConfig) -> ProbeOutcome {
        let ProbeConfig::Tcp(cfg) = config else {
            return mismatched(ProtocolKind::Tcp, config);
        };

        let outcome = match timed_connect(host, cfg.port, config.timeout()).await {
            Ok(latency) => ProbeOutcome::success(latency),
            Err(failure) => failure.into(),
        };
        outcome.with("port", cfg.port)
    }
}
