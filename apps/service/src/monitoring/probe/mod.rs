//! Protocol probes.
//!
//! A probe performs one network check and folds every failure into a
//! [`ProbeOutcome`]; nothing here returns an error to the caller.

pub mod http;
pub mod icmp;
pub mod snmp;
pub mod tcp;
#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use super::config::ProbeConfig;
use super::types::{ProbeErrorKind, ProbeOutcome, ProtocolKind};

pub use http::HttpProbe;
pub use icmp::IcmpProbe;
pub use snmp::SnmpProbe;
pub use tcp::TcpProbe;

/// A protocol-specific health check
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// Check `host` with the given config
    async fn probe(&self, host: &str, config: &ProbeConfig) -> ProbeOutcome;
}

/// Outcome for a probe handed a config of another protocol
pub(crate) fn mismatched(expected: ProtocolKind, config: &ProbeConfig) -> ProbeOutcome {
    ProbeOutcome::failure(
        ProbeErrorKind::Config,
        format!("{} probe cannot run a {} config", expected.label(), config.kind_name()),
    )
}

/// One probe per protocol kind
#[derive(Clone)]
pub struct ProbeSet {
    icmp: Arc<dyn Probe>,
    snmp: Arc<dyn Probe>,
    http: Arc<dyn Probe>,
    tcp: Arc<dyn Probe>,
}

impl ProbeSet {
    /// Real network probes
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            icmp: Arc::new(IcmpProbe::new()),
            snmp: Arc::new(SnmpProbe::new()),
            http: Arc::new(HttpProbe::new()?),
            tcp: Arc::new(TcpProbe),
        })
    }

    pub fn with_probes(
        icmp: Arc<dyn Probe>,
        snmp: Arc<dyn Probe>,
        http: Arc<dyn Probe>,
        tcp: Arc<dyn Probe>,
    ) -> Self {
        Self {
            icmp,
            snmp,
            http,
            tcp,
        }
    }

    pub fn for_kind(&self, kind: ProtocolKind) -> &Arc<dyn Probe> {
        match kind {
            ProtocolKind::Icmp => &self.icmp,
            ProtocolKind::Snmp => &self.snmp,
            ProtocolKind::Http => &self.http,
            ProtocolKind::Tcp => &self.tcp,
        }
    }
}

/// Milliseconds elapsed since `start`
pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
