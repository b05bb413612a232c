//! ICMP reachability via the system `ping` utility.
//!
//! Raw ICMP sockets need elevated privileges, so the probe shells out to
//! `ping` and parses its summary. Hosts where `ping` is missing or not
//! permitted fall back to a TCP connect.

use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::tcp::timed_connect;
use super::{Probe, mismatched};
use crate::monitoring::config::{IcmpConfig, ProbeConfig};
use crate::monitoring::types::{ProbeErrorKind, ProbeOutcome, ProtocolKind};

/// ICMP ping checker
pub struct IcmpProbe {
    program: String,
}

impl Default for IcmpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl IcmpProbe {
    pub fn new() -> Self {
        Self::with_program("ping")
    }

    /// Use another executable in place of `ping`
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, host: &str, cfg: &IcmpConfig) -> Command {
        let mut command = Command::new(&self.program);
        if cfg!(windows) {
            command
                .arg("-n")
                .arg(cfg.count.to_string())
                .arg("-w")
                .arg((cfg.timeout_seconds * 1000).to_string())
                .arg("-l")
                .arg(cfg.packet_size.to_string());
        } else {
            command
                .arg("-n")
                .arg("-c")
                .arg(cfg.count.to_string())
                .arg("-W")
                .arg(cfg.timeout_seconds.to_string())
                .arg("-s")
                .arg(cfg.packet_size.to_string());
        }
        command.arg(host).kill_on_drop(true);
        command
    }

    async fn ping(&self, host: &str, cfg: &IcmpConfig) -> PingAttempt {
        let deadline = Duration::from_secs(cfg.timeout_seconds * u64::from(cfg.count) + 1);
        let output = match timeout(deadline, self.command(host, cfg).output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return PingAttempt::Unavailable(e.to_string()),
            Err(_) => {
                return PingAttempt::Done(ProbeOutcome::failure(
                    ProbeErrorKind::Timeout,
                    format!("Ping timed out after {}s", deadline.as_secs()),
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lowered = stderr.to_ascii_lowercase();
        if lowered.contains("operation not permitted") || lowered.contains("permission denied") {
            return PingAttempt::Unavailable(stderr.trim().to_string());
        }

        let summary = parse_summary(&stdout);
        if output.status.success() {
            if let Some(avg) = summary.avg_ms {
                let mut outcome = ProbeOutcome::success(avg.round() as u64).with("method", "icmp");
                if let (Some(sent), Some(received)) = (summary.transmitted, summary.received) {
                    outcome = outcome
                        .with("packetsSent", sent)
                        .with("packetsReceived", received);
                }
                return PingAttempt::Done(outcome);
            }
        }

        let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
        let detail_lower = detail.to_ascii_lowercase();
        let kind = if detail_lower.contains("unknown host")
            || detail_lower.contains("name or service not known")
            || detail_lower.contains("could not find host")
            || detail_lower.contains("temporary failure in name resolution")
        {
            ProbeErrorKind::Dns
        } else if detail_lower.contains("unreachable") {
            ProbeErrorKind::Unreachable
        } else {
            ProbeErrorKind::Timeout
        };

        let message = format!("Ping to {host} failed: {}", last_line(detail));
        let mut outcome = ProbeOutcome::failure(kind, message).with("method", "icmp");
        if let (Some(sent), Some(received)) = (summary.transmitted, summary.received) {
            outcome = outcome
                .with("packetsSent", sent)
                .with("packetsReceived", received);
        }
        PingAttempt::Done(outcome)
    }

    async fn fallback(&self, host: &str, cfg: &IcmpConfig, reason: &str) -> ProbeOutcome {
        debug!("ICMP unavailable ({}), falling back to TCP port {}", reason, cfg.fallback_port);
        let limit = Duration::from_secs(cfg.timeout_seconds);
        let outcome = match timed_connect(host, cfg.fallback_port, limit).await {
            Ok(latency) => ProbeOutcome::success(latency),
            Err(failure) => failure.into(),
        };
        outcome
            .with("method", "tcp-fallback")
            .with("port", cfg.fallback_port)
    }
}

enum PingAttempt {
    Done(ProbeOutcome),
    Unavailable(String),
}

#[async_trait::async_trait]
impl Probe for IcmpProbe {
    async fn probe(&self, host: &str, config: &ProbeConfig) -> ProbeOutcome {
        let ProbeConfig::Icmp(cfg) = config else {
            return mismatched(ProtocolKind::Icmp, config);
        };
        // ping would read a leading dash as an option
        if host.is_empty() || host.starts_with('-') {
            return ProbeOutcome::failure(
                ProbeErrorKind::Config,
                format!("Invalid ping target {host:?}"),
            )
            .with("method", "icmp");
        }

        match self.ping(host, cfg).await {
            PingAttempt::Done(outcome) => outcome,
            PingAttempt::Unavailable(reason) => self.fallback(host, cfg, &reason).await,
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct PingSummary {
    transmitted: Option<u64>,
    received: Option<u64>,
    avg_ms: Option<f64>,
}

fn parse_summary(stdout: &str) -> PingSummary {
    let mut summary = PingSummary::default();

    for line in stdout.lines() {
        let line = line.trim();

        // "3 packets transmitted, 3 received, 0% packet loss"
        if line.contains("transmitted") {
            for part in line.split(',') {
                let part = part.trim();
                let number = part.split_whitespace().next().and_then(|n| n.parse().ok());
                if part.contains("transmitted") {
                    summary.transmitted = number;
                } else if part.contains("received") {
                    summary.received = number;
                }
            }
        }

        // "rtt min/avg/max/mdev = 0.045/0.051/0.060/0.006 ms"
        if line.contains("min/avg/max") {
            if let Some((_, values)) = line.split_once('=') {
                summary.avg_ms = values
                    .trim()
                    .split('/')
                    .nth(1)
                    .and_then(|v| v.trim().parse().ok());
            }
        }

        // Windows: "Minimum = 1ms, Maximum = 2ms, Average = 1ms"
        if let Some((_, rest)) = line.split_once("Average = ") {
            summary.avg_ms = rest.trim_end_matches("ms").trim().parse().ok();
        }
    }

    summary
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(str::trim)
        .unwrap_or("no reply")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_linux_summary() {
        let output = "PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.\n\
            64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=0.045 ms\n\
            \n\
            --- 10.0.0.1 ping statistics ---\n\
            3 packets transmitted, 2 received, 33.3333% packet loss, time 2003ms\n\
            rtt min/avg/max/mdev = 0.045/12.551/25.060/0.006 ms\n";

        assert_eq!(
            parse_summary(output),
            PingSummary {
                transmitted: Some(3),
                received: Some(2),
                avg_ms: Some(12.551),
            }
        );
    }

    #[test]
    fn test_parse_windows_summary() {
        let output = "Packets: Sent = 3, Received = 3, Lost = 0 (0% loss),\n\
            Minimum = 1ms, Maximum = 4ms, Average = 2ms\n";
        assert_eq!(parse_summary(output).avg_ms, Some(2.0));
    }

    #[tokio::test]
    async fn test_missing_binary_falls_back_to_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = IcmpProbe::with_program("/nonexistent/ping");
        let config = ProbeConfig::Icmp(IcmpConfig {
            fallback_port: port,
            ..IcmpConfig::default()
        });

        let outcome = probe.probe("127.0.0.1", &config).await;
        assert!(outcome.success, "{:?}", outcome.payload);
        assert_eq!(outcome.payload["method"], "tcp-fallback");
        assert_eq!(outcome.payload["port"], port);
    }

    #[tokio::test]
    async fn test_option_like_target_is_config_failure() {
        let probe = IcmpProbe::with_program("true");
        let config = ProbeConfig::Icmp(IcmpConfig::default());

        for host in ["-f", "--help", ""] {
            let outcome = probe.probe(host, &config).await;
            assert!(!outcome.success, "{host:?} should be rejected");
            assert_eq!(outcome.error_kind(), Some(ProbeErrorKind::Config));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_ping_reports_failure() {
        // `false` exits 1 without output, like a ping with zero replies
        let probe = IcmpProbe::with_program("false");
        let config = ProbeConfig::Icmp(IcmpConfig {
            count: 1,
            timeout_seconds: 1,
            ..IcmpConfig::default()
        });

        let outcome = probe.probe("127.0.0.1", &config).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some(ProbeErrorKind::Timeout));
        assert_eq!(outcome.payload["method"], "icmp");
    }
}
