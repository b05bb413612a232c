use anyhow::Result;
use reqwest::redirect::{Attempt, Policy};
use std::error::Error as StdError;
use std::io;
use std::time::Instant;

use super::{Probe, elapsed_ms, mismatched};
use crate::monitoring::config::{HttpConfig, ProbeConfig};
use crate::monitoring::types::{ProbeErrorKind, ProbeOutcome, ProtocolKind};

const MAX_REDIRECTS: usize = 10;
/// Bodies without a Content-Length are counted up to this many bytes
const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// HTTP/HTTPS checker.
///
/// Two clients are kept so certificate validation can be switched off per
/// monitor without rebuilding a client on every tick.
pub struct HttpProbe {
    verifying: reqwest::Client,
    insecure: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        Ok(Self {
            verifying: build_client(false)?,
            insecure: build_client(true)?,
        })
    }

    fn client(&self, validate_ssl: bool) -> &reqwest::Client {
        if validate_ssl { &self.verifying } else { &self.insecure }
    }

    async fn request(&self, cfg: &HttpConfig, config: &ProbeConfig) -> ProbeOutcome {
        let mut request = self
            .client(cfg.validate_ssl)
            .request(cfg.method.as_reqwest(), &cfg.url)
            .timeout(config.timeout());
        if let Some(headers) = &cfg.headers {
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        if let Some(body) = &cfg.body {
            request = request.body(body.clone());
        }

        let start = Instant::now();
        let mut response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let kind = classify_error(&e);
                return ProbeOutcome::failure(kind, format!("HTTP request failed: {e}"))
                    .with("url", cfg.url.as_str());
            }
        };

        let status = response.status().as_u16();
        let content_length = match response.content_length() {
            Some(length) => length,
            None => match count_body(&mut response).await {
                Ok(length) => length,
                Err(e) => {
                    let kind = classify_error(&e);
                    return ProbeOutcome::failure(kind, format!("Failed to read response body: {e}"))
                        .with_latency(elapsed_ms(start))
                        .with("statusCode", status)
                        .with("url", cfg.url.as_str());
                }
            },
        };
        let latency = elapsed_ms(start);

        let outcome = if status == cfg.expected_status {
            ProbeOutcome::success(latency)
        } else {
            ProbeOutcome::failure(
                ProbeErrorKind::Http,
                format!("Expected status {}, got {status}", cfg.expected_status),
            )
            .with_latency(latency)
        };

        outcome
            .with("statusCode", status)
            .with("contentLength", content_length)
            .with("url", cfg.url.as_str())
    }
}

/// Count body bytes chunk by chunk, stopping at `MAX_BODY_BYTES`
async fn count_body(response: &mut reqwest::Response) -> reqwest::Result<u64> {
    let mut total = 0u64;
    while let Some(chunk) = response.chunk().await? {
        total += chunk.len() as u64;
        if total >= MAX_BODY_BYTES {
            return Ok(MAX_BODY_BYTES);
        }
    }
    Ok(total)
}

fn build_client(accept_invalid_certs: bool) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .redirect(Policy::custom(follow_redirect))
        .build()?;
    Ok(client)
}

fn follow_redirect(attempt: Attempt<'_>) -> reqwest::redirect::Action {
    if attempt.previous().len() > MAX_REDIRECTS {
        return attempt.error("too many redirects");
    }
    let downgrade = attempt.url().scheme() == "http"
        && attempt.previous().iter().any(|url| url.scheme() == "https");
    if downgrade {
        return attempt.error("refusing redirect from https to http");
    }
    attempt.follow()
}

/// Map a transport error onto a probe failure class by walking its sources
fn classify_error(error: &reqwest::Error) -> ProbeErrorKind {
    if error.is_timeout() {
        return ProbeErrorKind::Timeout;
    }
    if error.is_redirect() {
        return ProbeErrorKind::Http;
    }

    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    let mut text = String::new();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => return ProbeErrorKind::Refused,
                io::ErrorKind::TimedOut => return ProbeErrorKind::Timeout,
                _ => {}
            }
        }
        text.push_str(&err.to_string().to_ascii_lowercase());
        text.push(' ');
        source = err.source();
    }

    if ["certificate", "tls", "ssl", "handshake"].iter().any(|needle| text.contains(needle)) {
        ProbeErrorKind::Tls
    } else if text.contains("dns") || text.contains("resolve") || text.contains("lookup") {
        ProbeErrorKind::Dns
    } else if error.is_connect() {
        ProbeErrorKind::Unreachable
    } else {
        ProbeErrorKind::Http
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, _host: &str, config: &ProbeConfig) -> ProbeOutcome {
        let ProbeConfig::Http(cfg) = config else {
            return mismatched(ProtocolKind::Http, config);
        };
        self.request(cfg, config).await
    }
}
