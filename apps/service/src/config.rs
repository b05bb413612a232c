use std::time::Duration;
use std::{env, fmt, fs, io, path};

use logger::{LevelFilter, LogFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::memory::DEFAULT_RESULTS_PER_MONITOR;
use crate::monitoring::Thresholds;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config {path}: {source}")]
    ReadFailed {
        path: path::PathBuf,
        source: io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    WriteFailed {
        path: path::PathBuf,
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("no config path available: set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: Engine,
    pub thresholds: Thresholds,
    pub database: DatabaseConfig,
    pub logging: Logging,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    /// Results kept per monitor
    pub max_results_per_monitor: usize,
    /// Buffered events per broadcast subscriber
    pub event_channel_capacity: usize,
    /// How long shutdown waits for running checks before aborting them
    pub shutdown_grace_seconds: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            max_results_per_monitor: DEFAULT_RESULTS_PER_MONITOR,
            event_channel_capacity: 256,
            shutdown_grace_seconds: 10,
        }
    }
}

impl Engine {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Libsql,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => f.write_str("memory"),
            Backend::Libsql => f.write_str("libsql"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: Backend,
    /// Database file, used by the libsql backend
    pub path: path::PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            path: path::PathBuf::from("netpulse.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// Default filter level; `RUST_LOG` overrides it
    pub level: String,
    /// `compact` or `json`; `RUST_LOG_FORMAT` overrides it
    pub format: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "compact".into(),
        }
    }
}

impl Logging {
    pub fn level_filter(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::INFO)
    }

    pub fn log_format(&self) -> LogFormat {
        self.format.parse().unwrap_or_default()
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/netpulse/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("netpulse/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let t = &self.thresholds;

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Engine")?;
        write_1(f, "Results Per Monitor", &self.engine.max_results_per_monitor)?;
        write_1(f, "Event Channel Capacity", &self.engine.event_channel_capacity)?;
        write_1(f, "Shutdown Grace (s)", &self.engine.shutdown_grace_seconds)?;
        write_title_1(f, "Thresholds")?;
        write_1(f, "ICMP Latency (ms)", &t.icmp_latency_ms)?;
        write_1(f, "HTTP Latency (ms)", &t.http_latency_ms)?;
        write_1(f, "TCP Latency (ms)", &t.tcp_latency_ms)?;
        write_1(f, "SNMP CPU (%)", &t.snmp_cpu_percent)?;
        write_1(f, "SNMP Memory (%)", &t.snmp_memory_percent)?;
        write_1(f, "SNMP Disk (%)", &t.snmp_disk_percent)?;
        write_title_1(f, "Database")?;
        write_1(f, "Backend", &self.database.backend)?;
        write_1(f, "Path", &self.database.path.display())?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/netpulse/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed {
                    path: config_path.clone(),
                    source,
                })?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;
        let write_failed = |source| Error::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        fs::write(path, config_str).map_err(write_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/netpulse");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("nested/netpulse.toml").exists());

        let reread = Config::from_config(Some(dir.path().join("nested/netpulse.toml"))).unwrap();
        assert_eq!(reread, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[thresholds]\ntcp_latency_ms = 250\n\n[engine]\nshutdown_grace_seconds = 3\n\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.thresholds.tcp_latency_ms, 250);
        assert_eq!(config.thresholds.http_latency_ms, 1000);
        assert_eq!(config.engine.max_results_per_monitor, 100);
        assert_eq!(config.engine.shutdown_grace(), Duration::from_secs(3));
        assert_eq!(config.logging.log_format(), LogFormat::Json);
        assert_eq!(config.logging.level_filter(), LevelFilter::INFO);
    }

    #[test]
    fn test_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[engine\n").unwrap();
        assert!(matches!(Config::from_config(Some(&path)), Err(Error::ParseFailed(_))));
    }

    #[test]
    fn test_display_lists_sections() {
        let text = Config::default().to_string();
        assert!(text.contains("Thresholds"));
        assert!(text.contains("Backend: memory"));
    }
}
