//! Configuration management for PatchScan

use patchscan_core::{Error, IgnoreScope, Result, ScanMode, ScopeLookup};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scanner settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Result filter settings
    #[serde(default)]
    pub filter: FilterConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Targets, keyed by server name
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml(&content)?;
        debug!(
            "Loaded configuration from {} ({} servers)",
            path.display(),
            config.servers.len()
        );
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Reject values the scanner cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.scan.max_concurrent_targets == 0 {
            return Err(Error::InvalidConfig {
                key: String::from("scan.max_concurrent_targets"),
                message: String::from("must be at least 1"),
            });
        }
        if let Some(over) = self.filter.cvss_over {
            if !(0.0..=10.0).contains(&over) {
                return Err(Error::InvalidConfig {
                    key: String::from("filter.cvss_over"),
                    message: format!("{} is outside 0.0..=10.0", over),
                });
            }
        }
        Ok(())
    }

    /// Merge with environment variables (PATCHSCAN_ prefix)
    pub fn merge_env(mut self) -> Self {
        if let Ok(val) = std::env::var("PATCHSCAN_MAX_CONCURRENT_TARGETS") {
            if let Ok(n) = val.parse() {
                self.scan.max_concurrent_targets = n;
            }
        }
        if let Ok(val) = std::env::var("PATCHSCAN_COMMAND_TIMEOUT") {
            if let Ok(n) = val.parse() {
                self.scan.command_timeout_seconds = n;
            }
        }
        if let Ok(val) = std::env::var("PATCHSCAN_CVSS_OVER") {
            if let Ok(n) = val.parse() {
                self.filter.cvss_over = Some(n);
            }
        }
        if let Ok(val) = std::env::var("PATCHSCAN_IGNORE_UNFIXED") {
            self.filter.ignore_unfixed = matches!(val.as_str(), "1" | "true" | "yes");
        }

        // Logging
        if let Ok(val) = std::env::var("PATCHSCAN_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PATCHSCAN_LOG_FORMAT") {
            self.logging.format = val;
        }

        self
    }

    /// Scan mode of a server, falling back to `scan.default_mode`
    pub fn mode_for(&self, server_name: &str) -> ScanMode {
        self.servers
            .get(server_name)
            .and_then(|s| s.mode)
            .unwrap_or(self.scan.default_mode)
    }
}

impl ScopeLookup for Config {
    fn resolve(&self, server_name: &str, container_name: Option<&str>) -> Option<IgnoreScope> {
        let server = self.servers.get(server_name)?;
        match container_name {
            None => Some(IgnoreScope {
                ignore_cves: server.ignore_cves.clone(),
                ignore_pkgs_regexp: server.ignore_pkgs_regexp.clone(),
            }),
            Some(name) => server.containers.get(name).map(|c| IgnoreScope {
                ignore_cves: c.ignore_cves.clone(),
                ignore_pkgs_regexp: c.ignore_pkgs_regexp.clone(),
            }),
        }
    }
}

/// Scanner-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Maximum number of targets scanned at once
    #[serde(default = "default_max_targets")]
    pub max_concurrent_targets: usize,

    /// Timeout for a single remote command in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    /// Mode used for servers that do not set one
    #[serde(default)]
    pub default_mode: ScanMode,
}

fn default_max_targets() -> usize {
    10
}

fn default_command_timeout() -> u64 {
    300
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_targets: default_max_targets(),
            command_timeout_seconds: default_command_timeout(),
            default_mode: ScanMode::Fast,
        }
    }
}

/// Result filter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum effective CVSS score to report
    pub cvss_over: Option<f64>,

    /// Drop findings no vendor has fixed yet
    #[serde(default)]
    pub ignore_unfixed: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Emit span open/close events
    #[serde(default)]
    pub spans: bool,
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("pretty")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            spans: false,
        }
    }
}

/// One `[servers.<name>]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub user: Option<String>,

    /// OS family, detected on the target when empty
    #[serde(default)]
    pub family: Option<String>,

    pub mode: Option<ScanMode>,

    #[serde(default)]
    pub ignore_cves: Vec<String>,

    #[serde(default)]
    pub ignore_pkgs_regexp: Vec<String>,

    /// Containers on this server, keyed by container name
    #[serde(default)]
    pub containers: HashMap<String, ContainerConfig>,
}

/// One `[servers.<name>.containers.<cname>]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default)]
    pub ignore_cves: Vec<String>,

    #[serde(default)]
    pub ignore_pkgs_regexp: Vec<String>,
}

/// Builder for constructing Config
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn server(mut self, name: impl Into<String>, server: ServerConfig) -> Self {
        self.config.servers.insert(name.into(), server);
        self
    }

    pub fn max_concurrent_targets(mut self, n: usize) -> Self {
        self.config.scan.max_concurrent_targets = n;
        self
    }

    pub fn cvss_over(mut self, score: f64) -> Self {
        self.config.filter.cvss_over = Some(score);
        self
    }

    pub fn ignore_unfixed(mut self, ignore: bool) -> Self {
        self.config.filter.ignore_unfixed = ignore;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
