//! Configuration model for the daemon and its managed services.
//!
//! Service definitions live as one YAML file per service under
//! `<home>/services/`; the daemon-level settings live in `<home>/config.yaml`.
//! Duration fields accept human units ("5s", "2m").

pub mod duration;
mod store;

pub use store::ConfigStore;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{DaemonError, Result};

/// Default control-plane bind address. Loopback only.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:9876";

/// Daemon-level configuration, persisted as `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub listen: String,
    pub log_dir: PathBuf,
    pub pid_file: PathBuf,
    pub max_log_size: String,
    /// Days to keep rotated logs around.
    pub log_retention: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            log_dir: PathBuf::new(),
            pid_file: PathBuf::new(),
            max_log_size: "50MB".to_string(),
            log_retention: 7,
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Defaults with all paths anchored under the given home directory.
    pub fn with_home(home: &Path) -> Self {
        let mut cfg = Self::default();
        cfg.fill_defaults(home);
        cfg
    }

    /// Fill in any path left empty by the config file.
    pub fn fill_defaults(&mut self, home: &Path) {
        if self.daemon.listen.is_empty() {
            self.daemon.listen = DEFAULT_LISTEN.to_string();
        }
        if self.daemon.log_dir.as_os_str().is_empty() {
            self.daemon.log_dir = home.join("logs");
        }
        if self.daemon.pid_file.as_os_str().is_empty() {
            self.daemon.pid_file = home.join("goserd.pid");
        }
    }
}

/// Health check definition. Accepted and persisted for external tooling;
/// the daemon itself does not execute health checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// "http", "tcp" or "command".
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "duration::serde_opt_duration"
    )]
    pub interval: Option<Duration>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "duration::serde_opt_duration"
    )]
    pub timeout: Option<Duration>,
}

/// Static definition of one managed service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub auto_restart: bool,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_restart_delay", with = "duration::serde_duration")]
    pub restart_delay: Duration,
    #[serde(default = "default_stop_signal")]
    pub stop_signal: String,
    #[serde(default = "default_stop_timeout", with = "duration::serde_duration")]
    pub stop_timeout: Duration,
    /// Log file path, or "auto" to place `<name>.log` in the daemon log dir.
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckConfig>,
}

fn default_max_restarts() -> u32 {
    5
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_stop_signal() -> String {
    "SIGTERM".to_string()
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_log_file() -> String {
    "auto".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: String::new(),
            args: Vec::new(),
            working_dir: String::new(),
            env: HashMap::new(),
            auto_start: false,
            auto_restart: false,
            max_restarts: default_max_restarts(),
            restart_delay: default_restart_delay(),
            stop_signal: default_stop_signal(),
            stop_timeout: default_stop_timeout(),
            log_file: default_log_file(),
            depends_on: Vec::new(),
            health_check: None,
        }
    }
}

impl ServiceConfig {
    /// Check required fields. Defaults are applied by serde on load, so
    /// validation only rejects, never mutates.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DaemonError::Validation("service name is required".into()));
        }
        if self.name.contains(['/', '\\']) || self.name.starts_with('.') {
            return Err(DaemonError::Validation(format!(
                "service name {:?} must not contain path separators or start with '.'",
                self.name
            )));
        }
        if self.command.trim().is_empty() {
            return Err(DaemonError::Validation(format!(
                "service {:?}: command is required",
                self.name
            )));
        }
        Ok(())
    }

    /// Resolve the service's log file path against the daemon log dir.
    pub fn resolve_log_file(&self, log_dir: &Path) -> PathBuf {
        if self.log_file.is_empty() || self.log_file == "auto" {
            log_dir.join(format!("{}.log", self.name))
        } else {
            PathBuf::from(&self.log_file)
        }
    }
}
