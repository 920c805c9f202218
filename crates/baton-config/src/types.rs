//! Configuration types

use baton_core::{ListenerDescriptor, Network, TransportMode};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Readiness and liveness probing
    #[serde(default)]
    pub health: HealthConfig,

    /// Process generation handoff
    #[serde(default)]
    pub upgrade: UpgradeConfig,

    /// Network-facing servers owned by this process
    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Health gate configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthConfig {
    /// Block start-up until the app is ready and healthy
    #[serde(default)]
    pub wait_before_continue: bool,

    /// Max waiting time while blocking start-up
    #[serde(default = "default_max_waiting_time", with = "humantime_serde")]
    pub max_waiting_time: Duration,

    /// Readiness probe
    #[serde(default = "ProbeConfig::readiness", deserialize_with = "readiness_probe")]
    pub readiness: ProbeConfig,

    /// Liveness probe
    #[serde(default = "ProbeConfig::liveness", deserialize_with = "liveness_probe")]
    pub liveness: ProbeConfig,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            wait_before_continue: false,
            max_waiting_time: default_max_waiting_time(),
            readiness: ProbeConfig::readiness(),
            liveness: ProbeConfig::liveness(),
        }
    }
}

/// Configuration of a single probe kind
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    /// Run this probe
    #[serde(default)]
    pub enabled: bool,

    /// Consecutive successes that must be exceeded to report passing
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Consecutive failures that must be exceeded to report failing
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Delay before the first check
    #[serde(default, with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Interval between checks
    #[serde(default = "default_period", with = "humantime_serde")]
    pub period: Duration,

    /// Timeout of a single check
    #[serde(default = "default_check_timeout", with = "humantime_serde")]
    pub check_timeout: Duration,

    /// HTTP path the probe is exposed on, the kind's default when empty
    #[serde(default)]
    pub endpoint: String,
}

impl ProbeConfig {
    /// Readiness defaults (`/readyz`)
    pub fn readiness() -> Self {
        Self::with_endpoint("/readyz")
    }

    /// Liveness defaults (`/healthz`)
    pub fn liveness() -> Self {
        Self::with_endpoint("/healthz")
    }

    fn or_endpoint(mut self, endpoint: &str) -> Self {
        if self.endpoint.is_empty() {
            self.endpoint = endpoint.to_string();
        }
        self
    }

    fn with_endpoint(endpoint: &str) -> Self {
        Self {
            enabled: false,
            success_threshold: default_success_threshold(),
            failure_threshold: default_failure_threshold(),
            initial_delay: Duration::ZERO,
            period: default_period(),
            check_timeout: default_check_timeout(),
            endpoint: endpoint.to_string(),
        }
    }
}

/// Upgrade session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpgradeConfig {
    /// Pid file rewritten by every generation once it is ready
    #[serde(default)]
    pub pid_file: Option<PathBuf>,

    /// Wait period for a new generation to become ready
    #[serde(default = "default_upgrade_timeout", with = "humantime_serde")]
    pub upgrade_timeout: Duration,

    /// Wait period for the old generation to drain before it is killed
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Socket network (tcp, tcp4, tcp6)
    #[serde(default = "default_network")]
    pub network: String,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            pid_file: None,
            upgrade_timeout: default_upgrade_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            network: default_network(),
        }
    }
}

impl UpgradeConfig {
    /// Parsed socket network
    pub fn network(&self) -> baton_core::Result<Network> {
        self.network.parse()
    }
}

/// A server owned by this process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Server name, used in logs
    pub name: String,

    /// Listen address
    pub listen: String,

    /// Transport mode
    #[serde(default)]
    pub mode: TransportMode,

    /// TLS material, required for secure mode
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl ServerConfig {
    /// Listener descriptor declared by this server
    pub fn descriptor(&self) -> ListenerDescriptor {
        ListenerDescriptor::new(self.mode, self.listen.clone())
    }
}

/// TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsConfig {
    /// Certificate file path (PEM)
    pub cert_file: PathBuf,

    /// Private key file path (PEM)
    pub key_file: PathBuf,

    /// Minimum TLS version (1.2 or 1.3)
    #[serde(default = "default_min_tls_version")]
    pub min_tls_version: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_max_waiting_time() -> Duration {
    Duration::from_secs(30)
}

fn default_success_threshold() -> u32 {
    1
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_period() -> Duration {
    Duration::from_secs(10)
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_upgrade_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn readiness_probe<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ProbeConfig, D::Error> {
    ProbeConfig::deserialize(deserializer).map(|probe| probe.or_endpoint("/readyz"))
}

fn liveness_probe<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ProbeConfig, D::Error> {
    ProbeConfig::deserialize(deserializer).map(|probe| probe.or_endpoint("/healthz"))
}

fn default_network() -> String {
    "tcp".to_string()
}

fn default_min_tls_version() -> String {
    "1.2".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}
