//! Configuration builder

use crate::types::{Config, HealthConfig, LoggingConfig, ServerConfig, UpgradeConfig};
use baton_core::TransportMode;

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    health: Option<HealthConfig>,
    upgrade: Option<UpgradeConfig>,
    servers: Vec<ServerConfig>,
    logging: Option<LoggingConfig>,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set health configuration
    pub fn health(mut self, health: HealthConfig) -> Self {
        self.health = Some(health);
        self
    }

    /// Set upgrade configuration
    pub fn upgrade(mut self, upgrade: UpgradeConfig) -> Self {
        self.upgrade = Some(upgrade);
        self
    }

    /// Add a server
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.servers.push(server);
        self
    }

    /// Add a plain-mode server listening on `listen`
    pub fn plain_server(self, name: &str, listen: &str) -> Self {
        self.server(ServerConfig {
            name: name.to_string(),
            listen: listen.to_string(),
            mode: TransportMode::Plain,
            tls: None,
        })
    }

    /// Set logging configuration
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> baton_core::Result<Config> {
        let config = Config {
            health: self.health.unwrap_or_default(),
            upgrade: self.upgrade.unwrap_or_default(),
            servers: self.servers,
            logging: self.logging.unwrap_or_default(),
        };

        crate::validator::validate_config(&config)?;

        Ok(config)
    }
}
