//! Configuration validation

use crate::types::{ProbeConfig, TlsConfig};
use crate::Config;
use baton_core::{Error, Result, TransportMode};
use std::collections::HashSet;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_probe("readiness", &config.health.readiness)?;
    validate_probe("liveness", &config.health.liveness)?;

    validate_upgrade(config)?;

    validate_servers(config)?;

    validate_logging(config)?;

    Ok(())
}

fn validate_probe(kind: &str, probe: &ProbeConfig) -> Result<()> {
    if !probe.endpoint.starts_with('/') {
        return Err(Error::Config(format!(
            "{kind} endpoint must start with '/'"
        )));
    }

    if !probe.enabled {
        return Ok(());
    }

    if probe.period.is_zero() {
        return Err(Error::Config(format!("{kind} period must be > 0")));
    }

    if probe.check_timeout.is_zero() {
        return Err(Error::Config(format!("{kind} check_timeout must be > 0")));
    }

    if probe.check_timeout > probe.period {
        tracing::warn!(
            kind,
            "check_timeout is longer than period, ticks will be skipped"
        );
    }

    Ok(())
}

fn validate_upgrade(config: &Config) -> Result<()> {
    config.upgrade.network()?;

    if config.upgrade.upgrade_timeout.is_zero() {
        return Err(Error::Config("upgrade_timeout must be > 0".to_string()));
    }

    if config.upgrade.shutdown_timeout.is_zero() {
        return Err(Error::Config("shutdown_timeout must be > 0".to_string()));
    }

    Ok(())
}

fn validate_servers(config: &Config) -> Result<()> {
    if config.servers.is_empty() {
        return Err(Error::Config("at least one server is required".to_string()));
    }

    let mut names = HashSet::new();
    let mut addresses = HashSet::new();

    for server in &config.servers {
        if server.name.is_empty() {
            return Err(Error::Config("server name cannot be empty".to_string()));
        }

        if !names.insert(server.name.as_str()) {
            return Err(Error::Config(format!(
                "duplicate server name: {}",
                server.name
            )));
        }

        if server.listen.is_empty() {
            return Err(Error::Config(format!(
                "server '{}' listen address cannot be empty",
                server.name
            )));
        }

        if !addresses.insert(server.listen.as_str()) {
            return Err(Error::Config(format!(
                "listen address {} is declared by more than one server",
                server.listen
            )));
        }

        match (&server.mode, &server.tls) {
            (TransportMode::Secure, None) => {
                return Err(Error::Config(format!(
                    "server '{}' uses secure mode but has no tls block",
                    server.name
                )));
            }
            (TransportMode::Plain, Some(_)) => {
                tracing::warn!(
                    server = %server.name,
                    "tls block is ignored for plain mode"
                );
            }
            (_, Some(tls)) => validate_tls(&server.name, tls)?,
            _ => {}
        }
    }

    Ok(())
}

fn validate_tls(server: &str, tls: &TlsConfig) -> Result<()> {
    if tls.cert_file.as_os_str().is_empty() {
        return Err(Error::Config(format!(
            "server '{server}' TLS cert_file cannot be empty"
        )));
    }
    if tls.key_file.as_os_str().is_empty() {
        return Err(Error::Config(format!(
            "server '{server}' TLS key_file cannot be empty"
        )));
    }

    match tls.min_tls_version.as_str() {
        "1.2" | "1.3" => Ok(()),
        _ => Err(Error::Config(format!(
            "Invalid TLS version: {} (must be 1.2 or 1.3)",
            tls.min_tls_version
        ))),
    }
}

fn validate_logging(config: &Config) -> Result<()> {
    match config.logging.level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => {
            return Err(Error::Config(format!("Invalid log level: {other}")));
        }
    }

    match config.logging.format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(Error::Config(format!(
            "Invalid log format: {other} (must be text or json)"
        ))),
    }
}
