//! Configuration loading

use crate::{Config, ConfigFormat};
use baton_core::{Error, Result};
use regex::{Captures, Regex};
use std::env;
use std::fs;
use std::path::Path;

/// Load configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    let format = ConfigFormat::from_path(path)?;

    load_from_str(&content, format)
}

/// Expand environment variables in configuration string
/// Supports syntax: ${VAR} and ${VAR:-default}
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| Error::Config(format!("Invalid regex: {e}")))?;

    let mut missing: Option<String> = None;
    let expanded = re.replace_all(content, |cap: &Captures<'_>| {
        let var_name = &cap[1];
        match env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(3) {
                Some(default) => default.as_str().to_string(),
                None => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            },
        }
    });

    if let Some(var_name) = missing {
        return Err(Error::Config(format!(
            "Environment variable '{var_name}' not set and no default provided"
        )));
    }

    Ok(expanded.into_owned())
}

/// Load configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    // Expand environment variables first
    let expanded_content = expand_env_vars(content)?;

    let config = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse JSON: {e}")))?,
    };

    Ok(config)
}

/// Load and validate configuration
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = load_from_file(path)?;

    crate::validator::validate_config(&config)?;

    tracing::debug!(
        servers = config.servers.len(),
        readiness = config.health.readiness.enabled,
        liveness = config.health.liveness.enabled,
        "Configuration loaded"
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const YAML_CONFIG: &str = r#"
health:
  wait_before_continue: true
  max_waiting_time: "15s"
  readiness:
    enabled: true
    success_threshold: 2
    failure_threshold: 1
    initial_delay: "5s"
    period: "2s"
    check_timeout: "500ms"
    endpoint: "/ready"
  liveness:
    enabled: true
    endpoint: "/live"

upgrade:
  pid_file: "/tmp/baton.pid"
  upgrade_timeout: "1m"
  shutdown_timeout: "20s"
  network: "tcp"

servers:
  - name: "app"
    listen: "127.0.0.1:8080"
  - name: "telemetry"
    listen: "127.0.0.1:9090"
    mode: "plain"

logging:
  level: "debug"
  format: "json"
"#;

    #[test]
    fn test_load_yaml() {
        let config = load_from_str(YAML_CONFIG, ConfigFormat::Yaml).unwrap();

        assert!(config.health.wait_before_continue);
        assert_eq!(config.health.max_waiting_time, Duration::from_secs(15));
        assert_eq!(config.health.readiness.success_threshold, 2);
        assert_eq!(config.health.readiness.period, Duration::from_secs(2));
        assert_eq!(
            config.health.readiness.check_timeout,
            Duration::from_millis(500)
        );
        assert_eq!(config.health.liveness.endpoint, "/live");
        assert_eq!(config.health.liveness.failure_threshold, 3);
        assert_eq!(config.upgrade.upgrade_timeout, Duration::from_secs(60));
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_load_toml() {
        let content = r#"
[upgrade]
shutdown_timeout = "5s"

[[servers]]
name = "app"
listen = "127.0.0.1:8080"
"#;
        let config = load_from_str(content, ConfigFormat::Toml).unwrap();
        assert_eq!(config.upgrade.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.upgrade.network, "tcp");
        assert_eq!(config.health.readiness.endpoint, "/readyz");
    }

    #[test]
    fn test_probe_endpoint_defaults_per_kind() {
        let content = r#"
health:
  readiness: { enabled: true }
  liveness:
    enabled: true
    period: "5s"
"#;
        let config = load_from_str(content, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.health.readiness.endpoint, "/readyz");
        assert_eq!(config.health.liveness.endpoint, "/healthz");
        assert_eq!(config.health.liveness.period, Duration::from_secs(5));
        crate::validator::validate_config(&config).unwrap();
    }

    #[test]
    fn test_invalid_yaml() {
        let invalid = "invalid: [yaml";
        let result = load_from_str(invalid, ConfigFormat::Yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("BATON_TEST_PORT", "9191");
        env::set_var("BATON_TEST_HOST", "0.0.0.0");

        let content = r#"
servers:
  - name: "app"
    listen: "${BATON_TEST_HOST}:${BATON_TEST_PORT}"
"#;

        let config = load_from_str(content, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.servers[0].listen, "0.0.0.0:9191");

        env::remove_var("BATON_TEST_PORT");
        env::remove_var("BATON_TEST_HOST");
    }

    #[test]
    fn test_env_var_with_default() {
        env::remove_var("BATON_UNDEFINED_VAR");

        let content = r#"
servers:
  - name: "app"
    listen: "${BATON_UNDEFINED_VAR:-127.0.0.1:8080}"
"#;

        let config = load_from_str(content, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.servers[0].listen, "127.0.0.1:8080");
    }

    #[test]
    fn test_missing_env_var_no_default() {
        env::remove_var("BATON_MISSING_VAR");

        let content = r#"
servers:
  - name: "app"
    listen: "${BATON_MISSING_VAR}"
"#;

        let result = load_from_str(content, ConfigFormat::Yaml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("BATON_MISSING_VAR"));
    }

    #[test]
    fn test_load_config_validates() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(b"servers: []\n").unwrap();

        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(YAML_CONFIG.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.servers[1].name, "telemetry");
    }
}
