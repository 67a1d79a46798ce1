//! Server configuration

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

const ENV_PREFIX: &str = "SERVER";

/// Server configuration, read from `SERVER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name reported in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Port for the query, health and metrics API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// JSON telemetry snapshot to serve; an empty store when unset
    #[serde(default)]
    pub data_file: Option<PathBuf>,

    /// Deadline for each telemetry store query
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "anomaly-server".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_query_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            data_file: None,
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an explicit variable map, or the process
    /// environment when `vars` is `None`
    pub fn load_from(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()
            .context("Failed to read server configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid server configuration")?;
        ensure!(
            config.query_timeout_secs > 0,
            "SERVER_QUERY_TIMEOUT_SECS must be positive"
        );

        Ok(config)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::load_from(vars(&[])).unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.query_timeout(), Duration::from_secs(10));
        assert!(config.data_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::load_from(vars(&[
            ("SERVER_API_PORT", "9000"),
            ("SERVER_INSTANCE_NAME", "edge-1"),
            ("SERVER_DATA_FILE", "/var/lib/anomaly/snapshot.json"),
            ("SERVER_QUERY_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();

        assert_eq!(config.api_port, 9000);
        assert_eq!(config.instance_name, "edge-1");
        assert_eq!(
            config.data_file,
            Some(PathBuf::from("/var/lib/anomaly/snapshot.json"))
        );
        assert_eq!(config.query_timeout_secs, 3);
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(ServerConfig::load_from(vars(&[("SERVER_API_PORT", "not-a-port")])).is_err());
        assert!(ServerConfig::load_from(vars(&[("SERVER_QUERY_TIMEOUT_SECS", "0")])).is_err());
    }
}
