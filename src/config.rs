//! Benchmark configuration persistence
//!
//! Settings are read from a JSON file; missing fields take their defaults
//! and `QUIK_ENDPOINT` overrides the endpoint.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rmpv::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::harness::HarnessConfig;
use crate::rpc::common::DEFAULT_ENDPOINT;
use crate::rpc::connection::ConnectionConfig;

/// Environment variable overriding the configured endpoint
pub const ENDPOINT_ENV: &str = "QUIK_ENDPOINT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings for the `quik_bench` binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Terminal endpoint
    pub endpoint: String,
    /// Concurrent workers
    pub workers: usize,
    /// Sequential `getSecurityInfo` calls per worker
    pub calls_per_worker: u64,
    /// Class code used by the harness
    pub board: String,
    /// Security code used by the harness
    pub ticker: String,
    /// Class code used by the initial probe
    pub probe_board: String,
    /// Reply timeout in milliseconds; absent means wait forever
    pub recv_timeout_ms: Option<u64>,
    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            workers: 7,
            calls_per_worker: 100_000,
            board: "SPBFUT".to_string(),
            ticker: "SBER".to_string(),
            probe_board: "TQBR".to_string(),
            recv_timeout_ms: None,
            log_level: "info".to_string(),
        }
    }
}

impl BenchConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load from `path` if given, otherwise defaults, then apply the environment
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_endpoint_override(std::env::var(ENDPOINT_ENV).ok());
        Ok(config)
    }

    fn apply_endpoint_override(&mut self, endpoint: Option<String>) {
        if let Some(endpoint) = endpoint.filter(|e| !e.is_empty()) {
            self.endpoint = endpoint;
        }
    }

    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout_ms.map(Duration::from_millis)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            recv_timeout: self.recv_timeout(),
            ..ConnectionConfig::new(self.endpoint.clone())
        }
    }

    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            workers: self.workers,
            calls_per_worker: self.calls_per_worker,
            method: "getSecurityInfo".to_string(),
            args: vec![Value::from(self.board.as_str()), Value::from(self.ticker.as_str())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"endpoint": "tcp://10.211.55.3:8004", "workers": 3}}"#).unwrap();

        let config = BenchConfig::load(file.path()).unwrap();
        assert_eq!(config.endpoint, "tcp://10.211.55.3:8004");
        assert_eq!(config.workers, 3);
        assert_eq!(config.calls_per_worker, 100_000);
        assert_eq!(config.board, "SPBFUT");
        assert_eq!(config.recv_timeout(), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quik_bench.json");
        let config = BenchConfig {
            recv_timeout_ms: Some(250),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(BenchConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(BenchConfig::load(file.path()), Err(ConfigError::Json(_))));

        let missing = Path::new("/nonexistent/quik_bench.json");
        assert!(matches!(BenchConfig::load(missing), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_endpoint_override_and_derived_configs() {
        let mut config = BenchConfig::default();
        config.apply_endpoint_override(Some(String::new()));
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        config.apply_endpoint_override(Some("tcp://192.168.0.10:8004".to_string()));
        assert_eq!(config.endpoint, "tcp://192.168.0.10:8004");

        config.recv_timeout_ms = Some(1500);
        let connection = config.connection_config();
        assert_eq!(connection.endpoint, "tcp://192.168.0.10:8004");
        assert_eq!(connection.recv_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(connection.linger_ms, 0);

        let harness = config.harness_config();
        assert_eq!(harness.workers, 7);
        assert_eq!(harness.args, vec![Value::from("SPBFUT"), Value::from("SBER")]);
    }
}
