//! Server configuration.
//!
//! Loading flow:
//! 1. Compiled [`ServerConfig::default()`]
//! 2. Optional JSON file, merged over defaults
//! 3. `WIREHUB_*` environment variables (highest priority)

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

/// Default upgrade path.
pub const DEFAULT_PATH: &str = "/ws";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "WIREHUB_";

/// Configuration for the wirehub server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind when the server owns its listener.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Upgrade path.
    pub path: String,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Keepalive ping period in seconds.
    pub keepalive_interval_secs: u64,
    /// Largest inbound frame in bytes.
    pub max_message_size: usize,
    /// Upper bound on draining connections during shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            path: DEFAULT_PATH.into(),
            outbound_queue_capacity: 100,
            keepalive_interval_secs: 30,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load defaults, then `path` (if given and present), then env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ServerError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        Ok(config.normalized())
    }

    /// Upgrade path: [`DEFAULT_PATH`] when empty, always with a leading `/`.
    pub fn upgrade_path(&self) -> String {
        if self.path.is_empty() {
            DEFAULT_PATH.into()
        } else if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }

    /// Keepalive period. Zero is clamped to one second.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs.max(1))
    }

    /// Shutdown drain timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Queue capacity. Zero is clamped to one (tokio channels reject zero).
    pub fn queue_capacity(&self) -> usize {
        self.outbound_queue_capacity.max(1)
    }

    fn normalized(mut self) -> Self {
        self.path = self.upgrade_path();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.path, "/ws");
        assert_eq!(cfg.outbound_queue_capacity, 100);
        assert_eq!(cfg.keepalive_interval_secs, 30);
        assert_eq!(cfg.max_message_size, 16 * 1024 * 1024);
        assert_eq!(cfg.shutdown_timeout_secs, 30);
    }

    #[test]
    fn empty_path_falls_back() {
        let cfg = ServerConfig {
            path: String::new(),
            ..ServerConfig::default()
        };
        assert_eq!(cfg.upgrade_path(), "/ws");
    }

    #[test]
    fn relative_path_gets_leading_slash() {
        let cfg = ServerConfig {
            path: "socket".into(),
            ..ServerConfig::default()
        };
        assert_eq!(cfg.upgrade_path(), "/socket");
    }

    #[test]
    fn zero_values_clamped() {
        let cfg = ServerConfig {
            keepalive_interval_secs: 0,
            outbound_queue_capacity: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.keepalive_interval(), Duration::from_secs(1));
        assert_eq!(cfg.queue_capacity(), 1);
    }

    #[test]
    fn load_without_file_is_default() {
        Jail::expect_with(|_jail| {
            let cfg = ServerConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(cfg, ServerConfig::default());
            Ok(())
        });
    }

    #[test]
    fn load_merges_file_over_defaults() {
        Jail::expect_with(|jail| {
            let _ = jail.create_file(
                "wirehub.json",
                r#"{ "port": 9100, "path": "socket", "outbound_queue_capacity": 8 }"#,
            )?;
            let cfg = ServerConfig::load(Some(Path::new("wirehub.json")))
                .map_err(|e| e.to_string())?;
            assert_eq!(cfg.port, 9100);
            assert_eq!(cfg.path, "/socket");
            assert_eq!(cfg.outbound_queue_capacity, 8);
            assert_eq!(cfg.keepalive_interval_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            let _ = jail.create_file("wirehub.json", r#"{ "port": 9100 }"#)?;
            jail.set_env("WIREHUB_PORT", "9200");
            jail.set_env("WIREHUB_KEEPALIVE_INTERVAL_SECS", "5");
            let cfg = ServerConfig::load(Some(Path::new("wirehub.json")))
                .map_err(|e| e.to_string())?;
            assert_eq!(cfg.port, 9200);
            assert_eq!(cfg.keepalive_interval(), Duration::from_secs(5));
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_ignored() {
        Jail::expect_with(|_jail| {
            let cfg = ServerConfig::load(Some(Path::new("absent.json")))
                .map_err(|e| e.to_string())?;
            assert_eq!(cfg.port, 0);
            Ok(())
        });
    }

    #[test]
    fn invalid_value_is_config_error() {
        Jail::expect_with(|jail| {
            jail.set_env("WIREHUB_PORT", "not-a-port");
            let err = ServerConfig::load(None).unwrap_err();
            assert!(matches!(err, ServerError::Config(_)));
            Ok(())
        });
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"host":"0.0.0.0"}"#).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.outbound_queue_capacity, 100);
    }
}
