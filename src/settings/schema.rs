//! Settings schema for DDAS.
//!
//! Every struct uses `#[serde(default)]` so a partial file is valid; missing
//! fields take the defaults below.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::ClientConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::retry::RetryPolicy;

/// Root settings structure.
///
/// Loaded from `~/.ddas/settings.toml` with environment variable
/// interpolation. `version` leaves room for migrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdasSettings {
    /// Schema version for migrations
    pub version: u32,

    /// Processing service connection
    pub service: ServiceSettings,

    /// Backoff for transient failures
    pub retry: RetrySettings,

    pub history: HistorySettings,

    /// Background liveness probe
    pub heartbeat: HeartbeatSettings,

    /// Where pending entries and history are kept
    pub storage: StorageSettings,

    /// Advanced/debug settings
    pub advanced: AdvancedSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Root URL of the processing service (supports $ENV_VAR syntax)
    pub base_url: String,

    /// Budget for the liveness probe
    pub health_timeout_secs: u64,

    /// Budget for the processing exchange; the service uploads the file
    pub request_timeout_secs: u64,

    /// Credential forwarded when the store has none (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retry n waits base_delay_ms * n
    pub base_delay_ms: u64,

    /// Dispatches per entry, the first one included
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Records kept, most recent first
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageSettings {
    /// Data directory; `~/.ddas` when unset (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    /// Log level: "error" | "warn" | "info" | "debug" | "trace"
    pub log_level: String,
}

// =============================================================================
// Default implementations
// =============================================================================

impl Default for DdasSettings {
    fn default() -> Self {
        Self {
            version: 1,
            service: ServiceSettings::default(),
            retry: RetrySettings::default(),
            history: HistorySettings::default(),
            heartbeat: HeartbeatSettings::default(),
            storage: StorageSettings::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            health_timeout_secs: 5,
            request_timeout_secs: 120,
            auth_token: None,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 2000,
            max_attempts: 3,
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self { limit: 20 }
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 20,
        }
    }
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// Conversions into component configuration
// =============================================================================

impl DdasSettings {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.service.base_url.clone(),
            health_timeout: Duration::from_secs(self.service.health_timeout_secs),
            request_timeout: Duration::from_secs(self.service.request_timeout_secs),
        }
    }

    /// Orchestrator configuration; `auth_token` is the already-resolved
    /// fallback credential.
    pub fn orchestrator_config(&self, auth_token: Option<String>) -> OrchestratorConfig {
        OrchestratorConfig {
            retry: RetryPolicy::new(
                Duration::from_millis(self.retry.base_delay_ms),
                self.retry.max_attempts,
            ),
            history_limit: self.history.limit,
            heartbeat_interval: self
                .heartbeat
                .enabled
                .then(|| Duration::from_secs(self.heartbeat.interval_secs.max(1))),
            auth_token,
        }
    }

    /// Data directory, defaulting to `~/.ddas`.
    pub fn data_dir(&self) -> PathBuf {
        match &self.storage.data_dir {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => super::loader::ddas_home(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = DdasSettings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.service.base_url, "http://localhost:5001");
        assert_eq!(settings.service.request_timeout_secs, 120);
        assert_eq!(settings.retry.base_delay_ms, 2000);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.history.limit, 20);
        assert!(settings.heartbeat.enabled);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
            version = 1
            [retry]
            max_attempts = 5
        "#;

        let settings: DdasSettings = toml::from_str(toml).unwrap();
        assert_eq!(settings.retry.max_attempts, 5);
        // Defaults should fill in missing fields
        assert_eq!(settings.retry.base_delay_ms, 2000);
        assert_eq!(settings.heartbeat.interval_secs, 20);
    }

    #[test]
    fn test_serialize_settings() {
        let settings = DdasSettings::default();
        let toml_str = toml::to_string_pretty(&settings).unwrap();
        assert!(toml_str.contains("version = 1"));
        assert!(toml_str.contains("[service]"));
        assert!(!toml_str.contains("auth_token"));
    }

    #[test]
    fn test_component_configs() {
        let mut settings = DdasSettings::default();
        settings.heartbeat.enabled = false;
        settings.retry.base_delay_ms = 50;

        let config = settings.orchestrator_config(Some("t".into()));
        assert_eq!(config.retry.delay_for(2), Duration::from_millis(100));
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.heartbeat_interval.is_none());
        assert_eq!(config.auth_token.as_deref(), Some("t"));

        let client = settings.client_config();
        assert_eq!(client.request_timeout, Duration::from_secs(120));
    }
}
