//! Typed configuration for the reconciler process (§2 ambient stack).
//!
//! Loads a `toml` file into a `serde`-derived struct, falling back to a
//! written-out default when none exists yet, plus a handful of env-var
//! overrides (`clap`'s `env` attribute) for settings an operator needs to
//! override per-process without editing a file — a rolling upgrade can flip
//! `dynamic_provisioning` for one replica via an env var while the on-disk
//! file stays shared.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ControlPlaneError, Result};

/// Process-wide configuration for the three reconciliation loops.
///
/// Every field has a sane default (see [`Default`]) so a deployment can
/// start from an empty file and only override what it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// How often each reconciler loop ticks when there is nothing pending.
    pub tick_interval_seconds: u64,
    /// Initial backoff after a `Transient` error, doubled up to `backoff_max_seconds`.
    pub backoff_initial_seconds: u64,
    pub backoff_max_seconds: u64,
    /// Whether the owning cloud performs dynamic host provisioning
    /// (§4.2: gates `breakfixRecursively`/`removeRecursively` behavior).
    pub dynamic_provisioning: bool,
    /// Whether this process reconciles a CD (continuous deployment/test)
    /// zone (§4.2: changes how `deactivate` splits stateful/stateless).
    pub is_cd_zone: bool,
    /// DNS zones the name-service forwarder should treat as no-ops (§2, §6).
    pub noop_dns_zones: Vec<String>,
    /// Job types the pipeline loop advances runs for, e.g. `prod`/`staging`.
    pub job_types: Vec<String>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        ControlPlaneConfig {
            tick_interval_seconds: 5,
            backoff_initial_seconds: 1,
            backoff_max_seconds: 60,
            dynamic_provisioning: false,
            is_cd_zone: false,
            noop_dns_zones: Vec::new(),
            job_types: vec!["prod".to_string()],
        }
    }
}

impl ControlPlaneConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_secs(self.backoff_initial_seconds)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_seconds)
    }

    /// Parse a `toml` document into a config, defaulting any field the
    /// document omits (§4.4 serialization-compatibility rules apply to
    /// config the same way they apply to durable entities: an old field
    /// missing from a newer document must not be an error).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ControlPlaneError::Permanent(crate::error::Permanent {
                operation: "parse control plane config".to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Load from a file if it exists, else fall back to defaults. Does not
    /// write the defaults back out — a reconciler process should not mutate
    /// its own config file out from under an operator.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(ControlPlaneConfig::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            ControlPlaneError::Permanent(crate::error::Permanent {
                operation: format!("read config file {}", path.display()),
                reason: e.to_string(),
            })
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply the handful of env-var overrides an operator may set without
    /// touching the shared file, named the way `clap`'s `env` attribute
    /// names them in the binary's CLI struct.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("MERIDIAN_DYNAMIC_PROVISIONING") {
            self.dynamic_provisioning = parse_bool_env(&v, self.dynamic_provisioning);
        }
        if let Ok(v) = std::env::var("MERIDIAN_IS_CD_ZONE") {
            self.is_cd_zone = parse_bool_env(&v, self.is_cd_zone);
        }
        if let Ok(v) = std::env::var("MERIDIAN_TICK_INTERVAL_SECONDS") {
            if let Ok(parsed) = v.parse() {
                self.tick_interval_seconds = parsed;
            }
        }
        self
    }
}

fn parse_bool_env(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = ControlPlaneConfig::default();
        assert_eq!(config.tick_interval_seconds, 5);
        assert!(!config.dynamic_provisioning);
    }

    #[test]
    fn partial_toml_document_defaults_missing_fields() {
        let config = ControlPlaneConfig::from_toml_str("dynamic_provisioning = true\n").unwrap();
        assert!(config.dynamic_provisioning);
        assert_eq!(config.tick_interval_seconds, ControlPlaneConfig::default().tick_interval_seconds);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ControlPlaneConfig::load(Path::new("/nonexistent/meridian.toml")).unwrap();
        assert_eq!(config, ControlPlaneConfig::default());
    }

    #[test]
    fn malformed_toml_is_a_permanent_error() {
        let err = ControlPlaneConfig::from_toml_str("not = [valid").unwrap_err();
        assert!(matches!(err, ControlPlaneError::Permanent(_)));
    }
}
