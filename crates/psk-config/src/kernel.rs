//! Typed view over the merged config tree.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use psk_policy::{PolicyTable, RuleOverride};
use serde::{Deserialize, Serialize};

use crate::LoadedConfig;

/// Order lifecycle policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// When true, `placed -> delivered` is refused; orders must pass through
    /// `approved`.
    pub require_approval: bool,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            require_approval: false,
        }
    }
}

/// Retry budget for storage reads. Writes are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Extra attempts after the first failed read.
    pub read_retry_attempts: u32,
    /// Backoff per attempt, multiplied by the attempt number.
    pub read_retry_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            read_retry_attempts: 2,
            read_retry_backoff_ms: 25,
        }
    }
}

impl StorageConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.read_retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Name of the env var holding the connection URL. Never the URL itself.
    pub url_env: String,
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url_env: crate::DEFAULT_DB_URL_ENV.to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Per-operation overrides keyed by operation name.
    pub overrides: BTreeMap<String, RuleOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub order: OrderConfig,
    pub storage: StorageConfig,
    pub db: DbConfig,
    pub policy: PolicyConfig,
}

impl KernelConfig {
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        serde_json::from_value(loaded.config_json.clone()).context("invalid kernel config")
    }

    /// Standard policy table with configured overrides applied.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        PolicyTable::standard().with_overrides(&self.policy.overrides)
    }
}
