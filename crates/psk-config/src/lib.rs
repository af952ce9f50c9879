//! psk-config
//!
//! Layered YAML configuration for the petstore kernel.
//!
//! - YAML documents merge in order: earlier docs are base, later docs override.
//! - The merged tree is guarded against secret literals, canonicalized and
//!   hashed (`config_hash`) so a running kernel can report what it loaded.
//! - [`KernelConfig`] is the typed view the kernel and CLI consume.
//! - [`report_unused_keys`] lists leaf keys the typed view never reads.

mod kernel;
mod secrets;

pub use kernel::{DbConfig, KernelConfig, OrderConfig, PolicyConfig, StorageConfig};
pub use secrets::{resolve_secrets, ResolvedSecrets, DEFAULT_DB_URL_ENV};

use std::fs;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Leading text of credentials that must never appear as a config value.
/// Config names env vars; the values stay in the environment.
const SECRET_PREFIXES: &[&str] = &[
    "sk-", "sk_live", "sk_test", "AKIA", "-----BEGIN", "ghp_", "glpat-", "xoxb-", "eyJ",
    "postgres://", "postgresql://",
];

/// Leaf keys read by [`KernelConfig`], as JSON pointers. A pointer covers
/// itself and everything below it. Kept sorted.
const CONSUMED_POINTERS: &[&str] = &[
    "/db/max_connections",
    "/db/url_env",
    "/order/require_approval",
    "/policy/overrides",
    "/storage/read_retry_attempts",
    "/storage/read_retry_backoff_ms",
];

/// How many unused keys a `CONFIG_UNUSED_KEYS` error names.
const UNUSED_PREVIEW: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub consumed_prefixes: Vec<String>,
    /// Leaves no consumed prefix covers, sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// List the leaves of a merged tree that the kernel never reads. Under
/// [`UnusedKeyPolicy::Fail`] any such leaf is an error.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut unused: Vec<String> = leaves(config_json)
        .into_iter()
        .map(|(ptr, _)| ptr)
        .filter(|ptr| !CONSUMED_POINTERS.iter().any(|c| covers(c, ptr)))
        .collect();
    unused.sort();

    let report = UnusedKeyReport {
        consumed_prefixes: CONSUMED_POINTERS.iter().map(|c| c.to_string()).collect(),
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(UNUSED_PREVIEW)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} key(s) not read by the kernel: {}",
            report.unused_leaf_pointers.len(),
            shown.join(", ")
        );
    }

    Ok(report)
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}")))
        .collect::<Result<Vec<String>>>()?;
    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in layer {i}"))?;
        if layer.is_null() {
            continue;
        }
        let layer = serde_json::to_value(layer)
            .with_context(|| format!("layer {i} is not representable as json"))?;
        overlay(&mut merged, layer);
    }

    reject_secret_literals(&merged)?;

    // serde_json::Map is ordered by key, so compact output is canonical.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Apply `layer` on top of `base`. Objects merge key by key; anything else
/// in the layer replaces what was there.
fn overlay(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn reject_secret_literals(tree: &Value) -> Result<()> {
    for (ptr, leaf) in leaves(tree) {
        let Some(text) = leaf.as_str().map(str::trim) else {
            continue;
        };
        if text.len() >= 8 && SECRET_PREFIXES.iter().any(|p| text.starts_with(p)) {
            bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED");
        }
    }
    Ok(())
}

/// `prefix` covers `ptr` when they are equal or `ptr` continues below it
/// at a segment boundary.
fn covers(prefix: &str, ptr: &str) -> bool {
    match ptr.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Every scalar in `tree` with its JSON pointer (RFC 6901 escaping).
/// Empty objects and arrays contribute nothing.
fn leaves(tree: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), tree)];
    while let Some((ptr, node)) = stack.pop() {
        match node {
            Value::Object(map) => {
                for (key, child) in map {
                    let token = key.replace('~', "~0").replace('/', "~1");
                    stack.push((format!("{ptr}/{token}"), child));
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    stack.push((format!("{ptr}/{i}"), child));
                }
            }
            scalar if ptr.is_empty() => out.push(("/".to_string(), scalar)),
            scalar => out.push((ptr, scalar)),
        }
    }
    out
}
