//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES (e.g. `db.url_env:
//! PSK_DATABASE_URL`). Callers resolve them once at startup and pass the
//! result into constructors. `Debug` output redacts values; error messages
//! name the env var, never its value.

use std::fmt;

use anyhow::{bail, Result};

use crate::KernelConfig;

pub const DEFAULT_DB_URL_ENV: &str = "PSK_DATABASE_URL";

#[derive(Clone)]
pub struct ResolvedSecrets {
    pub database_url: String,
}

impl fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url", &"<redacted>")
            .finish()
    }
}

pub fn resolve_secrets(cfg: &KernelConfig) -> Result<ResolvedSecrets> {
    resolve_secrets_with(cfg, |name| std::env::var(name).ok())
}

/// Resolution with an injectable lookup, so tests never touch process env.
pub(crate) fn resolve_secrets_with<F>(cfg: &KernelConfig, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let name = cfg.db.url_env.trim();
    if name.is_empty() {
        bail!("CONFIG_SECRET_MISSING: db.url_env is empty");
    }
    match lookup(name) {
        Some(v) if !v.trim().is_empty() => Ok(ResolvedSecrets { database_url: v }),
        _ => bail!("CONFIG_SECRET_MISSING: env var {} is not set", name),
    }
}
