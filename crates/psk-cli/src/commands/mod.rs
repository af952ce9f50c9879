pub mod order;
pub mod pet;
pub mod user;

pub use order::OrderCmd;
pub use pet::PetCmd;
pub use user::UserCmd;

use anyhow::{anyhow, Context, Result};
use psk_engine::KernelError;
use serde::Serialize;

pub fn print_json<T: Serialize>(v: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(v).context("serialize output failed")?;
    println!("{s}");
    Ok(())
}

/// Kernel outcome as a CLI error, carrying the HTTP status a transport
/// layer would answer with.
pub fn kernel_err(e: KernelError) -> anyhow::Error {
    match e.rejection() {
        Some(r) => anyhow!("{} (code={} http_status={})", e, r.code(), e.status_code()),
        None => anyhow!("{} (http_status={})", e, e.status_code()),
    }
}
