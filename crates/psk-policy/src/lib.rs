//! psk-policy
//!
//! Ownership / authorization policy for the petstore kernel.
//!
//! - Role gate: is the principal's role in the operation's allowed set,
//!   respecting the role hierarchy.
//! - Ownership gate: does the principal own the specific resource instance,
//!   unless its role is a bypass role for that operation.
//!
//! Deterministic, pure logic. No IO. The owner of a resource is loaded by
//! the caller before the ownership gate is evaluated.

mod auth;
mod engine;
mod table;
mod types;

pub use auth::{principal_for, Authenticator, StaticTokenAuthenticator};
pub use engine::{authorize, role_gate};
pub use table::{OperationRule, OwnershipGate, PolicyTable, RuleOverride};
pub use types::*;
