//! Auth collaborator boundary.
//!
//! The kernel never parses or verifies credentials. An [`Authenticator`]
//! turns an inbound credential (bearer token, session id, ...) into a
//! [`Principal`]; JWT verification or any other scheme lives behind it.

use std::collections::HashMap;

use psk_schemas::Principal;

/// Resolves a credential to a principal. `None` means absent or invalid.
pub trait Authenticator: Send + Sync {
    fn resolve(&self, credential: Option<&str>) -> Option<Principal>;
}

/// Resolve a credential, falling back to [`Principal::guest`].
pub fn principal_for<A: Authenticator + ?Sized>(auth: &A, credential: Option<&str>) -> Principal {
    auth.resolve(credential).unwrap_or_else(Principal::guest)
}

/// Fixed token → principal table. For local tooling and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn resolve(&self, credential: Option<&str>) -> Option<Principal> {
        let raw = credential?.trim();
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw);
        self.tokens.get(token).copied()
    }
}
