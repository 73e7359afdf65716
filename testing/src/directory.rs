//! In-memory session directory.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use turnstile_core::directory::{Principal, SessionDirectory};
use turnstile_core::store::StoreFuture;

/// Token → principal map.
///
/// # Example
///
/// ```
/// use turnstile_testing::{InMemorySessionDirectory, fixtures};
/// use turnstile_core::directory::Role;
///
/// let directory = InMemorySessionDirectory::new();
/// let ada = fixtures::user("Ada");
/// directory.insert("token-ada", fixtures::principal(&ada, Role::Student));
/// assert_eq!(directory.len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySessionDirectory {
    sessions: Arc<RwLock<HashMap<String, Principal>>>,
}

impl InMemorySessionDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token.
    pub fn insert(&self, token: impl Into<String>, principal: Principal) {
        self.sessions
            .write()
            .unwrap()
            .insert(token.into(), principal);
    }

    /// Revoke a token.
    pub fn revoke(&self, token: &str) {
        self.sessions.write().unwrap().remove(token);
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Whether no sessions exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }
}

impl SessionDirectory for InMemorySessionDirectory {
    fn resolve<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<Principal>> {
        Box::pin(async move { Ok(self.sessions.read().unwrap().get(token).cloned()) })
    }
}
