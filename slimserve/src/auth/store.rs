use super::pool::SessionPool;
use super::{CredentialStore, Verdict};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Hex-encoded SHA-256 digest of a password.
fn digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Handle onto the shared user table.
pub struct MemorySession {
    users: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySession {
    fn password_digest(&self, username: &str) -> Option<String> {
        self.users.read().get(username).cloned()
    }

    /// Inserts the user unless the name is taken.
    fn insert(&self, username: &str, password_digest: String) -> bool {
        let mut users = self.users.write();
        if users.contains_key(username) {
            return false;
        }
        users.insert(username.to_string(), password_digest);
        true
    }
}

/// In-process [`CredentialStore`].
///
/// Lookups go through a [`SessionPool`] of handles onto one user table.
/// Passwords are kept as SHA-256 digests.
pub struct MemoryStore {
    sessions: SessionPool<MemorySession>,
}

impl MemoryStore {
    /// Creates an empty store served by `sessions` pooled handles.
    pub fn new(sessions: usize) -> Self {
        let users = Arc::new(RwLock::new(HashMap::new()));

        Self {
            sessions: SessionPool::new((0..sessions.max(1)).map(|_| MemorySession {
                users: users.clone(),
            })),
        }
    }

    /// Creates a store pre-populated with `(username, password)` pairs.
    pub fn with_users<'a>(
        sessions: usize,
        users: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let store = Self::new(sessions);
        {
            let session = store.sessions.acquire();
            for (username, password) in users {
                session.insert(username, digest(password));
            }
        }
        store
    }

    /// Number of pooled handles currently free.
    pub fn idle_sessions(&self) -> usize {
        self.sessions.available()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(4)
    }
}

impl CredentialStore for MemoryStore {
    fn login(&self, username: &str, password: &str) -> Verdict {
        if username.is_empty() || password.is_empty() {
            return Verdict::Denied;
        }

        let session = self.sessions.acquire();
        match session.password_digest(username) {
            None => {
                debug!(username, "user not found");
                Verdict::NotFound
            }
            Some(stored) if stored == digest(password) => Verdict::Authenticated,
            Some(_) => {
                debug!(username, "password mismatch");
                Verdict::Denied
            }
        }
    }

    fn register(&self, username: &str, password: &str) -> Verdict {
        if username.is_empty() || password.is_empty() {
            return Verdict::Denied;
        }

        let session = self.sessions.acquire();
        if session.insert(username, digest(password)) {
            debug!(username, "user registered");
            Verdict::Authenticated
        } else {
            debug!(username, "user already exists");
            Verdict::AlreadyExists
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_login() {
        let store = MemoryStore::new(2);

        assert_eq!(store.register("alice", "s3cret"), Verdict::Authenticated);
        assert_eq!(store.login("alice", "s3cret"), Verdict::Authenticated);
        assert_eq!(store.login("alice", "wrong"), Verdict::Denied);
        assert_eq!(store.idle_sessions(), 2);
    }

    #[test]
    fn test_duplicate_register() {
        let store = MemoryStore::with_users(1, [("bob", "pw")]);

        assert_eq!(store.register("bob", "other"), Verdict::AlreadyExists);
        assert_eq!(store.login("bob", "pw"), Verdict::Authenticated);
    }

    #[test]
    fn test_unknown_user() {
        let store = MemoryStore::default();
        assert_eq!(store.login("carol", "pw"), Verdict::NotFound);
    }

    #[test]
    fn test_empty_credentials_are_denied() {
        let store = MemoryStore::default();

        assert_eq!(store.register("", "pw"), Verdict::Denied);
        assert_eq!(store.register("dave", ""), Verdict::Denied);
        assert_eq!(store.login("", ""), Verdict::Denied);
    }

    #[test]
    fn test_passwords_are_stored_as_digests() {
        let store = MemoryStore::with_users(1, [("erin", "plain")]);
        let session = store.sessions.acquire();

        let stored = session.password_digest("erin").unwrap();
        assert_ne!(stored, "plain");
        assert_eq!(stored.len(), 64);
    }
}
