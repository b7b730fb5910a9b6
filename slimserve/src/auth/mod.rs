//! Credential checks used by the login and registration pages.

mod pool;
mod store;

pub use pool::{Pooled, SessionPool};
pub use store::{MemorySession, MemoryStore};

/// Result of a credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Login matched, or registration created the user.
    Authenticated,

    /// Login for a user that does not exist.
    NotFound,

    /// Registration for a name that is taken.
    AlreadyExists,

    /// Wrong password, or an empty username or password.
    Denied,
}

impl Verdict {
    pub fn is_success(self) -> bool {
        matches!(self, Verdict::Authenticated)
    }
}

/// Username/password verification backend.
///
/// Called synchronously from worker threads.
pub trait CredentialStore: Send + Sync {
    fn login(&self, username: &str, password: &str) -> Verdict;

    fn register(&self, username: &str, password: &str) -> Verdict;
}
