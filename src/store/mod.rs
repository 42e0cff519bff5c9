pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::models::session::SessionRecord;
use crate::models::user::{NewUser, User};

/// Hard cap on concurrently active sessions per user.
pub const MAX_ACTIVE_SESSIONS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Username,
    Email,
    MobileNumber,
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictField::Username => write!(f, "username"),
            ConflictField::Email => write!(f, "email"),
            ConflictField::MobileNumber => write!(f, "mobile number"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already registered")]
    Conflict(ConflictField),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

/// Fields for a session row about to be inserted.
#[derive(Debug, Clone, Copy)]
pub struct NewSession<'a> {
    pub user_id: i64,
    pub token_id: &'a str,
    pub device_info: Option<&'a str>,
    pub origin_address: Option<&'a str>,
}

/// User identity and credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look a user up by username, email, or mobile number.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, StoreError>;

    /// Insert a new user. A uniqueness violation reports which field
    /// conflicted.
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;
}

/// Append-only record of revoked token identifiers.
#[async_trait]
pub trait RevocationLedger: Send + Sync {
    /// Unknown token identifiers are simply not revoked.
    async fn is_revoked(&self, token_id: &str) -> Result<bool, StoreError>;

    /// Idempotent: revoking an already-revoked token succeeds without
    /// duplicating the entry.
    async fn revoke(&self, token_id: &str, user_id: i64) -> Result<(), StoreError>;
}

/// Per-user collection of sessions with the occupancy cap.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn count_active(&self, user_id: i64) -> Result<i64, StoreError>;

    /// The active session with the smallest last-active timestamp; ties go
    /// to the smallest creation time, then the smallest id.
    async fn find_oldest_active(&self, user_id: i64) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert a new active session. If the user is at the cap, the oldest
    /// active session is evicted first: its token is revoked and its active
    /// flag cleared, atomically with the insert. Concurrent calls for one
    /// user serialize, so the cap is never observably exceeded.
    async fn create_session(&self, new_session: NewSession<'_>)
        -> Result<SessionRecord, StoreError>;

    /// Advance the matching active session's last-active timestamp. Returns
    /// false (a no-op, not an error) for unknown or inactive tokens.
    async fn touch(&self, token_id: &str) -> Result<bool, StoreError>;

    /// Clear the active flag, whatever its current state.
    async fn deactivate(&self, token_id: &str) -> Result<bool, StoreError>;

    /// Active sessions, most recently used first.
    async fn list_active(&self, user_id: i64) -> Result<Vec<SessionRecord>, StoreError>;
}

/// The full store handle the session manager is constructed with.
pub trait AuthStore: CredentialStore + RevocationLedger + SessionRegistry {}

impl<T: CredentialStore + RevocationLedger + SessionRegistry> AuthStore for T {}
