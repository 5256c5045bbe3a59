use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use uuid::Uuid;

use crate::modules::email::NotificationEmail;

/// Define verification status enum
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Unverified,
    Verified,
}

impl VerificationStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationStatus::Verified)
    }
}

impl Default for VerificationStatus {
    fn default() -> Self {
        VerificationStatus::Unverified
    }
}

/// Represents a single account and its credentials
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub verification_status: VerificationStatus,
}

impl User {
    /// Build a fresh, unverified account
    pub fn new(username: &str, password_hash: String, email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            email: email.to_string(),
            created_at: Utc::now(),
            verification_status: VerificationStatus::Unverified,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verification_status.is_verified()
    }
}

/// Email verification token issued at signup.
///
/// `username` is a back-reference to the owning account; the token does not
/// own the user and the user may disappear independently.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerificationToken {
    pub token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl VerificationToken {
    pub fn new(token: String, owner: &User) -> Self {
        Self {
            token,
            username: owner.username.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Identifier of a queued notification
pub type OutboxId = Uuid;

/// How long a sender may hold a claim before another one may take over
pub const CLAIM_TIMEOUT_SECS: i64 = 300;

/// A notification email waiting in the outbox. Delivered entries are removed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub id: OutboxId,
    pub email: NotificationEmail,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Set while a sender is delivering the entry
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn new(email: NotificationEmail) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
            claimed_at: None,
        }
    }

    /// Whether another sender holds a claim younger than `stale_after`
    pub fn is_claimed(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.claimed_at
            .map_or(false, |claimed_at| now - claimed_at < stale_after)
    }
}

/// Failures raised by the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),
    #[error("verification token already exists")]
    DuplicateToken,
    #[error("token owner '{0}' does not exist")]
    UnknownOwner(String),
    #[error("outbox entry {0} does not exist")]
    UnknownOutboxEntry(OutboxId),
    #[error("datastore lock poisoned")]
    Poisoned,
    #[error("datastore I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("datastore serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence of user accounts
pub trait UserStore {
    /// Insert a new user or update the one with the same `id`.
    ///
    /// Fails with [`StoreError::DuplicateUsername`] when the username is
    /// held by a different account.
    fn save_user(&mut self, user: User) -> Result<User, StoreError>;

    fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Remove an account; returns whether it existed
    fn delete_user(&mut self, username: &str) -> Result<bool, StoreError>;
}

/// Persistence of verification tokens
pub trait VerificationTokenStore {
    /// Store a token. The owning user must already exist.
    fn save_token(&mut self, token: VerificationToken) -> Result<VerificationToken, StoreError>;

    /// Exact-match lookup
    fn find_by_token(&self, token: &str) -> Result<Option<VerificationToken>, StoreError>;
}

/// Notifications queued alongside the data they announce
pub trait OutboxStore {
    fn enqueue(&mut self, email: NotificationEmail) -> Result<OutboxId, StoreError>;

    /// Undelivered entries, oldest first, claimed or not
    fn pending(&self) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Reserve an entry for delivery. Returns `false` when it is already
    /// delivered or claimed by someone else less than `stale_after` ago.
    fn claim(&mut self, id: OutboxId, stale_after: Duration) -> Result<bool, StoreError>;

    /// Drop a delivered entry from the outbox
    fn mark_delivered(&mut self, id: OutboxId) -> Result<(), StoreError>;

    /// Count a failed attempt and release the claim
    fn record_failure(&mut self, id: OutboxId, reason: &str) -> Result<(), StoreError>;
}

/// Unit of work over all stores. Dropping it without `commit` discards
/// every write made through it.
pub trait Transaction: UserStore + VerificationTokenStore + OutboxStore {
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Source of transactions
pub trait Datastore {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError>;
}
