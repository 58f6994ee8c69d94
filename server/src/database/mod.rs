//! User storage: the `UserStore` contract and its three backends.
//!
//! Every backend hands out ids as decimal strings and keeps a stable page
//! order (insertion order for memory/kv, primary-key order for sqlite).
//! Name uniqueness is not enforced here; callers check `get_by_name` first.

pub mod conn_lock;
pub mod create;
pub mod kv;
pub mod kv_schema;
pub mod memory;
pub mod sqlite;
pub mod timed;

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use shared::types::UserProfile;
use thiserror::Error;

pub use conn_lock::ConnectionLocks;
pub use kv::KvUserStore;
pub use kv_schema::SchemaError;
pub use memory::MemoryUserStore;
pub use sqlite::SqliteUserStore;
pub use timed::TimedStore;

/// A stored account.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub password_hash: String,
}

impl User {
    /// Public view of the record, without the hash.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

// The hash never reaches a log line.
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

/// Insert input; the backend assigns the id.
#[derive(Clone)]
pub struct NewUser {
    pub name: String,
    pub password_hash: String,
}

impl NewUser {
    pub fn new(name: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password_hash: password_hash.into(),
        }
    }

    pub(crate) fn into_user(self, id: impl ToString) -> User {
        User {
            id: id.to_string(),
            name: self.name,
            password_hash: self.password_hash,
        }
    }
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("user not found")]
    NotFound,

    #[error("store operation did not finish within {0:?}")]
    Timeout(Duration),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("embedded store error: {0}")]
    Kv(#[from] redb::Error),

    #[error("corrupt record: {0}")]
    Schema(#[from] SchemaError),

    #[error("storage task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Contract shared by all backends.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Up to `limit` users after skipping `offset`. An offset past the end
    /// yields an empty page; `limit == 0` is rejected.
    async fn get_page(&self, offset: u64, limit: u64) -> StoreResult<Vec<User>>;

    /// `NotFound` when absent or when `id` is not a backend key.
    async fn get(&self, id: &str) -> StoreResult<User>;

    async fn get_by_name(&self, name: &str) -> StoreResult<User>;

    /// Overwrites name and hash of the record with `user.id`.
    async fn update(&self, user: &User) -> StoreResult<()>;

    async fn insert(&self, user: NewUser) -> StoreResult<User>;

    /// All or nothing. Returned users are in input order.
    async fn insert_all(&self, users: Vec<NewUser>) -> StoreResult<Vec<User>>;
}

pub(crate) fn check_limit(limit: u64) -> StoreResult<()> {
    if limit == 0 {
        return Err(StoreError::InvalidArgument(
            "limit must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Ids are decimal integers in every backend.
pub(crate) fn parse_id(id: &str) -> StoreResult<u64> {
    id.parse::<u64>().map_err(|_| StoreError::NotFound)
}

tokio::task_local! {
    static WRITE_DEADLINE: WriteDeadline;
}

/// Cut-off for one write, installed by [`TimedStore`] around the call.
///
/// Backends check it right before the write becomes visible. Past it they
/// abandon the write and return `Timeout`, so a `Timeout` from a write
/// always means nothing was stored.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteDeadline {
    at: Instant,
    budget: Duration,
}

impl WriteDeadline {
    pub(crate) fn new(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// The deadline of the enclosing write, if any. Read it on the async
    /// side: it does not follow work onto the blocking pool.
    pub(crate) fn current() -> Option<Self> {
        WRITE_DEADLINE.try_with(|d| *d).ok()
    }

    pub(crate) async fn scope<F: Future>(self, fut: F) -> F::Output {
        WRITE_DEADLINE.scope(self, fut).await
    }

    pub(crate) fn check(deadline: Option<Self>) -> StoreResult<()> {
        match deadline {
            Some(d) if Instant::now() >= d.at => Err(StoreError::Timeout(d.budget)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_hash() {
        let user = User {
            id: "1".into(),
            name: "alice".into(),
            password_hash: "$argon2id$secret".into(),
        };
        let rendered = format!("{:?}", user);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("argon2id"));

        let pending = NewUser::new("bob", "$argon2id$other");
        assert!(!format!("{:?}", pending).contains("argon2id"));
    }

    #[test]
    fn profile_drops_hash() {
        let user = NewUser::new("alice", "h").into_user(7);
        let profile = user.profile();
        assert_eq!(profile.id, "7");
        assert_eq!(profile.name, "alice");
    }

    #[test]
    fn id_parsing() {
        assert_eq!(parse_id("42").ok(), Some(42));
        assert!(matches!(parse_id("abc"), Err(StoreError::NotFound)));
        assert!(matches!(parse_id("-1"), Err(StoreError::NotFound)));
        assert!(matches!(parse_id(""), Err(StoreError::NotFound)));
    }

    #[test]
    fn zero_limit_rejected() {
        assert!(matches!(check_limit(0), Err(StoreError::InvalidArgument(_))));
        assert!(check_limit(1).is_ok());
    }

    #[tokio::test]
    async fn write_deadline_visible_only_inside_scope() {
        assert!(WriteDeadline::current().is_none());
        assert!(WriteDeadline::check(None).is_ok());

        let seen = WriteDeadline::new(Duration::from_secs(60))
            .scope(async { WriteDeadline::check(WriteDeadline::current()) })
            .await;
        assert!(seen.is_ok());

        let expired = WriteDeadline::new(Duration::ZERO)
            .scope(async { WriteDeadline::check(WriteDeadline::current()) })
            .await;
        assert!(matches!(expired, Err(StoreError::Timeout(d)) if d == Duration::ZERO));
    }
}
