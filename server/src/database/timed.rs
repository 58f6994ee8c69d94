use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::warn;

use super::{NewUser, StoreError, StoreResult, User, UserStore, WriteDeadline};

/// Bounds every call on the wrapped store with the same deadline.
///
/// Reads are simply cut off. Writes hand the deadline to the backend, which
/// abandons the write before it becomes visible; the outer limit for writes
/// is twice the budget and only catches a backend that never answers.
pub struct TimedStore {
    inner: Arc<dyn UserStore>,
    deadline: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn UserStore>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        match timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Store {} exceeded {:?}", op, self.deadline);
                Err(StoreError::Timeout(self.deadline))
            }
        }
    }

    async fn bounded_write<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        let deadline = WriteDeadline::new(self.deadline);
        let backstop = self.deadline.saturating_mul(2);
        match timeout(backstop, deadline.scope(fut)).await {
            Ok(Err(StoreError::Timeout(budget))) => {
                warn!("Store {} abandoned after {:?}", op, budget);
                Err(StoreError::Timeout(budget))
            }
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Store {} gave no answer within {:?}; its outcome is unknown",
                    op, backstop
                );
                Err(StoreError::Timeout(self.deadline))
            }
        }
    }
}

#[async_trait]
impl UserStore for TimedStore {
    async fn get_page(&self, offset: u64, limit: u64) -> StoreResult<Vec<User>> {
        self.bounded("get_page", self.inner.get_page(offset, limit))
            .await
    }

    async fn get(&self, id: &str) -> StoreResult<User> {
        self.bounded("get", self.inner.get(id)).await
    }

    async fn get_by_name(&self, name: &str) -> StoreResult<User> {
        self.bounded("get_by_name", self.inner.get_by_name(name))
            .await
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        self.bounded_write("update", self.inner.update(user)).await
    }

    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        self.bounded_write("insert", self.inner.insert(user)).await
    }

    async fn insert_all(&self, users: Vec<NewUser>) -> StoreResult<Vec<User>> {
        self.bounded_write("insert_all", self.inner.insert_all(users))
            .await
    }
}
