use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    NewUser, StoreError, StoreResult, User, UserStore, WriteDeadline, check_limit, parse_id,
};

/// Process-local store. One lock covers reads and writes.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    users: Vec<User>,
    last_id: u64,
}

impl Inner {
    fn push(&mut self, user: NewUser) -> User {
        self.last_id += 1;
        let stored = user.into_user(self.last_id);
        self.users.push(stored.clone());
        stored
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_page(&self, offset: u64, limit: u64) -> StoreResult<Vec<User>> {
        check_limit(limit)?;
        let inner = self.inner.lock().await;
        let len = inner.users.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
        let end = start
            .saturating_add(usize::try_from(limit).unwrap_or(usize::MAX))
            .min(len);
        Ok(inner.users[start..end].to_vec())
    }

    async fn get(&self, id: &str) -> StoreResult<User> {
        let wanted = parse_id(id)?.to_string();
        let inner = self.inner.lock().await;
        inner
            .users
            .iter()
            .find(|u| u.id == wanted)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_name(&self, name: &str) -> StoreResult<User> {
        let inner = self.inner.lock().await;
        inner
            .users
            .iter()
            .find(|u| u.name == name)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        let deadline = WriteDeadline::current();
        let mut inner = self.inner.lock().await;
        WriteDeadline::check(deadline)?;
        let existing = inner
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(StoreError::NotFound)?;
        existing.name = user.name.clone();
        existing.password_hash = user.password_hash.clone();
        Ok(())
    }

    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        let deadline = WriteDeadline::current();
        let mut inner = self.inner.lock().await;
        WriteDeadline::check(deadline)?;
        Ok(inner.push(user))
    }

    async fn insert_all(&self, users: Vec<NewUser>) -> StoreResult<Vec<User>> {
        let deadline = WriteDeadline::current();
        let mut inner = self.inner.lock().await;
        WriteDeadline::check(deadline)?;
        Ok(users.into_iter().map(|u| inner.push(u)).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    async fn seeded(n: usize) -> MemoryUserStore {
        let store = MemoryUserStore::new();
        for i in 0..n {
            store
                .insert(NewUser::new(format!("user{}", i), "hash"))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn ids_start_at_one() {
        let store = seeded(2).await;
        assert_eq!(store.get("1").await.unwrap().name, "user0");
        assert_eq!(store.get("2").await.unwrap().name, "user1");
    }

    #[tokio::test]
    async fn offset_past_end_is_empty() {
        let store = seeded(3).await;
        assert!(store.get_page(3, 10).await.unwrap().is_empty());
        assert!(store.get_page(u64::MAX, u64::MAX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_last_page() {
        let store = seeded(5).await;
        let page = store.get_page(3, 10).await.unwrap();
        let names: Vec<_> = page.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["user3", "user4"]);
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let store = seeded(1).await;
        let mut user = store.get("1").await.unwrap();
        user.name = "renamed".into();
        store.update(&user).await.unwrap();
        assert_eq!(store.get_by_name("renamed").await.unwrap().id, "1");

        user.id = "99".into();
        assert!(matches!(
            store.update(&user).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn parallel_inserts_keep_every_write() {
        let store = Arc::new(MemoryUserStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert(NewUser::new(format!("p{}", i), "h"))
                    .await
                    .unwrap()
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().id);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 32);
        assert_eq!(store.len().await, 32);
    }
}
