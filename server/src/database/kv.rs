use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::info;

use super::kv_schema::{self, Field, PageCursor};
use super::{
    NewUser, StoreError, StoreResult, User, UserStore, WriteDeadline, check_limit, parse_id,
};

const USERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("users");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");
const USER_SEQ: &str = "users_seq";

macro_rules! kv_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(err: $ty) -> Self {
                    StoreError::Kv(err.into())
                }
            }
        )*
    };
}

kv_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Embedded single-file store. Layout lives in [`kv_schema`].
///
/// redb allows one writer and many readers at a time, so writes need no
/// extra lock. Every call runs on the blocking pool.
#[derive(Clone)]
pub struct KvUserStore {
    db: Arc<Database>,
}

impl KvUserStore {
    /// Opens (or creates) the database file and both tables.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        {
            txn.open_table(USERS)?;
            txn.open_table(META)?;
        }
        txn.commit()?;
        info!("Opened key-value user store at {}", path.display());
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn read_user(db: &Database, seq: u64) -> StoreResult<Option<User>> {
    let txn = db.begin_read()?;
    let table = txn.open_table(USERS)?;
    let (lo, hi) = kv_schema::record_bounds(seq);
    let mut entries = Vec::with_capacity(Field::ALL.len());
    for entry in table.range(&lo[..]..=&hi[..])? {
        let (key, value) = entry?;
        entries.push((key.value().to_vec(), value.value().to_vec()));
    }
    Ok(kv_schema::decode_user(
        seq,
        entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())),
    )?)
}

/// Past `deadline` the transaction is dropped uncommitted, which leaves
/// neither the records nor the counter behind.
fn write_users(
    db: &Database,
    users: Vec<NewUser>,
    deadline: Option<WriteDeadline>,
) -> StoreResult<Vec<User>> {
    let txn = db.begin_write()?;
    let stored = {
        let mut meta = txn.open_table(META)?;
        let mut table = txn.open_table(USERS)?;
        let mut seq = meta.get(USER_SEQ)?.map(|v| v.value()).unwrap_or(0);
        let mut stored = Vec::with_capacity(users.len());
        for user in users {
            WriteDeadline::check(deadline)?;
            seq += 1;
            for (key, value) in kv_schema::encode_user(seq, &user.name, &user.password_hash) {
                table.insert(&key[..], &value[..])?;
            }
            stored.push(user.into_user(seq));
        }
        meta.insert(USER_SEQ, seq)?;
        stored
    };
    WriteDeadline::check(deadline)?;
    txn.commit()?;
    Ok(stored)
}

#[async_trait]
impl UserStore for KvUserStore {
    async fn get_page(&self, offset: u64, limit: u64) -> StoreResult<Vec<User>> {
        check_limit(limit)?;
        self.blocking(move |db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(USERS)?;
            let mut cursor = PageCursor::new(offset, limit);
            for entry in table.iter()? {
                let (key, value) = entry?;
                if !cursor.push(key.value(), value.value())? {
                    break;
                }
            }
            Ok(cursor.finish()?)
        })
        .await
    }

    async fn get(&self, id: &str) -> StoreResult<User> {
        let seq = parse_id(id)?;
        self.blocking(move |db| read_user(db, seq)?.ok_or(StoreError::NotFound))
            .await
    }

    async fn get_by_name(&self, name: &str) -> StoreResult<User> {
        let name = name.to_string();
        self.blocking(move |db| {
            let found = {
                let txn = db.begin_read()?;
                let table = txn.open_table(USERS)?;
                let mut found = None;
                for entry in table.iter()? {
                    let (key, value) = entry?;
                    let (seq, field) = kv_schema::split_key(key.value())?;
                    if field == Field::Name && value.value() == name.as_bytes() {
                        found = Some(seq);
                        break;
                    }
                }
                found
            };
            match found {
                Some(seq) => read_user(db, seq)?.ok_or(StoreError::NotFound),
                None => Err(StoreError::NotFound),
            }
        })
        .await
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        let seq = parse_id(&user.id)?;
        let user = user.clone();
        let deadline = WriteDeadline::current();
        self.blocking(move |db| {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(USERS)?;
                let exists = table
                    .get(&kv_schema::field_key(seq, Field::Id)[..])?
                    .is_some();
                if !exists {
                    return Err(StoreError::NotFound);
                }
                table.insert(
                    &kv_schema::field_key(seq, Field::Name)[..],
                    user.name.as_bytes(),
                )?;
                table.insert(
                    &kv_schema::field_key(seq, Field::Hash)[..],
                    user.password_hash.as_bytes(),
                )?;
            }
            WriteDeadline::check(deadline)?;
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        let deadline = WriteDeadline::current();
        let mut stored = self
            .blocking(move |db| write_users(db, vec![user], deadline))
            .await?;
        stored
            .pop()
            .ok_or_else(|| StoreError::Task("insert produced no record".to_string()))
    }

    async fn insert_all(&self, users: Vec<NewUser>) -> StoreResult<Vec<User>> {
        let deadline = WriteDeadline::current();
        self.blocking(move |db| write_users(db, users, deadline))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn open_temp() -> (tempfile::TempDir, KvUserStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvUserStore::open(dir.path().join("users.redb")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.redb");
        {
            let store = KvUserStore::open(&path).unwrap();
            store.insert(NewUser::new("alice", "h1")).await.unwrap();
            store.insert(NewUser::new("bob", "h2")).await.unwrap();
        }
        let store = KvUserStore::open(&path).unwrap();
        let bob = store.get("2").await.unwrap();
        assert_eq!(bob.name, "bob");
        assert_eq!(bob.password_hash, "h2");

        // the counter is persisted too
        let carol = store.insert(NewUser::new("carol", "h3")).await.unwrap();
        assert_eq!(carol.id, "3");
    }

    #[tokio::test]
    async fn lookups() {
        let (_dir, store) = open_temp();
        store
            .insert_all(vec![NewUser::new("a", "1"), NewUser::new("b", "2")])
            .await
            .unwrap();
        assert_eq!(store.get_by_name("b").await.unwrap().id, "2");
        assert!(matches!(
            store.get_by_name("zed").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(store.get("7").await, Err(StoreError::NotFound)));
        assert!(matches!(store.get("x").await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn update_overwrites_fields() {
        let (_dir, store) = open_temp();
        let mut user = store.insert(NewUser::new("old", "h")).await.unwrap();
        user.name = "new".into();
        user.password_hash = "h2".into();
        store.update(&user).await.unwrap();
        let fetched = store.get(&user.id).await.unwrap();
        assert_eq!(fetched, user);

        user.id = "40".into();
        assert!(matches!(
            store.update(&user).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn expired_write_leaves_nothing_behind() {
        let (_dir, store) = open_temp();
        let users = (0..500)
            .map(|i| NewUser::new(format!("u{}", i), "h"))
            .collect();

        let result = WriteDeadline::new(Duration::ZERO)
            .scope(store.insert_all(users))
            .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
        assert!(store.get_page(0, 1000).await.unwrap().is_empty());

        // the sequence counter was rolled back with the records
        let next = store.insert(NewUser::new("after", "h")).await.unwrap();
        assert_eq!(next.id, "1");
    }

    #[tokio::test]
    async fn expired_update_keeps_old_values() {
        let (_dir, store) = open_temp();
        let mut user = store.insert(NewUser::new("old", "h")).await.unwrap();
        user.name = "new".into();

        let result = WriteDeadline::new(Duration::ZERO)
            .scope(store.update(&user))
            .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
        assert_eq!(store.get(&user.id).await.unwrap().name, "old");
    }
}
