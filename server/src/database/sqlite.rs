use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, SqliteConnection};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use super::conn_lock::ConnectionLocks;
use super::create::create_tables;
use super::{
    NewUser, StoreError, StoreResult, User, UserStore, WriteDeadline, check_limit, parse_id,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    hash: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id.to_string(),
            name: row.username,
            password_hash: row.hash,
        }
    }
}

const SELECT_USER: &str = "SELECT Id AS id, Username AS username, Hash AS hash FROM Users";

/// Relational store on SQLite.
///
/// Reads use the pool directly. Writes and transaction starts take the
/// process-wide lock for this connection string first.
pub struct SqliteUserStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteUserStore {
    /// `conn` is a sqlx connection string, e.g. `sqlite://data/users.db`.
    pub async fn open(conn: &str, max_connections: u32, locks: &ConnectionLocks) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(conn)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            write_lock: locks.lock_for(conn),
        };

        {
            let _guard = store.write_lock.lock().await;
            create_tables(&store.pool).await?;
        }

        info!("Opened sqlite user store at {}", conn);
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn begin(&self) -> Result<WriteTx, sqlx::Error> {
        WriteTx::begin(&self.pool, &self.write_lock).await
    }
}

/// An explicit `BEGIN IMMEDIATE` transaction holding the write lock.
///
/// Dropped without `commit`/`rollback` (an early return or a cancelled
/// future), the connection is closed instead of going back to the pool,
/// which makes SQLite discard the open transaction.
struct WriteTx {
    conn: PoolConnection<Sqlite>,
    finished: bool,
    _guard: OwnedMutexGuard<()>,
}

impl WriteTx {
    async fn begin(pool: &SqlitePool, lock: &Arc<Mutex<()>>) -> Result<Self, sqlx::Error> {
        let guard = lock.clone().lock_owned().await;
        let conn = pool.acquire().await?;
        // Built before BEGIN so a cancelled start still closes the connection.
        let mut tx = Self {
            conn,
            finished: false,
            _guard: guard,
        };
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *tx.conn).await?;
        Ok(tx)
    }

    fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    async fn commit(mut self) -> Result<(), sqlx::Error> {
        match sqlx::query("COMMIT").execute(&mut *self.conn).await {
            Ok(_) => {
                self.finished = true;
                Ok(())
            }
            Err(commit_err) => {
                error!("Commit failed: {}", commit_err);
                self.rollback_after_failure().await;
                Err(commit_err)
            }
        }
    }

    /// Best effort. A failed rollback is logged, never returned: the caller
    /// already has the original error.
    async fn rollback_after_failure(&mut self) {
        match sqlx::query("ROLLBACK").execute(&mut *self.conn).await {
            Ok(_) => self.finished = true,
            Err(rollback_err) => {
                warn!("Rollback failed: {}", rollback_err);
            }
        }
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Transaction dropped before completion; closing its connection");
            self.conn.close_on_drop();
        }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn get_page(&self, offset: u64, limit: u64) -> StoreResult<Vec<User>> {
        check_limit(limit)?;
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "{} ORDER BY Id LIMIT ?1 OFFSET ?2",
            SELECT_USER
        ))
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn get(&self, id: &str) -> StoreResult<User> {
        let id = i64::try_from(parse_id(id)?).map_err(|_| StoreError::NotFound)?;
        sqlx::query_as::<_, UserRow>(&format!("{} WHERE Id = ?1", SELECT_USER))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::from)
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_name(&self, name: &str) -> StoreResult<User> {
        sqlx::query_as::<_, UserRow>(&format!(
            "{} WHERE Username = ?1 ORDER BY Id LIMIT 1",
            SELECT_USER
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .map(User::from)
        .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        let id = i64::try_from(parse_id(&user.id)?).map_err(|_| StoreError::NotFound)?;
        let deadline = WriteDeadline::current();
        let _guard = self.write_lock.lock().await;
        WriteDeadline::check(deadline)?;
        let result = sqlx::query("UPDATE Users SET Username = ?1, Hash = ?2 WHERE Id = ?3")
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        let deadline = WriteDeadline::current();
        let _guard = self.write_lock.lock().await;
        WriteDeadline::check(deadline)?;
        let result = sqlx::query("INSERT INTO Users (Username, Hash) VALUES (?1, ?2)")
            .bind(&user.name)
            .bind(&user.password_hash)
            .execute(&self.pool)
            .await?;
        Ok(user.into_user(result.last_insert_rowid()))
    }

    async fn insert_all(&self, users: Vec<NewUser>) -> StoreResult<Vec<User>> {
        let deadline = WriteDeadline::current();
        let mut tx = self.begin().await?;
        let mut stored = Vec::with_capacity(users.len());
        for user in users {
            let inserted = sqlx::query("INSERT INTO Users (Username, Hash) VALUES (?1, ?2)")
                .bind(&user.name)
                .bind(&user.password_hash)
                .execute(tx.conn())
                .await;
            match inserted {
                Ok(result) => stored.push(user.into_user(result.last_insert_rowid())),
                Err(err) => {
                    error!("Batch insert failed after {} rows: {}", stored.len(), err);
                    tx.rollback_after_failure().await;
                    return Err(StoreError::Sqlite(err));
                }
            }
        }
        if let Err(late) = WriteDeadline::check(deadline) {
            warn!("Batch insert of {} rows abandoned: {}", stored.len(), late);
            tx.rollback_after_failure().await;
            return Err(late);
        }
        tx.commit().await?;
        Ok(stored)
    }
}
