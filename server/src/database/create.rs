use sqlx::SqlitePool;
use tracing::info;

/// Current schema version. Bump this whenever the schema changes and add a
/// corresponding step in `run_migrations`.
const SCHEMA_VERSION: i64 = 1;

/// Initialize the database schema and run any pending migrations.
pub async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let current = schema_version(pool).await?;
    if current == 0 {
        create_schema(pool).await?;
    }
    run_migrations(pool, current).await
}

pub async fn schema_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("PRAGMA user_version")
        .fetch_one(pool)
        .await
}

async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Username is indexed but not unique; registration checks for duplicates.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS Users (
            Id       INTEGER PRIMARY KEY AUTOINCREMENT,
            Username TEXT    NOT NULL,
            Hash     TEXT    NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_username ON Users(Username)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Uses `PRAGMA user_version` as the migration counter.
async fn run_migrations(pool: &SqlitePool, current: i64) -> Result<(), sqlx::Error> {
    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    info!(
        "Database schema at version {}; target version {}",
        current, SCHEMA_VERSION
    );

    // PRAGMA does not take bound parameters.
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(pool)
        .await?;

    info!("Schema version set to {}.", SCHEMA_VERSION);
    Ok(())
}
