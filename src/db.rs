//! Storage pool construction.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Build the connection pool for the storefront database.
///
/// WAL keeps concurrent checkout transactions from starving readers; the
/// busy timeout lets a losing writer wait for the winner's commit instead
/// of failing immediately.
pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
}

/// In-memory pool with the canonical migrations applied, for tests.
///
/// A single connection keeps the `:memory:` database alive and shared
/// across the whole test.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

/// In-memory pool with no tables at all, for legacy-schema fixtures.
#[cfg(test)]
pub(crate) async fn bare_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite")
}
