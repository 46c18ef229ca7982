//! Persistent storage for the single `accounts` table (spec.md §9).
//!
//! Grounded on the teacher's `db::Database` connection-pool wrapper
//! (SQLite via `sqlx`, embedded migration, `:memory:` support for tests) —
//! narrowed to the one table this core's scope actually owns.

mod accounts;

pub use accounts::{AccountRepository, AccountRow, SanitizedAccount, VerifyOutcome};

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("account already exists: {0}")]
    AccountExists(String),
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            let options = SqliteConnectOptions::new().filename("file::memory:").shared_cache(true).create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        tracing::warn!(path = %parent.display(), error = %e, "failed to create database directory");
                    }
                }
            }
            let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "database connected");
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// spec.md §9: `accounts(id INT, name VARCHAR COLLATE NOCASE, password
    /// VARCHAR, encrypt VARCHAR, created UINT, cserver VARCHAR, csid INT,
    /// updated UINT, userver VARCHAR, usid INT)`.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id       INTEGER PRIMARY KEY,
                name     VARCHAR COLLATE NOCASE UNIQUE NOT NULL,
                password VARCHAR NOT NULL,
                encrypt  VARCHAR NOT NULL,
                created  INTEGER NOT NULL,
                cserver  VARCHAR NOT NULL,
                csid     INTEGER NOT NULL,
                updated  INTEGER NOT NULL,
                userver  VARCHAR NOT NULL,
                usid     INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}
