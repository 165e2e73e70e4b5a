//! Database connection and repositories

pub mod players;
pub mod users;

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

pub use players::{PlayerPatch, PlayerRecord, PlayerRepository};
pub use users::{UserRecord, UsersRepository};

/// A write collided with an existing unique key (username or player name)
#[derive(Debug, thiserror::Error)]
#[error("'{0}' already exists")]
pub struct AlreadyExists(pub String);

/// Turn a unique-constraint failure into [`AlreadyExists`]; other errors pass through
pub(crate) fn unique_violation(err: sqlx::Error, key: &str) -> anyhow::Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return AlreadyExists(key.to_string()).into();
        }
    }
    err.into()
}

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new database connection pool
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Private in-memory database with the schema applied.
    ///
    /// A single connection keeps every query on the same memory database.
    pub async fn in_memory() -> Result<Self> {
        let db = Self::connect("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a users repository
    pub fn users(&self) -> UsersRepository {
        UsersRepository::new(self.pool.clone())
    }

    /// Get a players repository
    pub fn players(&self) -> PlayerRepository {
        PlayerRepository::new(self.pool.clone())
    }

    /// Check connectivity
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Create tables that do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY NOT NULL,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                name TEXT PRIMARY KEY NOT NULL,
                position TEXT NOT NULL,
                age INTEGER NOT NULL,
                experience INTEGER NOT NULL,
                season TEXT NOT NULL,
                points REAL NOT NULL,
                threept REAL NOT NULL,
                rebounds REAL NOT NULL,
                assists REAL NOT NULL,
                steals REAL NOT NULL,
                blocks REAL NOT NULL,
                turnovers REAL NOT NULL,
                mp REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
