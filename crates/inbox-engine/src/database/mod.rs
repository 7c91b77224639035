//! # Inbox Database (sqlx + SQLite)
//!
//! The relational store behind the inbox: agent presence, teams and their
//! assignment configuration, shifts, sessions, resolutions and the transfer
//! log. It is the single source of truth for conversation state.
//!
//! ## Concurrency
//!
//! Every session status transition is a single conditional `UPDATE` whose
//! `WHERE` clause carries the precondition that was read (status, assignee,
//! row version). `rows_affected()` decides whether the caller won. Side
//! effects that must commit together with the transition (rotation cursor,
//! resolution record, transfer log row) run in the same transaction, and the
//! conditional write is always the first statement of that transaction so a
//! SQLite writer never has to upgrade a read snapshot.
//!
//! ```rust,no_run
//! use inbox_engine::database::DatabaseManager;
//!
//! # async fn example() -> inbox_engine::Result<()> {
//! let db = DatabaseManager::new("sqlite://inbox.db?mode=rwc").await?;
//! assert!(db.health_check().await?);
//! # Ok(())
//! # }
//! ```

mod agents;
mod resolutions;
mod sessions;
mod teams;

pub use resolutions::ResolutionWrite;
pub use sessions::{ClaimRequest, TransferWrite};

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::error::{InboxError, Result};

/// Main database manager using sqlx for async operations
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Create a database manager with default pool settings and run migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_config(&DatabaseConfig {
            url: database_url.to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    /// Create a database manager from the `[database]` configuration section
    pub async fn with_config(config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Initializing inbox database: {}", config.url);

        let options = SqliteConnectOptions::from_str(&config.url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| InboxError::database(format!("failed to connect to database: {}", e)))?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("✅ Inbox database initialized (WAL mode enabled)");
        Ok(Self { pool })
    }

    /// Create an in-memory database for testing
    ///
    /// The pool holds a single connection: every handle must see the same
    /// in-memory database.
    pub async fn new_in_memory() -> Result<Self> {
        info!("🗄️ Creating in-memory inbox database");

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("✅ In-memory inbox database ready");
        Ok(Self { pool })
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute a health check query
    pub async fn health_check(&self) -> Result<bool> {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => {
                debug!("💚 Database health check passed");
                Ok(true)
            }
            Err(e) => {
                error!("❌ Database health check failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Tenants that have at least one enabled assignment configuration
    pub async fn tenants_with_enabled_assignment(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT tenant_id FROM assignment_configs WHERE enabled = 1 ORDER BY tenant_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(tenant,)| tenant).collect())
    }
}

/// Parse a TEXT column holding one of our snake_case enum labels
pub(crate) fn parse_column<T>(value: &str, column: &str) -> Result<T>
where
    T: FromStr<Err = InboxError>,
{
    T::from_str(value)
        .map_err(|_| InboxError::database(format!("unexpected value '{}' in column {}", value, column)))
}
