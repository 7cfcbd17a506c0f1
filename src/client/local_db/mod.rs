//! # Local Database Module
//!
//! Local SQLite storage for offline-first operation. Every UI mutation is
//! written here first; the sync service later reconciles the tables with the
//! remote authority.
//!
//! ## Architecture
//!
//! - **Generic records**: entity tables exchanged through pull/push
//! - **Trip logs**: the telemetry queue with binary attachments
//! - **Credentials**: offline login cache and signup backlog
//! - **Lookup cache**: reference tables read while offline
//! - **Sync metadata**: the pull cursor and other key/value state
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool and schema management
//! - `schema.rs`: versioned migrations
//! - `codec.rs`: the single JSON boundary for payloads
//! - `query.rs`: predicates for record queries
//! - `records.rs`, `trips.rs`, `credentials.rs`, `lookups.rs`, `sync.rs`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tripsync::client::local_db::{LocalDatabase, Predicate};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), tripsync::shared::StoreError> {
//! let db = LocalDatabase::new().await?;
//! let handle = db.create("vehicles", json!({ "plate": "AB-123" })).await?;
//! let pending = db
//!     .query::<serde_json::Value>("vehicles", &Predicate::field_eq("plate", "AB-123"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod credentials;
pub mod lookups;
pub mod query;
pub mod records;
pub mod schema;
pub mod sync;
pub mod trips;

pub use codec::{Entity, LocalRecord, RecordHandle};
pub use credentials::{CachedCredential, PendingSignup};
pub use query::{Field, Predicate, SqlValue};
pub use records::{AckApplied, ApplyReport};
pub use schema::{Migration, Schema, CURRENT_SCHEMA_VERSION};
pub use trips::{AttachmentKind, TripAttachment, TripPayload, TripRecord};

use crate::shared::error::{SchemaError, StoreError};
use crate::shared::protocol::Millis;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Result type for local database operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Where the database lives
#[derive(Debug, Clone)]
pub enum StoreLocation {
    /// Platform data directory
    Default,
    /// Explicit file
    File(PathBuf),
    /// Private in-memory database (tests, previews)
    Memory,
}

/// Options for [`LocalDatabase::open`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub location: StoreLocation,
    pub schema: Schema,
}

impl StoreOptions {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            schema: Schema::current(),
        }
    }

    pub fn memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            schema: Schema::current(),
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            location: StoreLocation::Default,
            schema: Schema::current(),
        }
    }
}

/// Local database connection manager
///
/// Manages the SQLite connection pool. A value of this type only exists once
/// the on-disk schema matches the compiled one.
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open the default database file with the compiled schema
    pub async fn new() -> Result<Self> {
        Self::open(StoreOptions::default()).await
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> Result<Self> {
        Self::open(StoreOptions::memory()).await
    }

    /// Open or create the database and bring its schema up to date.
    ///
    /// Returns `StoreError::Schema` if the file is newer than this build or a
    /// migration is missing or fails.
    pub async fn open(options: StoreOptions) -> Result<Self> {
        let pool = match &options.location {
            StoreLocation::Memory => {
                // Every connection to :memory: is a separate database
                let connect = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(connect)
                    .await?
            }
            StoreLocation::Default => Self::connect_file(&Self::get_db_path()).await?,
            StoreLocation::File(path) => Self::connect_file(path).await?,
        };

        let db = Self { pool };
        db.run_migrations(&options.schema).await?;
        Ok(db)
    }

    async fn connect_file(path: &Path) -> Result<SqlitePool> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let connect = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .pragma("cache_size", "1000")
            .pragma("temp_store", "MEMORY");

        tracing::debug!(path = %path.display(), "opening local database");
        Ok(SqlitePoolOptions::new().connect_with(connect).await?)
    }

    /// Get database file path
    ///
    /// Uses the system's data directory when available.
    pub fn get_db_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("tripsync");
        path.push("local.db");
        path
    }

    /// Schema version recorded in the file
    pub async fn schema_version(&self) -> Result<i32> {
        let (version,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        Ok(version as i32)
    }

    /// Run database migrations
    ///
    /// Checks the current schema version and applies any pending migrations,
    /// each in its own transaction.
    async fn run_migrations(&self, schema: &Schema) -> Result<()> {
        sqlx::query(schema::SCHEMA_MIGRATIONS_TABLE)
            .execute(&self.pool)
            .await?;

        let on_disk = self.schema_version().await?;
        let pending = schema.pending_migrations(on_disk)?;
        if pending.is_empty() {
            return Ok(());
        }

        tracing::info!(
            from = on_disk,
            to = schema.version,
            "migrating local database"
        );

        for migration in pending {
            self.apply_migration(migration)
                .await
                .map_err(|source| SchemaError::MigrationFailed {
                    version: migration.version,
                    source,
                })?;
        }
        Ok(())
    }

    async fn apply_migration(&self, migration: &Migration) -> std::result::Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for statement in &migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(migration.version)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let (record_count, pending_records): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(sync_state != 'synced'), 0) FROM records",
        )
        .fetch_one(&self.pool)
        .await?;

        let (trip_count, pending_trips): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(sync_state != 'synced'), 0) FROM trip_logs",
        )
        .fetch_one(&self.pool)
        .await?;

        let (pending_signups,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_signups")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            record_count: record_count as u64,
            pending_records: pending_records as u64,
            trip_count: trip_count as u64,
            pending_trips: pending_trips as u64,
            pending_signups: pending_signups as u64,
        })
    }

    /// Close the pool, flushing the WAL
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Current time in epoch milliseconds
pub fn now_millis() -> Millis {
    chrono::Utc::now().timestamp_millis()
}

/// Next `updated_at` for a row: the wall clock, but always past `previous`
pub(crate) fn next_timestamp(previous: Option<Millis>) -> Millis {
    let now = now_millis();
    match previous {
        Some(previous) if previous >= now => previous + 1,
        _ => now,
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Generic entity rows
    pub record_count: u64,
    /// Generic rows in `pending` or `deleted`
    pub pending_records: u64,
    pub trip_count: u64,
    /// Trips awaiting upload or delete acknowledgment
    pub pending_trips: u64,
    pub pending_signups: u64,
}

impl DatabaseStats {
    /// Total unacknowledged local mutations
    pub fn total_pending(&self) -> u64 {
        self.pending_records + self.pending_trips + self.pending_signups
    }
}
