//! Database Schema Definitions
//!
//! Versioned schema for the local store. Each migration is a list of SQL
//! statements applied in one transaction; the applied version is recorded in
//! `schema_migrations`.

use crate::shared::error::SchemaError;

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// One schema step
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version reached once this migration is applied
    pub version: i32,
    pub statements: Vec<&'static str>,
}

impl Migration {
    pub fn new(version: i32, statements: &[&'static str]) -> Self {
        Self {
            version,
            statements: statements.to_vec(),
        }
    }
}

/// Compiled schema: target version plus every migration needed to reach it
#[derive(Debug, Clone)]
pub struct Schema {
    pub version: i32,
    pub migrations: Vec<Migration>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::current()
    }
}

impl Schema {
    /// Schema compiled into this build
    pub fn current() -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            migrations: vec![
                Migration::new(1, MIGRATION_1),
                Migration::new(2, MIGRATION_2),
            ],
        }
    }

    /// Check if database needs migration
    pub fn needs_migration(&self, on_disk: i32) -> bool {
        on_disk < self.version
    }

    /// Migrations to apply, in ascending order.
    ///
    /// Fails when the file is newer than this build or a step is missing.
    pub fn pending_migrations(&self, on_disk: i32) -> Result<Vec<&Migration>, SchemaError> {
        if on_disk > self.version {
            return Err(SchemaError::Downgrade {
                on_disk,
                compiled: self.version,
            });
        }

        let mut pending = Vec::new();
        for version in (on_disk + 1)..=self.version {
            let migration = self
                .migrations
                .iter()
                .find(|m| m.version == version)
                .ok_or(SchemaError::MissingMigration(version))?;
            pending.push(migration);
        }
        Ok(pending)
    }
}

/// Bookkeeping table, created before any migration runs
pub(crate) const SCHEMA_MIGRATIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
)";

const MIGRATION_1: &[&str] = &[
    "CREATE TABLE records (
        local_id TEXT PRIMARY KEY,
        table_name TEXT NOT NULL,
        server_id TEXT,
        payload TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        revision INTEGER NOT NULL DEFAULT 0,
        sync_state TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX idx_records_server_id ON records (table_name, server_id)",
    "CREATE TABLE trip_logs (
        trip_id TEXT PRIMARY KEY,
        server_id TEXT,
        payload TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        revision INTEGER NOT NULL DEFAULT 0,
        sync_state TEXT NOT NULL
    )",
    "CREATE TABLE trip_attachments (
        id TEXT PRIMARY KEY,
        trip_id TEXT NOT NULL REFERENCES trip_logs (trip_id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        file_name TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        data BLOB NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE credentials (
        identifier TEXT PRIMARY KEY,
        secret_hash TEXT NOT NULL,
        profile TEXT NOT NULL,
        server_id TEXT,
        sync_state TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE pending_signups (
        local_id TEXT PRIMARY KEY,
        identifier TEXT NOT NULL,
        form TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT
    )",
    "CREATE TABLE lookup_cache (
        kind TEXT NOT NULL,
        status_id TEXT NOT NULL,
        payload TEXT NOT NULL,
        fetched_at INTEGER NOT NULL,
        PRIMARY KEY (kind, status_id)
    )",
    "CREATE TABLE sync_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

const MIGRATION_2: &[&str] = &[
    "CREATE INDEX idx_records_state ON records (table_name, sync_state)",
    "CREATE INDEX idx_trip_logs_state ON trip_logs (sync_state)",
    "CREATE INDEX idx_trip_logs_timestamp ON trip_logs (timestamp)",
];
