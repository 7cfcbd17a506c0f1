//! Local store on disk: persistence and schema versioning

use crate::common::file_db;
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use tripsync::client::local_db::{LocalDatabase, Predicate, Schema, StoreOptions, CURRENT_SCHEMA_VERSION};
use tripsync::client::sync::SyncState;
use tripsync::shared::error::{SchemaError, StoreError};

fn first_version_only() -> Schema {
    let current = Schema::current();
    Schema {
        version: 1,
        migrations: current.migrations.into_iter().filter(|m| m.version == 1).collect(),
    }
}

#[tokio::test]
async fn test_records_and_cursor_persist() {
    let dir = TempDir::new().unwrap();
    {
        let db = file_db(&dir).await;
        let handle = db.create("vehicles", json!({ "plate": "AB-123" })).await.unwrap();
        db.update::<Value, _>(&handle, |fields| fields["plate"] = json!("AB-124"))
            .await
            .unwrap();
        db.set_last_pulled_at(4242).await.unwrap();
        db.close().await;
    }

    let db = file_db(&dir).await;
    assert_eq!(db.schema_version().await.unwrap(), CURRENT_SCHEMA_VERSION);
    assert_eq!(db.last_pulled_at().await.unwrap(), Some(4242));

    let rows = db
        .query::<Value>("vehicles", &Predicate::field_eq("plate", "AB-124"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sync_state, SyncState::Pending);
}

#[tokio::test]
async fn test_older_file_is_migrated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("local.db");
    {
        let db = LocalDatabase::open(StoreOptions::file(&path).with_schema(first_version_only()))
            .await
            .unwrap();
        assert_eq!(db.schema_version().await.unwrap(), 1);
        db.close().await;
    }

    let db = file_db(&dir).await;
    assert_eq!(db.schema_version().await.unwrap(), CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_newer_file_is_refused() {
    let dir = TempDir::new().unwrap();
    file_db(&dir).await.close().await;

    let path = dir.path().join("local.db");
    let result = LocalDatabase::open(StoreOptions::file(&path).with_schema(first_version_only())).await;
    assert_matches!(
        result,
        Err(StoreError::Schema(SchemaError::Downgrade { on_disk, compiled: 1 })) if on_disk == CURRENT_SCHEMA_VERSION
    );
}

#[tokio::test]
async fn test_missing_migration_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("local.db");
    let gap = Schema {
        version: CURRENT_SCHEMA_VERSION,
        migrations: Vec::new(),
    };

    let result = LocalDatabase::open(StoreOptions::file(&path).with_schema(gap)).await;
    assert_matches!(result, Err(StoreError::Schema(SchemaError::MissingMigration(1))));
}
