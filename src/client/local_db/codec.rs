//! Payload codec
//!
//! The only place where record payloads cross between typed Rust values and
//! the JSON text stored in SQLite. Call sites work with `LocalRecord<T>`.

use crate::client::sync::sync_state::SyncState;
use crate::shared::protocol::Millis;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// A typed entity stored in the generic `records` table
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    /// Remote table name, as used in pull/push changesets
    const TABLE: &'static str;
}

/// Addresses one row of a local table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordHandle {
    pub table: String,
    pub local_id: Uuid,
}

/// A row of a local table with its sync metadata
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord<T> {
    pub local_id: Uuid,
    pub table: String,
    /// Assigned by the remote authority after the first successful push
    pub server_id: Option<String>,
    pub payload: T,
    pub updated_at: Millis,
    /// Incremented on every local mutation
    pub revision: i64,
    pub sync_state: SyncState,
}

impl<T> LocalRecord<T> {
    pub fn handle(&self) -> RecordHandle {
        RecordHandle {
            table: self.table.clone(),
            local_id: self.local_id,
        }
    }
}

/// Raw row as read from the `records` table
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub local_id: String,
    pub table_name: String,
    pub server_id: Option<String>,
    pub payload: String,
    pub updated_at: i64,
    pub revision: i64,
    pub sync_state: String,
}

impl RecordRow {
    /// Decode into a typed record. Errors describe why the row is unusable.
    pub fn decode<T: DeserializeOwned>(self) -> Result<LocalRecord<T>, String> {
        let local_id = Uuid::parse_str(&self.local_id)
            .map_err(|e| format!("bad local id '{}': {e}", self.local_id))?;
        let sync_state = self.sync_state.parse::<SyncState>()?;
        let payload = decode::<T>(&self.payload).map_err(|e| e.to_string())?;
        Ok(LocalRecord {
            local_id,
            table: self.table_name,
            server_id: self.server_id,
            payload,
            updated_at: self.updated_at,
            revision: self.revision,
            sync_state,
        })
    }
}

/// Serialize a payload. Payloads must be JSON objects so fields can be queried.
pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => serde_json::to_string(&map),
        other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
            "payload must be a JSON object, got {}",
            kind_of(&other)
        ))),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(text)
}

/// Decode a payload into an untyped field map
pub(crate) fn decode_fields(text: &str) -> Result<Map<String, Value>, serde_json::Error> {
    serde_json::from_str(text)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
