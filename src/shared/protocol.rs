//! Sync Wire Format
//!
//! Request and response bodies for `GET /sync/pull` and `POST /sync/push`.
//!
//! A changeset is keyed by table name; each table lists created and updated
//! records plus the ids of deleted ones:
//!
//! ```json
//! {
//!   "changes": {
//!     "vehicles": {
//!       "created": [{ "id": "srv-1", "updated_at": 1700000000000, "plate": "AB-123" }],
//!       "updated": [],
//!       "deleted": ["srv-7"]
//!     }
//!   },
//!   "timestamp": 1700000000500
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Milliseconds since the Unix epoch
pub type Millis = i64;

/// Changes for every table, keyed by table name
pub type TableChanges = BTreeMap<String, TableChangeSet>;

/// Changes for one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableChangeSet {
    #[serde(default)]
    pub created: Vec<WireRecord>,
    #[serde(default)]
    pub updated: Vec<WireRecord>,
    /// Server ids of removed records
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl TableChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

/// A record as it travels over the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Server-assigned id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Client-assigned id, present on push so acks can be matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    /// Last modification time on the side that sent the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Millis>,
    /// Entity fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Body of a successful pull
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub changes: TableChanges,
    /// New cursor
    pub timestamp: Millis,
}

impl PullResponse {
    pub fn change_count(&self) -> usize {
        self.changes.values().map(TableChangeSet::len).sum()
    }
}

/// Body of a push
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub changes: TableChanges,
}

/// Acknowledgment for one pushed record.
///
/// Matched by `local_id` when present, else by server `id` (delete acks only
/// know the server id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushAck {
    #[serde(default)]
    pub local_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// Rejection for one pushed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRejection {
    #[serde(default)]
    pub local_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub reason: String,
}

/// Per-record outcome of a push
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub acks: Vec<PushAck>,
    #[serde(default)]
    pub rejected: Vec<PushRejection>,
}
