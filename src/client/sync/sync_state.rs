//! # Sync State Management
//!
//! Per-record lifecycle plus the cycle-level status published to the UI.
//!
//! ## Record lifecycle
//!
//! ```text
//!            local edit                 ack
//!   (new) ─────────────▶ Pending ─────────────▶ Synced
//!                          │  ▲                   │
//!                 delete   │  └──── local edit ───┘
//!                          ▼
//!                       Deleted ──── ack ────▶ (purged)
//! ```
//!
//! A tombstone is never physically removed until the remote side has
//! acknowledged the delete, so deletions made offline are replayed.

use crate::client::sync::network_monitor::NetworkStatus;
use crate::client::sync::CycleReport;
use crate::shared::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sync lifecycle of one local record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local mutation not yet acknowledged
    Pending,
    /// Matches the remote authority
    Synced,
    /// Tombstone awaiting a delete acknowledgment
    Deleted,
}

/// What the store must do after a server acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Keep the row as `Synced`
    Synced,
    /// The delete was acknowledged; remove the row
    Purge,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Deleted => "deleted",
        }
    }

    /// Transition for a local mutation
    pub fn mark_pending(self) -> Result<SyncState, StoreError> {
        match self {
            SyncState::Pending | SyncState::Synced => Ok(SyncState::Pending),
            SyncState::Deleted => Err(StoreError::InvalidTransition {
                from: self.as_str(),
                to: SyncState::Pending.as_str(),
            }),
        }
    }

    /// Transition for a local delete request. Always allowed.
    pub fn mark_deleted(self) -> SyncState {
        SyncState::Deleted
    }

    /// Transition for a server acknowledgment
    pub fn mark_synced(self) -> Result<AckOutcome, StoreError> {
        match self {
            SyncState::Pending => Ok(AckOutcome::Synced),
            SyncState::Deleted => Ok(AckOutcome::Purge),
            SyncState::Synced => Err(StoreError::InvalidTransition {
                from: self.as_str(),
                to: SyncState::Synced.as_str(),
            }),
        }
    }

    /// Whether the record belongs in the next push
    pub fn needs_push(self) -> bool {
        matches!(self, SyncState::Pending | SyncState::Deleted)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "synced" => Ok(SyncState::Synced),
            "deleted" => Ok(SyncState::Deleted),
            other => Err(format!("unknown sync state '{other}'")),
        }
    }
}

/// Snapshot of the sync service published to the UI
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub is_syncing: bool,
    /// RFC 3339 time of the last completed cycle
    pub last_sync: Option<String>,
    pub network_status: NetworkStatus,
    /// The last cycle stopped on a rejected credential
    pub reauth_required: bool,
    pub pending_records: usize,
    pub errors: Vec<String>,
    pub last_report: Option<CycleReport>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            is_syncing: false,
            last_sync: None,
            network_status: NetworkStatus::Offline,
            reauth_required: false,
            pending_records: 0,
            errors: Vec::new(),
            last_report: None,
        }
    }
}
