//! tripsync - Offline-First Sync Core
//!
//! The sync core of a field client that logs trips, positions and reference
//! data. The client works entirely against a local SQLite store while
//! connectivity comes and goes, then reconciles that store with the backend
//! without losing or duplicating mutations.
//!
//! # Module Structure
//!
//! - **`shared`** - Types with no device state
//!   - Error enums, configuration, pull/push wire format
//!
//! - **`client`** - Everything that runs on the device
//!   - Local store and record sync states
//!   - Pull/push engine and sync coordinator
//!   - Connectivity monitor and reachability probe
//!   - Trip queue with multipart uploader
//!   - Adaptive location sampler
//!   - Offline login and signup backlog
//!
//! # Data Flow
//!
//! ```text
//! UI mutation ──▶ local store (pending / deleted)
//!                      │
//!   back online ──▶ pull ─▶ push ─▶ trip drain ─▶ signup replay ─▶ lookups
//!                      │
//!                 acks flip records to synced; the UI reads only the store
//! ```
//!
//! # Sync Protocol
//!
//! - `GET /sync/pull?lastPulledAt=` returns every change since the cursor;
//!   the changes and the new cursor are applied in one transaction
//! - `POST /sync/push` sends pending records and tombstones; the response
//!   acknowledges or rejects each record
//! - Conflicts are resolved last-writer-wins per record
//!
//! # Thread Safety
//!
//! - The store is a `sqlx` pool and can be cloned freely
//! - Published state (network status, sync status, motion class) travels over
//!   `tokio::sync::watch` channels with a single writer each
//!
//! # Error Handling
//!
//! Each layer has its own `thiserror` enum in `shared::error`. Transport
//! failures are "retry later"; rejected credentials are "re-authenticate".

/// Shared types and data structures
pub mod shared;

/// Device-side store and sync services
pub mod client;
