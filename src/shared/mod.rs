//! Shared Module
//!
//! Types shared by every part of the sync core: error enums, configuration,
//! and the wire format exchanged with the remote authority.
//!
//! All wire types are plain serde structs so they can be reused by a server
//! implementation or by test doubles.

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Pull/push wire format
pub mod protocol;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::{AuthError, LocationError, RemoteError, SchemaError, StoreError, SyncError};
pub use protocol::{Millis, PullResponse, PushAck, PushRejection, PushRequest, PushResponse, TableChangeSet, TableChanges, WireRecord};
