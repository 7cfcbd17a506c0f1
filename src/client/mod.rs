//! Offline-First Client Module
//!
//! Everything that runs on the device: the local store the UI reads and
//! writes, and the services that reconcile it with the backend.
//!
//! # Architecture
//!
//! - **`local_db`** - Local SQLite store (records, trips, credentials, lookups)
//! - **`sync`** - Record lifecycle, connectivity monitor, sync cycle
//! - **`remote`** - HTTP client and the transport traits
//! - **`offline`** - Trip queue and multipart uploader
//! - **`location`** - Adaptive position sampler
//! - **`local_auth`** / **`auth`** - Credential cache and login with fallback
//! - **`config`** - Loaded settings plus the session token
//! - **`types`** - Auth and lookup bodies
//!
//! # Module Structure
//!
//! ```text
//! client/
//! ├── mod.rs        - Module exports and documentation
//! ├── main.rs       - tripsync-agent entry point
//! ├── config.rs     - Settings and token storage
//! ├── types.rs      - Request/response bodies
//! ├── remote.rs     - HTTP transport
//! ├── auth.rs       - Online login with offline fallback
//! ├── local_auth.rs - Credential cache and signup backlog
//! ├── local_db/     - SQLite store
//! ├── location/     - Position sampler
//! ├── offline/      - Trip queue and uploader
//! └── sync/         - Sync engine and coordinator
//! ```

pub mod auth;
pub mod config;
pub mod local_auth;
pub mod local_db;
pub mod location;
pub mod offline;
pub mod remote;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use auth::{AuthMode, AuthService, Session};
pub use config::Config;
pub use local_auth::LocalAuth;
pub use local_db::LocalDatabase;
pub use location::LocationTracker;
pub use offline::{TripQueue, TripUploader};
pub use remote::{HttpTransport, RemoteApi};
pub use sync::{AutoSync, NetworkMonitor, SyncCoordinator};
pub use types::{LookupEntry, Profile, SignupForm};
