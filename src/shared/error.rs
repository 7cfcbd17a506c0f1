//! Shared Error Types
//!
//! Error types for every layer of the sync core. Each layer has its own enum so
//! callers can tell apart failures that should be retried later from failures
//! that need user action.
//!
//! # Error Categories
//!
//! - `StoreError` / `SchemaError` - local SQLite store failures
//! - `RemoteError` - HTTP transport and protocol failures
//! - `AuthError` - online and offline authentication failures
//! - `LocationError` - position watch failures
//! - `SyncError` - reasons a whole sync cycle was aborted
//!
//! # Usage
//!
//! ```rust
//! use tripsync::shared::error::RemoteError;
//!
//! let error = RemoteError::auth("token expired");
//! assert!(error.is_auth());
//! assert!(!error.is_offline());
//! ```
use thiserror::Error;

/// Failures raised while opening or migrating the local store.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The file on disk was written by a newer build
    #[error("on-disk schema version {on_disk} is newer than compiled version {compiled}")]
    Downgrade {
        /// Version recorded in the database file
        on_disk: i32,
        /// Version compiled into this build
        compiled: i32,
    },

    /// A migration needed to reach the compiled version is not registered
    #[error("no migration registered for schema version {0}")]
    MissingMigration(i32),

    /// A migration statement failed; the transaction was rolled back
    #[error("migration to version {version} failed: {source}")]
    MigrationFailed {
        /// Target version of the failed migration
        version: i32,
        /// Underlying database error
        #[source]
        source: sqlx::Error,
    },
}

/// Local store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database driver error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema version mismatch at open time
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Payload could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// File system error while preparing the database location
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No row matched the given handle
    #[error("{table} record {id} not found")]
    NotFound {
        /// Table the lookup ran against
        table: String,
        /// Local id that was looked up
        id: String,
    },

    /// A lifecycle transition the state machine does not allow
    #[error("invalid sync state transition: {from} -> {to}")]
    InvalidTransition {
        /// State the record was in
        from: &'static str,
        /// State that was requested
        to: &'static str,
    },
}

impl StoreError {
    /// Create a new not-found error
    pub fn not_found(table: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            table: table.into(),
            id: id.to_string(),
        }
    }
}

/// Errors from the remote authority
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// No connectivity, DNS failure, connection reset or timeout. Retry later.
    #[error("offline: {0}")]
    Offline(String),

    /// Credential rejected (401/403). Re-authenticate before retrying.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Any other non-2xx response
    #[error("server returned {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// 2xx response whose body could not be parsed
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The server refused one record of a batch
    #[error("record rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Create a new offline error
    pub fn offline(message: impl Into<String>) -> Self {
        Self::Offline(message.into())
    }

    /// Create a new authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create a new server error
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Create a new malformed response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Whether the caller must re-authenticate instead of retrying
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Whether the failure is a connectivity problem
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline(_))
    }

    /// Map a non-success HTTP status to the matching variant
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::Auth(message.into()),
            _ => Self::server(status, message),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Offline(err.to_string())
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else {
            Self::Offline(err.to_string())
        }
    }
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Identifier unknown or secret mismatch
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No cached credential exists and the device is offline
    #[error("no cached credential for {0}; connect to sign in")]
    NotCached(String),

    /// Signup form failed validation
    #[error("validation error in field '{field}': {message}")]
    Validation {
        /// Field that failed
        field: String,
        /// Human-readable message
        message: String,
    },

    /// Password hashing failed
    #[error("credential hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    /// The blocking hash task panicked or was cancelled
    #[error("credential task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Local store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Remote failure that is not a credential rejection
    #[error(transparent)]
    Remote(RemoteError),
}

impl AuthError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Position watch errors
#[derive(Debug, Error)]
pub enum LocationError {
    /// The platform refused to start a position watch
    #[error("position watch unavailable: {0}")]
    Unavailable(String),

    /// Location permission missing
    #[error("location permission denied")]
    PermissionDenied,
}

/// Reasons a sync cycle stopped before completing
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credential rejected; the UI must prompt for login
    #[error("re-authentication required: {0}")]
    ReauthRequired(String),

    /// Connectivity lost during the cycle
    #[error("offline: {0}")]
    Offline(String),

    /// Local store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Auth(message) => Self::ReauthRequired(message),
            other => Self::Offline(other.to_string()),
        }
    }
}
