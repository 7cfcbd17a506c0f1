//! # Offline Trip Logging
//!
//! Trip logs are recorded against the local store while offline and replayed
//! through the multipart trip endpoints when connectivity returns.
//!
//! ## Key Components
//!
//! - `queue.rs`: the store-backed [`TripQueue`]
//! - `uploader.rs`: [`TripUploader`], which drains the queue

pub mod queue;
pub mod uploader;

pub use queue::{QueueStats, TripQueue};
pub use uploader::{DrainReport, TripUploader};
