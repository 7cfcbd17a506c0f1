//! Integration tests
//!
//! End-to-end behaviour across the store, the sync services and the HTTP
//! transport.

mod auth_flow;
mod http_transport;
mod offline_trips;
mod store;
mod sync_cycle;
