//! # Lifeline Infrastructure
//!
//! Infrastructure implementations of core client ports.
//!
//! This crate contains:
//! - SQLite-backed deferred-call queue
//! - reqwest-backed transport
//! - Connectivity watcher and the background drain worker
//!
//! ## Architecture
//! - Implements traits defined in `lifeline-core`
//! - Depends on `lifeline-domain` and `lifeline-core`
//! - Contains all "impure" code (I/O, network, storage)

pub mod connectivity;
pub mod database;
pub mod http;
pub mod sync;

// Re-export commonly used items
pub use connectivity::ConnectivityWatcher;
pub use database::{DbManager, SqliteCallQueue};
pub use http::{ReqwestTransport, ReqwestTransportBuilder};
pub use sync::{DrainWorker, DrainWorkerConfig};
