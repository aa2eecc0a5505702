//! SQLite-backed persistence for the deferred-call queue.

pub mod manager;
pub mod queue_repository;

pub use manager::DbManager;
pub use queue_repository::SqliteCallQueue;
