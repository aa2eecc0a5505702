//! # Lifeline Domain
//!
//! Business domain types and models for Lifeline.
//!
//! This crate contains:
//! - Deferred-call and wire-level data types
//! - Domain error types and Result definitions
//!
//! ## Architecture
//! - No dependencies on other Lifeline crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{CallError, DrainError, DrainFailure, QueueError, Result};
pub use types::{
    CallContext, DeferrableResult, DeferredCall, TransportRequest, TransportResponse,
    ValidationErrorEntry,
};
