//! # Lifeline Core
//!
//! Pure client logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for all external collaborators
//! - The interceptable request pipeline
//! - The deferred-call submission coordinator
//! - The client facade tying the two together
//!
//! ## Architecture Principles
//! - Only depends on `lifeline-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod client;
pub mod coordinator;
pub mod pipeline;
pub mod ports;
pub mod submission;

// Re-export specific items to avoid ambiguity
pub use client::{EndpointClient, EndpointClientBuilder};
pub use coordinator::SubmissionCoordinator;
pub use pipeline::{middleware_fn, CallPipeline, Middleware, Next};
pub use ports::{
    ConnectivityMonitor, DeferredCallHandler, DeferredCallQueue, LoadingIndicator, Transport,
};
pub use submission::DeferredCallSubmission;
