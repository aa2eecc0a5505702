//! Error types used throughout the client.
//!
//! Remote failures are modeled as one tagged union so that callers
//! pattern-match the kind instead of probing optional fields.

use serde_json::Value;
use thiserror::Error;

use crate::types::ValidationErrorEntry;

/// Failure of a single endpoint call, online or replayed.
#[derive(Error, Debug)]
pub enum CallError {
    /// Local precondition failure; raised before any request is built and
    /// never retried.
    #[error("invalid call arguments: {0}")]
    InvalidArguments(String),

    /// The backend rejected the call with field-level validation messages.
    #[error("validation failed: {message}")]
    Validation { message: String, entries: Vec<ValidationErrorEntry> },

    /// Structured error document from the backend (message/type/detail).
    #[error("{message}")]
    Endpoint { message: String, kind: Option<String>, detail: Option<Value> },

    /// Non-success status with a non-empty body that is not a structured
    /// error document; carries the raw body.
    #[error("unexpected response (status {status} {status_text}): {body}")]
    UnexpectedResponse { status: u16, status_text: String, body: String },

    /// Non-success status with an empty body.
    #[error("expected \"200 OK\" response, but got {status} {status_text}")]
    Protocol { status: u16, status_text: String },

    /// Success status whose body failed to decode as JSON.
    #[error("malformed response body: {0}")]
    Decode(String),

    /// The transport collaborator failed before producing a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The deferred-call queue failed while persisting or reading a call.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Failure of the durable deferred-call store.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("queue task failed: {0}")]
    Task(String),
}

/// One failed record from a drain pass.
#[derive(Debug)]
pub struct DrainFailure {
    pub id: Option<i64>,
    pub endpoint: String,
    pub method: String,
    pub error: CallError,
}

/// Outcome of a failed drain pass.
///
/// A pass never aborts early: every record in the working set is replayed
/// and persisted to its terminal or reset state before this error is
/// raised.
#[derive(Error, Debug)]
pub enum DrainError {
    /// One entry per failing record, in replay order.
    #[error("{} deferred call(s) failed to submit", .0.len())]
    Aggregate(Vec<DrainFailure>),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Result type alias for call operations.
pub type Result<T> = std::result::Result<T, CallError>;
