//! Port interfaces for the client's external collaborators.

use async_trait::async_trait;
use lifeline_domain::{
    DeferredCall, QueueError, Result, TransportRequest, TransportResponse,
};

use crate::submission::DeferredCallSubmission;

/// Trait for the durable deferred-call store.
///
/// The backing collection is order-preserving with a store-assigned,
/// monotonically increasing integer key.
#[async_trait]
pub trait DeferredCallQueue: Send + Sync {
    /// Persist a new call with `submitting = false` and return it with its
    /// assigned id.
    async fn enqueue(&self, call: DeferredCall) -> std::result::Result<DeferredCall, QueueError>;

    /// Atomically flip every non-submitting record to `submitting = true`
    /// and return the set just flipped (may be empty).
    ///
    /// This is the sole mutual-exclusion point of the system: two racing
    /// claims must never both observe the same record as non-submitting.
    async fn claim_pending(&self) -> std::result::Result<Vec<DeferredCall>, QueueError>;

    /// Every record currently marked submitting, regardless of which pass
    /// claimed it.
    async fn list_submitting(&self) -> std::result::Result<Vec<DeferredCall>, QueueError>;

    /// Persist the given record's current state. Idempotent for persisted
    /// records; a record that has not been assigned an id yet cannot be
    /// updated and is rejected with a storage error.
    async fn update(&self, call: &DeferredCall) -> std::result::Result<(), QueueError>;

    /// Remove a record. Deleting an absent id is a no-op, not an error.
    async fn delete(&self, id: i64) -> std::result::Result<(), QueueError>;

    /// Number of records in the store. Diagnostic aid.
    async fn count(&self) -> std::result::Result<usize, QueueError>;
}

/// Trait for the transport collaborator that performs the actual network
/// request. Non-success statuses are returned as responses, not errors;
/// the pipeline's validation step interprets them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request and return the raw response.
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse>;
}

/// Trait exposing the current connectivity state.
pub trait ConnectivityMonitor: Send + Sync {
    /// Whether the process currently has connectivity.
    fn is_online(&self) -> bool;
}

/// Optional hook invoked around each transport attempt, and only around the
/// transport attempt - interceptors run outside of it.
pub trait LoadingIndicator: Send + Sync {
    fn set_loading(&self, loading: bool);
}

/// Pluggable per-record submission policy, consulted by the coordinator
/// during a drain pass.
#[async_trait]
pub trait DeferredCallHandler: Send + Sync {
    /// Decide how one deferred call is submitted.
    ///
    /// The handler owns control flow: it may call
    /// [`DeferredCallSubmission::submit`], catch or rethrow the resulting
    /// error, and override the default keep/discard outcome with
    /// [`DeferredCallSubmission::keep_in_queue`]. A handler that returns an
    /// error marks the record as failed with default reset-to-pending
    /// semantics.
    async fn handle(&self, submission: &mut DeferredCallSubmission<'_>) -> Result<()>;
}
