//! Submitter capability handed to the pluggable submission policy hook.

use lifeline_domain::{DeferredCall, Result};
use serde_json::Value;

use crate::pipeline::CallPipeline;

/// One deferred call mid-drain, as seen by a [`DeferredCallHandler`].
///
/// Wraps the replay itself (`submit`) and the per-record keep/discard
/// override (`keep_in_queue`); the coordinator reads the bookkeeping after
/// the handler returns to decide the record's fate.
///
/// [`DeferredCallHandler`]: crate::ports::DeferredCallHandler
pub struct DeferredCallSubmission<'a> {
    pipeline: &'a CallPipeline,
    call: &'a DeferredCall,
    keep_in_queue: bool,
    last_attempt_failed: bool,
}

impl<'a> DeferredCallSubmission<'a> {
    pub(crate) fn new(pipeline: &'a CallPipeline, call: &'a DeferredCall) -> Self {
        Self { pipeline, call, keep_in_queue: false, last_attempt_failed: false }
    }

    pub fn endpoint(&self) -> &str {
        &self.call.endpoint
    }

    pub fn method(&self) -> &str {
        &self.call.method
    }

    pub fn params(&self) -> Option<&Value> {
        self.call.params.as_ref()
    }

    /// The queued record being submitted.
    pub fn deferred_call(&self) -> &DeferredCall {
        self.call
    }

    /// Replay the call through the pipeline with `is_deferred = true`,
    /// rethrowing pipeline failures to the handler.
    pub async fn submit(&mut self) -> Result<Value> {
        let result = self
            .pipeline
            .invoke(&self.call.endpoint, &self.call.method, self.call.params.clone(), true)
            .await;
        self.last_attempt_failed = result.is_err();
        result
    }

    /// Override the default outcome: keep this record in the queue for a
    /// future drain pass.
    pub fn keep_in_queue(&mut self) {
        self.keep_in_queue = true;
    }

    pub(crate) fn kept(&self) -> bool {
        self.keep_in_queue
    }

    pub(crate) fn failed(&self) -> bool {
        self.last_attempt_failed
    }
}
