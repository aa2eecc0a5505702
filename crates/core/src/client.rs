//! Client facade: online calls, offline deferral, and the drain trigger.

use std::sync::Arc;

use lifeline_domain::{DeferrableResult, DeferredCall, DrainError, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::coordinator::SubmissionCoordinator;
use crate::pipeline::{CallPipeline, Middleware};
use crate::ports::{
    ConnectivityMonitor, DeferredCallHandler, DeferredCallQueue, LoadingIndicator, Transport,
};

/// Default endpoint-path prefix.
pub const DEFAULT_PREFIX: &str = "/connect";

/// Resilient endpoint RPC client.
///
/// Turns `(endpoint, method, params)` triples into network calls through
/// the interceptable pipeline, and defers calls into the durable queue
/// while connectivity is absent.
pub struct EndpointClient {
    pipeline: Arc<CallPipeline>,
    queue: Arc<dyn DeferredCallQueue>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    coordinator: SubmissionCoordinator,
}

impl EndpointClient {
    /// Start building a client around the three required collaborators.
    pub fn builder(
        transport: Arc<dyn Transport>,
        queue: Arc<dyn DeferredCallQueue>,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> EndpointClientBuilder {
        EndpointClientBuilder {
            transport,
            queue,
            connectivity,
            prefix: DEFAULT_PREFIX.to_string(),
            middlewares: Vec::new(),
            handler: None,
            loading: None,
        }
    }

    /// Call `{prefix}/{endpoint}/{method}` through the pipeline and return
    /// the decoded response body.
    pub async fn call(&self, endpoint: &str, method: &str, params: Option<Value>) -> Result<Value> {
        self.pipeline.invoke(endpoint, method, params, false).await
    }

    /// Call the endpoint when online; otherwise park the call in the
    /// durable queue for submission once connectivity returns.
    pub async fn deferrable_call(
        &self,
        endpoint: &str,
        method: &str,
        params: Option<Value>,
    ) -> Result<DeferrableResult> {
        if self.connectivity.is_online() {
            let result = self.call(endpoint, method, params).await?;
            Ok(DeferrableResult::Completed(result))
        } else {
            let call = DeferredCall::new(endpoint, method, params);
            let stored = self.queue.enqueue(call).await?;
            info!(endpoint, method, id = ?stored.id, "deferred endpoint call while offline");
            Ok(DeferrableResult::Deferred(stored))
        }
    }

    /// Run one drain pass over the deferred-call queue.
    ///
    /// Triggered on each offline-to-online transition; may also be invoked
    /// manually. Concurrent triggers are idempotent.
    pub async fn process_deferred_calls(&self) -> std::result::Result<(), DrainError> {
        debug!("processing deferred calls");
        self.coordinator.drain().await
    }

    /// The queue collaborator, for diagnostics.
    pub fn queue(&self) -> &Arc<dyn DeferredCallQueue> {
        &self.queue
    }
}

/// Builder for [`EndpointClient`].
pub struct EndpointClientBuilder {
    transport: Arc<dyn Transport>,
    queue: Arc<dyn DeferredCallQueue>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    prefix: String,
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: Option<Arc<dyn DeferredCallHandler>>,
    loading: Option<Arc<dyn LoadingIndicator>>,
}

impl EndpointClientBuilder {
    /// Override the endpoint-path prefix (default `/connect`).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Append an interceptor to the ordered middleware list.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Replace the middleware list wholesale.
    pub fn middlewares(mut self, middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        self.middlewares = middlewares;
        self
    }

    /// Install the pluggable submission policy hook.
    pub fn deferred_call_handler(mut self, handler: Arc<dyn DeferredCallHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Install the loading-indicator hook invoked around transport
    /// attempts.
    pub fn loading_indicator(mut self, indicator: Arc<dyn LoadingIndicator>) -> Self {
        self.loading = Some(indicator);
        self
    }

    pub fn build(self) -> EndpointClient {
        let pipeline = Arc::new(CallPipeline::new(
            self.prefix,
            self.middlewares,
            self.transport,
            self.loading,
        ));
        let coordinator =
            SubmissionCoordinator::new(Arc::clone(&self.queue), Arc::clone(&pipeline), self.handler);

        EndpointClient {
            pipeline,
            queue: self.queue,
            connectivity: self.connectivity,
            coordinator,
        }
    }
}
