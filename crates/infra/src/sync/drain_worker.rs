//! Background worker that drains the deferred-call queue when connectivity
//! returns.
//!
//! Subscribes to the connectivity watch channel and triggers one drain pass
//! per offline-to-online transition. Join handles are tracked, cancellation
//! is explicit, and a worker dropped while running cancels its task.

use std::sync::Arc;
use std::time::Duration;

use lifeline_core::EndpointClient;
use lifeline_domain::DrainError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Configuration for the drain worker.
#[derive(Debug, Clone)]
pub struct DrainWorkerConfig {
    /// Force a drain pass on startup when already online, even when the
    /// queue reports nothing pending. Leftover calls from a previous
    /// process run are drained at startup regardless of this flag.
    pub drain_on_start: bool,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for DrainWorkerConfig {
    fn default() -> Self {
        Self { drain_on_start: true, join_timeout: Duration::from_secs(5) }
    }
}

/// Drain worker with explicit lifecycle management.
pub struct DrainWorker {
    client: Arc<EndpointClient>,
    connectivity: watch::Receiver<bool>,
    config: DrainWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl DrainWorker {
    /// Create a new worker around the client and a connectivity
    /// subscription.
    pub fn new(
        client: Arc<EndpointClient>,
        connectivity: watch::Receiver<bool>,
        config: DrainWorkerConfig,
    ) -> Self {
        Self {
            client,
            connectivity,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the worker, spawning the background watch task.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), String> {
        if self.is_running() {
            return Err("Worker already running".to_string());
        }

        info!("Starting drain worker");

        self.cancellation = CancellationToken::new();

        let client = Arc::clone(&self.client);
        let connectivity = self.connectivity.clone();
        let drain_on_start = self.config.drain_on_start;
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::watch_loop(client, connectivity, drain_on_start, cancel).await;
        });

        self.task_handle = Some(handle);
        info!("Drain worker started");

        Ok(())
    }

    /// Stop the worker and wait for the watch task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), String> {
        if !self.is_running() {
            return Err("Worker not running".to_string());
        }

        info!("Stopping drain worker");

        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Worker task panicked: {}", e);
                    return Err("Worker task panicked".to_string());
                }
                Err(_) => {
                    warn!("Worker task did not complete within timeout");
                    return Err("Worker task timeout".to_string());
                }
            }
        }

        info!("Drain worker stopped");
        self.cancellation = CancellationToken::new();

        Ok(())
    }

    /// Returns true when a worker instance is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Background watch loop. One drain per offline-to-online edge.
    async fn watch_loop(
        client: Arc<EndpointClient>,
        mut connectivity: watch::Receiver<bool>,
        drain_on_start: bool,
        cancel: CancellationToken,
    ) {
        // An edge may already have fired between construction and this first
        // look; queued work while online means exactly that.
        let online = *connectivity.borrow_and_update();
        if online && (drain_on_start || Self::has_pending(&client).await) {
            Self::run_drain(&client).await;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Drain worker watch loop cancelled");
                    break;
                }
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        debug!("Connectivity watcher dropped; stopping watch loop");
                        break;
                    }
                    // The channel coalesces rapid flips: a wake that leaves
                    // the level at online can stem from an edge that
                    // completed while a drain pass was running, so any wake
                    // ending online gets a pass. Draining an empty queue is
                    // a no-op.
                    let online = *connectivity.borrow_and_update();
                    if online {
                        info!("Connectivity restored; draining deferred calls");
                        Self::run_drain(&client).await;
                    }
                }
            }
        }
    }

    async fn has_pending(client: &Arc<EndpointClient>) -> bool {
        match client.queue().count().await {
            Ok(count) => count > 0,
            Err(err) => {
                warn!(error = %err, "Failed to inspect the queue at startup");
                false
            }
        }
    }

    async fn run_drain(client: &Arc<EndpointClient>) {
        match client.process_deferred_calls().await {
            Ok(()) => debug!("Drain pass completed"),
            Err(DrainError::Aggregate(failures)) => {
                // Failed calls are back in the queue; the next transition
                // retries them.
                warn!(failed = failures.len(), "Drain pass left calls in the queue");
                for failure in &failures {
                    debug!(
                        endpoint = %failure.endpoint,
                        method = %failure.method,
                        error = %failure.error,
                        "Deferred call submission failed"
                    );
                }
            }
            Err(DrainError::Queue(err)) => {
                warn!(error = %err, "Drain pass could not access the queue");
            }
        }
    }
}

impl Drop for DrainWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("DrainWorker dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
