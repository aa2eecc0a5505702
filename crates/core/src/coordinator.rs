//! Submission coordinator: drives one drain pass over the deferred-call
//! queue.
//!
//! A pass claims every pending record, replays each one through the
//! pipeline strictly in order, applies the default or hook-provided
//! keep/discard policy, and aggregates per-record failures. Passes never
//! short-circuit: every record in the working set is persisted to its
//! terminal or reset state before the pass reports its outcome.

use std::sync::Arc;

use lifeline_domain::{CallError, DeferredCall, DrainError, DrainFailure};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::CallPipeline;
use crate::ports::{DeferredCallHandler, DeferredCallQueue};
use crate::submission::DeferredCallSubmission;

/// What happens to a record once its replay has resolved.
enum Disposition {
    /// Remove the record from the store.
    Delete,
    /// Reset to `submitting = false` so a future pass claims it again.
    Reset,
    /// Leave claimed (`submitting = true`); the next pass sweeps it up via
    /// the working-set scan.
    LeaveClaimed,
}

/// Coordinates drain passes over the queue.
pub struct SubmissionCoordinator {
    queue: Arc<dyn DeferredCallQueue>,
    pipeline: Arc<CallPipeline>,
    handler: Option<Arc<dyn DeferredCallHandler>>,
    // Held for the duration of one pass. Triggers arriving while a pass is
    // active are no-ops; the store claim protocol alone cannot stop a
    // concurrent pass from re-playing records the active pass has already
    // claimed.
    pass_guard: Mutex<()>,
}

impl SubmissionCoordinator {
    pub fn new(
        queue: Arc<dyn DeferredCallQueue>,
        pipeline: Arc<CallPipeline>,
        handler: Option<Arc<dyn DeferredCallHandler>>,
    ) -> Self {
        Self { queue, pipeline, handler, pass_guard: Mutex::new(()) }
    }

    /// Run one drain pass.
    ///
    /// No-op when another pass is already running or when there is nothing
    /// to submit; this makes concurrently fired triggers idempotent.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<(), DrainError> {
        let Ok(_guard) = self.pass_guard.try_lock() else {
            debug!("drain pass already in progress");
            return Ok(());
        };

        let claimed = self.queue.claim_pending().await?;
        let working_set = self.queue.list_submitting().await?;
        if claimed.is_empty() && working_set.is_empty() {
            debug!("no deferred calls to submit");
            return Ok(());
        }

        info!(claimed = claimed.len(), working_set = working_set.len(), "draining deferred calls");

        let mut failures = Vec::new();
        for call in &working_set {
            let (disposition, error) = self.replay(call).await;
            let persisted = self.apply(call, disposition).await;

            match (error, persisted) {
                (Some(error), Ok(())) => {
                    failures.push(failure_for(call, error));
                }
                (Some(error), Err(queue_error)) => {
                    // One aggregate entry per record: the replay error wins,
                    // the persistence failure is only logged.
                    warn!(id = ?call.id, error = %queue_error, "failed to persist record outcome");
                    failures.push(failure_for(call, error));
                }
                (None, Err(queue_error)) => {
                    failures.push(failure_for(call, CallError::Queue(queue_error)));
                }
                (None, Ok(())) => {}
            }
        }

        if failures.is_empty() {
            info!(count = working_set.len(), "drain pass completed");
            Ok(())
        } else {
            warn!(failed = failures.len(), total = working_set.len(), "drain pass had failures");
            Err(DrainError::Aggregate(failures))
        }
    }

    /// Replay one record, directly or through the policy hook, and decide
    /// its disposition. Never fails the pass itself; errors surface in the
    /// returned pair.
    async fn replay(&self, call: &DeferredCall) -> (Disposition, Option<CallError>) {
        match &self.handler {
            None => {
                let result = self
                    .pipeline
                    .invoke(&call.endpoint, &call.method, call.params.clone(), true)
                    .await;
                match result {
                    Ok(_) => (Disposition::Delete, None),
                    Err(error) => (Disposition::Reset, Some(error)),
                }
            }
            Some(handler) => {
                let mut submission = DeferredCallSubmission::new(&self.pipeline, call);
                match handler.handle(&mut submission).await {
                    // Rethrown submit error, or the hook's own failure:
                    // default reset-to-pending semantics either way.
                    Err(error) => (Disposition::Reset, Some(error)),
                    Ok(()) if submission.failed() => {
                        // The hook swallowed the error and accepted
                        // responsibility; keep_in_queue reverses the
                        // default discard into reset-to-pending.
                        if submission.kept() {
                            (Disposition::Reset, None)
                        } else {
                            (Disposition::Delete, None)
                        }
                    }
                    Ok(()) => {
                        // Success (or the hook chose not to submit at all);
                        // keep_in_queue turns the delete into an
                        // intentional retry-even-on-success.
                        if submission.kept() {
                            (Disposition::LeaveClaimed, None)
                        } else {
                            (Disposition::Delete, None)
                        }
                    }
                }
            }
        }
    }

    async fn apply(
        &self,
        call: &DeferredCall,
        disposition: Disposition,
    ) -> Result<(), lifeline_domain::QueueError> {
        match disposition {
            Disposition::Delete => match call.id {
                Some(id) => self.queue.delete(id).await,
                None => Ok(()),
            },
            Disposition::Reset => {
                let mut reset = call.clone();
                reset.submitting = false;
                self.queue.update(&reset).await
            }
            Disposition::LeaveClaimed => Ok(()),
        }
    }
}

fn failure_for(call: &DeferredCall, error: CallError) -> DrainFailure {
    DrainFailure {
        id: call.id,
        endpoint: call.endpoint.clone(),
        method: call.method.clone(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use lifeline_domain::{QueueError, Result, TransportRequest, TransportResponse};
    use serde_json::json;

    use super::*;
    use crate::ports::Transport;

    /// In-memory queue implementing the claim protocol, shared by the
    /// coordinator tests.
    struct MemoryQueue {
        records: StdMutex<Vec<DeferredCall>>,
        next_id: AtomicUsize,
    }

    impl MemoryQueue {
        fn new() -> Self {
            Self { records: StdMutex::new(Vec::new()), next_id: AtomicUsize::new(1) }
        }

        fn with_pending(calls: Vec<DeferredCall>) -> Arc<Self> {
            let queue = Self::new();
            {
                let mut records = queue.records.lock().unwrap();
                for mut call in calls {
                    let id = queue.next_id.fetch_add(1, Ordering::SeqCst) as i64;
                    call.id = Some(id);
                    records.push(call);
                }
            }
            Arc::new(queue)
        }

        fn snapshot(&self) -> Vec<DeferredCall> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeferredCallQueue for MemoryQueue {
        async fn enqueue(&self, mut call: DeferredCall) -> std::result::Result<DeferredCall, QueueError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
            call.id = Some(id);
            call.submitting = false;
            self.records.lock().unwrap().push(call.clone());
            Ok(call)
        }

        async fn claim_pending(&self) -> std::result::Result<Vec<DeferredCall>, QueueError> {
            let mut records = self.records.lock().unwrap();
            let mut claimed = Vec::new();
            for record in records.iter_mut() {
                if !record.submitting {
                    record.submitting = true;
                    claimed.push(record.clone());
                }
            }
            Ok(claimed)
        }

        async fn list_submitting(&self) -> std::result::Result<Vec<DeferredCall>, QueueError> {
            Ok(self.records.lock().unwrap().iter().filter(|r| r.submitting).cloned().collect())
        }

        async fn update(&self, call: &DeferredCall) -> std::result::Result<(), QueueError> {
            let mut records = self.records.lock().unwrap();
            if let Some(record) = records.iter_mut().find(|r| r.id == call.id) {
                *record = call.clone();
            }
            Ok(())
        }

        async fn delete(&self, id: i64) -> std::result::Result<(), QueueError> {
            self.records.lock().unwrap().retain(|r| r.id != Some(id));
            Ok(())
        }

        async fn count(&self) -> std::result::Result<usize, QueueError> {
            Ok(self.records.lock().unwrap().len())
        }
    }

    /// Transport with a scripted response per attempt, recording each
    /// request it sees.
    struct ScriptedTransport {
        responses: StdMutex<Vec<Result<TransportResponse>>>,
        attempts: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<TransportResponse>>) -> Arc<Self> {
            Arc::new(Self { responses: StdMutex::new(responses), attempts: AtomicUsize::new(0) })
        }

        fn succeeding() -> Arc<Self> {
            Self::new(Vec::new())
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &TransportRequest) -> Result<TransportResponse> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(TransportResponse { status: 200, status_text: "OK".into(), body: "null".into() })
            } else {
                responses.remove(0)
            }
        }
    }

    fn ok_response() -> Result<TransportResponse> {
        Ok(TransportResponse { status: 200, status_text: "OK".into(), body: "null".into() })
    }

    fn failed_response() -> Result<TransportResponse> {
        Err(CallError::Transport("connection refused".into()))
    }

    fn sample_call(n: u32) -> DeferredCall {
        DeferredCall::new("FooEndpoint", "fooMethod", Some(json!({ "fooData": format!("foo-{n}") })))
    }

    fn coordinator(
        queue: Arc<MemoryQueue>,
        transport: Arc<ScriptedTransport>,
        handler: Option<Arc<dyn DeferredCallHandler>>,
    ) -> SubmissionCoordinator {
        let pipeline = Arc::new(CallPipeline::new("/connect", Vec::new(), transport, None));
        SubmissionCoordinator::new(queue, pipeline, handler)
    }

    #[tokio::test]
    async fn drain_on_empty_queue_is_a_no_op() {
        let queue = MemoryQueue::with_pending(vec![]);
        let transport = ScriptedTransport::succeeding();
        let coordinator = coordinator(queue.clone(), transport.clone(), None);

        coordinator.drain().await.expect("empty drain succeeds");

        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn successful_replay_deletes_the_record() {
        let queue = MemoryQueue::with_pending(vec![sample_call(1)]);
        let transport = ScriptedTransport::succeeding();
        let coordinator = coordinator(queue.clone(), transport.clone(), None);

        coordinator.drain().await.expect("drain succeeds");

        assert_eq!(transport.attempts(), 1);
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test]
    async fn failed_replay_resets_the_record_to_pending() {
        let queue = MemoryQueue::with_pending(vec![sample_call(1)]);
        let transport = ScriptedTransport::new(vec![failed_response()]);
        let coordinator = coordinator(queue.clone(), transport.clone(), None);

        let error = coordinator.drain().await.unwrap_err();

        match error {
            DrainError::Aggregate(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].endpoint, "FooEndpoint");
                assert!(matches!(failures[0].error, CallError::Transport(_)));
            }
            other => panic!("expected aggregate error, got {other:?}"),
        }

        let records = queue.snapshot();
        assert_eq!(records.len(), 1);
        assert!(!records[0].submitting);
    }

    #[tokio::test]
    async fn a_failure_does_not_short_circuit_the_batch() {
        let queue =
            MemoryQueue::with_pending(vec![sample_call(1), sample_call(2), sample_call(3)]);
        let transport =
            ScriptedTransport::new(vec![ok_response(), failed_response(), ok_response()]);
        let coordinator = coordinator(queue.clone(), transport.clone(), None);

        let error = coordinator.drain().await.unwrap_err();

        assert_eq!(transport.attempts(), 3);
        match error {
            DrainError::Aggregate(failures) => assert_eq!(failures.len(), 1),
            other => panic!("expected aggregate error, got {other:?}"),
        }

        // Only the failing record remains, reset for a future pass.
        let records = queue.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, Some(2));
        assert!(!records[0].submitting);
    }

    #[tokio::test]
    async fn a_reset_record_can_be_resubmitted_by_a_later_pass() {
        let queue = MemoryQueue::with_pending(vec![sample_call(1)]);
        let transport = ScriptedTransport::new(vec![failed_response(), ok_response()]);
        let coordinator = coordinator(queue.clone(), transport.clone(), None);

        coordinator.drain().await.unwrap_err();
        coordinator.drain().await.expect("second pass succeeds");

        assert_eq!(transport.attempts(), 2);
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test]
    async fn concurrent_triggers_submit_each_record_once() {
        let queue = MemoryQueue::with_pending(vec![sample_call(1)]);
        let transport = ScriptedTransport::succeeding();
        let coordinator =
            Arc::new(coordinator(queue.clone(), transport.clone(), None));

        let passes = (0..3).map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.drain().await })
        });
        for pass in passes {
            pass.await.expect("task completes").expect("drain succeeds");
        }

        assert_eq!(transport.attempts(), 1);
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test]
    async fn orphaned_submitting_records_are_swept_by_the_next_pass() {
        // Simulate a process restart mid-pass: the record is still marked
        // submitting but nothing owns it.
        let queue = MemoryQueue::with_pending(vec![sample_call(1)]);
        queue.records.lock().unwrap()[0].submitting = true;
        let transport = ScriptedTransport::succeeding();
        let coordinator = coordinator(queue.clone(), transport.clone(), None);

        coordinator.drain().await.expect("drain succeeds");

        assert_eq!(transport.attempts(), 1);
        assert!(queue.snapshot().is_empty());
    }

    struct SubmitAndSwallow;

    #[async_trait]
    impl DeferredCallHandler for SubmitAndSwallow {
        async fn handle(&self, submission: &mut DeferredCallSubmission<'_>) -> Result<()> {
            let _ = submission.submit().await;
            Ok(())
        }
    }

    struct SubmitAndKeepOnFailure;

    #[async_trait]
    impl DeferredCallHandler for SubmitAndKeepOnFailure {
        async fn handle(&self, submission: &mut DeferredCallSubmission<'_>) -> Result<()> {
            if submission.submit().await.is_err() {
                submission.keep_in_queue();
            }
            Ok(())
        }
    }

    struct SubmitAndRethrow;

    #[async_trait]
    impl DeferredCallHandler for SubmitAndRethrow {
        async fn handle(&self, submission: &mut DeferredCallSubmission<'_>) -> Result<()> {
            submission.submit().await?;
            Ok(())
        }
    }

    struct KeepEvenOnSuccess;

    #[async_trait]
    impl DeferredCallHandler for KeepEvenOnSuccess {
        async fn handle(&self, submission: &mut DeferredCallSubmission<'_>) -> Result<()> {
            submission.submit().await?;
            submission.keep_in_queue();
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl DeferredCallHandler for FailingHandler {
        async fn handle(&self, _submission: &mut DeferredCallSubmission<'_>) -> Result<()> {
            Err(CallError::InvalidArguments("handler exploded".into()))
        }
    }

    #[tokio::test]
    async fn hook_swallowing_a_failure_discards_the_record() {
        let queue = MemoryQueue::with_pending(vec![sample_call(1)]);
        let transport = ScriptedTransport::new(vec![failed_response()]);
        let coordinator =
            coordinator(queue.clone(), transport.clone(), Some(Arc::new(SubmitAndSwallow)));

        // The hook accepted responsibility, so the pass reports success.
        coordinator.drain().await.expect("drain succeeds");

        assert_eq!(transport.attempts(), 1);
        assert!(queue.snapshot().is_empty());
    }

    #[tokio::test]
    async fn hook_keeping_a_caught_failure_resets_the_record() {
        let queue = MemoryQueue::with_pending(vec![sample_call(1)]);
        let transport = ScriptedTransport::new(vec![failed_response()]);
        let coordinator =
            coordinator(queue.clone(), transport.clone(), Some(Arc::new(SubmitAndKeepOnFailure)));

        coordinator.drain().await.expect("drain succeeds");

        let records = queue.snapshot();
        assert_eq!(records.len(), 1);
        assert!(!records[0].submitting);
    }

    #[tokio::test]
    async fn hook_rethrowing_a_failure_counts_as_a_record_failure() {
        let queue = MemoryQueue::with_pending(vec![sample_call(1)]);
        let transport = ScriptedTransport::new(vec![failed_response()]);
        let coordinator =
            coordinator(queue.clone(), transport.clone(), Some(Arc::new(SubmitAndRethrow)));

        let error = coordinator.drain().await.unwrap_err();

        match error {
            DrainError::Aggregate(failures) => assert_eq!(failures.len(), 1),
            other => panic!("expected aggregate error, got {other:?}"),
        }
        let records = queue.snapshot();
        assert_eq!(records.len(), 1);
        assert!(!records[0].submitting);
    }

    #[tokio::test]
    async fn hook_keeping_a_success_leaves_the_record_claimed() {
        let queue = MemoryQueue::with_pending(vec![sample_call(1)]);
        let transport = ScriptedTransport::succeeding();
        let coordinator =
            coordinator(queue.clone(), transport.clone(), Some(Arc::new(KeepEvenOnSuccess)));

        coordinator.drain().await.expect("drain succeeds");

        let records = queue.snapshot();
        assert_eq!(records.len(), 1);
        assert!(records[0].submitting);
    }

    #[tokio::test]
    async fn failing_hook_is_treated_as_a_record_failure() {
        let queue = MemoryQueue::with_pending(vec![sample_call(1)]);
        let transport = ScriptedTransport::succeeding();
        let coordinator =
            coordinator(queue.clone(), transport.clone(), Some(Arc::new(FailingHandler)));

        let error = coordinator.drain().await.unwrap_err();

        match error {
            DrainError::Aggregate(failures) => {
                assert_eq!(failures.len(), 1);
                assert!(matches!(failures[0].error, CallError::InvalidArguments(_)));
            }
            other => panic!("expected aggregate error, got {other:?}"),
        }
        assert_eq!(transport.attempts(), 0);
        let records = queue.snapshot();
        assert_eq!(records.len(), 1);
        assert!(!records[0].submitting);
    }

    #[tokio::test]
    async fn hook_observes_the_record_metadata() {
        struct Observing {
            seen: StdMutex<Vec<(String, String)>>,
        }

        #[async_trait]
        impl DeferredCallHandler for Observing {
            async fn handle(&self, submission: &mut DeferredCallSubmission<'_>) -> Result<()> {
                self.seen
                    .lock()
                    .unwrap()
                    .push((submission.endpoint().to_string(), submission.method().to_string()));
                submission.submit().await?;
                Ok(())
            }
        }

        let queue = MemoryQueue::with_pending(vec![sample_call(1)]);
        let transport = ScriptedTransport::succeeding();
        let handler = Arc::new(Observing { seen: StdMutex::new(Vec::new()) });
        let coordinator = coordinator(queue.clone(), transport, Some(handler.clone()));

        coordinator.drain().await.expect("drain succeeds");

        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec![("FooEndpoint".to_string(), "fooMethod".to_string())]
        );
    }
}
