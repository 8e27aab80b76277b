//! Batch execution scheduler.
//!
//! Sequential batches run strictly left to right. Parallel batches dispatch
//! every independent sub-request at once and release each dependent as soon
//! as the last result it reads from is recorded. Both modes run on the
//! caller's task; the results array is owned by the scheduling loop, so the
//! only synchronization is the happens-before given by awaiting completions.

use fanout_abstraction::{InvokeError, Invoker, SubRequest, SubResult};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::aggregator::{Aggregator, BatchResult};
use crate::batch::BatchSpec;
use crate::config::BatchConfig;
use crate::dependency::DependencyGraph;
use crate::error::{ReferenceError, Result};
use crate::progress::{BatchState, ProgressEvent, ProgressReporter, SubRequestState};
use crate::resolver::substitute_request;

/// Everything a finished batch produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// One result per sub-request, in submission order.
    pub results: Vec<SubResult>,
    /// Final state of each sub-request.
    pub states: Vec<SubRequestState>,
    /// Final state of the batch.
    pub state: BatchState,
    /// Wall-clock time of the batch.
    pub elapsed: Duration,
}

impl BatchOutcome {
    /// Aggregates the results into the ordered batch response.
    pub fn into_batch_result(self) -> BatchResult {
        Aggregator::aggregate(self.results)
    }
}

/// Executes batches against an invoker.
pub struct BatchExecutor {
    /// Executes individual sub-requests.
    invoker: Arc<dyn Invoker>,
    /// Defaults shared by every batch.
    config: BatchConfig,
    /// Optional event sink.
    progress: Option<ProgressReporter>,
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl BatchExecutor {
    /// Creates an executor.
    pub fn new(invoker: Arc<dyn Invoker>, config: BatchConfig) -> Self {
        Self { invoker, config, progress: None }
    }

    /// Attaches a progress reporter.
    #[must_use]
    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// The executor's configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Validates, decodes and runs a batch from a request body.
    pub async fn run_value(&self, body: Value) -> Result<BatchResult> {
        let spec = BatchSpec::from_value(body)?;
        self.run(&spec).await
    }

    /// Runs a batch and aggregates its results.
    pub async fn run(&self, spec: &BatchSpec) -> Result<BatchResult> {
        Ok(self.execute(spec).await?.into_batch_result())
    }

    /// Runs a batch.
    ///
    /// # Errors
    /// Only batch-level problems are errors: an invalid batch or configuration
    /// (`BatchError::Validation`) and references that do not point strictly
    /// backwards (`BatchError::Dependency`). Nothing is dispatched in either
    /// case. Failures of individual sub-requests are reported in the outcome.
    pub async fn execute(&self, spec: &BatchSpec) -> Result<BatchOutcome> {
        self.config.validate()?;
        spec.validate()?;
        let graph = DependencyGraph::build(&spec.requests)
            .inspect_err(|e| warn!(error = %e, "Rejecting batch"))?;

        let parallel = spec.parallel.unwrap_or(self.config.parallel);
        let start_time = Instant::now();
        let mut run = BatchRun::new(spec.len(), self.progress.as_ref());

        info!(requests = spec.len(), parallel, "Starting batch execution");
        run.emit(ProgressEvent::BatchStarted { total: spec.len(), parallel });
        run.start();

        if parallel {
            self.run_parallel(spec, &graph, &mut run).await;
        } else {
            self.run_sequential(spec, &mut run).await;
        }

        let outcome = run.finish(start_time.elapsed());
        let failed = outcome.results.iter().filter(|result| result.is_error()).count();

        info!(
            requests = outcome.results.len(),
            succeeded = outcome.results.len() - failed,
            failed,
            duration_ms = outcome.elapsed.as_millis(),
            "Batch execution completed"
        );
        if let Some(reporter) = &self.progress {
            reporter.emit(ProgressEvent::BatchCompleted {
                total: outcome.results.len(),
                succeeded: outcome.results.len() - failed,
                failed,
                elapsed: outcome.elapsed,
            });
        }

        Ok(outcome)
    }

    async fn run_sequential(&self, spec: &BatchSpec, run: &mut BatchRun<'_>) {
        for (index, request) in spec.requests.iter().enumerate() {
            match substitute_request(request, index, &run.results) {
                Ok(resolved) => {
                    run.dispatched(index, &resolved);
                    let outcome = self.invoker.invoke(&resolved).await;
                    run.complete(index, outcome);
                }
                Err(err) => run.fail_reference(index, &err),
            }
        }
    }

    async fn run_parallel(&self, spec: &BatchSpec, graph: &DependencyGraph, run: &mut BatchRun<'_>) {
        let limit = self.config.max_concurrency.unwrap_or(usize::MAX);
        let mut remaining = graph.in_degrees();
        let mut ready: VecDeque<usize> = graph.independent().collect();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < limit {
                let Some(index) = ready.pop_front() else {
                    break;
                };
                match substitute_request(&spec.requests[index], index, &run.results) {
                    Ok(resolved) => {
                        run.dispatched(index, &resolved);
                        in_flight.push(invoke_one(self.invoker.as_ref(), index, resolved));
                    }
                    Err(err) => {
                        run.fail_reference(index, &err);
                        release_dependents(graph, index, &mut remaining, &mut ready);
                    }
                }
            }

            let Some((index, outcome)) = in_flight.next().await else {
                break;
            };
            run.complete(index, outcome);
            release_dependents(graph, index, &mut remaining, &mut ready);
        }
    }
}

async fn invoke_one(
    invoker: &dyn Invoker,
    index: usize,
    request: SubRequest,
) -> (usize, std::result::Result<SubResult, InvokeError>) {
    let outcome = invoker.invoke(&request).await;
    (index, outcome)
}

/// Marks `index` as available to its dependents and queues the ones that
/// have nothing left to wait for.
fn release_dependents(
    graph: &DependencyGraph,
    index: usize,
    remaining: &mut [usize],
    ready: &mut VecDeque<usize>,
) {
    for &dependent in graph.dependents(index) {
        remaining[dependent] -= 1;
        if remaining[dependent] == 0 {
            debug!(index = dependent, after = index, "Dependencies satisfied");
            ready.push_back(dependent);
        }
    }
}

/// Mutable state of one batch while it runs.
struct BatchRun<'a> {
    results: Vec<Option<SubResult>>,
    states: Vec<SubRequestState>,
    state: BatchState,
    progress: Option<&'a ProgressReporter>,
}

impl<'a> BatchRun<'a> {
    fn new(len: usize, progress: Option<&'a ProgressReporter>) -> Self {
        Self {
            results: vec![None; len],
            states: vec![SubRequestState::Waiting; len],
            state: BatchState::Pending,
            progress,
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(reporter) = self.progress {
            reporter.emit(event);
        }
    }

    fn start(&mut self) {
        self.state = BatchState::Running;
    }

    fn dispatched(&mut self, index: usize, request: &SubRequest) {
        debug!(index, method = %request.method, path = %request.path, "Dispatching sub-request");
        self.states[index] = SubRequestState::Dispatched;
        self.emit(ProgressEvent::RequestDispatched {
            index,
            method: request.method.clone(),
            path: request.path.clone(),
        });
    }

    fn complete(&mut self, index: usize, outcome: std::result::Result<SubResult, InvokeError>) {
        match outcome {
            Ok(result) => {
                debug!(index, status = result.status_code, "Sub-request resolved");
                self.states[index] = SubRequestState::Resolved;
                self.emit(ProgressEvent::RequestCompleted { index, status_code: result.status_code });
                self.results[index] = Some(result);
            }
            Err(err) => {
                warn!(index, error = %err, "Invoker failed");
                self.states[index] = SubRequestState::Failed;
                self.emit(ProgressEvent::RequestFailed { index, error: err.to_string() });
                self.results[index] = Some(SubResult::from(err));
            }
        }
    }

    fn fail_reference(&mut self, index: usize, err: &ReferenceError) {
        warn!(index, error = %err, "Reference resolution failed");
        self.states[index] = SubRequestState::Failed;
        self.emit(ProgressEvent::RequestFailed { index, error: err.to_string() });
        self.results[index] = Some(SubResult::error(500, err.to_string()));
    }

    fn finish(self, elapsed: Duration) -> BatchOutcome {
        let results = self
            .results
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| SubResult::error(500, "request was never dispatched")))
            .collect();

        BatchOutcome { results, states: self.states, state: BatchState::Complete, elapsed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records dispatched paths and answers from a fixed table.
    #[derive(Default)]
    struct TableInvoker {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Invoker for TableInvoker {
        async fn invoke(&self, request: &SubRequest) -> std::result::Result<SubResult, InvokeError> {
            self.calls.lock().unwrap().push(request.path.clone());
            match request.path.as_str() {
                "/users/0" => Ok(SubResult::ok(json!({"id": 0, "name": "Ben"}))),
                "/messages/0" => Ok(SubResult::ok(json!({"id": 0, "user_id": 0}))),
                "/down" => Err(InvokeError::Transport("connection refused".to_string())),
                "/echo" => Ok(SubResult::ok(request.payload.clone().unwrap_or(Value::Null))),
                path if path.starts_with("/users/") => Ok(SubResult::ok(json!({"path": path}))),
                _ => Ok(SubResult::new(404, Value::Null)),
            }
        }
    }

    fn executor(invoker: Arc<TableInvoker>, config: BatchConfig) -> BatchExecutor {
        BatchExecutor::new(invoker, config)
    }

    #[tokio::test]
    async fn test_execute_resolves_references_in_both_modes() {
        for parallel in [true, false] {
            let invoker = Arc::new(TableInvoker::default());
            let spec = BatchSpec::new(vec![
                SubRequest::new("/users/0"),
                SubRequest::new("/users/$$0.name/profile"),
            ])
            .with_parallel(parallel);

            let outcome = executor(invoker.clone(), BatchConfig::default())
                .execute(&spec)
                .await
                .unwrap();

            assert_eq!(outcome.state, BatchState::Complete);
            assert_eq!(outcome.states, vec![SubRequestState::Resolved; 2]);
            assert_eq!(outcome.results[1].body, json!({"path": "/users/Ben/profile"}));
            assert_eq!(*invoker.calls.lock().unwrap(), vec!["/users/0", "/users/Ben/profile"]);
        }
    }

    #[tokio::test]
    async fn test_reference_error_fails_only_its_position() {
        let invoker = Arc::new(TableInvoker::default());
        let spec = BatchSpec::new(vec![
            SubRequest::new("/users/0"),
            SubRequest::new("/users/$$0.missing"),
            SubRequest::new("/messages/0"),
        ]);

        let outcome =
            executor(invoker.clone(), BatchConfig::default()).execute(&spec).await.unwrap();

        assert_eq!(
            outcome.states,
            vec![SubRequestState::Resolved, SubRequestState::Failed, SubRequestState::Resolved]
        );
        assert_eq!(outcome.results[1].status_code, 500);
        assert_eq!(outcome.results[1].body["error"], "Internal Server Error");
        assert!(outcome.results[1].body["message"].as_str().unwrap().contains("missing"));
        assert_eq!(outcome.results[2].body["id"], 0);
        assert!(!invoker.calls.lock().unwrap().iter().any(|path| path.contains("missing")));
    }

    #[tokio::test]
    async fn test_invoker_error_becomes_result() {
        let invoker = Arc::new(TableInvoker::default());
        let spec = BatchSpec::new(vec![SubRequest::new("/down"), SubRequest::new("/nowhere")]);

        let outcome = executor(invoker, BatchConfig::default()).execute(&spec).await.unwrap();

        assert_eq!(outcome.states, vec![SubRequestState::Failed, SubRequestState::Resolved]);
        assert_eq!(outcome.results[0].status_code, 502);
        assert_eq!(outcome.results[1].status_code, 404);

        let result = outcome.into_batch_result();
        assert_eq!(result.failed, 2);
        assert_eq!(result.responses[1], json!({"statusCode": 404, "error": "Not Found"}));
    }

    #[tokio::test]
    async fn test_dependency_error_dispatches_nothing() {
        let invoker = Arc::new(TableInvoker::default());
        let spec = BatchSpec::new(vec![SubRequest::new("/users/$$1.id"), SubRequest::new("/users/0")]);

        let err = executor(invoker.clone(), BatchConfig::default()).execute(&spec).await.unwrap_err();

        assert_eq!(err, crate::BatchError::Dependency { index: 0, source_index: 1 });
        assert!(invoker.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let invoker = Arc::new(TableInvoker::default());
        let spec = BatchSpec::new(vec![SubRequest::new("/users/0")]);
        let config = BatchConfig::default().with_max_concurrency(0);

        let err = executor(invoker, config).execute(&spec).await.unwrap_err();
        assert!(matches!(err, crate::BatchError::Validation(_)));
    }

    #[tokio::test]
    async fn test_progress_events_follow_dispatch_order() {
        let invoker = Arc::new(TableInvoker::default());
        let reporter = ProgressReporter::new();
        let mut rx = reporter.subscribe();
        let spec = BatchSpec::new(vec![SubRequest::new("/users/0")]).with_parallel(false);

        executor(invoker, BatchConfig::default())
            .with_progress(reporter)
            .execute(&spec)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), ProgressEvent::BatchStarted { total: 1, parallel: false });
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::RequestDispatched {
                index: 0,
                method: "get".to_string(),
                path: "/users/0".to_string()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::RequestCompleted { index: 0, status_code: 200 }
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::BatchCompleted { total: 1, succeeded: 1, failed: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_run_value_decodes_and_aggregates() {
        let invoker = Arc::new(TableInvoker::default());
        let result = executor(invoker, BatchConfig::default())
            .run_value(json!({"requests": [{"method": "post", "path": "/echo", "payload": "Hello!"}]}))
            .await
            .unwrap();
        assert_eq!(result.into_value(), json!(["Hello!"]));
    }
}
