//! Progress reporting for batch execution.
//!
//! This module broadcasts state transitions of a running batch so callers can
//! observe dispatch order and completion without touching the scheduler.

use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

/// Lifecycle of a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Accepted, nothing dispatched yet.
    Pending,
    /// At least one sub-request has been considered for dispatch.
    Running,
    /// Every sub-request is resolved or failed.
    Complete,
}

/// Lifecycle of one sub-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubRequestState {
    /// Waiting for its dependencies (or its turn in sequential mode).
    Waiting,
    /// Handed to the invoker.
    Dispatched,
    /// The invoker produced a result, whatever its status.
    Resolved,
    /// A reference could not be resolved, or the invoker returned an error.
    Failed,
}

impl SubRequestState {
    /// Returns `true` for `Resolved` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Failed)
    }
}

/// Progress event types.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A batch has started.
    BatchStarted {
        /// Number of sub-requests.
        total: usize,
        /// Effective execution mode.
        parallel: bool,
    },
    /// A sub-request was handed to the invoker.
    RequestDispatched {
        /// Position in the batch.
        index: usize,
        /// Method
        method: String,
        /// Path after substitution.
        path: String,
    },
    /// The invoker produced a result.
    RequestCompleted {
        /// Position in the batch.
        index: usize,
        /// Status returned by the invoker.
        status_code: u16,
    },
    /// A sub-request failed before or during dispatch.
    RequestFailed {
        /// Position in the batch.
        index: usize,
        /// Error message.
        error: String,
    },
    /// Every sub-request has finished.
    BatchCompleted {
        /// Number of sub-requests.
        total: usize,
        /// Results with a status below 400.
        succeeded: usize,
        /// Results with a status of 400 or above.
        failed: usize,
        /// Wall-clock time of the batch.
        elapsed: Duration,
    },
}

/// Progress reporter for batch executors.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    /// Broadcast sender for progress events.
    broadcast_tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressReporter {
    /// Creates a new progress reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Creates a reporter that buffers up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity.max(1));
        Self { broadcast_tx }
    }

    /// Subscribes to progress events.
    ///
    /// Only events emitted after subscribing are received.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Emits a progress event. Without subscribers the event is dropped.
    pub fn emit(&self, event: ProgressEvent) {
        if self.broadcast_tx.send(event).is_err() {
            trace!("No progress subscribers");
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_reporter_broadcasts() {
        let reporter = ProgressReporter::new();
        let mut rx = reporter.subscribe();

        reporter.emit(ProgressEvent::BatchStarted { total: 2, parallel: true });
        reporter.emit(ProgressEvent::RequestCompleted { index: 1, status_code: 404 });

        assert_eq!(rx.recv().await.unwrap(), ProgressEvent::BatchStarted { total: 2, parallel: true });
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::RequestCompleted { index: 1, status_code: 404 }
        );
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let reporter = ProgressReporter::default();
        reporter.emit(ProgressEvent::RequestFailed { index: 0, error: "x".to_string() });
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SubRequestState::Waiting.is_terminal());
        assert!(!SubRequestState::Dispatched.is_terminal());
        assert!(SubRequestState::Resolved.is_terminal());
        assert!(SubRequestState::Failed.is_terminal());
    }
}
