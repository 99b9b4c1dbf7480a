//! Request handles, result delivery and event subscriptions

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::model::{EditKind, OperationResult, RequestState};
use crate::output::OperationReport;
use crate::ports::CancelSignal;

/// Buffered events per request; slow subscribers skip ahead on overflow
const EVENT_CAPACITY: usize = 64;

/// Unique identifier of a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event delivered to subscribers of a request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    /// Monotonic completion fraction in [0, 1]
    Progress(f64),
    /// Terminal result; always the last event
    Finished(OperationResult),
}

/// State shared between a request's worker and every handle to it
#[derive(Debug)]
pub(crate) struct RequestShared {
    id: RequestId,
    kind: EditKind,
    output: PathBuf,
    submitted_at: DateTime<Utc>,
    state: watch::Sender<RequestState>,
    cancel: watch::Sender<bool>,
    events: Mutex<Option<broadcast::Sender<RequestEvent>>>,
    report: watch::Sender<Option<OperationReport>>,
}

impl RequestShared {
    pub(crate) fn new(id: RequestId, kind: EditKind, output: PathBuf) -> (Arc<Self>, CancelSignal) {
        let (cancel, cancel_rx) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let shared = Arc::new(Self {
            id,
            kind,
            output,
            submitted_at: Utc::now(),
            state: watch::channel(RequestState::Validated).0,
            cancel,
            events: Mutex::new(Some(events)),
            report: watch::channel(None).0,
        });
        (shared, cancel_rx)
    }

    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) fn kind(&self) -> EditKind {
        self.kind
    }

    pub(crate) fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Move to `next` if the lifecycle allows it
    pub(crate) fn transition(&self, next: RequestState) -> bool {
        let id = self.id;
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                debug!("Request {}: {} -> {}", id, state, next);
                *state = next;
                true
            } else {
                warn!("Request {}: refusing transition {} -> {}", id, state, next);
                false
            }
        })
    }

    pub(crate) fn publish_progress(&self, fraction: f64) {
        if let Some(events) = self.events_guard().as_ref() {
            // No receivers is fine
            let _ = events.send(RequestEvent::Progress(fraction));
        }
    }

    /// Store the terminal report and close the event stream.
    ///
    /// Only the first call has any effect.
    pub(crate) fn finish(&self, report: OperationReport) {
        if self.report.borrow().is_some() {
            return;
        }
        let result = report.result.clone();

        // Waiters must observe the terminal state together with the report
        self.transition(result.terminal_state());
        let stored = self.report.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(report);
            true
        });
        if !stored {
            return;
        }

        if let Some(events) = self.events_guard().take() {
            let _ = events.send(RequestEvent::Finished(result));
        }
    }

    fn events_guard(&self) -> std::sync::MutexGuard<'_, Option<broadcast::Sender<RequestEvent>>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Caller-side handle to a submitted request.
///
/// Cheap to clone; every clone observes the same request.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    shared: Arc<RequestShared>,
}

impl RequestHandle {
    pub(crate) fn new(shared: Arc<RequestShared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> RequestId {
        self.shared.id
    }

    pub fn kind(&self) -> EditKind {
        self.shared.kind
    }

    pub fn output(&self) -> &Path {
        &self.shared.output
    }

    pub fn state(&self) -> RequestState {
        *self.shared.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.report.borrow().is_some()
    }

    pub fn is_cancel_requested(&self) -> bool {
        *self.shared.cancel.borrow()
    }

    /// Terminal result, if the request has finished
    pub fn result(&self) -> Option<OperationResult> {
        self.shared
            .report
            .borrow()
            .as_ref()
            .map(|report| report.result.clone())
    }

    pub fn report(&self) -> Option<OperationReport> {
        self.shared.report.borrow().clone()
    }

    /// Wait for the terminal result
    pub async fn wait(&self) -> OperationResult {
        self.wait_report().await.result
    }

    /// Wait for the full operation report
    pub async fn wait_report(&self) -> OperationReport {
        let mut report = self.shared.report.subscribe();
        loop {
            let current = report.borrow_and_update().clone();
            if let Some(current) = current {
                return current;
            }
            if report.changed().await.is_err() {
                // The sender lives in `shared`, which this handle keeps alive
                std::future::pending::<()>().await;
            }
        }
    }

    /// Ask the worker to stop. Returns false if the request already finished.
    pub(crate) fn request_cancel(&self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.shared.cancel.send_replace(true);
        true
    }

    pub(crate) fn subscribe(&self) -> Subscription {
        let events = self
            .shared
            .events_guard()
            .as_ref()
            .map(|events| events.subscribe());
        Subscription {
            handle: self.clone(),
            events,
            done: false,
        }
    }
}

/// Stream of events for one request, ending with `RequestEvent::Finished`
#[derive(Debug)]
pub struct Subscription {
    handle: RequestHandle,
    events: Option<broadcast::Receiver<RequestEvent>>,
    done: bool,
}

impl Subscription {
    pub fn request_id(&self) -> RequestId {
        self.handle.id()
    }

    /// Next event, or `None` once the terminal event has been delivered
    pub async fn next(&mut self) -> Option<RequestEvent> {
        if self.done {
            return None;
        }

        if let Some(events) = self.events.as_mut() {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if matches!(event, RequestEvent::Finished(_)) {
                            self.done = true;
                        }
                        return Some(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(
                            "Subscriber of request {} skipped {} events",
                            self.handle.id(),
                            skipped
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }

        // Subscribed after completion, or the stream closed under us
        self.done = true;
        Some(RequestEvent::Finished(self.handle.wait().await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_for(shared: &RequestShared, result: OperationResult) -> OperationReport {
        OperationReport {
            request_id: shared.id(),
            kind: shared.kind(),
            output: PathBuf::from("out.mp4"),
            strategy: None,
            decision: None,
            result,
            started_at: shared.submitted_at(),
            finished_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_sees_progress_then_finish() {
        let (shared, _cancel) = RequestShared::new(RequestId::new(), EditKind::Trim, "out.mp4".into());
        let handle = RequestHandle::new(shared.clone());
        let mut subscription = handle.subscribe();

        assert!(shared.transition(RequestState::Executing));
        shared.publish_progress(0.5);
        shared.finish(report_for(&shared, OperationResult::cancelled("stopped")));

        assert_eq!(subscription.next().await, Some(RequestEvent::Progress(0.5)));
        assert!(matches!(
            subscription.next().await,
            Some(RequestEvent::Finished(OperationResult::Cancelled { .. }))
        ));
        assert_eq!(subscription.next().await, None);
        assert_eq!(handle.state(), RequestState::Cancelled);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_stored_result() {
        let (shared, _cancel) = RequestShared::new(RequestId::new(), EditKind::Export, "out.mp4".into());
        let handle = RequestHandle::new(shared.clone());
        shared.transition(RequestState::Executing);
        shared.finish(report_for(&shared, OperationResult::cancelled("stopped")));

        let mut late = handle.subscribe();
        assert!(matches!(late.next().await, Some(RequestEvent::Finished(_))));
        assert_eq!(late.next().await, None);
        assert!(handle.result().unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn test_only_first_result_counts() {
        let (shared, _cancel) = RequestShared::new(RequestId::new(), EditKind::Trim, "out.mp4".into());
        let handle = RequestHandle::new(shared.clone());
        shared.transition(RequestState::Executing);

        shared.finish(report_for(&shared, OperationResult::cancelled("first")));
        shared.finish(report_for(&shared, OperationResult::cancelled("second")));

        assert_eq!(handle.wait().await.message(), "first");
        assert!(!handle.request_cancel());
    }

    #[test]
    fn test_handles_start_validated() {
        let (shared, _cancel) = RequestShared::new(RequestId::new(), EditKind::Trim, "out.mp4".into());
        let handle = RequestHandle::new(shared.clone());
        assert_eq!(handle.state(), RequestState::Validated);

        assert!(!shared.transition(RequestState::Validating));
        assert!(!shared.transition(RequestState::Rejected));
        assert_eq!(handle.state(), RequestState::Validated);
    }

    #[test]
    fn test_cancel_flag_reaches_worker() {
        let (shared, cancel) = RequestShared::new(RequestId::new(), EditKind::Trim, "out.mp4".into());
        let handle = RequestHandle::new(shared);
        assert!(!*cancel.borrow());
        assert!(handle.request_cancel());
        assert!(*cancel.borrow());
        assert!(handle.is_cancel_requested());
    }
}
