//! Pipeline execution engine module

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, ValidationError};
use crate::domain::model::*;
use crate::domain::rules::{KeyframeWindow, OutputExpectation, PlanBuilder};
use crate::output::{OperationOutcome, OperationReport, OperationResultReporter};
use crate::ports::{
    cancellation, BackendExit, BackendProgress, CancelSignal, MediaBackendPort, ProbePort,
    ProgressSink,
};

pub mod handle;
pub mod progress;
pub mod registry;

pub use handle::{RequestEvent, RequestHandle, RequestId, Subscription};
pub use progress::{ProgressCadence, ProgressThrottle};
pub use registry::{OutputLease, OutputRegistry};

use handle::RequestShared;

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How trims choose between stream copy and re-encode
    pub trim_strategy: TrimStrategy,
    /// Encoder preset tier for re-encoded trims and exports
    pub encoder_tier: EncoderTier,
    /// Minimum milliseconds between progress events
    pub progress_interval_ms: u64,
    /// Minimum progress gained between progress events
    pub progress_step: f64,
    /// How long a stopped backend gets to exit before it is abandoned
    pub cancel_grace_ms: u64,
    /// Timeout for requests that do not set their own
    pub default_timeout_secs: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            trim_strategy: TrimStrategy::Auto,
            encoder_tier: EncoderTier::Fast,
            progress_interval_ms: 1000,
            progress_step: 0.05,
            cancel_grace_ms: 5000,
            default_timeout_secs: None,
        }
    }
}

impl ExecutorConfig {
    pub fn cadence(&self) -> ProgressCadence {
        ProgressCadence {
            interval: Duration::from_millis(self.progress_interval_ms),
            step: self.progress_step,
        }
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }
}

/// Runs validated requests against the media backend, one worker task per request
#[derive(Clone)]
pub struct PipelineExecutor {
    probe: Arc<dyn ProbePort>,
    backend: Arc<dyn MediaBackendPort>,
    reporter: OperationResultReporter,
    config: ExecutorConfig,
    registry: OutputRegistry,
}

impl PipelineExecutor {
    pub fn new(
        probe: Arc<dyn ProbePort>,
        backend: Arc<dyn MediaBackendPort>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            reporter: OperationResultReporter::new(probe.clone()),
            probe,
            backend,
            config,
            registry: OutputRegistry::new(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn registry(&self) -> &OutputRegistry {
        &self.registry
    }

    /// Start executing `request` on a new worker task.
    ///
    /// Fails synchronously with a conflict if another request is writing the
    /// same output path. Must be called from within a tokio runtime.
    pub fn execute(&self, request: ValidatedRequest) -> Result<RequestHandle, DomainError> {
        let id = RequestId::new();
        let lease = self.registry.claim(request.output(), id)?;
        let (shared, cancel) =
            RequestShared::new(id, request.kind(), request.output().to_path_buf());
        let handle = RequestHandle::new(shared.clone());

        info!(
            "Request {}: {} {} -> {}",
            id,
            request.kind(),
            request.source().display(),
            request.output().display()
        );

        let worker = Worker {
            probe: self.probe.clone(),
            backend: self.backend.clone(),
            reporter: self.reporter.clone(),
            config: self.config.clone(),
            shared: shared.clone(),
            cancel,
            lease,
        };
        let output = request.output().to_path_buf();
        let task = tokio::spawn(worker.run(request));
        tokio::spawn(supervise(task, shared, output));

        Ok(handle)
    }

    /// Request cancellation. Returns false if the request already finished.
    pub fn cancel(&self, handle: &RequestHandle) -> bool {
        let requested = handle.request_cancel();
        if requested {
            info!("Cancellation requested for request {}", handle.id());
        }
        requested
    }

    pub fn subscribe(&self, handle: &RequestHandle) -> Subscription {
        handle.subscribe()
    }
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    limit: Duration,
    at: tokio::time::Instant,
}

impl Deadline {
    /// `None` when the limit lies beyond what the clock can represent
    fn after(limit: Duration) -> Option<Self> {
        let at = tokio::time::Instant::now().checked_add(limit)?;
        Some(Self { limit, at })
    }
}

/// Resolve the request with a failure if its worker dies without finishing it
async fn supervise(task: JoinHandle<()>, shared: Arc<RequestShared>, output: PathBuf) {
    let Err(e) = task.await else {
        return;
    };
    warn!("Worker for request {} stopped: {}", shared.id(), e);

    let error = DomainError::integrity(format!("request worker stopped unexpectedly: {}", e));
    shared.finish(OperationReport {
        request_id: shared.id(),
        kind: shared.kind(),
        output,
        strategy: None,
        decision: None,
        result: OperationResult::failure(&error),
        started_at: shared.submitted_at(),
        finished_at: Utc::now(),
    });
}

/// Why a phase of the worker stopped early
enum Interrupt {
    Cancelled,
    TimedOut(Duration),
}

impl From<Interrupt> for OperationOutcome {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => OperationOutcome::Cancelled,
            Interrupt::TimedOut(limit) => OperationOutcome::TimedOut(limit),
        }
    }
}

/// Result of driving a request up to the backend exit
struct Drive {
    plan: Option<ExecutionPlan>,
    outcome: OperationOutcome,
    /// The produced file was moved to the destination path
    persisted: bool,
}

impl Drive {
    fn stopped(plan: Option<ExecutionPlan>, outcome: impl Into<OperationOutcome>) -> Self {
        Self {
            plan,
            outcome: outcome.into(),
            persisted: false,
        }
    }
}

struct Worker {
    probe: Arc<dyn ProbePort>,
    backend: Arc<dyn MediaBackendPort>,
    reporter: OperationResultReporter,
    config: ExecutorConfig,
    shared: Arc<RequestShared>,
    cancel: CancelSignal,
    lease: OutputLease,
}

impl Worker {
    async fn run(mut self, request: ValidatedRequest) {
        self.shared.transition(RequestState::Executing);

        let deadline = request
            .options()
            .timeout
            .or_else(|| self.config.default_timeout())
            .and_then(Deadline::after);

        let drive = self.drive(&request, deadline).await;
        let result = self.reporter.report(drive.outcome).await;
        if result.is_success() {
            self.shared.publish_progress(1.0);
        }

        if !result.is_success() && drive.persisted && !request.options().retain_partial {
            if let Err(e) = tokio::fs::remove_file(request.output()).await {
                warn!("Failed to remove rejected output {}: {}", request.output().display(), e);
            }
        }

        let report = OperationReport {
            request_id: self.shared.id(),
            kind: self.shared.kind(),
            output: request.output().to_path_buf(),
            strategy: drive.plan.as_ref().map(ExecutionPlan::strategy),
            decision: drive.plan.as_ref().map(|plan| plan.decision().to_string()),
            result,
            started_at: self.shared.submitted_at(),
            finished_at: Utc::now(),
        };

        match &report.result {
            OperationResult::Success { .. } => info!(
                "Request {} succeeded in {} ms",
                report.request_id,
                report.elapsed().num_milliseconds()
            ),
            OperationResult::Failure { kind, message } => {
                warn!("Request {} failed ({}): {}", report.request_id, kind, message)
            }
            OperationResult::Cancelled { .. } => {
                info!("Request {} cancelled", report.request_id)
            }
        }

        // The output path is free again before anyone can observe the result
        let Worker { lease, shared, .. } = self;
        drop(lease);
        shared.finish(report);
    }

    async fn drive(&mut self, request: &ValidatedRequest, deadline: Option<Deadline>) -> Drive {
        let builder = PlanBuilder::new(self.config.trim_strategy, self.config.encoder_tier);

        let keyframes = if builder.needs_keyframes(request) {
            match self.keyframes_near_start(request, deadline).await {
                Ok(keyframes) => keyframes,
                Err(interrupt) => return Drive::stopped(None, interrupt),
            }
        } else {
            None
        };

        let plan = match builder.build(request, keyframes.as_deref()) {
            Ok(plan) => plan,
            Err(e) => return Drive::stopped(None, OperationOutcome::Aborted(e)),
        };
        info!(
            "Request {}: {} plan [{}] ({})",
            self.shared.id(),
            plan.strategy(),
            plan.stage_names().join(" -> "),
            plan.decision()
        );

        let working = match working_path(plan.output()) {
            Ok(path) => path,
            Err(e) => return Drive::stopped(Some(plan), OperationOutcome::Aborted(e)),
        };
        debug!("Writing to working file {}", working.display());

        let (stop, stop_signal) = watch::channel(false);
        let sink = self.progress_sink(plan.expected_duration());
        let mut run = self.backend.run(&plan, &working, sink, stop_signal);

        let finished = match interruptible(&mut run, &mut self.cancel, deadline).await {
            Ok(exit) => Ok(exit),
            Err(interrupt) => {
                stop.send_replace(true);
                let grace = self.config.cancel_grace();
                match tokio::time::timeout(grace, &mut run).await {
                    Ok(exit) => debug!("Backend stopped with {:?}", exit),
                    Err(_) => warn!(
                        "Backend did not stop within {} ms, abandoning it",
                        grace.as_millis()
                    ),
                }
                Err(interrupt)
            }
        };
        // Dropping the run releases the backend job
        drop(run);

        let exit = match finished {
            Ok(exit) => exit,
            Err(interrupt) => {
                discard_partial(working, request.options().retain_partial);
                return Drive::stopped(Some(plan), interrupt);
            }
        };

        if exit != BackendExit::Success {
            discard_partial(working, request.options().retain_partial);
            let outcome = OperationOutcome::Finished {
                exit,
                output: plan.output().to_path_buf(),
                expectation: None,
            };
            return Drive::stopped(Some(plan), outcome);
        }

        let persisted = if request.options().overwrite {
            working.persist(plan.output())
        } else {
            working.persist_noclobber(plan.output())
        };
        if let Err(e) = persisted {
            let error = if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                DomainError::from(ValidationError::parameter(format!(
                    "output {} already exists",
                    plan.output().display()
                )))
            } else {
                DomainError::integrity(format!(
                    "cannot move output into {}: {}",
                    plan.output().display(),
                    e.error
                ))
            };
            return Drive::stopped(Some(plan), OperationOutcome::Aborted(error));
        }

        let outcome = OperationOutcome::Finished {
            exit,
            output: plan.output().to_path_buf(),
            expectation: Some(OutputExpectation::for_request(request)),
        };
        Drive {
            plan: Some(plan),
            outcome,
            persisted: true,
        }
    }

    /// Keyframes around the trim start; `Ok(None)` when they cannot be probed
    async fn keyframes_near_start(
        &mut self,
        request: &ValidatedRequest,
        deadline: Option<Deadline>,
    ) -> Result<Option<Vec<f64>>, Interrupt> {
        let start = match request.operation() {
            ValidatedOperation::Trim(range) => range.start.seconds,
            ValidatedOperation::Export(_) => return Ok(None),
        };
        let window = KeyframeWindow::around(start);
        let probe = self.probe.clone();
        let lookup = probe.probe_keyframes(request.source(), window);

        match interruptible(lookup, &mut self.cancel, deadline).await? {
            Ok(keyframes) => {
                debug!("Found {} keyframes near {:.3}s", keyframes.len(), start);
                Ok(Some(keyframes))
            }
            Err(e) => {
                warn!("Keyframe probe failed, assuming no keyframe at the cut: {}", e);
                Ok(None)
            }
        }
    }

    fn progress_sink(&self, expected: TimeSpec) -> ProgressSink {
        let throttle = Mutex::new(ProgressThrottle::new(self.config.cadence(), expected.seconds));
        let shared = self.shared.clone();
        Arc::new(move |sample: BackendProgress| {
            let emitted = throttle
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .offer_seconds(sample.processed_seconds, std::time::Instant::now());
            if let Some(fraction) = emitted {
                shared.publish_progress(fraction);
            }
        })
    }
}

/// Await `future` unless the request is cancelled or its deadline passes first
async fn interruptible<F: Future>(
    future: F,
    cancel: &mut CancelSignal,
    deadline: Option<Deadline>,
) -> Result<F::Output, Interrupt> {
    tokio::select! {
        biased;
        _ = cancellation(cancel) => Err(Interrupt::Cancelled),
        limit = deadline_passed(deadline) => Err(Interrupt::TimedOut(limit)),
        output = future => Ok(output),
    }
}

async fn deadline_passed(deadline: Option<Deadline>) -> Duration {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(deadline.at).await;
            deadline.limit
        }
        None => std::future::pending().await,
    }
}

/// Temporary file next to `output` with the same extension, so the backend
/// picks the same muxer and the final rename stays on one filesystem
fn working_path(output: &Path) -> Result<TempPath, DomainError> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let suffix = output
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(".fragcut-")
        .suffix(&suffix)
        .tempfile_in(&dir)
        .map(|file| file.into_temp_path())
        .map_err(|e| {
            DomainError::launch_failed(format!(
                "cannot create working file in {}: {}",
                dir.display(),
                e
            ))
        })
}

fn discard_partial(working: TempPath, retain: bool) {
    if !retain {
        // Dropping the path deletes the file
        return;
    }
    match working.keep() {
        Ok(path) => info!("Keeping partial output at {}", path.display()),
        Err(e) => warn!("Failed to keep partial output: {}", e.error),
    }
}
