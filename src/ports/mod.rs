// Ports - Interface definitions (contracts)

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::domain::rules::KeyframeWindow;

/// Port for media file probing and analysis
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// Probe media file and return its metadata snapshot
    async fn probe_media(&self, file_path: &Path) -> Result<MediaInfo, DomainError>;

    /// Keyframe timestamps (seconds) of the primary video stream inside `window`
    async fn probe_keyframes(
        &self,
        file_path: &Path,
        window: KeyframeWindow,
    ) -> Result<Vec<f64>, DomainError>;
}

/// Progress sample reported by a running backend job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendProgress {
    /// Media time written to the output so far, in seconds
    pub processed_seconds: f64,
    pub frame: Option<u64>,
    /// Encoding speed relative to realtime
    pub speed: Option<f64>,
    /// Backend signalled the end of processing
    pub finished: bool,
}

/// Raw exit of a backend job, before classification
#[derive(Debug, Clone, PartialEq)]
pub enum BackendExit {
    Success,
    /// The job stopped because the cancel signal fired
    Cancelled,
    Exited {
        code: Option<i32>,
        diagnostics: String,
    },
    LaunchFailed(String),
}

/// Sink for progress samples; must not block
pub type ProgressSink = Arc<dyn Fn(BackendProgress) + Send + Sync>;

/// Becomes `true` when the job should stop
pub type CancelSignal = watch::Receiver<bool>;

/// Resolves once `signal` turns true. Never resolves if the sender goes away first.
pub async fn cancellation(signal: &mut CancelSignal) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Port for running execution plans
#[async_trait]
pub trait MediaBackendPort: Send + Sync {
    /// Run `plan`, writing the result to `output`.
    ///
    /// `output` is a working path chosen by the executor, not necessarily
    /// `plan.output()`. Implementations stop promptly once `cancel` turns true.
    async fn run(
        &self,
        plan: &ExecutionPlan,
        output: &Path,
        progress: ProgressSink,
        cancel: CancelSignal,
    ) -> BackendExit;
}
