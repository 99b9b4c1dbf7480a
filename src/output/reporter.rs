//! Conversion of raw execution outcomes into operation results

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::errors::{BackendError, DomainError};
use crate::domain::model::OperationResult;
use crate::domain::rules::{OutputExpectation, OutputValidator};
use crate::ports::{BackendExit, ProbePort};

/// Backend diagnostics that mean the job can never work on this input
const UNSUPPORTED_MARKERS: &[&str] = &[
    "Unknown encoder",
    "Encoder not found",
    "Unknown decoder",
    "Decoder not found",
    "not currently supported",
    "Unsupported codec",
    "codec not currently supported in container",
    "Requested output format",
];

/// How a request ended, before classification
#[derive(Debug, Clone)]
pub enum OperationOutcome {
    /// The backend ran to an exit; on success `output` holds the produced file
    Finished {
        exit: BackendExit,
        output: PathBuf,
        expectation: Option<OutputExpectation>,
    },
    /// Stopped at the caller's request
    Cancelled,
    /// Stopped because the request ran past its deadline
    TimedOut(Duration),
    /// Failed before or around the backend run
    Aborted(DomainError),
}

/// Maps outcomes into the closed `OperationResult` taxonomy
#[derive(Clone)]
pub struct OperationResultReporter {
    probe: Arc<dyn ProbePort>,
}

impl OperationResultReporter {
    pub fn new(probe: Arc<dyn ProbePort>) -> Self {
        Self { probe }
    }

    pub async fn report(&self, outcome: OperationOutcome) -> OperationResult {
        match outcome {
            OperationOutcome::Finished {
                exit,
                output,
                expectation,
            } => match classify_exit(exit) {
                Ok(()) => self.verify_output(output, expectation).await,
                Err(None) => OperationResult::cancelled("Operation cancelled"),
                Err(Some(error)) => OperationResult::failure(&error),
            },
            OperationOutcome::Cancelled => OperationResult::cancelled("Operation cancelled"),
            OperationOutcome::TimedOut(limit) => {
                OperationResult::failure(&DomainError::Timeout(limit))
            }
            OperationOutcome::Aborted(error) => OperationResult::failure(&error),
        }
    }

    /// Re-probe a successfully written output
    async fn verify_output(
        &self,
        output: PathBuf,
        expectation: Option<OutputExpectation>,
    ) -> OperationResult {
        let produced = match self.probe.probe_media(&output).await {
            Ok(info) => info,
            Err(e) => {
                return OperationResult::failure(&DomainError::integrity(format!(
                    "cannot read back {}: {}",
                    output.display(),
                    e
                )))
            }
        };

        if produced.total_streams() == 0 {
            return OperationResult::failure(&DomainError::integrity(format!(
                "{} contains no audio or video streams",
                output.display()
            )));
        }

        if let Some(expectation) = expectation {
            let check = OutputValidator::check(&expectation, &produced);
            if !check.overall_valid {
                warn!(
                    "Output {} differs from the request: {:?}",
                    output.display(),
                    check
                );
            }
        }

        let message = match produced.dimensions() {
            Some((width, height)) => format!(
                "Wrote {} ({}, {}x{})",
                output.display(),
                produced.duration,
                width,
                height
            ),
            None => format!("Wrote {} ({})", output.display(), produced.duration),
        };
        info!("{}", message);

        OperationResult::Success {
            output_path: output,
            produced_media_info: produced,
            message,
        }
    }
}

/// Classify a backend exit. `Err(None)` means the job was cancelled.
pub fn classify_exit(exit: BackendExit) -> Result<(), Option<DomainError>> {
    match exit {
        BackendExit::Success => Ok(()),
        BackendExit::Cancelled => Err(None),
        BackendExit::LaunchFailed(message) => Err(Some(DomainError::launch_failed(message))),
        BackendExit::Exited { code, diagnostics } => {
            let diagnostics = diagnostics.trim();
            let error = match unsupported_reason(diagnostics) {
                Some(reason) => BackendError::Unsupported(reason.to_string()),
                None => BackendError::NonZeroExit {
                    code,
                    diagnostics: if diagnostics.is_empty() {
                        "no diagnostics".to_string()
                    } else {
                        diagnostics.to_string()
                    },
                },
            };
            Err(Some(error.into()))
        }
    }
}

/// First diagnostics line naming an unsupported codec or format
fn unsupported_reason(diagnostics: &str) -> Option<&str> {
    diagnostics
        .lines()
        .map(str::trim)
        .find(|line| UNSUPPORTED_MARKERS.iter().any(|marker| line.contains(marker)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use async_trait::async_trait;

    use crate::domain::errors::ErrorKind;
    use crate::domain::model::{MediaInfo, TimeSpec, VideoStreamInfo};
    use crate::domain::rules::KeyframeWindow;

    struct FixedProbe(Option<MediaInfo>);

    #[async_trait]
    impl ProbePort for FixedProbe {
        async fn probe_media(&self, _file_path: &Path) -> Result<MediaInfo, DomainError> {
            self.0
                .clone()
                .ok_or_else(|| DomainError::unsupported("Invalid data found when processing input"))
        }

        async fn probe_keyframes(
            &self,
            _file_path: &Path,
            _window: KeyframeWindow,
        ) -> Result<Vec<f64>, DomainError> {
            Ok(Vec::new())
        }
    }

    fn media(streams: bool) -> MediaInfo {
        MediaInfo {
            path: PathBuf::from("out.mp4"),
            container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            duration: TimeSpec::from_seconds(5.0),
            file_size: 1000,
            bit_rate: None,
            video: streams.then(|| VideoStreamInfo::new(0, "h264", 640, 360, 30.0)),
            audio_streams: Vec::new(),
        }
    }

    fn finished(exit: BackendExit) -> OperationOutcome {
        OperationOutcome::Finished {
            exit,
            output: PathBuf::from("out.mp4"),
            expectation: None,
        }
    }

    #[tokio::test]
    async fn test_success_carries_probed_media() {
        let reporter = OperationResultReporter::new(Arc::new(FixedProbe(Some(media(true)))));
        let result = reporter.report(finished(BackendExit::Success)).await;
        assert!(result.is_success());
        assert_eq!(result.produced_media_info().unwrap().dimensions(), Some((640, 360)));
        assert!(result.message().contains("640x360"));
    }

    #[tokio::test]
    async fn test_unreadable_output_is_integrity_error() {
        let reporter = OperationResultReporter::new(Arc::new(FixedProbe(None)));
        let result = reporter.report(finished(BackendExit::Success)).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::IntegrityError));

        let reporter = OperationResultReporter::new(Arc::new(FixedProbe(Some(media(false)))));
        let result = reporter.report(finished(BackendExit::Success)).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::IntegrityError));
    }

    #[tokio::test]
    async fn test_backend_exits_map_to_kinds() {
        let reporter = OperationResultReporter::new(Arc::new(FixedProbe(None)));

        let result = reporter
            .report(finished(BackendExit::LaunchFailed("ffmpeg: not found".into())))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::ProcessLaunchFailed));

        let result = reporter
            .report(finished(BackendExit::Exited {
                code: Some(1),
                diagnostics: "moov atom not found\n".into(),
            }))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::NonZeroExit));
        assert!(result.message().contains("moov atom not found"));

        let result = reporter
            .report(finished(BackendExit::Exited {
                code: Some(1),
                diagnostics: "[out#0] Unknown encoder 'libx264'".into(),
            }))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Unsupported));

        let result = reporter.report(finished(BackendExit::Cancelled)).await;
        assert!(result.is_cancelled());
    }

    #[tokio::test]
    async fn test_timeout_and_abort() {
        let reporter = OperationResultReporter::new(Arc::new(FixedProbe(None)));
        let result = reporter
            .report(OperationOutcome::TimedOut(Duration::from_secs(2)))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::TimeoutError));

        let result = reporter
            .report(OperationOutcome::Aborted(DomainError::unsupported("stream copy")))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Unsupported));
    }
}
