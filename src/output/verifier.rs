//! Output verification implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::MediaInfo;
use crate::domain::rules::{OutputExpectation, OutputValidator, ValidationResult};
use crate::ports::ProbePort;

/// Outcome of verifying an existing file against an expectation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub path: PathBuf,
    pub expected_duration: Option<f64>,
    pub expected_dimensions: Option<(u32, u32)>,
    pub expected_fps: Option<f64>,
    pub media_info: MediaInfo,
    pub result: ValidationResult,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.result.overall_valid
    }
}

/// Re-probes produced files and checks them against what was requested
pub struct OutputVerifier {
    probe: Arc<dyn ProbePort>,
}

impl OutputVerifier {
    pub fn new(probe: Arc<dyn ProbePort>) -> Self {
        Self { probe }
    }

    pub async fn verify(
        &self,
        path: &Path,
        expectation: &OutputExpectation,
    ) -> Result<VerificationReport, DomainError> {
        info!("Verifying output: {}", path.display());

        let media_info = self.probe.probe_media(path).await.map_err(|e| {
            DomainError::integrity(format!("cannot read {}: {}", path.display(), e))
        })?;
        if media_info.total_streams() == 0 {
            return Err(DomainError::integrity(format!(
                "{} contains no audio or video streams",
                path.display()
            )));
        }

        let result = OutputValidator::check(expectation, &media_info);
        if result.overall_valid {
            info!("Verification passed");
        } else {
            warn!("Verification failed: {:?}", result);
        }

        Ok(VerificationReport {
            path: path.to_path_buf(),
            expected_duration: expectation.duration.map(|d| d.seconds),
            expected_dimensions: expectation.dimensions,
            expected_fps: expectation.fps,
            media_info,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::domain::errors::ErrorKind;
    use crate::domain::model::{TimeSpec, VideoStreamInfo};
    use crate::domain::rules::KeyframeWindow;

    struct StaticProbe(MediaInfo);

    #[async_trait]
    impl ProbePort for StaticProbe {
        async fn probe_media(&self, _file_path: &Path) -> Result<MediaInfo, DomainError> {
            Ok(self.0.clone())
        }

        async fn probe_keyframes(
            &self,
            _file_path: &Path,
            _window: KeyframeWindow,
        ) -> Result<Vec<f64>, DomainError> {
            Ok(vec![0.0])
        }
    }

    fn vertical_clip() -> MediaInfo {
        MediaInfo {
            path: PathBuf::from("vertical.mp4"),
            container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            duration: TimeSpec::from_seconds(30.0),
            file_size: 2_000_000,
            bit_rate: None,
            video: Some(VideoStreamInfo::new(0, "h264", 1080, 1920, 60.0)),
            audio_streams: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_verify_matching_output() {
        let verifier = OutputVerifier::new(Arc::new(StaticProbe(vertical_clip())));
        let expectation = OutputExpectation {
            duration: Some(TimeSpec::from_seconds(30.0)),
            dimensions: Some((1080, 1920)),
            fps: Some(60.0),
            tolerance: 1.0 / 60.0,
        };

        let report = verifier
            .verify(Path::new("vertical.mp4"), &expectation)
            .await
            .unwrap();
        assert!(report.passed());
        assert_eq!(report.result.duration_difference_ms, Some(0));
    }

    #[tokio::test]
    async fn test_verify_reports_mismatch() {
        let verifier = OutputVerifier::new(Arc::new(StaticProbe(vertical_clip())));
        let expectation = OutputExpectation {
            duration: Some(TimeSpec::from_seconds(5.0)),
            dimensions: None,
            fps: None,
            tolerance: 0.04,
        };

        let report = verifier
            .verify(Path::new("vertical.mp4"), &expectation)
            .await
            .unwrap();
        assert!(!report.passed());
        assert!(!report.result.duration_valid);
    }

    #[tokio::test]
    async fn test_empty_container_is_integrity_error() {
        let mut empty = vertical_clip();
        empty.video = None;
        let verifier = OutputVerifier::new(Arc::new(StaticProbe(empty)));
        let expectation = OutputExpectation {
            duration: None,
            dimensions: None,
            fps: None,
            tolerance: 0.04,
        };

        let err = verifier
            .verify(Path::new("vertical.mp4"), &expectation)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityError);
    }
}
