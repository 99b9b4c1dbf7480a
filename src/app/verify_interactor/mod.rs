// Verify interactor - Orchestrates output verification use case

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::errors::*;
use crate::domain::model::TimeSpec;
use crate::domain::rules::OutputExpectation;
use crate::output::{OutputVerifier, VerificationReport};
use crate::ports::*;

/// Duration tolerance used when no frame rate is expected
const DEFAULT_TOLERANCE_SECS: f64 = 0.1;

/// Request for output verification
#[derive(Debug, Clone, Default)]
pub struct VerifyRequest {
    pub path: PathBuf,
    pub duration: Option<f64>,
    pub dimensions: Option<(u32, u32)>,
    pub fps: Option<f64>,
    /// Allowed duration deviation in seconds; defaults to one expected frame
    pub tolerance: Option<f64>,
}

impl VerifyRequest {
    pub fn expectation(&self) -> OutputExpectation {
        let tolerance = self.tolerance.unwrap_or_else(|| match self.fps {
            Some(fps) if fps > 0.0 => 1.0 / fps,
            _ => DEFAULT_TOLERANCE_SECS,
        });
        OutputExpectation {
            duration: self.duration.map(TimeSpec::from_seconds),
            dimensions: self.dimensions,
            fps: self.fps,
            tolerance,
        }
    }
}

/// Interactor for output verification use case
pub struct VerifyInteractor {
    verifier: OutputVerifier,
}

impl VerifyInteractor {
    pub fn new(probe_port: Arc<dyn ProbePort>) -> Self {
        Self {
            verifier: OutputVerifier::new(probe_port),
        }
    }

    /// Execute output verification
    pub async fn execute(&self, request: VerifyRequest) -> Result<VerificationReport, DomainError> {
        if !request.path.is_file() {
            return Err(ValidationError::parameter(format!(
                "output file does not exist: {}",
                request.path.display()
            ))
            .into());
        }
        self.verifier
            .verify(&request.path, &request.expectation())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_follows_expected_fps() {
        let request = VerifyRequest {
            path: PathBuf::from("out.mp4"),
            duration: Some(5.0),
            fps: Some(50.0),
            ..Default::default()
        };
        let expectation = request.expectation();
        assert_eq!(expectation.tolerance, 0.02);
        assert_eq!(expectation.duration, Some(TimeSpec::from_seconds(5.0)));

        let request = VerifyRequest {
            duration: Some(5.0),
            ..Default::default()
        };
        assert_eq!(request.expectation().tolerance, DEFAULT_TOLERANCE_SECS);
    }

    #[test]
    fn test_explicit_tolerance_wins() {
        let request = VerifyRequest {
            fps: Some(30.0),
            tolerance: Some(0.5),
            ..Default::default()
        };
        assert_eq!(request.expectation().tolerance, 0.5);
    }
}
