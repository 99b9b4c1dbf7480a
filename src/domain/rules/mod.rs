// Domain rules - Request validation and execution planning policies

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::errors::*;
use crate::domain::model::*;

/// Upper bounds accepted for export parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub max_fps: f64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_width: 7680,
            max_height: 7680,
            max_fps: 240.0,
        }
    }
}

/// Checks edit requests against source media before anything runs
#[derive(Debug, Clone, Default)]
pub struct EditRequestValidator {
    limits: ValidationLimits,
}

impl EditRequestValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Media-independent checks, run before the source is probed
    pub fn check_shape(&self, request: &EditRequest) -> Result<(), ValidationError> {
        self.check_paths(request)?;
        match &request.operation {
            EditOperation::Trim { start, end } => {
                CutRange::new(*start, *end)?;
            }
            EditOperation::Export { width, height, fps } => {
                self.check_export(*width, *height, *fps)?;
            }
        }
        Ok(())
    }

    /// Validate a request against the probed source
    pub fn validate(
        &self,
        request: EditRequest,
        media_info: &MediaInfo,
    ) -> Result<ValidatedRequest, ValidationError> {
        self.check_paths(&request)?;

        let operation = match &request.operation {
            EditOperation::Trim { start, end } => {
                let range = CutRange::new(*start, *end)?;
                range.validate_against_duration(&media_info.duration)?;
                ValidatedOperation::Trim(range)
            }
            EditOperation::Export { width, height, fps } => {
                let target = self.check_export(*width, *height, *fps)?;
                if media_info.primary_video_stream().is_none() {
                    return Err(ValidationError::parameter(format!(
                        "source {} has no video stream to export",
                        media_info.path.display()
                    )));
                }
                ValidatedOperation::Export(target)
            }
        };

        debug!(
            "Validated {} request for {} -> {}",
            request.kind(),
            request.source.display(),
            request.output.display()
        );

        Ok(ValidatedRequest {
            request,
            source_info: media_info.clone(),
            operation,
        })
    }

    fn check_paths(&self, request: &EditRequest) -> Result<(), ValidationError> {
        if request.source.as_os_str().is_empty() {
            return Err(ValidationError::parameter("source path cannot be empty"));
        }
        if request.output.as_os_str().is_empty() {
            return Err(ValidationError::parameter("output path cannot be empty"));
        }
        if request.source == request.output {
            return Err(ValidationError::parameter(
                "output path must differ from the source path",
            ));
        }
        if request.output.extension().map_or(true, |ext| ext.is_empty()) {
            return Err(ValidationError::parameter(format!(
                "output path {} needs a file extension to select the container",
                request.output.display()
            )));
        }
        Ok(())
    }

    fn check_export(&self, width: i64, height: i64, fps: f64) -> Result<ExportTarget, ValidationError> {
        let width = self.check_dimension("width", width, self.limits.max_width)?;
        let height = self.check_dimension("height", height, self.limits.max_height)?;

        if !fps.is_finite() || fps <= 0.0 {
            return Err(ValidationError::parameter(format!(
                "fps must be positive, got {}",
                fps
            )));
        }
        if fps > self.limits.max_fps {
            return Err(ValidationError::parameter(format!(
                "fps {} exceeds the maximum of {}",
                fps, self.limits.max_fps
            )));
        }

        Ok(ExportTarget { width, height, fps })
    }

    fn check_dimension(&self, name: &str, value: i64, max: u32) -> Result<u32, ValidationError> {
        if value <= 0 {
            return Err(ValidationError::parameter(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
        if value > i64::from(max) {
            return Err(ValidationError::parameter(format!(
                "{} {} exceeds the maximum of {}",
                name, value, max
            )));
        }
        // yuv420p output needs even dimensions
        if value % 2 != 0 {
            return Err(ValidationError::parameter(format!(
                "{} must be even, got {}",
                name, value
            )));
        }
        Ok(value as u32)
    }
}

/// Window of the source around the trim start used for keyframe probing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyframeWindow {
    pub start: f64,
    pub end: f64,
}

impl KeyframeWindow {
    /// Probe a few seconds either side of the cut point
    pub fn around(point: f64) -> Self {
        Self {
            start: (point - 5.0).max(0.0),
            end: point + 1.0,
        }
    }
}

/// Builds execution plans from validated requests
pub struct PlanBuilder {
    strategy: TrimStrategy,
    tier: EncoderTier,
}

impl PlanBuilder {
    pub fn new(strategy: TrimStrategy, tier: EncoderTier) -> Self {
        Self { strategy, tier }
    }

    /// Whether the planner needs keyframe positions for this request
    pub fn needs_keyframes(&self, request: &ValidatedRequest) -> bool {
        self.strategy != TrimStrategy::Reencode
            && matches!(request.operation(), ValidatedOperation::Trim(range) if range.start.seconds > 0.0)
    }

    /// Build the plan. `keyframes` holds keyframe timestamps (seconds) near the trim start.
    pub fn build(
        &self,
        request: &ValidatedRequest,
        keyframes: Option<&[f64]>,
    ) -> Result<ExecutionPlan, DomainError> {
        match request.operation() {
            ValidatedOperation::Trim(range) => self.build_trim(request, range, keyframes),
            ValidatedOperation::Export(target) => Ok(self.build_export(request, target)),
        }
    }

    fn build_trim(
        &self,
        request: &ValidatedRequest,
        range: &CutRange,
        keyframes: Option<&[f64]>,
    ) -> Result<ExecutionPlan, DomainError> {
        let (strategy, decision) = match self.strategy {
            TrimStrategy::Reencode => (
                PlanStrategy::Reencode,
                "re-encode requested by configuration".to_string(),
            ),
            TrimStrategy::Copy => match copy_blocker(request, range, keyframes) {
                None => (PlanStrategy::StreamCopy, "stream copy requested".to_string()),
                Some(reason) => {
                    return Err(DomainError::unsupported(format!(
                        "stream copy is not possible: {}",
                        reason
                    )))
                }
            },
            TrimStrategy::Auto => match copy_blocker(request, range, keyframes) {
                None => (
                    PlanStrategy::StreamCopy,
                    "cut points are keyframe-safe for stream copy".to_string(),
                ),
                Some(reason) => (
                    PlanStrategy::Reencode,
                    format!("fell back to re-encode: {}", reason),
                ),
            },
        };

        let stages = match strategy {
            PlanStrategy::StreamCopy => vec![Stage::Demux, Stage::StreamCopy, Stage::Mux],
            PlanStrategy::Reencode => vec![
                Stage::Demux,
                Stage::Decode,
                Stage::Encode(self.tier.settings()),
                Stage::Mux,
            ],
        };

        Ok(ExecutionPlan::new(request, strategy, stages, range.duration(), decision))
    }

    fn build_export(&self, request: &ValidatedRequest, target: &ExportTarget) -> ExecutionPlan {
        let filter = FilterSpec {
            scale: Some((target.width, target.height)),
            fps: Some(target.fps),
        };

        ExecutionPlan::new(
            request,
            PlanStrategy::Reencode,
            vec![
                Stage::Demux,
                Stage::Decode,
                Stage::Filter(filter),
                Stage::Encode(self.tier.settings()),
                Stage::Mux,
            ],
            request.source_info().duration,
            format!(
                "export to {}x{} at {} fps with the {:?} encoder tier",
                target.width, target.height, target.fps, self.tier
            ),
        )
    }
}

/// First reason a stream-copy trim would be unsafe, if any
fn copy_blocker(request: &ValidatedRequest, range: &CutRange, keyframes: Option<&[f64]>) -> Option<String> {
    let media = request.source_info();

    if !media.all_streams_support_copy() {
        return Some(format!(
            "codecs [{}] cannot all be stream copied",
            media.codecs().join(", ")
        ));
    }
    if !media.container_supports_copy() {
        return Some(format!("source container '{}' does not support copy", media.container));
    }
    let output_ext = request
        .output()
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !container_name_supports_copy(&output_ext) {
        return Some(format!("output container '{}' does not support copy", output_ext));
    }

    if range.start.seconds > 0.0 {
        let tolerance = media.frame_tolerance() / 2.0;
        match keyframes {
            None => return Some("keyframe positions are unknown".to_string()),
            Some(keyframes) if !is_keyframe_aligned(keyframes, range.start.seconds, tolerance) => {
                return Some(format!(
                    "start {} is not on a keyframe",
                    range.start
                ))
            }
            Some(_) => {}
        }
    }

    None
}

/// Whether `point` lies within `tolerance` seconds of a keyframe
pub fn is_keyframe_aligned(keyframes: &[f64], point: f64, tolerance: f64) -> bool {
    keyframes.iter().any(|kf| (kf - point).abs() <= tolerance)
}

/// Business rules for checking produced output against what was requested
pub struct OutputValidator;

impl OutputValidator {
    /// Compare produced media with the expectation of the request
    pub fn check(expectation: &OutputExpectation, produced: &MediaInfo) -> ValidationResult {
        let duration_difference = expectation
            .duration
            .map(|expected| (produced.duration.seconds - expected.seconds).abs());
        let duration_valid = duration_difference.map_or(true, |diff| diff <= expectation.tolerance);

        let dimensions_valid = expectation
            .dimensions
            .map_or(true, |expected| produced.dimensions() == Some(expected));

        let fps_valid = expectation.fps.map_or(true, |expected| {
            produced
                .frame_rate()
                .map_or(false, |actual| (actual - expected).abs() < 0.01)
        });

        ValidationResult {
            duration_valid,
            dimensions_valid,
            fps_valid,
            duration_difference_ms: duration_difference.map(|diff| (diff * 1000.0).round() as u64),
            overall_valid: duration_valid && dimensions_valid && fps_valid,
        }
    }
}

/// What a produced output is expected to look like
#[derive(Debug, Clone, PartialEq)]
pub struct OutputExpectation {
    pub duration: Option<TimeSpec>,
    pub dimensions: Option<(u32, u32)>,
    pub fps: Option<f64>,
    /// Allowed duration deviation in seconds
    pub tolerance: f64,
}

impl OutputExpectation {
    pub fn for_request(request: &ValidatedRequest) -> Self {
        match request.operation() {
            ValidatedOperation::Trim(range) => Self {
                duration: Some(range.duration()),
                dimensions: None,
                fps: None,
                tolerance: request.source_info().frame_tolerance(),
            },
            ValidatedOperation::Export(target) => Self {
                duration: Some(request.source_info().duration),
                dimensions: Some((target.width, target.height)),
                fps: Some(target.fps),
                tolerance: 1.0 / target.fps,
            },
        }
    }
}

/// Output validation result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub duration_valid: bool,
    pub dimensions_valid: bool,
    pub fps_valid: bool,
    pub duration_difference_ms: Option<u64>,
    pub overall_valid: bool,
}

#[cfg(test)]
mod tests;
