// Domain models - Core types and data structures

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, ErrorKind, ValidationError};

/// Time specification with precision - represents time in seconds with fractional precision
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSpec {
    pub seconds: f64,
}

impl TimeSpec {
    /// Create a new TimeSpec from seconds
    pub fn from_seconds(seconds: f64) -> Self {
        Self { seconds }
    }

    /// Create a new TimeSpec from hours, minutes, seconds, milliseconds
    pub fn from_components(hours: u32, minutes: u32, seconds: u32, milliseconds: u32) -> Self {
        let total_seconds = hours as f64 * 3600.0
            + minutes as f64 * 60.0
            + seconds as f64
            + milliseconds as f64 / 1000.0;
        Self {
            seconds: total_seconds,
        }
    }

    pub fn as_seconds(&self) -> f64 {
        self.seconds
    }

    /// Convert to Duration, clamping negative values to zero
    pub fn to_duration(&self) -> Duration {
        Duration::from_secs_f64(self.seconds.max(0.0))
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self {
            seconds: duration.as_secs_f64(),
        }
    }

    /// Parse time string: seconds (`12.5`), `MM:SS.ms` or `HH:MM:SS.ms`
    pub fn parse(time_str: &str) -> Result<Self, ValidationError> {
        let trimmed = time_str.trim();

        if let Ok(seconds) = trimmed.parse::<f64>() {
            if !seconds.is_finite() {
                return Err(ValidationError::range("Time must be a finite number"));
            }
            return Ok(Self::from_seconds(seconds));
        }

        let parts: Vec<&str> = trimmed.split(':').collect();
        let (hours, minutes, seconds_part) = match parts.as_slice() {
            [minutes, seconds] => (0, parse_unit(minutes, "minutes")?, *seconds),
            [hours, minutes, seconds] => {
                let minutes = parse_unit(minutes, "minutes")?;
                if minutes >= 60 {
                    return Err(ValidationError::range("Minutes must be less than 60"));
                }
                (parse_unit(hours, "hours")?, minutes, *seconds)
            }
            _ => {
                return Err(ValidationError::range(format!(
                    "Invalid time format '{}'. Supported formats: seconds (e.g., 123.45), MM:SS.ms (e.g., 2:30.5), HH:MM:SS.ms (e.g., 1:02:30.5)",
                    trimmed
                )))
            }
        };

        let seconds = seconds_part
            .parse::<f64>()
            .map_err(|_| ValidationError::range("Invalid seconds format"))?;
        if !(0.0..60.0).contains(&seconds) {
            return Err(ValidationError::range("Seconds must be between 0 and 60"));
        }

        Ok(Self::from_seconds(
            hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds,
        ))
    }

    /// Format as `H:MM:SS.mmm`, or `M:SS.mmm` below one hour
    pub fn format_hms(&self) -> String {
        let total_ms = (self.seconds.max(0.0) * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms % 3_600_000) / 60_000;
        let seconds = (total_ms % 60_000) / 1000;
        let milliseconds = total_ms % 1000;

        if hours > 0 {
            format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, milliseconds)
        } else {
            format!("{}:{:02}.{:03}", minutes, seconds, milliseconds)
        }
    }
}

fn parse_unit(value: &str, unit: &str) -> Result<u32, ValidationError> {
    value
        .parse::<u32>()
        .map_err(|_| ValidationError::range(format!("Invalid {} format", unit)))
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_hms())
    }
}

/// Time range of a trim, validated so that `0 <= start < end`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutRange {
    pub start: TimeSpec,
    pub end: TimeSpec,
}

impl CutRange {
    /// Create a new cut range with validation
    pub fn new(start: TimeSpec, end: TimeSpec) -> Result<Self, ValidationError> {
        if !start.seconds.is_finite() || !end.seconds.is_finite() {
            return Err(ValidationError::range("Trim boundaries must be finite"));
        }
        if start.seconds < 0.0 {
            return Err(ValidationError::range(format!(
                "start ({}) cannot be negative",
                start.seconds
            )));
        }
        if start.seconds >= end.seconds {
            return Err(ValidationError::range(format!(
                "start ({}) must be less than end ({})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> TimeSpec {
        TimeSpec::from_seconds(self.end.seconds - self.start.seconds)
    }

    /// Validate the range against the source duration
    pub fn validate_against_duration(&self, media_duration: &TimeSpec) -> Result<(), ValidationError> {
        if self.end.seconds > media_duration.seconds {
            return Err(ValidationError::range(format!(
                "end ({}) exceeds media duration ({})",
                self.end, media_duration
            )));
        }
        Ok(())
    }
}

/// Video stream information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub bit_rate: Option<u64>,
    pub pixel_format: Option<String>,
}

impl VideoStreamInfo {
    pub fn new(index: usize, codec: impl Into<String>, width: u32, height: u32, frame_rate: f64) -> Self {
        Self {
            index,
            codec: codec.into(),
            width,
            height,
            frame_rate,
            bit_rate: None,
            pixel_format: None,
        }
    }

    /// Get frame duration in seconds, if the frame rate is known
    pub fn frame_duration(&self) -> Option<f64> {
        (self.frame_rate > 0.0).then(|| 1.0 / self.frame_rate)
    }

    /// Check if codec supports copy mode
    pub fn supports_copy(&self) -> bool {
        matches!(self.codec.as_str(), "h264" | "hevc" | "vp9" | "av1" | "mpeg4")
    }
}

/// Audio stream information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub index: usize,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_rate: Option<u64>,
    pub language: Option<String>,
}

impl AudioStreamInfo {
    pub fn new(index: usize, codec: impl Into<String>, sample_rate: u32, channels: u32) -> Self {
        Self {
            index,
            codec: codec.into(),
            sample_rate,
            channels,
            bit_rate: None,
            language: None,
        }
    }

    /// Check if codec supports copy mode
    pub fn supports_copy(&self) -> bool {
        matches!(self.codec.as_str(), "aac" | "mp3" | "ac3" | "eac3" | "opus")
            || self.codec.starts_with("pcm_")
    }
}

/// Read-only snapshot of a probed media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    /// Container format name as reported by the probe (e.g. `mov,mp4,m4a,3gp,3g2,mj2`)
    pub container: String,
    pub duration: TimeSpec,
    pub file_size: u64,
    pub bit_rate: Option<u64>,
    pub video: Option<VideoStreamInfo>,
    pub audio_streams: Vec<AudioStreamInfo>,
}

impl MediaInfo {
    pub fn primary_video_stream(&self) -> Option<&VideoStreamInfo> {
        self.video.as_ref()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.video.as_ref().map(|v| (v.width, v.height))
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.video.as_ref().map(|v| v.frame_rate).filter(|fps| *fps > 0.0)
    }

    /// One frame interval, falling back to 30 fps when the rate is unknown
    pub fn frame_tolerance(&self) -> f64 {
        self.video
            .as_ref()
            .and_then(|v| v.frame_duration())
            .unwrap_or(1.0 / 30.0)
    }

    /// Codec identifiers of all streams, video first
    pub fn codecs(&self) -> Vec<&str> {
        self.video
            .iter()
            .map(|v| v.codec.as_str())
            .chain(self.audio_streams.iter().map(|a| a.codec.as_str()))
            .collect()
    }

    /// Check if all streams support copy mode
    pub fn all_streams_support_copy(&self) -> bool {
        self.video.as_ref().map_or(true, |v| v.supports_copy())
            && self.audio_streams.iter().all(|a| a.supports_copy())
    }

    pub fn total_streams(&self) -> usize {
        self.video.iter().count() + self.audio_streams.len()
    }

    /// Whether the container is one that tolerates stream-copied cuts
    pub fn container_supports_copy(&self) -> bool {
        self.container
            .split(',')
            .any(|name| container_name_supports_copy(name.trim()))
    }
}

pub(crate) fn container_name_supports_copy(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "mp4" | "mov" | "m4v" | "mkv" | "matroska" | "webm" | "ts" | "mpegts" | "mts" | "m2ts"
    )
}

/// Requested operation, as supplied by the caller.
///
/// Dimensions are signed so that malformed input survives until validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum EditOperation {
    Trim { start: TimeSpec, end: TimeSpec },
    Export { width: i64, height: i64, fps: f64 },
}

impl EditOperation {
    pub fn kind(&self) -> EditKind {
        match self {
            EditOperation::Trim { .. } => EditKind::Trim,
            EditOperation::Export { .. } => EditKind::Export,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Trim,
    Export,
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditKind::Trim => write!(f, "trim"),
            EditKind::Export => write!(f, "export"),
        }
    }
}

/// Per-request execution options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Maximum wall time; exceeding it fails the request with a timeout
    pub timeout: Option<Duration>,
    /// Keep partial output of failed or cancelled runs for debugging
    pub retain_partial: bool,
    /// Replace an existing file at the output path
    pub overwrite: bool,
}

/// An edit submitted by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    pub source: PathBuf,
    pub output: PathBuf,
    pub operation: EditOperation,
    #[serde(default)]
    pub options: RequestOptions,
}

impl EditRequest {
    pub fn trim(
        source: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        start: TimeSpec,
        end: TimeSpec,
    ) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            operation: EditOperation::Trim { start, end },
            options: RequestOptions::default(),
        }
    }

    pub fn export(
        source: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        width: i64,
        height: i64,
        fps: f64,
    ) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            operation: EditOperation::Export { width, height, fps },
            options: RequestOptions::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.options.overwrite = overwrite;
        self
    }

    pub fn retain_partial_output(mut self) -> Self {
        self.options.retain_partial = true;
        self
    }

    pub fn kind(&self) -> EditKind {
        self.operation.kind()
    }
}

/// Export target after validation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportTarget {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidatedOperation {
    Trim(CutRange),
    Export(ExportTarget),
}

/// A request that passed validation against its source media.
///
/// Only the validator constructs these.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub(crate) request: EditRequest,
    pub(crate) source_info: MediaInfo,
    pub(crate) operation: ValidatedOperation,
}

impl ValidatedRequest {
    pub fn request(&self) -> &EditRequest {
        &self.request
    }

    pub fn source_info(&self) -> &MediaInfo {
        &self.source_info
    }

    pub fn operation(&self) -> &ValidatedOperation {
        &self.operation
    }

    pub fn source(&self) -> &Path {
        &self.request.source
    }

    pub fn output(&self) -> &Path {
        &self.request.output
    }

    pub fn options(&self) -> &RequestOptions {
        &self.request.options
    }

    pub fn kind(&self) -> EditKind {
        self.request.kind()
    }

    /// Duration the produced output is expected to have
    pub fn expected_duration(&self) -> TimeSpec {
        match &self.operation {
            ValidatedOperation::Trim(range) => range.duration(),
            ValidatedOperation::Export(_) => self.source_info.duration,
        }
    }
}

/// Policy for trims: stream copy when safe, or a forced mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimStrategy {
    #[default]
    Auto,
    Copy,
    Reencode,
}

impl TrimStrategy {
    /// Parse strategy from string (case-insensitive)
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.to_lowercase().as_str() {
            "auto" => Ok(TrimStrategy::Auto),
            "copy" => Ok(TrimStrategy::Copy),
            "reencode" | "re-encode" => Ok(TrimStrategy::Reencode),
            other => Err(ValidationError::parameter(format!(
                "Unknown trim strategy '{}'. Valid: auto, copy, reencode",
                other
            ))),
        }
    }
}

/// Fixed encoder preset tiers; no bitrate negotiation happens at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderTier {
    #[default]
    Fast,
    Balanced,
    Quality,
}

impl EncoderTier {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.to_lowercase().as_str() {
            "fast" => Ok(EncoderTier::Fast),
            "balanced" => Ok(EncoderTier::Balanced),
            "quality" => Ok(EncoderTier::Quality),
            other => Err(ValidationError::parameter(format!(
                "Unknown encoder tier '{}'. Valid: fast, balanced, quality",
                other
            ))),
        }
    }

    /// Encoder settings for this tier
    pub fn settings(&self) -> EncoderSettings {
        let (preset, crf) = match self {
            EncoderTier::Fast => ("ultrafast", 23),
            EncoderTier::Balanced => ("medium", 20),
            EncoderTier::Quality => ("slow", 18),
        };
        EncoderSettings {
            tier: *self,
            video_codec: "libx264".to_string(),
            preset: preset.to_string(),
            crf,
            pixel_format: "yuv420p".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    pub tier: EncoderTier,
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
}

/// Video filter applied between decode and encode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub scale: Option<(u32, u32)>,
    pub fps: Option<f64>,
}

/// One unit of work in an execution plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Demux,
    StreamCopy,
    Decode,
    Filter(FilterSpec),
    Encode(EncoderSettings),
    Mux,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Demux => "demux",
            Stage::StreamCopy => "stream_copy",
            Stage::Decode => "decode",
            Stage::Filter(_) => "filter",
            Stage::Encode(_) => "encode",
            Stage::Mux => "mux",
        }
    }
}

/// How the plan processes frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStrategy {
    /// Lossless repackaging of the existing encoded frames
    StreamCopy,
    /// Full decode and re-encode
    Reencode,
}

impl fmt::Display for PlanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStrategy::StreamCopy => write!(f, "stream copy"),
            PlanStrategy::Reencode => write!(f, "re-encode"),
        }
    }
}

/// Immutable, ordered description of one run against the media backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    kind: EditKind,
    source: PathBuf,
    output: PathBuf,
    strategy: PlanStrategy,
    stages: Vec<Stage>,
    window: Option<CutRange>,
    expected_duration: TimeSpec,
    decision: String,
}

impl ExecutionPlan {
    /// Plan for `request`; kind, paths and cut window come from the request
    pub(crate) fn new(
        request: &ValidatedRequest,
        strategy: PlanStrategy,
        stages: Vec<Stage>,
        expected_duration: TimeSpec,
        decision: String,
    ) -> Self {
        let window = match request.operation() {
            ValidatedOperation::Trim(range) => Some(*range),
            ValidatedOperation::Export(_) => None,
        };
        Self {
            kind: request.kind(),
            source: request.source().to_path_buf(),
            output: request.output().to_path_buf(),
            strategy,
            stages,
            window,
            expected_duration,
            decision,
        }
    }

    pub fn kind(&self) -> EditKind {
        self.kind
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Final destination; backends are handed a separate working path
    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn strategy(&self) -> PlanStrategy {
        self.strategy
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn window(&self) -> Option<&CutRange> {
        self.window.as_ref()
    }

    pub fn expected_duration(&self) -> TimeSpec {
        self.expected_duration
    }

    /// Why this strategy was chosen
    pub fn decision(&self) -> &str {
        &self.decision
    }

    pub fn filter(&self) -> Option<&FilterSpec> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Filter(spec) => Some(spec),
            _ => None,
        })
    }

    pub fn encoder(&self) -> Option<&EncoderSettings> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Encode(settings) => Some(settings),
            _ => None,
        })
    }

    pub fn is_stream_copy(&self) -> bool {
        self.strategy == PlanStrategy::StreamCopy
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }
}

/// Terminal result of a request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationResult {
    Success {
        output_path: PathBuf,
        produced_media_info: MediaInfo,
        message: String,
    },
    Failure {
        kind: ErrorKind,
        message: String,
    },
    Cancelled {
        message: String,
    },
}

impl OperationResult {
    pub fn failure(error: &DomainError) -> Self {
        OperationResult::Failure {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        OperationResult::Cancelled {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationResult::Cancelled { .. })
    }

    /// Failure kind, `None` for success and cancellation
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OperationResult::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            OperationResult::Success { message, .. }
            | OperationResult::Failure { message, .. }
            | OperationResult::Cancelled { message } => message,
        }
    }

    pub fn produced_media_info(&self) -> Option<&MediaInfo> {
        match self {
            OperationResult::Success {
                produced_media_info,
                ..
            } => Some(produced_media_info),
            _ => None,
        }
    }

    /// State the request ends in with this result
    pub fn terminal_state(&self) -> RequestState {
        match self {
            OperationResult::Success { .. } => RequestState::Succeeded,
            OperationResult::Failure { .. } => RequestState::Failed,
            OperationResult::Cancelled { .. } => RequestState::Cancelled,
        }
    }
}

/// Lifecycle of a single request.
///
/// `Created`, `Validating` and `Rejected` are passed through synchronously
/// inside `submit`; a rejected request never gets a handle, and every handle
/// starts at `Validated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Created,
    Validating,
    Rejected,
    Validated,
    Executing,
    Succeeded,
    Failed,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Rejected
                | RequestState::Succeeded
                | RequestState::Failed
                | RequestState::Cancelled
        )
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Created, Validating)
                | (Validating, Rejected)
                | (Validating, Validated)
                | (Validated, Executing)
                | (Executing, Succeeded)
                | (Executing, Failed)
                | (Executing, Cancelled)
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Created => "created",
            RequestState::Validating => "validating",
            RequestState::Rejected => "rejected",
            RequestState::Validated => "validated",
            RequestState::Executing => "executing",
            RequestState::Succeeded => "succeeded",
            RequestState::Failed => "failed",
            RequestState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
