// Inspect interactor - Orchestrates media file inspection use case

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::domain::rules::KeyframeWindow;
use crate::ports::*;

/// How an inspection is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InspectFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

/// Request for media file inspection
#[derive(Debug, Clone)]
pub struct InspectRequest {
    pub path: PathBuf,
    pub format: InspectFormat,
    /// Also list the keyframe timestamps of the primary video stream
    pub show_keyframes: bool,
}

impl InspectRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: InspectFormat::Text,
            show_keyframes: false,
        }
    }
}

/// Probe data plus its rendering
#[derive(Debug, Clone, Serialize)]
pub struct InspectResponse {
    pub media_info: MediaInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyframes: Option<Vec<f64>>,
    #[serde(skip)]
    pub summary: String,
}

/// Interactor for media file inspection use case
pub struct InspectInteractor {
    probe_port: Arc<dyn ProbePort>,
}

impl InspectInteractor {
    pub fn new(probe_port: Arc<dyn ProbePort>) -> Self {
        Self { probe_port }
    }

    /// Execute media file inspection
    pub async fn execute(&self, request: InspectRequest) -> Result<InspectResponse, DomainError> {
        info!("Starting media file inspection for: {}", request.path.display());

        if !request.path.is_file() {
            return Err(ValidationError::parameter(format!(
                "input file does not exist: {}",
                request.path.display()
            ))
            .into());
        }

        let media_info = self.probe_port.probe_media(&request.path).await?;
        info!("Media file probed successfully: {} streams", media_info.total_streams());

        let keyframes = if request.show_keyframes && media_info.video.is_some() {
            let window = KeyframeWindow {
                start: 0.0,
                end: media_info.duration.seconds,
            };
            Some(self.probe_port.probe_keyframes(&request.path, window).await?)
        } else {
            None
        };

        let mut response = InspectResponse {
            media_info,
            keyframes,
            summary: String::new(),
        };
        response.summary = match request.format {
            InspectFormat::Json => serde_json::to_string_pretty(&response)
                .map_err(|e| DomainError::integrity(format!("JSON serialization failed: {}", e)))?,
            InspectFormat::Yaml => serde_yaml::to_string(&response)
                .map_err(|e| DomainError::integrity(format!("YAML serialization failed: {}", e)))?,
            InspectFormat::Text => format_as_text(&response),
        };
        Ok(response)
    }
}

/// Human-readable media summary
pub fn format_as_text(response: &InspectResponse) -> String {
    let info = &response.media_info;
    let mut output = String::new();

    let _ = writeln!(output, "Media File Information:");
    let _ = writeln!(output, "  File: {}", info.path.display());
    let _ = writeln!(output, "  Container: {}", info.container);
    let _ = writeln!(output, "  Duration: {} ({:.3}s)", info.duration.format_hms(), info.duration.seconds);
    let _ = writeln!(output, "  File Size: {:.2} MB", info.file_size as f64 / 1_048_576.0);
    if let Some(bit_rate) = info.bit_rate {
        let _ = writeln!(output, "  Bit Rate: {} kb/s", bit_rate / 1000);
    }
    let _ = writeln!(output, "  Total Streams: {}", info.total_streams());

    if let Some(video) = &info.video {
        let _ = writeln!(output, "\nVideo Stream:");
        let _ = writeln!(
            output,
            "  Stream #{}: {}x{} @ {:.2}fps, {}",
            video.index, video.width, video.height, video.frame_rate, video.codec
        );
    }

    if !info.audio_streams.is_empty() {
        let _ = writeln!(output, "\nAudio Streams ({}):", info.audio_streams.len());
        for stream in &info.audio_streams {
            let _ = writeln!(
                output,
                "  Stream #{}: {} channels, {} Hz, {}",
                stream.index, stream.channels, stream.sample_rate, stream.codec
            );
        }
    }

    if let Some(keyframes) = &response.keyframes {
        let _ = writeln!(output, "\nKeyframes ({}):", keyframes.len());
        for chunk in keyframes.chunks(8) {
            let line: Vec<String> = chunk.iter().map(|kf| format!("{:.3}", kf)).collect();
            let _ = writeln!(output, "  {}", line.join(" "));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InspectResponse {
        InspectResponse {
            media_info: MediaInfo {
                path: PathBuf::from("clip.mp4"),
                container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
                duration: TimeSpec::from_seconds(30.0),
                file_size: 2 * 1_048_576,
                bit_rate: Some(560_000),
                video: Some(VideoStreamInfo::new(0, "h264", 1920, 1080, 30.0)),
                audio_streams: vec![AudioStreamInfo::new(1, "aac", 48_000, 2)],
            },
            keyframes: Some(vec![0.0, 1.0, 2.0]),
            summary: String::new(),
        }
    }

    #[test]
    fn test_text_summary_lists_streams() {
        let text = format_as_text(&sample());
        assert!(text.contains("Duration: 0:30.000"));
        assert!(text.contains("1920x1080 @ 30.00fps, h264"));
        assert!(text.contains("2 channels, 48000 Hz, aac"));
        assert!(text.contains("Keyframes (3)"));
        assert!(text.contains("Bit Rate: 560 kb/s"));
    }

    #[test]
    fn test_json_omits_missing_keyframes() {
        let mut response = sample();
        response.keyframes = None;
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("keyframes"));
        assert!(!json.contains("summary"));
    }
}
