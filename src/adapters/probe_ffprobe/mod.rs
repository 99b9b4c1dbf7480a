//! FFprobe adapter for media file probing
//!
//! Runs `ffprobe` with JSON output and maps the result onto `MediaInfo`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::adapters::exec_ffmpeg::locate_binary;
use crate::domain::errors::*;
use crate::domain::model::*;
use crate::domain::rules::KeyframeWindow;
use crate::error::FragCutResult;
use crate::ports::*;

/// FFprobe JSON output format
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    bit_rate: Option<String>,
    duration: Option<String>,
    disposition: Option<FfprobeDisposition>,
    tags: Option<FfprobeTags>,
}

#[derive(Debug, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
}

/// Packet listing used for keyframe lookup
#[derive(Debug, Deserialize)]
struct FfprobePackets {
    #[serde(default)]
    packets: Vec<FfprobePacket>,
    format: Option<FfprobeStartTime>,
}

#[derive(Debug, Deserialize)]
struct FfprobePacket {
    pts_time: Option<String>,
    flags: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStartTime {
    start_time: Option<String>,
}

/// FFprobe-based probe adapter
#[derive(Debug, Clone)]
pub struct FfprobeAdapter {
    binary: PathBuf,
}

impl FfprobeAdapter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Resolve `name_or_path` through `PATH` unless it already names a file
    pub fn locate(name_or_path: &str) -> FragCutResult<Self> {
        Ok(Self::new(locate_binary(name_or_path)?))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run_ffprobe(&self, args: &[&str], path: &Path) -> Result<Vec<u8>, DomainError> {
        debug!("Running FFprobe on {}", path.display());

        let output = Command::new(&self.binary)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DomainError::launch_failed(format!("{}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            return Err(BackendError::NonZeroExit {
                code: output.status.code(),
                diagnostics: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl ProbePort for FfprobeAdapter {
    async fn probe_media(&self, file_path: &Path) -> Result<MediaInfo, DomainError> {
        let stdout = self
            .run_ffprobe(
                &[
                    "-v",
                    "error",
                    "-print_format",
                    "json",
                    "-show_format",
                    "-show_streams",
                ],
                file_path,
            )
            .await?;

        let file_size = tokio::fs::metadata(file_path)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        parse_media_info(file_path, &stdout, file_size)
    }

    async fn probe_keyframes(
        &self,
        file_path: &Path,
        window: KeyframeWindow,
    ) -> Result<Vec<f64>, DomainError> {
        let interval = format!("{:.3}%{:.3}", window.start, window.end);
        let stdout = self
            .run_ffprobe(
                &[
                    "-v",
                    "error",
                    "-select_streams",
                    "v:0",
                    "-read_intervals",
                    interval.as_str(),
                    "-show_entries",
                    "packet=pts_time,flags:format=start_time",
                    "-print_format",
                    "json",
                ],
                file_path,
            )
            .await?;
        parse_keyframes(&stdout)
    }
}

/// Map ffprobe `-show_format -show_streams` JSON onto `MediaInfo`
pub fn parse_media_info(path: &Path, json: &[u8], file_size: u64) -> Result<MediaInfo, DomainError> {
    let probe: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| DomainError::unsupported(format!("unreadable ffprobe output: {}", e)))?;
    let format = probe.format.as_ref();

    let mut video = None;
    let mut audio_streams = Vec::new();
    for stream in &probe.streams {
        match stream.codec_type.as_deref() {
            Some("video") if video.is_none() => {
                // Cover art shows up as a one-frame video stream
                if stream.disposition.as_ref().map_or(false, |d| d.attached_pic == 1) {
                    continue;
                }
                let frame_rate = stream
                    .avg_frame_rate
                    .as_deref()
                    .and_then(parse_frame_rate)
                    .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
                    .unwrap_or(0.0);
                let mut info = VideoStreamInfo::new(
                    stream.index,
                    stream.codec_name.clone().unwrap_or_default(),
                    stream.width.unwrap_or(0),
                    stream.height.unwrap_or(0),
                    frame_rate,
                );
                info.bit_rate = parse_number(stream.bit_rate.as_deref());
                info.pixel_format = stream.pix_fmt.clone();
                video = Some(info);
            }
            Some("audio") => {
                let mut info = AudioStreamInfo::new(
                    stream.index,
                    stream.codec_name.clone().unwrap_or_default(),
                    parse_number(stream.sample_rate.as_deref()).unwrap_or(0) as u32,
                    stream.channels.unwrap_or(0),
                );
                info.bit_rate = parse_number(stream.bit_rate.as_deref());
                info.language = stream.tags.as_ref().and_then(|t| t.language.clone());
                audio_streams.push(info);
            }
            _ => {}
        }
    }

    if video.is_none() && audio_streams.is_empty() {
        return Err(DomainError::unsupported(format!(
            "{} has no audio or video streams",
            path.display()
        )));
    }

    let duration = format
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| parse_seconds(s.duration.as_deref()))
                .reduce(f64::max)
        })
        .ok_or_else(|| {
            DomainError::unsupported(format!("cannot determine the duration of {}", path.display()))
        })?;

    Ok(MediaInfo {
        path: path.to_path_buf(),
        container: format
            .and_then(|f| f.format_name.clone())
            .unwrap_or_default(),
        duration: TimeSpec::from_seconds(duration),
        file_size: format
            .and_then(|f| parse_number(f.size.as_deref()))
            .unwrap_or(file_size),
        bit_rate: format.and_then(|f| parse_number(f.bit_rate.as_deref())),
        video,
        audio_streams,
    })
}

/// Keyframe timestamps relative to the start of the file
pub fn parse_keyframes(json: &[u8]) -> Result<Vec<f64>, DomainError> {
    let listing: FfprobePackets = serde_json::from_slice(json)
        .map_err(|e| DomainError::unsupported(format!("unreadable ffprobe output: {}", e)))?;
    let start_time = listing
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.start_time.as_deref()))
        .unwrap_or(0.0);

    let mut keyframes: Vec<f64> = listing
        .packets
        .iter()
        .filter(|packet| packet.flags.as_deref().map_or(false, |f| f.starts_with('K')))
        .filter_map(|packet| parse_seconds(packet.pts_time.as_deref()))
        .map(|pts| (pts - start_time).max(0.0))
        .collect();
    keyframes.sort_by(|a, b| a.total_cmp(b));
    keyframes.dedup();
    Ok(keyframes)
}

/// Parse frame rate string (e.g., "30/1" or "29.97")
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den > 0.0 && num > 0.0).then(|| num / den);
    }
    s.parse().ok().filter(|fps: &f64| *fps > 0.0)
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value?.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_number(value: Option<&str>) -> Option<u64> {
    value?.parse().ok()
}
