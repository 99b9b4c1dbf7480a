// Probe LibAV adapter - Media file analysis using libav, without spawning ffprobe

use std::path::Path;

use async_trait::async_trait;
use ffmpeg_next as ffmpeg;
use tracing::debug;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::domain::rules::KeyframeWindow;
use crate::ports::*;

/// LibAV-based media probing adapter
#[derive(Debug, Clone)]
pub struct LibavProbeAdapter;

impl LibavProbeAdapter {
    /// Initialize libav and create the adapter
    pub fn new() -> Result<Self, DomainError> {
        ffmpeg::init()
            .map_err(|e| DomainError::launch_failed(format!("FFmpeg initialization failed: {}", e)))?;
        Ok(Self)
    }
}

#[async_trait]
impl ProbePort for LibavProbeAdapter {
    async fn probe_media(&self, file_path: &Path) -> Result<MediaInfo, DomainError> {
        let path = file_path.to_path_buf();
        tokio::task::spawn_blocking(move || probe_blocking(&path))
            .await
            .map_err(|e| DomainError::launch_failed(format!("probe task failed: {}", e)))?
    }

    async fn probe_keyframes(
        &self,
        file_path: &Path,
        window: KeyframeWindow,
    ) -> Result<Vec<f64>, DomainError> {
        let path = file_path.to_path_buf();
        tokio::task::spawn_blocking(move || keyframes_blocking(&path, window))
            .await
            .map_err(|e| DomainError::launch_failed(format!("keyframe task failed: {}", e)))?
    }
}

fn open(path: &Path) -> Result<ffmpeg::format::context::Input, DomainError> {
    ffmpeg::format::input(path).map_err(|e| {
        BackendError::NonZeroExit {
            code: None,
            diagnostics: format!("{}: {}", path.display(), e),
        }
        .into()
    })
}

fn probe_blocking(path: &Path) -> Result<MediaInfo, DomainError> {
    let ictx = open(path)?;

    let mut video = None;
    let mut audio_streams = Vec::new();
    for stream in ictx.streams() {
        let params = stream.parameters();
        let codec = params.id().name().to_string();
        match params.medium() {
            ffmpeg::media::Type::Video if video.is_none() => {
                let decoder = ffmpeg::codec::context::Context::from_parameters(params)
                    .and_then(|ctx| ctx.decoder().video())
                    .map_err(|e| DomainError::unsupported(format!("video stream {}: {}", stream.index(), e)))?;
                let rate = stream.avg_frame_rate();
                let frame_rate = if rate.denominator() != 0 && rate.numerator() > 0 {
                    f64::from(rate)
                } else {
                    0.0
                };
                video = Some(VideoStreamInfo::new(
                    stream.index(),
                    codec,
                    decoder.width(),
                    decoder.height(),
                    frame_rate,
                ));
            }
            ffmpeg::media::Type::Audio => {
                let decoder = ffmpeg::codec::context::Context::from_parameters(params)
                    .and_then(|ctx| ctx.decoder().audio())
                    .map_err(|e| DomainError::unsupported(format!("audio stream {}: {}", stream.index(), e)))?;
                audio_streams.push(AudioStreamInfo::new(
                    stream.index(),
                    codec,
                    decoder.rate(),
                    decoder.ch_layout().channels() as u32,
                ));
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

    let duration = if ictx.duration() > 0 {
        ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
    } else {
        return Err(DomainError::unsupported(format!(
            "cannot determine the duration of {}",
            path.display()
        )));
    };
    let file_size = std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
    let bit_rate = (ictx.bit_rate() > 0).then(|| ictx.bit_rate() as u64);

    debug!("Probed {} with libav: {:.3}s", path.display(), duration);

    Ok(MediaInfo {
        path: path.to_path_buf(),
        container: ictx.format().name().to_string(),
        duration: TimeSpec::from_seconds(duration),
        file_size,
        bit_rate,
        video,
        audio_streams,
    })
}

fn keyframes_blocking(path: &Path, window: KeyframeWindow) -> Result<Vec<f64>, DomainError> {
    let mut ictx = open(path)?;

    let (stream_index, time_base, start_pts) = ictx
        .streams()
        .find(|s| s.parameters().medium() == ffmpeg::media::Type::Video)
        .map(|s| (s.index(), s.time_base(), s.start_time().max(0)))
        .ok_or_else(|| DomainError::unsupported(format!("{} has no video stream", path.display())))?;
    let time_base = f64::from(time_base);

    // Land on the keyframe at or before the window start
    let target = (window.start * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
    ictx.seek(target, ..target)
        .map_err(|e| DomainError::unsupported(format!("cannot seek in {}: {}", path.display(), e)))?;

    let mut keyframes = Vec::new();
    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_index {
            continue;
        }
        let Some(pts) = packet.pts() else { continue };
        let seconds = (pts - start_pts) as f64 * time_base;
        if seconds > window.end {
            break;
        }
        if packet.is_key() {
            keyframes.push(seconds);
        }
    }
    Ok(keyframes)
}
