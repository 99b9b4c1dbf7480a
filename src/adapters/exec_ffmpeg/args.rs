//! Structured FFmpeg argument building
//!
//! Arguments are collected as separate values and handed to the process
//! directly; nothing is ever joined into a shell string.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::domain::model::{EncoderSettings, ExecutionPlan, FilterSpec, PlanStrategy};

/// Builder for one FFmpeg invocation
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegArgs {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
    progress: bool,
}

impl FfmpegArgs {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
            progress: true,
        }
    }

    /// Arguments for running `plan`, writing to `output`
    pub fn for_plan(plan: &ExecutionPlan, output: impl AsRef<Path>) -> Self {
        let mut args = Self::new(plan.source(), output);

        if let Some(window) = plan.window() {
            if window.start.seconds > 0.0 {
                args = args.seek(window.start.seconds);
            }
            args = args.duration(window.duration().seconds);
        }

        match plan.strategy() {
            PlanStrategy::StreamCopy => {
                args = args
                    .map("0:v?")
                    .map("0:a?")
                    .output_args(["-c", "copy"])
                    .output_args(["-avoid_negative_ts", "make_zero"]);
            }
            PlanStrategy::Reencode => {
                // Exports keep one picture stream; trims keep every video stream
                args = match plan.filter() {
                    Some(filter) => args.map("0:v:0").map("0:a?").video_filter(filter_graph(filter)),
                    None => args.map("0:v?").map("0:a?"),
                };
                if let Some(encoder) = plan.encoder() {
                    args = args.encoder(encoder);
                }
            }
        }

        if is_mp4_family(plan.output()) {
            args = args.output_args(["-movflags", "+faststart"]);
        }
        args
    }

    /// Add input arguments (before -i)
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i)
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Seek the input before decoding
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format_seconds(seconds))
    }

    /// Limit how much of the input is read
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format_seconds(seconds))
    }

    pub fn map(self, selector: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(selector)
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Video and audio encoder flags for a tier
    pub fn encoder(self, settings: &EncoderSettings) -> Self {
        self.output_args(["-c:v", settings.video_codec.as_str()])
            .output_args(["-preset", settings.preset.as_str()])
            .output_arg("-crf")
            .output_arg(settings.crf.to_string())
            .output_args(["-pix_fmt", settings.pixel_format.as_str()])
            .output_args(["-c:a", settings.audio_codec.as_str()])
            .output_arg("-b:a")
            .output_arg(format!("{}k", settings.audio_bitrate_kbps))
    }

    pub fn threads(self, threads: Option<usize>) -> Self {
        match threads {
            Some(count) if count > 0 => self.output_arg("-threads").output_arg(count.to_string()),
            _ => self,
        }
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Disable the machine-readable progress stream on stdout
    pub fn without_progress(mut self) -> Self {
        self.progress = false;
        self
    }

    pub fn build_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        if self.overwrite {
            args.push("-y".into());
        }
        args.push("-nostdin".into());
        args.push("-v".into());
        args.push(self.log_level.clone().into());
        if self.progress {
            args.push("-progress".into());
            args.push("pipe:1".into());
            args.push("-nostats".into());
        }

        args.extend(self.input_args.iter().map(OsString::from));
        args.push("-i".into());
        args.push(self.input.clone().into_os_string());

        args.extend(self.output_args.iter().map(OsString::from));
        args.push(self.output.clone().into_os_string());

        args
    }

    /// Arguments rendered for logs
    pub fn args_lossy(&self) -> String {
        self.build_args()
            .iter()
            .map(|arg| {
                let arg = arg.to_string_lossy();
                if arg.contains(' ') {
                    format!("\"{}\"", arg)
                } else {
                    arg.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `scale=W:H,setsar=1,fps=F` for the given filter spec
pub fn filter_graph(filter: &FilterSpec) -> String {
    let mut parts = Vec::new();
    if let Some((width, height)) = filter.scale {
        parts.push(format!("scale={}:{}", width, height));
        parts.push("setsar=1".to_string());
    }
    if let Some(fps) = filter.fps {
        parts.push(format!("fps={}", format_rate(fps)));
    }
    parts.join(",")
}

fn format_seconds(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}

fn format_rate(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        let rendered = format!("{:.3}", fps);
        rendered.trim_end_matches('0').to_string()
    }
}

fn is_mp4_family(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map_or(false, |ext| matches!(ext.as_str(), "mp4" | "m4v" | "mov"))
}
