//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

use crate::domain::model::{EncoderTier, TimeSpec, TrimStrategy};
use crate::error::FragCutError;

/// Longest accepted `--timeout`, one day
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Arguments for the trim command
#[derive(Args, Debug)]
pub struct TrimArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Start time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long, value_parser = parse_time, allow_hyphen_values = true)]
    pub start: TimeSpec,

    /// End time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long, value_parser = parse_time, allow_hyphen_values = true)]
    pub end: TimeSpec,

    /// Output file path (default: <stem>_trimmed.<ext> next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Trim strategy: auto, copy or reencode
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Option<TrimStrategy>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Aspect preset: 16:9 (1920x1080), 9:16 (1080x1920) or 1:1 (1080x1080), at 60 fps
    #[arg(long, value_parser = parse_preset, conflicts_with_all = ["width", "height"])]
    pub preset: Option<AspectPreset>,

    /// Output width in pixels
    #[arg(long, allow_negative_numbers = true, requires = "height")]
    pub width: Option<i64>,

    /// Output height in pixels
    #[arg(long, allow_negative_numbers = true, requires = "width")]
    pub height: Option<i64>,

    /// Output frame rate (default: 60, or the preset's)
    #[arg(long, allow_negative_numbers = true)]
    pub fps: Option<f64>,

    /// Output file path (default: <stem>_export.<ext> next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Options shared by commands that run an edit
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Encoder tier for re-encoding: fast, balanced or quality
    #[arg(long, value_parser = parse_tier)]
    pub tier: Option<EncoderTier>,

    /// Give up after this many seconds
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<u64>,

    /// Replace the output file if it exists
    #[arg(long)]
    pub overwrite: bool,

    /// Keep partial output of failed or cancelled runs
    #[arg(long)]
    pub keep_partial: bool,

    /// Print the operation report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output in JSON format
    #[arg(long, conflicts_with = "yaml")]
    pub json: bool,

    /// Output in YAML format
    #[arg(long)]
    pub yaml: bool,

    /// List keyframe timestamps
    #[arg(long)]
    pub keyframes: bool,
}

/// Arguments for the verify command
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// File to verify
    #[arg(short, long)]
    pub input: PathBuf,

    /// Expected duration (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long, value_parser = parse_time)]
    pub duration: Option<TimeSpec>,

    /// Expected width in pixels
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Expected height in pixels
    #[arg(long, requires = "width")]
    pub height: Option<u32>,

    /// Expected frame rate
    #[arg(long)]
    pub fps: Option<f64>,

    /// Allowed duration deviation in seconds (default: one frame)
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Export aspect presets, all at 60 fps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectPreset {
    Landscape,
    Portrait,
    Square,
}

impl AspectPreset {
    pub const FPS: f64 = 60.0;

    pub fn dimensions(&self) -> (i64, i64) {
        match self {
            AspectPreset::Landscape => (1920, 1080),
            AspectPreset::Portrait => (1080, 1920),
            AspectPreset::Square => (1080, 1080),
        }
    }
}

fn parse_time(value: &str) -> Result<TimeSpec, FragCutError> {
    TimeSpec::parse(value).map_err(|_| FragCutError::InvalidTimeFormat {
        time: value.to_string(),
    })
}

fn parse_strategy(value: &str) -> Result<TrimStrategy, String> {
    TrimStrategy::parse(value).map_err(|e| e.to_string())
}

fn parse_tier(value: &str) -> Result<EncoderTier, String> {
    EncoderTier::parse(value).map_err(|e| e.to_string())
}

fn parse_timeout(value: &str) -> Result<u64, String> {
    clap_num::number_range(value, 1, MAX_TIMEOUT_SECS)
}

fn parse_preset(value: &str) -> Result<AspectPreset, String> {
    match value {
        "16:9" | "landscape" => Ok(AspectPreset::Landscape),
        "9:16" | "portrait" => Ok(AspectPreset::Portrait),
        "1:1" | "square" => Ok(AspectPreset::Square),
        other => Err(format!("unknown preset '{}'. Valid: 16:9, 9:16, 1:1", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_dimensions() {
        assert_eq!(parse_preset("16:9").unwrap().dimensions(), (1920, 1080));
        assert_eq!(parse_preset("9:16").unwrap().dimensions(), (1080, 1920));
        assert_eq!(parse_preset("square").unwrap().dimensions(), (1080, 1080));
        assert!(parse_preset("4:3").is_err());
    }

    #[test]
    fn test_timeout_range() {
        assert_eq!(parse_timeout("30"), Ok(30));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("100000").is_err());
    }

    #[test]
    fn test_time_errors_name_the_value() {
        let err = parse_time("1:xx").unwrap_err();
        assert!(err.to_string().contains("1:xx"));
        assert_eq!(parse_time("90").unwrap().seconds, 90.0);
    }
}
