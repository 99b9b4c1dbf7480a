//! CLI module for FragCut
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

pub use args::{AspectPreset, ExportArgs, ProbeArgs, RunArgs, TrimArgs, VerifyArgs};

/// FragCut video clip pipeline
///
/// Trims and exports clips through FFmpeg after validating every request
/// against the probed source, with progress and Ctrl-C cancellation.
#[derive(Parser, Debug)]
#[command(name = "fragcut")]
#[command(about = "FragCut - validated video trims and exports")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (TOML or YAML)
    #[arg(long, global = true, env = "FRAGCUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging level or filter directive
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Encoder threads handed to FFmpeg
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cut a time range out of a video file
    Trim(args::TrimArgs),
    /// Re-encode a video file to a target size and frame rate
    Export(args::ExportArgs),
    /// Show media file information
    Probe(args::ProbeArgs),
    /// Check a produced file against expected properties
    Verify(args::VerifyArgs),
}
