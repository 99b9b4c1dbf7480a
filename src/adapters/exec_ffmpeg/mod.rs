//! FFmpeg execution adapter
//!
//! Runs execution plans through the `ffmpeg` binary, reading the
//! machine-readable `-progress` stream from stdout and keeping the tail of
//! stderr as diagnostics.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, trace};

use crate::domain::model::ExecutionPlan;
use crate::error::{FragCutError, FragCutResult};
use crate::ports::*;

pub mod args;

pub use args::FfmpegArgs;

/// Stderr lines kept for error reporting
const DIAGNOSTIC_LINES: usize = 20;

/// FFmpeg-based media backend
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    binary: PathBuf,
    threads: Option<usize>,
    log_level: String,
}

impl FfmpegBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            threads: None,
            log_level: "error".to_string(),
        }
    }

    /// Resolve `name_or_path` through `PATH` unless it already names a file
    pub fn locate(name_or_path: &str) -> FragCutResult<Self> {
        Ok(Self::new(locate_binary(name_or_path)?))
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl MediaBackendPort for FfmpegBackend {
    async fn run(
        &self,
        plan: &ExecutionPlan,
        output: &Path,
        progress: ProgressSink,
        mut cancel: CancelSignal,
    ) -> BackendExit {
        let args = FfmpegArgs::for_plan(plan, output)
            .threads(self.threads)
            .log_level(self.log_level.as_str());
        debug!("Running FFmpeg: {} {}", self.binary.display(), args.args_lossy());

        let mut child = match Command::new(&self.binary)
            .args(args.build_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return BackendExit::LaunchFailed(format!("{}: {}", self.binary.display(), e))
            }
        };

        let progress_task = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut current = BackendProgress::default();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(sample) = parse_progress_line(&line, &mut current) {
                        trace!("FFmpeg progress: {:?}", sample);
                        progress(sample);
                    }
                }
            })
        });
        let diagnostics_task = child.stderr.take().map(|stderr| tokio::spawn(collect_tail(stderr)));

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancellation(&mut cancel) => None,
        };

        let status = match status {
            Some(status) => status,
            None => {
                info!("FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                if let Some(task) = progress_task {
                    task.abort();
                }
                if let Some(task) = diagnostics_task {
                    task.abort();
                }
                return BackendExit::Cancelled;
            }
        };

        if let Some(task) = progress_task {
            let _ = task.await;
        }
        let diagnostics = match diagnostics_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        match status {
            Ok(status) if status.success() => BackendExit::Success,
            Ok(status) => BackendExit::Exited {
                code: status.code(),
                diagnostics,
            },
            Err(e) => BackendExit::Exited {
                code: None,
                diagnostics: format!("failed to wait for FFmpeg: {}", e),
            },
        }
    }
}

/// Resolve a configured binary name to a path
pub fn locate_binary(name_or_path: &str) -> FragCutResult<PathBuf> {
    let candidate = Path::new(name_or_path);
    if candidate.components().count() > 1 {
        return if candidate.is_file() {
            Ok(candidate.to_path_buf())
        } else {
            Err(FragCutError::BinaryNotFound(name_or_path.to_string()))
        };
    }
    which::which(name_or_path).map_err(|_| FragCutError::BinaryNotFound(name_or_path.to_string()))
}

/// Last lines of a stream, joined with newlines
async fn collect_tail<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(DIAGNOSTIC_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() == DIAGNOSTIC_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

/// Fold one `key=value` line of `-progress` output into `current`.
///
/// Returns a sample at the end of each block (`progress=continue|end`).
pub fn parse_progress_line(line: &str, current: &mut BackendProgress) -> Option<BackendProgress> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();

    match key {
        // Both keys carry microseconds
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<i64>() {
                current.processed_seconds = us.max(0) as f64 / 1_000_000.0;
            }
        }
        "frame" => current.frame = value.parse().ok(),
        "speed" => current.speed = value.trim_end_matches('x').trim().parse().ok(),
        "progress" => {
            current.finished = value == "end";
            return Some(current.clone());
        }
        _ => {}
    }
    None
}
