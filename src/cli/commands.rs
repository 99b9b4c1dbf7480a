//! Command implementations

use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::app::{
    AppContainer, EditInteractor, InspectFormat, InspectRequest, VerifyRequest,
};
use crate::cli::args::{AspectPreset, ExportArgs, ProbeArgs, RunArgs, TrimArgs, VerifyArgs};
use crate::cli::Commands;
use crate::domain::model::{EditRequest, OperationResult};
use crate::engine::{RequestEvent, RequestHandle, Subscription};
use crate::output::OperationReport;

/// Dispatch a parsed command
pub async fn run(container: &dyn AppContainer, command: Commands) -> Result<()> {
    match command {
        Commands::Trim(args) => trim(container, args).await,
        Commands::Export(args) => export(container, args).await,
        Commands::Probe(args) => probe(container, args).await,
        Commands::Verify(args) => verify(container, args).await,
    }
}

/// Execute the trim command
pub async fn trim(container: &dyn AppContainer, args: TrimArgs) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input, "trimmed"));
    info!("Trim {} [{} - {}] -> {}", args.input.display(), args.start, args.end, output.display());

    let request = apply_run_options(
        EditRequest::trim(&args.input, output, args.start, args.end),
        &args.run,
    );
    run_edit(&container.edit_interactor(), request, args.run.json).await
}

/// Execute the export command
pub async fn export(container: &dyn AppContainer, args: ExportArgs) -> Result<()> {
    let (width, height) = match (args.preset, args.width, args.height) {
        (Some(preset), _, _) => preset.dimensions(),
        (None, Some(width), Some(height)) => (width, height),
        _ => bail!("export needs --preset or both --width and --height"),
    };
    let fps = args.fps.unwrap_or(AspectPreset::FPS);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input, "export"));
    info!("Export {} at {}x{}@{} -> {}", args.input.display(), width, height, fps, output.display());

    let request = apply_run_options(
        EditRequest::export(&args.input, output, width, height, fps),
        &args.run,
    );
    run_edit(&container.edit_interactor(), request, args.run.json).await
}

/// Execute the probe command
pub async fn probe(container: &dyn AppContainer, args: ProbeArgs) -> Result<()> {
    let format = if args.json {
        InspectFormat::Json
    } else if args.yaml {
        InspectFormat::Yaml
    } else {
        InspectFormat::Text
    };
    let request = InspectRequest {
        path: args.input,
        format,
        show_keyframes: args.keyframes,
    };

    let response = container
        .inspect_interactor()
        .execute(request)
        .await
        .context("Failed to inspect input file")?;
    println!("{}", response.summary.trim_end());
    Ok(())
}

/// Execute the verify command
pub async fn verify(container: &dyn AppContainer, args: VerifyArgs) -> Result<()> {
    let request = VerifyRequest {
        path: args.input,
        duration: args.duration.map(|d| d.seconds),
        dimensions: args.width.zip(args.height),
        fps: args.fps,
        tolerance: args.tolerance,
    };

    let report = container
        .verify_interactor()
        .execute(request)
        .await
        .context("Failed to verify output")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let result = &report.result;
        println!("File: {}", report.path.display());
        println!(
            "  Duration:   {} ({:.3}s)",
            check_mark(result.duration_valid),
            report.media_info.duration.seconds
        );
        println!("  Dimensions: {}", check_mark(result.dimensions_valid));
        println!("  Frame rate: {}", check_mark(result.fps_valid));
    }

    if !report.passed() {
        bail!("verification failed for {}", report.path.display());
    }
    Ok(())
}

fn check_mark(valid: bool) -> &'static str {
    if valid {
        "ok"
    } else {
        "MISMATCH"
    }
}

fn apply_run_options(mut request: EditRequest, run: &RunArgs) -> EditRequest {
    request.options.overwrite = run.overwrite;
    request.options.retain_partial = run.keep_partial;
    if let Some(secs) = run.timeout {
        request.options.timeout = Some(Duration::from_secs(secs));
    }
    request
}

/// Submit, follow progress until the terminal result, cancel on Ctrl-C
async fn run_edit(interactor: &EditInteractor, request: EditRequest, json: bool) -> Result<()> {
    let handle = interactor.submit(request).await?;
    let mut events = interactor.subscribe(&handle);
    follow(interactor, &handle, &mut events, tokio::signal::ctrl_c(), json).await;
    if !json {
        eprintln!();
    }

    let report = handle.wait_report().await;
    print_report(&report, json)?;

    match &report.result {
        OperationResult::Success { .. } => Ok(()),
        OperationResult::Cancelled { message } => bail!("{}", message),
        OperationResult::Failure { kind, message } => bail!("{} ({})", message, kind),
    }
}

/// Print progress until the request finishes, cancelling it once `interrupt` fires
async fn follow<F>(
    interactor: &EditInteractor,
    handle: &RequestHandle,
    events: &mut Subscription,
    interrupt: F,
    json: bool,
) where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(interrupt);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(RequestEvent::Progress(fraction)) => {
                    if !json {
                        eprint!("\rProgress: {:5.1}%", fraction * 100.0);
                        let _ = std::io::stderr().flush();
                    }
                }
                Some(RequestEvent::Finished(_)) | None => break,
            },
            signal = &mut interrupt, if !interrupted => {
                interrupted = true;
                if signal.is_ok() {
                    warn!("Interrupted, cancelling request {}", handle.id());
                    interactor.cancel(handle);
                }
            }
        }
    }
}

fn print_report(report: &OperationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json_pretty()?);
        return Ok(());
    }

    if let Some(strategy) = report.strategy {
        println!("Strategy: {}", strategy);
    }
    if let Some(decision) = &report.decision {
        println!("Decision: {}", decision);
    }
    let elapsed = report.elapsed().num_milliseconds() as f64 / 1000.0;
    println!("{} [{:.1}s]", report.result.message(), elapsed);
    Ok(())
}

/// `<dir>/<stem>_<suffix>.<ext>` next to `input`; `mp4` when the input has no extension
pub fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push("_");
    name.push(suffix);
    name.push(".");
    name.push(input.extension().unwrap_or(OsStr::new("mp4")));
    input.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::adapters::AppConfig;
    use crate::app::DefaultAppContainer;
    use crate::domain::errors::DomainError;
    use crate::domain::model::*;
    use crate::domain::rules::KeyframeWindow;
    use crate::ports::*;

    struct StillProbe;

    #[async_trait]
    impl ProbePort for StillProbe {
        async fn probe_media(&self, file_path: &Path) -> Result<MediaInfo, DomainError> {
            Ok(MediaInfo {
                path: file_path.to_path_buf(),
                container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
                duration: TimeSpec::from_seconds(30.0),
                file_size: 5,
                bit_rate: None,
                video: Some(VideoStreamInfo::new(0, "h264", 640, 360, 30.0)),
                audio_streams: Vec::new(),
            })
        }

        async fn probe_keyframes(
            &self,
            _file_path: &Path,
            _window: KeyframeWindow,
        ) -> Result<Vec<f64>, DomainError> {
            Ok(vec![0.0])
        }
    }

    /// Runs until told to stop
    struct StubbornBackend;

    #[async_trait]
    impl MediaBackendPort for StubbornBackend {
        async fn run(
            &self,
            _plan: &ExecutionPlan,
            _output: &Path,
            _progress: ProgressSink,
            mut cancel: CancelSignal,
        ) -> BackendExit {
            cancellation(&mut cancel).await;
            BackendExit::Cancelled
        }
    }

    #[tokio::test]
    async fn test_interrupt_cancels_running_request() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in.mp4");
        std::fs::write(&source, b"media").unwrap();

        let container = DefaultAppContainer::with_ports(
            Arc::new(StillProbe),
            Arc::new(StubbornBackend),
            &AppConfig::default(),
        );
        let interactor = container.edit_interactor();
        let request = EditRequest::trim(
            &source,
            dir.path().join("out.mp4"),
            TimeSpec::from_seconds(1.0),
            TimeSpec::from_seconds(2.0),
        );
        let handle = interactor.submit(request).await.unwrap();
        let mut events = interactor.subscribe(&handle);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tx.send(()).unwrap();
        let interrupt = async move {
            let _ = rx.await;
            Ok::<(), std::io::Error>(())
        };

        tokio::time::timeout(
            Duration::from_secs(5),
            follow(&interactor, &handle, &mut events, interrupt, true),
        )
        .await
        .unwrap();
        assert!(handle.wait().await.is_cancelled());
    }

    #[test]
    fn test_default_output_keeps_directory_and_extension() {
        assert_eq!(
            default_output(Path::new("videos/holiday.mov"), "trimmed"),
            PathBuf::from("videos/holiday_trimmed.mov")
        );
        assert_eq!(
            default_output(Path::new("clip.final.mp4"), "export"),
            PathBuf::from("clip.final_export.mp4")
        );
        assert_eq!(
            default_output(Path::new("raw"), "trimmed"),
            PathBuf::from("raw_trimmed.mp4")
        );
    }

    #[test]
    fn test_run_options_are_applied() {
        let run = RunArgs {
            timeout: Some(30),
            overwrite: true,
            keep_partial: true,
            ..Default::default()
        };
        let request = apply_run_options(
            EditRequest::export("in.mp4", "out.mp4", 1080, 1920, 60.0),
            &run,
        );
        assert_eq!(request.options.timeout, Some(Duration::from_secs(30)));
        assert!(request.options.overwrite);
        assert!(request.options.retain_partial);
    }
}
