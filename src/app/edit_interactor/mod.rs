// Edit interactor - Orchestrates the submit / cancel / subscribe use case

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::domain::rules::EditRequestValidator;
use crate::engine::{PipelineExecutor, RequestHandle, Subscription};
use crate::ports::ProbePort;

/// Caller-facing API for edit requests
#[derive(Clone)]
pub struct EditInteractor {
    probe_port: Arc<dyn ProbePort>,
    validator: EditRequestValidator,
    executor: PipelineExecutor,
}

impl EditInteractor {
    pub fn new(
        probe_port: Arc<dyn ProbePort>,
        validator: EditRequestValidator,
        executor: PipelineExecutor,
    ) -> Self {
        Self {
            probe_port,
            validator,
            executor,
        }
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    /// Validate `request` against its source and start executing it.
    ///
    /// Rejections and conflicts are returned here; everything that happens
    /// after execution starts arrives through the handle.
    pub async fn submit(&self, request: EditRequest) -> Result<RequestHandle, DomainError> {
        debug!(
            "Validating {} request: {} -> {}",
            request.kind(),
            request.source.display(),
            request.output.display()
        );

        let validated = self.validate(request).await.map_err(|e| {
            warn!("Request rejected ({}): {}", e.kind(), e);
            e
        })?;

        self.executor.execute(validated)
    }

    async fn validate(&self, request: EditRequest) -> Result<ValidatedRequest, DomainError> {
        self.validator.check_shape(&request)?;

        if !request.source.is_file() {
            return Err(ValidationError::parameter(format!(
                "source file does not exist: {}",
                request.source.display()
            ))
            .into());
        }
        if is_same_file(&request.source, &request.output) {
            return Err(ValidationError::parameter(format!(
                "output {} resolves to the source file",
                request.output.display()
            ))
            .into());
        }
        if request.output.exists() && !request.options.overwrite {
            return Err(ValidationError::parameter(format!(
                "output file already exists: {} (use overwrite to replace it)",
                request.output.display()
            ))
            .into());
        }

        let media_info = self.probe_port.probe_media(&request.source).await?;
        debug!(
            "Source probed: {} streams, {}",
            media_info.total_streams(),
            media_info.duration
        );

        Ok(self.validator.validate(request, &media_info)?)
    }

    /// Request cancellation. Returns false if the request already finished.
    pub fn cancel(&self, handle: &RequestHandle) -> bool {
        self.executor.cancel(handle)
    }

    pub fn subscribe(&self, handle: &RequestHandle) -> Subscription {
        self.executor.subscribe(handle)
    }

    /// Submit and wait for the terminal result
    pub async fn run(&self, request: EditRequest) -> Result<OperationResult, DomainError> {
        let handle = self.submit(request).await?;
        let result = handle.wait().await;
        info!("Request {} finished: {}", handle.id(), handle.state());
        Ok(result)
    }
}

/// Whether `output` names the existing file `source` once both are resolved
fn is_same_file(source: &Path, output: &Path) -> bool {
    let Ok(source) = source.canonicalize() else {
        return false;
    };
    resolve_output(output).map_or(false, |output| output == source)
}

/// Filesystem location `output` would be written to, if its directory exists
fn resolve_output(output: &Path) -> Option<PathBuf> {
    if let Ok(existing) = output.canonicalize() {
        return Some(existing);
    }
    let name = output.file_name()?;
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Some(parent.canonicalize().ok()?.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dot_dot_alias_resolves_to_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"media").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        assert!(is_same_file(&source, &dir.path().join("sub/../clip.mp4")));
        assert!(is_same_file(&source, &dir.path().join("./clip.mp4")));
        assert!(!is_same_file(&source, &dir.path().join("sub/clip.mp4")));
        assert!(!is_same_file(&source, &dir.path().join("missing/../other.mp4")));
    }
}
