use std::sync::Arc;

use tracing::debug;

use crate::adapters::{AppConfig, FfmpegBackend, FfprobeAdapter, ProbeBackend};
use crate::app::{
    edit_interactor::EditInteractor, inspect_interactor::InspectInteractor,
    verify_interactor::VerifyInteractor,
};
use crate::domain::rules::EditRequestValidator;
use crate::engine::PipelineExecutor;
use crate::error::{FragCutError, FragCutResult};
use crate::ports::{MediaBackendPort, ProbePort};

pub trait AppContainer: Send + Sync {
    fn edit_interactor(&self) -> Arc<EditInteractor>;
    fn inspect_interactor(&self) -> Arc<InspectInteractor>;
    fn verify_interactor(&self) -> Arc<VerifyInteractor>;
}

pub struct DefaultAppContainer {
    edit_interactor: Arc<EditInteractor>,
    inspect_interactor: Arc<InspectInteractor>,
    verify_interactor: Arc<VerifyInteractor>,
}

impl DefaultAppContainer {
    /// Wire the configured FFmpeg adapters
    pub fn new(config: &AppConfig) -> FragCutResult<Self> {
        let probe_port = build_probe(config)?;
        let backend_port: Arc<dyn MediaBackendPort> = Arc::new(
            FfmpegBackend::locate(&config.backend.ffmpeg)?
                .with_threads(config.backend.threads)
                .with_log_level(config.backend.log_level.as_str()),
        );
        Ok(Self::with_ports(probe_port, backend_port, config))
    }

    /// Wire arbitrary port implementations
    pub fn with_ports(
        probe_port: Arc<dyn ProbePort>,
        backend_port: Arc<dyn MediaBackendPort>,
        config: &AppConfig,
    ) -> Self {
        let executor = PipelineExecutor::new(
            Arc::clone(&probe_port),
            backend_port,
            config.executor.clone(),
        );
        let edit_interactor = Arc::new(EditInteractor::new(
            Arc::clone(&probe_port),
            EditRequestValidator::new(config.limits),
            executor,
        ));
        let inspect_interactor = Arc::new(InspectInteractor::new(Arc::clone(&probe_port)));
        let verify_interactor = Arc::new(VerifyInteractor::new(probe_port));

        Self {
            edit_interactor,
            inspect_interactor,
            verify_interactor,
        }
    }
}

fn build_probe(config: &AppConfig) -> FragCutResult<Arc<dyn ProbePort>> {
    match config.backend.probe {
        ProbeBackend::Ffprobe => {
            let probe = FfprobeAdapter::locate(&config.backend.ffprobe)?;
            debug!("Using ffprobe at {}", probe.binary().display());
            Ok(Arc::new(probe))
        }
        #[cfg(feature = "libav")]
        ProbeBackend::Libav => {
            let probe = crate::adapters::LibavProbeAdapter::new().map_err(|e| {
                FragCutError::LibraryInit {
                    message: e.to_string(),
                }
            })?;
            debug!("Using in-process libav probe");
            Ok(Arc::new(probe))
        }
        #[cfg(not(feature = "libav"))]
        ProbeBackend::Libav => Err(FragCutError::Config(
            "backend.probe = \"libav\" needs a build with the `libav` feature".to_string(),
        )),
    }
}

impl AppContainer for DefaultAppContainer {
    fn edit_interactor(&self) -> Arc<EditInteractor> {
        Arc::clone(&self.edit_interactor)
    }

    fn inspect_interactor(&self) -> Arc<InspectInteractor> {
        Arc::clone(&self.inspect_interactor)
    }

    fn verify_interactor(&self) -> Arc<VerifyInteractor> {
        Arc::clone(&self.verify_interactor)
    }
}
