// Adapters - External system implementations

pub mod exec_ffmpeg;
pub mod probe_ffprobe;
#[cfg(feature = "libav")]
pub mod probe_libav;
pub mod toml_config;
pub mod tracing_log;

// Re-export adapters
pub use exec_ffmpeg::FfmpegBackend;
pub use probe_ffprobe::FfprobeAdapter;
#[cfg(feature = "libav")]
pub use probe_libav::LibavProbeAdapter;
pub use toml_config::{AppConfig, BackendConfig, ConfigLoader, ProbeBackend};
pub use tracing_log::{init_logging, LoggingConfig};
