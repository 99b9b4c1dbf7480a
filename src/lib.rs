//! FragCut video clip pipeline library
//!
//! Validates trim and export requests against probed source media, executes
//! them through a media backend on per-request workers, and reports progress
//! and a closed set of results.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod output;
pub mod ports;

// Re-export commonly used types
pub use app::{EditInteractor, InspectInteractor, VerifyInteractor};
pub use domain::errors::{DomainError, ErrorKind};
pub use domain::model::{
    AudioStreamInfo, EditRequest, MediaInfo, OperationResult, RequestState, TimeSpec,
    VideoStreamInfo,
};
pub use engine::{PipelineExecutor, RequestEvent, RequestHandle, Subscription};
pub use error::{FragCutError, FragCutResult};
