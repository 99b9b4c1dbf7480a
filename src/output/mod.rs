//! Result reporting and output verification module

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::model::{EditKind, OperationResult, PlanStrategy};
use crate::engine::handle::RequestId;

pub mod reporter;
pub mod verifier;

pub use reporter::{OperationOutcome, OperationResultReporter};
pub use verifier::{OutputVerifier, VerificationReport};

/// Terminal record of one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationReport {
    /// Request this report belongs to
    pub request_id: RequestId,
    pub kind: EditKind,
    /// Destination path requested by the caller
    pub output: PathBuf,
    /// Strategy of the executed plan; absent when no plan was built
    pub strategy: Option<PlanStrategy>,
    /// Why the strategy was chosen
    pub decision: Option<String>,
    pub result: OperationResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OperationReport {
    /// Wall time between submission and the terminal result
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
