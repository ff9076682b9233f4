//! Typed error hierarchy for the flowcheck subsystems.
//!
//! Three top-level enums cover the three subsystems:
//! - `FacadeError` — remote backend call failures
//! - `FlowError` — orchestrator-level failures (validation, re-entrancy)
//! - `RecorderError` — run-history persistence failures

use thiserror::Error;

/// Errors from the remote service facade.
///
/// Every facade operation returns one of these. Cloneable so scripted test
/// facades can replay a configured failure on each call.
#[derive(Debug, Clone, Error)]
pub enum FacadeError {
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no active user session")]
    NoSession,

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FacadeError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FacadeError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => FacadeError::Transport(err.to_string()),
        }
    }
}

/// Errors from the flow-test orchestrator itself.
///
/// Remote failures during a run are *not* represented here — they are
/// recorded on the affected step and the run still completes with a
/// `RunRecord`. Only caller mistakes surface as `FlowError`.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("competitor name must not be empty")]
    EmptyCompetitor,

    #[error("a flow test is already in progress")]
    AlreadyRunning,
}

/// Errors from run-history persistence.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to write local run cache at {path}: {source}")]
    LocalWrite {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize run record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("remote history write failed: {0}")]
    Remote(#[from] FacadeError),
}
