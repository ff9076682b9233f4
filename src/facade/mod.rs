//! The remote service facade.
//!
//! Every remote operation a flow test exercises goes through the
//! [`ServiceFacade`] trait: the orchestrator never talks to the backend
//! directly, so tests can substitute a scripted facade. The production
//! implementation is [`http::HttpFacade`].

pub mod http;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FacadeError;
use crate::recorder::RunRecord;

/// The authenticated session, as far as a flow test cares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
}

/// Result of the API key health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyCheck {
    pub working_keys: u32,
    pub total_keys: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_provider_status: Option<Value>,
}

/// What to ask the feature gate for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateAction {
    Check,
    Unlock,
}

/// Gate response. All fields are optional on the wire; the orchestrator
/// only trusts explicit values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateStatus {
    #[serde(default)]
    pub can_proceed: Option<bool>,
    #[serde(default)]
    pub unlocked: Option<bool>,
    #[serde(default)]
    pub reasons: Option<Vec<String>>,
}

/// Row written to the progress-tracking table before analysis starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInsert {
    pub session_id: String,
    pub user_id: String,
    pub total_competitors: u32,
    pub current_competitor: String,
}

/// One analysis dispatch for the full provider list — never per-provider
/// calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub session_id: String,
    pub competitor_names: Vec<String>,
    pub provider_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Analysis pipeline response. `results` is polymorphic on the wire; it is
/// classified once by [`crate::payload::AnalysisPayload::classify`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Option<Value>,
}

/// A persisted analysis row, as read back by the storage step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRow {
    pub id: String,
    pub user_id: String,
    pub competitor_name: String,
    #[serde(default)]
    pub analysis_data: Option<Value>,
}

/// Best-effort company profile derived from an analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpsert {
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub profile: Value,
}

/// All remote operations a flow test performs.
///
/// Error semantics are the caller's concern: the orchestrator decides which
/// failures are fatal (auth, gate) and which only mark a step.
#[async_trait]
pub trait ServiceFacade: Send + Sync {
    /// Current session; absence of a user is always fatal to a run.
    async fn session(&self) -> Result<Session, FacadeError>;

    /// API key health across providers.
    async fn check_keys(&self) -> Result<KeyCheck, FacadeError>;

    /// Feature gate check or unlock.
    async fn gate(&self, action: GateAction) -> Result<GateStatus, FacadeError>;

    /// Realtime channel health probe.
    async fn realtime_probe(&self) -> Result<(), FacadeError>;

    /// Write a progress row for the run.
    async fn insert_progress(&self, req: &ProgressInsert) -> Result<(), FacadeError>;

    /// Kick off the analysis pipeline for the full provider list.
    async fn start_analysis(&self, req: &AnalysisRequest) -> Result<AnalysisResponse, FacadeError>;

    /// Newest persisted analysis row for (user, competitor),
    /// case-insensitive on the competitor name.
    async fn latest_analysis(
        &self,
        user_id: &str,
        competitor: &str,
    ) -> Result<Option<AnalysisRow>, FacadeError>;

    /// Upsert a company profile; returns the profile id.
    async fn upsert_profile(&self, req: &ProfileUpsert) -> Result<String, FacadeError>;

    /// Link an analysis row to a profile.
    async fn link_profile(&self, analysis_id: &str, profile_id: &str) -> Result<(), FacadeError>;

    /// Append a run record to the remote history. The server retains only
    /// the five most recent per user.
    async fn insert_run(&self, record: &RunRecord) -> Result<(), FacadeError>;

    /// Recent run records, newest first. Never returns more than five.
    async fn recent_runs(&self, user_id: &str, limit: usize)
        -> Result<Vec<RunRecord>, FacadeError>;
}
