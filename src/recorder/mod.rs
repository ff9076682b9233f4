//! Run-history persistence.
//!
//! A completed run is written to two independent stores: a local JSON ring
//! buffer (most-recent 6, best-effort) and the remote run-history table
//! (server-side retention of the 5 most recent per user). The local write is
//! an explicit best-effort side channel: failures are logged and ignored,
//! never silently swallowed and never fatal.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::RecorderError;
use crate::facade::ServiceFacade;
use crate::ledger::{FlowLedger, ProviderProbe, Status};

/// Most recent records kept in the local ring buffer.
pub const LOCAL_RETENTION: usize = 6;
/// Most recent records the remote store retains per user (server-enforced).
pub const REMOTE_RETENTION: usize = 5;

/// Per-step subset persisted in a run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub id: String,
    pub name: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Immutable snapshot of one completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub competitor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_text: Option<String>,
    pub steps: Vec<StepSnapshot>,
    pub providers: Vec<ProviderProbe>,
    pub overall_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_level_error: Option<Value>,
}

impl RunRecord {
    /// Snapshot the ledger at the end of a run.
    pub fn from_ledger(
        ledger: &FlowLedger,
        competitor: &str,
        prompt_text: Option<String>,
        top_level_error: Option<Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            competitor_name: competitor.to_string(),
            prompt_text,
            steps: ledger
                .steps()
                .iter()
                .map(|step| StepSnapshot {
                    id: step.id.as_str().to_string(),
                    name: step.name.to_string(),
                    status: step.status,
                    error_message: step.error_message.clone(),
                })
                .collect(),
            providers: ledger.probes().to_vec(),
            overall_success: ledger.all_success(),
            top_level_error,
        }
    }

    /// Steps that ended in error or warning, for reports.
    pub fn failed_steps(&self) -> Vec<&StepSnapshot> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, Status::Error | Status::Warning))
            .collect()
    }
}

/// Writes completed runs to the local ring buffer and the remote store, and
/// reads recent history back.
pub struct RunRecorder {
    cache_file: PathBuf,
}

impl RunRecorder {
    pub fn new(cache_file: impl Into<PathBuf>) -> Self {
        Self {
            cache_file: cache_file.into(),
        }
    }

    /// Record a completed run. The local write is best-effort; a remote
    /// failure is returned so the caller can surface it as a non-blocking
    /// warning — it never invalidates the record already held in memory.
    pub async fn record(
        &self,
        facade: &Arc<dyn ServiceFacade>,
        record: &RunRecord,
    ) -> Result<(), RecorderError> {
        self.record_local(record);
        facade.insert_run(record).await?;
        Ok(())
    }

    /// Prepend to the local ring buffer and truncate to [`LOCAL_RETENTION`].
    /// Failures (quota, permissions, corrupt cache) are logged and ignored.
    pub fn record_local(&self, record: &RunRecord) {
        let mut records = self.load_local();
        records.insert(0, record.clone());
        records.truncate(LOCAL_RETENTION);
        if let Err(err) = self.write_local(&records) {
            tracing::warn!(
                cache = %self.cache_file.display(),
                error = %err,
                "local run cache write failed; continuing without it"
            );
        }
    }

    /// All locally cached runs, newest first. A missing or unreadable cache
    /// is an empty history, not an error.
    pub fn load_local(&self) -> Vec<RunRecord> {
        let content = match fs::read_to_string(&self.cache_file) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "local run cache is corrupt; starting fresh");
                Vec::new()
            }
        }
    }

    /// Recent runs from the remote store, newest first, clamped to
    /// [`REMOTE_RETENTION`].
    pub async fn load_recent(
        &self,
        facade: &Arc<dyn ServiceFacade>,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RunRecord>, RecorderError> {
        let mut records = facade
            .recent_runs(user_id, limit.min(REMOTE_RETENTION))
            .await?;
        records.truncate(REMOTE_RETENTION);
        Ok(records)
    }

    fn write_local(&self, records: &[RunRecord]) -> Result<(), RecorderError> {
        let content = serde_json::to_string_pretty(records)?;
        if let Some(parent) = self.cache_file.parent() {
            fs::create_dir_all(parent).map_err(|source| RecorderError::LocalWrite {
                path: self.cache_file.clone(),
                source,
            })?;
        }
        fs::write(&self.cache_file, content).map_err(|source| RecorderError::LocalWrite {
            path: self.cache_file.clone(),
            source,
        })
    }
}

/// Rebuild a ledger view from a persisted record, so the CLI can show the
/// last run's results without re-running anything. Steps and probes missing
/// from the record stay idle.
pub fn hydrate_ledger(record: &RunRecord) -> FlowLedger {
    let mut ledger = FlowLedger::new();
    let providers: Vec<_> = record
        .providers
        .iter()
        .filter_map(|p| crate::providers::Provider::parse(&p.key))
        .collect();
    ledger.reset(&providers);
    for snapshot in &record.steps {
        if let Some(id) = crate::registry::StepId::ALL
            .iter()
            .find(|s| s.as_str() == snapshot.id)
        {
            ledger.update_step(*id, snapshot.status, None, snapshot.error_message.clone());
        }
    }
    for probe in &record.providers {
        if ledger.probes().iter().any(|p| p.key == probe.key) {
            ledger.update_probe(
                &probe.key,
                probe.status,
                probe.tokens_used,
                probe.cost_usd,
                probe.error_message.clone(),
                probe.response_summary.clone(),
            );
        }
    }
    ledger
}
