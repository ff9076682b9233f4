//! The flow-test orchestrator.
//!
//! One run drives the twelve registry steps strictly in order through the
//! service facade, updating the ledger as it goes. There is no parallelism,
//! no retry, and no per-call timeout anywhere in the sequence — a deliberate
//! observability trade-off: when a step fails, the ledger says exactly which
//! remote call failed and everything before it is already settled.
//!
//! Failure semantics:
//! - `auth` and the `gate` check/unlock pair are fatal; the remaining steps
//!   never leave idle.
//! - every other remote failure marks its step and the run continues.
//! - `orchestration` and `aggregate` depend on analysis output and are
//!   marked "skipped due to analysis error" without being invoked when
//!   analysis fails.
//! - the run always completes with a [`RunRecord`], even on abort.

use std::sync::Arc;

use serde_json::{Value, json};
use uuid::Uuid;

use crate::errors::{FacadeError, FlowError};
use crate::facade::{
    AnalysisRequest, GateAction, ProfileUpsert, ProgressInsert, ServiceFacade,
};
use crate::ledger::{FlowLedger, LedgerObserver, ProbeStatus, Status};
use crate::payload::{AnalysisPayload, InsightSummary, ProviderResult};
use crate::providers::{Provider, normalize_selection};
use crate::recorder::{RunRecord, RunRecorder};
use crate::registry::StepId;

/// What a completed run hands back to the caller.
#[derive(Debug)]
pub struct RunOutcome {
    pub record: RunRecord,
    /// Set when the remote history write failed. Non-blocking: the record
    /// itself is intact.
    pub recorder_warning: Option<String>,
}

/// Drives one flow test at a time. The single-writer rule for the ledger is
/// structural: `run` takes `&mut self`.
pub struct FlowRunner {
    facade: Arc<dyn ServiceFacade>,
    recorder: RunRecorder,
    ledger: FlowLedger,
    in_flight: bool,
}

/// Internal result of one step's remote work.
enum StepOutcome {
    Continue,
    Abort { message: String },
}

impl FlowRunner {
    pub fn new(facade: Arc<dyn ServiceFacade>, recorder: RunRecorder) -> Self {
        Self {
            facade,
            recorder,
            ledger: FlowLedger::new(),
            in_flight: false,
        }
    }

    pub fn set_observer(&mut self, observer: Arc<dyn LedgerObserver>) {
        self.ledger.set_observer(observer);
    }

    pub fn ledger(&self) -> &FlowLedger {
        &self.ledger
    }

    /// Execute one full flow test for `competitor`.
    ///
    /// Validation failures return `Err` before any remote call is made.
    /// Remote failures do not: the run completes and the returned record
    /// carries the per-step detail.
    pub async fn run(
        &mut self,
        competitor: &str,
        selected_providers: &[String],
        prompt: Option<String>,
    ) -> Result<RunOutcome, FlowError> {
        let competitor = competitor.trim();
        if competitor.is_empty() {
            return Err(FlowError::EmptyCompetitor);
        }
        if self.in_flight {
            return Err(FlowError::AlreadyRunning);
        }
        self.in_flight = true;

        let providers = normalize_selection(selected_providers);
        self.ledger.reset(&providers);
        let session_id = Uuid::new_v4().to_string();

        let mut top_level_error: Option<Value> = None;
        let mut user_id = String::new();
        let mut analysis_results: Option<Vec<ProviderResult>> = None;
        let mut summary: Option<InsightSummary> = None;
        let mut readback_data: Option<Value> = None;

        'sequence: for step in StepId::ALL {
            let outcome = match step {
                StepId::Auth => self.step_auth(&mut user_id).await,
                StepId::ApiKeys => self.step_apikeys().await,
                StepId::Encryption => self.step_encryption(),
                StepId::Gate => self.step_gate().await,
                StepId::Database => self.step_database(&user_id).await,
                StepId::Realtime => self.step_realtime().await,
                StepId::Progress => {
                    self.step_progress(&session_id, &user_id, competitor).await
                }
                StepId::Analysis => {
                    self.step_analysis(
                        &session_id,
                        competitor,
                        &providers,
                        prompt.as_deref(),
                        &mut analysis_results,
                    )
                    .await
                }
                StepId::Orchestration => self.step_orchestration(&analysis_results),
                StepId::Aggregate => {
                    self.step_aggregate(competitor, &analysis_results, &mut summary)
                }
                StepId::Storage => {
                    self.step_storage(&user_id, competitor, &mut readback_data).await
                }
                StepId::Surface => self.step_surface(&summary, &readback_data),
            };
            if let StepOutcome::Abort { message } = outcome {
                top_level_error = Some(json!({ "step": step.as_str(), "message": message }));
                break 'sequence;
            }
        }

        let record =
            RunRecord::from_ledger(&self.ledger, competitor, prompt.clone(), top_level_error);
        let recorder_warning = self
            .recorder
            .record(&self.facade, &record)
            .await
            .err()
            .map(|e| e.to_string());

        self.in_flight = false;
        Ok(RunOutcome {
            record,
            recorder_warning,
        })
    }

    async fn step_auth(&mut self, user_id: &mut String) -> StepOutcome {
        self.ledger.update_step(StepId::Auth, Status::Running, None, None);
        self.ledger
            .update_sub_step(StepId::Auth, "session", Status::Running, None);

        let session = match self.facade.session().await {
            Ok(session) => session,
            Err(err) => return self.abort_step(StepId::Auth, "session", err.to_string()),
        };
        self.ledger
            .update_sub_step(StepId::Auth, "session", Status::Success, None);

        self.ledger
            .update_sub_step(StepId::Auth, "identity", Status::Running, None);
        if session.user_id.is_empty() {
            return self.abort_step(StepId::Auth, "identity", "session has no user".to_string());
        }
        *user_id = session.user_id.clone();
        self.ledger.update_sub_step(
            StepId::Auth,
            "identity",
            Status::Success,
            Some(format!("user {}", session.user_id)),
        );
        self.ledger.update_step(
            StepId::Auth,
            Status::Success,
            Some(json!({ "user_id": session.user_id })),
            None,
        );
        StepOutcome::Continue
    }

    async fn step_apikeys(&mut self) -> StepOutcome {
        self.ledger.update_step(StepId::ApiKeys, Status::Running, None, None);
        self.ledger
            .update_sub_step(StepId::ApiKeys, "invoke", Status::Running, None);

        let keys = match self.facade.check_keys().await {
            Ok(keys) => keys,
            Err(err) => return self.fail_step(StepId::ApiKeys, "invoke", err),
        };
        self.ledger
            .update_sub_step(StepId::ApiKeys, "invoke", Status::Success, None);

        let verdict = format!("{}/{} keys working", keys.working_keys, keys.total_keys);
        let payload = json!({
            "working_keys": keys.working_keys,
            "total_keys": keys.total_keys,
            "per_provider_status": keys.per_provider_status,
        });
        if keys.working_keys == 0 {
            self.ledger.update_sub_step(
                StepId::ApiKeys,
                "evaluate",
                Status::Error,
                Some("no working API keys".to_string()),
            );
            self.ledger.update_step(
                StepId::ApiKeys,
                Status::Error,
                Some(payload),
                Some("no working API keys".to_string()),
            );
        } else if keys.working_keys < keys.total_keys {
            self.ledger
                .update_sub_step(StepId::ApiKeys, "evaluate", Status::Warning, Some(verdict.clone()));
            self.ledger
                .update_step(StepId::ApiKeys, Status::Warning, Some(payload), Some(verdict));
        } else {
            self.ledger
                .update_sub_step(StepId::ApiKeys, "evaluate", Status::Success, Some(verdict));
            self.ledger
                .update_step(StepId::ApiKeys, Status::Success, Some(payload), None);
        }
        StepOutcome::Continue
    }

    /// Display-only: keys are encrypted server-side; there is nothing to
    /// call and nothing that can fail.
    fn step_encryption(&mut self) -> StepOutcome {
        self.ledger.update_step(StepId::Encryption, Status::Running, None, None);
        self.ledger.update_sub_step(
            StepId::Encryption,
            "status",
            Status::Success,
            Some("keys encrypted at rest server-side".to_string()),
        );
        self.ledger.update_step(
            StepId::Encryption,
            Status::Success,
            Some(json!({ "mode": "server-side" })),
            None,
        );
        StepOutcome::Continue
    }

    /// The one step whose failure short-circuits the rest of the sequence:
    /// check, then unlock if blocked; if unlock fails or does not report
    /// `unlocked = true`, the run aborts.
    async fn step_gate(&mut self) -> StepOutcome {
        self.ledger.update_step(StepId::Gate, Status::Running, None, None);
        self.ledger
            .update_sub_step(StepId::Gate, "check", Status::Running, None);

        let check = match self.facade.gate(GateAction::Check).await {
            Ok(status) => status,
            Err(err) => return self.abort_step(StepId::Gate, "check", err.to_string()),
        };
        self.ledger
            .update_sub_step(StepId::Gate, "check", Status::Success, None);

        if check.can_proceed == Some(false) {
            self.ledger
                .update_sub_step(StepId::Gate, "unlock", Status::Running, None);
            let unlocked = match self.facade.gate(GateAction::Unlock).await {
                Ok(status) => status.unlocked == Some(true),
                Err(err) => {
                    return self.abort_step(StepId::Gate, "unlock", err.to_string());
                }
            };
            if !unlocked {
                let reasons = check.reasons.unwrap_or_default().join("; ");
                let message = if reasons.is_empty() {
                    "gate unlock did not report unlocked".to_string()
                } else {
                    format!("gate unlock did not report unlocked ({reasons})")
                };
                return self.abort_step(StepId::Gate, "unlock", message);
            }
            self.ledger
                .update_sub_step(StepId::Gate, "unlock", Status::Success, None);
        }

        self.ledger.update_step(
            StepId::Gate,
            Status::Success,
            Some(json!({ "can_proceed": check.can_proceed, "reasons": check.reasons })),
            None,
        );
        StepOutcome::Continue
    }

    async fn step_database(&mut self, user_id: &str) -> StepOutcome {
        self.ledger.update_step(StepId::Database, Status::Running, None, None);
        self.ledger
            .update_sub_step(StepId::Database, "read", Status::Running, None);

        match self.facade.recent_runs(user_id, 1).await {
            Ok(rows) => {
                self.ledger
                    .update_sub_step(StepId::Database, "read", Status::Success, None);
                self.ledger.update_step(
                    StepId::Database,
                    Status::Success,
                    Some(json!({ "rows": rows.len() })),
                    None,
                );
                StepOutcome::Continue
            }
            Err(err) => self.fail_step(StepId::Database, "read", err),
        }
    }

    async fn step_realtime(&mut self) -> StepOutcome {
        self.ledger.update_step(StepId::Realtime, Status::Running, None, None);
        self.ledger
            .update_sub_step(StepId::Realtime, "channel", Status::Running, None);

        match self.facade.realtime_probe().await {
            Ok(()) => {
                self.ledger
                    .update_sub_step(StepId::Realtime, "channel", Status::Success, None);
                self.ledger
                    .update_step(StepId::Realtime, Status::Success, None, None);
                StepOutcome::Continue
            }
            Err(err) => self.fail_step(StepId::Realtime, "channel", err),
        }
    }

    async fn step_progress(
        &mut self,
        session_id: &str,
        user_id: &str,
        competitor: &str,
    ) -> StepOutcome {
        self.ledger.update_step(StepId::Progress, Status::Running, None, None);
        self.ledger
            .update_sub_step(StepId::Progress, "insert", Status::Running, None);

        let req = ProgressInsert {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            total_competitors: 1,
            current_competitor: competitor.to_string(),
        };
        match self.facade.insert_progress(&req).await {
            Ok(()) => {
                self.ledger
                    .update_sub_step(StepId::Progress, "insert", Status::Success, None);
                self.ledger
                    .update_step(StepId::Progress, Status::Success, None, None);
                StepOutcome::Continue
            }
            Err(err) => self.fail_step(StepId::Progress, "insert", err),
        }
    }

    /// One dispatch call carrying the full provider list. A transport-level
    /// success with no usable results is still a failure.
    async fn step_analysis(
        &mut self,
        session_id: &str,
        competitor: &str,
        providers: &[Provider],
        prompt: Option<&str>,
        results_out: &mut Option<Vec<ProviderResult>>,
    ) -> StepOutcome {
        self.ledger.update_step(StepId::Analysis, Status::Running, None, None);
        self.ledger
            .update_sub_step(StepId::Analysis, "dispatch", Status::Running, None);
        for provider in providers {
            self.ledger
                .update_probe(provider.key(), ProbeStatus::Running, None, None, None, None);
        }

        let req = AnalysisRequest {
            session_id: session_id.to_string(),
            competitor_names: vec![competitor.to_string()],
            provider_keys: providers.iter().map(|p| p.key().to_string()).collect(),
            prompt: prompt.map(str::to_string),
        };
        let response = match self.facade.start_analysis(&req).await {
            Ok(response) => response,
            Err(err) => {
                self.fail_probes(providers, "analysis dispatch failed");
                return self.fail_step(StepId::Analysis, "dispatch", err);
            }
        };
        self.ledger
            .update_sub_step(StepId::Analysis, "dispatch", Status::Success, None);

        self.ledger
            .update_sub_step(StepId::Analysis, "results", Status::Running, None);
        let raw_results = response.results.clone().unwrap_or(Value::Null);
        let normalized = if response.success {
            AnalysisPayload::classify(raw_results.clone()).map(AnalysisPayload::normalize)
        } else {
            None
        };
        match normalized {
            Some(results) if !results.is_empty() => {
                self.ledger.update_sub_step(
                    StepId::Analysis,
                    "results",
                    Status::Success,
                    Some(format!("{} result(s)", results.len())),
                );
                self.ledger
                    .update_step(StepId::Analysis, Status::Success, Some(raw_results), None);
                *results_out = Some(results);
                StepOutcome::Continue
            }
            _ => {
                let message = "AI pipeline returned no results".to_string();
                self.fail_probes(providers, &message);
                self.ledger.update_sub_step(
                    StepId::Analysis,
                    "results",
                    Status::Error,
                    Some(message.clone()),
                );
                self.ledger
                    .update_step(StepId::Analysis, Status::Error, None, Some(message));
                StepOutcome::Continue
            }
        }
    }

    /// Attribute results to provider probes. Depends on analysis output;
    /// marked as skipped when there is none.
    fn step_orchestration(&mut self, results: &Option<Vec<ProviderResult>>) -> StepOutcome {
        let Some(results) = results else {
            return self.skip_dependent(StepId::Orchestration);
        };
        self.ledger
            .update_step(StepId::Orchestration, Status::Running, None, None);

        // Variant was decided once at classification time; record which
        // paths the results took for diagnostics.
        let attributed = results.iter().filter(|r| r.provider.is_some()).count();
        self.ledger.update_sub_step(
            StepId::Orchestration,
            "normalize",
            Status::Success,
            Some(format!("{} result(s), {} attributed", results.len(), attributed)),
        );

        let probe_keys: Vec<String> =
            self.ledger.probes().iter().map(|p| p.key.clone()).collect();
        let mut resolved = 0usize;
        for key in &probe_keys {
            let matched = results.iter().find(|r| r.provider.as_deref() == Some(key));
            match matched {
                Some(result) if result.error.is_some() => {
                    self.ledger.update_probe(
                        key,
                        ProbeStatus::Error,
                        result.tokens_used,
                        result.cost_usd,
                        result.error.clone(),
                        None,
                    );
                }
                Some(result) => {
                    resolved += 1;
                    self.ledger.update_probe(
                        key,
                        ProbeStatus::Success,
                        result.tokens_used,
                        result.cost_usd,
                        None,
                        Some(json!({
                            "strengths": result.strengths.len(),
                            "weaknesses": result.weaknesses.len(),
                        })),
                    );
                }
                None if attributed == 0 => {
                    // A single unattributed result covers every selected
                    // provider.
                    resolved += 1;
                    self.ledger
                        .update_probe(key, ProbeStatus::Success, None, None, None, None);
                }
                None => {
                    self.ledger.update_probe(
                        key,
                        ProbeStatus::Error,
                        None,
                        None,
                        Some("provider returned no result".to_string()),
                        None,
                    );
                }
            }
        }
        self.ledger.update_sub_step(
            StepId::Orchestration,
            "probes",
            Status::Success,
            Some(format!("{resolved}/{} providers resolved", probe_keys.len())),
        );
        self.ledger.update_step(
            StepId::Orchestration,
            Status::Success,
            Some(json!({ "resolved": resolved, "selected": probe_keys.len() })),
            None,
        );
        StepOutcome::Continue
    }

    /// Pure local merge into the view model. Never invoked when analysis
    /// failed.
    fn step_aggregate(
        &mut self,
        competitor: &str,
        results: &Option<Vec<ProviderResult>>,
        summary_out: &mut Option<InsightSummary>,
    ) -> StepOutcome {
        let Some(results) = results else {
            return self.skip_dependent(StepId::Aggregate);
        };
        self.ledger.update_step(StepId::Aggregate, Status::Running, None, None);

        let summary = InsightSummary::build(competitor, results);
        self.ledger.update_sub_step(
            StepId::Aggregate,
            "merge",
            Status::Success,
            Some(format!(
                "{} strengths, {} weaknesses",
                summary.total_strengths, summary.total_weaknesses
            )),
        );
        let payload = serde_json::to_value(&summary).unwrap_or(Value::Null);
        self.ledger
            .update_step(StepId::Aggregate, Status::Success, Some(payload), None);
        *summary_out = Some(summary);
        StepOutcome::Continue
    }

    /// Re-read what the pipeline persisted; writes nothing new itself.
    /// A row with an empty payload is a warning, and a failure of the
    /// secondary profile upsert/link downgrades the step to warning too —
    /// linking is non-critical.
    async fn step_storage(
        &mut self,
        user_id: &str,
        competitor: &str,
        readback_out: &mut Option<Value>,
    ) -> StepOutcome {
        self.ledger.update_step(StepId::Storage, Status::Running, None, None);
        self.ledger
            .update_sub_step(StepId::Storage, "readback", Status::Running, None);

        let row = match self.facade.latest_analysis(user_id, competitor).await {
            Ok(row) => row,
            Err(err) => return self.fail_step(StepId::Storage, "readback", err),
        };
        let Some(row) = row else {
            let message = format!("no persisted analysis found for '{competitor}'");
            self.ledger.update_sub_step(
                StepId::Storage,
                "readback",
                Status::Error,
                Some(message.clone()),
            );
            self.ledger
                .update_step(StepId::Storage, Status::Error, None, Some(message));
            return StepOutcome::Continue;
        };

        let data = row.analysis_data.clone().unwrap_or(Value::Null);
        let empty = match &data {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if empty {
            let message = "persisted row has an empty analysis payload".to_string();
            self.ledger.update_sub_step(
                StepId::Storage,
                "readback",
                Status::Warning,
                Some(message.clone()),
            );
            self.ledger.update_step(
                StepId::Storage,
                Status::Warning,
                Some(json!({ "row_id": row.id })),
                Some(message),
            );
            return StepOutcome::Continue;
        }
        self.ledger
            .update_sub_step(StepId::Storage, "readback", Status::Success, None);
        *readback_out = Some(data.clone());

        self.ledger
            .update_sub_step(StepId::Storage, "profile", Status::Running, None);
        let upsert = ProfileUpsert {
            company_name: competitor.to_string(),
            website: data
                .get("website")
                .and_then(Value::as_str)
                .map(str::to_string),
            profile: data,
        };
        let linked = match self.facade.upsert_profile(&upsert).await {
            Ok(profile_id) => self.facade.link_profile(&row.id, &profile_id).await,
            Err(err) => Err(err),
        };
        match linked {
            Ok(()) => {
                self.ledger
                    .update_sub_step(StepId::Storage, "profile", Status::Success, None);
                self.ledger.update_step(
                    StepId::Storage,
                    Status::Success,
                    Some(json!({ "row_id": row.id })),
                    None,
                );
            }
            Err(err) => {
                let message = format!("profile link failed: {err}");
                self.ledger.update_sub_step(
                    StepId::Storage,
                    "profile",
                    Status::Warning,
                    Some(message.clone()),
                );
                self.ledger.update_step(
                    StepId::Storage,
                    Status::Warning,
                    Some(json!({ "row_id": row.id })),
                    Some(message),
                );
            }
        }
        StepOutcome::Continue
    }

    /// Local render check: something must be presentable, either the fresh
    /// aggregate or the persisted readback.
    fn step_surface(
        &mut self,
        summary: &Option<InsightSummary>,
        readback: &Option<Value>,
    ) -> StepOutcome {
        self.ledger.update_step(StepId::Surface, Status::Running, None, None);
        self.ledger
            .update_sub_step(StepId::Surface, "render", Status::Running, None);

        let renderable = summary.as_ref().map(|s| s.has_content()).unwrap_or(false)
            || readback.is_some();
        if renderable {
            let source = if summary.as_ref().map(|s| s.has_content()).unwrap_or(false) {
                "aggregate"
            } else {
                "storage readback"
            };
            self.ledger.update_sub_step(
                StepId::Surface,
                "render",
                Status::Success,
                Some(format!("rendered from {source}")),
            );
            self.ledger.update_step(
                StepId::Surface,
                Status::Success,
                Some(json!({ "source": source })),
                None,
            );
        } else {
            let message = "nothing to surface".to_string();
            self.ledger.update_sub_step(
                StepId::Surface,
                "render",
                Status::Error,
                Some(message.clone()),
            );
            self.ledger
                .update_step(StepId::Surface, Status::Error, None, Some(message));
        }
        StepOutcome::Continue
    }

    /// Mark a sub-step and its parent as failed; the run continues.
    fn fail_step(&mut self, step: StepId, sub: &str, err: FacadeError) -> StepOutcome {
        let message = err.to_string();
        self.ledger
            .update_sub_step(step, sub, Status::Error, Some(message.clone()));
        self.ledger
            .update_step(step, Status::Error, None, Some(message));
        StepOutcome::Continue
    }

    /// Mark a sub-step and its parent as failed and abort the sequence.
    fn abort_step(&mut self, step: StepId, sub: &str, message: String) -> StepOutcome {
        self.ledger
            .update_sub_step(step, sub, Status::Error, Some(message.clone()));
        self.ledger
            .update_step(step, Status::Error, None, Some(message.clone()));
        StepOutcome::Abort { message }
    }

    /// Mark a step that depends on analysis output as skipped-with-error.
    fn skip_dependent(&mut self, step: StepId) -> StepOutcome {
        self.ledger.update_step(
            step,
            Status::Error,
            None,
            Some("skipped due to analysis error".to_string()),
        );
        StepOutcome::Continue
    }

    /// Push every still-pending probe to error with the given message.
    fn fail_probes(&mut self, providers: &[Provider], message: &str) {
        for provider in providers {
            self.ledger.update_probe(
                provider.key(),
                ProbeStatus::Error,
                None,
                None,
                Some(message.to_string()),
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::mock::MockFacade;
    use crate::facade::{AnalysisResponse, GateStatus};
    use crate::ledger::Status;
    use serde_json::json;
    use tempfile::tempdir;

    fn runner_with(mock: MockFacade) -> (FlowRunner, Arc<MockFacade>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let facade = Arc::new(mock);
        let runner = FlowRunner::new(
            facade.clone(),
            RunRecorder::new(dir.path().join("runs.json")),
        );
        (runner, facade, dir)
    }

    fn status_of(runner: &FlowRunner, id: StepId) -> Status {
        runner.ledger().step(id).status
    }

    #[tokio::test]
    async fn empty_competitor_makes_zero_remote_calls() {
        let (mut runner, facade, _dir) = runner_with(MockFacade::happy());
        for name in ["", "   ", "\t\n"] {
            let err = runner.run(name, &[], None).await.unwrap_err();
            assert!(matches!(err, FlowError::EmptyCompetitor));
        }
        assert_eq!(facade.call_count(), 0);
    }

    #[tokio::test]
    async fn happy_path_all_steps_succeed() {
        let (mut runner, facade, _dir) = runner_with(MockFacade::happy());
        let outcome = runner
            .run("Microsoft", &["openai".into()], None)
            .await
            .unwrap();

        assert!(outcome.record.overall_success);
        assert!(outcome.recorder_warning.is_none());
        for id in StepId::ALL {
            assert_eq!(status_of(&runner, id), Status::Success, "step {id}");
        }
        // The record landed in both stores.
        assert_eq!(facade.runs.lock().unwrap().len(), 1);
        assert!(facade.called("insert_run"));
    }

    #[tokio::test]
    async fn auth_failure_aborts_everything() {
        let mut mock = MockFacade::happy();
        mock.session = Err(FacadeError::NoSession);
        let (mut runner, facade, _dir) = runner_with(mock);
        let outcome = runner.run("Microsoft", &[], None).await.unwrap();

        assert!(!outcome.record.overall_success);
        assert_eq!(status_of(&runner, StepId::Auth), Status::Error);
        for id in StepId::ALL.into_iter().skip(1) {
            assert_eq!(status_of(&runner, id), Status::Idle, "step {id}");
        }
        assert_eq!(
            outcome.record.top_level_error.as_ref().unwrap()["step"],
            json!("auth")
        );
        // Only the session call went out before the abort (plus the
        // history write at the end).
        assert!(!facade.called("check_keys"));
        assert!(!facade.called("gate_check"));
    }

    #[tokio::test]
    async fn gate_lock_with_failed_unlock_aborts_remaining_steps() {
        let mut mock = MockFacade::happy();
        mock.gate_check = Ok(GateStatus {
            can_proceed: Some(false),
            reasons: Some(vec!["quota exhausted".into()]),
            ..Default::default()
        });
        mock.gate_unlock = Ok(GateStatus {
            unlocked: Some(false),
            ..Default::default()
        });
        let (mut runner, facade, _dir) = runner_with(mock);
        let outcome = runner.run("Microsoft", &[], None).await.unwrap();

        assert!(!outcome.record.overall_success);
        assert_eq!(status_of(&runner, StepId::Gate), Status::Error);
        for id in [
            StepId::Database,
            StepId::Progress,
            StepId::Analysis,
            StepId::Aggregate,
            StepId::Storage,
        ] {
            assert_eq!(status_of(&runner, id), Status::Idle, "step {id}");
        }
        assert!(facade.called("gate_unlock"));
        assert!(!facade.called("insert_progress"));
        assert!(!facade.called("start_analysis"));
        assert!(!facade.called("latest_analysis"));
        let error = outcome.record.top_level_error.unwrap();
        assert_eq!(error["step"], json!("gate"));
        assert!(error["message"].as_str().unwrap().contains("quota exhausted"));
    }

    #[tokio::test]
    async fn gate_lock_with_successful_unlock_continues() {
        let mut mock = MockFacade::happy();
        mock.gate_check = Ok(GateStatus {
            can_proceed: Some(false),
            ..Default::default()
        });
        let (mut runner, facade, _dir) = runner_with(mock);
        let outcome = runner.run("Microsoft", &[], None).await.unwrap();

        assert!(outcome.record.overall_success);
        assert!(facade.called("gate_unlock"));
        assert_eq!(status_of(&runner, StepId::Gate), Status::Success);
    }

    #[tokio::test]
    async fn empty_analysis_results_fail_analysis_and_skip_dependents() {
        let mut mock = MockFacade::happy();
        mock.analysis = Ok(AnalysisResponse {
            success: true,
            results: Some(json!([])),
        });
        let (mut runner, _facade, _dir) = runner_with(mock);
        let outcome = runner.run("Microsoft", &[], None).await.unwrap();

        assert!(!outcome.record.overall_success);
        let analysis = runner.ledger().step(StepId::Analysis);
        assert_eq!(analysis.status, Status::Error);
        assert_eq!(
            analysis.error_message.as_deref(),
            Some("AI pipeline returned no results")
        );
        assert_eq!(
            runner.ledger().step(StepId::Aggregate).error_message.as_deref(),
            Some("skipped due to analysis error")
        );
        assert_eq!(status_of(&runner, StepId::Aggregate), Status::Error);
        assert_eq!(status_of(&runner, StepId::Orchestration), Status::Error);
    }

    #[tokio::test]
    async fn analysis_network_error_still_attempts_storage() {
        let mut mock = MockFacade::happy();
        mock.analysis = Err(FacadeError::Transport("connection reset".into()));
        let (mut runner, facade, _dir) = runner_with(mock);
        let outcome = runner.run("Microsoft", &[], None).await.unwrap();

        assert!(!outcome.record.overall_success);
        assert_eq!(status_of(&runner, StepId::Analysis), Status::Error);
        assert_eq!(status_of(&runner, StepId::Aggregate), Status::Error);
        // Storage runs independently and can still succeed from a prior row.
        assert!(facade.called("latest_analysis"));
        assert_eq!(status_of(&runner, StepId::Storage), Status::Success);
        // Surface renders the readback.
        assert_eq!(status_of(&runner, StepId::Surface), Status::Success);
        // All probes ended in error.
        assert!(
            runner
                .ledger()
                .probes()
                .iter()
                .all(|p| p.status == ProbeStatus::Error)
        );
    }

    #[tokio::test]
    async fn profile_link_failure_downgrades_storage_to_warning() {
        let mut mock = MockFacade::happy();
        mock.link = Err(FacadeError::Status {
            status: 409,
            message: "conflict".into(),
        });
        let (mut runner, _facade, _dir) = runner_with(mock);
        let outcome = runner.run("Microsoft", &[], None).await.unwrap();

        assert_eq!(status_of(&runner, StepId::Storage), Status::Warning);
        // The open-question strictness: a warning anywhere fails the run.
        assert!(!outcome.record.overall_success);
    }

    #[tokio::test]
    async fn empty_persisted_payload_is_warning_not_error() {
        let mut mock = MockFacade::happy();
        if let Ok(Some(row)) = &mut mock.latest {
            row.analysis_data = Some(json!({}));
        }
        let (mut runner, facade, _dir) = runner_with(mock);
        runner.run("Microsoft", &[], None).await.unwrap();

        assert_eq!(status_of(&runner, StepId::Storage), Status::Warning);
        // Profile linking is never attempted without a readable payload.
        assert!(!facade.called("upsert_profile"));
    }

    #[tokio::test]
    async fn missing_persisted_row_is_error() {
        let mut mock = MockFacade::happy();
        mock.latest = Ok(None);
        let (mut runner, _facade, _dir) = runner_with(mock);
        runner.run("Microsoft", &[], None).await.unwrap();
        assert_eq!(status_of(&runner, StepId::Storage), Status::Error);
    }

    #[tokio::test]
    async fn non_fatal_step_failure_does_not_stop_the_run() {
        let mut mock = MockFacade::happy();
        mock.progress = Err(FacadeError::Status {
            status: 500,
            message: "insert failed".into(),
        });
        let (mut runner, facade, _dir) = runner_with(mock);
        let outcome = runner.run("Microsoft", &[], None).await.unwrap();

        assert_eq!(status_of(&runner, StepId::Progress), Status::Error);
        assert_eq!(status_of(&runner, StepId::Analysis), Status::Success);
        assert!(facade.called("start_analysis"));
        assert!(!outcome.record.overall_success);
    }

    #[tokio::test]
    async fn remote_recorder_failure_is_a_warning_not_an_error() {
        let mut mock = MockFacade::happy();
        mock.insert_run_result = Err(FacadeError::Transport("history table down".into()));
        let (mut runner, _facade, dir) = runner_with(mock);
        let outcome = runner.run("Microsoft", &[], None).await.unwrap();

        assert!(outcome.record.overall_success);
        assert!(outcome.recorder_warning.is_some());
        // The local ring buffer still captured the run.
        let recorder = RunRecorder::new(dir.path().join("runs.json"));
        assert_eq!(recorder.load_local().len(), 1);
    }

    #[tokio::test]
    async fn run_resets_state_between_runs() {
        let mut mock = MockFacade::happy();
        mock.analysis = Err(FacadeError::Transport("down".into()));
        let (mut runner, _facade, _dir) = runner_with(mock);
        runner.run("Microsoft", &[], None).await.unwrap();
        assert_eq!(status_of(&runner, StepId::Analysis), Status::Error);

        // Second run: the error from the first must not leak into the
        // freshly reset ledger even before steps complete.
        let outcome = runner.run("Google", &[], None).await.unwrap();
        let analysis = outcome
            .record
            .steps
            .iter()
            .find(|s| s.id == "analysis")
            .unwrap();
        assert_eq!(
            analysis.error_message.as_deref(),
            Some("transport error: down")
        );
        assert_eq!(outcome.record.competitor_name, "Google");
    }

    #[tokio::test]
    async fn keyed_results_resolve_matching_probes() {
        let mut mock = MockFacade::happy();
        mock.analysis = Ok(AnalysisResponse {
            success: true,
            results: Some(json!({
                "openai": {"strengths": ["a"], "tokens_used": 11},
                "anthropic": {"error": "rate limited"},
            })),
        });
        let (mut runner, _facade, _dir) = runner_with(mock);
        runner
            .run("Microsoft", &["openai".into(), "anthropic".into()], None)
            .await
            .unwrap();

        let probes = runner.ledger().probes();
        let openai = probes.iter().find(|p| p.key == "openai").unwrap();
        let anthropic = probes.iter().find(|p| p.key == "anthropic").unwrap();
        assert_eq!(openai.status, ProbeStatus::Success);
        assert_eq!(openai.tokens_used, Some(11));
        assert_eq!(anthropic.status, ProbeStatus::Error);
        assert_eq!(anthropic.error_message.as_deref(), Some("rate limited"));
    }

    #[tokio::test]
    async fn single_unattributed_result_covers_all_probes() {
        let mut mock = MockFacade::happy();
        mock.analysis = Ok(AnalysisResponse {
            success: true,
            results: Some(json!({"strengths": ["x"], "weaknesses": ["y"]})),
        });
        let (mut runner, _facade, _dir) = runner_with(mock);
        runner.run("Microsoft", &[], None).await.unwrap();

        assert!(
            runner
                .ledger()
                .probes()
                .iter()
                .all(|p| p.status == ProbeStatus::Success)
        );
    }

    #[tokio::test]
    async fn record_snapshot_matches_ledger() {
        let (mut runner, _facade, _dir) = runner_with(MockFacade::happy());
        let outcome = runner
            .run("Microsoft", &[], Some("focus on cloud".into()))
            .await
            .unwrap();

        assert_eq!(outcome.record.steps.len(), 12);
        assert_eq!(outcome.record.prompt_text.as_deref(), Some("focus on cloud"));
        assert_eq!(outcome.record.providers.len(), Provider::ALL.len());
        assert!(outcome.record.timestamp <= chrono::Utc::now());
    }
}
