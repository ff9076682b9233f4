//! Scripted facade for orchestrator and recorder tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::errors::FacadeError;
use crate::recorder::RunRecord;

use super::{
    AnalysisRequest, AnalysisResponse, AnalysisRow, GateAction, GateStatus, KeyCheck,
    ProfileUpsert, ProgressInsert, ServiceFacade, Session,
};

/// A facade whose every response is configured up front. Each call is
/// appended to `calls` so tests can assert exactly what was (not) invoked.
pub struct MockFacade {
    pub calls: Mutex<Vec<String>>,
    pub session: Result<Session, FacadeError>,
    pub keys: Result<KeyCheck, FacadeError>,
    pub gate_check: Result<GateStatus, FacadeError>,
    pub gate_unlock: Result<GateStatus, FacadeError>,
    pub realtime: Result<(), FacadeError>,
    pub progress: Result<(), FacadeError>,
    pub analysis: Result<AnalysisResponse, FacadeError>,
    pub latest: Result<Option<AnalysisRow>, FacadeError>,
    pub upsert: Result<String, FacadeError>,
    pub link: Result<(), FacadeError>,
    pub insert_run_result: Result<(), FacadeError>,
    /// Remote run store, newest first. Inserts cap it at five, matching the
    /// server-side retention rule.
    pub runs: Mutex<Vec<RunRecord>>,
}

impl MockFacade {
    /// A facade where every step of the happy path succeeds.
    pub fn happy() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            session: Ok(Session {
                user_id: "user-1".into(),
            }),
            keys: Ok(KeyCheck {
                working_keys: 4,
                total_keys: 4,
                per_provider_status: None,
            }),
            gate_check: Ok(GateStatus {
                can_proceed: Some(true),
                ..Default::default()
            }),
            gate_unlock: Ok(GateStatus {
                unlocked: Some(true),
                ..Default::default()
            }),
            realtime: Ok(()),
            progress: Ok(()),
            analysis: Ok(AnalysisResponse {
                success: true,
                results: Some(json!([{
                    "provider": "openai",
                    "strengths": ["brand", "cloud"],
                    "weaknesses": ["pricing"],
                    "tokens_used": 321,
                    "cost_usd": 0.04,
                }])),
            }),
            latest: Ok(Some(AnalysisRow {
                id: "row-1".into(),
                user_id: "user-1".into(),
                competitor_name: "Microsoft".into(),
                analysis_data: Some(json!({"strengths": ["brand"]})),
            })),
            upsert: Ok("profile-1".into()),
            link: Ok(()),
            insert_run_result: Ok(()),
            runs: Mutex::new(Vec::new()),
        }
    }

    fn note(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn called(&self, name: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == name)
    }
}

#[async_trait]
impl ServiceFacade for MockFacade {
    async fn session(&self) -> Result<Session, FacadeError> {
        self.note("session");
        self.session.clone()
    }

    async fn check_keys(&self) -> Result<KeyCheck, FacadeError> {
        self.note("check_keys");
        self.keys.clone()
    }

    async fn gate(&self, action: GateAction) -> Result<GateStatus, FacadeError> {
        match action {
            GateAction::Check => {
                self.note("gate_check");
                self.gate_check.clone()
            }
            GateAction::Unlock => {
                self.note("gate_unlock");
                self.gate_unlock.clone()
            }
        }
    }

    async fn realtime_probe(&self) -> Result<(), FacadeError> {
        self.note("realtime_probe");
        self.realtime.clone()
    }

    async fn insert_progress(&self, _req: &ProgressInsert) -> Result<(), FacadeError> {
        self.note("insert_progress");
        self.progress.clone()
    }

    async fn start_analysis(&self, _req: &AnalysisRequest) -> Result<AnalysisResponse, FacadeError> {
        self.note("start_analysis");
        self.analysis.clone()
    }

    async fn latest_analysis(
        &self,
        _user_id: &str,
        _competitor: &str,
    ) -> Result<Option<AnalysisRow>, FacadeError> {
        self.note("latest_analysis");
        self.latest.clone()
    }

    async fn upsert_profile(&self, _req: &ProfileUpsert) -> Result<String, FacadeError> {
        self.note("upsert_profile");
        self.upsert.clone()
    }

    async fn link_profile(&self, _analysis_id: &str, _profile_id: &str) -> Result<(), FacadeError> {
        self.note("link_profile");
        self.link.clone()
    }

    async fn insert_run(&self, record: &RunRecord) -> Result<(), FacadeError> {
        self.note("insert_run");
        self.insert_run_result.clone()?;
        let mut runs = self.runs.lock().unwrap();
        runs.insert(0, record.clone());
        runs.truncate(5);
        Ok(())
    }

    async fn recent_runs(
        &self,
        _user_id: &str,
        limit: usize,
    ) -> Result<Vec<RunRecord>, FacadeError> {
        self.note("recent_runs");
        let runs = self.runs.lock().unwrap();
        Ok(runs.iter().take(limit.min(5)).cloned().collect())
    }
}
