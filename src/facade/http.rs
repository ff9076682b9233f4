//! Production facade against the hosted backend.
//!
//! The backend exposes the usual managed-service surface: an auth endpoint,
//! REST access to tables, callable functions, and a realtime service. Every
//! request carries the project API key; table access additionally relies on
//! row-level authorization server-side.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::errors::FacadeError;
use crate::recorder::RunRecord;

use super::{
    AnalysisRequest, AnalysisResponse, AnalysisRow, GateAction, GateStatus, KeyCheck,
    ProfileUpsert, ProgressInsert, ServiceFacade, Session,
};

pub struct HttpFacade {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpFacade {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, name)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Run a request and decode the JSON body, mapping non-2xx responses to
    /// `FacadeError::Status` with the body text as the message.
    async fn send_json(&self, req: reqwest::RequestBuilder) -> Result<Value, FacadeError> {
        let response = self.authed(req).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FacadeError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| FacadeError::Malformed(e.to_string()))
    }

    fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, FacadeError> {
        serde_json::from_value(value).map_err(|e| FacadeError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ServiceFacade for HttpFacade {
    async fn session(&self) -> Result<Session, FacadeError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let body = self.send_json(self.client.get(url)).await?;
        let user_id = body
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(FacadeError::NoSession)?;
        Ok(Session { user_id })
    }

    async fn check_keys(&self) -> Result<KeyCheck, FacadeError> {
        let body = self
            .send_json(self.client.post(self.function_url("check-api-keys")).json(&json!({})))
            .await?;
        Self::decode(body)
    }

    async fn gate(&self, action: GateAction) -> Result<GateStatus, FacadeError> {
        let body = self
            .send_json(
                self.client
                    .post(self.function_url("feature-gate"))
                    .json(&json!({ "action": action })),
            )
            .await?;
        Self::decode(body)
    }

    async fn realtime_probe(&self) -> Result<(), FacadeError> {
        let url = format!("{}/realtime/v1/health", self.base_url);
        self.send_json(self.client.get(url)).await?;
        Ok(())
    }

    async fn insert_progress(&self, req: &ProgressInsert) -> Result<(), FacadeError> {
        self.send_json(self.client.post(self.rest_url("analysis_progress")).json(req))
            .await?;
        Ok(())
    }

    async fn start_analysis(&self, req: &AnalysisRequest) -> Result<AnalysisResponse, FacadeError> {
        let body = self
            .send_json(self.client.post(self.function_url("run-analysis")).json(req))
            .await?;
        Self::decode(body)
    }

    async fn latest_analysis(
        &self,
        user_id: &str,
        competitor: &str,
    ) -> Result<Option<AnalysisRow>, FacadeError> {
        let body = self
            .send_json(
                self.client
                    .get(self.rest_url("competitor_analyses"))
                    .query(&[
                        ("user_id", format!("eq.{user_id}")),
                        ("competitor_name", format!("ilike.{competitor}")),
                        ("order", "created_at.desc".to_string()),
                        ("limit", "1".to_string()),
                    ]),
            )
            .await?;
        let mut rows: Vec<AnalysisRow> = Self::decode(body)?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    async fn upsert_profile(&self, req: &ProfileUpsert) -> Result<String, FacadeError> {
        let body = self
            .send_json(
                self.client
                    .post(self.rest_url("company_profiles"))
                    .header("Prefer", "resolution=merge-duplicates,return=representation")
                    .json(req),
            )
            .await?;
        // REST inserts return the representation as a one-row array.
        body.get(0)
            .and_then(|row| row.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FacadeError::Malformed("profile upsert returned no id".into()))
    }

    async fn link_profile(&self, analysis_id: &str, profile_id: &str) -> Result<(), FacadeError> {
        self.send_json(
            self.client
                .post(self.rest_url("analysis_profile_links"))
                .json(&json!({ "analysis_id": analysis_id, "profile_id": profile_id })),
        )
        .await?;
        Ok(())
    }

    async fn insert_run(&self, record: &RunRecord) -> Result<(), FacadeError> {
        self.send_json(self.client.post(self.rest_url("flow_test_runs")).json(record))
            .await?;
        Ok(())
    }

    async fn recent_runs(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RunRecord>, FacadeError> {
        let body = self
            .send_json(
                self.client
                    .get(self.rest_url("flow_test_runs"))
                    .query(&[
                        ("user_id", format!("eq.{user_id}")),
                        ("order", "timestamp.desc".to_string()),
                        ("limit", limit.min(5).to_string()),
                    ]),
            )
            .await?;
        Self::decode(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let facade = HttpFacade::new("https://example.test/", "key");
        assert_eq!(
            facade.rest_url("flow_test_runs"),
            "https://example.test/rest/v1/flow_test_runs"
        );
        assert_eq!(
            facade.function_url("run-analysis"),
            "https://example.test/functions/v1/run-analysis"
        );
    }
}
