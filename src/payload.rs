//! Normalization of the analysis pipeline's polymorphic result payload.
//!
//! The backend returns analysis results in one of three shapes depending on
//! which pipeline version produced them: a list of per-provider objects, a
//! map keyed by provider name, or a single flat object. The shape is decided
//! exactly once here, at the boundary; everything downstream consumes the
//! canonical [`ProviderResult`] list.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The three wire shapes an analysis payload can arrive in.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPayload {
    List(Vec<Value>),
    Keyed(Map<String, Value>),
    Single(Value),
}

impl AnalysisPayload {
    /// Classify a raw `results` value. Returns `None` for null, empty, or
    /// non-object/array values — the caller treats that as "pipeline
    /// returned no results".
    pub fn classify(value: Value) -> Option<AnalysisPayload> {
        match value {
            Value::Array(items) if !items.is_empty() => Some(AnalysisPayload::List(items)),
            Value::Object(map) if !map.is_empty() => {
                // A keyed map has only object values (one per provider);
                // anything else is a single flat result.
                if map.values().all(|v| v.is_object()) && !map.contains_key("strengths") {
                    Some(AnalysisPayload::Keyed(map))
                } else {
                    Some(AnalysisPayload::Single(Value::Object(map)))
                }
            }
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisPayload::List(_) => "list",
            AnalysisPayload::Keyed(_) => "keyed",
            AnalysisPayload::Single(_) => "single",
        }
    }

    /// Flatten into the canonical result list. One path per variant; no
    /// further shape probing happens after this point.
    pub fn normalize(self) -> Vec<ProviderResult> {
        match self {
            AnalysisPayload::List(items) => items
                .into_iter()
                .map(|item| {
                    let provider = extract_provider_key(&item);
                    ProviderResult::from_value(provider, item)
                })
                .collect(),
            AnalysisPayload::Keyed(map) => map
                .into_iter()
                .map(|(key, item)| ProviderResult::from_value(Some(key.to_lowercase()), item))
                .collect(),
            AnalysisPayload::Single(item) => {
                let provider = extract_provider_key(&item);
                vec![ProviderResult::from_value(provider, item)]
            }
        }
    }
}

/// Canonical view of one provider's analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: Option<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub tokens_used: Option<u64>,
    pub cost_usd: Option<f64>,
    pub error: Option<String>,
    /// The raw result object, kept for storage readback and reports.
    pub raw: Value,
}

impl ProviderResult {
    fn from_value(provider: Option<String>, value: Value) -> Self {
        // Results either carry their fields at the top level or nest them
        // under an "analysis" object.
        let body = value.get("analysis").unwrap_or(&value);
        Self {
            provider,
            strengths: string_list(body.get("strengths")),
            weaknesses: string_list(body.get("weaknesses")),
            tokens_used: value
                .get("tokens_used")
                .or_else(|| value.get("tokensUsed"))
                .and_then(Value::as_u64),
            cost_usd: value
                .get("cost_usd")
                .or_else(|| value.get("costUsd"))
                .and_then(Value::as_f64),
            error: value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
            raw: value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strengths.is_empty() && self.weaknesses.is_empty() && self.error.is_none()
    }
}

fn extract_provider_key(value: &Value) -> Option<String> {
    ["provider", "provider_name", "name"]
        .iter()
        .find_map(|field| value.get(field))
        .and_then(Value::as_str)
        .map(|s| s.to_lowercase())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Aggregated view model over all provider results, rendered by the surface
/// step and attached to the aggregate step's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightSummary {
    pub competitor: String,
    pub providers_reporting: usize,
    pub total_strengths: usize,
    pub total_weaknesses: usize,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

impl InsightSummary {
    pub fn build(competitor: &str, results: &[ProviderResult]) -> Self {
        Self {
            competitor: competitor.to_string(),
            providers_reporting: results.iter().filter(|r| !r.is_empty()).count(),
            total_strengths: results.iter().map(|r| r.strengths.len()).sum(),
            total_weaknesses: results.iter().map(|r| r.weaknesses.len()).sum(),
            total_tokens: results.iter().filter_map(|r| r.tokens_used).sum(),
            total_cost_usd: results.iter().filter_map(|r| r.cost_usd).sum(),
        }
    }

    /// Whether there is anything worth rendering.
    pub fn has_content(&self) -> bool {
        self.total_strengths + self.total_weaknesses > 0
    }
}
