//! Diagnostics over a ledger and run history.
//!
//! Everything here is a pure transform: no remote calls, no mutation. The
//! structured report is total — it never panics and never fails to produce
//! a value, degrading to a minimal `{"message": ...}` object if anything
//! inside cannot be serialized.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};

use crate::ledger::{FlowLedger, Status};
use crate::providers::Provider;
use crate::recorder::RunRecord;

/// Severity of one friendly-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One human-readable issue line.
#[derive(Debug, Clone, Serialize)]
pub struct FriendlyIssue {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub severity: Severity,
}

/// Static remediation hints appended to every structured report.
const REMEDIATION_HINTS: &[&str] = &[
    "Verify you are signed in and your session has not expired",
    "Check that at least one provider API key is configured and working",
    "If the feature gate is locked, unlock it from the account settings",
    "Re-run the flow test after fixing the first failing step; later steps often fail as a consequence",
    "Use the fix-it prompt output with an external assistant for step-specific guidance",
];

/// One entry per step or sub-step that ended in error or warning. When the
/// ledger has no issues the list contains exactly one synthetic "no issues"
/// entry — never an empty list, so callers always have something to render.
pub fn friendly_error_list(ledger: &FlowLedger) -> Vec<FriendlyIssue> {
    let mut issues = Vec::new();
    for step in ledger.steps() {
        match step.status {
            Status::Error | Status::Warning => issues.push(FriendlyIssue {
                title: format!("{} failed", step.name),
                detail: step.error_message.clone(),
                severity: severity_of(step.status),
            }),
            _ => {}
        }
        for sub in &step.sub_steps {
            if matches!(sub.status, Status::Error | Status::Warning) {
                issues.push(FriendlyIssue {
                    title: format!("{}: {}", step.name, sub.name),
                    detail: sub.message.clone(),
                    severity: severity_of(sub.status),
                });
            }
        }
    }
    if issues.is_empty() {
        issues.push(FriendlyIssue {
            title: "No issues detected".to_string(),
            detail: Some("Every step completed successfully".to_string()),
            severity: Severity::Info,
        });
    }
    issues
}

fn severity_of(status: Status) -> Severity {
    match status {
        Status::Warning => Severity::Warning,
        _ => Severity::Error,
    }
}

/// One serializable object bundling everything a human or agent needs to
/// debug a failed run. Cannot fail: every sub-value is built through
/// [`safe_value`], and `serde_json::Value` trees are acyclic by
/// construction.
pub fn structured_error_report(
    ledger: &FlowLedger,
    selections: &[Provider],
    history: &[RunRecord],
) -> Value {
    let (successes, warnings, errors) = ledger.tally();
    let failed_steps: Vec<Value> = ledger
        .steps()
        .iter()
        .filter(|s| matches!(s.status, Status::Error | Status::Warning))
        .map(|step| {
            json!({
                "id": step.id.as_str(),
                "name": step.name,
                "status": safe_value(&step.status),
                "error": step.error_message,
                "sub_steps": step
                    .sub_steps
                    .iter()
                    .map(|sub| json!({
                        "id": sub.id,
                        "status": safe_value(&sub.status),
                        "message": sub.message,
                    }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    let last_error = history
        .iter()
        .find_map(|record| record.top_level_error.clone());

    json!({
        "generated_at": Utc::now().to_rfc3339(),
        "invocation": {
            "providers": selections.iter().map(|p| p.key()).collect::<Vec<_>>(),
        },
        "summary": {
            "successes": successes,
            "warnings": warnings,
            "errors": errors,
        },
        "failed_steps": failed_steps,
        "providers": safe_value(&ledger.probes()),
        "last_top_level_error": last_error,
        "hints": REMEDIATION_HINTS,
    })
}

/// Serialize a value, degrading to `{"message": ...}` instead of failing.
fn safe_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| json!({ "message": err.to_string() }))
}

/// A paste-into-an-assistant prompt: a fixed instruction template followed
/// by a JSON dump of only the failing steps and top-level errors from the
/// supplied history. Pure string formatting.
pub fn ai_fix_prompt(history: &[RunRecord]) -> String {
    let failures: Vec<Value> = history
        .iter()
        .map(|record| {
            json!({
                "timestamp": record.timestamp.to_rfc3339(),
                "competitor": record.competitor_name,
                "overall_success": record.overall_success,
                "top_level_error": record.top_level_error,
                "failed_steps": record
                    .failed_steps()
                    .iter()
                    .map(|s| json!({
                        "id": s.id,
                        "name": s.name,
                        "status": safe_value(&s.status),
                        "error": s.error_message,
                    }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    let dump = serde_json::to_string_pretty(&failures)
        .unwrap_or_else(|err| format!("{{\"message\": \"{err}\"}}"));

    format!(
        r#"I ran an end-to-end flow test against my analysis backend and some steps failed.
Each run below lists only the failing steps with their error messages, newest first.
Explain the most likely root cause and the concrete fix for the earliest failing step.

{dump}"#
    )
}
