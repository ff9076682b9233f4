//! The fixed step vocabulary for a flow test.
//!
//! Both the ledger and the runner consult this registry, so the step order,
//! display names, and sub-step ids live in exactly one place.

use serde::{Deserialize, Serialize};

/// One stage of the flow-test sequence. The set is closed: a run always
/// consists of exactly these twelve steps, in [`StepId::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepId {
    Auth,
    ApiKeys,
    Encryption,
    Gate,
    Database,
    Realtime,
    Progress,
    Analysis,
    Orchestration,
    Aggregate,
    Storage,
    Surface,
}

/// Static definition of one sub-step within a step.
#[derive(Debug, Clone, Copy)]
pub struct SubStepSpec {
    pub id: &'static str,
    pub name: &'static str,
}

impl StepId {
    /// All steps in execution order.
    pub const ALL: [StepId; 12] = [
        StepId::Auth,
        StepId::ApiKeys,
        StepId::Encryption,
        StepId::Gate,
        StepId::Database,
        StepId::Realtime,
        StepId::Progress,
        StepId::Analysis,
        StepId::Orchestration,
        StepId::Aggregate,
        StepId::Storage,
        StepId::Surface,
    ];

    /// Stable string id, used in snapshots and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Auth => "auth",
            StepId::ApiKeys => "apikeys",
            StepId::Encryption => "encryption",
            StepId::Gate => "gate",
            StepId::Database => "database",
            StepId::Realtime => "realtime",
            StepId::Progress => "progress",
            StepId::Analysis => "analysis",
            StepId::Orchestration => "orchestration",
            StepId::Aggregate => "aggregate",
            StepId::Storage => "storage",
            StepId::Surface => "surface",
        }
    }

    /// Human-readable display name.
    pub fn name(&self) -> &'static str {
        match self {
            StepId::Auth => "Session & user",
            StepId::ApiKeys => "API key health",
            StepId::Encryption => "Key encryption",
            StepId::Gate => "Feature gate",
            StepId::Database => "Database connectivity",
            StepId::Realtime => "Realtime channel",
            StepId::Progress => "Progress tracking",
            StepId::Analysis => "AI analysis",
            StepId::Orchestration => "Provider orchestration",
            StepId::Aggregate => "Result aggregation",
            StepId::Storage => "Storage verification",
            StepId::Surface => "Result surface",
        }
    }

    /// Ordered sub-steps for this step.
    pub fn sub_steps(&self) -> &'static [SubStepSpec] {
        match self {
            StepId::Auth => &[
                SubStepSpec { id: "session", name: "Fetch session" },
                SubStepSpec { id: "identity", name: "Resolve user" },
            ],
            StepId::ApiKeys => &[
                SubStepSpec { id: "invoke", name: "Call key check" },
                SubStepSpec { id: "evaluate", name: "Evaluate key health" },
            ],
            StepId::Encryption => &[
                SubStepSpec { id: "status", name: "Server-side encryption" },
            ],
            StepId::Gate => &[
                SubStepSpec { id: "check", name: "Gate check" },
                SubStepSpec { id: "unlock", name: "Gate unlock" },
            ],
            StepId::Database => &[
                SubStepSpec { id: "read", name: "Read run history head" },
            ],
            StepId::Realtime => &[
                SubStepSpec { id: "channel", name: "Channel probe" },
            ],
            StepId::Progress => &[
                SubStepSpec { id: "insert", name: "Insert progress row" },
            ],
            StepId::Analysis => &[
                SubStepSpec { id: "dispatch", name: "Dispatch analysis" },
                SubStepSpec { id: "results", name: "Validate results" },
            ],
            StepId::Orchestration => &[
                SubStepSpec { id: "normalize", name: "Normalize payload" },
                SubStepSpec { id: "probes", name: "Resolve provider probes" },
            ],
            StepId::Aggregate => &[
                SubStepSpec { id: "merge", name: "Merge provider results" },
            ],
            StepId::Storage => &[
                SubStepSpec { id: "readback", name: "Read persisted analysis" },
                SubStepSpec { id: "profile", name: "Upsert and link profile" },
            ],
            StepId::Surface => &[
                SubStepSpec { id: "render", name: "Render view model" },
            ],
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
