//! Live step ledger for one flow-test run.
//!
//! The ledger is the single in-memory source of truth for step, sub-step,
//! and provider-probe state. The orchestrator is its only writer during a
//! run; every mutation is forwarded to an optional observer (the CLI UI) as
//! it happens, with no batching.
//!
//! Unknown ids are a programming error: the vocabulary in
//! [`crate::registry`] is exhaustive. Step ids are an enum and cannot be
//! unknown; an unknown sub-step id or probe key panics rather than silently
//! dropping the write.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::providers::Provider;
use crate::registry::StepId;

/// Status of a step or sub-step. Forward-only within one run:
/// idle → running → {success, warning, error}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Running,
    Success,
    Warning,
    Error,
}

/// Status of a provider probe. Probes have no warning state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Idle,
    Running,
    Success,
    Error,
}

/// A finer-grained unit of work within a step.
#[derive(Debug, Clone)]
pub struct SubStep {
    pub id: &'static str,
    pub name: &'static str,
    pub status: Status,
    pub message: Option<String>,
}

/// One named stage of the flow-test sequence.
#[derive(Debug, Clone)]
pub struct Step {
    pub id: StepId,
    pub name: &'static str,
    pub status: Status,
    pub error_message: Option<String>,
    pub payload: Option<Value>,
    pub sub_steps: Vec<SubStep>,
}

impl Step {
    fn from_registry(id: StepId) -> Self {
        Self {
            id,
            name: id.name(),
            status: Status::Idle,
            error_message: None,
            payload: None,
            sub_steps: id
                .sub_steps()
                .iter()
                .map(|spec| SubStep {
                    id: spec.id,
                    name: spec.name,
                    status: Status::Idle,
                    message: None,
                })
                .collect(),
        }
    }
}

/// Live state of one provider's slice of the analysis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProbe {
    pub key: String,
    pub status: ProbeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_summary: Option<Value>,
}

impl ProviderProbe {
    fn idle(provider: Provider) -> Self {
        Self {
            key: provider.key().to_string(),
            status: ProbeStatus::Idle,
            tokens_used: None,
            cost_usd: None,
            error_message: None,
            response_summary: None,
        }
    }
}

/// Receives every ledger mutation as it happens.
pub trait LedgerObserver: Send + Sync {
    fn step_changed(&self, step: &Step);
    fn sub_step_changed(&self, step: &Step, sub: &SubStep);
    fn probe_changed(&self, probe: &ProviderProbe);
}

/// Ordered collection of the twelve steps plus the provider probes for the
/// current run.
pub struct FlowLedger {
    steps: Vec<Step>,
    probes: Vec<ProviderProbe>,
    observer: Option<Arc<dyn LedgerObserver>>,
}

impl Default for FlowLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowLedger {
    pub fn new() -> Self {
        Self {
            steps: StepId::ALL.iter().map(|id| Step::from_registry(*id)).collect(),
            probes: Vec::new(),
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Arc<dyn LedgerObserver>) {
        self.observer = Some(observer);
    }

    /// Reset every step to idle and rebuild the probe list for the given
    /// provider selection. Called once at the start of each run so nothing
    /// leaks from the previous run.
    pub fn reset(&mut self, providers: &[Provider]) {
        self.steps = StepId::ALL.iter().map(|id| Step::from_registry(*id)).collect();
        self.probes = providers.iter().map(|p| ProviderProbe::idle(*p)).collect();
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn probes(&self) -> &[ProviderProbe] {
        &self.probes
    }

    pub fn step(&self, id: StepId) -> &Step {
        // Steps are laid out in registry order, so id-to-slot is direct.
        &self.steps[id as usize]
    }

    /// Update a step's status, optionally attaching a result payload or an
    /// error message.
    pub fn update_step(
        &mut self,
        id: StepId,
        status: Status,
        payload: Option<Value>,
        error: Option<String>,
    ) {
        let step = &mut self.steps[id as usize];
        debug_assert_eq!(step.id, id);
        step.status = status;
        if payload.is_some() {
            step.payload = payload;
        }
        if error.is_some() {
            step.error_message = error;
        }
        let snapshot = step.clone();
        if let Some(observer) = &self.observer {
            observer.step_changed(&snapshot);
        }
    }

    /// Update a sub-step's status. Panics on an unknown sub-step id.
    pub fn update_sub_step(
        &mut self,
        step_id: StepId,
        sub_id: &str,
        status: Status,
        message: Option<String>,
    ) {
        let step = &mut self.steps[step_id as usize];
        debug_assert_eq!(step.id, step_id);
        let sub = step
            .sub_steps
            .iter_mut()
            .find(|s| s.id == sub_id)
            .unwrap_or_else(|| panic!("unknown sub-step id '{step_id}.{sub_id}'"));
        sub.status = status;
        if message.is_some() {
            sub.message = message;
        }
        let sub_snapshot = sub.clone();
        let step_snapshot = step.clone();
        if let Some(observer) = &self.observer {
            observer.sub_step_changed(&step_snapshot, &sub_snapshot);
        }
    }

    /// Update one provider probe by canonical key. Panics on an unknown key;
    /// the probe list is fixed at reset time.
    pub fn update_probe(
        &mut self,
        key: &str,
        status: ProbeStatus,
        tokens_used: Option<u64>,
        cost_usd: Option<f64>,
        error: Option<String>,
        summary: Option<Value>,
    ) {
        let probe = self
            .probes
            .iter_mut()
            .find(|p| p.key == key)
            .unwrap_or_else(|| panic!("unknown provider probe '{key}'"));
        probe.status = status;
        if tokens_used.is_some() {
            probe.tokens_used = tokens_used;
        }
        if cost_usd.is_some() {
            probe.cost_usd = cost_usd;
        }
        if error.is_some() {
            probe.error_message = error;
        }
        if summary.is_some() {
            probe.response_summary = summary;
        }
        let snapshot = probe.clone();
        if let Some(observer) = &self.observer {
            observer.probe_changed(&snapshot);
        }
    }

    /// Count of steps in each terminal state plus running/idle, in the order
    /// (success, warning, error).
    pub fn tally(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for step in &self.steps {
            match step.status {
                Status::Success => counts.0 += 1,
                Status::Warning => counts.1 += 1,
                Status::Error => counts.2 += 1,
                _ => {}
            }
        }
        counts
    }

    /// True iff every step finished exactly `success`. A warning anywhere
    /// makes the run non-successful.
    pub fn all_success(&self) -> bool {
        self.steps.iter().all(|s| s.status == Status::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn new_ledger_has_all_steps_idle() {
        let ledger = FlowLedger::new();
        assert_eq!(ledger.steps().len(), 12);
        assert!(ledger.steps().iter().all(|s| s.status == Status::Idle));
        assert!(ledger.probes().is_empty());
    }

    #[test]
    fn update_step_attaches_payload_and_error() {
        let mut ledger = FlowLedger::new();
        ledger.update_step(
            StepId::Gate,
            Status::Error,
            Some(serde_json::json!({"reasons": ["locked"]})),
            Some("gate locked".into()),
        );
        let step = ledger.step(StepId::Gate);
        assert_eq!(step.status, Status::Error);
        assert_eq!(step.error_message.as_deref(), Some("gate locked"));
        assert!(step.payload.is_some());
    }

    #[test]
    fn update_sub_step_targets_the_right_child() {
        let mut ledger = FlowLedger::new();
        ledger.update_sub_step(StepId::Analysis, "dispatch", Status::Running, None);
        let step = ledger.step(StepId::Analysis);
        assert_eq!(step.sub_steps[0].status, Status::Running);
        assert_eq!(step.sub_steps[1].status, Status::Idle);
    }

    #[test]
    #[should_panic(expected = "unknown sub-step id")]
    fn unknown_sub_step_id_panics() {
        let mut ledger = FlowLedger::new();
        ledger.update_sub_step(StepId::Auth, "nope", Status::Running, None);
    }

    #[test]
    #[should_panic(expected = "unknown provider probe")]
    fn unknown_probe_key_panics() {
        let mut ledger = FlowLedger::new();
        ledger.reset(&[Provider::OpenAi]);
        ledger.update_probe("mistral", ProbeStatus::Running, None, None, None, None);
    }

    #[test]
    fn reset_clears_previous_run_state() {
        let mut ledger = FlowLedger::new();
        ledger.update_step(StepId::Auth, Status::Error, None, Some("boom".into()));
        ledger.update_sub_step(StepId::Auth, "session", Status::Error, Some("boom".into()));
        ledger.reset(&[Provider::Anthropic]);

        let step = ledger.step(StepId::Auth);
        assert_eq!(step.status, Status::Idle);
        assert!(step.error_message.is_none());
        assert!(step.sub_steps.iter().all(|s| s.status == Status::Idle));
        assert_eq!(ledger.probes().len(), 1);
        assert_eq!(ledger.probes()[0].key, "anthropic");
        assert_eq!(ledger.probes()[0].status, ProbeStatus::Idle);
    }

    #[test]
    fn all_success_requires_exactly_success_everywhere() {
        let mut ledger = FlowLedger::new();
        for id in StepId::ALL {
            ledger.update_step(id, Status::Success, None, None);
        }
        assert!(ledger.all_success());

        ledger.update_step(StepId::Storage, Status::Warning, None, None);
        assert!(!ledger.all_success());
        assert_eq!(ledger.tally(), (11, 1, 0));
    }

    struct CountingObserver {
        events: Mutex<Vec<String>>,
    }

    impl LedgerObserver for CountingObserver {
        fn step_changed(&self, step: &Step) {
            self.events.lock().unwrap().push(format!("step:{}", step.id));
        }
        fn sub_step_changed(&self, step: &Step, sub: &SubStep) {
            self.events
                .lock()
                .unwrap()
                .push(format!("sub:{}.{}", step.id, sub.id));
        }
        fn probe_changed(&self, probe: &ProviderProbe) {
            self.events.lock().unwrap().push(format!("probe:{}", probe.key));
        }
    }

    #[test]
    fn observer_sees_every_update_immediately() {
        let observer = Arc::new(CountingObserver {
            events: Mutex::new(Vec::new()),
        });
        let mut ledger = FlowLedger::new();
        ledger.set_observer(observer.clone());
        ledger.reset(&[Provider::OpenAi]);

        ledger.update_step(StepId::Auth, Status::Running, None, None);
        ledger.update_sub_step(StepId::Auth, "session", Status::Success, None);
        ledger.update_probe("openai", ProbeStatus::Running, None, None, None, None);

        let events = observer.events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["step:auth", "sub:auth.session", "probe:openai"]
        );
    }
}
