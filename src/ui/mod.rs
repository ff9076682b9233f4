//! Terminal UI for a live flow test, rendered via `indicatif`.
//!
//! One spinner line tracks the currently running step; settled steps and
//! sub-steps are printed above it as they reach a terminal state, so the
//! ledger's no-batching contract is visible on screen: every update appears
//! the moment it happens.

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::ledger::{LedgerObserver, ProbeStatus, ProviderProbe, Status, Step, SubStep};
use crate::recorder::RunRecord;
use crate::registry::StepId;

pub struct FlowUi {
    multi: MultiProgress,
    spinner: ProgressBar,
    verbose: bool,
}

impl FlowUi {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();
        let spinner_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");
        let spinner = multi.add(ProgressBar::new_spinner());
        spinner.set_style(spinner_style);
        spinner.set_prefix("Step");
        spinner.enable_steady_tick(Duration::from_millis(100));
        Self {
            multi,
            spinner,
            verbose,
        }
    }

    /// Print a line above the spinner, falling back to `eprintln!` if the
    /// rich UI fails so step results are never silently lost.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn status_mark(status: Status) -> String {
        match status {
            Status::Idle => style("·").dim().to_string(),
            Status::Running => style("…").cyan().to_string(),
            Status::Success => style("✓").green().to_string(),
            Status::Warning => style("!").yellow().to_string(),
            Status::Error => style("✗").red().to_string(),
        }
    }

    /// Final summary line plus the per-step breakdown.
    pub fn print_summary(&self, record: &RunRecord) {
        self.spinner.finish_and_clear();
        let passed = record
            .steps
            .iter()
            .filter(|s| s.status == Status::Success)
            .count();
        let total = StepId::ALL.len();
        let verdict = if record.overall_success {
            style(format!("{passed}/{total} steps passed")).green().bold()
        } else {
            style(format!("{passed}/{total} steps passed")).red().bold()
        };
        println!("\n{} {} — {}", verdict, style("for").dim(), record.competitor_name);

        for step in &record.steps {
            let mark = Self::status_mark(step.status);
            match &step.error_message {
                Some(error) => println!("  {mark} {} — {}", step.name, style(error).dim()),
                None => println!("  {mark} {}", step.name),
            }
        }
    }

    pub fn print_recorder_warning(&self, warning: &str) {
        self.print_line(format!(
            "  {} run saved locally, but {}",
            style("note:").yellow(),
            warning
        ));
    }
}

impl LedgerObserver for FlowUi {
    fn step_changed(&self, step: &Step) {
        match step.status {
            Status::Running => {
                self.spinner.set_message(format!("{}...", step.name));
            }
            Status::Success | Status::Warning | Status::Error => {
                let mark = Self::status_mark(step.status);
                match &step.error_message {
                    Some(error) => {
                        self.print_line(format!("{mark} {} — {}", step.name, style(error).dim()));
                    }
                    None => self.print_line(format!("{mark} {}", step.name)),
                }
            }
            Status::Idle => {}
        }
    }

    fn sub_step_changed(&self, step: &Step, sub: &SubStep) {
        if !self.verbose {
            return;
        }
        let mark = Self::status_mark(sub.status);
        let detail = sub.message.as_deref().unwrap_or("");
        self.print_line(format!(
            "    {mark} {}: {} {}",
            step.name,
            sub.name,
            style(detail).dim()
        ));
    }

    fn probe_changed(&self, probe: &ProviderProbe) {
        if !self.verbose {
            return;
        }
        let mark = match probe.status {
            ProbeStatus::Idle => style("·").dim().to_string(),
            ProbeStatus::Running => style("…").cyan().to_string(),
            ProbeStatus::Success => style("✓").green().to_string(),
            ProbeStatus::Error => style("✗").red().to_string(),
        };
        let mut extras = Vec::new();
        if let Some(tokens) = probe.tokens_used {
            extras.push(format!("{tokens} tokens"));
        }
        if let Some(cost) = probe.cost_usd {
            extras.push(format!("${cost:.4}"));
        }
        if let Some(error) = &probe.error_message {
            extras.push(error.clone());
        }
        self.print_line(format!(
            "    {mark} provider {} {}",
            probe.key,
            style(extras.join(", ")).dim()
        ));
    }
}
