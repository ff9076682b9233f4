//! `flowcheck report` and `flowcheck fixit` — diagnostics over recorded
//! history. Both are local-only: they read the ring buffer and never touch
//! the backend.

use anyhow::Result;
use console::style;

use flowcheck::config::Config;
use flowcheck::providers::Provider;
use flowcheck::recorder::{RunRecorder, hydrate_ledger};
use flowcheck::report::{ai_fix_prompt, structured_error_report};

pub fn cmd_report(verbose: bool) -> Result<()> {
    let config = Config::load(verbose)?;
    let recorder = RunRecorder::new(&config.cache_file);
    let history = recorder.load_local();

    let Some(newest) = history.first() else {
        println!("No recorded runs yet. Run {} first.", style("flowcheck run").cyan());
        return Ok(());
    };

    let ledger = hydrate_ledger(newest);
    let selections: Vec<Provider> = newest
        .providers
        .iter()
        .filter_map(|p| Provider::parse(&p.key))
        .collect();
    let report = structured_error_report(&ledger, &selections, &history);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn cmd_fixit(verbose: bool) -> Result<()> {
    let config = Config::load(verbose)?;
    let recorder = RunRecorder::new(&config.cache_file);
    let history = recorder.load_local();

    if history.is_empty() {
        println!("No recorded runs yet. Run {} first.", style("flowcheck run").cyan());
        return Ok(());
    }
    println!("{}", ai_fix_prompt(&history));
    Ok(())
}
