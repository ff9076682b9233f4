//! `flowcheck history` — list recent runs.

use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;

use flowcheck::config::Config;
use flowcheck::facade::ServiceFacade;
use flowcheck::facade::http::HttpFacade;
use flowcheck::ledger::Status;
use flowcheck::recorder::{REMOTE_RETENTION, RunRecord, RunRecorder, hydrate_ledger};
use flowcheck::report::friendly_error_list;

pub async fn cmd_history(limit: usize, remote: bool, verbose: bool) -> Result<()> {
    let config = Config::load(verbose)?;
    let recorder = RunRecorder::new(&config.cache_file);

    let records: Vec<RunRecord> = if remote {
        let backend = config.require_backend()?;
        let facade: Arc<dyn ServiceFacade> =
            Arc::new(HttpFacade::new(&backend.url, &backend.api_key));
        let session = facade
            .session()
            .await
            .context("Failed to resolve the current user")?;
        recorder
            .load_recent(&facade, &session.user_id, limit.min(REMOTE_RETENTION))
            .await?
    } else {
        let mut local = recorder.load_local();
        local.truncate(limit);
        local
    };

    if records.is_empty() {
        println!("No recorded runs yet. Run {} first.", style("flowcheck run").cyan());
        return Ok(());
    }

    for record in &records {
        let passed = record
            .steps
            .iter()
            .filter(|s| s.status == Status::Success)
            .count();
        let mark = if record.overall_success {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!(
            "{mark} {}  {}  {}/{} steps",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            style(&record.competitor_name).bold(),
            passed,
            record.steps.len(),
        );
    }

    // Hydrate the newest record so the last results are visible without
    // re-running anything.
    let newest = &records[0];
    let ledger = hydrate_ledger(newest);
    println!(
        "\n{} {}:",
        style("Latest run for").dim(),
        style(&newest.competitor_name).bold()
    );
    for issue in friendly_error_list(&ledger) {
        match &issue.detail {
            Some(detail) => println!("  - {}: {}", issue.title, detail),
            None => println!("  - {}", issue.title),
        }
    }
    Ok(())
}
