//! `flowcheck run` — execute one flow test end to end.

use anyhow::Result;
use std::sync::Arc;

use flowcheck::config::Config;
use flowcheck::facade::ServiceFacade;
use flowcheck::facade::http::HttpFacade;
use flowcheck::orchestrator::FlowRunner;
use flowcheck::recorder::RunRecorder;
use flowcheck::report::friendly_error_list;
use flowcheck::ui::FlowUi;

pub async fn cmd_run(
    competitor: String,
    providers: Option<String>,
    prompt: Option<String>,
    verbose: bool,
) -> Result<()> {
    let config = Config::load(verbose)?;
    let backend = config.require_backend()?;

    let facade: Arc<dyn ServiceFacade> =
        Arc::new(HttpFacade::new(&backend.url, &backend.api_key));
    let recorder = RunRecorder::new(&config.cache_file);
    let mut runner = FlowRunner::new(facade, recorder);

    let ui = Arc::new(FlowUi::new(config.verbose));
    runner.set_observer(ui.clone());

    let selected: Vec<String> = providers
        .map(|csv| {
            csv.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let outcome = runner.run(&competitor, &selected, prompt).await?;

    ui.print_summary(&outcome.record);
    if let Some(warning) = &outcome.recorder_warning {
        ui.print_recorder_warning(warning);
    }

    if !outcome.record.overall_success {
        println!("\n{}", console::style("Issues:").bold());
        for issue in friendly_error_list(runner.ledger()) {
            match &issue.detail {
                Some(detail) => println!("  - {}: {}", issue.title, detail),
                None => println!("  - {}", issue.title),
            }
        }
        println!(
            "\nRun {} for a machine-readable report or {} for an assistant prompt.",
            console::style("flowcheck report").cyan(),
            console::style("flowcheck fixit").cyan()
        );
    }
    Ok(())
}
