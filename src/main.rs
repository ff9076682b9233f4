use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;

#[derive(Parser)]
#[command(name = "flowcheck")]
#[command(version, about = "End-to-end flow tests against your analysis backend")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one flow test for a competitor
    Run {
        /// Competitor name to analyze
        competitor: String,
        /// Comma-separated provider names (defaults to all providers)
        #[arg(long)]
        providers: Option<String>,
        /// Custom analysis prompt passed to the pipeline
        #[arg(long)]
        prompt: Option<String>,
    },
    /// List recent runs
    History {
        /// Maximum number of runs to show
        #[arg(long, default_value = "5")]
        limit: usize,
        /// Read from the remote store instead of the local cache
        #[arg(long)]
        remote: bool,
    },
    /// Print a structured JSON error report for the most recent run
    Report,
    /// Print an assistant-ready prompt describing recent failures
    Fixit,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            competitor,
            providers,
            prompt,
        } => cmd::cmd_run(competitor, providers, prompt, cli.verbose).await,
        Commands::History { limit, remote } => {
            cmd::cmd_history(limit, remote, cli.verbose).await
        }
        Commands::Report => cmd::cmd_report(cli.verbose),
        Commands::Fixit => cmd::cmd_fixit(cli.verbose),
    }
}
