mod analysis;
mod config;
mod dataset;
mod errors;
mod llm_client;

use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::report::print_outcome;
use crate::analysis::{run_analysis, AnalysisInvoker, AnalysisMode, Execution, PipelineOptions};
use crate::config::Config;
use crate::dataset::TablePaths;
use crate::llm_client::rate_limit::RateLimiter;
use crate::llm_client::LlmClient;

#[derive(Parser, Debug)]
#[command(
    name = "tracer",
    version,
    about = "Knowledge Tracer CLI",
    after_help = r#"
Reads the CodeWorkout tables, keeps each student's best graded attempt per
problem, and asks the model to map recurring mistakes onto the curriculum.

EXAMPLES:
  tracer analyze                        # class summary, spring-2019, 50 submissions
  tracer analyze --limit 20 --mode gaps # curriculum-mapped gaps for 20 submissions
  tracer analyze --all-terms --batch    # one batch job across every term
"#
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze student submissions for knowledge gaps
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Number of submissions to analyze (defaults to BATCH_SIZE)
    #[arg(long)]
    limit: Option<NonZeroUsize>,

    /// Report schema to request from the model
    #[arg(long, value_enum, default_value_t = AnalysisMode::Class)]
    mode: AnalysisMode,

    /// Term to analyze
    #[arg(long, default_value = "spring-2019")]
    term: String,

    /// Analyze every term instead of one
    #[arg(long)]
    all_terms: bool,

    /// Submit a batch job (one request per submission) instead of one synchronous call
    #[arg(long)]
    batch: bool,

    /// Send the instruction inline instead of registering a cached context
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let Some(Command::Analyze(args)) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Knowledge Tracer v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm = Arc::new(LlmClient::new(config.gemini_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let options = PipelineOptions {
        tables: TablePaths::in_dataset_dir(&config.dataset_dir),
        curriculum_path: config.curriculum_path.clone(),
        problems_path: config.problems_path.clone(),
        mode: args.mode,
        term: (!args.all_terms).then(|| args.term.clone()),
        cap: args.limit.map_or(config.batch_size, NonZeroUsize::get),
        execution: if args.batch {
            Execution::Batch
        } else {
            Execution::Sync
        },
        use_cache: !args.no_cache,
        cache_ttl: config.cache_ttl,
    };

    let invoker = AnalysisInvoker::new(
        llm.clone(),
        RateLimiter::new(config.rate_limit),
        config.poll_interval,
    )
    .with_max_wait(config.poll_timeout);

    // Ctrl-C abandons the local wait; a submitted batch job keeps running remotely
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping");
            trigger.cancel();
        }
    });

    let result = tokio::select! {
        result = run_analysis(&options, llm, &invoker, &cancel) => result,
        _ = cancel.cancelled(), if options.execution == Execution::Sync => {
            println!("Analysis interrupted.");
            return Ok(());
        }
    };

    match result {
        Ok(outcome) => print_outcome(&outcome),
        Err(e) => {
            error!(kind = ?e.kind(), "Analysis failed: {e}");
            println!("Failed to get analysis results: {e}");
        }
    }

    Ok(())
}
