mod agent_evaluator;
mod catalog;
mod config;
mod log;
mod queries;
mod seeder;
mod summary;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use toolpref_core::config::SearchConfig;
use toolpref_core::driver::{SearchDriver, SearchProblem};
use toolpref_core::oracle::{Evaluator, FitnessOracle};
use toolpref_core::openai_client::OpenAiClient;
use toolpref_core::sink::{JsonlRunSink, SearchReport};
use toolpref_core::store::JsonlTrialStore;
use toolpref_core::types::Strategy;

use agent_evaluator::AgentEvaluator;
use catalog::Catalog;
use config::{HostConfig, Overrides};
use seeder::Seeder;

/// Blocking evaluator calls still running after a timeout get this long at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "toolpref", version, about = "Evolve tool descriptions that agents prefer to invoke")]
struct Cli {
    /// YAML configuration file (default: ./toolpref.yaml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evolve one tool's description against its competitors
    Search(SearchArgs),
    /// Generate strategy variants and competitor paraphrases into the catalog
    Seed(SeedArgs),
    /// Print per-strategy and per-generation statistics of a run directory
    Summarize(SummarizeArgs),
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    server: String,
    #[arg(long)]
    tool: String,
    /// Baseline description; defaults to the catalog's original
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long)]
    queries: Option<PathBuf>,
    /// Only use queries of this category
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    generations: Option<u32>,
    /// Parent directory for run output
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct SeedArgs {
    #[arg(long)]
    server: String,
    #[arg(long)]
    tool: String,
    /// Raw tool description to rewrite
    #[arg(long)]
    description: String,
    /// Strategies to generate (Au,Em,Ex,Su,superlative); defaults to the search strategies
    #[arg(long, value_delimiter = ',')]
    strategies: Vec<Strategy>,
    /// Competitor paraphrases to generate
    #[arg(long, default_value_t = 5)]
    competitors: usize,
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[derive(Args)]
struct SummarizeArgs {
    /// Run directory holding trials.jsonl and generations.jsonl
    dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = match &cli.command {
        Command::Search(args) => Overrides {
            seed: args.seed,
            generations: args.generations,
            output_dir: args.output.clone(),
            log_level: cli.log_level.clone(),
        },
        _ => Overrides {
            log_level: cli.log_level.clone(),
            ..Default::default()
        },
    };
    let config = HostConfig::load(cli.config.as_deref(), &overrides)?;
    log::init(&config.logging)?;

    match cli.command {
        Command::Search(args) => search(config, args),
        Command::Seed(args) => seed(config, args),
        Command::Summarize(args) => {
            let summary = summary::summarize(&args.dir)?;
            summary::print(&summary);
            Ok(())
        }
    }
}

fn search(config: HostConfig, args: SearchArgs) -> Result<()> {
    let catalog_path = args.catalog.unwrap_or_else(|| config.paths.catalog.clone());
    let queries_path = args.queries.unwrap_or_else(|| config.paths.queries.clone());
    let category = args.category.or_else(|| config.paths.query_category.clone());

    let catalog = Catalog::load(&catalog_path)?;
    let queries = queries::load(&queries_path, category.as_deref())?;
    info!(queries = queries.len(), path = %queries_path.display(), "loaded queries");
    let problem = catalog::build_problem(&catalog, &args.server, &args.tool, args.description.as_deref(), queries)?;

    let run_dir = config.paths.output_dir.join(run_name(&args.server, &args.tool));

    // The blocking HTTP client must be built and dropped outside the async runtime.
    let client = OpenAiClient::from_config(&config.llm)?;
    info!(model = client.model(), run_dir = %run_dir.display(), "starting search");
    let evaluator = Arc::new(AgentEvaluator::new(
        client,
        Duration::from_secs(config.llm.request_timeout_secs),
    ));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(run_search(&config.search, problem, Arc::clone(&evaluator), &run_dir));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    drop(evaluator);

    let report = result?;
    log::report(&report);
    log::done(&format!("results written to {}", run_dir.display()));
    Ok(())
}

async fn run_search<E: Evaluator>(
    search: &SearchConfig,
    problem: SearchProblem,
    evaluator: Arc<E>,
    run_dir: &Path,
) -> Result<SearchReport> {
    let trials = Arc::new(JsonlTrialStore::open(run_dir)?);
    let sink = Arc::new(JsonlRunSink::create(run_dir).await?);
    let oracle = FitnessOracle::new(evaluator, trials, search);
    let mut driver = SearchDriver::new(search.clone(), problem, oracle)?.with_sink(sink);

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping after in-flight trials");
                cancel.cancel();
            }
        })
    };

    let result = driver.run(&cancel).await;
    watcher.abort();

    match result {
        Ok(report) => Ok(report),
        Err(err) => {
            // History up to the failure is still on disk; show what it holds.
            log::report(&driver.report());
            Err(err).context("search did not complete")
        }
    }
}

fn seed(config: HostConfig, args: SeedArgs) -> Result<()> {
    let catalog_path = args.catalog.unwrap_or_else(|| config.paths.catalog.clone());
    let strategies = if args.strategies.is_empty() {
        config.search.strategies.clone()
    } else {
        args.strategies
    };
    if let Some(bad) = strategies.iter().find(|s| !s.is_persuasion()) {
        anyhow::bail!("'{}' is not a persuasion strategy", bad);
    }

    let client = OpenAiClient::from_config(&config.llm)?;
    let mut catalog = Catalog::load_or_default(&catalog_path)?;
    Seeder::new(&client).seed(
        &mut catalog,
        &args.server,
        &args.tool,
        &args.description,
        &strategies,
        args.competitors,
    )?;
    catalog.save(&catalog_path)?;

    log::done(&format!(
        "seeded {}/{} in {}",
        args.server,
        args.tool,
        catalog_path.display()
    ));
    Ok(())
}

/// `weather-get-forecast-20261016T101500`
fn run_name(server: &str, tool: &str) -> String {
    format!(
        "{}-{}-{}",
        server.to_ascii_lowercase(),
        tool.to_ascii_lowercase(),
        chrono::Utc::now().format("%Y%m%dT%H%M%S")
    )
}
