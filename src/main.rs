//! Serpscope main entry point
//!
//! Command-line driver for the SERP collection pipeline: loads and
//! validates configuration, wires storage, tracker, and scheduler together,
//! and runs the collector stage with an external retry loop.

use anyhow::Context;
use clap::Parser;
use serpscope::collector::CollectionScheduler;
use serpscope::config::load_config_with_hash;
use serpscope::state::{RunStatus, Stage};
use serpscope::storage::{shared, MemoryStorage, Storage, StorageHandle};
use serpscope::tracker::PipelineRunTracker;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Serpscope: a compliance-gated SERP collection monitor
///
/// Collects search result pages across configured engines while respecting
/// robots.txt and per-engine rate budgets, and records pipeline run state
/// for the monitoring dashboard.
#[derive(Parser, Debug)]
#[command(name = "serpscope")]
#[command(version = "0.3.0")]
#[command(about = "A compliance-gated SERP collection monitor", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be collected without collecting
    #[arg(long, conflicts_with = "runs")]
    dry_run: bool,

    /// List recent pipeline runs and their stages, then exit
    #[arg(long, conflicts_with = "dry_run")]
    runs: bool,

    /// Extra collector attempts after a failed one (external retry loop)
    #[arg(long, default_value_t = 0)]
    retries: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    // The storage backend is an injected collaborator; this reference binary
    // wires in the in-memory one. Deployments substitute a persistent
    // implementation of the same trait here.
    let storage = shared(MemoryStorage::new());

    if cli.runs {
        handle_runs(&storage)?;
    } else {
        handle_collect(config, config_hash, storage, cli.retries).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("serpscope=info,warn"),
            1 => EnvFilter::new("serpscope=debug,info"),
            2 => EnvFilter::new("serpscope=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the collection plan
fn handle_dry_run(config: &serpscope::config::Config) {
    println!("=== Serpscope Dry Run ===\n");

    println!("Collector:");
    println!("  Respect robots.txt: {}", config.collector.respect_robots);
    println!(
        "  Robots cache TTL: {}ms",
        config.collector.robots_cache_ttl_ms
    );
    println!("  User agent: {}", config.collector.user_agent);
    if let Some(proxy) = &config.collector.proxy_url {
        println!("  Proxy: {}", proxy);
    }
    println!(
        "  Max results per query: {}",
        config.collector.max_results_per_query
    );
    println!(
        "  Request timeout: {}ms",
        config.collector.request_timeout_ms
    );
    if let Some(deadline) = config.collector.run_deadline_ms {
        println!("  Run deadline: {}ms", deadline);
    }

    println!("\nQueries ({}):", config.queries.len());
    for query in &config.queries {
        println!("  - {}", query);
    }

    let collectable: Vec<_> = config
        .engines
        .iter()
        .filter(|(_, e)| e.is_collectable())
        .collect();

    println!("\nEngines ({}):", config.engines.len());
    for (name, engine) in &config.engines {
        let status = if engine.is_collectable() {
            "active"
        } else {
            "skipped"
        };
        println!(
            "  - {} [{}] concurrency={} delay={}ms",
            name, status, engine.concurrency, engine.delay_ms
        );
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would collect {} (query, engine) pairs",
        config.queries.len() * collectable.len()
    );
}

/// Handles the --runs mode: lists recent pipeline runs and their stages
fn handle_runs(storage: &StorageHandle) -> anyhow::Result<()> {
    let storage = storage.lock().unwrap();
    let runs = storage
        .fetch_pipeline_runs(20)
        .map_err(anyhow::Error::from)?;

    if runs.is_empty() {
        println!("No pipeline runs recorded in this backend.");
        return Ok(());
    }

    for run in runs {
        println!(
            "{}  {}  created {}  error: {}",
            run.id,
            run.status,
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            run.error.as_deref().unwrap_or("-")
        );
        for stage in storage.fetch_pipeline_stages(run.id)? {
            println!(
                "    {}  {}  attempts={}",
                stage.stage, stage.status, stage.attempts
            );
        }
    }

    Ok(())
}

/// Handles the main collection pipeline
///
/// Runs the collector stage with an external retry loop: the scheduler
/// performs exactly one attempt per invocation, and this loop re-invokes it
/// while the stage keeps failing and retries remain. Backoff is the
/// caller's choice; this driver retries immediately.
async fn handle_collect(
    config: serpscope::config::Config,
    config_hash: String,
    storage: StorageHandle,
    retries: u32,
) -> anyhow::Result<()> {
    let config = Arc::new(config);
    if config.queries.is_empty() {
        tracing::warn!("Query set is empty; nothing will be collected");
    }

    let tracker = Arc::new(PipelineRunTracker::new(storage.clone()));
    let scheduler = CollectionScheduler::new(config.clone(), storage.clone(), tracker.clone())?;

    let metadata = std::collections::HashMap::from([
        ("config_hash".to_string(), serde_json::json!(config_hash)),
        (
            "query_count".to_string(),
            serde_json::json!(config.queries.len()),
        ),
        (
            "engines".to_string(),
            serde_json::json!(config.engines.keys().collect::<Vec<_>>()),
        ),
    ]);
    let run = tracker.create_run(metadata)?;

    // Ctrl-C stops new admissions and lets in-flight requests drain
    let cancel = scheduler.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling collection");
            cancel.cancel();
        }
    });

    let mut attempt = 0;
    let summary = loop {
        attempt += 1;
        let summary = scheduler.run(run.id, &config.queries).await?;

        if summary.was_cancelled() {
            break summary;
        }

        let stage = tracker
            .get_stage(run.id, Stage::Collector)
            .context("collector stage log missing after run")?;
        if stage.status == RunStatus::Completed || attempt > retries {
            break summary;
        }

        tracing::warn!(
            "Collector stage failed (attempt {}), retrying ({} left)",
            attempt,
            retries + 1 - attempt
        );
    };

    // Close out the run unless cancellation already did
    let run_state = tracker.get_run(run.id)?;
    if !run_state.status.is_terminal() {
        let stage = tracker
            .get_stage(run.id, Stage::Collector)
            .context("collector stage log missing after run")?;
        if stage.status == RunStatus::Completed {
            tracker.transition_run(run.id, RunStatus::Completed, None)?;
        } else {
            tracker.transition_run(run.id, RunStatus::Failed, stage.error.clone())?;
        }
    }

    let final_run = tracker.get_run(run.id)?;
    println!("=== Collection Summary ===");
    println!("Run: {} ({})", final_run.id, final_run.status);
    println!("Pairs persisted: {}", summary.persisted);
    println!("Pairs denied:    {}", summary.denied);
    println!("Pairs failed:    {}", summary.failed);
    if summary.cancelled > 0 {
        println!("Pairs cancelled: {}", summary.cancelled);
    }
    if !summary.exhausted_engines.is_empty() {
        println!(
            "Engines with no coverage: {}",
            summary.exhausted_engines.join(", ")
        );
    }
    println!("Elapsed: {:?}", summary.elapsed);

    storage.lock().unwrap().close().map_err(anyhow::Error::from)?;

    if final_run.status == RunStatus::Failed {
        anyhow::bail!(
            "run {} failed: {}",
            final_run.id,
            final_run.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}
