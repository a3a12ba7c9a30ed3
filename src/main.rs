//! Policy-Pulse main entry point
//!
//! Command-line interface for the crawl-and-dispatch worker.

use anyhow::Context;
use clap::Parser;
use policy_pulse::config::{load_config_with_hash, Config};
use policy_pulse::crawler::CrawlerService;
use policy_pulse::storage::open_shared_store;
use policy_pulse::tasks::{
    parse_utc_offset, register_crawl_handlers, schedule_from_config, Broker, HandlerRegistry, JobClient,
    MemoryBroker, PeriodicScheduler, ScheduleEntry, TaskRunner, TaskRunnerConfig,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Policy-Pulse: crawls government and procurement sites on a schedule
///
/// Compiles the configured site tree into crawl targets, then either runs a
/// single batch or starts the periodic scheduler and the queue workers.
#[derive(Parser, Debug)]
#[command(name = "policy-pulse")]
#[command(version)]
#[command(about = "Crawl-and-dispatch worker for policy and bid sites", long_about = None)]
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

    /// Validate config and list the compiled targets without crawling
    #[arg(long, conflicts_with_all = ["once", "list_schedule"])]
    dry_run: bool,

    /// Run a single crawl batch and print its summary as JSON
    #[arg(long, conflicts_with_all = ["dry_run", "list_schedule"])]
    once: bool,

    /// Target ids to crawl with --once; a random sample when omitted
    #[arg(long = "target", value_name = "ID", requires = "once")]
    targets: Vec<String>,

    /// Print the periodic schedule and exit
    #[arg(long, conflicts_with_all = ["dry_run", "once"])]
    list_schedule: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let schedule = schedule_from_config(&config.schedule)?;

    if cli.list_schedule {
        handle_list_schedule(&schedule);
        return Ok(());
    }

    let store = open_shared_store(Path::new(&config.output.database_path))?;
    let service = CrawlerService::from_config(&config, store)?;

    if cli.dry_run {
        handle_dry_run(&config, &service);
    } else if cli.once {
        handle_once(&service, &cli.targets).await?;
    } else {
        handle_serve(&config, service, schedule).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("policy_pulse=info,warn"),
            1 => EnvFilter::new("policy_pulse=debug,info"),
            2 => EnvFilter::new("policy_pulse=trace,debug"),
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

fn handle_list_schedule(schedule: &[ScheduleEntry]) {
    println!("=== Periodic Schedule ({} entries) ===\n", schedule.len());
    for entry in schedule {
        println!(
            "  {:<20} {:<24} {:<14} queue={:<12} expires={}s",
            entry.name,
            entry.kind.name(),
            entry.cadence.to_string(),
            entry.queue.as_str(),
            entry.expires.num_seconds()
        );
    }
}

fn handle_dry_run(config: &Config, service: &CrawlerService) {
    println!("=== Policy-Pulse Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Politeness delay: up to {}ms", config.crawler.politeness_delay_ms);
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!(
        "  Connections: {} total, {} per host",
        config.crawler.max_connections, config.crawler.max_connections_per_host
    );
    println!("  Max tree depth: {}", config.crawler.max_depth);
    println!("  Sample size: {}", config.crawler.sample_size);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let targets = service.targets();
    println!("\nTargets ({}):", targets.len());
    for target in targets {
        println!(
            "  - {} [{}] {} (depth {}, {} start urls)",
            target.id,
            target.category.as_str(),
            target.name,
            target.depth,
            target.start_urls.len()
        );
        for url in &target.start_urls {
            println!("    * {}", url);
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would crawl {} start URLs",
        targets.iter().map(|t| t.start_urls.len()).sum::<usize>()
    );
}

async fn handle_once(service: &CrawlerService, targets: &[String]) -> anyhow::Result<()> {
    let ids = (!targets.is_empty()).then_some(targets);
    let summary = service.run_crawl_task(ids).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !summary.success {
        anyhow::bail!(summary.message);
    }
    Ok(())
}

/// Runs the scheduler and the worker pool until Ctrl-C
async fn handle_serve(
    config: &Config,
    service: CrawlerService,
    schedule: Vec<ScheduleEntry>,
) -> anyhow::Result<()> {
    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::from_config(&config.tasks));
    let client = JobClient::new(broker.clone());

    let mut registry = HandlerRegistry::new();
    register_crawl_handlers(&mut registry, service, client, broker.clone());

    let (schedule, unhandled): (Vec<_>, Vec<_>) = schedule
        .into_iter()
        .partition(|entry| registry.contains(entry.kind));
    for entry in &unhandled {
        tracing::warn!(
            "No handler registered for {}; schedule entry '{}' disabled",
            entry.kind,
            entry.name
        );
    }

    let runner = TaskRunner::new(broker.clone(), registry, TaskRunnerConfig::from(&config.tasks));
    let shutdown = runner.shutdown_handle();
    let mut handles = runner.spawn_workers();

    let offset = parse_utc_offset(&config.tasks.schedule_utc_offset)?;
    let scheduler = PeriodicScheduler::new(schedule, broker).with_offset(offset);
    let scheduler_shutdown = shutdown.clone();
    handles.push(tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    }));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested, waiting for workers to finish");
    shutdown.store(true, Ordering::SeqCst);

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Worker task ended abnormally: {}", e);
        }
    }

    tracing::info!("Stopped");
    Ok(())
}
