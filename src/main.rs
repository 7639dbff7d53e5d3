//! Sparkify CLI - run, validate and inspect ETL pipelines

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use sparkify_etl::config::{mask_url, EtlConfig};
use sparkify_etl::credentials::CredentialConfig;
use sparkify_etl::{
    CredentialProvider, FixSuggestion, EtlError, InMemoryWarehouse, PgWarehouse, PipelineDef,
    PipelineGraph, RetryPolicy, RunContext, Runner, StaticCredentialProvider, TaskAction,
    WarehouseClient,
};

const DEFAULT_PIPELINE: &str = "pipelines/sparkify.yaml";

#[derive(Parser)]
#[command(name = "sparkify")]
#[command(about = "Sparkify - stage, transform and check the song play warehouse")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline for one logical date
    Run {
        /// Path to the pipeline YAML
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,

        /// Logical date: YYYY-MM-DD or RFC 3339
        #[arg(short, long)]
        date: String,

        /// End of the data interval (default: one hour after --date)
        #[arg(long)]
        interval_end: Option<String>,

        /// Runtime config (defaults to ./sparkify.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Execute against the in-memory warehouse
        #[arg(long)]
        dry_run: bool,

        /// Upper bound on concurrently running tasks
        #[arg(long)]
        max_active: Option<usize>,

        /// Explicit run id (default: generated)
        #[arg(long)]
        run_id: Option<String>,

        /// Write the run event log as JSON
        #[arg(long)]
        events: Option<PathBuf>,

        /// Write the per-task run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Validate a pipeline file (parse and build the graph)
    Validate {
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,
    },

    /// Print the task graph and its parallel layers
    Graph {
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            pipeline,
            date,
            interval_end,
            config,
            dry_run,
            max_active,
            run_id,
            events,
            report,
        } => {
            run_pipeline(RunArgs {
                pipeline,
                date,
                interval_end,
                config,
                dry_run,
                max_active,
                run_id,
                events,
                report,
            })
            .await
        }
        Commands::Validate { pipeline } => validate_pipeline(&pipeline),
        Commands::Graph { pipeline } => print_graph(&pipeline),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            if let Some(suggestion) = e.downcast_ref::<EtlError>().and_then(|e| e.fix_suggestion()) {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            std::process::exit(1);
        }
    }
}

struct RunArgs {
    pipeline: PathBuf,
    date: String,
    interval_end: Option<String>,
    config: Option<PathBuf>,
    dry_run: bool,
    max_active: Option<usize>,
    run_id: Option<String>,
    events: Option<PathBuf>,
    report: Option<PathBuf>,
}

fn load_graph(path: &Path) -> anyhow::Result<(PipelineDef, PipelineGraph)> {
    let def = PipelineDef::from_file(path)?;
    let graph = def.build()?;
    Ok((def, graph))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EtlConfig> {
    let config = match path {
        Some(path) => EtlConfig::load_from(path)?,
        None => EtlConfig::load_default()?,
    };
    Ok(config.with_env())
}

/// Placeholder keys for every credential id the graph uses but config lacks
fn dry_run_credentials(
    graph: &PipelineGraph,
    mut entries: BTreeMap<String, CredentialConfig>,
) -> BTreeMap<String, CredentialConfig> {
    for task in graph.iter() {
        if let TaskAction::Stage(stage) = task.action() {
            let entry = entries.entry(stage.credential_id().to_string()).or_default();
            if entry.access_key.is_empty() || entry.secret_key.is_empty() {
                entry.access_key = "DRYRUNACCESSKEY".into();
                entry.secret_key = "dry-run-secret".into();
            }
        }
    }
    entries
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<bool> {
    let (_, graph) = load_graph(&args.pipeline)?;
    let config = load_config(args.config.as_deref())?;

    let logical_date = RunContext::parse_logical_date(&args.date)?;
    let mut context = RunContext::new(logical_date);
    if let Some(end) = &args.interval_end {
        context = context.with_interval(logical_date, RunContext::parse_logical_date(end)?)?;
    }
    if let Some(run_id) = args.run_id {
        context = context.with_run_id(run_id);
    }

    let (warehouse, credentials, policy): (Arc<dyn WarehouseClient>, Arc<dyn CredentialProvider>, RetryPolicy) =
        if args.dry_run {
            println!("{} Dry run: using the in-memory warehouse", "→".cyan());
            let creds = dry_run_credentials(&graph, config.credentials.clone());
            (
                Arc::new(InMemoryWarehouse::new().permissive()),
                Arc::new(StaticCredentialProvider::new(creds)),
                RetryPolicy::no_retry(),
            )
        } else {
            println!("{} Warehouse: {}", "→".cyan(), mask_url(&config.warehouse.url));
            (
                Arc::new(PgWarehouse::connect_lazy(&config.warehouse)?),
                Arc::new(StaticCredentialProvider::new(config.credentials.clone())),
                config.retry.to_policy(),
            )
        };

    let runner = Runner::new(graph, warehouse, credentials)
        .with_retry_policy(policy)
        .with_max_active_tasks(args.max_active.or(config.runner.max_active_tasks))
        .with_progress(true);

    let report = runner.run(context).await;

    println!("{}", "Summary:".cyan().bold());
    print!("{}", report.render_summary());

    if let Some(path) = &args.events {
        let json = serde_json::to_string_pretty(&runner.event_log().to_json())?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write events to {}", path.display()))?;
        println!("{} Events written to {}", "→".cyan(), path.display());
    }

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report.to_json())?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("{} Report written to {}", "→".cyan(), path.display());
    }

    if report.is_success() {
        println!(
            "\n{} Run {} succeeded in {:.1}s",
            "✓".green(),
            report.run_id,
            report.duration.as_secs_f32()
        );
    } else {
        println!(
            "\n{} Run {} failed: {} failed, {} skipped",
            "✗".red(),
            report.run_id,
            report.failed().len(),
            report.skipped().len()
        );
    }
    Ok(report.is_success())
}

fn validate_pipeline(path: &Path) -> anyhow::Result<bool> {
    let (def, graph) = load_graph(path)?;

    let join = |ids: Vec<Arc<str>>| ids.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ");

    println!("{} Pipeline '{}' is valid", "✓".green(), path.display());
    println!("  Name: {}", def.name);
    println!("  Schedule: {}", def.schedule.as_deref().unwrap_or("(none)"));
    println!("  Tasks: {}", graph.len());
    println!("  Roots: {}", join(graph.roots()));
    println!("  Sinks: {}", join(graph.sinks()));
    Ok(true)
}

fn print_graph(path: &Path) -> anyhow::Result<bool> {
    let (_, graph) = load_graph(path)?;

    println!(
        "{} Pipeline '{}' ({} tasks)\n",
        "→".cyan(),
        graph.name(),
        graph.len()
    );
    for (i, layer) in graph.layers().iter().enumerate() {
        let names: Vec<&str> = layer.iter().map(|s| s.as_ref()).collect();
        println!("  {} {}", format!("Layer {}:", i).bold(), names.join(", "));
    }
    println!();
    for task in graph.iter() {
        let target = task.action().target_table().unwrap_or("-");
        let downstream: Vec<&str> = graph.dependents(task.name()).iter().map(|s| s.as_ref()).collect();
        println!(
            "  {} [{}] {} {}",
            task.name(),
            task.kind(),
            target.dimmed(),
            if downstream.is_empty() {
                String::new()
            } else {
                format!("→ {}", downstream.join(", "))
            }
        );
    }
    Ok(true)
}
