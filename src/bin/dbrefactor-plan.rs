//! # DBRefactor Plan
//!
//! Reads a catalog of database objects from a JSON file and prints the migration plan:
//! creation order, dependency waves, cycles with break suggestions, and recommendations.
//! Nothing is converted or executed.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dbrefactor_core::catalog::{CatalogEntry, ObjectCatalog};
use dbrefactor_core::config::{ConfigManager, MigrationConfig};
use dbrefactor_core::graph::MigrationPlan;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "dbrefactor-plan")]
#[command(about = "Print the migration plan for a catalog of database objects")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// JSON file holding an array of catalog entries
    #[arg(short, long)]
    catalog: PathBuf,

    /// Break detected cycles and plan around the deferred edges
    #[arg(long)]
    auto_break: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Configuration file (default: config/dbrefactor.toml or DBREFACTOR_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    match run(&cli) {
        Ok(executable) => process::exit(if executable { 0 } else { 2 }),
        Err(e) => {
            error!("Planning failed: {e:#}");
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

/// Returns whether the plan has a usable creation order
fn run(cli: &Cli) -> Result<bool> {
    let config = load_config(cli)?;

    let raw = std::fs::read_to_string(&cli.catalog)
        .with_context(|| format!("reading catalog {}", cli.catalog.display()))?;
    let entries: Vec<CatalogEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing catalog {}", cli.catalog.display()))?;

    let mut catalog = ObjectCatalog::new();
    let replaced = catalog.bulk_load(entries);
    if replaced > 0 {
        eprintln!("note: {replaced} duplicate catalog entries replaced earlier ones");
    }

    let graph = catalog
        .build(config.dependency_graph.graph_policy())
        .context("building dependency graph")?;
    let plan = MigrationPlan::analyse(
        graph,
        cli.auto_break || config.dependency_graph.auto_break_cycles,
    );

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Table => print_table(&plan),
    }
    Ok(plan.is_executable())
}

fn load_config(cli: &Cli) -> Result<Arc<MigrationConfig>> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from_path(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => ConfigManager::load().context("loading configuration")?,
    };
    Ok(Arc::new(manager.config().clone()))
}

fn print_table(plan: &MigrationPlan) {
    println!(
        "Objects: {}    Dependencies: {}",
        plan.object_count, plan.edge_count
    );
    println!(
        "Strategy: {}    Risk: {}",
        plan.recommendations.strategy, plan.recommendations.risk_level
    );
    println!();

    if plan.order.is_empty() && plan.object_count > 0 {
        println!("No creation order: unresolved cycles remain (use --auto-break to defer edges)");
    } else {
        println!("{:>5}  OBJECT", "#");
        for (position, name) in plan.order.iter().enumerate() {
            println!("{:>5}  {}", position + 1, name);
        }
    }

    if !plan.levels.is_empty() {
        println!();
        println!("Waves:");
        for (level, names) in plan.levels.iter().enumerate() {
            let names: Vec<String> = names.iter().map(ToString::to_string).collect();
            println!("  {level}: {}", names.join(", "));
        }
    }

    if !plan.cycles.is_empty() {
        println!();
        println!("Cycles:");
        for cycle in &plan.cycles {
            let names: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            println!("  {}", names.join(" -> "));
        }
        for suggestion in &plan.break_suggestions {
            println!(
                "  suggest deferring {} ({})",
                suggestion.edge, suggestion.source_complexity
            );
        }
    }

    if !plan.deferred_edges.is_empty() {
        println!();
        println!("Deferred edges:");
        for edge in &plan.deferred_edges {
            println!("  {edge}");
        }
    }

    for warning in &plan.recommendations.warnings {
        println!("warning: {warning}");
    }
    for suggestion in &plan.recommendations.suggestions {
        println!("suggestion: {suggestion}");
    }
}
