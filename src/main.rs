use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

use perfdata::config::Config;
use perfdata::constants::INTEGRATED_FILE;
use perfdata::fixtures;
use perfdata::logging;
use perfdata::observability;
use perfdata::pipeline::integrate::integrate;
use perfdata::pipeline::parser::meta::categorize_campaign;
use perfdata::pipeline::processing::quality_gate::ConsistencyValidator;
use perfdata::pipeline::storage::CanonicalTable;
use perfdata::pipeline::{Pipeline, PipelineResult};
use perfdata::types::Platform;

#[derive(Parser)]
#[command(name = "perfdata")]
#[command(about = "Normalize Meta, Google and TikTok ad exports into one canonical schema")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $PERFDATA_CONFIG, then ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write a Prometheus snapshot of the run's metrics to this file
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse raw exports and write canonical files
    Clean {
        /// Platforms to clean (comma-separated). Available: meta, google, tiktok
        #[arg(long)]
        platforms: Option<String>,
    },
    /// Concatenate the three canonical files
    Integrate,
    /// Run the consistency checks over the canonical files
    Check {
        /// Also print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write synthetic raw exports for one year
    Generate,
    /// Clean every platform, integrate, then check
    Run,
}

fn parse_platforms(list: Option<&str>) -> Result<Vec<Platform>> {
    let Some(list) = list else {
        return Ok(Platform::ALL.to_vec());
    };
    list.split(',')
        .map(|name| Platform::from_slug(name).with_context(|| format!("Unknown platform: {}", name.trim())))
        .collect()
}

fn print_result(result: &PipelineResult) {
    println!("\n📊 {} results:", result.platform);
    println!("   Rows: {}", result.rows);
    println!("   Absent conversions: {}", result.absent_conversions);
    if result.duplicate_keys > 0 {
        println!("   ⚠️  Duplicate date/campaign rows kept: {}", result.duplicate_keys);
    }
    println!("   Output file: {}", result.output_file);
    println!("   SHA-256: {}", result.sha256);
}

fn print_meta_categories(config: &Config) {
    let path = config.processed_path(Platform::Meta.canonical_file());
    let Ok(table) = CanonicalTable::load(&path) else {
        return;
    };
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for name in table.values("campaign_name") {
        *counts.entry(categorize_campaign(name).as_str()).or_default() += 1;
    }
    println!("   Rows by campaign type:");
    for (category, rows) in counts {
        println!("     {:<16} {}", category, rows);
    }
}

/// Returns true when every requested platform was cleaned
fn clean(config: &Config, platforms: &[Platform]) -> bool {
    println!("🧹 Cleaning {} platform export(s)...", platforms.len());
    let mut all_ok = true;

    for (platform, result) in Pipeline::run_all(config, platforms) {
        match result {
            Ok(result) => {
                print_result(&result);
                if platform == Platform::Meta {
                    print_meta_categories(config);
                }
            }
            Err(e) => {
                all_ok = false;
                println!("\n❌ {} failed: {}", platform, e);
            }
        }
    }
    all_ok
}

fn run_integrate(config: &Config) -> Result<()> {
    let output = config.processed_path(INTEGRATED_FILE);
    println!("🔗 Integrating canonical files...");
    let result = integrate(&config.paths.processed_dir, &output)?;
    for (platform, rows) in &result.rows_per_platform {
        println!("   {}: {} rows", platform, rows);
    }
    println!("💾 Saved {} rows to {}", result.total_rows(), result.output_file.display());
    Ok(())
}

/// Returns the process exit code
fn run_check(config: &Config, json: bool) -> Result<i32> {
    let validator = ConsistencyValidator::new(&config.validator);
    let report = validator.validate_dir(&config.paths.processed_dir);
    print!("{}", report.transcript());
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(report.exit_code())
}

fn execute(cli: &Cli, config: &Config) -> Result<i32> {
    match &cli.command {
        Commands::Clean { platforms } => {
            let platforms = parse_platforms(platforms.as_deref())?;
            Ok(if clean(config, &platforms) { 0 } else { 1 })
        }
        Commands::Integrate => {
            run_integrate(config)?;
            Ok(0)
        }
        Commands::Check { json } => run_check(config, *json),
        Commands::Generate => {
            println!("🎲 Generating raw exports (seed {})...", config.generator.seed);
            for file in fixtures::generate(config)? {
                println!("   {}: {} rows -> {}", file.platform, file.rows, file.path.display());
            }
            Ok(0)
        }
        Commands::Run => {
            if !clean(config, &Platform::ALL) {
                warn!("Not integrating: at least one platform failed to clean");
                return Ok(1);
            }
            run_integrate(config)?;
            run_check(config, false)
        }
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let guard = logging::init_logging("perfdata.log");

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };

    if cli.metrics_out.is_some() {
        observability::init()?;
    }

    let code = match execute(&cli, &config) {
        Ok(code) => code,
        Err(e) => {
            error!("perfdata failed: {:#}", e);
            eprintln!("❌ {:#}", e);
            2
        }
    };

    if let Some(path) = &cli.metrics_out {
        if let Some(snapshot) = observability::render() {
            fs::write(path, snapshot).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Metrics written to {}", path.display());
        }
    }

    drop(guard);
    std::process::exit(code);
}
