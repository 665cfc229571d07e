use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use race_ledger::logging::init_logging;
use race_ledger::pipeline::load_gold;
use race_ledger::temporal::{format_month, parse_month};
use race_ledger::{
    report, run_build, run_harvest, top_k, DirectoryHarvester, ErrorKind, PipelineConfig, PipelineError,
    SqliteSink,
};

#[derive(Parser)]
#[command(name = "race-ledger", version, about = "Constructor points ETL: raw → bronze → gold → top-K")]
struct Cli {
    /// TOML configuration file (default: ./race-ledger.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild bronze and gold from the raw exports
    Build {
        /// Also replace the SQLite sink tables
        #[arg(long)]
        sink: Option<PathBuf>,
    },
    /// Print and save the top-K constructors for a month
    Report {
        /// Month as YYYY-MM
        #[arg(long)]
        month: String,
        #[arg(long)]
        top: Option<usize>,
    },
    /// Harvest per-round results for a range of seasons
    Harvest {
        #[arg(long)]
        from: i32,
        #[arg(long)]
        to: i32,
        /// Directory of cached live-timing exports
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        sink: Option<PathBuf>,
    },
    /// List the months present in gold
    Months,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<PipelineError>() {
                Some(pe) if pe.kind() == ErrorKind::NoDataForPeriod => {
                    eprintln!("❌ {}", pe);
                }
                _ => {
                    eprintln!("❌ {:#}", err);
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?
            .with_env_override(std::env::var(race_ledger::config::DATA_DIR_ENV).ok()),
        None => PipelineConfig::discover()?,
    };

    match cli.command {
        Command::Build { sink } => build(&config, sink),
        Command::Report { month, top } => report_month(&config, &month, top.unwrap_or(config.default_top_k)),
        Command::Harvest { from, to, source, sink } => harvest(&config, from, to, source, sink),
        Command::Months => months(&config),
    }
}

fn open_sink(config: &PipelineConfig, flag: Option<PathBuf>) -> Result<Option<SqliteSink>> {
    match flag.or_else(|| config.sink_path.clone()) {
        Some(path) => Ok(Some(
            SqliteSink::open(&path).with_context(|| format!("opening sink {}", path.display()))?,
        )),
        None => Ok(None),
    }
}

fn build(config: &PipelineConfig, sink: Option<PathBuf>) -> Result<()> {
    println!("🏗️  Building bronze and gold");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut sink = open_sink(config, sink)?;
    let report = run_build(config, sink.as_mut())?;

    for load in &report.loads {
        println!("📂 {}: {} rows", load.source_name, load.rows);
    }
    for issue in &report.load_issues {
        println!("⚠️  {} [{}]: {}", issue.issue, issue.field, issue.recommendation);
    }

    println!("\n🥉 Bronze: {} rows -> {}", report.bronze_rows, report.bronze_path.display());
    println!("   {}", report.quality.summary());
    for issue in &report.quality.issues {
        println!("   ⚠️  {}", issue.issue);
    }
    println!("🥇 Gold: {} rows -> {}", report.gold_rows, report.gold_path.display());
    if report.unbucketed > 0 {
        println!("   {} facts without a race date were left out", report.unbucketed);
    }
    println!("🔏 Fingerprint: {}", report.fingerprint);
    if let Some(run_id) = &report.sink_run_id {
        println!("🗄️  Sink replaced (run {})", run_id);
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Build complete");
    Ok(())
}

fn report_month(config: &PipelineConfig, month: &str, k: usize) -> Result<()> {
    let month = parse_month(month)?;
    let gold = load_gold(config).context("run `race-ledger build` first")?;
    let ranked = top_k(&gold, month, k)?;

    print!("{}", report::render(&ranked, month, k));
    let path = report::save_csv(&config.reports_dir, month, k, &ranked)?;
    println!("Saved -> {}", path.display());
    Ok(())
}

fn harvest(config: &PipelineConfig, from: i32, to: i32, source: PathBuf, sink: Option<PathBuf>) -> Result<()> {
    if from > to {
        anyhow::bail!("--from {} is after --to {}", from, to);
    }
    println!("🛰️  Harvesting seasons {}..={} from {}", from, to, source.display());

    let harvester = DirectoryHarvester::new(source).with_null_tokens(config.null_tokens.clone());
    let mut sink = open_sink(config, sink)?;
    let summary = run_harvest(config, &harvester, from..=to, sink.as_mut())?;

    for season in &summary.seasons {
        println!(
            "   {}: {} rounds ok, {} failed, {} rows",
            season.season,
            season.succeeded(),
            season.failed(),
            season.results.len()
        );
        for failure in season.failures() {
            println!("      ⚠️  round {}: {}", failure.round, failure.reason);
        }
    }
    println!("✅ Harvest complete: {} rows", summary.results().count());
    Ok(())
}

fn months(config: &PipelineConfig) -> Result<()> {
    let gold = load_gold(config).context("run `race-ledger build` first")?;
    for month in gold.months() {
        println!("{}", format_month(month));
    }
    Ok(())
}
