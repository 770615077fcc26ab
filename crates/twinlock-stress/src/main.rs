use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twinlock_stress::{run, StressConfig, StressReport};

#[derive(Parser)]
#[command(name = "twinlock-stress")]
#[command(about = "Many-producer/many-consumer stress run against the two-lock queue", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file; TWINLOCK__* environment variables override it
    #[arg(short, long, env = "TWINLOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Number of producer threads
    #[arg(short, long)]
    producers: Option<usize>,

    /// Number of consumer threads
    #[arg(short = 'C', long)]
    consumers: Option<usize>,

    /// Distinct values pushed by each producer
    #[arg(short = 'n', long)]
    items_per_producer: Option<u64>,

    /// Value that tells a consumer to stop
    #[arg(long, allow_hyphen_values = true)]
    terminal_marker: Option<i64>,

    /// Skip loss/duplication bookkeeping
    #[arg(long)]
    no_verify: bool,

    /// Output format (json, pretty)
    #[arg(short, long, default_value = "pretty")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

impl Cli {
    fn apply(&self, config: &mut StressConfig) {
        if let Some(n) = self.producers {
            config.producers = n;
        }
        if let Some(n) = self.consumers {
            config.consumers = n;
        }
        if let Some(n) = self.items_per_producer {
            config.items_per_producer = n;
        }
        if let Some(m) = self.terminal_marker {
            config.terminal_marker = m;
        }
        if self.no_verify {
            config.verify = false;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
                .unwrap_or_else(|_| "twinlock_stress=info,twinlock_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_pretty(report: &StressReport) {
    println!("{}", "Stress run".bold());
    println!("  producers:     {}", report.producers);
    println!("  consumers:     {}", report.consumers);
    println!("  pushed:        {} / {}", report.pushed, report.expected);
    println!("  push failures: {}", report.push_failures);
    println!("  received:      {}", report.received);
    if let (Some(d), Some(m)) = (report.duplicates, report.missing) {
        println!("  duplicates:    {d}");
        println!("  missing:       {m}");
    }
    println!("  elapsed:       {:.3}s", report.elapsed_secs);
    println!("  throughput:    {:.0} ops/s", report.ops_per_sec);
    if report.is_clean() {
        println!("{}", "PASS".green().bold());
    } else {
        println!("{}", "FAIL".red().bold());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        StressConfig::load(cli.config.as_deref()).context("Failed to load stress configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid stress configuration")?;

    init_tracing(&config.logging.level);

    let report = run(&config).context("Stress run failed")?;
    match cli.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Pretty => print_pretty(&report),
    }

    if !report.is_clean() {
        bail!(
            "verification failed: received {} of {} values",
            report.received,
            report.expected
        );
    }
    Ok(())
}
