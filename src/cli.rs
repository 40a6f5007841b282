use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use crate::bench::{self, BenchOptions, BenchReport};
use crate::config::MemoConfig;
use crate::version::VERSION;
use guestmemo_utils::logger;

#[derive(Parser, Debug)]
#[command(name = "guestmemo", version = VERSION, about = "Guest call memoization toolkit")]
pub struct GuestmemoCli {
    #[arg(long, global = true)]
    /// TOML configuration file (requires the `toml-config` feature).
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    /// Force memoization off regardless of configuration.
    no_memo: bool,

    #[command(subcommand)]
    command: Command,
}

impl GuestmemoCli {
    pub const fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs a synthetic local-search workload against an in-process guest.
    Bench {
        #[arg(long, default_value_t = 200)]
        tasks: usize,
        #[arg(long, default_value_t = 8)]
        workers: usize,
        #[arg(short, long, default_value_t = 100)]
        iterations: usize,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// Run once with memoization and once without, and compare.
        #[arg(long)]
        compare: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Prints the resolved configuration.
    Config,
}

pub fn run() -> Result<()> {
    logger::init_logging();
    let cli = GuestmemoCli::parse();
    let config = resolve_config(&cli)?;
    match &cli.command {
        Command::Bench {
            tasks,
            workers,
            iterations,
            seed,
            compare,
            json,
        } => {
            let options = BenchOptions {
                tasks: *tasks,
                workers: *workers,
                iterations: *iterations,
                seed: *seed,
                config,
            };
            handle_bench(&options, *compare, *json)
        }
        Command::Config => {
            print_config(&config);
            Ok(())
        }
    }
}

fn resolve_config(cli: &GuestmemoCli) -> Result<MemoConfig> {
    let mut config = MemoConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if cli.no_memo {
        config.memoize = false;
    }
    debug!(?config, "configuration resolved");
    Ok(config)
}

fn handle_bench(options: &BenchOptions, compare: bool, json: bool) -> Result<()> {
    let mut reports = vec![bench::run(options).context("bench run failed")?];
    if compare {
        let mut other = *options;
        other.config.memoize = !options.config.memoize;
        reports.push(bench::run(&other).context("comparison run failed")?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        print_report(report);
    }
    if let [first, second] = reports.as_slice() {
        if first.checksum == second.checksum {
            println!("{} scores agree", "ok".green().bold());
        } else {
            println!(
                "{} scores differ: {} vs {}",
                "mismatch".red().bold(),
                first.checksum,
                second.checksum
            );
        }
    }
    Ok(())
}

fn print_report(report: &BenchReport) {
    let mode = if report.memoize {
        "memoized".green().bold()
    } else {
        "direct".yellow().bold()
    };
    println!("{} {mode}", "[Bench]".bold());
    println!(
        "{:>16}: {} tasks, {} workers, {} steps",
        "Model", report.tasks, report.workers, report.iterations
    );
    println!("{:>16}: {}", "Final score", report.final_score);
    println!("{:>16}: {}", "Workers in use", report.workers_in_use);
    println!("{:>16}: {}", "Guest calls", report.guest_calls);
    println!(
        "{:>16}: {} hits, {} misses, {} bypasses ({:.1}% hit ratio)",
        "Memo",
        report.metrics.hits,
        report.metrics.misses,
        report.metrics.bypasses,
        report.metrics.hit_ratio() * 100.0
    );
    println!("{:>16}: {}", "Cache", report.cache);
    println!("{:>16}: {:>6.2} ms", "Elapsed", report.elapsed_ms);
}

fn print_config(config: &MemoConfig) {
    println!("{}", "[Config]".bold());
    println!("{:>16}: {}", "memoize", config.memoize);
    println!("{:>16}: {}", "capacity", config.cache.initial_capacity);
    match config.cache.shard_amount {
        Some(shards) => println!("{:>16}: {shards}", "shards"),
        None => println!("{:>16}: default", "shards"),
    }
}
