mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::checks::{MarketImpliedArgs, StructuralCheckArgs};
use commands::monte_carlo::MonteCarloArgs;
use commands::valuation::{DcfArgs, PrefillArgs, ValuationArgs};

/// Falsifiable DCF equity valuations
#[derive(Parser)]
#[command(
    name = "eqval",
    version,
    about = "Falsifiable DCF equity valuations",
    long_about = "Computes DCF equity valuations under three terminal-value mechanisms \
                  and surrounds each point estimate with cross-checks: a structural \
                  audit of the assumption set, a reverse-DCF against the market price, \
                  and a correlated Monte Carlo over the key drivers."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full valuation pipeline (prefill, three terminal methods,
    /// structural check, Monte Carlo, reverse-DCF)
    Valuation(ValuationArgs),
    /// Prefill a complete DCF input set from a statement bundle
    Prefill(PrefillArgs),
    /// Run a single DCF under one terminal method
    Dcf(DcfArgs),
    /// Structural consistency audit of a DCF input set
    StructuralCheck(StructuralCheckArgs),
    /// Reverse-DCF: market-implied growth, margin, ROIC and fade speed
    MarketImplied(MarketImpliedArgs),
    /// Correlated Monte Carlo over the DCF drivers
    MonteCarlo(MonteCarloArgs),
    /// Print version
    Version,
}

#[derive(Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Valuation(args) => commands::valuation::run_valuation_command(args),
        Commands::Prefill(args) => commands::valuation::run_prefill(args),
        Commands::Dcf(args) => commands::valuation::run_dcf(args),
        Commands::StructuralCheck(args) => commands::checks::run_structural(args),
        Commands::MarketImplied(args) => commands::checks::run_market_implied(args),
        Commands::MonteCarlo(args) => commands::monte_carlo::run_monte_carlo_command(args),
        Commands::Version => {
            println!("eqval {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
