//! CLI for the factorbt backtesting engine.
//!
//! Loads an input panel (and optionally a daily price panel and a benchmark
//! series) from CSV, runs the engine, and prints or serializes the summary
//! report. Data acquisition and storage formats beyond CSV are the caller's
//! concern.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use factorbt::{BacktestConfig, Engine, IcMethod, SummaryReport, Weighting};
use polars::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "factorbt")]
#[command(about = "Quantile backtesting engine for cross-sectional factors", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest over a panel CSV
    Run {
        /// Panel CSV with entity_id, period, factor_value, forward_return, weight
        #[arg(long)]
        panel: PathBuf,
        /// Daily price CSV with entity_id, date, price
        #[arg(long)]
        daily: Option<PathBuf>,
        /// Benchmark CSV with period, return
        #[arg(long)]
        benchmark: Option<PathBuf>,
        /// Number of quantile buckets
        #[arg(long, default_value_t = 5)]
        buckets: usize,
        /// Weighting scheme: equal or value
        #[arg(long, default_value = "value")]
        weighting: String,
        /// IC method: rank or linear
        #[arg(long, default_value = "rank")]
        ic: String,
        /// First period to include (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Last period to include (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
        /// Rebalance periods per year
        #[arg(long, default_value_t = 12)]
        periods_per_year: usize,
        /// Newey-West lag override (default: auto)
        #[arg(long)]
        newey_west_lag: Option<usize>,
        /// Emit the full report as JSON instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Describe the expected input schemas
    Schema,
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            panel,
            daily,
            benchmark,
            buckets,
            weighting,
            ic,
            start,
            end,
            periods_per_year,
            newey_west_lag,
            json,
        } => run_backtest(
            &panel,
            daily.as_deref(),
            benchmark.as_deref(),
            buckets,
            &weighting,
            &ic,
            start.as_deref(),
            end.as_deref(),
            periods_per_year,
            newey_west_lag,
            json,
        ),
        Commands::Schema => {
            print_schema();
            Ok(())
        }
    };

    if let Err(message) = result {
        eprintln!("Error: {message}");
        std::process::exit(1);
    }
}

fn parse_weighting(raw: &str) -> Result<Weighting, String> {
    match raw {
        "equal" => Ok(Weighting::Equal),
        "value" => Ok(Weighting::Value),
        other => Err(format!("unknown weighting '{other}' (use equal or value)")),
    }
}

fn parse_ic_method(raw: &str) -> Result<IcMethod, String> {
    match raw {
        "rank" => Ok(IcMethod::Rank),
        "linear" => Ok(IcMethod::Linear),
        other => Err(format!("unknown IC method '{other}' (use rank or linear)")),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("invalid date '{raw}'"))
}

fn read_csv(path: &std::path::Path) -> Result<DataFrame, String> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(CsvReader::finish)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))
}

#[allow(clippy::too_many_arguments)]
fn run_backtest(
    panel_path: &std::path::Path,
    daily_path: Option<&std::path::Path>,
    benchmark_path: Option<&std::path::Path>,
    buckets: usize,
    weighting: &str,
    ic: &str,
    start: Option<&str>,
    end: Option<&str>,
    periods_per_year: usize,
    newey_west_lag: Option<usize>,
    json: bool,
) -> Result<(), String> {
    let config = BacktestConfig {
        num_buckets: buckets,
        weighting: parse_weighting(weighting)?,
        ic_method: parse_ic_method(ic)?,
        start_period: start.map(parse_date).transpose()?,
        end_period: end.map(parse_date).transpose()?,
        periods_per_year,
        newey_west_lag,
        daily_reconciliation: daily_path.is_some(),
    };

    let panel = read_csv(panel_path)?;
    let daily = daily_path.map(read_csv).transpose()?;
    let benchmark = benchmark_path.map(read_csv).transpose()?;

    let engine = Engine::new(config).map_err(|e| e.to_string())?;
    let report = engine
        .run(&panel, daily.as_ref(), benchmark.as_ref())
        .map_err(|e| e.to_string())?;

    if json {
        let serialized =
            serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{serialized}");
    } else {
        print_report(&report)?;
    }
    Ok(())
}

fn print_report(report: &SummaryReport) -> Result<(), String> {
    let table = report.to_frame().map_err(|e| e.to_string())?;
    println!("{table}");

    println!(
        "Periods: {} valid, {} excluded",
        report.valid_periods, report.excluded_periods
    );
    println!(
        "IC: mean {}, std {}, IR {}, NW t {} ({} obs)",
        fmt_opt(report.ic.mean),
        fmt_opt(report.ic.std),
        fmt_opt(report.ic.ir),
        fmt_opt(report.ic.t_stat),
        report.ic.observations,
    );
    println!(
        "Fama-MacBeth: premium {}, NW t {} ({} obs)",
        fmt_opt(report.fama_macbeth.premium),
        fmt_opt(report.fama_macbeth.t_stat),
        report.fama_macbeth.observations,
    );
    println!(
        "Factor rank autocorrelation: {}",
        fmt_opt(report.factor_autocorrelation)
    );

    if !report.diagnostics.is_empty() {
        println!("\nExcluded periods:");
        for diagnostic in &report.diagnostics {
            println!("  {}: {}", diagnostic.period, diagnostic.reason);
        }
    }
    if let Some(daily) = &report.daily {
        let frame = daily.to_frame().map_err(|e| e.to_string())?;
        println!("\nDaily reconstructed returns ({} days):", frame.height());
        println!("{frame}");
    }
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

fn print_schema() {
    println!("Input schemas (CSV with header row)\n");
    println!("panel:");
    println!("  entity_id       str   unique within a period");
    println!("  period          str   YYYY-MM-DD rebalance date");
    println!("  factor_value    f64   may be empty; unranked when missing");
    println!("  forward_return  f64   return realized after the period");
    println!("  weight          f64   non-negative, e.g. market cap");
    println!();
    println!("daily (optional, enables daily reconciliation):");
    println!("  entity_id       str");
    println!("  date            str   YYYY-MM-DD trading day");
    println!("  price           f64   may be empty on non-trading days");
    println!();
    println!("benchmark (optional, enables alpha/beta and active stats):");
    println!("  period          str   YYYY-MM-DD, matched exactly");
    println!("  return          f64");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighting_parsing() {
        assert_eq!(parse_weighting("equal").unwrap(), Weighting::Equal);
        assert_eq!(parse_weighting("value").unwrap(), Weighting::Value);
        assert!(parse_weighting("cap").is_err());
    }

    #[test]
    fn ic_method_parsing() {
        assert_eq!(parse_ic_method("rank").unwrap(), IcMethod::Rank);
        assert_eq!(parse_ic_method("linear").unwrap(), IcMethod::Linear);
        assert!(parse_ic_method("kendall").is_err());
    }

    #[test]
    fn date_parsing() {
        assert!(parse_date("2024-01-31").is_ok());
        assert!(parse_date("31/01/2024").is_err());
    }
}
