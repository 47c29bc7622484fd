//! QuoteFeed CLI — fetch, history, stored-data and sync commands.
//!
//! Commands:
//! - `intraday` — latest intraday bars (synthetic fallback on transient failures)
//! - `daily` — daily/weekly/monthly adjusted series
//! - `history` — daily points within a date range, optionally exported as CSV
//! - `stored intraday|daily` — read committed records without calling upstream
//! - `sync` — refresh stored daily history for several symbols

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use quotefeed_core::data::{
    stored_daily, stored_intraday, sync_daily, FeedResponse, JsonFileStore, MarketDataService,
    StdoutProgress,
};
use quotefeed_core::domain::{DataType, Interval, OutputSize, SeriesPoints};
use quotefeed_core::logging::{init_logging, LogConfig};
use quotefeed_core::FeedConfig;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "quotefeed",
    about = "QuoteFeed — normalized stock time series with a local record store"
)]
struct Cli {
    /// TOML config file. Environment variables override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Record store directory (overrides config and QUOTEFEED_STORE_DIR).
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the latest intraday bars for a symbol.
    Intraday {
        symbol: String,

        /// Bar interval: 1min, 5min, 15min, 30min or 60min.
        #[arg(long, default_value = "5min", value_parser = parse_interval)]
        interval: Interval,

        /// Request the full trailing window instead of the latest 100 bars.
        #[arg(long, default_value_t = false)]
        full: bool,
    },
    /// Fetch a daily, weekly or monthly adjusted series.
    Daily {
        symbol: String,

        /// Series period: daily, weekly or monthly.
        #[arg(long, default_value = "daily", value_parser = parse_period)]
        period: DataType,

        /// Request full history instead of the latest 100 points.
        #[arg(long, default_value_t = false)]
        full: bool,
    },
    /// Fetch daily points between two dates (inclusive).
    History {
        symbol: String,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Write the points to this CSV file instead of printing JSON.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Read committed records from the store.
    Stored {
        #[command(subcommand)]
        action: StoredAction,
    },
    /// Refresh stored daily history for several symbols.
    Sync {
        /// Symbols to sync (e.g., IBM MSFT AAPL).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Request full history for each symbol.
        #[arg(long, default_value_t = false)]
        full: bool,
    },
}

#[derive(Subcommand)]
enum StoredAction {
    /// Latest stored intraday snapshot.
    Intraday {
        symbol: String,

        #[arg(long, default_value = "5min", value_parser = parse_interval)]
        interval: Interval,
    },
    /// Stored daily points between two dates (inclusive).
    Daily {
        symbol: String,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    if let Err(e) = init_logging(&LogConfig::from_env().with_default_level(level)) {
        eprintln!("warning: {e}");
    }

    let config = load_config(cli.config.as_deref(), cli.store_dir)?;

    match cli.command {
        Commands::Intraday {
            symbol,
            interval,
            full,
        } => {
            let service = MarketDataService::from_config(&config)?;
            let resp = service.intraday(&symbol, interval, output_size(full))?;
            print_response(&resp)
        }
        Commands::Daily {
            symbol,
            period,
            full,
        } => {
            let service = MarketDataService::from_config(&config)?;
            let resp = service.periodic(&symbol, period, output_size(full))?;
            print_response(&resp)
        }
        Commands::History {
            symbol,
            start,
            end,
            csv,
        } => {
            let (start, end) = parse_range(&start, end.as_deref())?;
            let service = MarketDataService::from_config(&config)?;
            let resp = service.historical(&symbol, start, end)?;
            match csv {
                Some(path) => {
                    report_notices(&resp);
                    write_points_csv(&path, &resp)?;
                    println!("Wrote {} points to {}", resp.series.points.len(), path.display());
                    Ok(())
                }
                None => print_response(&resp),
            }
        }
        Commands::Stored { action } => {
            let store = JsonFileStore::new(config.store_dir.clone());
            let found = match action {
                StoredAction::Intraday { symbol, interval } => {
                    stored_intraday(&store, &symbol, interval)?
                }
                StoredAction::Daily { symbol, start, end } => {
                    let (start, end) = parse_range(&start, end.as_deref())?;
                    stored_daily(&store, &symbol, start, end)?
                }
            };
            match found {
                Some(resp) => print_response(&resp),
                None => bail!("no stored records under {}", store.root().display()),
            }
        }
        Commands::Sync { symbols, full } => {
            let service = MarketDataService::from_config(&config)?;
            let sym_refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
            let summary = sync_daily(&service, &sym_refs, output_size(full), &StdoutProgress);

            if !summary.all_succeeded() {
                for (sym, err) in &summary.errors {
                    eprintln!("Error for {sym}: {err}");
                }
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Defaults, then the optional TOML file, then environment, then flags.
fn load_config(path: Option<&Path>, store_dir: Option<PathBuf>) -> Result<FeedConfig> {
    let mut config = match path {
        Some(path) => FeedConfig::from_file(path)?,
        None => FeedConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(dir) = store_dir {
        config.store_dir = dir;
    }
    Ok(config)
}

fn output_size(full: bool) -> OutputSize {
    if full {
        OutputSize::Full
    } else {
        OutputSize::Compact
    }
}

fn parse_interval(s: &str) -> Result<Interval, String> {
    s.parse()
}

fn parse_period(s: &str) -> Result<DataType, String> {
    match s.trim().to_lowercase().as_str() {
        "daily" => Ok(DataType::Daily),
        "weekly" => Ok(DataType::Weekly),
        "monthly" => Ok(DataType::Monthly),
        other => Err(format!("unsupported period '{other}' (expected daily, weekly or monthly)")),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}' (expected YYYY-MM-DD)"))
}

fn parse_range(start: &str, end: Option<&str>) -> Result<(NaiveDate, NaiveDate)> {
    let start = parse_date(start)?;
    let end = match end {
        Some(end) => parse_date(end)?,
        None => chrono::Local::now().date_naive(),
    };
    Ok((start, end))
}

fn report_notices(resp: &FeedResponse) {
    if resp.is_fallback() {
        warn!(symbol = %resp.series.metadata.symbol, "upstream unavailable; output is synthetic");
    }
    for notice in &resp.notices {
        warn!(source = ?resp.source, "{notice}");
    }
}

/// Print the series as pretty JSON on stdout; notices go to the log.
fn print_response(resp: &FeedResponse) -> Result<()> {
    report_notices(resp);
    let json = serde_json::to_string_pretty(&resp.series).context("Failed to serialize series")?;
    println!("{json}");
    Ok(())
}

fn write_points_csv(path: &Path, resp: &FeedResponse) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV {}", path.display()))?;
    writer.write_record([
        "timestamp",
        "open",
        "high",
        "low",
        "close",
        "adjusted_close",
        "volume",
        "dividend_amount",
        "split_coefficient",
    ])?;

    match &resp.series.points {
        SeriesPoints::Daily(points) => {
            for (date, p) in points {
                writer.write_record([
                    date.clone(),
                    format!("{:.4}", p.open),
                    format!("{:.4}", p.high),
                    format!("{:.4}", p.low),
                    format!("{:.4}", p.close),
                    format!("{:.4}", p.adjusted_close),
                    p.volume.to_string(),
                    format!("{:.4}", p.dividend_amount),
                    p.split_coefficient.to_string(),
                ])?;
            }
        }
        SeriesPoints::Intraday(bars) => {
            for (ts, bar) in bars {
                writer.write_record([
                    ts.as_str(),
                    bar.open.as_str(),
                    bar.high.as_str(),
                    bar.low.as_str(),
                    bar.close.as_str(),
                    bar.close.as_str(),
                    bar.volume.as_str(),
                    "0",
                    "1",
                ])?;
            }
        }
    }

    writer
        .flush()
        .with_context(|| format!("Failed to write CSV {}", path.display()))?;
    Ok(())
}
