//! fetch_data.rs — Download benchmark close histories to Parquet
//!
//! Writes `<out-dir>/<SYMBOL>/<SYMBOL>_<YYYYmmdd>.parquet` per ticker, ready
//! for `rate_terminal analyze --data-file`.
//!
//! Usage:
//!   cargo run --bin fetch_data
//!   cargo run --bin fetch_data -- --tickers 10y,30y --lookback-years 10

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use rate_engine::config::{AppConfig, Benchmark, LookbackYears};
use rate_engine::data::{fetch_with_retry, FetchOutcome, YahooChartClient};
use rate_terminal::store::write_quotes_parquet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fetch_data")]
#[command(about = "Download treasury yield histories to Parquet")]
struct FetchArgs {
    /// Comma-separated benchmarks (all three when omitted)
    #[arg(long, value_delimiter = ',')]
    tickers: Vec<Benchmark>,

    #[arg(long, default_value = "data")]
    out_dir: PathBuf,

    #[arg(long)]
    lookback_years: Option<LookbackYears>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    dotenvy::dotenv().ok();
    let args = FetchArgs::parse();
    let config = AppConfig::from_env()?;

    let tickers = if args.tickers.is_empty() { Benchmark::ALL.to_vec() } else { args.tickers };
    let years = args.lookback_years.unwrap_or(config.lookback).get();
    let client = YahooChartClient::new(&config.yahoo_base_url, config.http_timeout)?;
    let stamp = Utc::now().format("%Y%m%d");

    println!("Target tickers: {:?}", tickers.iter().map(|b| b.symbol()).collect::<Vec<_>>());

    for benchmark in tickers {
        let symbol = benchmark.symbol();
        match fetch_with_retry(&client, symbol, years, &config.retry).await {
            FetchOutcome::Fetched { quotes, attempts } => {
                let name = symbol.trim_start_matches('^');
                let path = args.out_dir.join(name).join(format!("{name}_{stamp}.parquet"));
                info!("{symbol}: {} rows after {attempts} attempt(s)", quotes.len());
                write_quotes_parquet(&quotes, &path)?;
            }
            FetchOutcome::Exhausted { attempts, last_error } => {
                warn!(
                    "{symbol}: no data after {attempts} attempts ({})",
                    last_error.as_deref().unwrap_or("empty response")
                );
            }
        }
    }
    Ok(())
}
