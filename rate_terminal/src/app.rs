//! app.rs — Command-line surface of the rate terminal
//!
//! Usage:
//!   rate_terminal analyze --ticker 10y --lookback-years 5 --horizon 30 --confidence 0.95
//!   rate_terminal analyze --order 1,1,1 --data-file data/TNX/TNX_20240501.parquet --json
//!   rate_terminal simulate --r0 4.25 --horizon 60 --seed 7

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rate_engine::config::{AppConfig, Benchmark, Horizon, LookbackYears};
use rate_engine::data::{PriceSource, YahooChartClient};
use rate_engine::export::export_report;
use rate_engine::models::arima::{ArimaOrder, ArimaSpec};
use rate_engine::models::short_rate::{simulate, simulation_rng, ShortRateModel};
use rate_engine::pipeline::{AnalysisOutcome, AnalysisRequest, MaximumLikelihood, Pipeline};
use rate_engine::risk::ConfidenceLevel;
use tracing::{info, warn};

use crate::store::ParquetPriceSource;

#[derive(Parser, Debug)]
#[command(name = "rate_terminal")]
#[command(about = "Interest-rate analytics: ARIMA, GARCH, Vasicek/CIR Monte Carlo, VaR/ES")]
#[command(version)]
pub struct Cli {
    /// Environment file loaded before the process environment is read
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a benchmark and run every model
    Analyze(AnalyzeArgs),

    /// Short-rate Monte Carlo only, from a given starting rate
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Benchmark: 5y, 10y, 30y or ^FVX, ^TNX, ^TYX
    #[arg(short, long)]
    pub ticker: Option<Benchmark>,

    /// Years of history (1-10)
    #[arg(short, long)]
    pub lookback_years: Option<LookbackYears>,

    /// Forecast horizon in business days (1-60)
    #[arg(long)]
    pub horizon: Option<Horizon>,

    /// 0.90, 0.95 or 0.99
    #[arg(short, long)]
    pub confidence: Option<ConfidenceLevel>,

    /// Manual ARIMA order p,d,q (automatic search when omitted)
    #[arg(long)]
    pub order: Option<ArimaOrder>,

    /// Read history from a Parquet file instead of the provider
    #[arg(long)]
    pub data_file: Option<PathBuf>,

    /// Seed for reproducible simulations
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory for the CSV/JSON export
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Also write the full JSON report
    #[arg(long)]
    pub json: bool,

    /// Skip writing export files
    #[arg(long)]
    pub no_export: bool,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Starting rate in percent (e.g. 4.25)
    #[arg(long)]
    pub r0: f64,

    /// Steps to simulate (1-60)
    #[arg(long)]
    pub horizon: Option<Horizon>,

    /// Number of Monte Carlo paths
    #[arg(long)]
    pub paths: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,
}

pub struct TerminalApp {
    cli: Cli,
}

impl TerminalApp {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    pub async fn run(&self) -> Result<()> {
        let config = AppConfig::from_env()?;
        match &self.cli.command {
            Commands::Analyze(args) => self.analyze(config, args).await,
            Commands::Simulate(args) => self.simulate(config, args),
        }
    }

    async fn analyze(&self, mut config: AppConfig, args: &AnalyzeArgs) -> Result<()> {
        if args.seed.is_some() {
            config.simulation.seed = args.seed;
        }
        if let Some(dir) = &args.output_dir {
            config.export_dir = dir.clone();
        }

        let request = AnalysisRequest {
            benchmark: args.ticker.unwrap_or(config.benchmark),
            lookback: args.lookback_years.unwrap_or(config.lookback),
            horizon: args.horizon.unwrap_or(config.horizon),
            confidence: args.confidence.unwrap_or(config.confidence),
            arima: args.order.map_or(ArimaSpec::Auto, ArimaSpec::Manual),
        };

        match &args.data_file {
            Some(path) => {
                info!("Using stored history {}", path.display());
                self.analyze_with(ParquetPriceSource::new(path), config, &request, args).await
            }
            None => {
                let client = YahooChartClient::new(&config.yahoo_base_url, config.http_timeout)?;
                self.analyze_with(client, config, &request, args).await
            }
        }
    }

    async fn analyze_with<S: PriceSource>(
        &self,
        source: S,
        config: AppConfig,
        request: &AnalysisRequest,
        args: &AnalyzeArgs,
    ) -> Result<()> {
        let export_dir = config.export_dir.clone();
        let suite = MaximumLikelihood::from_config(&config);
        let pipeline = Pipeline::new(source, suite, config);

        let outcome = pipeline.run(request).await;
        println!("{outcome}");

        match outcome {
            AnalysisOutcome::DataUnavailable { .. } => {
                warn!("Run finished without data; nothing exported");
            }
            AnalysisOutcome::Completed(report) if !args.no_export => {
                let paths = export_report(&report, &export_dir, args.json)?;
                println!("Forecast table: {}", paths.csv.display());
                if args.json {
                    println!("JSON report:    {}", paths.json.display());
                }
            }
            AnalysisOutcome::Completed(_) => {}
        }
        Ok(())
    }

    fn simulate(&self, config: AppConfig, args: &SimulateArgs) -> Result<()> {
        let horizon = args.horizon.unwrap_or(config.horizon).get();
        let n_paths = args.paths.unwrap_or(config.simulation.n_paths);
        let seed = args.seed.or(config.simulation.seed);
        let r0 = args.r0 / 100.0;
        let mut rng = simulation_rng(seed);

        for (model, params) in [
            (ShortRateModel::Vasicek, config.simulation.vasicek),
            (ShortRateModel::Cir, config.simulation.cir),
        ] {
            match simulate(model, &params, r0, n_paths, horizon, config.dt(), &mut rng) {
                Ok(set) => {
                    let s = set.summary(0);
                    println!("{model}  κ={} θ={} σ={}  ({} paths)", params.kappa, params.theta, params.sigma, n_paths);
                    if let Some(feller) = s.feller {
                        println!("  Feller condition {}", if feller { "satisfied" } else { "violated" });
                    }
                    println!("  {:>4} {:>9} {:>9} {:>9}", "step", "p05", "median", "p95");
                    for t in 0..horizon {
                        println!("  {:>4} {:>9.4} {:>9.4} {:>9.4}", t, s.p05[t], s.median[t], s.p95[t]);
                    }
                }
                Err(e) => println!("{model}: unavailable: {e}"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_flags_parse_into_domain_types() {
        let cli = Cli::try_parse_from([
            "rate_terminal", "analyze",
            "--ticker", "30y",
            "--lookback-years", "3",
            "--horizon", "45",
            "--confidence", "0.99",
            "--order", "2,1,1",
            "--seed", "11",
            "--json",
        ])
        .unwrap();

        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.ticker, Some(Benchmark::Us30y));
        assert_eq!(args.lookback_years.map(LookbackYears::get), Some(3));
        assert_eq!(args.horizon.map(Horizon::get), Some(45));
        assert_eq!(args.confidence, Some(ConfidenceLevel::P99));
        assert_eq!(args.order, Some("2,1,1".parse().unwrap()));
        assert_eq!(args.seed, Some(11));
        assert!(args.json);
    }

    #[test]
    fn out_of_range_values_are_rejected_by_the_parser() {
        for bad in [
            vec!["rate_terminal", "analyze", "--horizon", "61"],
            vec!["rate_terminal", "analyze", "--lookback-years", "0"],
            vec!["rate_terminal", "analyze", "--confidence", "0.5"],
            vec!["rate_terminal", "analyze", "--ticker", "2y"],
            vec!["rate_terminal", "analyze", "--order", "1,3,1"],
        ] {
            assert!(Cli::try_parse_from(bad.iter().copied()).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn simulate_requires_starting_rate() {
        assert!(Cli::try_parse_from(["rate_terminal", "simulate"]).is_err());
        let cli = Cli::try_parse_from(["rate_terminal", "simulate", "--r0", "4.2", "--paths", "50"]).unwrap();
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.r0, 4.2);
        assert_eq!(args.paths, Some(50));
    }
}
