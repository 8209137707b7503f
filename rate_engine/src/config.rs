//! config.rs — Centralised configuration loaded from .env
//!
//! Every tunable of the analysis lives here: provider endpoint and retry
//! schedule, the user-facing controls (benchmark, lookback, horizon,
//! confidence), ARIMA search limits and the fixed short-rate parameters.
//! Loading happens once at startup; the pipeline borrows `&AppConfig`.
//!
//! The user-facing controls are closed types (`Benchmark`, `LookbackYears`,
//! `Horizon`, `ConfidenceLevel`) so an out-of-range value is rejected when
//! it is parsed, never inside a model.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::data::RetryPolicy;
use crate::error::{EngineError, Result};
use crate::models::arima::{ArimaSearch, InformationCriterion};
use crate::models::short_rate::ShortRateParams;
use crate::risk::ConfidenceLevel;

pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Trading days per year used for annualisation and the SDE time step.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Provider back-off schedule in seconds: attempt 1 immediately, then wait.
pub const DEFAULT_RETRY_SCHEDULE_SECS: [u64; 6] = [0, 5, 10, 20, 30, 60];

// ── Benchmarks ───────────────────────────────────────────────────────────

/// US Treasury yield benchmarks quoted by the provider in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Benchmark {
    Us5y,
    Us10y,
    Us30y,
}

impl Benchmark {
    pub const ALL: [Benchmark; 3] = [Benchmark::Us5y, Benchmark::Us10y, Benchmark::Us30y];

    /// Provider ticker symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Benchmark::Us5y => "^FVX",
            Benchmark::Us10y => "^TNX",
            Benchmark::Us30y => "^TYX",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Benchmark::Us5y => "US 5Y",
            Benchmark::Us10y => "US 10Y",
            Benchmark::Us30y => "US 30Y",
        }
    }
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.symbol())
    }
}

impl FromStr for Benchmark {
    type Err = EngineError;

    /// Accepts `10y`, `us10y`, `^TNX` or `TNX` (case-insensitive).
    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().trim_start_matches('^').to_ascii_lowercase();
        match key.as_str() {
            "5y" | "us5y" | "fvx" => Ok(Benchmark::Us5y),
            "10y" | "us10y" | "tnx" => Ok(Benchmark::Us10y),
            "30y" | "us30y" | "tyx" => Ok(Benchmark::Us30y),
            _ => Err(EngineError::Config(format!(
                "unknown benchmark '{s}' (expected 5y, 10y, 30y or ^FVX, ^TNX, ^TYX)"
            ))),
        }
    }
}

// ── Bounded integer controls ─────────────────────────────────────────────

/// Years of history to request, 1..=10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LookbackYears(u32);

impl LookbackYears {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 10;

    pub fn new(years: u32) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&years) {
            Ok(Self(years))
        } else {
            Err(EngineError::Config(format!(
                "lookback must be within {}..={} years, got {years}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl FromStr for LookbackYears {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let years = s
            .trim()
            .parse::<u32>()
            .map_err(|e| EngineError::Config(format!("lookback '{s}': {e}")))?;
        Self::new(years)
    }
}

/// Forecast horizon in business days, 1..=60.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Horizon(usize);

impl Horizon {
    pub const MIN: usize = 1;
    pub const MAX: usize = 60;

    pub fn new(days: usize) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&days) {
            Ok(Self(days))
        } else {
            Err(EngineError::Config(format!(
                "horizon must be within {}..={} days, got {days}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl FromStr for Horizon {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let days = s
            .trim()
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("horizon '{s}': {e}")))?;
        Self::new(days)
    }
}

// ── Simulation settings ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SimulationConfig {
    /// Independent Monte Carlo paths per model
    pub n_paths: usize,
    /// Paths kept verbatim in the report for plotting
    pub sample_paths: usize,
    pub vasicek: ShortRateParams,
    pub cir: ShortRateParams,
    /// Fixed seed for reproducible runs; fresh entropy when `None`
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_paths: 1000,
            sample_paths: 10,
            vasicek: ShortRateParams { kappa: 0.20, theta: 0.045, sigma: 0.015 },
            cir: ShortRateParams { kappa: 0.20, theta: 0.045, sigma: 0.07 },
            seed: None,
        }
    }
}

// ── Application config ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppConfig {
    // ── Provider ─────────────────────────────────────────────────────
    pub yahoo_base_url: String,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,

    // ── Default run controls ─────────────────────────────────────────
    pub benchmark: Benchmark,
    pub lookback: LookbackYears,
    pub horizon: Horizon,
    pub confidence: ConfidenceLevel,

    // ── Models ───────────────────────────────────────────────────────
    pub arima: ArimaSearch,
    /// Observations withheld by the holdout backtest
    pub backtest_holdout: usize,
    pub trading_days_per_year: f64,
    pub simulation: SimulationConfig,

    // ── Output ───────────────────────────────────────────────────────
    pub export_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            yahoo_base_url: DEFAULT_YAHOO_BASE_URL.into(),
            http_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            benchmark: Benchmark::Us10y,
            lookback: LookbackYears(5),
            horizon: Horizon(30),
            confidence: ConfidenceLevel::P95,
            arima: ArimaSearch::default(),
            backtest_holdout: 30,
            trading_days_per_year: TRADING_DAYS_PER_YEAR,
            simulation: SimulationConfig::default(),
            export_dir: PathBuf::from("./reports"),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables (after dotenv).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // ignore missing .env

        let d = Self::default();

        let retry = match env::var("FETCH_RETRY_SCHEDULE") {
            Ok(raw) => RetryPolicy::from_secs(&parse_list::<u64>("FETCH_RETRY_SCHEDULE", &raw)?)?,
            Err(_) => d.retry,
        };

        let seed = match env::var("SIMULATION_SEED") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| EngineError::Config(format!("Config key SIMULATION_SEED: {e}")))?,
            ),
            _ => None,
        };

        let cfg = Self {
            yahoo_base_url: env::var("YAHOO_BASE_URL").unwrap_or(d.yahoo_base_url),
            http_timeout: Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", 15u64)?),
            retry,

            benchmark: parse_env("DEFAULT_TICKER", d.benchmark)?,
            lookback: parse_env("LOOKBACK_YEARS", d.lookback)?,
            horizon: parse_env("FORECAST_HORIZON", d.horizon)?,
            confidence: parse_env("CONFIDENCE_LEVEL", d.confidence)?,

            arima: ArimaSearch {
                max_p: parse_env("ARIMA_MAX_P", d.arima.max_p)?,
                max_d: parse_env("ARIMA_MAX_D", d.arima.max_d)?,
                max_q: parse_env("ARIMA_MAX_Q", d.arima.max_q)?,
                criterion: parse_env("ARIMA_CRITERION", d.arima.criterion)?,
            },
            backtest_holdout: parse_env("BACKTEST_HOLDOUT", d.backtest_holdout)?,
            trading_days_per_year: parse_env("TRADING_DAYS_PER_YEAR", d.trading_days_per_year)?,
            simulation: SimulationConfig {
                n_paths: parse_env("SIM_PATHS", d.simulation.n_paths)?,
                sample_paths: parse_env("SAMPLE_PATHS", d.simulation.sample_paths)?,
                vasicek: ShortRateParams {
                    kappa: parse_env("VASICEK_KAPPA", d.simulation.vasicek.kappa)?,
                    theta: parse_env("VASICEK_THETA", d.simulation.vasicek.theta)?,
                    sigma: parse_env("VASICEK_SIGMA", d.simulation.vasicek.sigma)?,
                },
                cir: ShortRateParams {
                    kappa: parse_env("CIR_KAPPA", d.simulation.cir.kappa)?,
                    theta: parse_env("CIR_THETA", d.simulation.cir.theta)?,
                    sigma: parse_env("CIR_SIGMA", d.simulation.cir.sigma)?,
                },
                seed,
            },
            export_dir: env::var("EXPORT_DIR").map(PathBuf::from).unwrap_or(d.export_dir),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> Result<()> {
        if self.simulation.n_paths == 0 {
            return Err(EngineError::Config("SIM_PATHS must be positive".into()));
        }
        if self.trading_days_per_year <= 0.0 {
            return Err(EngineError::Config("TRADING_DAYS_PER_YEAR must be positive".into()));
        }
        if self.backtest_holdout == 0 {
            return Err(EngineError::Config("BACKTEST_HOLDOUT must be positive".into()));
        }
        if self.arima.max_d > 2 {
            return Err(EngineError::Config(format!(
                "ARIMA_MAX_D must be at most 2, got {}",
                self.arima.max_d
            )));
        }
        self.simulation.vasicek.validate()?;
        self.simulation.cir.validate()?;
        Ok(())
    }

    /// SDE time step: one trading day.
    pub fn dt(&self) -> f64 {
        1.0 / self.trading_days_per_year
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| EngineError::Config(format!("Config key {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn parse_list<T>(key: &str, raw: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| EngineError::Config(format!("Config key {key}: '{s}': {e}")))
        })
        .collect()
}

impl FromStr for InformationCriterion {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aic" => Ok(InformationCriterion::Aic),
            "bic" => Ok(InformationCriterion::Bic),
            other => Err(EngineError::Config(format!("unknown criterion '{other}' (aic|bic)"))),
        }
    }
}
