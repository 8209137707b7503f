//! pipeline.rs — One analysis run, end to end
//!
//!   fetch_with_retry ──► Exhausted ──► DataUnavailable (stop)
//!         │
//!         ▼
//!   PriceSeries::from_quotes ──► ReturnSeries
//!         │
//!         ├─ ARIMA fit + forecast         Stage::Arima
//!         ├─ residual diagnostics         Stage::Diagnostics
//!         ├─ GARCH(1,1) on returns        Stage::Garch
//!         ├─ VaR / ES from last σ         Stage::Risk
//!         ├─ Vasicek / CIR Monte Carlo    Stage::Vasicek, Stage::Cir
//!         └─ holdout backtest             Stage::Backtest
//!         │
//!         ▼
//!   AnalysisOutcome::Completed(AnalysisReport)
//!
//! Stages run in order on the calling task.  A failing stage is recorded as
//! a `StageError` in its slot and the remaining stages still run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::backtest::{holdout_backtest, BacktestReport};
use crate::config::{AppConfig, Benchmark, Horizon, LookbackYears};
use crate::data::{fetch_with_retry, FetchOutcome, PriceSource};
use crate::diagnostics::{ResidualDiagnostics, DEFAULT_LJUNG_BOX_LAGS};
use crate::error::{Result, Stage, StageError, StageResult};
use crate::models::arima::{ArimaModel, ArimaSearch, ArimaSpec, ForecastResult};
use crate::models::garch::{Garch11, GarchFit, VolRegime};
use crate::models::short_rate::{simulate, simulation_rng, ShortRateModel, SimulationSummary};
use crate::risk::{ConfidenceLevel, RiskMetrics};
use crate::series::PriceSeries;

/// The user's choices for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub benchmark: Benchmark,
    pub lookback: LookbackYears,
    pub horizon: Horizon,
    pub confidence: ConfidenceLevel,
    pub arima: ArimaSpec,
}

impl AnalysisRequest {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            benchmark: cfg.benchmark,
            lookback: cfg.lookback,
            horizon: cfg.horizon,
            confidence: cfg.confidence,
            arima: ArimaSpec::Auto,
        }
    }
}

/// Estimation procedures used by the pipeline.
pub trait ModelSuite {
    fn fit_arima(&self, y: &[f64], spec: &ArimaSpec) -> Result<ArimaModel>;
    fn fit_garch(&self, returns: &[f64]) -> Result<GarchFit>;
}

/// Likelihood-based ARIMA and GARCH estimation.
#[derive(Debug, Clone)]
pub struct MaximumLikelihood {
    pub search: ArimaSearch,
    pub periods_per_year: f64,
}

impl MaximumLikelihood {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self { search: cfg.arima, periods_per_year: cfg.trading_days_per_year }
    }
}

impl ModelSuite for MaximumLikelihood {
    fn fit_arima(&self, y: &[f64], spec: &ArimaSpec) -> Result<ArimaModel> {
        ArimaModel::fit_spec(y, spec, &self.search)
    }

    fn fit_garch(&self, returns: &[f64]) -> Result<GarchFit> {
        Garch11::fit(returns, self.periods_per_year)
    }
}

// ── Report types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ArimaStage {
    pub model: ArimaModel,
    pub forecast: ForecastResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct GarchStage {
    pub fit: GarchFit,
    /// Dates of the conditional volatility series (the return dates)
    pub dates: Vec<NaiveDate>,
    pub regime: VolRegime,
    /// Annualised σ forecasts for each horizon step
    pub term_structure: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyMetrics {
    pub current_rate: f64,
    pub final_forecast: Option<f64>,
    pub annual_volatility: Option<f64>,
    pub value_at_risk: Option<f64>,
    pub expected_shortfall: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub benchmark: Benchmark,
    pub ticker: String,
    pub lookback_years: u32,
    pub horizon: usize,
    pub confidence: ConfidenceLevel,
    pub observations: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub key_metrics: KeyMetrics,
    pub arima: StageResult<ArimaStage>,
    pub diagnostics: StageResult<ResidualDiagnostics>,
    pub garch: StageResult<GarchStage>,
    pub risk: StageResult<RiskMetrics>,
    pub vasicek: StageResult<SimulationSummary>,
    pub cir: StageResult<SimulationSummary>,
    pub backtest: StageResult<BacktestReport>,
}

impl AnalysisReport {
    /// Every stage that failed, in pipeline order.
    pub fn failures(&self) -> Vec<&StageError> {
        [
            self.arima.as_ref().err(),
            self.diagnostics.as_ref().err(),
            self.garch.as_ref().err(),
            self.risk.as_ref().err(),
            self.vasicek.as_ref().err(),
            self.cir.as_ref().err(),
            self.backtest.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    DataUnavailable { ticker: String, attempts: usize, last_error: Option<String> },
    Completed(Box<AnalysisReport>),
}

// ── Pipeline ─────────────────────────────────────────────────────────────

pub struct Pipeline<S, M> {
    source: S,
    models: M,
    config: AppConfig,
}

impl<S: PriceSource, M: ModelSuite> Pipeline<S, M> {
    pub fn new(source: S, models: M, config: AppConfig) -> Self {
        Self { source, models, config }
    }

    /// Fetch, prepare and model one benchmark.  Never returns an error.
    pub async fn run(&self, req: &AnalysisRequest) -> AnalysisOutcome {
        let ticker = req.benchmark.symbol();
        info!(
            "Analysis run: {} | {}y lookback | {}d horizon | {}",
            req.benchmark,
            req.lookback.get(),
            req.horizon.get(),
            req.confidence
        );

        let (quotes, attempts) =
            match fetch_with_retry(&self.source, ticker, req.lookback.get(), &self.config.retry).await {
                FetchOutcome::Fetched { quotes, attempts } => (quotes, attempts),
                FetchOutcome::Exhausted { attempts, last_error } => {
                    warn!("No data for {ticker} after {attempts} attempts");
                    return AnalysisOutcome::DataUnavailable { ticker: ticker.to_owned(), attempts, last_error };
                }
            };

        match PriceSeries::from_quotes(&quotes) {
            Ok(series) => AnalysisOutcome::Completed(Box::new(self.analyze(req, &series))),
            Err(e) => {
                warn!("Provider data for {ticker} unusable: {e}");
                AnalysisOutcome::DataUnavailable {
                    ticker: ticker.to_owned(),
                    attempts,
                    last_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Run every modelling stage on a prepared series.
    pub fn analyze(&self, req: &AnalysisRequest, series: &PriceSeries) -> AnalysisReport {
        let horizon = req.horizon.get();
        let current_rate = series.last_value();
        info!(
            "{} observations {} → {}, last {:.3}%",
            series.len(),
            series.dates()[0],
            series.last_date(),
            current_rate
        );

        // ── ARIMA ────────────────────────────────────────────────────────
        let arima = stage(Stage::Arima, self.models.fit_arima(series.values(), &req.arima).and_then(|model| {
            let forecast = model.forecast(series.last_date(), horizon, req.confidence)?;
            Ok(ArimaStage { model, forecast })
        }));

        let diagnostics = match &arima {
            Ok(a) => stage(
                Stage::Diagnostics,
                ResidualDiagnostics::compute(a.model.residuals(), DEFAULT_LJUNG_BOX_LAGS),
            ),
            Err(e) => Err(StageError::new(Stage::Diagnostics, format!("no ARIMA model ({})", e.message))),
        };

        // ── GARCH + risk ─────────────────────────────────────────────────
        let garch = stage(
            Stage::Garch,
            series.returns().and_then(|returns| {
                let fit = self.models.fit_garch(returns.values())?;
                Ok(GarchStage {
                    regime: fit.regime(),
                    term_structure: fit.term_structure(horizon),
                    dates: returns.dates().to_vec(),
                    fit,
                })
            }),
        );

        let risk = match &garch {
            Ok(g) => stage(Stage::Risk, RiskMetrics::parametric(g.fit.last_daily(), req.confidence)),
            Err(e) => Err(StageError::new(Stage::Risk, format!("no volatility estimate ({})", e.message))),
        };

        // ── Short-rate Monte Carlo ───────────────────────────────────────
        let sim = &self.config.simulation;
        let r0 = current_rate / 100.0;
        let mut rng = simulation_rng(sim.seed);
        let vasicek = stage(
            Stage::Vasicek,
            simulate(ShortRateModel::Vasicek, &sim.vasicek, r0, sim.n_paths, horizon, self.config.dt(), &mut rng)
                .map(|set| set.summary(sim.sample_paths)),
        );
        let cir = stage(
            Stage::Cir,
            simulate(ShortRateModel::Cir, &sim.cir, r0, sim.n_paths, horizon, self.config.dt(), &mut rng)
                .map(|set| set.summary(sim.sample_paths)),
        );

        // ── Backtest ─────────────────────────────────────────────────────
        let backtest = stage(
            Stage::Backtest,
            holdout_backtest(series, self.config.backtest_holdout, |train| {
                self.models.fit_arima(train, &req.arima)
            }),
        );

        let key_metrics = KeyMetrics {
            current_rate,
            final_forecast: arima.as_ref().ok().and_then(|a| a.forecast.points.last().map(|p| p.mean)),
            annual_volatility: garch.as_ref().ok().map(|g| g.fit.last_annualized()),
            value_at_risk: risk.as_ref().ok().map(|r| r.value_at_risk),
            expected_shortfall: risk.as_ref().ok().map(|r| r.expected_shortfall),
        };

        let report = AnalysisReport {
            generated_at: Utc::now(),
            benchmark: req.benchmark,
            ticker: req.benchmark.symbol().to_owned(),
            lookback_years: req.lookback.get(),
            horizon,
            confidence: req.confidence,
            observations: series.len(),
            first_date: series.dates()[0],
            last_date: series.last_date(),
            key_metrics,
            arima,
            diagnostics,
            garch,
            risk,
            vasicek,
            cir,
            backtest,
        };
        info!("Analysis complete: {} stage failure(s)", report.failures().len());
        report
    }
}

fn stage<T>(stage: Stage, result: Result<T>) -> StageResult<T> {
    result.map_err(|e| {
        warn!("{stage} failed: {e}");
        StageError::new(stage, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{RawQuote, RetryPolicy};
    use crate::error::{DataError, EngineError};
    use crate::series::{business_days_from, is_business_day, next_business_day};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DownSource {
        calls: AtomicUsize,
    }

    impl PriceSource for DownSource {
        async fn fetch_history(&self, _t: &str, _y: u32) -> std::result::Result<Vec<RawQuote>, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DataError::Provider { code: "429".into(), description: "Too Many Requests".into() })
        }
    }

    struct FixedSource {
        quotes: Vec<RawQuote>,
    }

    impl PriceSource for FixedSource {
        async fn fetch_history(&self, _t: &str, _y: u32) -> std::result::Result<Vec<RawQuote>, DataError> {
            Ok(self.quotes.clone())
        }
    }

    #[derive(Default)]
    struct CountingSuite {
        arima_calls: AtomicUsize,
        garch_calls: AtomicUsize,
    }

    impl ModelSuite for CountingSuite {
        fn fit_arima(&self, _y: &[f64], _spec: &ArimaSpec) -> Result<ArimaModel> {
            self.arima_calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::estimation("ARIMA", "not under test"))
        }

        fn fit_garch(&self, _r: &[f64]) -> Result<GarchFit> {
            self.garch_calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::estimation("GARCH", "not under test"))
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            retry: RetryPolicy::immediate(6).unwrap(),
            simulation: crate::config::SimulationConfig { n_paths: 200, seed: Some(1), ..Default::default() },
            ..AppConfig::default()
        }
    }

    fn request(horizon: usize) -> AnalysisRequest {
        AnalysisRequest {
            horizon: Horizon::new(horizon).unwrap(),
            ..AnalysisRequest::from_config(&AppConfig::default())
        }
    }

    fn trend_quotes(n: usize) -> Vec<RawQuote> {
        let mut rng = StdRng::seed_from_u64(2024);
        let noise = Normal::new(0.0, 0.2).unwrap();
        business_days_from(NaiveDate::from_ymd_opt(2022, 3, 1).unwrap(), n)
            .into_iter()
            .enumerate()
            .map(|(t, date)| RawQuote {
                date,
                close: Some(100.0 + 0.05 * t as f64 + noise.sample(&mut rng)),
            })
            .collect()
    }

    #[tokio::test]
    async fn exhausted_fetch_never_reaches_models() {
        let pipeline = Pipeline::new(
            DownSource { calls: AtomicUsize::new(0) },
            CountingSuite::default(),
            test_config(),
        );
        match pipeline.run(&request(30)).await {
            AnalysisOutcome::DataUnavailable { ticker, attempts, last_error } => {
                assert_eq!(ticker, "^TNX");
                assert_eq!(attempts, 6);
                assert!(last_error.unwrap().contains("429"));
            }
            other => panic!("expected DataUnavailable, got {other:?}"),
        }
        assert_eq!(pipeline.source.calls.load(Ordering::SeqCst), 6);
        assert_eq!(pipeline.models.arima_calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.models.garch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_models_are_isolated_per_stage() {
        let pipeline = Pipeline::new(FixedSource { quotes: trend_quotes(120) }, CountingSuite::default(), test_config());
        let AnalysisOutcome::Completed(report) = pipeline.run(&request(10)).await else {
            panic!("expected a report");
        };
        assert_eq!(report.arima.as_ref().unwrap_err().stage, Stage::Arima);
        assert_eq!(report.garch.as_ref().unwrap_err().stage, Stage::Garch);
        assert_eq!(report.risk.as_ref().unwrap_err().stage, Stage::Risk);
        assert!(report.backtest.is_err());
        // simulations do not depend on the fitted models
        assert_eq!(report.vasicek.as_ref().unwrap().median.len(), 10);
        assert!(report.cir.is_ok());
        assert_eq!(report.key_metrics.final_forecast, None);
    }

    #[tokio::test]
    async fn trend_run_forecasts_and_beats_naive() {
        let config = test_config();
        let suite = MaximumLikelihood::from_config(&config);
        let pipeline = Pipeline::new(FixedSource { quotes: trend_quotes(500) }, suite, config);
        let AnalysisOutcome::Completed(report) = pipeline.run(&request(10)).await else {
            panic!("expected a report");
        };

        assert_eq!(report.observations, 500);
        let arima = report.arima.as_ref().unwrap();
        assert_eq!(arima.forecast.len(), 10);
        assert_eq!(report.vasicek.as_ref().unwrap().median.len(), 10);
        assert_eq!(report.cir.as_ref().unwrap().median.len(), 10);
        assert_eq!(arima.forecast.points[0].date, next_business_day(report.last_date));
        assert!(arima.forecast.points.iter().all(|p| is_business_day(p.date)));

        let bt = report.backtest.as_ref().unwrap();
        assert_eq!(bt.predicted.len(), 30);
        assert!(bt.model.mae <= bt.naive.mae, "ARIMA {} vs naive {}", bt.model.mae, bt.naive.mae);

        let garch = report.garch.as_ref().unwrap();
        assert_eq!(garch.fit.conditional_volatility.len(), 499);
        assert_eq!(garch.dates.len(), 499);
        // risk runs on the last daily conditional σ
        let risk = report.risk.as_ref().unwrap();
        assert_eq!(risk.volatility, garch.fit.last_daily());
        assert!(report.failures().is_empty(), "{:?}", report.failures());
    }

    #[test]
    fn negative_rate_skips_cir_only() {
        let dates = business_days_from(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 80);
        let values: Vec<f64> = (0..80).map(|t| -0.5 + 0.01 * (t % 7) as f64).collect();
        let series = PriceSeries::new(dates, values).unwrap();
        let pipeline = Pipeline::new(DownSource { calls: AtomicUsize::new(0) }, CountingSuite::default(), test_config());
        let report = pipeline.analyze(&request(5), &series);
        assert!(report.vasicek.is_ok());
        assert_eq!(report.cir.as_ref().unwrap_err().stage, Stage::Cir);
    }
}
