//! rate_engine — quantitative core of the rate terminal.
//!
//! Fetches benchmark yield histories, prepares business-day series and runs
//! ARIMA, GARCH(1,1), Vasicek/CIR Monte Carlo, parametric VaR/ES and a
//! holdout backtest.  `pipeline::Pipeline` ties the stages together.

pub mod backtest;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod risk;
pub mod series;

pub use config::{AppConfig, Benchmark, Horizon, LookbackYears};
pub use error::{DataError, EngineError, Result, Stage, StageError};
pub use models::arima::{ArimaOrder, ArimaSpec};
pub use pipeline::{AnalysisOutcome, AnalysisReport, AnalysisRequest, MaximumLikelihood, ModelSuite, Pipeline};
pub use risk::ConfidenceLevel;
