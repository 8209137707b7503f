//! error.rs — Error taxonomy for the quantitative core
//!
//! `DataError` covers the provider boundary (HTTP, payload, provider-side
//! error objects).  `EngineError` covers everything downstream: invalid
//! configuration values, degenerate series and optimiser failures.
//! The pipeline never lets either escape; it wraps them in a `StageError`
//! naming the stage that failed.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {code}: {description}")]
    Provider { code: String, description: String },

    #[error("malformed provider payload: {0}")]
    Malformed(String),

    #[error("failed to read stored history: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("degenerate input: {0}")]
    Degenerate(String),

    #[error("invalid series: {0}")]
    InvalidSeries(String),

    #[error("{model} estimation failed: {reason}")]
    Estimation { model: &'static str, reason: String },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),
}

impl EngineError {
    pub(crate) fn estimation(model: &'static str, reason: impl fmt::Display) -> Self {
        EngineError::Estimation { model, reason: reason.to_string() }
    }
}

/// Pipeline stage names used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Arima,
    Garch,
    Vasicek,
    Cir,
    Risk,
    Backtest,
    Diagnostics,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Arima => "ARIMA forecast",
            Stage::Garch => "GARCH volatility",
            Stage::Vasicek => "Vasicek simulation",
            Stage::Cir => "CIR simulation",
            Stage::Risk => "Risk metrics",
            Stage::Backtest => "Backtest",
            Stage::Diagnostics => "Residual diagnostics",
        };
        f.write_str(label)
    }
}

/// A failure caught at a stage boundary.  Carries the message only, so a
/// report holding it stays cloneable and serialisable.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{stage}: {message}")]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, err: impl fmt::Display) -> Self {
        Self { stage, message: err.to_string() }
    }
}

pub type StageResult<T> = std::result::Result<T, StageError>;
