//! metrics.rs — Forecast accuracy and shared statistics
//!
//! ─────────────────────────────────────────────────────────────────────────
//! MATHEMATICAL SPECIFICATION
//! ─────────────────────────────────────────────────────────────────────────
//!
//! Given realised values y_t and forecasts ŷ_t, t = 1..n:
//!
//!   MAE  = (1/n) Σ |y_t − ŷ_t|
//!   RMSE = √[(1/n) Σ (y_t − ŷ_t)²]
//!   MAPE = (100/n) Σ |y_t − ŷ_t| / |y_t|     (terms with y_t = 0 skipped)
//!
//! Percentiles use linear interpolation between closest ranks:
//!
//!   h = q·(n−1),  P_q = x_⌊h⌋ + (h − ⌊h⌋)·(x_⌊h⌋+1 − x_⌊h⌋)
//! ─────────────────────────────────────────────────────────────────────────

use serde::Serialize;

use crate::error::{EngineError, Result};

/// Point-forecast error summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastAccuracy {
    pub n: usize,
    pub mae: f64,
    pub rmse: f64,
    /// Percent; `None` when every realised value is zero
    pub mape: Option<f64>,
}

impl std::fmt::Display for ForecastAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MAE {:.4}  RMSE {:.4}  MAPE ", self.mae, self.rmse)?;
        match self.mape {
            Some(m) => write!(f, "{m:.3}%"),
            None => f.write_str("n/a"),
        }
    }
}

/// Compare forecasts against realised values of the same length.
pub fn forecast_accuracy(realized: &[f64], predicted: &[f64]) -> Result<ForecastAccuracy> {
    if realized.len() != predicted.len() {
        return Err(EngineError::InvalidSeries(format!(
            "{} realised values vs {} forecasts",
            realized.len(),
            predicted.len()
        )));
    }
    if realized.is_empty() {
        return Err(EngineError::InsufficientData { required: 1, actual: 0 });
    }

    let n = realized.len();
    let errors: Vec<f64> = realized.iter().zip(predicted).map(|(y, f)| y - f).collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n as f64;
    let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n as f64).sqrt();

    let pct: Vec<f64> = realized
        .iter()
        .zip(&errors)
        .filter(|(y, _)| y.abs() > f64::EPSILON)
        .map(|(y, e)| 100.0 * e.abs() / y.abs())
        .collect();
    let mape = mean(&pct);

    Ok(ForecastAccuracy { n, mae, rmse, mape })
}

// ── Statistical helpers ───────────────────────────────────────────────────

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Sample variance (n − 1 denominator).
pub fn variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = data.iter().sum::<f64>() / data.len() as f64;
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

pub fn std_dev(data: &[f64]) -> f64 {
    variance(data).sqrt()
}

/// Percentile of an ascending-sorted slice, `q` in [0, 1].
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}
