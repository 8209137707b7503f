//! diagnostics.rs — Residual checks for the fitted ARIMA model
//!
//! ─────────────────────────────────────────────────────────────────────────
//! MATHEMATICAL SPECIFICATION
//! ─────────────────────────────────────────────────────────────────────────
//!
//! Sample autocorrelation at lag k:
//!   ρ̂_k = Σ_{t=k+1..n} (e_t − ē)(e_{t−k} − ē) / Σ_t (e_t − ē)²
//!
//! Ljung–Box portmanteau (H₀: no autocorrelation up to lag m):
//!   Q = n(n+2) Σ_{k=1..m} ρ̂_k² / (n − k)  ~  χ²_m
//!
//! Jarque–Bera normality (H₀: skewness 0, excess kurtosis 0):
//!   JB = n/6 · (S² + K²/4)  ~  χ²_2
//!   S = m₃ / m₂^{3/2},   K = m₄ / m₂² − 3   (population moments)
//! ─────────────────────────────────────────────────────────────────────────

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::error::{EngineError, Result};
use crate::metrics::{mean, std_dev};

pub const DEFAULT_LJUNG_BOX_LAGS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestStatistic {
    pub statistic: f64,
    pub p_value: f64,
    pub df: usize,
}

impl TestStatistic {
    /// H₀ rejected at `alpha`.
    pub fn rejects(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResidualDiagnostics {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    /// ρ̂_1..ρ̂_m
    pub acf: Vec<f64>,
    pub ljung_box: TestStatistic,
    pub jarque_bera: TestStatistic,
}

impl ResidualDiagnostics {
    pub fn compute(residuals: &[f64], lags: usize) -> Result<Self> {
        let n = residuals.len();
        if lags == 0 || n <= lags + 1 {
            return Err(EngineError::InsufficientData { required: lags + 2, actual: n });
        }
        let sd = std_dev(residuals);
        if sd <= 0.0 || !sd.is_finite() {
            return Err(EngineError::Degenerate("residuals have zero variance".into()));
        }
        let m = mean(residuals).unwrap_or(0.0);

        let acf = autocorrelation(residuals, lags);
        let ljung_box = ljung_box(&acf, n)?;

        let (skewness, excess_kurtosis) = shape(residuals, m);
        let jb = n as f64 / 6.0 * (skewness.powi(2) + excess_kurtosis.powi(2) / 4.0);
        let jarque_bera = TestStatistic { statistic: jb, p_value: chi2_sf(jb, 2)?, df: 2 };

        Ok(Self { n, mean: m, std_dev: sd, skewness, excess_kurtosis, acf, ljung_box, jarque_bera })
    }
}

/// ρ̂_1..ρ̂_lags.
pub fn autocorrelation(x: &[f64], lags: usize) -> Vec<f64> {
    let n = x.len();
    let m = x.iter().sum::<f64>() / n as f64;
    let denom: f64 = x.iter().map(|v| (v - m).powi(2)).sum();
    (1..=lags)
        .map(|k| {
            if k >= n || denom == 0.0 {
                return 0.0;
            }
            (k..n).map(|t| (x[t] - m) * (x[t - k] - m)).sum::<f64>() / denom
        })
        .collect()
}

fn ljung_box(acf: &[f64], n: usize) -> Result<TestStatistic> {
    let nf = n as f64;
    let q = nf
        * (nf + 2.0)
        * acf
            .iter()
            .enumerate()
            .map(|(i, r)| r * r / (nf - (i + 1) as f64))
            .sum::<f64>();
    Ok(TestStatistic { statistic: q, p_value: chi2_sf(q, acf.len())?, df: acf.len() })
}

fn shape(x: &[f64], m: f64) -> (f64, f64) {
    let n = x.len() as f64;
    let m2 = x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
    let m3 = x.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n;
    let m4 = x.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n;
    (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
}

fn chi2_sf(x: f64, df: usize) -> Result<f64> {
    let dist = ChiSquared::new(df as f64)
        .map_err(|e| EngineError::Config(format!("χ² with {df} degrees of freedom: {e}")))?;
    Ok(1.0 - dist.cdf(x))
}
