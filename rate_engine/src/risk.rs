//! risk.rs — Parametric (Gaussian) Value-at-Risk and Expected Shortfall
//!
//! ─────────────────────────────────────────────────────────────────────────
//! MATHEMATICAL SPECIFICATION
//! ─────────────────────────────────────────────────────────────────────────
//!
//!   z   = Φ⁻¹(c)                      c ∈ (0, 1), confidence level
//!   VaR = σ · z
//!   ES  = σ · φ(z) / (1 − c)
//!
//! σ is a one-period volatility (the pipeline passes the latest GARCH
//! conditional volatility de-annualised to one trading day, in percent).
//! Both measures increase strictly with c for fixed σ > 0.
//! ─────────────────────────────────────────────────────────────────────────

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::error::{EngineError, Result};

/// The confidence levels offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConfidenceLevel {
    P90,
    P95,
    P99,
}

impl ConfidenceLevel {
    pub const ALL: [ConfidenceLevel; 3] = [ConfidenceLevel::P90, ConfidenceLevel::P95, ConfidenceLevel::P99];

    pub fn probability(self) -> f64 {
        match self {
            ConfidenceLevel::P90 => 0.90,
            ConfidenceLevel::P95 => 0.95,
            ConfidenceLevel::P99 => 0.99,
        }
    }

    /// Two-sided normal quantile for interval bands at this level.
    pub fn two_sided_z(self) -> Result<f64> {
        Ok(standard_normal()?.inverse_cdf(0.5 + self.probability() / 2.0))
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.probability() * 100.0)
    }
}

impl FromStr for ConfidenceLevel {
    type Err = EngineError;

    /// Accepts `0.95`, `95` or `95%`.
    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim().trim_end_matches('%');
        let value: f64 = raw
            .parse()
            .map_err(|e| EngineError::Config(format!("confidence '{s}': {e}")))?;
        let p = if value > 1.0 { value / 100.0 } else { value };
        ConfidenceLevel::ALL
            .into_iter()
            .find(|c| (c.probability() - p).abs() < 1e-9)
            .ok_or_else(|| EngineError::Config(format!("confidence must be one of 0.90, 0.95, 0.99, got {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskMetrics {
    pub volatility: f64,
    pub confidence: f64,
    pub z: f64,
    pub value_at_risk: f64,
    pub expected_shortfall: f64,
}

impl RiskMetrics {
    pub fn parametric(volatility: f64, confidence: ConfidenceLevel) -> Result<Self> {
        parametric_from_probability(volatility, confidence.probability())
    }
}

/// Gaussian VaR / ES for any confidence strictly inside (0, 1).
pub fn parametric_from_probability(volatility: f64, confidence: f64) -> Result<RiskMetrics> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(EngineError::Config(format!("confidence must lie in (0, 1), got {confidence}")));
    }
    if !volatility.is_finite() || volatility < 0.0 {
        return Err(EngineError::Degenerate(format!("volatility must be finite and non-negative, got {volatility}")));
    }

    let normal = standard_normal()?;
    let z = normal.inverse_cdf(confidence);
    Ok(RiskMetrics {
        volatility,
        confidence,
        z,
        value_at_risk: volatility * z,
        expected_shortfall: volatility * normal.pdf(z) / (1.0 - confidence),
    })
}

pub(crate) fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| EngineError::Config(format!("standard normal: {e}")))
}
