//! report.rs — Plain-text rendering of an analysis run

use std::fmt;

use crate::error::StageResult;
use crate::pipeline::{AnalysisOutcome, AnalysisReport};

const RULE: &str = "════════════════════════════════════════════════════════";
const THIN: &str = "────────────────────────────────────────────────────────";

fn opt(v: Option<f64>, unit: &str) -> String {
    v.map_or_else(|| "n/a".to_owned(), |x| format!("{x:.4}{unit}"))
}

/// Writes the failure line; returns the stage value when it succeeded.
fn section<'a, T>(f: &mut fmt::Formatter<'_>, r: &'a StageResult<T>) -> Result<Option<&'a T>, fmt::Error> {
    match r {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            writeln!(f, "  unavailable: {}", e.message)?;
            Ok(None)
        }
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "  RATE TERMINAL — {}", self.benchmark)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "  History        : {} obs, {} → {}", self.observations, self.first_date, self.last_date)?;
        writeln!(f, "  Lookback       : {}y   Horizon: {}d   Confidence: {}", self.lookback_years, self.horizon, self.confidence)?;
        writeln!(f, "  Current rate   : {:.4}%", self.key_metrics.current_rate)?;
        writeln!(f, "  Final forecast : {}", opt(self.key_metrics.final_forecast, "%"))?;
        writeln!(f, "  GARCH σ annual : {}", opt(self.key_metrics.annual_volatility, "%"))?;
        writeln!(f, "  Daily VaR      : {}", opt(self.key_metrics.value_at_risk, "%"))?;
        writeln!(f, "  Daily ES       : {}", opt(self.key_metrics.expected_shortfall, "%"))?;

        writeln!(f, "{THIN}\n  ARIMA")?;
        if let Some(a) = section(f, &self.arima)? {
            let m = &a.model;
            writeln!(f, "  Order {}  AIC {:.2}  BIC {:.2}  logL {:.2}  σ² {:.6}", m.order, m.aic, m.bic, m.log_likelihood, m.sigma2)?;
            if let Some(c) = m.intercept {
                writeln!(f, "  Intercept {c:.6}")?;
            }
            if !m.ar.is_empty() {
                writeln!(f, "  AR {:?}", m.ar.iter().map(|v| format!("{v:.4}")).collect::<Vec<_>>())?;
            }
            if !m.ma.is_empty() {
                writeln!(f, "  MA {:?}", m.ma.iter().map(|v| format!("{v:.4}")).collect::<Vec<_>>())?;
            }
            writeln!(f, "  {:<12} {:>10} {:>10} {:>10}", "date", "forecast", "lower", "upper")?;
            for p in &a.forecast.points {
                writeln!(f, "  {:<12} {:>10.4} {:>10.4} {:>10.4}", p.date.to_string(), p.mean, p.lower, p.upper)?;
            }
        }

        writeln!(f, "{THIN}\n  Residual diagnostics")?;
        if let Some(d) = section(f, &self.diagnostics)? {
            writeln!(f, "  mean {:.5}  std {:.5}  skew {:.3}  ex.kurt {:.3}", d.mean, d.std_dev, d.skewness, d.excess_kurtosis)?;
            writeln!(f, "  Ljung–Box Q({}) {:.3}  p={:.4}", d.ljung_box.df, d.ljung_box.statistic, d.ljung_box.p_value)?;
            writeln!(f, "  Jarque–Bera   {:.3}  p={:.4}", d.jarque_bera.statistic, d.jarque_bera.p_value)?;
        }

        writeln!(f, "{THIN}\n  GARCH(1,1)")?;
        if let Some(g) = section(f, &self.garch)? {
            let p = &g.fit.params;
            writeln!(f, "  μ {:.5}  ω {:.6}  α {:.4}  β {:.4}  α+β {:.4}", p.mu, p.omega, p.alpha, p.beta, p.persistence())?;
            writeln!(f, "  σ annual {:.2}%  regime {:?}  logL {:.2}  AIC {:.2}", g.fit.last_annualized(), g.regime, g.fit.log_likelihood, g.fit.aic())?;
            if let Some(last) = g.term_structure.last() {
                writeln!(f, "  σ annual at horizon {:.2}%", last)?;
            }
        }

        writeln!(f, "{THIN}\n  Risk ({})", self.confidence)?;
        if let Some(r) = section(f, &self.risk)? {
            writeln!(f, "  σ daily {:.4}%  z {:.4}  VaR {:.4}%  ES {:.4}%", r.volatility, r.z, r.value_at_risk, r.expected_shortfall)?;
        }

        for (label, sim) in [("Vasicek", &self.vasicek), ("CIR", &self.cir)] {
            writeln!(f, "{THIN}\n  {label} Monte Carlo")?;
            if let Some(s) = section(f, sim)? {
                let p = &s.params;
                writeln!(f, "  κ {:.3}  θ {:.4}  σ {:.4}  paths {}", p.kappa, p.theta, p.sigma, s.n_paths)?;
                if let Some(feller) = s.feller {
                    writeln!(f, "  Feller 2κθ ≥ σ²: {}", if feller { "satisfied" } else { "violated" })?;
                }
                if let (Some(m), Some(lo), Some(hi)) = (s.median.last(), s.p05.last(), s.p95.last()) {
                    writeln!(f, "  terminal median {m:.4}%  [{lo:.4}%, {hi:.4}%] (5–95%)")?;
                }
            }
        }

        writeln!(f, "{THIN}\n  Backtest")?;
        if let Some(b) = section(f, &self.backtest)? {
            writeln!(f, "  ARIMA{} on last {} obs (train ends {})", b.order, b.holdout, b.train_end)?;
            writeln!(f, "  model : {}", b.model)?;
            writeln!(f, "  naive : {}", b.naive)?;
        }
        write!(f, "{RULE}")
    }
}

impl fmt::Display for AnalysisOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisOutcome::Completed(report) => write!(f, "{report}"),
            AnalysisOutcome::DataUnavailable { ticker, attempts, last_error } => {
                writeln!(f, "Data for {ticker} is unavailable after {attempts} attempts.")?;
                if let Some(e) = last_error {
                    writeln!(f, "Last error: {e}")?;
                }
                write!(f, "The provider may be rate limiting; try again in a few minutes.")
            }
        }
    }
}
