//! models/garch.rs — GARCH(1,1) Volatility Estimation
//!
//! ─────────────────────────────────────────────────────────────────────────
//! MATHEMATICAL SPECIFICATION
//! ─────────────────────────────────────────────────────────────────────────
//!
//! GARCH(1,1): Bollerslev (1986), constant mean
//!
//!   Return innovation:  ε_t = r_t − μ
//!   Conditional variance update:
//!
//! ```text
//!       σ²_t = ω  +  α · ε²_{t-1}  +  β · σ²_{t-1},     σ²_0 = Var(r)
//! ```
//!
//!   Constraints (covariance stationarity):
//!     ω > 0,  α ≥ 0,  β ≥ 0,  α + β < 1
//!
//!   Long-run (unconditional) variance:
//!       σ²_∞ = ω / (1 − α − β)
//!
//!   Multi-step forecast (h-step ahead):
//!       σ²_{t+h} = σ²_∞ + (α+β)^(h-1) · (σ²_{t+1} − σ²_∞)
//!
//!   Annualised volatility (returns in percent):
//!       σ_annual = √(σ²_t · 252)
//!
//!   Estimation (Gaussian quasi-ML):
//!       −ℓ(μ,ω,α,β) = ½ Σ_t [ ln 2π + ln σ²_t + ε²_t / σ²_t ]
//!     minimised by Nelder–Mead; infeasible points cost a fixed penalty.
//!
//!   Regime classification (annualised σ in percent):
//!     - LOW:    σ_annual < 25
//!     - NORMAL: 25 ≤ σ_annual < 50
//!     - HIGH:   σ_annual ≥ 50
//! ─────────────────────────────────────────────────────────────────────────

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::metrics::{mean, variance};
use crate::models::optim::{initial_simplex, minimize, SimplexOptions, PENALTY};

const MIN_OBSERVATIONS: usize = 30;

const LOW_VOL_ANNUAL: f64 = 25.0;
const HIGH_VOL_ANNUAL: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VolRegime {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GarchParams {
    pub mu: f64,
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl GarchParams {
    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    pub fn is_stationary(&self) -> bool {
        self.omega > 0.0 && self.alpha >= 0.0 && self.beta >= 0.0 && self.persistence() < 1.0
    }

    pub fn long_run_variance(&self) -> f64 {
        self.omega / (1.0 - self.persistence())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Garch11 {
    /// ω: long-run variance weight
    pub omega: f64,
    /// α: ARCH (shock) coefficient
    pub alpha: f64,
    /// β: GARCH (persistence) coefficient
    pub beta: f64,
    /// Conditional variance for the next observation
    pub sigma2: f64,
    /// Annualisation factor (trading days per year)
    pub periods_per_year: f64,
}

impl Garch11 {
    /// Construct GARCH(1,1) starting at the long-run variance σ²_∞.
    pub fn new(omega: f64, alpha: f64, beta: f64, periods_per_year: f64) -> Result<Self> {
        let p = GarchParams { mu: 0.0, omega, alpha, beta };
        if !p.is_stationary() {
            return Err(EngineError::Config(format!(
                "GARCH covariance stationarity requires ω>0, α,β≥0, α+β<1; got ω={omega}, α={alpha}, β={beta}"
            )));
        }
        Ok(Self { omega, alpha, beta, sigma2: p.long_run_variance(), periods_per_year })
    }

    /// Feed one innovation ε_t = r_t − μ; `sigma2` becomes σ²_{t+1}.
    pub fn update(&mut self, r: f64, mu: f64) {
        let eps = r - mu;
        self.sigma2 = self.omega + self.alpha * eps * eps + self.beta * self.sigma2;
    }

    /// σ_annual = √(σ² · periods_per_year)
    pub fn sigma_annual(&self) -> f64 {
        (self.sigma2 * self.periods_per_year).sqrt()
    }

    pub fn long_run_variance(&self) -> f64 {
        self.omega / (1.0 - self.alpha - self.beta)
    }

    /// h-step ahead variance forecast (h ≥ 1).
    pub fn forecast_variance(&self, h: usize) -> f64 {
        let persistence = self.alpha + self.beta;
        let longrun = self.long_run_variance();
        longrun + persistence.powi(h.max(1) as i32 - 1) * (self.sigma2 - longrun)
    }

    pub fn regime(&self) -> VolRegime {
        classify(self.sigma_annual())
    }

    /// Fit constant-mean GARCH(1,1) to percent returns by quasi-ML.
    pub fn fit(returns: &[f64], periods_per_year: f64) -> Result<GarchFit> {
        if returns.len() < MIN_OBSERVATIONS {
            return Err(EngineError::InsufficientData { required: MIN_OBSERVATIONS, actual: returns.len() });
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(EngineError::InvalidSeries("returns contain NaN or infinite values".into()));
        }
        let var_r = variance(returns);
        if var_r <= 1e-14 {
            return Err(EngineError::Degenerate("returns have zero variance".into()));
        }
        let mean_r = mean(returns).unwrap_or(0.0);
        let sd_r = var_r.sqrt();

        // Optimise in scale-free coordinates: μ/sd, ω/Var, α, β.
        let unscale = |x: &[f64]| GarchParams {
            mu: x[0] * sd_r,
            omega: x[1] * var_r,
            alpha: x[2],
            beta: x[3],
        };
        let objective = |x: &[f64]| {
            let p = unscale(x);
            if !p.is_stationary() {
                return PENALTY;
            }
            -log_likelihood(&p, returns, var_r)
        };

        let x0 = [mean_r / sd_r, 0.04, 0.08, 0.88];
        let steps = [0.05, 0.02, 0.04, 0.04];
        let opts = SimplexOptions { max_iters: 3000, ..Default::default() };
        let (x_hat, nll) = minimize("GARCH", objective, initial_simplex(&x0, &steps), opts)?;
        let params = unscale(&x_hat);
        debug!(
            "GARCH fit: μ={:.5} ω={:.6} α={:.4} β={:.4} −ℓ={nll:.3}",
            params.mu, params.omega, params.alpha, params.beta
        );

        let mut model = Garch11 {
            omega: params.omega,
            alpha: params.alpha,
            beta: params.beta,
            sigma2: var_r,
            periods_per_year,
        };
        let variances = garch_filter(&mut model, returns, params.mu);

        let conditional_volatility: Vec<f64> = variances.iter().map(|v| v.sqrt()).collect();
        let annualized_volatility: Vec<f64> =
            variances.iter().map(|v| (v * periods_per_year).sqrt()).collect();

        let fit = GarchFit {
            params,
            log_likelihood: -nll,
            n_obs: returns.len(),
            conditional_volatility,
            annualized_volatility,
            model,
        };
        info!(
            "GARCH(1,1): α+β={:.4}, current σ_annual={:.2}%, regime {:?}",
            params.persistence(),
            fit.last_annualized(),
            fit.regime()
        );
        Ok(fit)
    }
}

/// Run GARCH(1,1) over a return series and return σ²_t for every t.
/// σ²_t is the variance in force when r_t is observed.
pub fn garch_filter(garch: &mut Garch11, returns: &[f64], mu: f64) -> Vec<f64> {
    let mut variances = Vec::with_capacity(returns.len());
    for &r in returns {
        variances.push(garch.sigma2);
        garch.update(r, mu);
    }
    variances
}

fn log_likelihood(p: &GarchParams, returns: &[f64], sigma2_0: f64) -> f64 {
    let ln_2pi = (2.0 * std::f64::consts::PI).ln();
    let mut s2 = sigma2_0;
    let mut ll = 0.0;
    for &r in returns {
        if s2 <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let eps = r - p.mu;
        ll -= 0.5 * (ln_2pi + s2.ln() + eps * eps / s2);
        s2 = p.omega + p.alpha * eps * eps + p.beta * s2;
    }
    ll
}

fn classify(sigma_annual: f64) -> VolRegime {
    if sigma_annual < LOW_VOL_ANNUAL {
        VolRegime::Low
    } else if sigma_annual < HIGH_VOL_ANNUAL {
        VolRegime::Normal
    } else {
        VolRegime::High
    }
}

/// A fitted GARCH(1,1) with its in-sample volatility path.
#[derive(Debug, Clone, Serialize)]
pub struct GarchFit {
    pub params: GarchParams,
    pub log_likelihood: f64,
    pub n_obs: usize,
    /// Daily σ_t (percent), index-aligned with the input returns
    pub conditional_volatility: Vec<f64>,
    /// √(σ²_t · 252)
    pub annualized_volatility: Vec<f64>,
    #[serde(skip)]
    model: Garch11,
}

impl GarchFit {
    /// Annualised conditional volatility at the last observation.
    pub fn last_annualized(&self) -> f64 {
        self.annualized_volatility.last().copied().unwrap_or(f64::NAN)
    }

    /// Daily conditional volatility at the last observation.
    pub fn last_daily(&self) -> f64 {
        self.conditional_volatility.last().copied().unwrap_or(f64::NAN)
    }

    pub fn regime(&self) -> VolRegime {
        classify(self.last_annualized())
    }

    /// Annualised volatility forecasts for steps 1..=h.
    pub fn term_structure(&self, h: usize) -> Vec<f64> {
        (1..=h)
            .map(|k| (self.model.forecast_variance(k) * self.model.periods_per_year).sqrt())
            .collect()
    }

    /// AIC with four estimated parameters (μ, ω, α, β).
    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood + 2.0 * 4.0
    }
}
