//! models/short_rate.rs — Vasicek and CIR short-rate Monte Carlo
//!
//! ─────────────────────────────────────────────────────────────────────────
//! MATHEMATICAL SPECIFICATION
//! ─────────────────────────────────────────────────────────────────────────
//!
//! Vasicek (Ornstein–Uhlenbeck in the rate):
//!
//!   dr_t = κ(θ − r_t)dt + σ dW_t
//!
//! Cox–Ingersoll–Ross:
//!
//!   dr_t = κ(θ − r_t)dt + σ √r_t dW_t
//!
//!   κ = mean-reversion speed,  θ = long-run level,  σ = diffusion
//!
//! EULER–MARUYAMA (Δt = 1/252, dW ~ N(0, √Δt) per path per step):
//!
//!   Vasicek:  r_{t+1} = r_t + κ(θ − r_t)Δt + σ dW
//!   CIR:      r_{t+1} = max(0, r_t + κ(θ − r_t)Δt + σ √max(r_t, 0) dW)
//!
//! Path matrix shape (n_paths, horizon); column 0 is r₀ for every row.
//! Rates are decimals internally (r₀ = yield% / 100) and reported ×100.
//!
//! FELLER CONDITION (CIR stays strictly positive in continuous time):
//!
//!   2κθ ≥ σ²
//!
//! Mean-reversion half-life:  t½ = ln 2 / κ  (years)
//! ─────────────────────────────────────────────────────────────────────────

use std::fmt;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::metrics::percentile_sorted;

/// Fixed (κ, θ, σ) of a one-factor short-rate model, decimal units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShortRateParams {
    pub kappa: f64,
    pub theta: f64,
    pub sigma: f64,
}

impl ShortRateParams {
    pub fn validate(&self) -> Result<()> {
        if ![self.kappa, self.theta, self.sigma].iter().all(|v| v.is_finite()) {
            return Err(EngineError::Config(format!("short-rate parameters must be finite: {self:?}")));
        }
        if self.kappa <= 0.0 {
            return Err(EngineError::Config(format!("κ must be positive, got {}", self.kappa)));
        }
        if self.sigma < 0.0 {
            return Err(EngineError::Config(format!("σ must be non-negative, got {}", self.sigma)));
        }
        Ok(())
    }

    /// 2κθ ≥ σ²
    pub fn feller(&self) -> bool {
        2.0 * self.kappa * self.theta >= self.sigma * self.sigma
    }

    /// ln 2 / κ, in years.
    pub fn half_life(&self) -> f64 {
        std::f64::consts::LN_2 / self.kappa
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShortRateModel {
    Vasicek,
    Cir,
}

impl ShortRateModel {
    /// One Euler–Maruyama step.
    #[inline]
    pub fn step(self, r: f64, p: &ShortRateParams, dt: f64, dw: f64) -> f64 {
        let drift = p.kappa * (p.theta - r) * dt;
        match self {
            ShortRateModel::Vasicek => r + drift + p.sigma * dw,
            ShortRateModel::Cir => (r + drift + p.sigma * r.max(0.0).sqrt() * dw).max(0.0),
        }
    }
}

impl fmt::Display for ShortRateModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShortRateModel::Vasicek => f.write_str("Vasicek"),
            ShortRateModel::Cir => f.write_str("CIR"),
        }
    }
}

/// Seeded generator when a seed is given, OS entropy otherwise.
pub fn simulation_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Simulate `n_paths` paths of `horizon` points starting at `r0`.
pub fn simulate<R: Rng + ?Sized>(
    model: ShortRateModel,
    params: &ShortRateParams,
    r0: f64,
    n_paths: usize,
    horizon: usize,
    dt: f64,
    rng: &mut R,
) -> Result<SimulationPathSet> {
    params.validate()?;
    if n_paths == 0 || horizon == 0 {
        return Err(EngineError::Config(format!(
            "simulation needs at least one path and one step, got {n_paths}×{horizon}"
        )));
    }
    if !(dt.is_finite() && dt > 0.0) {
        return Err(EngineError::Config(format!("time step must be positive, got {dt}")));
    }
    if !r0.is_finite() {
        return Err(EngineError::Degenerate(format!("initial rate is not finite: {r0}")));
    }
    if model == ShortRateModel::Cir && r0 < 0.0 {
        return Err(EngineError::Degenerate(format!(
            "CIR not applicable: initial rate {:.4}% is negative",
            r0 * 100.0
        )));
    }
    if model == ShortRateModel::Cir && !params.feller() {
        debug!("CIR Feller condition violated: 2κθ={:.5} < σ²={:.5}", 2.0 * params.kappa * params.theta, params.sigma.powi(2));
    }

    let normal = Normal::new(0.0, dt.sqrt())
        .map_err(|e| EngineError::Config(format!("Brownian increment: {e}")))?;

    let mut paths = Array2::<f64>::zeros((n_paths, horizon));
    for i in 0..n_paths {
        paths[[i, 0]] = r0;
        for t in 1..horizon {
            let dw = normal.sample(&mut *rng);
            paths[[i, t]] = model.step(paths[[i, t - 1]], params, dt, dw);
        }
    }

    info!("{model}: simulated {n_paths} paths × {horizon} steps from r0={:.4}%", r0 * 100.0);
    Ok(SimulationPathSet { model, params: *params, paths })
}

/// Simulated paths, decimal units, shape (n_paths, horizon).
#[derive(Debug, Clone)]
pub struct SimulationPathSet {
    pub model: ShortRateModel,
    pub params: ShortRateParams,
    pub paths: Array2<f64>,
}

impl SimulationPathSet {
    pub fn n_paths(&self) -> usize {
        self.paths.nrows()
    }

    pub fn horizon(&self) -> usize {
        self.paths.ncols()
    }

    /// Per-step median across paths.
    pub fn median(&self) -> Vec<f64> {
        self.percentile(0.5)
    }

    /// Per-step percentile across paths, `q` in [0, 1].
    pub fn percentile(&self, q: f64) -> Vec<f64> {
        self.paths
            .columns()
            .into_iter()
            .map(|col| {
                let mut v = col.to_vec();
                v.sort_by(f64::total_cmp);
                percentile_sorted(&v, q)
            })
            .collect()
    }

    /// Percent-unit summary with the first `samples` paths.
    pub fn summary(&self, samples: usize) -> SimulationSummary {
        let pct = |v: Vec<f64>| v.into_iter().map(|x| x * 100.0).collect::<Vec<_>>();
        let sample_paths = self
            .paths
            .rows()
            .into_iter()
            .take(samples)
            .map(|row| row.iter().map(|x| x * 100.0).collect())
            .collect();
        SimulationSummary {
            model: self.model,
            params: self.params,
            feller: (self.model == ShortRateModel::Cir).then(|| self.params.feller()),
            n_paths: self.n_paths(),
            r0_percent: self.paths[[0, 0]] * 100.0,
            median: pct(self.median()),
            p05: pct(self.percentile(0.05)),
            p95: pct(self.percentile(0.95)),
            sample_paths,
        }
    }
}

/// Aggregated simulation output in percent.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub model: ShortRateModel,
    pub params: ShortRateParams,
    /// Only reported for CIR
    pub feller: Option<bool>,
    pub n_paths: usize,
    pub r0_percent: f64,
    pub median: Vec<f64>,
    pub p05: Vec<f64>,
    pub p95: Vec<f64>,
    pub sample_paths: Vec<Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f64 = 1.0 / 252.0;

    fn vasicek() -> ShortRateParams {
        ShortRateParams { kappa: 0.20, theta: 0.045, sigma: 0.015 }
    }

    #[test]
    fn path_matrix_shape_and_start() {
        let mut rng = simulation_rng(Some(1));
        let set = simulate(ShortRateModel::Vasicek, &vasicek(), 0.042, 1000, 30, DT, &mut rng).unwrap();
        assert_eq!(set.paths.dim(), (1000, 30));
        assert!(set.paths.column(0).iter().all(|r| *r == 0.042));
        assert_eq!(set.median().len(), 30);
    }

    #[test]
    fn cir_never_negative() {
        // σ far above Feller bound, r0 near zero
        let p = ShortRateParams { kappa: 0.2, theta: 0.01, sigma: 0.6 };
        assert!(!p.feller());
        let mut rng = simulation_rng(Some(9));
        let set = simulate(ShortRateModel::Cir, &p, 0.001, 500, 60, DT, &mut rng).unwrap();
        assert!(set.paths.iter().all(|r| *r >= 0.0));
    }

    #[test]
    fn cir_rejects_negative_start_vasicek_does_not() {
        let mut rng = simulation_rng(Some(2));
        let p = vasicek();
        assert!(matches!(
            simulate(ShortRateModel::Cir, &p, -0.001, 10, 5, DT, &mut rng),
            Err(EngineError::Degenerate(_))
        ));
        assert!(simulate(ShortRateModel::Vasicek, &p, -0.001, 10, 5, DT, &mut rng).is_ok());
    }

    #[test]
    fn zero_volatility_follows_drift() {
        let p = ShortRateParams { kappa: 0.5, theta: 0.05, sigma: 0.0 };
        let mut rng = simulation_rng(Some(3));
        let set = simulate(ShortRateModel::Vasicek, &p, 0.03, 2, 4, DT, &mut rng).unwrap();
        let mut r = 0.03;
        for t in 1..4 {
            r += 0.5 * (0.05 - r) * DT;
            assert_relative_eq!(set.paths[[0, t]], r, epsilon = 1e-15);
            assert_relative_eq!(set.paths[[1, t]], r, epsilon = 1e-15);
        }
    }

    #[test]
    fn seeded_runs_reproduce() {
        let a = simulate(ShortRateModel::Cir, &vasicek(), 0.04, 50, 20, DT, &mut simulation_rng(Some(7))).unwrap();
        let b = simulate(ShortRateModel::Cir, &vasicek(), 0.04, 50, 20, DT, &mut simulation_rng(Some(7))).unwrap();
        assert_eq!(a.paths, b.paths);
    }

    #[test]
    fn summary_bands_are_ordered_and_in_percent() {
        let mut rng = simulation_rng(Some(11));
        let set = simulate(ShortRateModel::Vasicek, &vasicek(), 0.042, 400, 25, DT, &mut rng).unwrap();
        let s = set.summary(10);
        assert_eq!(s.sample_paths.len(), 10);
        assert_relative_eq!(s.r0_percent, 4.2, epsilon = 1e-12);
        assert_relative_eq!(s.median[0], 4.2, epsilon = 1e-12);
        assert!(s.feller.is_none());
        for t in 0..25 {
            assert!(s.p05[t] <= s.median[t] && s.median[t] <= s.p95[t]);
        }
    }

    #[test]
    fn parameter_validation_and_feller() {
        assert!(ShortRateParams { kappa: 0.0, theta: 0.04, sigma: 0.01 }.validate().is_err());
        assert!(ShortRateParams { kappa: 0.2, theta: 0.04, sigma: -0.01 }.validate().is_err());
        assert!(ShortRateParams { kappa: 0.2, theta: f64::NAN, sigma: 0.01 }.validate().is_err());
        // CIR defaults: 2·0.2·0.045 = 0.018 ≥ 0.0049
        assert!(ShortRateParams { kappa: 0.20, theta: 0.045, sigma: 0.07 }.feller());
        assert_relative_eq!(vasicek().half_life(), std::f64::consts::LN_2 / 0.2);
    }

    #[test]
    fn rejects_empty_shapes() {
        let mut rng = simulation_rng(Some(4));
        assert!(simulate(ShortRateModel::Vasicek, &vasicek(), 0.04, 0, 10, DT, &mut rng).is_err());
        assert!(simulate(ShortRateModel::Vasicek, &vasicek(), 0.04, 10, 0, DT, &mut rng).is_err());
    }
}
