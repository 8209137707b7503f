//! models/optim.rs — Nelder-Mead minimisation shared by the ML estimators
//!
//! Thin wrapper over `argmin`'s derivative-free simplex solver.  Cost
//! functions signal an infeasible point by returning a large finite
//! penalty (`PENALTY`) rather than NaN, so the simplex can walk away.

use argmin::core::{CostFunction, Error, Executor, State};
use argmin::solver::neldermead::NelderMead;

use crate::error::{EngineError, Result};

/// Cost returned for parameter vectors outside the feasible region.
pub const PENALTY: f64 = 1e12;

/// Solver limits.
#[derive(Debug, Clone, Copy)]
pub struct SimplexOptions {
    pub max_iters: u64,
    pub sd_tolerance: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self { max_iters: 2000, sd_tolerance: 1e-9 }
    }
}

struct Objective<F> {
    f: F,
}

impl<F> CostFunction for Objective<F>
where
    F: Fn(&[f64]) -> f64,
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> std::result::Result<Self::Output, Error> {
        let c = (self.f)(theta);
        Ok(if c.is_finite() { c } else { PENALTY })
    }
}

/// Axis-aligned starting simplex around `x0` (n + 1 vertices).
pub fn initial_simplex(x0: &[f64], steps: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = vec![x0.to_vec()];
    for (i, step) in steps.iter().enumerate() {
        let mut v = x0.to_vec();
        v[i] += step;
        simplex.push(v);
    }
    simplex
}

/// Minimise `f` from the simplex; returns the best point and its cost.
pub fn minimize<F>(
    model: &'static str,
    f: F,
    simplex: Vec<Vec<f64>>,
    opts: SimplexOptions,
) -> Result<(Vec<f64>, f64)>
where
    F: Fn(&[f64]) -> f64,
{
    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(opts.sd_tolerance)
        .map_err(|e| EngineError::estimation(model, e))?;

    let result = Executor::new(Objective { f }, solver)
        .configure(|state| state.max_iters(opts.max_iters))
        .run()
        .map_err(|e| EngineError::estimation(model, format!("optimisation failed: {e}")))?;

    let state = result.state();
    let best = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| EngineError::estimation(model, "optimiser produced no parameters"))?;
    let cost = state.get_best_cost();

    if !cost.is_finite() || cost >= PENALTY {
        return Err(EngineError::estimation(model, "no feasible parameters found"));
    }
    Ok((best, cost))
}
