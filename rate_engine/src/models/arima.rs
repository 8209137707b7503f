//! models/arima.rs — ARIMA(p,d,q) with automatic order selection
//!
//! ─────────────────────────────────────────────────────────────────────────
//! MATHEMATICAL SPECIFICATION
//! ─────────────────────────────────────────────────────────────────────────
//!
//! Differenced series  w_t = (1 − B)^d y_t.  With mean/drift μ (d < 2):
//!
//!   w_t − μ = Σ_{i=1..p} φ_i (w_{t−i} − μ) + ε_t + Σ_{j=1..q} θ_j ε_{t−j}
//!
//! ESTIMATION (conditional sum of squares, Gaussian):
//!   ε_t computed recursively for t ≥ t₀ (t₀ ≥ p, pre-sample ε = 0)
//!   σ̂² = SSE / n_eff,   ℓ = −½ n_eff (ln 2πσ̂² + 1)
//!   AIC = −2ℓ + 2k,  BIC = −2ℓ + k ln n_eff,  k = p + q + [μ] + 1
//!   φ and θ are reached through partial autocorrelations
//!   r_k = u_k / √(1 + u_k²) ∈ (−1, 1) and the Durbin–Levinson recursion,
//!   so every candidate is stationary (AR) and invertible (MA).
//!
//! ORDER SELECTION:
//!   d  : smallest d ≤ max_d whose KPSS level statistic
//!        η = Σ S_t² / (n² σ̂²_LR) is below the 5% critical value 0.463
//!        (Newey–West σ̂²_LR, bandwidth ⌊4 (n/100)^¼⌋).
//!   p,q : stepwise search from (2,2), (0,0), (1,0), (0,1) over the
//!        neighbours (p±1, q), (p, q±1), (p±1, q±1), minimising AIC/BIC.
//!
//! FORECAST:
//!   ŵ_{n+h} by recursion with future ε = 0, integrated d times.
//!   ψ-weights of φ(B)(1 − B)^d:  ψ₀ = 1,  ψ_j = θ_j + Σ_i φ*_i ψ_{j−i}
//!   se_h = σ̂ √(Σ_{j<h} ψ_j²),   bounds ŷ ± z·se_h
//! ─────────────────────────────────────────────────────────────────────────

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::metrics::{mean, std_dev, variance};
use crate::models::optim::{initial_simplex, minimize, SimplexOptions};
use crate::risk::ConfidenceLevel;
use crate::series::business_days_after;

/// 5% critical value of the KPSS level-stationarity statistic.
const KPSS_CRITICAL_5PCT: f64 = 0.463;

/// Manual orders are capped here.
const MAX_MANUAL_PQ: usize = 10;

const MIN_EFFECTIVE_OBS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Result<Self> {
        if p > MAX_MANUAL_PQ || q > MAX_MANUAL_PQ {
            return Err(EngineError::Config(format!(
                "AR/MA orders must be <= {MAX_MANUAL_PQ}, got p={p} q={q}"
            )));
        }
        if d > 2 {
            return Err(EngineError::Config(format!("differencing order must be <= 2, got {d}")));
        }
        Ok(Self { p, d, q })
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

impl FromStr for ArimaOrder {
    type Err = EngineError;

    /// Accepts `1,1,1` or `(1,1,1)`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .map(str::trim)
            .collect();
        let [p, d, q] = parts.as_slice() else {
            return Err(EngineError::Config(format!("ARIMA order '{s}' must be p,d,q")));
        };
        let num = |v: &str| {
            v.parse::<usize>()
                .map_err(|e| EngineError::Config(format!("ARIMA order '{s}': {e}")))
        };
        Self::new(num(p)?, num(d)?, num(q)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ArimaSpec {
    #[default]
    Auto,
    Manual(ArimaOrder),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InformationCriterion {
    Aic,
    Bic,
}

/// Bounds for the automatic search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArimaSearch {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
    pub criterion: InformationCriterion,
}

impl Default for ArimaSearch {
    fn default() -> Self {
        Self { max_p: 5, max_d: 2, max_q: 5, criterion: InformationCriterion::Aic }
    }
}

/// A fitted ARIMA model.
#[derive(Debug, Clone, Serialize)]
pub struct ArimaModel {
    pub order: ArimaOrder,
    /// Mean (d = 0) or drift (d = 1) of the differenced series
    pub intercept: Option<f64>,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub n_obs: usize,

    /// Differenced series the model was estimated on
    #[serde(skip)]
    w: Vec<f64>,
    /// Innovations aligned with `w` (zero before the conditioning point)
    #[serde(skip)]
    eps: Vec<f64>,
    #[serde(skip)]
    start: usize,
    /// Last value of Δ^k y for k = 0..d, used to integrate forecasts
    #[serde(skip)]
    tails: Vec<f64>,
}

impl ArimaModel {
    /// Fit a fixed order, conditioning on the first `p` differenced values.
    pub fn fit(y: &[f64], order: ArimaOrder) -> Result<Self> {
        Self::fit_conditioned(y, order, order.p)
    }

    /// Automatic order selection per `search`, or the manual order.
    pub fn fit_spec(y: &[f64], spec: &ArimaSpec, search: &ArimaSearch) -> Result<Self> {
        match spec {
            ArimaSpec::Manual(order) => Self::fit(y, *order),
            ArimaSpec::Auto => auto_arima(y, search),
        }
    }

    fn fit_conditioned(y: &[f64], order: ArimaOrder, start: usize) -> Result<Self> {
        if y.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::InvalidSeries("series contains NaN or infinite values".into()));
        }
        let required = order.d + start + order.q + MIN_EFFECTIVE_OBS;
        if y.len() < required {
            return Err(EngineError::InsufficientData { required, actual: y.len() });
        }

        let w = difference(y, order.d);
        let w_var = variance(&w);
        if w_var <= 1e-14 {
            return Err(EngineError::Degenerate(format!(
                "series is constant after {} difference(s)",
                order.d
            )));
        }

        let layout = Layout { with_mean: order.d < 2, p: order.p, q: order.q };
        let n_eff = w.len() - start;
        let w_mean = mean(&w).unwrap_or(0.0);

        let sse_of = |x: &[f64]| {
            let (mu, ar, ma) = layout.unpack(x);
            let e = css_residuals(&w, start, mu, &ar, &ma);
            e[start..].iter().map(|v| v * v).sum::<f64>()
        };

        let x_hat = if layout.p + layout.q == 0 {
            // closed form: the sample mean minimises the CSS
            if layout.with_mean { vec![w_mean] } else { Vec::new() }
        } else {
            let mut x0 = Vec::with_capacity(layout.len());
            let mut steps = Vec::with_capacity(layout.len());
            if layout.with_mean {
                x0.push(w_mean);
                steps.push((0.5 * w_var.sqrt()).max(1e-4));
            }
            x0.extend(std::iter::repeat(0.0).take(layout.p + layout.q));
            steps.extend(std::iter::repeat(0.3).take(layout.p + layout.q));

            let objective = |x: &[f64]| 0.5 * n_eff as f64 * (sse_of(x) / n_eff as f64).ln();
            let (best, _) = minimize("ARIMA", objective, initial_simplex(&x0, &steps), SimplexOptions::default())?;
            best
        };

        let (mu, ar, ma) = layout.unpack(&x_hat);
        let eps = css_residuals(&w, start, mu, &ar, &ma);
        let sse: f64 = eps[start..].iter().map(|v| v * v).sum();
        let sigma2 = sse / n_eff as f64;
        if !sigma2.is_finite() || sigma2 <= 0.0 {
            return Err(EngineError::estimation("ARIMA", format!("residual variance {sigma2} at order {order}")));
        }

        let n = n_eff as f64;
        let log_likelihood = -0.5 * n * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let k = (layout.len() + 1) as f64;

        let tails = (0..order.d)
            .map(|k| {
                let level = difference(y, k);
                level[level.len() - 1]
            })
            .collect();

        Ok(Self {
            order,
            intercept: layout.with_mean.then_some(mu),
            ar,
            ma,
            sigma2,
            log_likelihood,
            aic: -2.0 * log_likelihood + 2.0 * k,
            bic: -2.0 * log_likelihood + k * n.ln(),
            n_obs: n_eff,
            w,
            eps,
            start,
            tails,
        })
    }

    pub fn criterion(&self, c: InformationCriterion) -> f64 {
        match c {
            InformationCriterion::Aic => self.aic,
            InformationCriterion::Bic => self.bic,
        }
    }

    /// In-sample one-step innovations (length `n_obs`).
    pub fn residuals(&self) -> &[f64] {
        &self.eps[self.start..]
    }

    /// Point forecasts for `horizon` steps on the original scale.
    pub fn predict(&self, horizon: usize) -> Vec<f64> {
        let mu = self.intercept.unwrap_or(0.0);
        let n = self.w.len();
        let mut w_ext = self.w.clone();
        let mut e_ext = self.eps.clone();

        for _ in 0..horizon {
            let t = w_ext.len();
            let mut pred = mu;
            for (i, phi) in self.ar.iter().enumerate() {
                pred += phi * (w_ext[t - i - 1] - mu);
            }
            for (j, theta) in self.ma.iter().enumerate() {
                if t > j {
                    pred += theta * e_ext[t - j - 1];
                }
            }
            w_ext.push(pred);
            e_ext.push(0.0);
        }

        // integrate from Δ^d back to levels
        let mut path = w_ext[n..].to_vec();
        for tail in self.tails.iter().rev() {
            let mut level = *tail;
            for v in path.iter_mut() {
                level += *v;
                *v = level;
            }
        }
        path
    }

    /// ψ-weights ψ₀..ψ_{h−1} of the integrated process.
    pub fn psi_weights(&self, h: usize) -> Vec<f64> {
        // a(B) = (1 − Σ φ_i B^i)(1 − B)^d
        let mut poly = vec![1.0];
        poly.extend(self.ar.iter().map(|phi| -phi));
        for _ in 0..self.order.d {
            let mut next = vec![0.0; poly.len() + 1];
            for (i, c) in poly.iter().enumerate() {
                next[i] += c;
                next[i + 1] -= c;
            }
            poly = next;
        }
        let phi_star: Vec<f64> = poly[1..].iter().map(|c| -c).collect();

        let mut psi = Vec::with_capacity(h);
        for j in 0..h {
            if j == 0 {
                psi.push(1.0);
                continue;
            }
            let mut v = if j <= self.ma.len() { self.ma[j - 1] } else { 0.0 };
            for (i, phi) in phi_star.iter().enumerate().take(j) {
                v += phi * psi[j - i - 1];
            }
            psi.push(v);
        }
        psi
    }

    /// Forecast standard errors for steps 1..=h.
    pub fn forecast_std_errors(&self, h: usize) -> Vec<f64> {
        let psi = self.psi_weights(h);
        let mut acc = 0.0;
        psi.iter()
            .map(|p| {
                acc += p * p;
                (self.sigma2 * acc).sqrt()
            })
            .collect()
    }

    /// Dated forecast with interval bounds at `confidence`.
    pub fn forecast(
        &self,
        last_date: NaiveDate,
        horizon: usize,
        confidence: ConfidenceLevel,
    ) -> Result<ForecastResult> {
        let z = confidence.two_sided_z()?;
        let means = self.predict(horizon);
        let ses = self.forecast_std_errors(horizon);
        let points = business_days_after(last_date, horizon)
            .into_iter()
            .zip(means)
            .zip(ses)
            .map(|((date, mean), se)| ForecastPoint {
                date,
                mean,
                lower: mean - z * se,
                upper: mean + z * se,
                std_error: se,
            })
            .collect();
        Ok(ForecastResult { order: self.order, confidence, points })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
    pub std_error: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub order: ArimaOrder,
    pub confidence: ConfidenceLevel,
    pub points: Vec<ForecastPoint>,
}

impl ForecastResult {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }
}

// ── Automatic order selection ────────────────────────────────────────────

/// Stepwise AIC/BIC search at the KPSS-selected differencing order.
pub fn auto_arima(y: &[f64], search: &ArimaSearch) -> Result<ArimaModel> {
    if y.len() < 2 {
        return Err(EngineError::InsufficientData { required: 2, actual: y.len() });
    }
    if std_dev(y) <= 1e-12 {
        return Err(EngineError::Degenerate("series is constant".into()));
    }

    let d = ndiffs(y, search.max_d);
    // Every candidate is conditioned on the same start so criteria compare
    // over identical observations.
    let start = search.max_p;
    info!("ARIMA auto search: d={d} (KPSS), p<={}, q<={}", search.max_p, search.max_q);

    let mut visited: HashMap<(usize, usize), Option<f64>> = HashMap::new();
    let mut best: Option<ArimaModel> = None;
    let mut last_error: Option<EngineError> = None;

    let mut try_order = |p: usize, q: usize, best: &mut Option<ArimaModel>| -> bool {
        if p > search.max_p || q > search.max_q || visited.contains_key(&(p, q)) {
            return false;
        }
        let order = ArimaOrder { p, d, q };
        match ArimaModel::fit_conditioned(y, order, start) {
            Ok(model) => {
                let score = model.criterion(search.criterion);
                debug!("ARIMA{order}: {:?}={score:.3}", search.criterion);
                visited.insert((p, q), Some(score));
                let better = best
                    .as_ref()
                    .map_or(true, |b| score < b.criterion(search.criterion));
                if better {
                    *best = Some(model);
                }
                better
            }
            Err(e) => {
                debug!("ARIMA{order} failed: {e}");
                visited.insert((p, q), None);
                last_error = Some(e);
                false
            }
        }
    };

    for (p, q) in [(2, 2), (0, 0), (1, 0), (0, 1)] {
        try_order(p.min(search.max_p), q.min(search.max_q), &mut best);
    }

    // Walk to the best neighbour until no neighbour improves.
    for _ in 0..100 {
        let Some((bp, bq)) = best.as_ref().map(|m| (m.order.p, m.order.q)) else {
            break;
        };
        let mut improved = false;
        let neighbours = [
            (bp as i64 - 1, bq as i64),
            (bp as i64 + 1, bq as i64),
            (bp as i64, bq as i64 - 1),
            (bp as i64, bq as i64 + 1),
            (bp as i64 - 1, bq as i64 - 1),
            (bp as i64 + 1, bq as i64 + 1),
        ];
        for (p, q) in neighbours {
            if p < 0 || q < 0 {
                continue;
            }
            improved |= try_order(p as usize, q as usize, &mut best);
        }
        if !improved {
            break;
        }
    }

    match best {
        Some(m) => {
            info!(
                "ARIMA{} selected: AIC={:.3} BIC={:.3} σ²={:.6}",
                m.order, m.aic, m.bic, m.sigma2
            );
            Ok(m)
        }
        None => Err(last_error.unwrap_or_else(|| EngineError::estimation("ARIMA", "no candidate order could be fitted"))),
    }
}

/// Number of differences needed for KPSS level stationarity (≤ `max_d`).
pub fn ndiffs(y: &[f64], max_d: usize) -> usize {
    let mut x = y.to_vec();
    let mut d = 0;
    while d < max_d {
        if x.len() < 3 || std_dev(&x) <= 1e-12 {
            break;
        }
        if kpss_level_statistic(&x) < KPSS_CRITICAL_5PCT {
            break;
        }
        x = difference(&x, 1);
        d += 1;
    }
    d
}

/// KPSS level-stationarity statistic with Newey–West long-run variance.
pub fn kpss_level_statistic(x: &[f64]) -> f64 {
    let n = x.len();
    let nf = n as f64;
    let m = x.iter().sum::<f64>() / nf;
    let e: Vec<f64> = x.iter().map(|v| v - m).collect();

    let mut s = 0.0;
    let mut eta = 0.0;
    for v in &e {
        s += v;
        eta += s * s;
    }
    eta /= nf * nf;

    let lags = (4.0 * (nf / 100.0).powf(0.25)).trunc() as usize;
    let mut s2 = e.iter().map(|v| v * v).sum::<f64>() / nf;
    for l in 1..=lags.min(n.saturating_sub(1)) {
        let w = 1.0 - l as f64 / (lags as f64 + 1.0);
        let gamma: f64 = (l..n).map(|t| e[t] * e[t - l]).sum::<f64>() / nf;
        s2 += 2.0 * w * gamma;
    }

    if s2 <= 0.0 {
        return f64::INFINITY;
    }
    eta / s2
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Apply `order` first differences.
pub fn difference(data: &[f64], order: usize) -> Vec<f64> {
    let mut result = data.to_vec();
    for _ in 0..order {
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Map unconstrained values to coefficients of a stationary AR polynomial
/// through partial autocorrelations.
fn constrain_stationary(u: &[f64]) -> Vec<f64> {
    let n = u.len();
    let r: Vec<f64> = u.iter().map(|x| x / (1.0 + x * x).sqrt()).collect();
    let mut y = vec![0.0; n];
    for k in 0..n {
        let prev = y.clone();
        for i in 0..k {
            y[i] = prev[i] + r[k] * prev[k - i - 1];
        }
        y[k] = r[k];
    }
    y.into_iter().map(|v| -v).collect()
}

struct Layout {
    with_mean: bool,
    p: usize,
    q: usize,
}

impl Layout {
    fn len(&self) -> usize {
        usize::from(self.with_mean) + self.p + self.q
    }

    fn unpack(&self, x: &[f64]) -> (f64, Vec<f64>, Vec<f64>) {
        let off = usize::from(self.with_mean);
        let mu = if self.with_mean { x[0] } else { 0.0 };
        let ar = constrain_stationary(&x[off..off + self.p]);
        // θ(B) = 1 + Σθ_j B^j shares its roots with the constrained AR form
        let ma = constrain_stationary(&x[off + self.p..off + self.p + self.q])
            .into_iter()
            .map(|v| -v)
            .collect();
        (mu, ar, ma)
    }
}

fn css_residuals(w: &[f64], start: usize, mu: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let n = w.len();
    let mut e = vec![0.0; n];
    for t in start..n {
        let mut pred = mu;
        for (i, phi) in ar.iter().enumerate() {
            pred += phi * (w[t - i - 1] - mu);
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                pred += theta * e[t - j - 1];
            }
        }
        e[t] = w[t] - pred;
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{business_days_from, is_business_day, next_business_day};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn ar1_series(phi: f64, mu: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut y = vec![mu];
        for t in 1..n {
            let prev = y[t - 1];
            y.push(mu + phi * (prev - mu) + noise.sample(&mut rng));
        }
        y
    }

    fn random_walk(n: usize, drift: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 0.05).unwrap();
        let mut y = vec![4.0];
        for t in 1..n {
            let prev = y[t - 1];
            y.push(prev + drift + noise.sample(&mut rng));
        }
        y
    }

    #[test]
    fn order_parsing() {
        assert_eq!("1,1,2".parse::<ArimaOrder>().unwrap(), ArimaOrder { p: 1, d: 1, q: 2 });
        assert_eq!("(0, 1, 0)".parse::<ArimaOrder>().unwrap(), ArimaOrder { p: 0, d: 1, q: 0 });
        assert!("1,3,1".parse::<ArimaOrder>().is_err());
        assert!("1,1".parse::<ArimaOrder>().is_err());
        assert!(ArimaOrder::new(11, 0, 0).is_err());
    }

    #[test]
    fn difference_orders() {
        let y = [1.0, 4.0, 9.0, 16.0];
        assert_eq!(difference(&y, 1), vec![3.0, 5.0, 7.0]);
        assert_eq!(difference(&y, 2), vec![2.0, 2.0]);
        assert_eq!(difference(&y, 0), y.to_vec());
    }

    #[test]
    fn constrained_ar_is_stationary() {
        // a single PACF maps straight through
        let c = constrain_stationary(&[1.0]);
        assert_relative_eq!(c[0], -(1.0 / 2.0_f64.sqrt()), epsilon = 1e-12);
        // AR(2) triangle: |φ2| < 1, φ2 ± φ1 < 1
        for u in [[5.0, -3.0], [-4.0, 4.0], [0.3, 0.9], [50.0, 50.0]] {
            let phi = constrain_stationary(&u);
            assert!(phi[1].abs() < 1.0, "{phi:?}");
            assert!(phi[1] + phi[0] < 1.0, "{phi:?}");
            assert!(phi[1] - phi[0] < 1.0, "{phi:?}");
        }
    }

    #[test]
    fn recovers_ar1_coefficient() {
        let y = ar1_series(0.6, 5.0, 800, 7);
        let m = ArimaModel::fit(&y, ArimaOrder { p: 1, d: 0, q: 0 }).unwrap();
        assert!((m.ar[0] - 0.6).abs() < 0.08, "phi = {}", m.ar[0]);
        assert!((m.intercept.unwrap() - 5.0).abs() < 0.3);
        assert!((m.sigma2 - 1.0).abs() < 0.15, "sigma2 = {}", m.sigma2);
        assert_eq!(m.residuals().len(), m.n_obs);
    }

    #[test]
    fn kpss_separates_stationary_from_trend() {
        let stationary = ar1_series(0.3, 0.0, 500, 11);
        let trend: Vec<f64> = (0..500).map(|t| 0.05 * t as f64 + stationary[t] * 0.1).collect();
        assert!(kpss_level_statistic(&stationary) < KPSS_CRITICAL_5PCT);
        assert!(kpss_level_statistic(&trend) > KPSS_CRITICAL_5PCT);
        assert_eq!(ndiffs(&stationary, 2), 0);
        assert_eq!(ndiffs(&trend, 2), 1);
    }

    #[test]
    fn auto_search_differences_a_random_walk() {
        // a 5% KPSS test misjudges a few walks; most must settle at d=1
        let walks: Vec<Vec<f64>> = (0..40).map(|seed| random_walk(400, 0.0, seed)).collect();
        let once: Vec<&Vec<f64>> = walks.iter().filter(|y| ndiffs(y, 2) == 1).collect();
        assert!(once.len() >= 30, "d=1 for {}/40 walks", once.len());

        let search = ArimaSearch { max_p: 3, max_d: 2, max_q: 3, ..Default::default() };
        let m = auto_arima(once[0], &search).unwrap();
        assert_eq!(m.order.d, 1);
        assert!(m.aic.is_finite() && m.bic.is_finite());
    }

    #[test]
    fn random_walk_forecast_is_flat_with_growing_bands() {
        let y = random_walk(300, 0.0, 5);
        let m = ArimaModel::fit(&y, ArimaOrder { p: 0, d: 1, q: 0 }).unwrap();
        let fc = m.predict(5);
        // drift ≈ 0 → forecasts stay near the last value
        for v in &fc {
            assert!((v - y[y.len() - 1]).abs() < 0.05);
        }
        let se = m.forecast_std_errors(4);
        for k in 0..4 {
            assert_relative_eq!(se[k], (m.sigma2 * (k + 1) as f64).sqrt(), epsilon = 1e-12);
        }
    }

    #[test]
    fn psi_weights_of_ar1() {
        let y = ar1_series(0.5, 0.0, 400, 21);
        let m = ArimaModel::fit(&y, ArimaOrder { p: 1, d: 0, q: 0 }).unwrap();
        let psi = m.psi_weights(4);
        for (j, v) in psi.iter().enumerate() {
            assert_relative_eq!(*v, m.ar[0].powi(j as i32), epsilon = 1e-12);
        }
    }

    #[test]
    fn forecast_has_horizon_length_and_business_dates() {
        let y = random_walk(250, 0.01, 9);
        let m = ArimaModel::fit(&y, ArimaOrder { p: 1, d: 1, q: 1 }).unwrap();
        let dates = business_days_from(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), y.len());
        let last = dates[dates.len() - 1];
        let fc = m.forecast(last, 17, ConfidenceLevel::P95).unwrap();
        assert_eq!(fc.len(), 17);
        assert_eq!(fc.points[0].date, next_business_day(last));
        assert!(fc.points.iter().all(|p| is_business_day(p.date)));
        assert!(fc.points.iter().all(|p| p.lower < p.mean && p.mean < p.upper));
        assert!(fc.points.windows(2).all(|w| w[1].std_error >= w[0].std_error));
    }

    #[test]
    fn constant_series_is_degenerate() {
        let y = vec![4.2; 100];
        assert!(matches!(auto_arima(&y, &ArimaSearch::default()), Err(EngineError::Degenerate(_))));
        assert!(ArimaModel::fit(&y, ArimaOrder { p: 1, d: 0, q: 0 }).is_err());
    }

    #[test]
    fn too_short_series_is_rejected() {
        let y = [1.0, 2.0, 1.5, 2.5, 2.0];
        assert!(matches!(
            ArimaModel::fit(&y, ArimaOrder { p: 1, d: 1, q: 1 }),
            Err(EngineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn d2_integration_continues_quadratic() {
        // y_t = t² + small noise: Δ²y ≈ 2, model without intercept forecasts
        // Δ²ŷ = 0 so the path continues the last slope.
        let mut rng = StdRng::seed_from_u64(1);
        let noise = Normal::new(0.0, 0.01).unwrap();
        let y: Vec<f64> = (0..120).map(|t| (t * t) as f64 + noise.sample(&mut rng)).collect();
        let m = ArimaModel::fit(&y, ArimaOrder { p: 0, d: 2, q: 0 }).unwrap();
        let fc = m.predict(2);
        let n = y.len();
        let slope = y[n - 1] - y[n - 2];
        assert_relative_eq!(fc[0], y[n - 1] + slope, epsilon = 1e-9);
        assert_relative_eq!(fc[1], y[n - 1] + 2.0 * slope, epsilon = 1e-9);
    }
}
