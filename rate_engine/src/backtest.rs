//! backtest.rs — Holdout backtest of the ARIMA forecaster
//!
//! The last `holdout` observations are withheld, the forecaster is re-fitted
//! on the remaining prefix and asked for exactly `holdout` steps.  Errors
//! are compared against a naive random walk that carries the last training
//! value forward.
//!
//! ┌──────────────────────────────────────────────────────┐
//! │  PriceSeries                                         │
//! │  ├─ train = [0, n − holdout)  ──► fit ──► ŷ_1..ŷ_H    │
//! │  └─ test  = [n − holdout, n)  ──► y_1..y_H           │
//! │                                                      │
//! │  naive ŷ_h = y_train[last]                           │
//! │  MAE / RMSE / MAPE for both                          │
//! └──────────────────────────────────────────────────────┘
//!
//! One split only; the forecaster is not re-fitted inside the holdout.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::metrics::{forecast_accuracy, ForecastAccuracy};
use crate::models::arima::{ArimaModel, ArimaOrder};
use crate::series::PriceSeries;

pub const DEFAULT_HOLDOUT: usize = 30;

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub holdout: usize,
    pub train_end: NaiveDate,
    pub order: ArimaOrder,
    pub dates: Vec<NaiveDate>,
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
    pub model: ForecastAccuracy,
    pub naive: ForecastAccuracy,
}

impl BacktestReport {
    pub fn beats_naive(&self) -> bool {
        self.model.mae <= self.naive.mae
    }
}

/// Withhold the tail, refit with `fit` on the prefix and score the forecast.
pub fn holdout_backtest<F>(series: &PriceSeries, holdout: usize, fit: F) -> Result<BacktestReport>
where
    F: FnOnce(&[f64]) -> Result<ArimaModel>,
{
    let (train, test) = series.split_holdout(holdout)?;
    let model = fit(train.values())?;
    let predicted = model.predict(holdout);
    if predicted.len() != test.len() {
        return Err(EngineError::estimation("ARIMA", format!(
            "backtest forecast has {} steps, expected {}",
            predicted.len(),
            test.len()
        )));
    }

    let naive_forecast = vec![train.last_value(); holdout];
    let model_acc = forecast_accuracy(test.values(), &predicted)?;
    let naive_acc = forecast_accuracy(test.values(), &naive_forecast)?;

    info!(
        "Backtest ARIMA{} over {holdout} days: {model_acc} | naive {naive_acc}",
        model.order
    );

    Ok(BacktestReport {
        holdout,
        train_end: train.last_date(),
        order: model.order,
        dates: test.dates().to_vec(),
        actual: test.values().to_vec(),
        predicted,
        model: model_acc,
        naive: naive_acc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::business_days_from;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn series(values: Vec<f64>) -> PriceSeries {
        let dates = business_days_from(NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(), values.len());
        PriceSeries::new(dates, values).unwrap()
    }

    #[test]
    fn drift_model_beats_naive_on_a_trend() {
        let mut rng = StdRng::seed_from_u64(17);
        let noise = Normal::new(0.0, 0.2).unwrap();
        let y: Vec<f64> = (0..300).map(|t| 50.0 + 0.1 * t as f64 + noise.sample(&mut rng)).collect();
        let s = series(y);
        let report = holdout_backtest(&s, 30, |train| {
            ArimaModel::fit(train, ArimaOrder { p: 0, d: 1, q: 1 })
        })
        .unwrap();
        assert_eq!(report.predicted.len(), 30);
        assert_eq!(report.actual.len(), 30);
        assert_eq!(report.dates[0], crate::series::next_business_day(report.train_end));
        assert!(report.beats_naive(), "{} vs {}", report.model.mae, report.naive.mae);
    }

    #[test]
    fn holdout_longer_than_series_fails() {
        let s = series((0..20).map(f64::from).collect());
        let r = holdout_backtest(&s, 30, |train| ArimaModel::fit(train, ArimaOrder { p: 0, d: 1, q: 0 }));
        assert!(matches!(r, Err(EngineError::InsufficientData { .. })));
    }

    #[test]
    fn fit_errors_propagate() {
        let s = series(vec![3.0; 80]);
        let r = holdout_backtest(&s, 30, |train| ArimaModel::fit(train, ArimaOrder { p: 1, d: 0, q: 0 }));
        assert!(matches!(r, Err(EngineError::Degenerate(_))));
    }
}
