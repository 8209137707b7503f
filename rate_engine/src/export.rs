//! export.rs — Forecast table (CSV) and full report (JSON)
//!
//! CSV columns, one row per horizon step:
//!
//!   date, arima_forecast, arima_lower, arima_upper, vasicek_median, cir_median
//!
//! Model columns are empty where the stage failed.  Simulation medians are
//! paired with forecast dates by step index (step 0 is the current rate).

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::info;

use crate::error::{EngineError, Result, StageResult};
use crate::models::arima::ForecastPoint;
use crate::models::short_rate::SimulationSummary;
use crate::pipeline::AnalysisReport;
use crate::series::business_days_after;

/// Files written by [`export_report`].
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub csv: PathBuf,
    pub json: PathBuf,
}

/// Forecast table as a DataFrame.
pub fn forecast_frame(report: &AnalysisReport) -> Result<DataFrame> {
    let h = report.horizon;
    let dates = match &report.arima {
        Ok(a) => a.forecast.dates(),
        Err(_) => business_days_after(report.last_date, h),
    };

    let arima_col = |f: fn(&ForecastPoint) -> f64| -> Vec<Option<f64>> {
        match &report.arima {
            Ok(a) => a.forecast.points.iter().map(|p| Some(f(p))).collect(),
            Err(_) => vec![None; h],
        }
    };
    let median_col = |s: &StageResult<SimulationSummary>| -> Vec<Option<f64>> {
        match s {
            Ok(sum) => (0..h).map(|i| sum.median.get(i).copied()).collect(),
            Err(_) => vec![None; h],
        }
    };

    let df = df!(
        "date" => dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect::<Vec<_>>(),
        "arima_forecast" => arima_col(|p| p.mean),
        "arima_lower" => arima_col(|p| p.lower),
        "arima_upper" => arima_col(|p| p.upper),
        "vasicek_median" => median_col(&report.vasicek),
        "cir_median" => median_col(&report.cir),
    )?;
    Ok(df)
}

pub fn write_forecast_csv(report: &AnalysisReport, path: &Path) -> Result<()> {
    let mut df = forecast_frame(report)?;
    let mut file = fs::File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    info!("CSV forecast exported to: {}", path.display());
    Ok(())
}

pub fn write_json_report(report: &AnalysisReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)?;
    info!("JSON report exported to: {}", path.display());
    Ok(())
}

/// `TNX_2024-05-01` style stem for a report.
pub fn base_name(report: &AnalysisReport) -> String {
    format!("{}_{}", report.ticker.trim_start_matches('^'), report.last_date)
}

/// Write `<base>_forecast.csv` (and `<base>_report.json` when `json`) into
/// `dir`, creating it if needed.
pub fn export_report(report: &AnalysisReport, dir: &Path, json: bool) -> Result<ExportPaths> {
    fs::create_dir_all(dir)
        .map_err(|e| EngineError::Export(format!("cannot create {}: {e}", dir.display())))?;
    let base = base_name(report);
    let csv = dir.join(format!("{base}_forecast.csv"));
    let json_path = dir.join(format!("{base}_report.json"));

    write_forecast_csv(report, &csv)?;
    if json {
        write_json_report(report, &json_path)?;
    }
    Ok(ExportPaths { csv, json: json_path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Horizon, SimulationConfig};
    use crate::error::{Stage, StageError};
    use crate::pipeline::{AnalysisRequest, MaximumLikelihood, Pipeline};
    use crate::data::{RawQuote, RetryPolicy};
    use crate::error::DataError;
    use crate::series::{business_days_from, PriceSeries};
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    struct NoSource;

    impl crate::data::PriceSource for NoSource {
        async fn fetch_history(&self, _t: &str, _y: u32) -> std::result::Result<Vec<RawQuote>, DataError> {
            Ok(Vec::new())
        }
    }

    fn sample_report(horizon: usize) -> AnalysisReport {
        let mut rng = StdRng::seed_from_u64(5);
        let step = Normal::new(0.0, 0.04).unwrap();
        let mut level = 4.2;
        let values: Vec<f64> = (0..200)
            .map(|_| {
                level += step.sample(&mut rng);
                level
            })
            .collect();
        let dates = business_days_from(NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(), values.len());
        let series = PriceSeries::new(dates, values).unwrap();

        let config = AppConfig {
            retry: RetryPolicy::immediate(1).unwrap(),
            simulation: SimulationConfig { n_paths: 100, seed: Some(3), ..Default::default() },
            ..AppConfig::default()
        };
        let suite = MaximumLikelihood::from_config(&config);
        let req = AnalysisRequest { horizon: Horizon::new(horizon).unwrap(), ..AnalysisRequest::from_config(&config) };
        Pipeline::new(NoSource, suite, config).analyze(&req, &series)
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rate_engine_{tag}_{}", std::process::id()))
    }

    #[test]
    fn frame_has_one_row_per_step() {
        let report = sample_report(7);
        let df = forecast_frame(&report).unwrap();
        assert_eq!(df.height(), 7);
        assert_eq!(df.width(), 6);
    }

    #[test]
    fn failed_stage_leaves_empty_cells() {
        let mut report = sample_report(4);
        report.cir = Err(StageError::new(Stage::Cir, "not applicable"));
        let dir = scratch_dir("csv");
        let paths = export_report(&report, &dir, true).unwrap();

        let text = fs::read_to_string(&paths.csv).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,arima_forecast,arima_lower,arima_upper,vasicek_median,cir_median"
        );
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.ends_with(',')), "{rows:?}");

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(json["ticker"], "^TNX");
        assert_eq!(json["cir"]["Err"]["stage"], "Cir");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn base_name_strips_caret() {
        let report = sample_report(2);
        assert!(base_name(&report).starts_with("TNX_"));
    }
}
