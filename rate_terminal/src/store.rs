//! store.rs — Parquet persistence of downloaded close histories
//!
//! Files hold two columns: `date` (`YYYY-MM-DD` string) and `close`
//! (nullable f64), one row per provider observation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use rate_engine::data::{PriceSource, RawQuote};
use rate_engine::DataError;
use tracing::{debug, info};

/// Offline `PriceSource` over a file written by `fetch_data`.
#[derive(Debug, Clone)]
pub struct ParquetPriceSource {
    path: PathBuf,
}

impl ParquetPriceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> std::result::Result<Vec<RawQuote>, DataError> {
        let storage = |e: PolarsError| DataError::Storage(format!("{}: {e}", self.path.display()));

        let df = LazyFrame::scan_parquet(&self.path, Default::default())
            .map_err(storage)?
            .collect()
            .map_err(storage)?;

        let dates = df.column("date").and_then(|c| c.str()).map_err(storage)?;
        let closes = df.column("close").and_then(|c| c.f64()).map_err(storage)?;

        dates
            .into_iter()
            .zip(closes.into_iter())
            .map(|(date, close)| {
                let raw = date.ok_or_else(|| DataError::Storage("null date in stored history".into()))?;
                let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|e| DataError::Storage(format!("bad date '{raw}': {e}")))?;
                Ok(RawQuote { date, close })
            })
            .collect()
    }
}

impl PriceSource for ParquetPriceSource {
    async fn fetch_history(
        &self,
        ticker: &str,
        _lookback_years: u32,
    ) -> std::result::Result<Vec<RawQuote>, DataError> {
        debug!("Reading stored history for {ticker} from {}", self.path.display());
        self.load()
    }
}

/// Write quotes as a `date`/`close` Parquet file, creating parent dirs.
pub fn write_quotes_parquet(quotes: &[RawQuote], path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut df = df!(
        "date" => quotes.iter().map(|q| q.date.format("%Y-%m-%d").to_string()).collect::<Vec<_>>(),
        "close" => quotes.iter().map(|q| q.close).collect::<Vec<_>>(),
    )?;

    let mut file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    ParquetWriter::new(&mut file).finish(&mut df)?;
    info!("Saved {} rows to {}", df.height(), path.display());
    Ok(())
}
