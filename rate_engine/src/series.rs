//! series.rs — Business-day price and return series
//!
//! Raw provider quotes are turned into a `PriceSeries` by:
//!   1. dropping missing / non-finite closes,
//!   2. assigning each observation to its business-day bin (weekend prints
//!      roll back to the preceding Friday),
//!   3. keeping the last observation per bin,
//!   4. forward-filling every business day between the first and last bin.
//!
//! Returns are percentage changes scaled by 100:
//!
//! ```text
//!     r_t = 100 · (p_t / p_{t−1} − 1),    t = 1..n−1
//! ```
//!
//! so `ReturnSeries::len() == PriceSeries::len() − 1` always holds.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

use crate::data::RawQuote;
use crate::error::{EngineError, Result};

/// Business-day price (or yield) history.  Dates strictly increasing,
/// weekdays only, no gaps, values finite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl PriceSeries {
    /// Build from already-aligned data, enforcing every series invariant.
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(EngineError::InvalidSeries(format!(
                "{} dates but {} values",
                dates.len(),
                values.len()
            )));
        }
        if dates.is_empty() {
            return Err(EngineError::InvalidSeries("series is empty".into()));
        }
        if let Some(d) = dates.iter().find(|d| !is_business_day(**d)) {
            return Err(EngineError::InvalidSeries(format!("{d} is not a business day")));
        }
        for pair in dates.windows(2) {
            if next_business_day(pair[0]) != pair[1] {
                return Err(EngineError::InvalidSeries(format!(
                    "dates not contiguous business days: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::InvalidSeries("series contains non-finite values".into()));
        }
        Ok(Self { dates, values })
    }

    /// Resample raw quotes to business-day frequency, last observation per
    /// bin, forward-filled.
    pub fn from_quotes(quotes: &[RawQuote]) -> Result<Self> {
        let mut bins: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        // Quotes may arrive unordered; sort by date so "last" means latest.
        let mut ordered: Vec<&RawQuote> = quotes.iter().collect();
        ordered.sort_by_key(|q| q.date);
        for q in ordered {
            if let Some(close) = q.close.filter(|c| c.is_finite()) {
                bins.insert(business_day_bin(q.date), close);
            }
        }

        let (first, last) = match (bins.keys().next(), bins.keys().next_back()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return Err(EngineError::InvalidSeries("no usable closes in provider data".into())),
        };

        let mut dates = Vec::with_capacity(bins.len());
        let mut values = Vec::with_capacity(bins.len());
        let mut carry = bins[&first];
        let mut day = first;
        while day <= last {
            if let Some(v) = bins.get(&day) {
                carry = *v;
            }
            dates.push(day);
            values.push(carry);
            day = next_business_day(day);
        }

        Ok(Self { dates, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn last_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    pub fn last_value(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Split into a training prefix and the final `holdout` observations.
    pub fn split_holdout(&self, holdout: usize) -> Result<(Self, Self)> {
        if holdout == 0 || holdout >= self.len() {
            return Err(EngineError::InsufficientData {
                required: holdout + 1,
                actual: self.len(),
            });
        }
        let cut = self.len() - holdout;
        Ok((
            Self { dates: self.dates[..cut].to_vec(), values: self.values[..cut].to_vec() },
            Self { dates: self.dates[cut..].to_vec(), values: self.values[cut..].to_vec() },
        ))
    }

    pub fn returns(&self) -> Result<ReturnSeries> {
        ReturnSeries::from_prices(self)
    }
}

/// Percentage returns (×100) dated by the later of each price pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnSeries {
    dates: Vec<NaiveDate>,
    percent: Vec<f64>,
}

impl ReturnSeries {
    pub fn from_prices(prices: &PriceSeries) -> Result<Self> {
        if prices.len() < 2 {
            return Err(EngineError::InsufficientData { required: 2, actual: prices.len() });
        }
        let percent = prices
            .values
            .windows(2)
            .map(|w| 100.0 * (w[1] / w[0] - 1.0))
            .collect();
        Ok(Self { dates: prices.dates[1..].to_vec(), percent })
    }

    pub fn len(&self) -> usize {
        self.percent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.percent.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Values in percent.
    pub fn values(&self) -> &[f64] {
        &self.percent
    }
}

// ── Business-day calendar (weekends only, no holiday calendar) ──────────

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut d = date + Duration::days(1);
    while !is_business_day(d) {
        d += Duration::days(1);
    }
    d
}

/// Bin a calendar date into its business-day period: weekends belong to
/// the preceding Friday.
pub fn business_day_bin(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date - Duration::days(2),
        _ => date,
    }
}

/// The `n` business days strictly after `last`.
pub fn business_days_after(last: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut d = last;
    for _ in 0..n {
        d = next_business_day(d);
        out.push(d);
    }
    out
}

/// Consecutive business days starting at `start` (rolled forward if needed).
pub fn business_days_from(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let first = if is_business_day(start) { start } else { next_business_day(start) };
    let mut out = Vec::with_capacity(n);
    if n == 0 {
        return out;
    }
    out.push(first);
    out.extend(business_days_after(first, n - 1));
    out
}
