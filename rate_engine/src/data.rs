//! data.rs — Market-data acquisition with bounded retry
//!
//! `PriceSource` is the provider boundary: one call returns the daily close
//! history for a ticker over a lookback window.  An empty history is a
//! valid answer, distinct from an error, but both count as a failed attempt
//! for the retry loop.
//!
//! RETRY POLICY
//!   attempt 1 immediately, then sleep 5s, 10s, 20s, 30s, 60s before
//!   attempts 2..6.  Worst case ≈ 2 minutes of cumulative sleep.  After the
//!   last attempt the caller receives `FetchOutcome::Exhausted`, never an
//!   `Err`.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_RETRY_SCHEDULE_SECS;
use crate::error::{DataError, EngineError, Result};

/// One provider row: a date and its close, possibly missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuote {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

/// Source of daily close histories.
pub trait PriceSource {
    fn fetch_history(
        &self,
        ticker: &str,
        lookback_years: u32,
    ) -> impl Future<Output = std::result::Result<Vec<RawQuote>, DataError>> + Send;
}

// ── Retry policy ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Sleep before each attempt; its length is the attempt count.
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Result<Self> {
        if delays.is_empty() {
            return Err(EngineError::Config("retry schedule needs at least one attempt".into()));
        }
        Ok(Self { delays })
    }

    pub fn from_secs(secs: &[u64]) -> Result<Self> {
        Self::new(secs.iter().map(|s| Duration::from_secs(*s)).collect())
    }

    /// No sleeping between attempts.
    pub fn immediate(attempts: usize) -> Result<Self> {
        Self::new(vec![Duration::ZERO; attempts])
    }

    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn total_wait(&self) -> Duration {
        self.delays.iter().sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: DEFAULT_RETRY_SCHEDULE_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched { quotes: Vec<RawQuote>, attempts: usize },
    Exhausted { attempts: usize, last_error: Option<String> },
}

/// Call `source` until it returns a non-empty history or the schedule runs
/// out.  Errors and empty results are both treated as transient.
pub async fn fetch_with_retry<S: PriceSource>(
    source: &S,
    ticker: &str,
    lookback_years: u32,
    policy: &RetryPolicy,
) -> FetchOutcome {
    let total = policy.attempts();
    let mut last_error = None;

    for (i, delay) in policy.delays().iter().enumerate() {
        let attempt = i + 1;
        if !delay.is_zero() {
            warn!("Provider busy; retrying {ticker} in {}s ({attempt}/{total})", delay.as_secs());
            tokio::time::sleep(*delay).await;
        }

        debug!("Fetching {ticker} ({lookback_years}y), attempt {attempt}/{total}");
        match source.fetch_history(ticker, lookback_years).await {
            Ok(quotes) if !quotes.is_empty() => {
                info!("Fetched {} rows for {ticker} on attempt {attempt}", quotes.len());
                return FetchOutcome::Fetched { quotes, attempts: attempt };
            }
            Ok(_) => {
                warn!("Empty history for {ticker} on attempt {attempt}/{total}");
                last_error = Some("provider returned no rows".to_owned());
            }
            Err(e) => {
                warn!("Fetch attempt {attempt}/{total} for {ticker} failed: {e}");
                last_error = Some(e.to_string());
            }
        }
    }

    FetchOutcome::Exhausted { attempts: total, last_error }
}

// ── Yahoo Finance chart API ──────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Deserialize, Debug)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Debug, Default)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
}

#[derive(Deserialize, Debug)]
struct QuoteBlock {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

pub struct YahooChartClient {
    client: Client,
    base_url: String,
}

impl YahooChartClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (rate_terminal)")
            .build()
            .map_err(DataError::Http)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn chart_url(&self, ticker: &str) -> String {
        // `^` is not a legal path character
        format!("{}/v8/finance/chart/{}", self.base_url, ticker.replace('^', "%5E"))
    }
}

impl PriceSource for YahooChartClient {
    async fn fetch_history(
        &self,
        ticker: &str,
        lookback_years: u32,
    ) -> std::result::Result<Vec<RawQuote>, DataError> {
        let url = self.chart_url(ticker);
        let range = format!("{lookback_years}y");
        let body = self
            .client
            .get(&url)
            .query(&[("range", range.as_str()), ("interval", "1d")])
            .send()
            .await?
            .text()
            .await?;

        parse_chart(&body)
    }
}

/// Decode a chart API response into quotes (exchange-local dates).
fn parse_chart(body: &str) -> std::result::Result<Vec<RawQuote>, DataError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| DataError::Malformed(format!("chart payload: {e}")))?;

    if let Some(err) = envelope.chart.error {
        return Err(DataError::Provider { code: err.code, description: err.description });
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    if closes.len() != result.timestamp.len() {
        return Err(DataError::Malformed(format!(
            "{} timestamps but {} closes",
            result.timestamp.len(),
            closes.len()
        )));
    }

    result
        .timestamp
        .iter()
        .zip(closes)
        .map(|(ts, close)| {
            let local = DateTime::from_timestamp(ts + result.meta.gmtoffset, 0)
                .ok_or_else(|| DataError::Malformed(format!("timestamp {ts} out of range")))?;
            Ok(RawQuote { date: local.date_naive(), close })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakySource {
        calls: AtomicUsize,
        succeed_on: Option<usize>,
    }

    impl PriceSource for FlakySource {
        async fn fetch_history(
            &self,
            _ticker: &str,
            _lookback_years: u32,
        ) -> std::result::Result<Vec<RawQuote>, DataError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.succeed_on {
                Some(k) if n == k => Ok(vec![RawQuote {
                    date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                    close: Some(4.0),
                }]),
                _ if n % 2 == 0 => Ok(Vec::new()),
                _ => Err(DataError::Malformed("boom".into())),
            }
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let src = FlakySource { calls: AtomicUsize::new(0), succeed_on: Some(3) };
        let policy = RetryPolicy::immediate(6).unwrap();
        match fetch_with_retry(&src, "^TNX", 5, &policy).await {
            FetchOutcome::Fetched { quotes, attempts } => {
                assert_eq!(attempts, 3);
                assert_eq!(quotes.len(), 1);
            }
            other => panic!("expected data, got {other:?}"),
        }
        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_schedule() {
        let src = FlakySource { calls: AtomicUsize::new(0), succeed_on: None };
        let policy = RetryPolicy::immediate(6).unwrap();
        match fetch_with_retry(&src, "^TNX", 5, &policy).await {
            FetchOutcome::Exhausted { attempts, last_error } => {
                assert_eq!(attempts, 6);
                // attempt 6 returned an empty result
                assert_eq!(last_error.as_deref(), Some("provider returned no rows"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(src.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn default_schedule_sleeps_between_attempts() {
        let src = FlakySource { calls: AtomicUsize::new(0), succeed_on: None };
        let started = tokio::time::Instant::now();
        let outcome = fetch_with_retry(&src, "^TNX", 5, &RetryPolicy::default()).await;
        let elapsed = started.elapsed();

        assert!(matches!(outcome, FetchOutcome::Exhausted { attempts: 6, .. }), "{outcome:?}");
        assert_eq!(src.calls.load(Ordering::SeqCst), 6);
        assert!(elapsed >= Duration::from_secs(125), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(126), "{elapsed:?}");
    }

    #[test]
    fn default_schedule_is_six_attempts_two_minutes() {
        let p = RetryPolicy::default();
        assert_eq!(p.attempts(), 6);
        assert_eq!(p.delays()[0], Duration::ZERO);
        assert_eq!(p.total_wait(), Duration::from_secs(125));
        assert!(RetryPolicy::new(Vec::new()).is_err());
    }

    #[test]
    fn parses_chart_payload() {
        let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":-18000},
            "timestamp":[1704205800,1704292200],
            "indicators":{"quote":[{"close":[3.946,null]}]}}],"error":null}}"#;
        let quotes = parse_chart(body).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(quotes[0].close, Some(3.946));
        assert_eq!(quotes[1].close, None);
    }

    #[test]
    fn surfaces_provider_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        match parse_chart(body) {
            Err(DataError::Provider { code, .. }) => assert_eq!(code, "Not Found"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn chart_url_escapes_caret() {
        let c = YahooChartClient::new("https://example.test/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.chart_url("^TNX"), "https://example.test/v8/finance/chart/%5ETNX");
    }
}
