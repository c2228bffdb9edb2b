//! Chart data assembly: cache-first fetch, time windowing, deterministic
//! downsampling, and series validation.

use std::sync::Arc;

use serde::Serialize;
use time::Duration;
use tracing::warn;

use crate::cache::{CacheService, DEFAULT_CHART_TTL_MINUTES};
use crate::provider::crypto::CryptoClient;
use crate::provider::equities::EquitiesClient;
use crate::provider::{MarketDataSource, MarketError};
use crate::{AssetKind, ChartPoint, Symbol, Timeframe, UtcDateTime};

/// One chart request, as accepted by the batch path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRequest {
    pub symbol: Symbol,
    pub kind: AssetKind,
    pub timeframe: Timeframe,
}

/// Assembled chart response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub symbol: Symbol,
    pub kind: AssetKind,
    pub timeframe: Timeframe,
    pub points: Vec<ChartPoint>,
    pub cache_hit: bool,
}

/// One defect found by [`validate_chart_data`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartIssue {
    NonFinitePrice { index: usize },
    NegativePrice { index: usize },
    NegativeVolume { index: usize },
    InvertedRange { index: usize },
    AbnormalGaps { count: usize, intervals: usize },
    ExcessiveVolatility { count: usize, transitions: usize },
}

/// Validation outcome; the series itself is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartReport {
    pub is_valid: bool,
    pub issues: Vec<ChartIssue>,
}

/// Assembles bounded chart series from the matching provider client.
#[derive(Clone)]
pub struct ChartEngine {
    equities: Arc<EquitiesClient>,
    crypto: Arc<CryptoClient>,
    cache: Arc<CacheService>,
}

impl ChartEngine {
    pub fn new(
        equities: Arc<EquitiesClient>,
        crypto: Arc<CryptoClient>,
        cache: Arc<CacheService>,
    ) -> Self {
        Self {
            equities,
            crypto,
            cache,
        }
    }

    fn source_for(&self, kind: AssetKind) -> &dyn MarketDataSource {
        match kind {
            AssetKind::Stock => self.equities.as_ref(),
            AssetKind::Crypto => self.crypto.as_ref(),
        }
    }

    /// Assemble chart data for one symbol.
    ///
    /// The cache is consulted first; on a miss the matching provider is
    /// asked for the timeframe's raw fetch window, the result is windowed
    /// and written through. Cache failures downgrade to a warning and a
    /// fresh fetch — a broken local store must not take charting down.
    pub async fn chart_data(
        &self,
        symbol: &Symbol,
        kind: AssetKind,
        timeframe: Timeframe,
    ) -> Result<ChartSeries, MarketError> {
        match self.cache.get_cached_chart(symbol, timeframe).await {
            Ok(Some(points)) => {
                return Ok(ChartSeries {
                    symbol: symbol.clone(),
                    kind,
                    timeframe,
                    points,
                    cache_hit: true,
                })
            }
            Ok(None) => {}
            Err(error) => warn!(%symbol, %timeframe, %error, "chart cache read failed"),
        }

        let spec = timeframe.spec();
        let raw = self
            .source_for(kind)
            .chart_series(symbol.as_str(), spec.fetch_window_days)
            .await?;
        let points = window_points(raw, timeframe, UtcDateTime::now());

        if let Err(error) = self
            .cache
            .cache_chart(symbol, timeframe, &points, DEFAULT_CHART_TTL_MINUTES)
            .await
        {
            warn!(%symbol, %timeframe, %error, "chart cache write failed");
        }

        Ok(ChartSeries {
            symbol: symbol.clone(),
            kind,
            timeframe,
            points,
            cache_hit: false,
        })
    }

    /// Fan out a batch of chart requests concurrently.
    ///
    /// A failing individual request is logged and dropped from the result
    /// list; the batch itself never fails. Result order follows the input
    /// order of the surviving requests.
    pub async fn multi_chart_data(&self, requests: Vec<ChartRequest>) -> Vec<ChartSeries> {
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let engine = self.clone();
            handles.push(tokio::spawn(async move {
                let result = engine
                    .chart_data(&request.symbol, request.kind, request.timeframe)
                    .await;
                (request, result)
            }));
        }

        let mut series = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok((_, Ok(result))) => series.push(result),
                Ok((request, Err(error))) => {
                    warn!(symbol = %request.symbol, timeframe = %request.timeframe, %error,
                        "dropping failed chart request from batch");
                }
                Err(join_error) => {
                    warn!(%join_error, "chart batch task failed to join");
                }
            }
        }
        series
    }

    /// Convenience passthrough to [`validate_chart_data`].
    pub fn validate(&self, points: &[ChartPoint]) -> ChartReport {
        validate_chart_data(points)
    }
}

/// Apply the per-timeframe cutoff, fallback, and sampling rules.
///
/// Guarantees: the result is non-empty whenever `points` is non-empty, its
/// temporal order matches the input, and its length never exceeds
/// `sample_ceiling + 1`.
pub fn window_points(points: Vec<ChartPoint>, timeframe: Timeframe, now: UtcDateTime) -> Vec<ChartPoint> {
    if points.is_empty() {
        return points;
    }
    let spec = timeframe.spec();

    let filtered: Vec<ChartPoint> = match spec.horizon_days {
        Some(days) => {
            let cutoff = now.minus(Duration::days(days));
            points
                .iter()
                .filter(|point| point.ts >= cutoff)
                .cloned()
                .collect()
        }
        None => points.clone(),
    };

    let kept = if filtered.is_empty() {
        // Stale raw data: fall back to the trailing slice so the caller
        // still gets a chart.
        match spec.fallback_points {
            Some(count) => points[points.len().saturating_sub(count)..].to_vec(),
            None => points,
        }
    } else {
        filtered
    };

    sample_points(kept, spec.sample_ceiling)
}

/// Deterministic downsampling: indices `0, step, 2·step, …` with
/// `step = len / ceiling`, then the final original point force-appended if
/// the stride missed it.
pub fn sample_points(points: Vec<ChartPoint>, ceiling: usize) -> Vec<ChartPoint> {
    if ceiling == 0 || points.len() <= ceiling {
        return points;
    }

    let step = points.len() / ceiling;
    let last_index = points.len() - 1;

    let mut sampled = Vec::with_capacity(ceiling + 1);
    let mut took_last = false;
    for index in (0..points.len()).step_by(step) {
        if sampled.len() == ceiling {
            break;
        }
        took_last = index == last_index;
        sampled.push(points[index].clone());
    }
    if !took_last {
        sampled.push(points[last_index].clone());
    }
    sampled
}

/// Flag data-quality defects without mutating the series.
pub fn validate_chart_data(points: &[ChartPoint]) -> ChartReport {
    let mut issues = Vec::new();

    for (index, point) in points.iter().enumerate() {
        let prices = [point.open, point.high, point.low, point.close];
        if prices.iter().any(|price| !price.is_finite()) {
            issues.push(ChartIssue::NonFinitePrice { index });
        } else if prices.iter().any(|price| *price < 0.0) {
            issues.push(ChartIssue::NegativePrice { index });
        } else if point.high < point.low {
            issues.push(ChartIssue::InvertedRange { index });
        }
        if point.volume.is_some_and(|volume| volume < 0.0) {
            issues.push(ChartIssue::NegativeVolume { index });
        }
    }

    if let Some(issue) = detect_abnormal_gaps(points) {
        issues.push(issue);
    }
    if let Some(issue) = detect_excessive_volatility(points) {
        issues.push(issue);
    }

    ChartReport {
        is_valid: issues.is_empty(),
        issues,
    }
}

/// Gaps wider than 2× the mean inter-point interval, affecting more than
/// 10% of intervals.
fn detect_abnormal_gaps(points: &[ChartPoint]) -> Option<ChartIssue> {
    if points.len() < 3 {
        return None;
    }

    let intervals: Vec<i64> = points
        .windows(2)
        .map(|pair| pair[1].ts.unix_millis() - pair[0].ts.unix_millis())
        .collect();
    let mean = intervals.iter().sum::<i64>() as f64 / intervals.len() as f64;
    if mean <= 0.0 {
        return None;
    }

    let abnormal = intervals
        .iter()
        .filter(|interval| **interval as f64 > 2.0 * mean)
        .count();
    let ratio = abnormal as f64 / intervals.len() as f64;
    (ratio > 0.10).then_some(ChartIssue::AbnormalGaps {
        count: abnormal,
        intervals: intervals.len(),
    })
}

/// Close-to-close moves above 50%, affecting more than 5% of transitions.
fn detect_excessive_volatility(points: &[ChartPoint]) -> Option<ChartIssue> {
    if points.len() < 2 {
        return None;
    }

    let transitions = points.len() - 1;
    let spikes = points
        .windows(2)
        .filter(|pair| {
            let previous = pair[0].close;
            previous > 0.0 && ((pair[1].close - previous) / previous).abs() > 0.50
        })
        .count();

    let ratio = spikes as f64 / transitions as f64;
    (ratio > 0.05).then_some(ChartIssue::ExcessiveVolatility {
        count: spikes,
        transitions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily_points(count: usize, end: UtcDateTime) -> Vec<ChartPoint> {
        (0..count)
            .map(|index| {
                let ts = end.minus(Duration::days((count - 1 - index) as i64));
                let price = 100.0 + index as f64;
                ChartPoint::new(ts, price, price + 1.0, price - 1.0, price + 0.5, Some(10.0))
            })
            .collect()
    }

    #[test]
    fn sampling_law_holds_for_awkward_lengths() {
        let now = UtcDateTime::parse("2026-02-20T00:00:00Z").expect("now");
        for len in [25_usize, 100, 365, 1000] {
            for ceiling in [24_usize, 168, 365] {
                let points = daily_points(len, now);
                let sampled = sample_points(points.clone(), ceiling);

                assert!(
                    sampled.len() <= ceiling + 1,
                    "len={len} ceiling={ceiling} got {}",
                    sampled.len()
                );
                assert_eq!(
                    sampled.last(),
                    points.last(),
                    "last original point must survive"
                );
                for pair in sampled.windows(2) {
                    assert!(pair[0].ts < pair[1].ts, "order must be preserved");
                }
            }
        }
    }

    #[test]
    fn sampling_below_ceiling_is_identity() {
        let now = UtcDateTime::parse("2026-02-20T00:00:00Z").expect("now");
        let points = daily_points(20, now);
        assert_eq!(sample_points(points.clone(), 24), points);
    }

    #[test]
    fn cutoff_keeps_recent_points() {
        let now = UtcDateTime::parse("2026-02-20T00:00:00Z").expect("now");
        let points = daily_points(100, now);

        let windowed = window_points(points, Timeframe::OneMonth, now);
        // 35-day horizon over daily data: 36 points survive the cutoff.
        assert_eq!(windowed.len(), 36);
    }

    #[test]
    fn stale_series_falls_back_to_trailing_slice() {
        let now = UtcDateTime::parse("2026-02-20T00:00:00Z").expect("now");
        let stale_end = now.minus(Duration::days(40));
        let points = daily_points(100, stale_end);

        let windowed = window_points(points.clone(), Timeframe::OneMonth, now);
        assert_eq!(windowed.len(), 30);
        assert_eq!(windowed.last(), points.last());
    }

    #[test]
    fn empty_input_stays_empty() {
        let now = UtcDateTime::parse("2026-02-20T00:00:00Z").expect("now");
        assert!(window_points(Vec::new(), Timeframe::OneDay, now).is_empty());
    }

    #[test]
    fn inverted_range_fails_validation() {
        let now = UtcDateTime::parse("2026-02-20T00:00:00Z").expect("now");
        let mut points = daily_points(5, now);
        points[2].high = points[2].low - 1.0;

        let report = validate_chart_data(&points);
        assert!(!report.is_valid);
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, ChartIssue::InvertedRange { index: 2 })));
    }

    #[test]
    fn negative_price_fails_validation() {
        let now = UtcDateTime::parse("2026-02-20T00:00:00Z").expect("now");
        let mut points = daily_points(5, now);
        points[0].open = -4.0;

        let report = validate_chart_data(&points);
        assert!(!report.is_valid);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn abnormal_gaps_are_flagged() {
        let now = UtcDateTime::parse("2026-02-20T00:00:00Z").expect("now");
        // 8 daily steps, then a 30-day hole: 1 of 9 intervals > 2× mean.
        let mut points = daily_points(9, now.minus(Duration::days(30)));
        let last_price = 110.0;
        points.push(ChartPoint::new(
            now,
            last_price,
            last_price + 1.0,
            last_price - 1.0,
            last_price,
            None,
        ));

        let report = validate_chart_data(&points);
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, ChartIssue::AbnormalGaps { count: 1, .. })));
    }

    #[test]
    fn volatility_spikes_are_flagged() {
        let now = UtcDateTime::parse("2026-02-20T00:00:00Z").expect("now");
        let mut points = daily_points(10, now);
        points[5].close = points[4].close * 2.0;

        let report = validate_chart_data(&points);
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, ChartIssue::ExcessiveVolatility { .. })));
    }

    #[test]
    fn clean_series_passes() {
        let now = UtcDateTime::parse("2026-02-20T00:00:00Z").expect("now");
        let report = validate_chart_data(&daily_points(30, now));
        assert!(report.is_valid);
        assert!(report.issues.is_empty());
    }
}
