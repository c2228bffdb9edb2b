//! TTL-governed caching over the local store.
//!
//! Reads treat expired rows as absent (lazy expiry); [`CacheService::cleanup_expired`]
//! physically removes them (active expiry). Both paths evaluate the same
//! predicate, `now > expires_at`. Every store failure is wrapped with a
//! stable `"Failed to <op>: <cause>"` message and rethrown; nothing is
//! swallowed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::Duration;

use tickwatch_store::{ChartRecord, CollectionCounts, PriceRecord, Store, StoreError};

use crate::{ChartPoint, PriceSnapshot, Symbol, Timeframe, UtcDateTime};

/// Default TTL for cached prices.
pub const DEFAULT_PRICE_TTL_MINUTES: i64 = 1;
/// Default TTL for cached chart series.
pub const DEFAULT_CHART_TTL_MINUTES: i64 = 5;

/// A store failure wrapped with the operation that hit it.
#[derive(Debug, Error)]
#[error("Failed to {op}: {source}")]
pub struct CacheError {
    pub op: &'static str,
    #[source]
    pub source: StoreError,
}

impl CacheError {
    fn wrap(op: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self { op, source }
    }
}

/// Entry totals per collection plus backend durability.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub watchlist_entries: usize,
    pub price_entries: usize,
    pub chart_entries: usize,
    pub durable: bool,
}

/// Collection health: total/expired/valid splits at the probe instant.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CollectionHealth {
    pub total: usize,
    pub expired: usize,
    pub valid: usize,
}

impl From<CollectionCounts> for CollectionHealth {
    fn from(counts: CollectionCounts) -> Self {
        Self {
            total: counts.total,
            expired: counts.expired,
            valid: counts.valid(),
        }
    }
}

/// Health snapshot across both cache collections.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheHealth {
    pub price: CollectionHealth,
    pub chart: CollectionHealth,
}

/// Result of an expiry sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CleanupReport {
    pub prices_removed: usize,
    pub charts_removed: usize,
}

/// Result of an integrity scan over the cache collections.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
}

/// TTL-tagged read/write orchestration over the store.
pub struct CacheService {
    store: Arc<Store>,
}

impl CacheService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub async fn cache_price(
        &self,
        snapshot: &PriceSnapshot,
        ttl_minutes: i64,
    ) -> Result<(), CacheError> {
        self.cache_price_at(snapshot, ttl_minutes, UtcDateTime::now())
    }

    /// Deterministic-time variant of [`cache_price`](Self::cache_price).
    pub fn cache_price_at(
        &self,
        snapshot: &PriceSnapshot,
        ttl_minutes: i64,
        now: UtcDateTime,
    ) -> Result<(), CacheError> {
        let expires_at_ms = now.plus(Duration::minutes(ttl_minutes.max(0))).unix_millis();
        let record = price_to_record(snapshot, expires_at_ms);
        self.store
            .price_put(&record)
            .map_err(CacheError::wrap("cache price"))
    }

    pub async fn get_cached_price(
        &self,
        symbol: &Symbol,
    ) -> Result<Option<PriceSnapshot>, CacheError> {
        self.get_cached_price_at(symbol, UtcDateTime::now())
    }

    /// Deterministic-time variant of [`get_cached_price`](Self::get_cached_price).
    pub fn get_cached_price_at(
        &self,
        symbol: &Symbol,
        now: UtcDateTime,
    ) -> Result<Option<PriceSnapshot>, CacheError> {
        let record = self
            .store
            .price_get(symbol.as_str())
            .map_err(CacheError::wrap("read cached price"))?;

        let Some(record) = record else {
            return Ok(None);
        };
        if now.unix_millis() > record.expires_at_ms {
            return Ok(None);
        }

        price_from_record(&record)
            .map(Some)
            .map_err(CacheError::wrap("read cached price"))
    }

    pub async fn cache_prices(
        &self,
        snapshots: &[PriceSnapshot],
        ttl_minutes: i64,
    ) -> Result<(), CacheError> {
        let now = UtcDateTime::now();
        for snapshot in snapshots {
            self.cache_price_at(snapshot, ttl_minutes, now)?;
        }
        Ok(())
    }

    pub async fn get_cached_prices(
        &self,
        symbols: &[Symbol],
    ) -> Result<HashMap<Symbol, PriceSnapshot>, CacheError> {
        let now = UtcDateTime::now();
        let mut found = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(snapshot) = self.get_cached_price_at(symbol, now)? {
                found.insert(symbol.clone(), snapshot);
            }
        }
        Ok(found)
    }

    pub async fn cache_chart(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        points: &[ChartPoint],
        ttl_minutes: i64,
    ) -> Result<(), CacheError> {
        self.cache_chart_at(symbol, timeframe, points, ttl_minutes, UtcDateTime::now())
    }

    /// Deterministic-time variant of [`cache_chart`](Self::cache_chart).
    pub fn cache_chart_at(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        points: &[ChartPoint],
        ttl_minutes: i64,
        now: UtcDateTime,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(points)
            .map_err(StoreError::from)
            .map_err(CacheError::wrap("cache chart"))?;

        let record = ChartRecord {
            symbol: symbol.as_str().to_owned(),
            timeframe: timeframe.as_str().to_owned(),
            points: payload,
            last_updated: now.format_rfc3339(),
            expires_at_ms: now.plus(Duration::minutes(ttl_minutes.max(0))).unix_millis(),
        };
        self.store
            .chart_put(&record)
            .map_err(CacheError::wrap("cache chart"))
    }

    pub async fn get_cached_chart(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Option<Vec<ChartPoint>>, CacheError> {
        self.get_cached_chart_at(symbol, timeframe, UtcDateTime::now())
    }

    /// Deterministic-time variant of [`get_cached_chart`](Self::get_cached_chart).
    pub fn get_cached_chart_at(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        now: UtcDateTime,
    ) -> Result<Option<Vec<ChartPoint>>, CacheError> {
        let record = self
            .store
            .chart_get(symbol.as_str(), timeframe.as_str())
            .map_err(CacheError::wrap("read cached chart"))?;

        let Some(record) = record else {
            return Ok(None);
        };
        if now.unix_millis() > record.expires_at_ms {
            return Ok(None);
        }

        let points: Vec<ChartPoint> = serde_json::from_str(&record.points)
            .map_err(StoreError::from)
            .map_err(CacheError::wrap("read cached chart"))?;
        Ok(Some(points))
    }

    pub async fn cleanup_expired(&self) -> Result<CleanupReport, CacheError> {
        self.cleanup_expired_at(UtcDateTime::now())
    }

    /// Deterministic-time variant of [`cleanup_expired`](Self::cleanup_expired).
    pub fn cleanup_expired_at(&self, now: UtcDateTime) -> Result<CleanupReport, CacheError> {
        let now_ms = now.unix_millis();
        let prices_removed = self
            .store
            .price_delete_expired(now_ms)
            .map_err(CacheError::wrap("cleanup expired entries"))?;
        let charts_removed = self
            .store
            .chart_delete_expired(now_ms)
            .map_err(CacheError::wrap("cleanup expired entries"))?;

        Ok(CleanupReport {
            prices_removed,
            charts_removed,
        })
    }

    pub async fn get_stats(&self) -> Result<CacheStats, CacheError> {
        let now_ms = UtcDateTime::now().unix_millis();
        let watchlist_entries = self
            .store
            .watchlist_list()
            .map_err(CacheError::wrap("compute cache stats"))?
            .len();
        let price = self
            .store
            .price_counts(now_ms)
            .map_err(CacheError::wrap("compute cache stats"))?;
        let chart = self
            .store
            .chart_counts(now_ms)
            .map_err(CacheError::wrap("compute cache stats"))?;

        Ok(CacheStats {
            watchlist_entries,
            price_entries: price.total,
            chart_entries: chart.total,
            durable: self.store.is_durable(),
        })
    }

    pub async fn get_health(&self) -> Result<CacheHealth, CacheError> {
        self.get_health_at(UtcDateTime::now())
    }

    /// Deterministic-time variant of [`get_health`](Self::get_health).
    pub fn get_health_at(&self, now: UtcDateTime) -> Result<CacheHealth, CacheError> {
        let now_ms = now.unix_millis();
        let price = self
            .store
            .price_counts(now_ms)
            .map_err(CacheError::wrap("check cache health"))?;
        let chart = self
            .store
            .chart_counts(now_ms)
            .map_err(CacheError::wrap("check cache health"))?;

        Ok(CacheHealth {
            price: price.into(),
            chart: chart.into(),
        })
    }

    /// Scan both collections for rows the service itself could not have
    /// written: unparseable payloads, non-positive prices, broken timestamps.
    pub async fn validate_integrity(&self) -> Result<IntegrityReport, CacheError> {
        let mut issues = Vec::new();

        let prices = self
            .store
            .price_list()
            .map_err(CacheError::wrap("validate cache integrity"))?;
        for record in &prices {
            if !record.price.is_finite() || record.price < 0.0 {
                issues.push(format!(
                    "price_cache[{}]: invalid price {}",
                    record.symbol, record.price
                ));
            }
            if UtcDateTime::parse(&record.as_of).is_err() {
                issues.push(format!(
                    "price_cache[{}]: unparseable as_of '{}'",
                    record.symbol, record.as_of
                ));
            }
            if record.expires_at_ms <= 0 {
                issues.push(format!(
                    "price_cache[{}]: non-positive expiry {}",
                    record.symbol, record.expires_at_ms
                ));
            }
        }

        let charts = self
            .store
            .chart_list()
            .map_err(CacheError::wrap("validate cache integrity"))?;
        for record in &charts {
            match serde_json::from_str::<Vec<ChartPoint>>(&record.points) {
                Ok(points) if points.is_empty() => issues.push(format!(
                    "chart_cache[{}/{}]: empty series",
                    record.symbol, record.timeframe
                )),
                Ok(_) => {}
                Err(error) => issues.push(format!(
                    "chart_cache[{}/{}]: unparseable payload: {error}",
                    record.symbol, record.timeframe
                )),
            }
            if record.expires_at_ms <= 0 {
                issues.push(format!(
                    "chart_cache[{}/{}]: non-positive expiry {}",
                    record.symbol, record.timeframe, record.expires_at_ms
                ));
            }
        }

        Ok(IntegrityReport {
            is_valid: issues.is_empty(),
            issues,
        })
    }
}

fn price_to_record(snapshot: &PriceSnapshot, expires_at_ms: i64) -> PriceRecord {
    PriceRecord {
        symbol: snapshot.symbol.as_str().to_owned(),
        price: snapshot.price,
        volume: snapshot.volume,
        market_cap: snapshot.market_cap,
        change_24h: snapshot.change_24h,
        as_of: snapshot.as_of.format_rfc3339(),
        expires_at_ms,
    }
}

fn price_from_record(record: &PriceRecord) -> Result<PriceSnapshot, StoreError> {
    let symbol = Symbol::parse(&record.symbol).map_err(|error| StoreError::Corrupt {
        detail: format!("price_cache symbol '{}': {error}", record.symbol),
    })?;
    let as_of = UtcDateTime::parse(&record.as_of).map_err(|error| StoreError::Corrupt {
        detail: format!("price_cache as_of '{}': {error}", record.as_of),
    })?;

    PriceSnapshot::new(
        symbol,
        record.price,
        record.volume,
        record.market_cap,
        record.change_24h,
        as_of,
    )
    .map_err(|error| StoreError::Corrupt {
        detail: format!("price_cache row '{}': {error}", record.symbol),
    })
}
