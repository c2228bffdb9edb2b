//! Behavior tests for the TTL cache service.
//!
//! These tests verify the cache contract under simulated time: reads inside
//! the TTL window hit, reads past it miss, and the active sweep agrees with
//! the lazy expiry predicate.

use tickwatch_tests::{memory_services, snapshot, symbol};

use tickwatch_core::{ChartPoint, Timeframe, UtcDateTime};
use time::Duration;

fn t0() -> UtcDateTime {
    UtcDateTime::parse("2026-02-20T10:00:00Z").expect("timestamp")
}

#[tokio::test]
async fn price_read_within_ttl_returns_cached_value() {
    // Given: a price cached with the default 1-minute TTL
    let (_, cache, _) = memory_services();
    let now = t0();
    cache
        .cache_price_at(&snapshot("AAPL", 150.25, now), 1, now)
        .expect("cache write");

    // When: the price is read immediately
    let hit = cache
        .get_cached_price_at(&symbol("AAPL"), now)
        .expect("cache read");

    // Then: the cached value comes back
    assert_eq!(hit.expect("must hit").price, 150.25);
}

#[tokio::test]
async fn price_read_after_ttl_returns_absent() {
    // Given: a price cached with a 1-minute TTL
    let (_, cache, _) = memory_services();
    let now = t0();
    cache
        .cache_price_at(&snapshot("AAPL", 150.25, now), 1, now)
        .expect("cache write");

    // When: 61 seconds of simulated time pass
    let later = now.plus(Duration::seconds(61));
    let miss = cache
        .get_cached_price_at(&symbol("AAPL"), later)
        .expect("cache read");

    // Then: the entry is logically absent
    assert!(miss.is_none());
}

#[tokio::test]
async fn read_at_exact_expiry_instant_still_hits() {
    // The predicate is `now > expires_at`; the boundary instant is a hit.
    let (_, cache, _) = memory_services();
    let now = t0();
    cache
        .cache_price_at(&snapshot("AAPL", 150.25, now), 1, now)
        .expect("cache write");

    let at_expiry = now.plus(Duration::seconds(60));
    let hit = cache
        .get_cached_price_at(&symbol("AAPL"), at_expiry)
        .expect("cache read");
    assert!(hit.is_some());
}

#[tokio::test]
async fn sweep_physically_removes_what_lazy_reads_hide() {
    // Given: one stale and one fresh price
    let (_, cache, _) = memory_services();
    let now = t0();
    cache
        .cache_price_at(&snapshot("AAPL", 1.0, now), 1, now)
        .expect("cache write");
    cache
        .cache_price_at(&snapshot("MSFT", 2.0, now), 30, now)
        .expect("cache write");

    let later = now.plus(Duration::minutes(5));

    // When: the sweep runs at the same instant lazy reads use
    let report = cache.cleanup_expired_at(later).expect("sweep");

    // Then: exactly the lazily-hidden row is gone
    assert_eq!(report.prices_removed, 1);
    let health = cache.get_health_at(later).expect("health");
    assert_eq!(health.price.total, 1);
    assert_eq!(health.price.expired, 0);
    assert_eq!(health.price.valid, 1);
}

#[tokio::test]
async fn chart_entries_expire_independently_per_timeframe() {
    let (_, cache, _) = memory_services();
    let now = t0();
    let btc = symbol("BTC");
    let point = ChartPoint::new(now, 1.0, 2.0, 0.5, 1.5, None);

    cache
        .cache_chart_at(&btc, Timeframe::OneDay, &[point.clone()], 1, now)
        .expect("cache write");
    cache
        .cache_chart_at(&btc, Timeframe::OneMonth, &[point], 10, now)
        .expect("cache write");

    let later = now.plus(Duration::minutes(5));
    assert!(cache
        .get_cached_chart_at(&btc, Timeframe::OneDay, later)
        .expect("read")
        .is_none());
    assert!(cache
        .get_cached_chart_at(&btc, Timeframe::OneMonth, later)
        .expect("read")
        .is_some());
}

#[tokio::test]
async fn bulk_prices_round_trip_and_report_only_fresh_entries() {
    let (_, cache, _) = memory_services();
    let now = UtcDateTime::now();

    let snapshots = vec![
        snapshot("AAPL", 150.25, now),
        snapshot("MSFT", 402.0, now),
        snapshot("BTC", 67_000.0, now),
    ];
    cache.cache_prices(&snapshots, 5).await.expect("bulk write");

    let found = cache
        .get_cached_prices(&[symbol("AAPL"), symbol("BTC"), symbol("UNCACHED")])
        .await
        .expect("bulk read");
    assert_eq!(found.len(), 2);
    assert_eq!(found.get(&symbol("AAPL")).expect("AAPL").price, 150.25);
    assert!(!found.contains_key(&symbol("UNCACHED")));
}

#[tokio::test]
async fn stats_report_totals_and_durability() {
    let (_, cache, _) = memory_services();
    let now = UtcDateTime::now();
    cache
        .cache_price_at(&snapshot("AAPL", 1.0, now), 5, now)
        .expect("cache write");

    let stats = cache.get_stats().await.expect("stats");
    assert_eq!(stats.price_entries, 1);
    assert_eq!(stats.chart_entries, 0);
    assert!(!stats.durable, "in-memory fallback is not durable");
}

#[tokio::test]
async fn integrity_scan_passes_on_healthy_cache() {
    let (_, cache, _) = memory_services();
    let now = UtcDateTime::now();
    cache
        .cache_price_at(&snapshot("AAPL", 150.25, now), 5, now)
        .expect("cache write");

    let report = cache.validate_integrity().await.expect("scan");
    assert!(report.is_valid, "issues: {:?}", report.issues);
}
