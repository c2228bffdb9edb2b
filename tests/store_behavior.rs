//! Behavior tests for the local store: backend parity, unique-index
//! conflicts, last-write-wins, and the expiry predicate.

use tempfile::tempdir;

use tickwatch_store::{ChartRecord, PriceRecord, Store, StoreConfig, WatchRecord};

fn durable_store(temp: &tempfile::TempDir) -> Store {
    let tickwatch_home = temp.path().join("home");
    let db_path = tickwatch_home.join("store").join("tickwatch.duckdb");
    Store::open(StoreConfig {
        tickwatch_home,
        db_path,
        max_pool_size: 2,
    })
}

fn watch(symbol: &str) -> WatchRecord {
    WatchRecord {
        symbol: symbol.to_string(),
        name: format!("{symbol} Inc."),
        kind: "stock".to_string(),
        exchange: None,
        added_at: "2026-02-20T10:00:00Z".to_string(),
    }
}

fn price(symbol: &str, price: f64, expires_at_ms: i64) -> PriceRecord {
    PriceRecord {
        symbol: symbol.to_string(),
        price,
        volume: None,
        market_cap: None,
        change_24h: None,
        as_of: "2026-02-20T10:00:00Z".to_string(),
        expires_at_ms,
    }
}

fn chart(symbol: &str, timeframe: &str, expires_at_ms: i64) -> ChartRecord {
    ChartRecord {
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        points: "[]".to_string(),
        last_updated: "2026-02-20T10:00:00Z".to_string(),
        expires_at_ms,
    }
}

/// Run the same assertions against both backends.
fn both_backends(check: impl Fn(&Store)) {
    let temp = tempdir().expect("tempdir");
    let durable = durable_store(&temp);
    assert!(durable.is_durable());
    check(&durable);

    let memory = Store::open_in_memory();
    assert!(!memory.is_durable());
    check(&memory);
}

#[test]
fn duplicate_watchlist_insert_conflicts_on_both_backends() {
    both_backends(|store| {
        store.watchlist_insert(&watch("AAPL")).expect("insert");
        let error = store
            .watchlist_insert(&watch("AAPL"))
            .expect_err("duplicate must conflict");
        assert!(error.is_conflict());
        assert_eq!(store.watchlist_list().expect("list").len(), 1);
    });
}

#[test]
fn price_rows_are_last_write_wins_per_symbol() {
    both_backends(|store| {
        store.price_put(&price("AAPL", 1.0, 10)).expect("put");
        store.price_put(&price("AAPL", 2.0, 20)).expect("put");

        let row = store.price_get("AAPL").expect("get").expect("present");
        assert_eq!(row.price, 2.0);
        assert_eq!(row.expires_at_ms, 20);
        assert_eq!(store.price_counts(0).expect("counts").total, 1);
    });
}

#[test]
fn chart_rows_are_keyed_by_symbol_and_timeframe() {
    both_backends(|store| {
        store.chart_put(&chart("AAPL", "1D", 10)).expect("put");
        store.chart_put(&chart("AAPL", "1M", 10)).expect("put");
        store.chart_put(&chart("BTC", "1D", 10)).expect("put");

        assert_eq!(store.chart_counts(0).expect("counts").total, 3);
        assert!(store.chart_get("AAPL", "1M").expect("get").is_some());
        assert!(store.chart_get("BTC", "1M").expect("get").is_none());
    });
}

#[test]
fn expiry_predicate_is_strictly_greater_than() {
    both_backends(|store| {
        store.price_put(&price("AAPL", 1.0, 1_000)).expect("put");

        // At exactly the expiry instant the row is still valid.
        let counts = store.price_counts(1_000).expect("counts");
        assert_eq!(counts.expired, 0);
        assert_eq!(store.price_delete_expired(1_000).expect("sweep"), 0);

        // One millisecond later it is expired and sweepable.
        let counts = store.price_counts(1_001).expect("counts");
        assert_eq!(counts.expired, 1);
        assert_eq!(store.price_delete_expired(1_001).expect("sweep"), 1);
    });
}

#[test]
fn replace_all_swaps_the_whole_watchlist() {
    both_backends(|store| {
        store.watchlist_insert(&watch("OLD")).expect("seed");
        store
            .watchlist_replace_all(&[watch("AAPL"), watch("MSFT")])
            .expect("replace");

        let symbols: Vec<String> = store
            .watchlist_list()
            .expect("list")
            .into_iter()
            .map(|row| row.symbol)
            .collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    });
}

#[test]
fn watchlist_delete_reports_presence() {
    both_backends(|store| {
        store.watchlist_insert(&watch("AAPL")).expect("insert");
        assert!(store.watchlist_delete("AAPL").expect("delete"));
        assert!(!store.watchlist_delete("AAPL").expect("second delete"));
    });
}

#[test]
fn durable_store_persists_across_reopen() {
    let temp = tempdir().expect("tempdir");
    {
        let store = durable_store(&temp);
        store.watchlist_insert(&watch("AAPL")).expect("insert");
        store.price_put(&price("AAPL", 150.25, i64::MAX)).expect("put");
    }

    let reopened = durable_store(&temp);
    assert!(reopened
        .watchlist_get("AAPL")
        .expect("get")
        .is_some());
    assert_eq!(
        reopened
            .price_get("AAPL")
            .expect("get")
            .expect("present")
            .price,
        150.25
    );
}
