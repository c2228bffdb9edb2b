//! # Tickwatch Store
//!
//! Local persistent storage for the tickwatch watchlist and market-data
//! caches.
//!
//! ## Overview
//!
//! The store exposes three collections:
//!
//! | Collection | Key | Contents |
//! |------------|-----|----------|
//! | `watchlist` | `symbol` (unique) | tracked assets |
//! | `price_cache` | `symbol` (unique) | latest price snapshot + expiry |
//! | `chart_cache` | `(symbol, timeframe)` (composite unique) | serialized point series + expiry |
//!
//! Both cache collections carry a range-indexed `expires_at_ms` column used
//! by the expiry sweep. The expiry predicate is `now > expires_at`
//! everywhere; rows past expiry are logically absent even before a sweep
//! physically removes them.
//!
//! ## Backends
//!
//! [`Store::open`] probes the `DuckDB` backend once at construction. When the
//! database file cannot be opened (read-only media, unsupported platform),
//! the store degrades to an in-memory backend with identical semantics.
//! The fallback is NOT durable across process restarts; callers can inspect
//! [`Store::is_durable`] but must not rely on the fallback for persistence.
//!
//! ## Security
//!
//! All user-provided values (symbols, names, imported payloads) are passed
//! to `DuckDB` as query parameters, never interpolated into SQL.

pub mod duckdb;
mod memory;
mod migrations;
mod persistent;

use std::env;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

pub use crate::duckdb::{DuckDbConnectionManager, PooledConnection};
pub use memory::MemoryBackend;
pub use persistent::DuckDbBackend;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `DuckDB` database error.
    #[error(transparent)]
    Backend(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Stored payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A unique index rejected the write.
    #[error("key '{key}' already exists")]
    Conflict { key: String },

    /// Stored data violates the schema the store itself maintains.
    #[error("store corrupt: {detail}")]
    Corrupt { detail: String },
}

impl StoreError {
    /// Whether this error is the unique-index conflict signal.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Configuration for the local store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for tickwatch data.
    pub tickwatch_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle pooled connections.
    pub max_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let tickwatch_home = resolve_tickwatch_home();
        let db_path = tickwatch_home.join("store").join("tickwatch.duckdb");
        Self {
            tickwatch_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// A watchlist row.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchRecord {
    /// Normalized symbol (e.g. "AAPL").
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Asset kind tag ("stock" or "crypto").
    pub kind: String,
    /// Listing exchange, if known.
    pub exchange: Option<String>,
    /// RFC 3339 timestamp of when the asset was added.
    pub added_at: String,
}

/// A cached price row.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    /// Normalized symbol.
    pub symbol: String,
    /// Last observed price.
    pub price: f64,
    /// Trailing volume, if the provider reported one.
    pub volume: Option<f64>,
    /// Market capitalization, if reported.
    pub market_cap: Option<f64>,
    /// 24h percentage change, if reported.
    pub change_24h: Option<f64>,
    /// RFC 3339 timestamp of the snapshot.
    pub as_of: String,
    /// Expiry instant as unix milliseconds.
    pub expires_at_ms: i64,
}

/// A cached chart row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRecord {
    /// Normalized symbol.
    pub symbol: String,
    /// Timeframe tag (e.g. "1M").
    pub timeframe: String,
    /// JSON-serialized point series.
    pub points: String,
    /// RFC 3339 timestamp of the last refresh.
    pub last_updated: String,
    /// Expiry instant as unix milliseconds.
    pub expires_at_ms: i64,
}

/// Row counts for one cache collection at a given instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionCounts {
    /// All physically present rows.
    pub total: usize,
    /// Rows past their expiry instant.
    pub expired: usize,
}

impl CollectionCounts {
    /// Rows still inside their TTL window.
    pub const fn valid(self) -> usize {
        self.total - self.expired
    }
}

/// Backend contract implemented by the persistent and in-memory stores.
///
/// Per-record writes are last-write-wins; `watchlist_insert` is the one
/// conflict-detecting operation and `watchlist_replace_all` the one
/// multi-record transaction.
pub trait StoreBackend: Send + Sync {
    fn watchlist_insert(&self, record: &WatchRecord) -> Result<(), StoreError>;
    fn watchlist_get(&self, symbol: &str) -> Result<Option<WatchRecord>, StoreError>;
    fn watchlist_delete(&self, symbol: &str) -> Result<bool, StoreError>;
    fn watchlist_list(&self) -> Result<Vec<WatchRecord>, StoreError>;
    fn watchlist_clear(&self) -> Result<usize, StoreError>;
    fn watchlist_replace_all(&self, records: &[WatchRecord]) -> Result<(), StoreError>;

    fn price_put(&self, record: &PriceRecord) -> Result<(), StoreError>;
    fn price_get(&self, symbol: &str) -> Result<Option<PriceRecord>, StoreError>;
    fn price_list(&self) -> Result<Vec<PriceRecord>, StoreError>;
    fn price_delete_expired(&self, now_ms: i64) -> Result<usize, StoreError>;
    fn price_counts(&self, now_ms: i64) -> Result<CollectionCounts, StoreError>;

    fn chart_put(&self, record: &ChartRecord) -> Result<(), StoreError>;
    fn chart_get(&self, symbol: &str, timeframe: &str) -> Result<Option<ChartRecord>, StoreError>;
    fn chart_list(&self) -> Result<Vec<ChartRecord>, StoreError>;
    fn chart_delete_expired(&self, now_ms: i64) -> Result<usize, StoreError>;
    fn chart_counts(&self, now_ms: i64) -> Result<CollectionCounts, StoreError>;
}

/// The local store, bound to whichever backend the construction probe chose.
pub struct Store {
    backend: Box<dyn StoreBackend>,
    durable: bool,
}

impl Store {
    /// Open the store, preferring the persistent `DuckDB` backend.
    ///
    /// When the database cannot be opened the in-memory backend is
    /// substituted and a warning is logged; the returned store is fully
    /// functional either way.
    pub fn open(config: StoreConfig) -> Self {
        match DuckDbBackend::open(&config) {
            Ok(backend) => Self {
                backend: Box::new(backend),
                durable: true,
            },
            Err(error) => {
                warn!(
                    db_path = %config.db_path.display(),
                    %error,
                    "persistent store unavailable; falling back to in-memory backend"
                );
                Self::open_in_memory()
            }
        }
    }

    /// Open the store with default configuration.
    pub fn open_default() -> Self {
        Self::open(StoreConfig::default())
    }

    /// Open a store backed purely by memory (never durable).
    pub fn open_in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::new()),
            durable: false,
        }
    }

    /// Whether data survives a process restart.
    pub const fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn watchlist_insert(&self, record: &WatchRecord) -> Result<(), StoreError> {
        self.backend.watchlist_insert(record)
    }

    pub fn watchlist_get(&self, symbol: &str) -> Result<Option<WatchRecord>, StoreError> {
        self.backend.watchlist_get(symbol)
    }

    pub fn watchlist_delete(&self, symbol: &str) -> Result<bool, StoreError> {
        self.backend.watchlist_delete(symbol)
    }

    pub fn watchlist_list(&self) -> Result<Vec<WatchRecord>, StoreError> {
        self.backend.watchlist_list()
    }

    pub fn watchlist_clear(&self) -> Result<usize, StoreError> {
        self.backend.watchlist_clear()
    }

    pub fn watchlist_replace_all(&self, records: &[WatchRecord]) -> Result<(), StoreError> {
        self.backend.watchlist_replace_all(records)
    }

    pub fn price_put(&self, record: &PriceRecord) -> Result<(), StoreError> {
        self.backend.price_put(record)
    }

    pub fn price_get(&self, symbol: &str) -> Result<Option<PriceRecord>, StoreError> {
        self.backend.price_get(symbol)
    }

    pub fn price_list(&self) -> Result<Vec<PriceRecord>, StoreError> {
        self.backend.price_list()
    }

    pub fn price_delete_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        self.backend.price_delete_expired(now_ms)
    }

    pub fn price_counts(&self, now_ms: i64) -> Result<CollectionCounts, StoreError> {
        self.backend.price_counts(now_ms)
    }

    pub fn chart_put(&self, record: &ChartRecord) -> Result<(), StoreError> {
        self.backend.chart_put(record)
    }

    pub fn chart_get(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> Result<Option<ChartRecord>, StoreError> {
        self.backend.chart_get(symbol, timeframe)
    }

    pub fn chart_list(&self) -> Result<Vec<ChartRecord>, StoreError> {
        self.backend.chart_list()
    }

    pub fn chart_delete_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        self.backend.chart_delete_expired(now_ms)
    }

    pub fn chart_counts(&self, now_ms: i64) -> Result<CollectionCounts, StoreError> {
        self.backend.chart_counts(now_ms)
    }
}

/// Resolve the tickwatch home directory from environment or default.
fn resolve_tickwatch_home() -> PathBuf {
    if let Some(path) = env::var_os("TICKWATCH_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".tickwatch");
    }

    PathBuf::from(".tickwatch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn watch(symbol: &str) -> WatchRecord {
        WatchRecord {
            symbol: symbol.to_string(),
            name: format!("{symbol} Inc."),
            kind: "stock".to_string(),
            exchange: Some("NASDAQ".to_string()),
            added_at: "2026-02-20T10:00:00Z".to_string(),
        }
    }

    fn price(symbol: &str, expires_at_ms: i64) -> PriceRecord {
        PriceRecord {
            symbol: symbol.to_string(),
            price: 150.25,
            volume: Some(1_000.0),
            market_cap: None,
            change_24h: Some(-0.4),
            as_of: "2026-02-20T10:00:00Z".to_string(),
            expires_at_ms,
        }
    }

    fn open_durable(dir: &tempfile::TempDir) -> Store {
        let tickwatch_home = dir.path().join("home");
        let db_path = tickwatch_home.join("store").join("tickwatch.duckdb");
        Store::open(StoreConfig {
            tickwatch_home,
            db_path,
            max_pool_size: 2,
        })
    }

    #[test]
    fn probe_prefers_persistent_backend() {
        let temp = tempdir().expect("tempdir");
        let store = open_durable(&temp);
        assert!(store.is_durable());
    }

    #[test]
    fn duplicate_insert_surfaces_conflict_without_mutation() {
        let temp = tempdir().expect("tempdir");
        let store = open_durable(&temp);

        store.watchlist_insert(&watch("AAPL")).expect("first insert");
        let mut second = watch("AAPL");
        second.name = String::from("Shadow");
        let error = store
            .watchlist_insert(&second)
            .expect_err("duplicate must conflict");
        assert!(error.is_conflict());

        let kept = store
            .watchlist_get("AAPL")
            .expect("get")
            .expect("row present");
        assert_eq!(kept.name, "AAPL Inc.");
    }

    #[test]
    fn price_put_is_last_write_wins() {
        let temp = tempdir().expect("tempdir");
        let store = open_durable(&temp);

        store.price_put(&price("BTC", 10_000)).expect("first put");
        let mut refreshed = price("BTC", 20_000);
        refreshed.price = 151.0;
        store.price_put(&refreshed).expect("second put");

        let row = store.price_get("BTC").expect("get").expect("present");
        assert_eq!(row.price, 151.0);
        assert_eq!(row.expires_at_ms, 20_000);
    }

    #[test]
    fn expiry_sweep_agrees_with_counts() {
        let temp = tempdir().expect("tempdir");
        let store = open_durable(&temp);

        store.price_put(&price("AAPL", 1_000)).expect("stale row");
        store.price_put(&price("MSFT", 5_000)).expect("fresh row");

        let counts = store.price_counts(2_000).expect("counts");
        assert_eq!(counts.total, 2);
        assert_eq!(counts.expired, 1);
        assert_eq!(counts.valid(), 1);

        let removed = store.price_delete_expired(2_000).expect("sweep");
        assert_eq!(removed, 1);
        assert_eq!(store.price_counts(2_000).expect("counts").total, 1);
    }

    #[test]
    fn replace_all_is_atomic_swap() {
        let temp = tempdir().expect("tempdir");
        let store = open_durable(&temp);

        store.watchlist_insert(&watch("AAPL")).expect("seed");
        store
            .watchlist_replace_all(&[watch("MSFT"), watch("BTC")])
            .expect("replace");

        let listed = store.watchlist_list().expect("list");
        let symbols: Vec<&str> = listed.iter().map(|row| row.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC", "MSFT"]);
    }

    #[test]
    fn memory_backend_has_identical_semantics() {
        let store = Store::open_in_memory();
        assert!(!store.is_durable());

        store.watchlist_insert(&watch("AAPL")).expect("insert");
        let error = store
            .watchlist_insert(&watch("AAPL"))
            .expect_err("duplicate must conflict");
        assert!(error.is_conflict());

        assert!(store.watchlist_delete("AAPL").expect("delete"));
        assert!(!store.watchlist_delete("AAPL").expect("second delete"));
    }
}
