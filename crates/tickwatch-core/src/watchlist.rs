//! Watchlist domain operations.
//!
//! Uniqueness is enforced by the store's unique index: `add_asset` performs
//! a bare atomic insert and maps the conflict error to the friendlier
//! "already in watchlist" failure. There is no separate pre-check, so two
//! concurrent adds race only inside the store, where exactly one wins.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use tickwatch_store::{Store, StoreError, WatchRecord};

use crate::cache::{CacheError, CacheService, DEFAULT_PRICE_TTL_MINUTES};
use crate::{Asset, AssetKind, PriceSnapshot, Symbol, UtcDateTime, WatchlistEntry};

/// Watchlist operation failures.
#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("{symbol} is already in watchlist")]
    AlreadyTracked { symbol: Symbol },

    #[error("{symbol} is not in watchlist")]
    NotTracked { symbol: Symbol },

    #[error("Failed to {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("watchlist row for '{symbol}' is corrupt: {detail}")]
    CorruptRow { symbol: String, detail: String },
}

impl WatchlistError {
    fn store(op: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store { op, source }
    }
}

/// A watchlist entry joined with its best-effort cached price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedAsset {
    pub entry: WatchlistEntry,
    /// `None` when no unexpired cached price exists; never an error.
    pub current_price: Option<PriceSnapshot>,
}

/// Aggregate watchlist counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatchlistStats {
    pub total: usize,
    pub stocks: usize,
    pub crypto: usize,
    pub with_cached_price: usize,
}

/// Portable watchlist snapshot for export/import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistExport {
    pub version: u32,
    pub exported_at: UtcDateTime,
    pub entries: Vec<WatchlistEntry>,
}

impl WatchlistExport {
    pub const CURRENT_VERSION: u32 = 1;
}

/// Watchlist service over the store and price cache.
pub struct WatchlistService {
    store: Arc<Store>,
    cache: Arc<CacheService>,
}

impl WatchlistService {
    pub fn new(store: Arc<Store>, cache: Arc<CacheService>) -> Self {
        Self { store, cache }
    }

    /// Track a new asset. Fails with [`WatchlistError::AlreadyTracked`] if
    /// the symbol is present; the store is left untouched in that case.
    pub async fn add_asset(&self, asset: Asset) -> Result<WatchlistEntry, WatchlistError> {
        let added_at = UtcDateTime::now();
        let record = WatchRecord {
            symbol: asset.symbol.as_str().to_owned(),
            name: asset.name.clone(),
            kind: asset.kind.as_str().to_owned(),
            exchange: asset.exchange.clone(),
            added_at: added_at.format_rfc3339(),
        };

        match self.store.watchlist_insert(&record) {
            Ok(()) => {
                debug!(symbol = %asset.symbol, "added asset to watchlist");
                Ok(WatchlistEntry { asset, added_at })
            }
            Err(error) if error.is_conflict() => Err(WatchlistError::AlreadyTracked {
                symbol: asset.symbol,
            }),
            Err(error) => Err(WatchlistError::store("add asset to watchlist")(error)),
        }
    }

    /// Stop tracking a symbol. Removing an absent symbol is a no-op success.
    pub async fn remove_asset(&self, symbol: &Symbol) -> Result<(), WatchlistError> {
        let removed = self
            .store
            .watchlist_delete(symbol.as_str())
            .map_err(WatchlistError::store("remove asset from watchlist"))?;
        if removed {
            debug!(%symbol, "removed asset from watchlist");
        }
        Ok(())
    }

    /// All tracked assets joined with best-effort cached prices.
    pub async fn get_watchlist_with_prices(&self) -> Result<Vec<TrackedAsset>, WatchlistError> {
        let entries = self.list_entries()?;
        self.join_prices(entries).await
    }

    /// Tracked assets of one kind, joined with best-effort cached prices.
    pub async fn get_watchlist_by_kind(
        &self,
        kind: AssetKind,
    ) -> Result<Vec<TrackedAsset>, WatchlistError> {
        let entries = self
            .list_entries()?
            .into_iter()
            .filter(|entry| entry.asset.kind == kind)
            .collect();
        self.join_prices(entries).await
    }

    /// Write-through a fresh price for a tracked symbol.
    pub async fn update_asset_price(
        &self,
        snapshot: &PriceSnapshot,
    ) -> Result<(), WatchlistError> {
        let tracked = self
            .store
            .watchlist_get(snapshot.symbol.as_str())
            .map_err(WatchlistError::store("update asset price"))?;
        if tracked.is_none() {
            return Err(WatchlistError::NotTracked {
                symbol: snapshot.symbol.clone(),
            });
        }

        self.cache
            .cache_price(snapshot, DEFAULT_PRICE_TTL_MINUTES)
            .await?;
        Ok(())
    }

    /// Write-through a batch of fresh prices; fails on the first untracked
    /// symbol, before any of the batch is written.
    pub async fn update_multiple_asset_prices(
        &self,
        snapshots: &[PriceSnapshot],
    ) -> Result<(), WatchlistError> {
        for snapshot in snapshots {
            let tracked = self
                .store
                .watchlist_get(snapshot.symbol.as_str())
                .map_err(WatchlistError::store("update asset prices"))?;
            if tracked.is_none() {
                return Err(WatchlistError::NotTracked {
                    symbol: snapshot.symbol.clone(),
                });
            }
        }

        self.cache
            .cache_prices(snapshots, DEFAULT_PRICE_TTL_MINUTES)
            .await?;
        Ok(())
    }

    pub async fn get_stats(&self) -> Result<WatchlistStats, WatchlistError> {
        let entries = self.list_entries()?;
        let symbols: Vec<Symbol> = entries
            .iter()
            .map(|entry| entry.asset.symbol.clone())
            .collect();
        let prices = self.cache.get_cached_prices(&symbols).await?;

        let stocks = entries
            .iter()
            .filter(|entry| entry.asset.kind == AssetKind::Stock)
            .count();

        Ok(WatchlistStats {
            total: entries.len(),
            stocks,
            crypto: entries.len() - stocks,
            with_cached_price: prices.len(),
        })
    }

    pub async fn export_watchlist(&self) -> Result<WatchlistExport, WatchlistError> {
        Ok(WatchlistExport {
            version: WatchlistExport::CURRENT_VERSION,
            exported_at: UtcDateTime::now(),
            entries: self.list_entries()?,
        })
    }

    /// Replace the entire watchlist with the imported entries.
    ///
    /// All-or-nothing: the clear and the bulk insert run in one store
    /// transaction, so a failed import leaves the previous list intact.
    pub async fn import_watchlist(
        &self,
        export: &WatchlistExport,
    ) -> Result<usize, WatchlistError> {
        let records: Vec<WatchRecord> = export
            .entries
            .iter()
            .map(|entry| WatchRecord {
                symbol: entry.asset.symbol.as_str().to_owned(),
                name: entry.asset.name.clone(),
                kind: entry.asset.kind.as_str().to_owned(),
                exchange: entry.asset.exchange.clone(),
                added_at: entry.added_at.format_rfc3339(),
            })
            .collect();

        self.store
            .watchlist_replace_all(&records)
            .map_err(WatchlistError::store("import watchlist"))?;
        debug!(imported = records.len(), "watchlist imported");
        Ok(records.len())
    }

    fn list_entries(&self) -> Result<Vec<WatchlistEntry>, WatchlistError> {
        let records = self
            .store
            .watchlist_list()
            .map_err(WatchlistError::store("list watchlist"))?;

        records.into_iter().map(entry_from_record).collect()
    }

    async fn join_prices(
        &self,
        entries: Vec<WatchlistEntry>,
    ) -> Result<Vec<TrackedAsset>, WatchlistError> {
        let symbols: Vec<Symbol> = entries
            .iter()
            .map(|entry| entry.asset.symbol.clone())
            .collect();
        let mut prices = self.cache.get_cached_prices(&symbols).await?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let current_price = prices.remove(&entry.asset.symbol);
                TrackedAsset {
                    entry,
                    current_price,
                }
            })
            .collect())
    }
}

fn entry_from_record(record: WatchRecord) -> Result<WatchlistEntry, WatchlistError> {
    let corrupt = |detail: String| WatchlistError::CorruptRow {
        symbol: record.symbol.clone(),
        detail,
    };

    let symbol = Symbol::parse(&record.symbol).map_err(|e| corrupt(e.to_string()))?;
    let kind: AssetKind = record.kind.parse().map_err(|e: crate::ValidationError| {
        corrupt(e.to_string())
    })?;
    let added_at = UtcDateTime::parse(&record.added_at).map_err(|e| corrupt(e.to_string()))?;

    Ok(WatchlistEntry {
        asset: Asset {
            symbol,
            name: record.name,
            kind,
            exchange: record.exchange,
        },
        added_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services() -> (Arc<Store>, Arc<CacheService>, WatchlistService) {
        let store = Arc::new(Store::open_in_memory());
        let cache = Arc::new(CacheService::new(Arc::clone(&store)));
        let watchlist = WatchlistService::new(Arc::clone(&store), Arc::clone(&cache));
        (store, cache, watchlist)
    }

    fn asset(symbol: &str, kind: AssetKind) -> Asset {
        Asset::new(
            Symbol::parse(symbol).expect("symbol"),
            format!("{symbol} asset"),
            kind,
            None,
        )
    }

    #[tokio::test]
    async fn duplicate_add_fails_with_friendly_message() {
        let (_, _, watchlist) = services();

        watchlist
            .add_asset(asset("AAPL", AssetKind::Stock))
            .await
            .expect("first add");
        let error = watchlist
            .add_asset(asset("AAPL", AssetKind::Stock))
            .await
            .expect_err("duplicate must fail");

        assert_eq!(error.to_string(), "AAPL is already in watchlist");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (_, _, watchlist) = services();
        let symbol = Symbol::parse("GONE").expect("symbol");

        watchlist
            .remove_asset(&symbol)
            .await
            .expect("removing an absent symbol succeeds");
    }

    #[tokio::test]
    async fn missing_price_joins_as_none() {
        let (_, cache, watchlist) = services();

        watchlist
            .add_asset(asset("AAPL", AssetKind::Stock))
            .await
            .expect("add");
        watchlist
            .add_asset(asset("BTC", AssetKind::Crypto))
            .await
            .expect("add");

        let snapshot = PriceSnapshot::new(
            Symbol::parse("AAPL").expect("symbol"),
            150.25,
            None,
            None,
            None,
            UtcDateTime::now(),
        )
        .expect("snapshot");
        cache.cache_price(&snapshot, 5).await.expect("cache");

        let tracked = watchlist
            .get_watchlist_with_prices()
            .await
            .expect("join");
        assert_eq!(tracked.len(), 2);
        let aapl = tracked
            .iter()
            .find(|t| t.entry.asset.symbol.as_str() == "AAPL")
            .expect("AAPL present");
        assert_eq!(aapl.current_price.as_ref().map(|p| p.price), Some(150.25));
        let btc = tracked
            .iter()
            .find(|t| t.entry.asset.symbol.as_str() == "BTC")
            .expect("BTC present");
        assert!(btc.current_price.is_none());
    }

    #[tokio::test]
    async fn update_price_requires_tracking() {
        let (_, _, watchlist) = services();

        let snapshot = PriceSnapshot::new(
            Symbol::parse("AAPL").expect("symbol"),
            150.25,
            None,
            None,
            None,
            UtcDateTime::now(),
        )
        .expect("snapshot");

        let error = watchlist
            .update_asset_price(&snapshot)
            .await
            .expect_err("untracked symbol must fail");
        assert_eq!(error.to_string(), "AAPL is not in watchlist");
    }

    #[tokio::test]
    async fn stats_count_by_kind_and_cached_price() {
        let (_, cache, watchlist) = services();

        watchlist
            .add_asset(asset("AAPL", AssetKind::Stock))
            .await
            .expect("add");
        watchlist
            .add_asset(asset("MSFT", AssetKind::Stock))
            .await
            .expect("add");
        watchlist
            .add_asset(asset("BTC", AssetKind::Crypto))
            .await
            .expect("add");

        let snapshot = PriceSnapshot::new(
            Symbol::parse("MSFT").expect("symbol"),
            402.0,
            None,
            None,
            None,
            UtcDateTime::now(),
        )
        .expect("snapshot");
        cache.cache_price(&snapshot, 5).await.expect("cache");

        let stats = watchlist.get_stats().await.expect("stats");
        assert_eq!(stats.total, 3);
        assert_eq!(stats.stocks, 2);
        assert_eq!(stats.crypto, 1);
        assert_eq!(stats.with_cached_price, 1);
    }

    #[tokio::test]
    async fn import_replaces_previous_list() {
        let (_, _, watchlist) = services();

        watchlist
            .add_asset(asset("OLD", AssetKind::Stock))
            .await
            .expect("seed");

        let export = WatchlistExport {
            version: WatchlistExport::CURRENT_VERSION,
            exported_at: UtcDateTime::now(),
            entries: vec![
                WatchlistEntry {
                    asset: asset("AAPL", AssetKind::Stock),
                    added_at: UtcDateTime::now(),
                },
                WatchlistEntry {
                    asset: asset("BTC", AssetKind::Crypto),
                    added_at: UtcDateTime::now(),
                },
            ],
        };

        let imported = watchlist.import_watchlist(&export).await.expect("import");
        assert_eq!(imported, 2);

        let tracked = watchlist.get_watchlist_with_prices().await.expect("list");
        let symbols: Vec<&str> = tracked
            .iter()
            .map(|t| t.entry.asset.symbol.as_str())
            .collect();
        assert_eq!(symbols, vec!["AAPL", "BTC"]);
    }
}
