//! In-memory fallback backend.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{
    ChartRecord, CollectionCounts, PriceRecord, StoreBackend, StoreError, WatchRecord,
};

#[derive(Debug, Default)]
struct MemoryState {
    watchlist: HashMap<String, WatchRecord>,
    prices: HashMap<String, PriceRecord>,
    charts: HashMap<(String, String), ChartRecord>,
}

/// Non-durable backend with the same semantics as the persistent store.
///
/// Substituted at construction when `DuckDB` is unavailable; everything is
/// lost on process exit. A single mutex covers all three collections, which
/// also makes `watchlist_insert` atomic with respect to concurrent adds.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .expect("memory store mutex should not be poisoned")
    }
}

impl StoreBackend for MemoryBackend {
    fn watchlist_insert(&self, record: &WatchRecord) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.watchlist.contains_key(&record.symbol) {
            return Err(StoreError::Conflict {
                key: record.symbol.clone(),
            });
        }
        state
            .watchlist
            .insert(record.symbol.clone(), record.clone());
        Ok(())
    }

    fn watchlist_get(&self, symbol: &str) -> Result<Option<WatchRecord>, StoreError> {
        Ok(self.lock().watchlist.get(symbol).cloned())
    }

    fn watchlist_delete(&self, symbol: &str) -> Result<bool, StoreError> {
        Ok(self.lock().watchlist.remove(symbol).is_some())
    }

    fn watchlist_list(&self) -> Result<Vec<WatchRecord>, StoreError> {
        let mut records: Vec<WatchRecord> = self.lock().watchlist.values().cloned().collect();
        records.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(records)
    }

    fn watchlist_clear(&self) -> Result<usize, StoreError> {
        let mut state = self.lock();
        let removed = state.watchlist.len();
        state.watchlist.clear();
        Ok(removed)
    }

    fn watchlist_replace_all(&self, records: &[WatchRecord]) -> Result<(), StoreError> {
        // Build the replacement map first so the swap is all-or-nothing.
        let mut replacement = HashMap::with_capacity(records.len());
        for record in records {
            replacement.insert(record.symbol.clone(), record.clone());
        }
        self.lock().watchlist = replacement;
        Ok(())
    }

    fn price_put(&self, record: &PriceRecord) -> Result<(), StoreError> {
        self.lock().prices.insert(record.symbol.clone(), record.clone());
        Ok(())
    }

    fn price_get(&self, symbol: &str) -> Result<Option<PriceRecord>, StoreError> {
        Ok(self.lock().prices.get(symbol).cloned())
    }

    fn price_list(&self) -> Result<Vec<PriceRecord>, StoreError> {
        let mut records: Vec<PriceRecord> = self.lock().prices.values().cloned().collect();
        records.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(records)
    }

    fn price_delete_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        let mut state = self.lock();
        let before = state.prices.len();
        state.prices.retain(|_, record| record.expires_at_ms >= now_ms);
        Ok(before - state.prices.len())
    }

    fn price_counts(&self, now_ms: i64) -> Result<CollectionCounts, StoreError> {
        let state = self.lock();
        let total = state.prices.len();
        let expired = state
            .prices
            .values()
            .filter(|record| record.expires_at_ms < now_ms)
            .count();
        Ok(CollectionCounts { total, expired })
    }

    fn chart_put(&self, record: &ChartRecord) -> Result<(), StoreError> {
        self.lock().charts.insert(
            (record.symbol.clone(), record.timeframe.clone()),
            record.clone(),
        );
        Ok(())
    }

    fn chart_get(&self, symbol: &str, timeframe: &str) -> Result<Option<ChartRecord>, StoreError> {
        Ok(self
            .lock()
            .charts
            .get(&(symbol.to_string(), timeframe.to_string()))
            .cloned())
    }

    fn chart_list(&self) -> Result<Vec<ChartRecord>, StoreError> {
        let mut records: Vec<ChartRecord> = self.lock().charts.values().cloned().collect();
        records.sort_by(|a, b| {
            (a.symbol.as_str(), a.timeframe.as_str()).cmp(&(b.symbol.as_str(), b.timeframe.as_str()))
        });
        Ok(records)
    }

    fn chart_delete_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        let mut state = self.lock();
        let before = state.charts.len();
        state.charts.retain(|_, record| record.expires_at_ms >= now_ms);
        Ok(before - state.charts.len())
    }

    fn chart_counts(&self, now_ms: i64) -> Result<CollectionCounts, StoreError> {
        let state = self.lock();
        let total = state.charts.len();
        let expired = state
            .charts
            .values()
            .filter(|record| record.expires_at_ms < now_ms)
            .count();
        Ok(CollectionCounts { total, expired })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart(symbol: &str, timeframe: &str, expires_at_ms: i64) -> ChartRecord {
        ChartRecord {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            points: String::from("[]"),
            last_updated: "2026-02-20T10:00:00Z".to_string(),
            expires_at_ms,
        }
    }

    #[test]
    fn chart_rows_are_keyed_by_symbol_and_timeframe() {
        let backend = MemoryBackend::new();

        backend.chart_put(&chart("AAPL", "1D", 10)).expect("put");
        backend.chart_put(&chart("AAPL", "1M", 10)).expect("put");

        assert!(backend.chart_get("AAPL", "1D").expect("get").is_some());
        assert!(backend.chart_get("AAPL", "1M").expect("get").is_some());
        assert!(backend.chart_get("AAPL", "1Y").expect("get").is_none());
        assert_eq!(backend.chart_counts(0).expect("counts").total, 2);
    }

    #[test]
    fn expired_rows_are_swept() {
        let backend = MemoryBackend::new();

        backend.chart_put(&chart("AAPL", "1D", 10)).expect("put");
        backend.chart_put(&chart("AAPL", "1M", 50)).expect("put");

        let removed = backend.chart_delete_expired(20).expect("sweep");
        assert_eq!(removed, 1);
        assert!(backend.chart_get("AAPL", "1D").expect("get").is_none());
        assert!(backend.chart_get("AAPL", "1M").expect("get").is_some());
    }
}
