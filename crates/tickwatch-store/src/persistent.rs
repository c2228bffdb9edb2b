//! Persistent `DuckDB` backend.

use std::fs;

use ::duckdb::{Connection, ToSql};

use crate::duckdb::DuckDbConnectionManager;
use crate::{
    migrations, ChartRecord, CollectionCounts, PriceRecord, StoreBackend, StoreConfig, StoreError,
    WatchRecord,
};

/// `DuckDB`-backed store implementation.
///
/// All user-provided values are passed as query parameters, never
/// interpolated into SQL.
#[derive(Clone)]
pub struct DuckDbBackend {
    manager: DuckDbConnectionManager,
}

impl DuckDbBackend {
    /// Open (or create) the database file and apply migrations.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the file
    /// cannot be opened, or a migration fails. `Store::open` treats any of
    /// these as the signal to fall back to the in-memory backend.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let connection = manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        drop(connection);

        Ok(Self { manager })
    }
}

impl StoreBackend for DuckDbBackend {
    fn watchlist_insert(&self, record: &WatchRecord) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 5] = [
            &record.symbol,
            &record.name,
            &record.kind,
            &record.exchange,
            &record.added_at,
        ];
        let inserted = connection.execute(
            "INSERT INTO watchlist (symbol, name, kind, exchange, added_at) \
             VALUES (?, ?, ?, ?, ?)",
            params.as_slice(),
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(StoreError::Conflict {
                key: record.symbol.clone(),
            }),
            Err(error) => Err(StoreError::Backend(error)),
        }
    }

    fn watchlist_get(&self, symbol: &str) -> Result<Option<WatchRecord>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, name, kind, exchange, added_at FROM watchlist WHERE symbol = ?",
        )?;
        let mut rows = statement.query([symbol])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(WatchRecord {
            symbol: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            exchange: row.get(3)?,
            added_at: row.get(4)?,
        }))
    }

    fn watchlist_delete(&self, symbol: &str) -> Result<bool, StoreError> {
        let connection = self.manager.acquire()?;
        let removed = connection.execute("DELETE FROM watchlist WHERE symbol = ?", [symbol])?;
        Ok(removed > 0)
    }

    fn watchlist_list(&self) -> Result<Vec<WatchRecord>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, name, kind, exchange, added_at FROM watchlist ORDER BY symbol",
        )?;
        let mut rows = statement.query([] as [&dyn ToSql; 0])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(WatchRecord {
                symbol: row.get(0)?,
                name: row.get(1)?,
                kind: row.get(2)?,
                exchange: row.get(3)?,
                added_at: row.get(4)?,
            });
        }
        Ok(records)
    }

    fn watchlist_clear(&self) -> Result<usize, StoreError> {
        let connection = self.manager.acquire()?;
        Ok(connection.execute("DELETE FROM watchlist", [] as [&dyn ToSql; 0])?)
    }

    fn watchlist_replace_all(&self, records: &[WatchRecord]) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), StoreError> {
            connection.execute("DELETE FROM watchlist", [] as [&dyn ToSql; 0])?;
            for record in records {
                let params: [&dyn ToSql; 5] = [
                    &record.symbol,
                    &record.name,
                    &record.kind,
                    &record.exchange,
                    &record.added_at,
                ];
                connection.execute(
                    "INSERT INTO watchlist (symbol, name, kind, exchange, added_at) \
                     VALUES (?, ?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    fn price_put(&self, record: &PriceRecord) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 7] = [
            &record.symbol,
            &record.price,
            &record.volume,
            &record.market_cap,
            &record.change_24h,
            &record.as_of,
            &record.expires_at_ms,
        ];
        connection.execute(
            "INSERT OR REPLACE INTO price_cache \
             (symbol, price, volume, market_cap, change_24h, as_of, expires_at_ms) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params.as_slice(),
        )?;
        Ok(())
    }

    fn price_get(&self, symbol: &str) -> Result<Option<PriceRecord>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, price, volume, market_cap, change_24h, as_of, expires_at_ms \
             FROM price_cache WHERE symbol = ?",
        )?;
        let mut rows = statement.query([symbol])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(read_price_row(row)?))
    }

    fn price_list(&self) -> Result<Vec<PriceRecord>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, price, volume, market_cap, change_24h, as_of, expires_at_ms \
             FROM price_cache ORDER BY symbol",
        )?;
        let mut rows = statement.query([] as [&dyn ToSql; 0])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_price_row(row)?);
        }
        Ok(records)
    }

    fn price_delete_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        let connection = self.manager.acquire()?;
        Ok(connection.execute(
            "DELETE FROM price_cache WHERE expires_at_ms < ?",
            [now_ms],
        )?)
    }

    fn price_counts(&self, now_ms: i64) -> Result<CollectionCounts, StoreError> {
        let connection = self.manager.acquire()?;
        count_collection(&connection, "price_cache", now_ms)
    }

    fn chart_put(&self, record: &ChartRecord) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 5] = [
            &record.symbol,
            &record.timeframe,
            &record.points,
            &record.last_updated,
            &record.expires_at_ms,
        ];
        connection.execute(
            "INSERT OR REPLACE INTO chart_cache \
             (symbol, timeframe, points, last_updated, expires_at_ms) \
             VALUES (?, ?, ?, ?, ?)",
            params.as_slice(),
        )?;
        Ok(())
    }

    fn chart_get(&self, symbol: &str, timeframe: &str) -> Result<Option<ChartRecord>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, timeframe, points, last_updated, expires_at_ms \
             FROM chart_cache WHERE symbol = ? AND timeframe = ?",
        )?;
        let mut rows = statement.query([symbol, timeframe])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(read_chart_row(row)?))
    }

    fn chart_list(&self) -> Result<Vec<ChartRecord>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, timeframe, points, last_updated, expires_at_ms \
             FROM chart_cache ORDER BY symbol, timeframe",
        )?;
        let mut rows = statement.query([] as [&dyn ToSql; 0])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_chart_row(row)?);
        }
        Ok(records)
    }

    fn chart_delete_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        let connection = self.manager.acquire()?;
        Ok(connection.execute(
            "DELETE FROM chart_cache WHERE expires_at_ms < ?",
            [now_ms],
        )?)
    }

    fn chart_counts(&self, now_ms: i64) -> Result<CollectionCounts, StoreError> {
        let connection = self.manager.acquire()?;
        count_collection(&connection, "chart_cache", now_ms)
    }
}

fn read_price_row(row: &::duckdb::Row<'_>) -> Result<PriceRecord, ::duckdb::Error> {
    Ok(PriceRecord {
        symbol: row.get(0)?,
        price: row.get(1)?,
        volume: row.get(2)?,
        market_cap: row.get(3)?,
        change_24h: row.get(4)?,
        as_of: row.get(5)?,
        expires_at_ms: row.get(6)?,
    })
}

fn read_chart_row(row: &::duckdb::Row<'_>) -> Result<ChartRecord, ::duckdb::Error> {
    Ok(ChartRecord {
        symbol: row.get(0)?,
        timeframe: row.get(1)?,
        points: row.get(2)?,
        last_updated: row.get(3)?,
        expires_at_ms: row.get(4)?,
    })
}

/// Count total and expired rows of one cache collection.
///
/// The table name is a compile-time constant, never user input.
fn count_collection(
    connection: &Connection,
    table: &str,
    now_ms: i64,
) -> Result<CollectionCounts, StoreError> {
    let sql = format!(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE expires_at_ms < ?) FROM {table}"
    );
    let (total, expired): (i64, i64) =
        connection.query_row(sql.as_str(), [now_ms], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

    Ok(CollectionCounts {
        total: total.max(0) as usize,
        expired: expired.max(0) as usize,
    })
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn is_unique_violation(error: &::duckdb::Error) -> bool {
    let message = error.to_string();
    message.contains("Constraint") || message.contains("Duplicate")
}
