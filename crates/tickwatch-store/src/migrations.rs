use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_collections",
        sql: r#"
CREATE TABLE IF NOT EXISTS watchlist (
    symbol TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    exchange TEXT,
    added_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS price_cache (
    symbol TEXT PRIMARY KEY,
    price DOUBLE NOT NULL,
    volume DOUBLE,
    market_cap DOUBLE,
    change_24h DOUBLE,
    as_of TEXT NOT NULL,
    expires_at_ms BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS chart_cache (
    symbol TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    points TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    expires_at_ms BIGINT NOT NULL,
    PRIMARY KEY(symbol, timeframe)
);
"#,
    },
    Migration {
        version: "0002_expiry_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_price_cache_expires ON price_cache(expires_at_ms);
CREATE INDEX IF NOT EXISTS idx_chart_cache_expires ON chart_cache(expires_at_ms);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let query = format!(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = '{}'",
            escape_sql_string(migration.version)
        );
        let applied_count: i64 = connection.query_row(query.as_str(), [], |row| row.get(0))?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            let insert = format!(
                "INSERT INTO schema_migrations (version) VALUES ('{}')",
                escape_sql_string(migration.version)
            );
            connection.execute_batch(insert.as_str())?;
        }
    }

    Ok(())
}

fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}
