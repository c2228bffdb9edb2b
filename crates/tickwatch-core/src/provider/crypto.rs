//! Crypto provider client.
//!
//! Wraps one CoinGecko-style REST provider. The upstream is keyed by coin id
//! rather than ticker, so a small symbol→id table sits in front of every
//! call. The provider enforces a requests-per-minute ceiling; all outbound
//! calls (retries included) pass through a [`RequestPacer`] that serializes
//! their timing. Interactive search additionally keeps a short-lived local
//! result cache and falls back to a bulk market listing with local filtering
//! when the search endpoint itself errors.

use std::collections::HashMap;
use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::http::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::provider::pacing::RequestPacer;
use crate::provider::policy::ProviderPolicy;
use crate::provider::retry::run_with_retry;
use crate::provider::{
    classify_upstream_failure, screen_rate_limit, symbol_seed, truncate_detail, MarketDataSource,
    MarketError,
};
use crate::{Asset, AssetDetails, AssetKind, ChartPoint, PriceSnapshot, Symbol, UtcDateTime};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";
const API_KEY_ENV: &str = "TICKWATCH_CRYPTO_API_KEY";
const PROVIDER: &str = "crypto";
const SEARCH_CACHE_TTL: StdDuration = StdDuration::from_secs(300);

/// Well-known ticker → provider coin id mappings; anything else falls back
/// to the lowercased ticker.
const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("ADA", "cardano"),
    ("XRP", "ripple"),
    ("DOGE", "dogecoin"),
    ("DOT", "polkadot"),
    ("LTC", "litecoin"),
    ("LINK", "chainlink"),
    ("AVAX", "avalanche-2"),
];

/// Client for the crypto provider.
#[derive(Clone)]
pub struct CryptoClient {
    http: Arc<dyn HttpClient>,
    api_key: Option<String>,
    policy: ProviderPolicy,
    pacer: Option<RequestPacer>,
    search_cache: SearchCache,
}

impl CryptoClient {
    /// Build from the environment: a configured credential selects the live
    /// transport, anything else the deterministic offline transport.
    pub fn from_env() -> Self {
        match env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Self::live(key),
            _ => Self::offline(),
        }
    }

    pub fn live(api_key: impl Into<String>) -> Self {
        Self::build(Arc::new(ReqwestHttpClient::new()), Some(api_key.into()))
    }

    pub fn offline() -> Self {
        Self::build(Arc::new(CryptoOfflineTransport::default()), None)
    }

    /// Swap the transport; used by tests to inject failures.
    pub fn with_transport(http: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        Self::build(http, api_key)
    }

    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.pacer = policy.min_request_spacing.map(RequestPacer::new);
        self.policy = policy;
        self
    }

    fn build(http: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        let policy = ProviderPolicy::crypto_default();
        Self {
            http,
            api_key,
            pacer: policy.min_request_spacing.map(RequestPacer::new),
            policy,
            search_cache: SearchCache::new(SEARCH_CACHE_TTL),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.http.is_offline()
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Asset>, MarketError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let cache_key = query.to_ascii_lowercase();
        if let Some(cached) = self.search_cache.get(&cache_key).await {
            debug!(query = %cache_key, "crypto search served from local result cache");
            return Ok(cached);
        }

        let url = format!(
            "{BASE_URL}/search?query={}",
            urlencoding::encode(query)
        );
        let primary =
            run_with_retry(&self.policy, |_| Box::pin(self.fetch_search(url.clone()))).await;

        let results = match primary {
            Ok(results) => results,
            Err(primary_error) => {
                warn!(%primary_error, "crypto search endpoint failed; using bulk-listing fallback");
                match run_with_retry(&self.policy, |_| {
                    Box::pin(self.fetch_markets_filtered(cache_key.clone()))
                })
                .await
                {
                    Ok(results) => results,
                    Err(fallback_error) => {
                        debug!(%fallback_error, "crypto bulk-listing fallback also failed");
                        return Err(primary_error);
                    }
                }
            }
        };

        self.search_cache.put(cache_key, results.clone()).await;
        Ok(results)
    }

    pub async fn details(&self, symbol: &str) -> Result<AssetDetails, MarketError> {
        let symbol = parse_symbol_input(symbol)?;
        let coin_id = coin_id_for(&symbol);

        let url = format!(
            "{BASE_URL}/coins/markets?vs_currency=usd&ids={}",
            urlencoding::encode(&coin_id)
        );
        run_with_retry(&self.policy, |_| {
            Box::pin(self.fetch_details(symbol.clone(), url.clone()))
        })
        .await
    }

    pub async fn chart_series(
        &self,
        symbol: &str,
        horizon_days: i64,
    ) -> Result<Vec<ChartPoint>, MarketError> {
        let symbol = parse_symbol_input(symbol)?;
        let coin_id = coin_id_for(&symbol);

        let url = format!(
            "{BASE_URL}/coins/{}/ohlc?vs_currency=usd&days={}",
            urlencoding::encode(&coin_id),
            ohlc_days(horizon_days)
        );
        run_with_retry(&self.policy, |_| Box::pin(self.fetch_series(url.clone()))).await
    }

    async fn fetch_search(&self, url: String) -> Result<Vec<Asset>, MarketError> {
        let body = self.get_body(url).await?;
        let parsed: CryptoSearchResponse = parse_body(&body)?;

        let results = parsed
            .coins
            .into_iter()
            .filter_map(|coin| {
                let symbol = Symbol::parse(&coin.symbol).ok()?;
                Some(Asset::new(symbol, coin.name, AssetKind::Crypto, None))
            })
            .collect();
        Ok(results)
    }

    /// Secondary search strategy: pull the bulk market listing and filter
    /// locally by substring.
    async fn fetch_markets_filtered(&self, needle: String) -> Result<Vec<Asset>, MarketError> {
        let url = format!(
            "{BASE_URL}/coins/markets?vs_currency=usd&order=market_cap_desc&per_page=250&page=1"
        );
        let body = self.get_body(url).await?;
        let rows: Vec<CryptoMarketRow> = parse_body(&body)?;

        let results = rows
            .into_iter()
            .filter(|row| {
                row.symbol.to_ascii_lowercase().contains(&needle)
                    || row.name.to_ascii_lowercase().contains(&needle)
                    || row.id.to_ascii_lowercase().contains(&needle)
            })
            .filter_map(|row| {
                let symbol = Symbol::parse(&row.symbol).ok()?;
                Some(Asset::new(symbol, row.name, AssetKind::Crypto, None))
            })
            .collect();
        Ok(results)
    }

    async fn fetch_details(&self, symbol: Symbol, url: String) -> Result<AssetDetails, MarketError> {
        let body = self.get_body(url).await?;
        let rows: Vec<CryptoMarketRow> = parse_body(&body)?;

        let Some(row) = rows.into_iter().next() else {
            return Err(MarketError::asset_not_found(format!(
                "crypto provider has no market data for {symbol}"
            )));
        };

        let Some(price) = row.current_price else {
            return Err(MarketError::asset_not_found(format!(
                "crypto provider reports no current price for {symbol}"
            )));
        };

        let snapshot = PriceSnapshot::new(
            symbol.clone(),
            price,
            row.total_volume,
            row.market_cap,
            row.price_change_percentage_24h,
            UtcDateTime::now(),
        )
        .map_err(|error| {
            MarketError::external(
                format!("crypto market row for {symbol} failed validation: {error}"),
                None,
            )
        })?;

        let asset = Asset::new(symbol, row.name, AssetKind::Crypto, None);
        Ok(AssetDetails { asset, snapshot })
    }

    async fn fetch_series(&self, url: String) -> Result<Vec<ChartPoint>, MarketError> {
        let body = self.get_body(url).await?;
        let rows: Vec<(i64, f64, f64, f64, f64)> = parse_body(&body)?;

        let mut points = Vec::with_capacity(rows.len());
        for (millis, open, high, low, close) in rows {
            let Ok(ts) = UtcDateTime::from_unix_millis(millis) else {
                continue;
            };
            // The OHLC endpoint carries no volume; `None` marks it absent.
            points.push(ChartPoint::new(ts, open, high, low, close, None));
        }
        points.sort_by_key(|point| point.ts);
        Ok(points)
    }

    async fn get_body(&self, url: String) -> Result<String, MarketError> {
        if let Some(pacer) = &self.pacer {
            pacer.acquire().await;
        }

        let mut request =
            HttpRequest::get(url).with_timeout_ms(self.policy.timeout.as_millis() as u64);
        if let Some(key) = &self.api_key {
            request = request.with_header("x-cg-demo-api-key", key.clone());
        }

        let response = self.http.execute(request).await.map_err(transport_error)?;
        if !response.is_success() {
            return Err(classify_upstream_failure(
                PROVIDER,
                response.status,
                &response.body,
            ));
        }
        screen_rate_limit(PROVIDER, &response.body)?;
        Ok(response.body)
    }
}

impl MarketDataSource for CryptoClient {
    fn asset_kind(&self) -> AssetKind {
        AssetKind::Crypto
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Asset>, MarketError>> + Send + 'a>> {
        Box::pin(self.search(query))
    }

    fn details<'a>(
        &'a self,
        symbol: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<AssetDetails, MarketError>> + Send + 'a>> {
        Box::pin(self.details(symbol))
    }

    fn chart_series<'a>(
        &'a self,
        symbol: &'a str,
        horizon_days: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ChartPoint>, MarketError>> + Send + 'a>> {
        Box::pin(self.chart_series(symbol, horizon_days))
    }
}

fn parse_symbol_input(symbol: &str) -> Result<Symbol, MarketError> {
    if symbol.trim().is_empty() {
        return Err(MarketError::invalid_symbol("symbol is required"));
    }
    Symbol::parse(symbol).map_err(|error| MarketError::invalid_symbol(error.to_string()))
}

fn coin_id_for(symbol: &Symbol) -> String {
    COIN_IDS
        .iter()
        .find(|(ticker, _)| *ticker == symbol.as_str())
        .map(|(_, id)| (*id).to_owned())
        .unwrap_or_else(|| symbol.as_str().to_ascii_lowercase())
}

/// Smallest window the OHLC endpoint accepts that covers the horizon.
fn ohlc_days(horizon_days: i64) -> &'static str {
    match horizon_days {
        i64::MIN..=1 => "1",
        2..=7 => "7",
        8..=14 => "14",
        15..=30 => "30",
        31..=90 => "90",
        91..=180 => "180",
        181..=365 => "365",
        _ => "max",
    }
}

fn transport_error(error: HttpError) -> MarketError {
    if error.retryable() {
        MarketError::network(format!("{PROVIDER} transport error: {}", error.message()))
    } else {
        MarketError::external(
            format!("{PROVIDER} transport error: {}", error.message()),
            None,
        )
    }
}

fn parse_body<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T, MarketError> {
    serde_json::from_str(body).map_err(|error| {
        MarketError::external(
            format!("{PROVIDER} response did not parse: {error}"),
            Some(truncate_detail(body)),
        )
    })
}

// Upstream response structures.

#[derive(Debug, Clone, Deserialize)]
struct CryptoSearchResponse {
    #[serde(default)]
    coins: Vec<CryptoSearchCoin>,
}

#[derive(Debug, Clone, Deserialize)]
struct CryptoSearchCoin {
    symbol: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CryptoMarketRow {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    total_volume: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
}

// ============================================================================
// Short-lived search result cache
// ============================================================================

#[derive(Debug, Clone)]
struct SearchCacheEntry {
    results: Vec<Asset>,
    expires_at: Instant,
}

#[derive(Debug)]
struct SearchCacheInner {
    map: HashMap<String, SearchCacheEntry>,
    ttl: StdDuration,
}

/// In-memory cache for interactive search results, keyed by normalized
/// query. Independent of the persistent cache service; exists purely to
/// blunt duplicate keystroke-by-keystroke queries against the paced quota.
#[derive(Debug, Clone)]
struct SearchCache {
    inner: Arc<tokio::sync::RwLock<SearchCacheInner>>,
}

impl SearchCache {
    fn new(ttl: StdDuration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(SearchCacheInner {
                map: HashMap::new(),
                ttl,
            })),
        }
    }

    async fn get(&self, key: &str) -> Option<Vec<Asset>> {
        let inner = self.inner.read().await;
        inner.map.get(key).and_then(|entry| {
            (Instant::now() <= entry.expires_at).then(|| entry.results.clone())
        })
    }

    async fn put(&self, key: String, results: Vec<Asset>) {
        let mut inner = self.inner.write().await;
        let expires_at = Instant::now() + inner.ttl;
        inner.map.insert(
            key,
            SearchCacheEntry {
                results,
                expires_at,
            },
        );
    }
}

// ============================================================================
// Offline transport
// ============================================================================

const CRYPTO_CATALOG: &[(&str, &str, &str)] = &[
    ("btc", "bitcoin", "Bitcoin"),
    ("eth", "ethereum", "Ethereum"),
    ("sol", "solana", "Solana"),
    ("ada", "cardano", "Cardano"),
    ("xrp", "ripple", "XRP"),
    ("doge", "dogecoin", "Dogecoin"),
    ("dot", "polkadot", "Polkadot"),
    ("ltc", "litecoin", "Litecoin"),
    ("link", "chainlink", "Chainlink"),
    ("avax", "avalanche-2", "Avalanche"),
];

/// Deterministic no-credential transport for the crypto provider.
#[derive(Debug, Default)]
pub struct CryptoOfflineTransport;

impl HttpClient for CryptoOfflineTransport {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let body = if request.url.contains("/search?") {
                synth_search(&query_param(&request.url, "query").unwrap_or_default())
            } else if request.url.contains("/coins/markets") {
                synth_markets(query_param(&request.url, "ids").as_deref())
            } else if let Some(coin_id) = ohlc_coin_id(&request.url) {
                if !CRYPTO_CATALOG.iter().any(|(_, id, _)| *id == coin_id) {
                    return Ok(HttpResponse {
                        status: 404,
                        body: String::from("{\"error\":\"coin not found\"}"),
                    });
                }
                let days = query_param(&request.url, "days").unwrap_or_else(|| String::from("30"));
                synth_ohlc(&coin_id, &days)
            } else {
                return Err(HttpError::non_retryable(format!(
                    "offline crypto transport has no route for {}",
                    request.url
                )));
            };
            Ok(HttpResponse::ok_json(body))
        })
    }

    fn is_offline(&self) -> bool {
        true
    }
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| {
            urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_owned())
        })
    })
}

fn ohlc_coin_id(url: &str) -> Option<String> {
    let (path, _) = url.split_once('?').unwrap_or((url, ""));
    let rest = path.strip_suffix("/ohlc")?;
    let (_, coin_id) = rest.rsplit_once('/')?;
    Some(coin_id.to_owned())
}

fn synth_search(query: &str) -> String {
    let needle = query.to_ascii_lowercase();
    let coins: Vec<serde_json::Value> = CRYPTO_CATALOG
        .iter()
        .filter(|(symbol, id, name)| {
            symbol.contains(&needle)
                || id.contains(&needle)
                || name.to_ascii_lowercase().contains(&needle)
        })
        .map(|(symbol, id, name)| {
            serde_json::json!({ "id": id, "symbol": symbol, "name": name })
        })
        .collect();

    serde_json::json!({ "coins": coins }).to_string()
}

fn synth_markets(ids: Option<&str>) -> String {
    let wanted: Option<Vec<&str>> = ids.map(|raw| raw.split(',').collect());
    let rows: Vec<serde_json::Value> = CRYPTO_CATALOG
        .iter()
        .filter(|(_, id, _)| {
            wanted
                .as_ref()
                .map_or(true, |wanted| wanted.contains(id))
        })
        .map(|(symbol, id, name)| synth_market_row(symbol, id, name))
        .collect();

    serde_json::Value::Array(rows).to_string()
}

fn synth_market_row(symbol: &str, id: &str, name: &str) -> serde_json::Value {
    let seed = symbol_seed(id);
    let mut rng = fastrand::Rng::with_seed(seed);
    let base = 0.05 + (seed % 90_000) as f64;
    let price = walk_step(&mut rng, base, base);

    serde_json::json!({
        "id": id,
        "symbol": symbol,
        "name": name,
        "current_price": round_price(price),
        "total_volume": (1_000_000 + seed % 40_000_000) as f64,
        "market_cap": round_price(price * 19_000_000.0),
        "price_change_percentage_24h": round_price((rng.f64() - 0.5) * 12.0),
    })
}

fn synth_ohlc(coin_id: &str, days: &str) -> String {
    let candles: i64 = match days {
        "max" => 365,
        other => other.parse().unwrap_or(30),
    };

    let seed = symbol_seed(coin_id);
    let mut rng = fastrand::Rng::with_seed(seed);
    let base = 0.05 + (seed % 90_000) as f64;
    let mut close = base;

    let now_ms = (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
    let day_ms: i64 = 86_400_000;

    let mut rows = Vec::with_capacity(candles as usize);
    for back in (0..candles).rev() {
        let ts = now_ms - back * day_ms;
        let open = close;
        close = walk_step(&mut rng, close, base);
        let high = open.max(close) * (1.0 + rng.f64() * 0.015);
        let low = open.min(close) * (1.0 - rng.f64() * 0.015);
        rows.push(serde_json::json!([
            ts,
            round_price(open),
            round_price(high),
            round_price(low),
            round_price(close)
        ]));
    }

    serde_json::Value::Array(rows).to_string()
}

/// One bounded random-walk step: ±4% drift, clamped to [0.5×, 1.5×] of base.
fn walk_step(rng: &mut fastrand::Rng, current: f64, base: f64) -> f64 {
    let drift = (rng.f64() - 0.5) * 0.08;
    (current * (1.0 + drift)).clamp(base * 0.5, base * 1.5)
}

fn round_price(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
