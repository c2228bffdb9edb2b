//! Equities provider client.
//!
//! Wraps one Alpha-Vantage-style REST provider. The upstream speaks numbered
//! field names ("1. open", "05. price"); normalization translates those into
//! the canonical domain types. Without a credential the client runs against
//! [`EquitiesOfflineTransport`], which synthesizes upstream-shaped payloads,
//! so every code path downstream of the transport is identical in both modes.

use std::collections::BTreeMap;
use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use time::format_description;
use time::Duration;

use crate::provider::http::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
use crate::provider::policy::ProviderPolicy;
use crate::provider::retry::run_with_retry;
use crate::provider::{
    classify_upstream_failure, screen_rate_limit, symbol_seed, truncate_detail, MarketDataSource,
    MarketError,
};
use crate::{Asset, AssetDetails, AssetKind, ChartPoint, PriceSnapshot, Symbol, UtcDateTime};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const API_KEY_ENV: &str = "TICKWATCH_EQUITIES_API_KEY";
const PROVIDER: &str = "equities";

/// Client for the equities provider.
#[derive(Clone)]
pub struct EquitiesClient {
    http: Arc<dyn HttpClient>,
    api_key: String,
    policy: ProviderPolicy,
}

impl EquitiesClient {
    /// Build from the environment: a configured credential selects the live
    /// transport, anything else the deterministic offline transport.
    pub fn from_env() -> Self {
        match env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Self::live(key),
            _ => Self::offline(),
        }
    }

    pub fn live(api_key: impl Into<String>) -> Self {
        Self {
            http: Arc::new(ReqwestHttpClient::new()),
            api_key: api_key.into(),
            policy: ProviderPolicy::equities_default(),
        }
    }

    pub fn offline() -> Self {
        Self {
            http: Arc::new(EquitiesOfflineTransport::default()),
            api_key: String::from("offline"),
            policy: ProviderPolicy::equities_default(),
        }
    }

    /// Swap the transport; used by tests to inject failures.
    pub fn with_transport(http: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            policy: ProviderPolicy::equities_default(),
        }
    }

    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_offline(&self) -> bool {
        self.http.is_offline()
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Asset>, MarketError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{BASE_URL}?function=SYMBOL_SEARCH&keywords={}&apikey={}",
            urlencoding::encode(query),
            self.api_key
        );
        run_with_retry(&self.policy, |_| Box::pin(self.fetch_search(url.clone()))).await
    }

    pub async fn details(&self, symbol: &str) -> Result<AssetDetails, MarketError> {
        let symbol = parse_symbol_input(symbol)?;

        let url = format!(
            "{BASE_URL}?function=GLOBAL_QUOTE&symbol={}&apikey={}",
            urlencoding::encode(symbol.as_str()),
            self.api_key
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

        let url = format!(
            "{BASE_URL}?function=TIME_SERIES_DAILY&outputsize=full&symbol={}&apikey={}",
            urlencoding::encode(symbol.as_str()),
            self.api_key
        );
        run_with_retry(&self.policy, |_| {
            Box::pin(self.fetch_series(symbol.clone(), url.clone(), horizon_days))
        })
        .await
    }

    async fn fetch_search(&self, url: String) -> Result<Vec<Asset>, MarketError> {
        let body = self.get_body(url).await?;
        let parsed: EquitySearchResponse = parse_body(&body)?;

        let results = parsed
            .best_matches
            .into_iter()
            .filter_map(|entry| {
                let symbol = Symbol::parse(&entry.symbol).ok()?;
                Some(Asset::new(symbol, entry.name, AssetKind::Stock, entry.exchange))
            })
            .collect();
        Ok(results)
    }

    async fn fetch_details(&self, symbol: Symbol, url: String) -> Result<AssetDetails, MarketError> {
        let body = self.get_body(url).await?;
        let parsed: EquityQuoteResponse = parse_body(&body)?;

        let Some(quote) = parsed.quote else {
            return Err(MarketError::asset_not_found(format!(
                "equities provider has no quote for {symbol}"
            )));
        };

        let change_24h = quote
            .change_percent
            .as_deref()
            .and_then(|raw| raw.trim().trim_end_matches('%').parse::<f64>().ok());

        let snapshot = PriceSnapshot::new(
            symbol.clone(),
            quote.price,
            quote.volume,
            // The quote endpoint does not carry market cap.
            None,
            change_24h,
            UtcDateTime::now(),
        )
        .map_err(|error| {
            MarketError::external(
                format!("equities quote for {symbol} failed validation: {error}"),
                None,
            )
        })?;

        // The quote endpoint carries no display name; the symbol stands in.
        let asset = Asset::new(symbol.clone(), symbol.as_str(), AssetKind::Stock, None);
        Ok(AssetDetails { asset, snapshot })
    }

    async fn fetch_series(
        &self,
        symbol: Symbol,
        url: String,
        horizon_days: i64,
    ) -> Result<Vec<ChartPoint>, MarketError> {
        let body = self.get_body(url).await?;
        let parsed: EquityDailySeriesResponse = parse_body(&body)?;

        let Some(series) = parsed.series else {
            return Err(MarketError::asset_not_found(format!(
                "equities provider has no daily series for {symbol}"
            )));
        };

        let date_format = format_description::parse("[year]-[month]-[day]").map_err(|error| {
            MarketError::external(format!("daily date format failed to build: {error}"), None)
        })?;
        let cutoff = UtcDateTime::now().minus(Duration::days(horizon_days.max(1)));

        let mut points = Vec::with_capacity(series.len());
        // BTreeMap iteration yields dates oldest-first.
        for (date_str, bar) in series {
            let Ok(date) = time::Date::parse(&date_str, &date_format) else {
                continue;
            };
            let ts = UtcDateTime::from_offset_datetime(date.midnight().assume_utc())
                .map_err(|error| MarketError::external(error.to_string(), None))?;
            if ts < cutoff {
                continue;
            }
            points.push(ChartPoint::new(
                ts, bar.open, bar.high, bar.low, bar.close, bar.volume,
            ));
        }
        Ok(points)
    }

    async fn get_body(&self, url: String) -> Result<String, MarketError> {
        let request =
            HttpRequest::get(url).with_timeout_ms(self.policy.timeout.as_millis() as u64);

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

impl MarketDataSource for EquitiesClient {
    fn asset_kind(&self) -> AssetKind {
        AssetKind::Stock
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

// Upstream response structures (numbered field names are the provider's).

#[derive(Debug, Clone, Deserialize)]
struct EquitySearchResponse {
    #[serde(rename = "bestMatches", default)]
    best_matches: Vec<EquitySearchMatch>,
}

#[derive(Debug, Clone, Deserialize)]
struct EquitySearchMatch {
    #[serde(rename = "1. symbol")]
    symbol: String,
    #[serde(rename = "2. name")]
    name: String,
    #[serde(rename = "4. exchange", default)]
    exchange: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EquityQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    quote: Option<EquityQuoteData>,
}

#[derive(Debug, Clone, Deserialize)]
struct EquityQuoteData {
    #[serde(rename = "05. price")]
    price: f64,
    #[serde(rename = "06. volume", default)]
    volume: Option<f64>,
    #[serde(rename = "10. change percent", default)]
    change_percent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EquityDailySeriesResponse {
    #[serde(rename = "Time Series (Daily)", default)]
    series: Option<BTreeMap<String, EquityDailyBar>>,
}

#[derive(Debug, Clone, Deserialize)]
struct EquityDailyBar {
    #[serde(rename = "1. open")]
    open: f64,
    #[serde(rename = "2. high")]
    high: f64,
    #[serde(rename = "3. low")]
    low: f64,
    #[serde(rename = "4. close")]
    close: f64,
    #[serde(rename = "5. volume", default)]
    volume: Option<f64>,
}

// ============================================================================
// Offline transport
// ============================================================================

const EQUITY_CATALOG: &[(&str, &str, &str)] = &[
    ("AAPL", "Apple Inc.", "NASDAQ"),
    ("MSFT", "Microsoft Corporation", "NASDAQ"),
    ("GOOGL", "Alphabet Inc.", "NASDAQ"),
    ("AMZN", "Amazon.com Inc.", "NASDAQ"),
    ("NVDA", "NVIDIA Corporation", "NASDAQ"),
    ("META", "Meta Platforms Inc.", "NASDAQ"),
    ("TSLA", "Tesla Inc.", "NASDAQ"),
    ("JPM", "JPMorgan Chase & Co.", "NYSE"),
    ("V", "Visa Inc.", "NYSE"),
    ("KO", "The Coca-Cola Company", "NYSE"),
];

/// Deterministic no-credential transport.
///
/// Synthesizes provider-shaped JSON so the client's parsing/normalization
/// path is exercised unchanged: search filters a fixed catalog by substring,
/// quotes and series come from a bounded random walk seeded by the symbol.
#[derive(Debug, Default)]
pub struct EquitiesOfflineTransport;

impl HttpClient for EquitiesOfflineTransport {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let body = if request.url.contains("function=SYMBOL_SEARCH") {
                synth_search(&query_param(&request.url, "keywords").unwrap_or_default())
            } else if request.url.contains("function=GLOBAL_QUOTE") {
                synth_quote(&query_param(&request.url, "symbol").unwrap_or_default())
            } else if request.url.contains("function=TIME_SERIES_DAILY") {
                synth_daily_series(&query_param(&request.url, "symbol").unwrap_or_default())
            } else {
                return Err(HttpError::non_retryable(format!(
                    "offline equities transport has no route for {}",
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

fn synth_search(keywords: &str) -> String {
    let needle = keywords.to_ascii_lowercase();
    let matches: Vec<serde_json::Value> = EQUITY_CATALOG
        .iter()
        .filter(|(symbol, name, _)| {
            symbol.to_ascii_lowercase().contains(&needle)
                || name.to_ascii_lowercase().contains(&needle)
        })
        .map(|(symbol, name, exchange)| {
            serde_json::json!({
                "1. symbol": symbol,
                "2. name": name,
                "3. type": "Equity",
                "4. exchange": exchange,
                "8. currency": "USD",
            })
        })
        .collect();

    serde_json::json!({ "bestMatches": matches }).to_string()
}

fn synth_quote(symbol: &str) -> String {
    let seed = symbol_seed(symbol);
    let mut rng = fastrand::Rng::with_seed(seed);
    let base = 40.0 + (seed % 460) as f64;
    let price = walk_step(&mut rng, base, base);
    let change = (rng.f64() - 0.5) * 6.0;

    serde_json::json!({
        "Global Quote": {
            "01. symbol": symbol,
            "05. price": round_cents(price),
            "06. volume": (500_000 + seed % 9_500_000) as f64,
            "10. change percent": format!("{change:.4}%"),
        }
    })
    .to_string()
}

fn synth_daily_series(symbol: &str) -> String {
    const DAYS: i64 = 400;

    let seed = symbol_seed(symbol);
    let mut rng = fastrand::Rng::with_seed(seed);
    let base = 40.0 + (seed % 460) as f64;
    let mut close = base;

    let date_format = format_description::parse("[year]-[month]-[day]")
        .expect("daily date format is a constant");
    let today = time::OffsetDateTime::now_utc().date();

    let mut series = serde_json::Map::new();
    for back in (0..DAYS).rev() {
        let date = today - Duration::days(back);
        let Ok(key) = date.format(&date_format) else {
            continue;
        };

        let open = close;
        close = walk_step(&mut rng, close, base);
        let high = open.max(close) * (1.0 + rng.f64() * 0.01);
        let low = open.min(close) * (1.0 - rng.f64() * 0.01);

        series.insert(
            key,
            serde_json::json!({
                "1. open": round_cents(open),
                "2. high": round_cents(high),
                "3. low": round_cents(low),
                "4. close": round_cents(close),
                "5. volume": (300_000 + rng.u64(0..5_000_000)) as f64,
            }),
        );
    }

    serde_json::json!({ "Time Series (Daily)": serde_json::Value::Object(series) }).to_string()
}

/// One bounded random-walk step: ±3% drift, clamped to [0.5×, 1.5×] of base.
fn walk_step(rng: &mut fastrand::Rng, current: f64, base: f64) -> f64 {
    let drift = (rng.f64() - 0.5) * 0.06;
    (current * (1.0 + drift)).clamp(base * 0.5, base * 1.5)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MarketErrorKind;

    #[tokio::test]
    async fn offline_search_filters_fixed_catalog() {
        let client = EquitiesClient::offline();

        let results = client.search("AAPL").await.expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol.as_str(), "AAPL");
        assert_eq!(results[0].exchange.as_deref(), Some("NASDAQ"));
    }

    #[tokio::test]
    async fn blank_query_short_circuits_to_empty() {
        let client = EquitiesClient::offline();
        let results = client.search("   ").await.expect("search");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn blank_symbol_is_rejected_before_io() {
        let client = EquitiesClient::offline();
        let error = client.details("").await.expect_err("must fail");
        assert_eq!(error.kind(), MarketErrorKind::InvalidSymbol);
        assert_eq!(error.message(), "symbol is required");
    }

    #[tokio::test]
    async fn offline_quote_is_deterministic_per_symbol() {
        let client = EquitiesClient::offline();

        let first = client.details("MSFT").await.expect("details");
        let second = client.details("MSFT").await.expect("details");
        assert_eq!(first.snapshot.price, second.snapshot.price);
        assert!(first.snapshot.price > 0.0);
    }

    #[tokio::test]
    async fn series_respects_requested_horizon() {
        let client = EquitiesClient::offline();

        let points = client.chart_series("AAPL", 35).await.expect("series");
        assert!(!points.is_empty());
        assert!(points.len() <= 37, "got {} points", points.len());
        for pair in points.windows(2) {
            assert!(pair[0].ts < pair[1].ts, "series must be oldest-first");
        }
    }
}
