//! Provider clients for upstream market-data sources.
//!
//! Two symmetric clients wrap one REST provider each: [`EquitiesClient`]
//! for stocks and [`CryptoClient`] for crypto assets. Both speak the same
//! protocol: input validation before any I/O, a bounded per-call timeout,
//! policy-driven retry with backoff, and classification of every upstream
//! failure into the closed [`MarketErrorKind`] taxonomy before it leaves
//! the client.
//!
//! Live vs. offline operation is a transport choice, not client logic: the
//! clients always build requests, parse provider-shaped JSON, and normalize
//! into domain types; the [`HttpClient`](http::HttpClient) behind them is
//! either a real `reqwest` transport (credential configured) or a
//! deterministic offline transport that synthesizes provider-shaped
//! payloads.

pub mod crypto;
pub mod equities;
pub mod http;
pub mod pacing;
pub mod policy;
pub mod retry;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{Asset, AssetDetails, AssetKind, ChartPoint};

/// Closed failure taxonomy, stable across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketErrorKind {
    InvalidSymbol,
    AssetNotFound,
    ApiRateLimit,
    NetworkError,
    ExternalApiError,
}

/// Classified provider failure handed to callers.
///
/// Constructed at the boundary between a raw upstream failure and the rest
/// of the system; unrecognized failures map to `ExternalApiError` with the
/// original message preserved in `details`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketError {
    kind: MarketErrorKind,
    message: String,
    details: Option<String>,
    retryable: bool,
}

impl MarketError {
    pub fn invalid_symbol(message: impl Into<String>) -> Self {
        Self {
            kind: MarketErrorKind::InvalidSymbol,
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn asset_not_found(message: impl Into<String>) -> Self {
        Self {
            kind: MarketErrorKind::AssetNotFound,
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: MarketErrorKind::ApiRateLimit,
            message: message.into(),
            details: None,
            retryable: true,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: MarketErrorKind::NetworkError,
            message: message.into(),
            details: None,
            retryable: true,
        }
    }

    pub fn external(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            kind: MarketErrorKind::ExternalApiError,
            message: message.into(),
            details,
            retryable: false,
        }
    }

    pub fn external_transient(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            kind: MarketErrorKind::ExternalApiError,
            message: message.into(),
            details,
            retryable: true,
        }
    }

    pub const fn kind(&self) -> MarketErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// Stable wire code, identical for both providers.
    pub const fn code(&self) -> &'static str {
        match self.kind {
            MarketErrorKind::InvalidSymbol => "INVALID_SYMBOL",
            MarketErrorKind::AssetNotFound => "ASSET_NOT_FOUND",
            MarketErrorKind::ApiRateLimit => "API_RATE_LIMIT",
            MarketErrorKind::NetworkError => "NETWORK_ERROR",
            MarketErrorKind::ExternalApiError => "EXTERNAL_API_ERROR",
        }
    }
}

impl Display for MarketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for MarketError {}

/// Classify a non-success upstream HTTP exchange.
///
/// Some providers report quota exhaustion inside a 200 body, so callers
/// screen successful bodies through [`screen_rate_limit`] as well.
pub fn classify_upstream_failure(provider: &str, status: u16, body: &str) -> MarketError {
    let lowered = body.to_ascii_lowercase();

    if status == 429 || lowered.contains("rate limit") {
        return MarketError::rate_limited(format!("{provider} rate limit exceeded"));
    }
    if status == 404 || lowered.contains("not found") {
        return MarketError::asset_not_found(format!("{provider} has no data for this asset"));
    }
    if status >= 500 {
        return MarketError::external_transient(
            format!("{provider} upstream returned status {status}"),
            Some(truncate_detail(body)),
        );
    }

    MarketError::external(
        format!("{provider} upstream returned status {status}"),
        Some(truncate_detail(body)),
    )
}

/// Detect in-band quota notices inside a successful response body.
pub fn screen_rate_limit(provider: &str, body: &str) -> Result<(), MarketError> {
    if body.to_ascii_lowercase().contains("rate limit") {
        return Err(MarketError::rate_limited(format!(
            "{provider} rate limit exceeded"
        )));
    }
    Ok(())
}

pub(crate) fn symbol_seed(symbol: &str) -> u64 {
    symbol
        .bytes()
        .fold(0u64, |seed, byte| seed.wrapping_mul(31).wrapping_add(u64::from(byte)))
}

pub(crate) fn truncate_detail(body: &str) -> String {
    const MAX_DETAIL_LEN: usize = 256;
    if body.len() <= MAX_DETAIL_LEN {
        return body.to_owned();
    }
    let mut end = MAX_DETAIL_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

/// Provider client contract used by the chart engine and boundary layer.
///
/// Implementations must be `Send + Sync`; they are shared across concurrent
/// fetches.
pub trait MarketDataSource: Send + Sync {
    /// The asset class this source serves.
    fn asset_kind(&self) -> AssetKind;

    /// Search for assets matching a free-text query.
    ///
    /// A blank query resolves to an empty result without any network call.
    fn search<'a>(
        &'a self,
        query: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Asset>, MarketError>> + Send + 'a>>;

    /// Fetch identity and latest snapshot for one symbol.
    ///
    /// A blank symbol fails with `INVALID_SYMBOL` ("symbol is required")
    /// before any network call.
    fn details<'a>(
        &'a self,
        symbol: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<AssetDetails, MarketError>> + Send + 'a>>;

    /// Fetch a raw OHLCV series covering roughly `horizon_days` back.
    fn chart_series<'a>(
        &'a self,
        symbol: &'a str,
        horizon_days: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ChartPoint>, MarketError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_classifies_as_rate_limit() {
        let error = classify_upstream_failure("equities", 429, "slow down");
        assert_eq!(error.kind(), MarketErrorKind::ApiRateLimit);
        assert!(error.retryable());
    }

    #[test]
    fn rate_limit_message_wins_over_status() {
        let error = classify_upstream_failure("crypto", 400, "Rate limit exceeded for key");
        assert_eq!(error.kind(), MarketErrorKind::ApiRateLimit);
    }

    #[test]
    fn not_found_classifies_as_asset_not_found() {
        let error = classify_upstream_failure("crypto", 404, "coin not found");
        assert_eq!(error.kind(), MarketErrorKind::AssetNotFound);
        assert!(!error.retryable());
    }

    #[test]
    fn server_errors_are_transient_external() {
        let error = classify_upstream_failure("equities", 503, "maintenance");
        assert_eq!(error.kind(), MarketErrorKind::ExternalApiError);
        assert!(error.retryable());
        assert_eq!(error.details(), Some("maintenance"));
    }

    #[test]
    fn unrecognized_failures_preserve_original_message() {
        let error = classify_upstream_failure("equities", 418, "short and stout");
        assert_eq!(error.kind(), MarketErrorKind::ExternalApiError);
        assert_eq!(error.details(), Some("short and stout"));
    }

    #[test]
    fn in_band_quota_notice_is_screened() {
        let err = screen_rate_limit("equities", r#"{"Note":"API rate limit is 5 requests"}"#)
            .expect_err("must classify");
        assert_eq!(err.kind(), MarketErrorKind::ApiRateLimit);
    }
}
