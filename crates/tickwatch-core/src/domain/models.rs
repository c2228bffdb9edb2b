use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Symbol, UtcDateTime, ValidationError};

/// Tracked asset classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Stock,
    Crypto,
}

impl AssetKind {
    pub const ALL: [Self; 2] = [Self::Stock, Self::Crypto];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Crypto => "crypto",
        }
    }
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stock" => Ok(Self::Stock),
            "crypto" => Ok(Self::Crypto),
            other => Err(ValidationError::InvalidAssetKind {
                value: other.to_owned(),
            }),
        }
    }
}

/// A trackable asset: symbol identity plus display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: Symbol,
    pub name: String,
    pub kind: AssetKind,
    pub exchange: Option<String>,
}

impl Asset {
    pub fn new(
        symbol: Symbol,
        name: impl Into<String>,
        kind: AssetKind,
        exchange: Option<String>,
    ) -> Self {
        Self {
            symbol,
            name: name.into(),
            kind,
            exchange,
        }
    }
}

/// One watchlist membership: an asset plus when it was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub asset: Asset,
    pub added_at: UtcDateTime,
}

/// Latest observed price for a symbol, as normalized from a provider.
///
/// Optional fields stay `None` when the upstream payload does not carry
/// them; that is the explicit "unavailable" marker, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: Symbol,
    pub price: f64,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub change_24h: Option<f64>,
    pub as_of: UtcDateTime,
}

impl PriceSnapshot {
    pub fn new(
        symbol: Symbol,
        price: f64,
        volume: Option<f64>,
        market_cap: Option<f64>,
        change_24h: Option<f64>,
        as_of: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("price", price)?;
        validate_optional_non_negative("volume", volume)?;
        validate_optional_non_negative("market_cap", market_cap)?;
        validate_optional_finite("change_24h", change_24h)?;

        Ok(Self {
            symbol,
            price,
            volume,
            market_cap,
            change_24h,
            as_of,
        })
    }
}

/// One OHLCV chart point.
///
/// Construction is deliberately permissive: inconsistent OHLC ranges coming
/// out of a provider are flagged by `validate_chart_data`, never rejected
/// here, so a chart can still render alongside its warnings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub ts: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl ChartPoint {
    pub fn new(
        ts: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<f64>,
    ) -> Self {
        Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Detail response for a single asset: identity plus its latest snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDetails {
    pub asset: Asset,
    pub snapshot: PriceSnapshot,
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

fn validate_optional_non_negative(
    field: &'static str,
    value: Option<f64>,
) -> Result<(), ValidationError> {
    if let Some(value) = value {
        validate_non_negative(field, value)?;
    }
    Ok(())
}

fn validate_optional_finite(
    field: &'static str,
    value: Option<f64>,
) -> Result<(), ValidationError> {
    if let Some(value) = value {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue { field });
        }
    }
    Ok(())
}
