//! Canonical domain types shared across services.

mod models;
mod symbol;
mod timeframe;
mod timestamp;

pub use models::{Asset, AssetDetails, AssetKind, ChartPoint, PriceSnapshot, WatchlistEntry};
pub use symbol::Symbol;
pub use timeframe::{Timeframe, TimeframeSpec};
pub use timestamp::UtcDateTime;
