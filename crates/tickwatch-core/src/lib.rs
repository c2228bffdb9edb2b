//! # Tickwatch Core
//!
//! Core contracts and services for the tickwatch watchlist/chart tracker.
//!
//! ## Overview
//!
//! This crate provides the data-caching and market-data-retrieval core:
//!
//! - **Canonical domain models** for assets, price snapshots, and chart points
//! - **Cache service**: TTL-tagged read/write orchestration over the store
//! - **Watchlist service**: add/remove/list/stats/import-export with
//!   best-effort price joins
//! - **Provider clients** for the equities and crypto upstreams, with
//!   timeout, retry, pacing, and a closed error taxonomy
//! - **Chart engine**: per-timeframe windowing, deterministic sampling, and
//!   series validation
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | TTL cache service over `tickwatch-store` |
//! | [`chart`] | Chart assembly engine and windowing rules |
//! | [`domain`] | Domain models (Asset, PriceSnapshot, ChartPoint, Timeframe) |
//! | [`envelope`] | Boundary response envelope |
//! | [`error`] | Core error types |
//! | [`provider`] | Provider clients, policies, retry, and pacing |
//! | [`watchlist`] | Watchlist service |
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Caller   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Chart Engine / │────▶│  Cache Service   │──▶ tickwatch-store
//! │  Watchlist Svc  │     └──────────────────┘
//! └────────┬────────┘              ▲
//!          │ (miss)                │ write-through
//!          ▼                       │
//! ┌─────────────────┐     ┌────────┴─────────┐
//! │ Provider Client │────▶│   Normalization  │
//! │ (equities/crypto│     │  + classification│
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Offline mode
//!
//! Without provider credentials the clients run against deterministic
//! offline transports; the whole system stays functional and testable with
//! no network access and no keys.

pub mod cache;
pub mod chart;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod provider;
pub mod watchlist;

// Re-export commonly used types at crate root for convenience

pub use cache::{
    CacheError, CacheHealth, CacheService, CacheStats, CleanupReport, CollectionHealth,
    IntegrityReport, DEFAULT_CHART_TTL_MINUTES, DEFAULT_PRICE_TTL_MINUTES,
};
pub use chart::{
    sample_points, validate_chart_data, window_points, ChartEngine, ChartIssue, ChartReport,
    ChartRequest, ChartSeries,
};
pub use domain::{
    Asset, AssetDetails, AssetKind, ChartPoint, PriceSnapshot, Symbol, Timeframe, TimeframeSpec,
    UtcDateTime, WatchlistEntry,
};
pub use envelope::{ApiError, ApiResponse, MAX_BATCH_CHART_REQUESTS};
pub use error::{CoreError, ValidationError};
pub use provider::crypto::{CryptoClient, CryptoOfflineTransport};
pub use provider::equities::{EquitiesClient, EquitiesOfflineTransport};
pub use provider::http::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use provider::pacing::RequestPacer;
pub use provider::policy::{Backoff, ProviderPolicy};
pub use provider::{MarketDataSource, MarketError, MarketErrorKind};
pub use watchlist::{
    TrackedAsset, WatchlistError, WatchlistExport, WatchlistService, WatchlistStats,
};

// Store types are re-exported so callers need only this crate.
pub use tickwatch_store::{Store, StoreConfig, StoreError};
