use std::fs;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use tickwatch_core::{
    ApiError, ApiResponse, Asset, AssetKind, MarketDataSource, PriceSnapshot, Symbol, TrackedAsset,
    WatchlistEntry, WatchlistExport, WatchlistStats,
};

use crate::cli::WatchCommand;
use crate::commands::{to_value, AppContext};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct RemoveOutcome {
    symbol: Symbol,
    removed: bool,
}

#[derive(Debug, Serialize)]
struct ImportOutcome {
    imported: usize,
}

#[derive(Debug, Serialize)]
struct RefreshOutcome {
    refreshed: usize,
    failed: Vec<String>,
}

pub async fn run(context: &AppContext, command: &WatchCommand) -> Result<Value, CliError> {
    match command {
        WatchCommand::Add {
            symbol,
            class,
            name,
            exchange,
        } => add(context, symbol, (*class).into(), name.clone(), exchange.clone()).await,
        WatchCommand::Remove { symbol } => remove(context, symbol).await,
        WatchCommand::List { class } => list(context, class.map(Into::into)).await,
        WatchCommand::Stats => stats(context).await,
        WatchCommand::Refresh => refresh(context).await,
        WatchCommand::Export => export(context).await,
        WatchCommand::Import { file } => import(context, file).await,
    }
}

async fn add(
    context: &AppContext,
    symbol: &str,
    kind: AssetKind,
    name: Option<String>,
    exchange: Option<String>,
) -> Result<Value, CliError> {
    let symbol = match Symbol::parse(symbol) {
        Ok(symbol) => symbol,
        Err(error) => {
            let envelope: ApiResponse<WatchlistEntry> =
                ApiResponse::err(ApiError::invalid_symbol(&error));
            return to_value(&envelope);
        }
    };

    let name = name.unwrap_or_else(|| symbol.as_str().to_owned());
    let asset = Asset::new(symbol, name, kind, exchange);

    let envelope: ApiResponse<WatchlistEntry> = match context.watchlist.add_asset(asset).await {
        Ok(entry) => ApiResponse::ok(entry),
        Err(error) => ApiResponse::err(ApiError::from(&error)),
    };
    to_value(&envelope)
}

async fn remove(context: &AppContext, symbol: &str) -> Result<Value, CliError> {
    let symbol = match Symbol::parse(symbol) {
        Ok(symbol) => symbol,
        Err(error) => {
            let envelope: ApiResponse<RemoveOutcome> =
                ApiResponse::err(ApiError::invalid_symbol(&error));
            return to_value(&envelope);
        }
    };

    let envelope: ApiResponse<RemoveOutcome> = match context.watchlist.remove_asset(&symbol).await
    {
        Ok(()) => ApiResponse::ok(RemoveOutcome {
            symbol,
            removed: true,
        }),
        Err(error) => ApiResponse::err(ApiError::from(&error)),
    };
    to_value(&envelope)
}

async fn list(context: &AppContext, kind: Option<AssetKind>) -> Result<Value, CliError> {
    let result = match kind {
        Some(kind) => context.watchlist.get_watchlist_by_kind(kind).await,
        None => context.watchlist.get_watchlist_with_prices().await,
    };

    let envelope: ApiResponse<Vec<TrackedAsset>> = match result {
        Ok(tracked) => ApiResponse::ok(tracked),
        Err(error) => ApiResponse::err(ApiError::from(&error)),
    };
    to_value(&envelope)
}

async fn stats(context: &AppContext) -> Result<Value, CliError> {
    let envelope: ApiResponse<WatchlistStats> = match context.watchlist.get_stats().await {
        Ok(stats) => ApiResponse::ok(stats),
        Err(error) => ApiResponse::err(ApiError::from(&error)),
    };
    to_value(&envelope)
}

/// Fetch fresh prices for every tracked asset and write them through.
///
/// Individual provider failures skip that symbol; the refresh itself
/// succeeds with the symbols that worked.
async fn refresh(context: &AppContext) -> Result<Value, CliError> {
    let tracked = match context.watchlist.get_watchlist_with_prices().await {
        Ok(tracked) => tracked,
        Err(error) => {
            let envelope: ApiResponse<RefreshOutcome> =
                ApiResponse::err(ApiError::from(&error));
            return to_value(&envelope);
        }
    };

    let mut snapshots: Vec<PriceSnapshot> = Vec::with_capacity(tracked.len());
    let mut failed = Vec::new();
    for item in &tracked {
        let asset = &item.entry.asset;
        let source: &dyn MarketDataSource = match asset.kind {
            AssetKind::Stock => context.equities.as_ref(),
            AssetKind::Crypto => context.crypto.as_ref(),
        };
        match source.details(asset.symbol.as_str()).await {
            Ok(details) => snapshots.push(details.snapshot),
            Err(error) => {
                warn!(symbol = %asset.symbol, %error, "price refresh failed for symbol");
                failed.push(asset.symbol.as_str().to_owned());
            }
        }
    }

    let envelope: ApiResponse<RefreshOutcome> = match context
        .watchlist
        .update_multiple_asset_prices(&snapshots)
        .await
    {
        Ok(()) => ApiResponse::ok(RefreshOutcome {
            refreshed: snapshots.len(),
            failed,
        }),
        Err(error) => ApiResponse::err(ApiError::from(&error)),
    };
    to_value(&envelope)
}

async fn export(context: &AppContext) -> Result<Value, CliError> {
    let envelope: ApiResponse<WatchlistExport> = match context.watchlist.export_watchlist().await {
        Ok(export) => ApiResponse::ok(export),
        Err(error) => ApiResponse::err(ApiError::from(&error)),
    };
    to_value(&envelope)
}

async fn import(context: &AppContext, file: &std::path::Path) -> Result<Value, CliError> {
    let raw = fs::read_to_string(file).map_err(|source| CliError::FileRead {
        path: file.display().to_string(),
        source,
    })?;
    // Accept either a bare export document or the envelope `watch export`
    // prints, so `watch export > f && watch import f` round-trips.
    let mut parsed: serde_json::Value =
        serde_json::from_str(&raw).map_err(|source| CliError::FileParse {
            path: file.display().to_string(),
            source,
        })?;
    let document = if parsed.get("success").is_some() && parsed.get("data").is_some() {
        parsed["data"].take()
    } else {
        parsed
    };
    let export: WatchlistExport =
        serde_json::from_value(document).map_err(|source| CliError::FileParse {
            path: file.display().to_string(),
            source,
        })?;

    let envelope: ApiResponse<ImportOutcome> =
        match context.watchlist.import_watchlist(&export).await {
            Ok(imported) => ApiResponse::ok(ImportOutcome { imported }),
            Err(error) => ApiResponse::err(ApiError::from(&error)),
        };
    to_value(&envelope)
}
