use serde_json::Value;

use tickwatch_core::{
    ApiError, ApiResponse, AssetDetails, AssetKind, MarketDataSource, DEFAULT_PRICE_TTL_MINUTES,
};
use tracing::warn;

use crate::cli::DetailsArgs;
use crate::commands::{to_value, AppContext};
use crate::error::CliError;

pub async fn run(context: &AppContext, args: &DetailsArgs) -> Result<Value, CliError> {
    let kind: AssetKind = args.class.into();
    let source: &dyn MarketDataSource = match kind {
        AssetKind::Stock => context.equities.as_ref(),
        AssetKind::Crypto => context.crypto.as_ref(),
    };

    let envelope: ApiResponse<AssetDetails> = match source.details(&args.symbol).await {
        Ok(details) => {
            // Write-through so watchlist joins see the fresh price.
            if let Err(error) = context
                .cache
                .cache_price(&details.snapshot, DEFAULT_PRICE_TTL_MINUTES)
                .await
            {
                warn!(%error, "price cache write failed");
            }
            ApiResponse::ok(details)
        }
        Err(error) => ApiResponse::err(ApiError::from(&error)),
    };
    to_value(&envelope)
}
