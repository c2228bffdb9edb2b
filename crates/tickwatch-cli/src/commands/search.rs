use serde_json::Value;

use tickwatch_core::{ApiError, ApiResponse, Asset, AssetKind, MarketDataSource};

use crate::cli::SearchArgs;
use crate::commands::{to_value, AppContext};
use crate::error::CliError;

pub async fn run(context: &AppContext, args: &SearchArgs) -> Result<Value, CliError> {
    let kind: AssetKind = args.class.into();
    let source: &dyn MarketDataSource = match kind {
        AssetKind::Stock => context.equities.as_ref(),
        AssetKind::Crypto => context.crypto.as_ref(),
    };

    let envelope: ApiResponse<Vec<Asset>> = match source.search(&args.query).await {
        Ok(results) => ApiResponse::ok(results),
        Err(error) => ApiResponse::err(ApiError::from(&error)),
    };
    to_value(&envelope)
}
