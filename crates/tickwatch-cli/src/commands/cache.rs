use serde_json::Value;

use tickwatch_core::{
    ApiError, ApiResponse, CacheHealth, CacheStats, CleanupReport, IntegrityReport,
};

use crate::cli::CacheCommand;
use crate::commands::{to_value, AppContext};
use crate::error::CliError;

pub async fn run(context: &AppContext, command: &CacheCommand) -> Result<Value, CliError> {
    match command {
        CacheCommand::Stats => {
            let envelope: ApiResponse<CacheStats> = match context.cache.get_stats().await {
                Ok(stats) => ApiResponse::ok(stats),
                Err(error) => ApiResponse::err(ApiError::storage(&error)),
            };
            to_value(&envelope)
        }
        CacheCommand::Health => {
            let envelope: ApiResponse<CacheHealth> = match context.cache.get_health().await {
                Ok(health) => ApiResponse::ok(health),
                Err(error) => ApiResponse::err(ApiError::storage(&error)),
            };
            to_value(&envelope)
        }
        CacheCommand::Cleanup => {
            let envelope: ApiResponse<CleanupReport> = match context.cache.cleanup_expired().await
            {
                Ok(report) => ApiResponse::ok(report),
                Err(error) => ApiResponse::err(ApiError::storage(&error)),
            };
            to_value(&envelope)
        }
        CacheCommand::Verify => {
            let envelope: ApiResponse<IntegrityReport> =
                match context.cache.validate_integrity().await {
                    Ok(report) => ApiResponse::ok(report),
                    Err(error) => ApiResponse::err(ApiError::storage(&error)),
                };
            to_value(&envelope)
        }
    }
}
