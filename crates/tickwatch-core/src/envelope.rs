//! Boundary response envelope.
//!
//! The thin route layer (here, the CLI) wraps every outcome in this shape:
//! `{ success, data | error{code,message,details}, timestamp }`. Market-data
//! failures carry exactly the provider taxonomy codes; the boundary itself
//! adds `INVALID_SYMBOL` for its own input validation and
//! `METHOD_NOT_ALLOWED` for unsupported operations.

use serde::Serialize;

use crate::cache::CacheError;
use crate::provider::MarketError;
use crate::watchlist::WatchlistError;
use crate::{UtcDateTime, ValidationError};

/// Maximum chart requests accepted by one batch call.
pub const MAX_BATCH_CHART_REQUESTS: usize = 10;

/// Structured error payload for failed responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Boundary-level input validation failure.
    pub fn invalid_symbol(error: &ValidationError) -> Self {
        Self::new("INVALID_SYMBOL", error.to_string())
    }

    /// Boundary-level rejection of an unsupported operation.
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new("METHOD_NOT_ALLOWED", message)
    }

    /// Local store/cache failure surfacing at the boundary.
    pub fn storage(error: &CacheError) -> Self {
        Self::new("STORAGE_ERROR", error.to_string())
    }
}

impl From<&MarketError> for ApiError {
    fn from(error: &MarketError) -> Self {
        Self {
            code: error.code().to_owned(),
            message: error.message().to_owned(),
            details: error.details().map(str::to_owned),
        }
    }
}

impl From<&WatchlistError> for ApiError {
    fn from(error: &WatchlistError) -> Self {
        let code = match error {
            WatchlistError::AlreadyTracked { .. } => "ALREADY_IN_WATCHLIST",
            WatchlistError::NotTracked { .. } => "NOT_IN_WATCHLIST",
            WatchlistError::Store { .. } | WatchlistError::Cache(_) => "STORAGE_ERROR",
            WatchlistError::CorruptRow { .. } => "STORAGE_ERROR",
        };
        Self::new(code, error.to_string())
    }
}

/// Response envelope for all boundary outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub timestamp: UtcDateTime,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: UtcDateTime::now(),
        }
    }

    pub fn err(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            timestamp: UtcDateTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MarketError;

    #[test]
    fn market_errors_keep_taxonomy_codes() {
        let error = MarketError::rate_limited("equities rate limit exceeded");
        let api: ApiError = (&error).into();
        assert_eq!(api.code, "API_RATE_LIMIT");
        assert_eq!(api.message, "equities rate limit exceeded");
        assert!(api.details.is_none());
    }

    #[test]
    fn external_errors_preserve_details() {
        let error = MarketError::external("upstream exploded", Some(String::from("raw body")));
        let api: ApiError = (&error).into();
        assert_eq!(api.code, "EXTERNAL_API_ERROR");
        assert_eq!(api.details.as_deref(), Some("raw body"));
    }

    #[test]
    fn success_envelope_serializes_without_error_field() {
        let response = ApiResponse::ok(vec![1, 2, 3]);
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
        assert_eq!(json["data"][2], 3);
    }

    #[test]
    fn failure_envelope_serializes_without_data_field() {
        let response: ApiResponse<()> =
            ApiResponse::err(ApiError::method_not_allowed("PUT is not supported"));
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
        assert_eq!(json["error"]["code"], "METHOD_NOT_ALLOWED");
    }
}
