use serde::Serialize;
use serde_json::Value;

use tickwatch_core::{
    validate_chart_data, ApiError, ApiResponse, AssetKind, ChartReport, ChartRequest, ChartSeries,
    Symbol, Timeframe, MAX_BATCH_CHART_REQUESTS,
};

use crate::cli::{BatchChartArgs, ChartArgs};
use crate::commands::{to_value, AppContext};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ChartResponse {
    #[serde(flatten)]
    series: ChartSeries,
    #[serde(skip_serializing_if = "Option::is_none")]
    validation: Option<ChartReport>,
}

pub async fn run(context: &AppContext, args: &ChartArgs) -> Result<Value, CliError> {
    let symbol = match Symbol::parse(&args.symbol) {
        Ok(symbol) => symbol,
        Err(error) => {
            let envelope: ApiResponse<ChartResponse> =
                ApiResponse::err(ApiError::invalid_symbol(&error));
            return to_value(&envelope);
        }
    };

    let envelope: ApiResponse<ChartResponse> = match context
        .charts
        .chart_data(&symbol, args.class.into(), args.timeframe.into())
        .await
    {
        Ok(series) => {
            let validation = args.validate.then(|| validate_chart_data(&series.points));
            ApiResponse::ok(ChartResponse { series, validation })
        }
        Err(error) => ApiResponse::err(ApiError::from(&error)),
    };
    to_value(&envelope)
}

pub async fn run_batch(context: &AppContext, args: &BatchChartArgs) -> Result<Value, CliError> {
    if args.requests.len() > MAX_BATCH_CHART_REQUESTS {
        let envelope: ApiResponse<Vec<ChartSeries>> =
            ApiResponse::err(ApiError::method_not_allowed(format!(
                "batch chart accepts at most {MAX_BATCH_CHART_REQUESTS} requests, got {}",
                args.requests.len()
            )));
        return to_value(&envelope);
    }

    let mut requests = Vec::with_capacity(args.requests.len());
    for raw in &args.requests {
        match parse_request(raw) {
            Ok(request) => requests.push(request),
            Err(message) => {
                let envelope: ApiResponse<Vec<ChartSeries>> =
                    ApiResponse::err(ApiError::new("INVALID_SYMBOL", message));
                return to_value(&envelope);
            }
        }
    }

    let series = context.charts.multi_chart_data(requests).await;
    to_value(&ApiResponse::ok(series))
}

/// Parse one `SYMBOL:CLASS:TIMEFRAME` batch spec.
fn parse_request(raw: &str) -> Result<ChartRequest, String> {
    let mut parts = raw.split(':');
    let (Some(symbol), Some(class), Some(timeframe), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(format!(
            "request '{raw}' must be SYMBOL:CLASS:TIMEFRAME, e.g. AAPL:stock:1M"
        ));
    };

    let symbol = Symbol::parse(symbol).map_err(|error| format!("request '{raw}': {error}"))?;
    let kind: AssetKind = class
        .parse()
        .map_err(|error| format!("request '{raw}': {error}"))?;
    let timeframe: Timeframe = timeframe
        .parse()
        .map_err(|error| format!("request '{raw}': {error}"))?;

    Ok(ChartRequest {
        symbol,
        kind,
        timeframe,
    })
}
