mod cache;
mod chart;
mod details;
mod search;
mod watch;

use std::sync::Arc;

use serde_json::Value;
use tracing::info_span;
use uuid::Uuid;

use tickwatch_core::{
    CacheService, ChartEngine, CryptoClient, EquitiesClient, Store, StoreConfig, WatchlistService,
};

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Explicit service container: every service is constructed exactly once
/// here and borrowed by the command handlers. There are no globals.
pub struct AppContext {
    pub store: Arc<Store>,
    pub cache: Arc<CacheService>,
    pub watchlist: WatchlistService,
    pub equities: Arc<EquitiesClient>,
    pub crypto: Arc<CryptoClient>,
    pub charts: Arc<ChartEngine>,
}

impl AppContext {
    pub fn init() -> Self {
        let store = Arc::new(Store::open(StoreConfig::default()));
        let cache = Arc::new(CacheService::new(Arc::clone(&store)));
        let watchlist = WatchlistService::new(Arc::clone(&store), Arc::clone(&cache));
        let equities = Arc::new(EquitiesClient::from_env());
        let crypto = Arc::new(CryptoClient::from_env());
        let charts = Arc::new(ChartEngine::new(
            Arc::clone(&equities),
            Arc::clone(&crypto),
            Arc::clone(&cache),
        ));

        Self {
            store,
            cache,
            watchlist,
            equities,
            crypto,
            charts,
        }
    }
}

/// Dispatch one CLI invocation to its handler and return the envelope.
pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("request", %request_id);
    let _guard = span.enter();

    let context = AppContext::init();

    match &cli.command {
        Command::Search(args) => search::run(&context, args).await,
        Command::Details(args) => details::run(&context, args).await,
        Command::Chart(args) => chart::run(&context, args).await,
        Command::BatchChart(args) => chart::run_batch(&context, args).await,
        Command::Watch { command } => watch::run(&context, command).await,
        Command::Cache { command } => cache::run(&context, command).await,
    }
}

/// Serialize an envelope for rendering.
pub(crate) fn to_value<T: serde::Serialize>(envelope: &T) -> Result<Value, CliError> {
    Ok(serde_json::to_value(envelope)?)
}
