//! CLI argument definitions for tickwatch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `search` | Search for assets by free text |
//! | `details` | Fetch the latest snapshot for one symbol |
//! | `chart` | Assemble a windowed chart series |
//! | `batch-chart` | Assemble up to 10 chart series concurrently |
//! | `watch` | Manage the local watchlist |
//! | `cache` | Inspect and maintain the local cache |
//!
//! All output is a JSON response envelope on stdout; logs go to stderr.

use clap::{Args, Parser, Subcommand, ValueEnum};

use tickwatch_core::{AssetKind, Timeframe};

/// tickwatch - personal watchlist and chart tracker
///
/// Market data is fetched from one equities and one crypto provider, cached
/// locally with TTLs, and assembled into bounded chart series. Without
/// provider credentials the clients run in deterministic offline mode.
#[derive(Debug, Parser)]
#[command(
    name = "tickwatch",
    author,
    version,
    about = "Personal watchlist and chart tracker"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Asset class selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClassArg {
    Stock,
    Crypto,
}

impl From<ClassArg> for AssetKind {
    fn from(value: ClassArg) -> Self {
        match value {
            ClassArg::Stock => Self::Stock,
            ClassArg::Crypto => Self::Crypto,
        }
    }
}

/// Chart timeframe selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TimeframeArg {
    #[value(name = "1D")]
    OneDay,
    #[value(name = "1W")]
    OneWeek,
    #[value(name = "1M")]
    OneMonth,
    #[value(name = "3M")]
    ThreeMonths,
    #[value(name = "1Y")]
    OneYear,
}

impl From<TimeframeArg> for Timeframe {
    fn from(value: TimeframeArg) -> Self {
        match value {
            TimeframeArg::OneDay => Self::OneDay,
            TimeframeArg::OneWeek => Self::OneWeek,
            TimeframeArg::OneMonth => Self::OneMonth,
            TimeframeArg::ThreeMonths => Self::ThreeMonths,
            TimeframeArg::OneYear => Self::OneYear,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search for assets by free text.
    Search(SearchArgs),
    /// Fetch the latest snapshot for one symbol.
    Details(DetailsArgs),
    /// Assemble a windowed chart series for one symbol.
    Chart(ChartArgs),
    /// Assemble up to 10 chart series concurrently.
    ///
    /// Each request is SYMBOL:CLASS:TIMEFRAME, e.g. `AAPL:stock:1M`.
    BatchChart(BatchChartArgs),
    /// Manage the local watchlist.
    Watch {
        #[command(subcommand)]
        command: WatchCommand,
    },
    /// Inspect and maintain the local cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Free-text query.
    pub query: String,

    /// Asset class to search.
    #[arg(long, value_enum, default_value_t = ClassArg::Stock)]
    pub class: ClassArg,
}

#[derive(Debug, Args)]
pub struct DetailsArgs {
    /// Symbol to look up.
    pub symbol: String,

    /// Asset class of the symbol.
    #[arg(long, value_enum, default_value_t = ClassArg::Stock)]
    pub class: ClassArg,
}

#[derive(Debug, Args)]
pub struct ChartArgs {
    /// Symbol to chart.
    pub symbol: String,

    /// Asset class of the symbol.
    #[arg(long, value_enum, default_value_t = ClassArg::Stock)]
    pub class: ClassArg,

    /// Chart window.
    #[arg(long, value_enum, default_value_t = TimeframeArg::OneMonth)]
    pub timeframe: TimeframeArg,

    /// Attach a data-quality validation report to the response.
    #[arg(long, default_value_t = false)]
    pub validate: bool,
}

#[derive(Debug, Args)]
pub struct BatchChartArgs {
    /// Requests as SYMBOL:CLASS:TIMEFRAME.
    #[arg(required = true)]
    pub requests: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum WatchCommand {
    /// Add a symbol to the watchlist.
    Add {
        symbol: String,
        #[arg(long, value_enum, default_value_t = ClassArg::Stock)]
        class: ClassArg,
        /// Display name; defaults to the symbol.
        #[arg(long)]
        name: Option<String>,
        /// Listing exchange, if known.
        #[arg(long)]
        exchange: Option<String>,
    },
    /// Remove a symbol from the watchlist (no-op if absent).
    Remove { symbol: String },
    /// List tracked assets with best-effort cached prices.
    List {
        #[arg(long, value_enum)]
        class: Option<ClassArg>,
    },
    /// Watchlist counters.
    Stats,
    /// Refresh prices for all tracked assets and write them through.
    Refresh,
    /// Export the watchlist as a portable JSON document.
    Export,
    /// Import a watchlist export, replacing the current list.
    Import {
        /// Path to a JSON file produced by `watch export`.
        file: std::path::PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Entry totals per collection.
    Stats,
    /// Total/expired/valid splits per cache collection.
    Health,
    /// Physically remove expired cache rows.
    Cleanup,
    /// Scan cache payloads for defects.
    Verify,
}
