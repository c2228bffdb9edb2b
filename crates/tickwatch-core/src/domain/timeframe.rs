use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Supported chart timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "1Y")]
    OneYear,
}

/// Windowing parameters for one timeframe.
///
/// The cutoff horizon is wider than the nominal window so that sparse series
/// (weekends, holidays, delayed feeds) still produce a usable chart; when the
/// cutoff filter empties out entirely, `fallback_points` raw points are kept
/// instead. `None` means unbounded (1Y keeps everything the provider sent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeframeSpec {
    /// Cutoff lookback in days; `None` disables the cutoff filter.
    pub horizon_days: Option<i64>,
    /// Trailing raw points to keep when the cutoff filter yields nothing;
    /// `None` keeps the whole raw series.
    pub fallback_points: Option<usize>,
    /// Maximum points after deterministic sampling.
    pub sample_ceiling: usize,
    /// Raw window, in days, requested from the provider.
    pub fetch_window_days: i64,
}

impl Timeframe {
    pub const ALL: [Self; 5] = [
        Self::OneDay,
        Self::OneWeek,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::OneYear,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1D",
            Self::OneWeek => "1W",
            Self::OneMonth => "1M",
            Self::ThreeMonths => "3M",
            Self::OneYear => "1Y",
        }
    }

    /// Declarative windowing table consulted by the chart engine.
    pub const fn spec(self) -> TimeframeSpec {
        match self {
            Self::OneDay => TimeframeSpec {
                horizon_days: Some(7),
                fallback_points: Some(7),
                sample_ceiling: 24,
                fetch_window_days: 7,
            },
            Self::OneWeek => TimeframeSpec {
                horizon_days: Some(10),
                fallback_points: Some(10),
                sample_ceiling: 168,
                fetch_window_days: 10,
            },
            Self::OneMonth => TimeframeSpec {
                horizon_days: Some(35),
                fallback_points: Some(30),
                sample_ceiling: 365,
                fetch_window_days: 35,
            },
            Self::ThreeMonths => TimeframeSpec {
                horizon_days: Some(95),
                fallback_points: Some(90),
                sample_ceiling: 365,
                fetch_window_days: 95,
            },
            Self::OneYear => TimeframeSpec {
                horizon_days: None,
                fallback_points: None,
                sample_ceiling: 365,
                fetch_window_days: 365,
            },
        }
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "1D" => Ok(Self::OneDay),
            "1W" => Ok(Self::OneWeek),
            "1M" => Ok(Self::OneMonth),
            "3M" => Ok(Self::ThreeMonths),
            "1Y" => Ok(Self::OneYear),
            other => Err(ValidationError::InvalidTimeframe {
                value: other.to_owned(),
            }),
        }
    }
}
