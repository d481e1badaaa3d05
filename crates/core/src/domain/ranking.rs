use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Gold row: metrics and rank for one symbol in one calendar week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyMetric {
    pub week_end: NaiveDate,
    pub symbol: String,
    #[serde(default)]
    pub sector: Option<String>,
    pub weekly_close: f64,
    pub rolling_return: f64,
    pub volatility: f64,
    pub max_drawdown: f64,
    pub composite_score: f64,
    pub rank: u32,
}

/// Serving artifact read by the dashboard. Fields are only ever added, with `serde(default)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub schema_version: u32,
    pub week_end: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub lookback_weeks: u32,
    pub top_n: u32,
    pub items: Vec<RankingItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingItem {
    pub rank: u32,
    pub symbol: String,
    #[serde(default)]
    pub sector: Option<String>,
    pub composite_score: f64,
    pub rolling_return: f64,
    pub volatility: f64,
    pub max_drawdown: f64,
}

impl From<&WeeklyMetric> for RankingItem {
    fn from(m: &WeeklyMetric) -> Self {
        Self {
            rank: m.rank,
            symbol: m.symbol.clone(),
            sector: m.sector.clone(),
            composite_score: m.composite_score,
            rolling_return: m.rolling_return,
            volatility: m.volatility,
            max_drawdown: m.max_drawdown,
        }
    }
}
