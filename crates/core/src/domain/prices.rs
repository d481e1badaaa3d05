use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of the canonical (Silver) daily price table.
///
/// `symbol` stays optional because the upstream table can carry nulls; the quality gate reports
/// them instead of the loader dropping them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub symbol: Option<String>,
    pub trade_date: NaiveDate,
    pub close: f64,
    pub volume: i64,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub sector: Option<String>,
}

impl PriceRecord {
    pub fn new(symbol: &str, trade_date: NaiveDate, close: f64, volume: i64) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            trade_date,
            close,
            volume,
            open: None,
            high: None,
            low: None,
            sector: None,
        }
    }

    /// Trimmed symbol, `None` when null or blank.
    pub fn symbol(&self) -> Option<&str> {
        self.symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// The canonical price table, read-only to this crate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    pub rows: Vec<PriceRecord>,
}

impl PriceTable {
    pub fn new(rows: Vec<PriceRecord>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn latest_trade_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.trade_date).max()
    }
}

impl From<Vec<PriceRecord>> for PriceTable {
    fn from(rows: Vec<PriceRecord>) -> Self {
        Self::new(rows)
    }
}
