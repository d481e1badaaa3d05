//! Quality gate over the canonical price table.
//!
//! Every rule runs on the whole table, so a failing run reports all problems at once. Data problems
//! never surface as `Err`; they come back as [`Violation`]s inside [`ValidationResult::Fail`].

use crate::domain::prices::PriceTable;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Thresholds for the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityRules {
    pub freshness_sla_days: u32,
}

impl From<&crate::ranking::config::RankingConfig> for QualityRules {
    fn from(cfg: &crate::ranking::config::RankingConfig) -> Self {
        Self {
            freshness_sla_days: cfg.freshness_sla_days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    Close,
    Volume,
    Open,
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Violation {
    DuplicateKey {
        symbol: String,
        trade_date: NaiveDate,
        count: usize,
    },
    MissingSymbol {
        row: usize,
        trade_date: NaiveDate,
    },
    NegativeValue {
        symbol: Option<String>,
        trade_date: NaiveDate,
        field: NumericField,
        value: f64,
    },
    Stale {
        latest_trade_date: Option<NaiveDate>,
        reference_date: NaiveDate,
        gap_days: Option<i64>,
        sla_days: u32,
    },
}

impl Violation {
    pub fn rule(&self) -> &'static str {
        match self {
            Violation::DuplicateKey { .. } => "duplicate_key",
            Violation::MissingSymbol { .. } => "missing_symbol",
            Violation::NegativeValue { .. } => "negative_value",
            Violation::Stale { .. } => "stale",
        }
    }

    fn sort_key(&self) -> (u8, &str, Option<NaiveDate>, Option<NumericField>, usize) {
        match self {
            Violation::DuplicateKey {
                symbol, trade_date, ..
            } => (0, symbol.as_str(), Some(*trade_date), None, 0),
            Violation::MissingSymbol { row, trade_date } => (1, "", Some(*trade_date), None, *row),
            Violation::NegativeValue {
                symbol,
                trade_date,
                field,
                ..
            } => (
                2,
                symbol.as_deref().unwrap_or(""),
                Some(*trade_date),
                Some(*field),
                0,
            ),
            Violation::Stale { .. } => (3, "", None, None, 0),
        }
    }

    fn offending_value(&self) -> f64 {
        match self {
            Violation::NegativeValue { value, .. } => *value,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Pass,
    Fail { violations: Vec<Violation> },
}

impl ValidationResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, ValidationResult::Pass)
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationResult::Pass => &[],
            ValidationResult::Fail { violations } => violations,
        }
    }
}

pub fn validate(
    table: &PriceTable,
    reference_date: NaiveDate,
    rules: &QualityRules,
) -> ValidationResult {
    let mut violations = Vec::new();
    violations.extend(check_duplicate_keys(table));
    violations.extend(check_missing_symbol(table));
    violations.extend(check_non_negative(table));
    violations.extend(check_freshness(table, reference_date, rules.freshness_sla_days));

    if violations.is_empty() {
        return ValidationResult::Pass;
    }

    violations.sort_by(|a, b| {
        a.sort_key()
            .cmp(&b.sort_key())
            .then_with(|| a.offending_value().total_cmp(&b.offending_value()))
    });
    ValidationResult::Fail { violations }
}

fn check_duplicate_keys(table: &PriceTable) -> Vec<Violation> {
    let mut counts = BTreeMap::<(&str, NaiveDate), usize>::new();
    for row in &table.rows {
        if let Some(symbol) = row.symbol() {
            *counts.entry((symbol, row.trade_date)).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((symbol, trade_date), count)| Violation::DuplicateKey {
            symbol: symbol.to_string(),
            trade_date,
            count,
        })
        .collect()
}

fn check_missing_symbol(table: &PriceTable) -> Vec<Violation> {
    table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.symbol().is_none())
        .map(|(row, r)| Violation::MissingSymbol {
            row,
            trade_date: r.trade_date,
        })
        .collect()
}

fn check_non_negative(table: &PriceTable) -> Vec<Violation> {
    let mut out = Vec::new();
    for row in &table.rows {
        let fields = [
            (NumericField::Close, Some(row.close)),
            (NumericField::Volume, Some(row.volume as f64)),
            (NumericField::Open, row.open),
            (NumericField::High, row.high),
            (NumericField::Low, row.low),
        ];

        for (field, value) in fields {
            let Some(value) = value else { continue };
            // NaN fails this comparison as well.
            if !(value >= 0.0) {
                out.push(Violation::NegativeValue {
                    symbol: row.symbol().map(str::to_string),
                    trade_date: row.trade_date,
                    field,
                    value,
                });
            }
        }
    }
    out
}

fn check_freshness(
    table: &PriceTable,
    reference_date: NaiveDate,
    sla_days: u32,
) -> Option<Violation> {
    let Some(latest) = table.latest_trade_date() else {
        return Some(Violation::Stale {
            latest_trade_date: None,
            reference_date,
            gap_days: None,
            sla_days,
        });
    };

    let gap_days = (reference_date - latest).num_days();
    if gap_days > i64::from(sla_days) {
        return Some(Violation::Stale {
            latest_trade_date: Some(latest),
            reference_date,
            gap_days: Some(gap_days),
            sla_days,
        });
    }
    None
}
