//! Gold-layer ranking engine.
//!
//! Weekly resampling, lookback metrics, composite score and per-week ranking. The computation is a
//! pure function of (table, reference_date, config); only `generated_at` is stamped from the clock.

pub mod config;
pub mod metrics;
pub mod resample;

use crate::domain::prices::{PriceRecord, PriceTable};
use crate::domain::ranking::{RankingItem, RankingSnapshot, WeeklyMetric, SNAPSHOT_SCHEMA_VERSION};
use crate::error::StructuralError;
use crate::ranking::config::RankingConfig;
use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Everything one successful run produces. Persisted together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct GoldOutput {
    pub metrics: Vec<WeeklyMetric>,
    pub snapshot: RankingSnapshot,
}

#[derive(Debug, Clone)]
pub struct RankingEngine {
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(config: RankingConfig) -> Result<Self, StructuralError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn compute(&self, table: &PriceTable, reference_date: NaiveDate) -> GoldOutput {
        self.compute_at(table, reference_date, Utc::now())
    }

    pub fn compute_at(
        &self,
        table: &PriceTable,
        reference_date: NaiveDate,
        generated_at: DateTime<Utc>,
    ) -> GoldOutput {
        let by_symbol = self.group_by_symbol(table, reference_date);

        let mut metrics: Vec<WeeklyMetric> = by_symbol
            .par_iter()
            .flat_map_iter(|(symbol, rows)| self.symbol_metrics(symbol, rows, reference_date))
            .collect();

        assign_ranks(&mut metrics);
        let snapshot = self.snapshot(&metrics, reference_date, generated_at);

        tracing::info!(
            %reference_date,
            symbols = by_symbol.len(),
            metric_rows = metrics.len(),
            snapshot_week_end = %snapshot.week_end,
            snapshot_items = snapshot.items.len(),
            "computed weekly sector rankings"
        );

        GoldOutput { metrics, snapshot }
    }

    /// Universe rows on or before the reference date, grouped and sorted by symbol.
    fn group_by_symbol<'a>(
        &self,
        table: &'a PriceTable,
        reference_date: NaiveDate,
    ) -> Vec<(&'a str, Vec<&'a PriceRecord>)> {
        let mut grouped = BTreeMap::<&str, Vec<&PriceRecord>>::new();
        let mut outside_universe: usize = 0;

        for row in &table.rows {
            let Some(symbol) = row.symbol() else { continue };
            if row.trade_date > reference_date {
                continue;
            }
            if !self.config.universe.contains_key(symbol) {
                outside_universe += 1;
                continue;
            }
            grouped.entry(symbol).or_default().push(row);
        }

        if outside_universe > 0 {
            tracing::debug!(outside_universe, "ignored rows for symbols outside the sector universe");
        }

        grouped.into_iter().collect()
    }

    fn symbol_metrics(
        &self,
        symbol: &str,
        rows: &[&PriceRecord],
        reference_date: NaiveDate,
    ) -> Vec<WeeklyMetric> {
        let weekly = resample::resample_weekly(rows, reference_date, self.config.week_ending);
        let sector = self.config.sector_name(symbol).map(str::to_string);

        let mut out = Vec::with_capacity(weekly.len());
        for (week_end, close) in &weekly {
            let Some(m) = metrics::window_metrics(&weekly, *week_end, self.config.lookback_weeks)
            else {
                continue;
            };
            let composite_score = self
                .config
                .weights
                .score(m.rolling_return, m.volatility, m.max_drawdown);
            if !composite_score.is_finite() {
                continue;
            }

            out.push(WeeklyMetric {
                week_end: *week_end,
                symbol: symbol.to_string(),
                sector: sector.clone(),
                weekly_close: close.close,
                rolling_return: m.rolling_return,
                volatility: m.volatility,
                max_drawdown: m.max_drawdown,
                composite_score,
                rank: 0,
            });
        }

        tracing::debug!(
            symbol,
            weeks = weekly.len(),
            withheld = weekly.len() - out.len(),
            "symbol metrics"
        );
        out
    }

    fn snapshot(
        &self,
        metrics: &[WeeklyMetric],
        reference_date: NaiveDate,
        generated_at: DateTime<Utc>,
    ) -> RankingSnapshot {
        let week_end = metrics
            .iter()
            .map(|m| m.week_end)
            .max()
            .unwrap_or_else(|| {
                resample::week_end_on_or_before(reference_date, self.config.week_ending)
            });

        let items = metrics
            .iter()
            .filter(|m| m.week_end == week_end)
            .take(self.config.top_n as usize)
            .map(RankingItem::from)
            .collect();

        RankingSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            week_end,
            generated_at,
            lookback_weeks: self.config.lookback_weeks,
            top_n: self.config.top_n,
            items,
        }
    }
}

/// Sorts by (week_end, score desc, symbol asc) and numbers each week 1..=K.
fn assign_ranks(metrics: &mut [WeeklyMetric]) {
    metrics.sort_by(|a, b| {
        a.week_end
            .cmp(&b.week_end)
            .then_with(|| b.composite_score.total_cmp(&a.composite_score))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    let mut current_week: Option<NaiveDate> = None;
    let mut rank: u32 = 0;
    for m in metrics.iter_mut() {
        if current_week != Some(m.week_end) {
            current_week = Some(m.week_end);
            rank = 0;
        }
        rank += 1;
        m.rank = rank;
    }
}
