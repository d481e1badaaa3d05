// End-to-end Gold computation: quality gate, weekly metrics, ranking and the serving snapshot.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc, Weekday};
use sectorrank_core::config::{RankingConfig, ScoreWeights};
use sectorrank_core::domain::prices::{PriceRecord, PriceTable};
use sectorrank_core::error::QualityGateError;
use sectorrank_core::gold::build_gold;
use sectorrank_core::quality::Violation;
use sectorrank_core::ranking::RankingEngine;

const SYMBOLS: [&str; 5] = ["XLE", "XLF", "XLK", "XLV", "XLY"];

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Monday of week 1.
fn week_one_monday() -> NaiveDate {
    d(2024, 1, 1)
}

fn week_friday(week: i64) -> NaiveDate {
    week_one_monday() + Duration::weeks(week - 1) + Duration::days(4)
}

fn config() -> RankingConfig {
    RankingConfig {
        universe: SYMBOLS
            .iter()
            .map(|s| (s.to_string(), format!("{s} sector")))
            .collect(),
        lookback_weeks: 4,
        weights: ScoreWeights {
            ret: 0.5,
            vol: 0.3,
            drawdown: 0.2,
        },
        freshness_sla_days: 3,
        top_n: 3,
        week_ending: Weekday::Fri,
    }
}

/// Eight weeks of daily (Mon..Fri) closes per symbol, each symbol with its own drift and wobble.
fn eight_week_table() -> PriceTable {
    let mut rows = Vec::new();
    for (i, symbol) in SYMBOLS.iter().enumerate() {
        let drift = 0.004 * (i as f64) - 0.006;
        let wobble = 0.01 * ((i % 3) as f64 + 1.0);
        let mut close = 50.0 + 10.0 * i as f64;
        for week in 1..=8i64 {
            for day in 0..5i64 {
                let date = week_one_monday() + Duration::weeks(week - 1) + Duration::days(day);
                let sign = if (week + day) % 2 == 0 { 1.0 } else { -1.0 };
                close *= 1.0 + drift + sign * wobble;
                rows.push(PriceRecord::new(symbol, date, close, 100_000 + day * 10));
            }
        }
    }
    PriceTable::new(rows)
}

fn generated_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 24, 1, 0, 0).unwrap()
}

#[test]
fn eight_weeks_with_four_week_lookback_ranks_weeks_five_to_eight() {
    let engine = RankingEngine::new(config()).unwrap();
    let reference_date = week_friday(8) + Duration::days(1);

    let out = build_gold(&engine, &eight_week_table(), reference_date, generated_at()).unwrap();

    let weeks: std::collections::BTreeSet<_> = out.metrics.iter().map(|m| m.week_end).collect();
    let expected: std::collections::BTreeSet<_> = (5..=8).map(week_friday).collect();
    assert_eq!(weeks, expected);
    assert_eq!(out.metrics.len(), 4 * SYMBOLS.len());

    for m in &out.metrics {
        assert!(m.max_drawdown <= 0.0, "{m:?}");
        assert!(m.volatility > 0.0, "{m:?}");
    }

    let snap = &out.snapshot;
    assert_eq!(snap.week_end, week_friday(8));
    assert_eq!(snap.generated_at, generated_at());
    assert_eq!(snap.items.len(), 3);
    assert_eq!(
        snap.items.iter().map(|i| i.rank).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(snap
        .items
        .windows(2)
        .all(|w| w[0].composite_score >= w[1].composite_score));

    // The snapshot is the head of the week-8 ranking.
    let mut week8: Vec<_> = out
        .metrics
        .iter()
        .filter(|m| m.week_end == week_friday(8))
        .collect();
    week8.sort_by_key(|m| m.rank);
    for (item, metric) in snap.items.iter().zip(week8) {
        assert_eq!(item.symbol, metric.symbol);
        assert_eq!(item.composite_score, metric.composite_score);
    }

    snap.validate().unwrap();
}

#[test]
fn identical_inputs_produce_identical_bytes() {
    let engine = RankingEngine::new(config()).unwrap();
    let reference_date = week_friday(8);

    let table = eight_week_table();
    let mut reversed = table.clone();
    reversed.rows.reverse();

    let a = build_gold(&engine, &table, reference_date, generated_at()).unwrap();
    let b = build_gold(&engine, &reversed, reference_date, generated_at()).unwrap();

    assert_eq!(
        serde_json::to_vec(&a.metrics).unwrap(),
        serde_json::to_vec(&b.metrics).unwrap()
    );
    assert_eq!(
        serde_json::to_vec(&a.snapshot).unwrap(),
        serde_json::to_vec(&b.snapshot).unwrap()
    );
}

#[test]
fn stale_table_blocks_ranking() {
    let engine = RankingEngine::new(config()).unwrap();
    let table = PriceTable::new(
        eight_week_table()
            .rows
            .into_iter()
            .filter(|r| r.trade_date <= d(2024, 2, 23))
            .collect(),
    );

    // Latest trade date 2024-02-23, reference 2024-03-03: nine days against a three-day SLA.
    let err = build_gold(&engine, &table, d(2024, 3, 3), generated_at()).unwrap_err();
    let gate = err.downcast_ref::<QualityGateError>().unwrap();
    assert_eq!(
        gate.violations,
        vec![Violation::Stale {
            latest_trade_date: Some(d(2024, 2, 23)),
            reference_date: d(2024, 3, 3),
            gap_days: Some(9),
            sla_days: 3,
        }]
    );
}
