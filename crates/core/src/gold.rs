use crate::domain::prices::PriceTable;
use crate::error::QualityGateError;
use crate::quality::{self, QualityRules, ValidationResult};
use crate::ranking::{GoldOutput, RankingEngine};
use chrono::{DateTime, NaiveDate, Utc};

/// Gate, then rank. A failed gate returns [`QualityGateError`] and nothing is computed.
pub fn build_gold(
    engine: &RankingEngine,
    table: &PriceTable,
    reference_date: NaiveDate,
    generated_at: DateTime<Utc>,
) -> anyhow::Result<GoldOutput> {
    let rules = QualityRules::from(engine.config());

    match quality::validate(table, reference_date, &rules) {
        ValidationResult::Pass => {
            tracing::info!(%reference_date, rows = table.len(), "quality gate passed");
        }
        ValidationResult::Fail { violations } => {
            for v in &violations {
                tracing::warn!(%reference_date, rule = v.rule(), violation = ?v, "quality violation");
            }
            return Err(QualityGateError {
                reference_date,
                violations,
            }
            .into());
        }
    }

    Ok(engine.compute_at(table, reference_date, generated_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prices::PriceRecord;
    use crate::quality::Violation;
    use crate::ranking::config::RankingConfig;
    use chrono::TimeZone;

    #[test]
    fn gate_failure_surfaces_violations_and_skips_ranking() {
        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        let table = PriceTable::new(vec![
            PriceRecord::new("XLF", d(1, 5), 38.0, 10),
            PriceRecord::new("XLF", d(1, 5), 38.2, 10),
        ]);
        let engine = RankingEngine::new(RankingConfig::default()).unwrap();
        let generated_at = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();

        let err = build_gold(&engine, &table, d(1, 6), generated_at).unwrap_err();
        let gate = err.downcast_ref::<QualityGateError>().unwrap();
        assert_eq!(gate.reference_date, d(1, 6));
        assert!(matches!(
            gate.violations.as_slice(),
            [Violation::DuplicateKey { count: 2, .. }]
        ));
    }
}
