use crate::domain::ranking::WeeklyMetric;
use crate::ranking::GoldOutput;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

const METRICS_INSERT_BATCH: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    QualityFailed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::QualityFailed => "quality_failed",
            RunStatus::Error => "error",
        }
    }
}

/// Writes the run record, the full metrics table and the serving snapshot in one transaction.
/// The metrics table is replaced as a whole.
pub async fn persist_gold(
    pool: &sqlx::PgPool,
    reference_date: NaiveDate,
    output: &GoldOutput,
) -> anyhow::Result<Uuid> {
    let run_id = Uuid::new_v4();
    let snapshot = &output.snapshot;
    let payload = serde_json::to_value(snapshot).context("serialize ranking snapshot failed")?;

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    sqlx::query(
        "INSERT INTO ranking_runs (id, reference_date, generated_at, status, error, violations, metric_rows) \
         VALUES ($1, $2, $3, $4, NULL, NULL, $5)",
    )
    .persistent(false)
    .bind(run_id)
    .bind(reference_date)
    .bind(snapshot.generated_at)
    .bind(RunStatus::Success.as_str())
    .bind(output.metrics.len() as i32)
    .execute(&mut *tx)
    .await
    .context("insert ranking_runs failed")?;

    sqlx::query("DELETE FROM weekly_sector_metrics")
        .persistent(false)
        .execute(&mut *tx)
        .await
        .context("clear weekly_sector_metrics failed")?;

    let mut batch_idx: usize = 0;
    for chunk in output.metrics.chunks(METRICS_INSERT_BATCH) {
        batch_idx += 1;
        insert_metrics_batch(&mut tx, run_id, chunk).await?;
        tracing::debug!(%run_id, batch_idx, batch_size = chunk.len(), "weekly_sector_metrics batch insert");
    }

    sqlx::query(
        "INSERT INTO ranking_snapshots (run_id, week_end, generated_at, schema_version, payload) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .persistent(false)
    .bind(run_id)
    .bind(snapshot.week_end)
    .bind(snapshot.generated_at)
    .bind(snapshot.schema_version as i32)
    .bind(payload)
    .execute(&mut *tx)
    .await
    .context("insert ranking_snapshots failed")?;

    tx.commit().await.context("commit transaction failed")?;
    Ok(run_id)
}

/// Records a run that produced no Gold output. Gold tables are not touched.
pub async fn record_failed_run(
    pool: &sqlx::PgPool,
    reference_date: NaiveDate,
    generated_at: DateTime<Utc>,
    status: RunStatus,
    error: &str,
    violations: Option<Value>,
) -> anyhow::Result<Uuid> {
    anyhow::ensure!(
        status != RunStatus::Success,
        "record_failed_run called with success status"
    );

    let run_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO ranking_runs (id, reference_date, generated_at, status, error, violations, metric_rows) \
         VALUES ($1, $2, $3, $4, $5, $6, 0)",
    )
    .persistent(false)
    .bind(run_id)
    .bind(reference_date)
    .bind(generated_at)
    .bind(status.as_str())
    .bind(error)
    .bind(violations)
    .execute(pool)
    .await
    .context("insert failed ranking_runs failed")?;

    Ok(run_id)
}

async fn insert_metrics_batch(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    run_id: Uuid,
    chunk: &[WeeklyMetric],
) -> anyhow::Result<()> {
    let mut qb = sqlx::QueryBuilder::new(
        "INSERT INTO weekly_sector_metrics \
         (week_end, symbol, sector, weekly_close, rolling_return, volatility, max_drawdown, composite_score, rank, run_id) ",
    );
    qb.push_values(chunk, |mut b, m| {
        b.push_bind(m.week_end)
            .push_bind(&m.symbol)
            .push_bind(&m.sector)
            .push_bind(m.weekly_close)
            .push_bind(m.rolling_return)
            .push_bind(m.volatility)
            .push_bind(m.max_drawdown)
            .push_bind(m.composite_score)
            .push_bind(m.rank as i32)
            .push_bind(run_id);
    });

    qb.build()
        .persistent(false)
        .execute(&mut **tx)
        .await
        .context("batch insert weekly_sector_metrics failed")?;
    Ok(())
}
