use anyhow::Context;
use clap::Parser;
use sectorrank_core::config::RankingConfig;
use sectorrank_core::error::QualityGateError;
use sectorrank_core::ranking::RankingEngine;
use sectorrank_core::storage::gold::RunStatus;
use sectorrank_core::storage::lock::GoldPublishLock;
use sectorrank_core::storage::prices::{PgPriceSource, PriceSource};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "sectorrank_worker")]
struct Args {
    /// Reference ("as-of") date (YYYY-MM-DD). Defaults to the latest completed US session.
    #[arg(long)]
    reference_date: Option<String>,

    /// Run the quality gate and compute rankings without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Where to publish the serving snapshot. Overrides GOLD_SNAPSHOT_PATH.
    #[arg(long)]
    snapshot_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = sectorrank_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = run(&settings, &args).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "gold run aborted");
    }
    result
}

async fn run(settings: &sectorrank_core::config::Settings, args: &Args) -> anyhow::Result<()> {
    let reference_date = sectorrank_core::time::us_market::resolve_reference_date(
        args.reference_date.as_deref(),
        chrono::Utc::now(),
    )?;

    let config = RankingConfig::from_env()?;
    let engine = RankingEngine::new(config)?;

    let snapshot_path = args
        .snapshot_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.gold_snapshot_path));

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    if !args.dry_run {
        sectorrank_core::storage::migrate(&pool).await?;
    }

    let Some(lock) = GoldPublishLock::try_acquire(&pool).await? else {
        tracing::warn!(%reference_date, "gold publish lock not acquired; another run in progress");
        return Ok(());
    };

    // Held until the artifact is renamed, so the table and the file always come from one run.
    let outcome = run_locked(&pool, &engine, settings, args, reference_date, snapshot_path).await;

    if let Err(err) = lock.release().await {
        tracing::warn!(error = %format!("{err:#}"), "failed to release gold publish lock");
    }
    outcome
}

async fn run_locked(
    pool: &sqlx::PgPool,
    engine: &RankingEngine,
    settings: &sectorrank_core::config::Settings,
    args: &Args,
    reference_date: chrono::NaiveDate,
    snapshot_path: PathBuf,
) -> anyhow::Result<()> {
    let source = PgPriceSource::new(pool.clone(), &settings.prices_table)?;
    tracing::info!(%reference_date, source = %source.source_name(), dry_run = args.dry_run, "gold run started");

    let table = source.load().await?;

    let generated_at = chrono::Utc::now();
    let output = match sectorrank_core::gold::build_gold(engine, &table, reference_date, generated_at)
    {
        Ok(output) => output,
        Err(err) => {
            if !args.dry_run {
                record_failure(pool, reference_date, generated_at, &err).await;
            }
            return Err(err);
        }
    };

    for item in &output.snapshot.items {
        tracing::info!(
            week_end = %output.snapshot.week_end,
            rank = item.rank,
            symbol = %item.symbol,
            sector = item.sector.as_deref().unwrap_or(""),
            score = item.composite_score,
            rolling_return = item.rolling_return,
            volatility = item.volatility,
            max_drawdown = item.max_drawdown,
            "top sector"
        );
    }

    if args.dry_run {
        tracing::info!(
            %reference_date,
            dry_run = true,
            metric_rows = output.metrics.len(),
            "gold run complete (dry-run, nothing written)"
        );
        return Ok(());
    }

    let staged =
        sectorrank_core::storage::artifact::stage_snapshot(&snapshot_path, &output.snapshot)
            .await?;

    let run_id =
        match sectorrank_core::storage::gold::persist_gold(pool, reference_date, &output).await {
            Ok(run_id) => run_id,
            Err(err) => {
                if let Err(discard_err) = staged.discard().await {
                    tracing::warn!(error = %discard_err, "failed to discard staged snapshot");
                }
                record_failure(pool, reference_date, generated_at, &err).await;
                return Err(err);
            }
        };

    let published = staged.publish().await?;

    tracing::info!(
        %reference_date,
        %run_id,
        metric_rows = output.metrics.len(),
        week_end = %output.snapshot.week_end,
        artifact = %published.display(),
        "persisted gold rankings"
    );
    Ok(())
}

/// Best-effort audit row for a run that produced nothing. Gold tables are left untouched.
async fn record_failure(
    pool: &sqlx::PgPool,
    reference_date: chrono::NaiveDate,
    generated_at: chrono::DateTime<chrono::Utc>,
    err: &anyhow::Error,
) {
    let (status, violations) = match err.downcast_ref::<QualityGateError>() {
        Some(gate) => (
            RunStatus::QualityFailed,
            serde_json::to_value(&gate.violations).ok(),
        ),
        None => (RunStatus::Error, None),
    };

    match sectorrank_core::storage::gold::record_failed_run(
        pool,
        reference_date,
        generated_at,
        status,
        &format!("{err:#}"),
        violations,
    )
    .await
    {
        Ok(run_id) => {
            tracing::warn!(%reference_date, %run_id, status = status.as_str(), "recorded failed gold run")
        }
        Err(record_err) => {
            tracing::error!(%reference_date, error = %record_err, "failed to record failed gold run")
        }
    }
}

fn init_sentry(settings: &sectorrank_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
