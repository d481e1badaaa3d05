use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::types::Json as SqlJson;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use sectorrank_core::domain::ranking::{RankingSnapshot, WeeklyMetric};

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
    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match sectorrank_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState { pool };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/rankings/latest", get(get_latest_snapshot))
        .route("/rankings/:week_end", get(get_snapshot_by_week))
        .route("/metrics/:week_end", get(get_week_metrics))
        .route("/sectors/:symbol/history", get(get_sector_history))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pool: Option<PgPool>,
}

#[derive(Debug, Serialize)]
struct ApiSnapshot {
    run_id: Uuid,
    snapshot: RankingSnapshot,
}

#[derive(Debug, Serialize)]
struct SectorHistoryPoint {
    week_end: NaiveDate,
    weekly_close: f64,
    composite_score: f64,
    rank: u32,
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %format!("{e:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn parse_week_end(s: &str) -> Result<NaiveDate, StatusCode> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)
}

async fn get_latest_snapshot(
    State(state): State<AppState>,
) -> Result<Json<ApiSnapshot>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let (run_id, snapshot) = fetch_snapshot(pool, None)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiSnapshot { run_id, snapshot }))
}

async fn get_snapshot_by_week(
    State(state): State<AppState>,
    Path(week_end): Path<String>,
) -> Result<Json<ApiSnapshot>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let week_end = parse_week_end(&week_end)?;

    let (run_id, snapshot) = fetch_snapshot(pool, Some(week_end))
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiSnapshot { run_id, snapshot }))
}

async fn get_week_metrics(
    State(state): State<AppState>,
    Path(week_end): Path<String>,
) -> Result<Json<Vec<WeeklyMetric>>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let week_end = parse_week_end(&week_end)?;

    let metrics = fetch_week_metrics(pool, week_end)
        .await
        .map_err(internal_error)?;
    if metrics.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(metrics))
}

async fn get_sector_history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Vec<SectorHistoryPoint>>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let symbol = symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let history = fetch_sector_history(pool, &symbol)
        .await
        .map_err(internal_error)?;
    if history.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(history))
}

async fn fetch_snapshot(
    pool: &PgPool,
    week_end: Option<NaiveDate>,
) -> anyhow::Result<Option<(Uuid, RankingSnapshot)>> {
    let row = match week_end {
        Some(w) => {
            sqlx::query_as::<_, (Uuid, SqlJson<RankingSnapshot>)>(
                "SELECT s.run_id, s.payload \
                 FROM ranking_snapshots s \
                 JOIN ranking_runs r ON r.id = s.run_id \
                 WHERE r.status = 'success' AND s.week_end = $1 \
                 ORDER BY s.generated_at DESC \
                 LIMIT 1",
            )
            .bind(w)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, (Uuid, SqlJson<RankingSnapshot>)>(
                "SELECT s.run_id, s.payload \
                 FROM ranking_snapshots s \
                 JOIN ranking_runs r ON r.id = s.run_id \
                 WHERE r.status = 'success' \
                 ORDER BY s.week_end DESC, s.generated_at DESC \
                 LIMIT 1",
            )
            .fetch_optional(pool)
            .await?
        }
    };

    let Some((run_id, SqlJson(snapshot))) = row else {
        return Ok(None);
    };

    snapshot.validate().map_err(|e| {
        e.context(format!("stored snapshot for run_id={run_id} violates the serving contract"))
    })?;

    Ok(Some((run_id, snapshot)))
}

type MetricRow = (
    NaiveDate,
    String,
    Option<String>,
    f64,
    f64,
    f64,
    f64,
    f64,
    i32,
);

async fn fetch_week_metrics(pool: &PgPool, week_end: NaiveDate) -> anyhow::Result<Vec<WeeklyMetric>> {
    let rows = sqlx::query_as::<_, MetricRow>(
        "SELECT week_end, symbol, sector, weekly_close, rolling_return, volatility, max_drawdown, composite_score, rank \
         FROM weekly_sector_metrics \
         WHERE week_end = $1 \
         ORDER BY rank ASC",
    )
    .bind(week_end)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for (week_end, symbol, sector, weekly_close, rolling_return, volatility, max_drawdown, composite_score, rank) in rows {
        let rank = u32::try_from(rank).map_err(|_| {
            anyhow::anyhow!("invalid rank {rank} in DB for week_end={week_end}, symbol={symbol}")
        })?;
        out.push(WeeklyMetric {
            week_end,
            symbol,
            sector,
            weekly_close,
            rolling_return,
            volatility,
            max_drawdown,
            composite_score,
            rank,
        });
    }
    Ok(out)
}

async fn fetch_sector_history(
    pool: &PgPool,
    symbol: &str,
) -> anyhow::Result<Vec<SectorHistoryPoint>> {
    let rows = sqlx::query_as::<_, (NaiveDate, f64, f64, i32)>(
        "SELECT week_end, weekly_close, composite_score, rank \
         FROM weekly_sector_metrics \
         WHERE symbol = $1 \
         ORDER BY week_end ASC",
    )
    .bind(symbol)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(week_end, weekly_close, composite_score, rank)| {
            Some(SectorHistoryPoint {
                week_end,
                weekly_close,
                composite_score,
                rank: u32::try_from(rank).ok()?,
            })
        })
        .collect())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
