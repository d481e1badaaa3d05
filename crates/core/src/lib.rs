pub mod domain;
pub mod error;
pub mod gold;
pub mod quality;
pub mod ranking;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    pub use crate::ranking::config::{RankingConfig, ScoreWeights};

    const DEFAULT_PRICES_TABLE: &str = "sector_prices_daily";
    const DEFAULT_GOLD_SNAPSHOT_PATH: &str = "data/gold/latest_top_sectors.json";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub prices_table: String,
        pub gold_snapshot_path: String,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                prices_table: std::env::var("PRICES_TABLE")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_PRICES_TABLE.to_string()),
                gold_snapshot_path: std::env::var("GOLD_SNAPSHOT_PATH")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_GOLD_SNAPSHOT_PATH.to_string()),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }
}
