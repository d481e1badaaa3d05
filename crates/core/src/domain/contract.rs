use crate::domain::ranking::{RankingSnapshot, SNAPSHOT_SCHEMA_VERSION};
use anyhow::{bail, ensure};
use std::collections::BTreeSet;

impl RankingSnapshot {
    /// Reader-side contract check for a serving artifact loaded from disk or the database.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.schema_version >= 1 && self.schema_version <= SNAPSHOT_SCHEMA_VERSION,
            "unsupported snapshot schema_version {} (max {SNAPSHOT_SCHEMA_VERSION})",
            self.schema_version
        );
        ensure!(self.top_n >= 1, "top_n must be >= 1 (got {})", self.top_n);
        ensure!(
            self.items.len() <= self.top_n as usize,
            "snapshot has {} items but top_n is {}",
            self.items.len(),
            self.top_n
        );

        let mut seen_symbols = BTreeSet::<&str>::new();
        for (idx, item) in self.items.iter().enumerate() {
            let expected_rank = idx as u32 + 1;
            if item.rank != expected_rank {
                bail!(
                    "snapshot ranks must be 1..={} in order: position {idx} has rank {}",
                    self.items.len(),
                    item.rank
                );
            }

            let symbol = item.symbol.trim();
            ensure!(!symbol.is_empty(), "symbol must be non-empty (rank {})", item.rank);
            ensure!(seen_symbols.insert(symbol), "duplicate symbol: {symbol}");

            ensure!(
                item.composite_score.is_finite()
                    && item.rolling_return.is_finite()
                    && item.volatility.is_finite()
                    && item.max_drawdown.is_finite(),
                "non-finite metric for {symbol}"
            );
            ensure!(
                item.volatility >= 0.0,
                "volatility must be >= 0 for {symbol} (got {})",
                item.volatility
            );
            ensure!(
                item.max_drawdown <= 0.0,
                "max_drawdown must be <= 0 for {symbol} (got {})",
                item.max_drawdown
            );
        }

        Ok(())
    }
}
