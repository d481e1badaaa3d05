use crate::error::StructuralError;
use chrono::Weekday;
use std::collections::BTreeMap;

const DEFAULT_UNIVERSE: &[(&str, &str)] = &[
    ("XLB", "Materials"),
    ("XLC", "Communication Services"),
    ("XLE", "Energy"),
    ("XLF", "Financials"),
    ("XLI", "Industrials"),
    ("XLK", "Information Technology"),
    ("XLP", "Consumer Staples"),
    ("XLRE", "Real Estate"),
    ("XLU", "Utilities"),
    ("XLV", "Health Care"),
    ("XLY", "Consumer Discretionary"),
];

/// Weights of the composite score. Volatility enters with a negative sign, drawdown is already <= 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub ret: f64,
    pub vol: f64,
    pub drawdown: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            ret: 0.5,
            vol: 0.3,
            drawdown: 0.2,
        }
    }
}

impl ScoreWeights {
    pub fn score(&self, rolling_return: f64, volatility: f64, max_drawdown: f64) -> f64 {
        self.ret * rolling_return + self.vol * (-volatility) + self.drawdown * max_drawdown
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankingConfig {
    /// Symbol -> sector display name. Only these symbols are ranked.
    pub universe: BTreeMap<String, String>,
    pub lookback_weeks: u32,
    pub weights: ScoreWeights,
    pub freshness_sla_days: u32,
    pub top_n: u32,
    /// Weekday that closes a calendar week bucket.
    pub week_ending: Weekday,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            universe: DEFAULT_UNIVERSE
                .iter()
                .map(|(s, n)| (s.to_string(), n.to_string()))
                .collect(),
            lookback_weeks: 12,
            weights: ScoreWeights::default(),
            freshness_sla_days: 3,
            top_n: 5,
            week_ending: Weekday::Fri,
        }
    }
}

impl RankingConfig {
    pub fn from_env() -> Result<Self, StructuralError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the config from a variable lookup. Unset variables take the default; set but
    /// unparsable ones are rejected.
    pub fn from_vars<F>(lookup: F) -> Result<Self, StructuralError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = Self::default();
        let get = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        if let Some(s) = get("SECTOR_UNIVERSE") {
            out.universe = parse_universe(&s)?;
        }
        if let Some(s) = get("LOOKBACK_WEEKS") {
            out.lookback_weeks = parse_positive("LOOKBACK_WEEKS", &s)?;
        }
        if let Some(s) = get("SCORE_WEIGHT_RETURN") {
            out.weights.ret = parse_f64("SCORE_WEIGHT_RETURN", &s)?;
        }
        if let Some(s) = get("SCORE_WEIGHT_VOLATILITY") {
            out.weights.vol = parse_f64("SCORE_WEIGHT_VOLATILITY", &s)?;
        }
        if let Some(s) = get("SCORE_WEIGHT_DRAWDOWN") {
            out.weights.drawdown = parse_f64("SCORE_WEIGHT_DRAWDOWN", &s)?;
        }
        if let Some(s) = get("FRESHNESS_SLA_DAYS") {
            out.freshness_sla_days = parse_positive("FRESHNESS_SLA_DAYS", &s)?;
        }
        if let Some(s) = get("TOP_N") {
            out.top_n = parse_positive("TOP_N", &s)?;
        }
        if let Some(s) = get("WEEK_ENDING") {
            out.week_ending = s.trim().parse::<Weekday>().map_err(|_| {
                StructuralError::InvalidConfig(format!("WEEK_ENDING is not a weekday: {s:?}"))
            })?;
        }

        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> Result<(), StructuralError> {
        let invalid = |msg: String| Err(StructuralError::InvalidConfig(msg));

        if self.universe.is_empty() {
            return invalid("sector universe must contain at least one symbol".to_string());
        }
        if let Some(blank) = self.universe.keys().find(|s| s.trim().is_empty()) {
            return invalid(format!("sector universe contains a blank symbol: {blank:?}"));
        }
        if self.lookback_weeks == 0 {
            return invalid("lookback_weeks must be >= 1".to_string());
        }
        if self.freshness_sla_days == 0 {
            return invalid("freshness_sla_days must be >= 1".to_string());
        }
        if self.top_n == 0 {
            return invalid("top_n must be >= 1".to_string());
        }

        let w = &self.weights;
        if !(w.ret.is_finite() && w.vol.is_finite() && w.drawdown.is_finite()) {
            return invalid(format!("score weights must be finite (got {w:?})"));
        }
        let sum = w.ret + w.vol + w.drawdown;
        if sum <= 0.0 {
            return invalid(format!("score weights must sum to a positive value (got {sum})"));
        }

        Ok(())
    }

    pub fn sector_name(&self, symbol: &str) -> Option<&str> {
        self.universe.get(symbol).map(String::as_str)
    }
}

fn parse_universe(s: &str) -> Result<BTreeMap<String, String>, StructuralError> {
    let mut out = BTreeMap::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (symbol, name) = match part.split_once('=') {
            Some((symbol, name)) => (symbol.trim(), name.trim()),
            None => (part, part),
        };
        if symbol.is_empty() {
            return Err(StructuralError::InvalidConfig(format!(
                "SECTOR_UNIVERSE entry has no symbol: {part:?}"
            )));
        }
        let name = if name.is_empty() { symbol } else { name };
        out.insert(symbol.to_string(), name.to_string());
    }
    Ok(out)
}

fn parse_positive(key: &str, s: &str) -> Result<u32, StructuralError> {
    let n = s.trim().parse::<i64>().map_err(|_| {
        StructuralError::InvalidConfig(format!("{key} is not an integer: {s:?}"))
    })?;
    if n <= 0 {
        return Err(StructuralError::InvalidConfig(format!(
            "{key} must be positive (got {n})"
        )));
    }
    u32::try_from(n)
        .map_err(|_| StructuralError::InvalidConfig(format!("{key} is too large (got {n})")))
}

fn parse_f64(key: &str, s: &str) -> Result<f64, StructuralError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| StructuralError::InvalidConfig(format!("{key} is not a number: {s:?}")))
}
