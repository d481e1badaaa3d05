use crate::ranking::resample::WeeklyClose;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Return, volatility and drawdown over one lookback window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowMetrics {
    pub rolling_return: f64,
    pub volatility: f64,
    pub max_drawdown: f64,
}

/// Computes the window ending at `week_end`. `None` means the row is withheld: the anchor week
/// is missing, fewer than two periodic returns exist, a close in the window is unusable, or a
/// metric overflows.
pub fn window_metrics(
    weekly: &BTreeMap<NaiveDate, WeeklyClose>,
    week_end: NaiveDate,
    lookback_weeks: u32,
) -> Option<WindowMetrics> {
    let lookback = i64::from(lookback_weeks);
    let anchor_week = week_end - Duration::weeks(lookback);

    let slots: Vec<Option<f64>> = (0..=lookback)
        .map(|k| {
            weekly
                .get(&(anchor_week + Duration::weeks(k)))
                .map(|w| w.close)
        })
        .collect();

    let anchor = slots.first().copied().flatten()?;
    let current = slots.last().copied().flatten()?;

    if slots.iter().flatten().any(|c| !c.is_finite() || *c <= 0.0) {
        return None;
    }

    let returns: Vec<f64> = slots
        .windows(2)
        .filter_map(|pair| match (pair[0], pair[1]) {
            (Some(prev), Some(next)) => Some(next / prev - 1.0),
            _ => None,
        })
        .collect();

    // The drawdown path is the `lookback_weeks` closes ending at `week_end`; the anchor only
    // feeds the return and the first periodic return.
    let path: Vec<f64> = slots[1..].iter().flatten().copied().collect();

    let out = WindowMetrics {
        rolling_return: current / anchor - 1.0,
        volatility: population_std(&returns)?,
        max_drawdown: max_drawdown(&path)?,
    };
    out.is_finite().then_some(out)
}

impl WindowMetrics {
    fn is_finite(&self) -> bool {
        self.rolling_return.is_finite()
            && self.volatility.is_finite()
            && self.max_drawdown.is_finite()
    }
}

/// Population standard deviation; needs at least two observations.
pub fn population_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// Largest peak-to-trough decline as a fraction of the running peak. Always <= 0.
pub fn max_drawdown(path: &[f64]) -> Option<f64> {
    let mut peak = *path.first()?;
    let mut worst = 0.0_f64;
    for &close in path {
        if close > peak {
            peak = close;
        }
        worst = worst.min((close - peak) / peak);
    }
    Some(worst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly(start: NaiveDate, closes: &[Option<f64>]) -> BTreeMap<NaiveDate, WeeklyClose> {
        closes
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let week_end = start + Duration::weeks(i as i64);
                c.map(|close| {
                    (
                        week_end,
                        WeeklyClose {
                            week_end,
                            last_trade_date: week_end,
                            close,
                        },
                    )
                })
            })
            .collect()
    }

    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
    }

    #[test]
    fn drawdown_of_rising_path_is_zero() {
        assert_eq!(max_drawdown(&[1.0, 1.0, 2.0, 3.0]), Some(0.0));
    }

    #[test]
    fn drawdown_tracks_running_peak() {
        let dd = max_drawdown(&[100.0, 120.0, 90.0, 130.0, 117.0]).unwrap();
        assert!((dd - (-0.25)).abs() < 1e-12);
    }

    #[test]
    fn drawdown_of_empty_path_is_none() {
        assert_eq!(max_drawdown(&[]), None);
    }

    #[test]
    fn population_std_matches_hand_computation() {
        let s = population_std(&[0.1, -0.1]).unwrap();
        assert!((s - 0.1).abs() < 1e-12);
        assert_eq!(population_std(&[0.3]), None);
    }

    #[test]
    fn withholds_without_anchor_week() {
        let w = weekly(friday(), &[Some(10.0), Some(11.0), Some(12.0)]);
        assert!(window_metrics(&w, friday() + Duration::weeks(2), 4).is_none());
    }

    #[test]
    fn full_window_metrics() {
        let w = weekly(friday(), &[Some(100.0), Some(110.0), Some(99.0), Some(121.0)]);
        let m = window_metrics(&w, friday() + Duration::weeks(3), 3).unwrap();

        assert!((m.rolling_return - 0.21).abs() < 1e-12);
        assert!((m.max_drawdown - (-0.1)).abs() < 1e-12);

        let rets = [0.1, 99.0 / 110.0 - 1.0, 121.0 / 99.0 - 1.0];
        let expected = population_std(&rets).unwrap();
        assert!((m.volatility - expected).abs() < 1e-15);
    }

    #[test]
    fn drawdown_path_excludes_anchor_week() {
        // The anchor close of 100 sets the return but not the drawdown peak.
        let w = weekly(
            friday(),
            &[Some(100.0), Some(90.0), Some(95.0), Some(96.0), Some(97.0)],
        );
        let m = window_metrics(&w, friday() + Duration::weeks(4), 4).unwrap();
        assert_eq!(m.max_drawdown, 0.0);
        assert!((m.rolling_return - (-0.03)).abs() < 1e-12);

        let rets = [-0.1, 95.0 / 90.0 - 1.0, 96.0 / 95.0 - 1.0, 97.0 / 96.0 - 1.0];
        let expected = population_std(&rets).unwrap();
        assert!((m.volatility - expected).abs() < 1e-15);
    }

    #[test]
    fn withholds_window_whose_metrics_overflow() {
        let w = weekly(friday(), &[Some(1e-310), Some(1.0), Some(2.0)]);
        assert!(window_metrics(&w, friday() + Duration::weeks(2), 2).is_none());
    }

    #[test]
    fn gap_inside_window_only_drops_adjacent_returns() {
        // Week 2 has no prices: returns 1->2 and 2->3 are unavailable, 0->1 and 3->4 remain.
        let w = weekly(
            friday(),
            &[Some(100.0), Some(105.0), None, Some(110.0), Some(99.0)],
        );
        let m = window_metrics(&w, friday() + Duration::weeks(4), 4).unwrap();
        let expected = population_std(&[0.05, 99.0 / 110.0 - 1.0]).unwrap();
        assert!((m.volatility - expected).abs() < 1e-15);
        assert!((m.rolling_return - (-0.01)).abs() < 1e-12);
    }

    #[test]
    fn withholds_with_fewer_than_two_returns() {
        let w = weekly(friday(), &[Some(100.0), None, Some(110.0)]);
        assert!(window_metrics(&w, friday() + Duration::weeks(2), 2).is_none());

        let w = weekly(friday(), &[Some(100.0), Some(110.0)]);
        assert!(window_metrics(&w, friday() + Duration::weeks(1), 1).is_none());
    }

    #[test]
    fn withholds_window_with_zero_close() {
        let w = weekly(friday(), &[Some(0.0), Some(1.0), Some(2.0)]);
        assert!(window_metrics(&w, friday() + Duration::weeks(2), 2).is_none());
    }
}
