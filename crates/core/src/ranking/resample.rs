use crate::domain::prices::PriceRecord;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeMap;

/// Close of one calendar week: the last trading day on or before the week boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeeklyClose {
    pub week_end: NaiveDate,
    pub last_trade_date: NaiveDate,
    pub close: f64,
}

/// End of the calendar week containing `date`; a week runs from the day after `week_ending`
/// through `week_ending` inclusive.
pub fn week_end_for(date: NaiveDate, week_ending: Weekday) -> NaiveDate {
    let target = i64::from(week_ending.num_days_from_monday());
    let current = i64::from(date.weekday().num_days_from_monday());
    date + Duration::days((target - current).rem_euclid(7))
}

/// Latest week boundary that is not after `date`.
pub fn week_end_on_or_before(date: NaiveDate, week_ending: Weekday) -> NaiveDate {
    let end = week_end_for(date, week_ending);
    if end == date {
        end
    } else {
        end - Duration::days(7)
    }
}

/// Buckets one symbol's daily rows into calendar weeks ending on or before `reference_date`.
/// Weeks with no rows are absent from the map.
pub fn resample_weekly(
    rows: &[&PriceRecord],
    reference_date: NaiveDate,
    week_ending: Weekday,
) -> BTreeMap<NaiveDate, WeeklyClose> {
    let mut out = BTreeMap::<NaiveDate, WeeklyClose>::new();

    for row in rows {
        let week_end = week_end_for(row.trade_date, week_ending);
        if week_end > reference_date {
            continue;
        }

        let candidate = WeeklyClose {
            week_end,
            last_trade_date: row.trade_date,
            close: row.close,
        };

        out.entry(week_end)
            .and_modify(|current| {
                // Later trade date wins; same-date duplicates resolve on close so the result
                // does not depend on row order.
                let later = (candidate.last_trade_date, candidate.close)
                    > (current.last_trade_date, current.close);
                if later {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn week_end_rolls_forward_to_friday() {
        // 2024-01-01 is a Monday.
        assert_eq!(week_end_for(d(2024, 1, 1), Weekday::Fri), d(2024, 1, 5));
        assert_eq!(week_end_for(d(2024, 1, 5), Weekday::Fri), d(2024, 1, 5));
        assert_eq!(week_end_for(d(2024, 1, 6), Weekday::Fri), d(2024, 1, 12));
        assert_eq!(week_end_for(d(2024, 1, 7), Weekday::Sun), d(2024, 1, 7));
    }

    #[test]
    fn week_end_on_or_before_steps_back() {
        assert_eq!(week_end_on_or_before(d(2024, 3, 10), Weekday::Fri), d(2024, 3, 8));
        assert_eq!(week_end_on_or_before(d(2024, 3, 8), Weekday::Fri), d(2024, 3, 8));
        assert_eq!(week_end_on_or_before(d(2024, 3, 7), Weekday::Fri), d(2024, 3, 1));
    }

    #[test]
    fn keeps_last_close_of_each_week_and_skips_partial_week() {
        let rows = vec![
            PriceRecord::new("XLK", d(2024, 1, 3), 10.0, 1),
            PriceRecord::new("XLK", d(2024, 1, 5), 11.0, 1),
            PriceRecord::new("XLK", d(2024, 1, 4), 12.0, 1),
            // Holiday Friday: Thursday closes the week.
            PriceRecord::new("XLK", d(2024, 1, 11), 13.0, 1),
            // Week ending 2024-01-19 is after the reference date.
            PriceRecord::new("XLK", d(2024, 1, 16), 14.0, 1),
        ];
        let refs: Vec<&PriceRecord> = rows.iter().collect();

        let weekly = resample_weekly(&refs, d(2024, 1, 17), Weekday::Fri);
        let closes: Vec<_> = weekly.values().map(|w| (w.week_end, w.close)).collect();
        assert_eq!(closes, vec![(d(2024, 1, 5), 11.0), (d(2024, 1, 12), 13.0)]);
        assert_eq!(weekly[&d(2024, 1, 12)].last_trade_date, d(2024, 1, 11));
    }

    #[test]
    fn empty_weeks_are_not_synthesized() {
        let rows = vec![
            PriceRecord::new("XLK", d(2024, 1, 5), 10.0, 1),
            PriceRecord::new("XLK", d(2024, 1, 19), 12.0, 1),
        ];
        let refs: Vec<&PriceRecord> = rows.iter().collect();
        let weekly = resample_weekly(&refs, d(2024, 1, 19), Weekday::Fri);
        assert_eq!(weekly.len(), 2);
        assert!(!weekly.contains_key(&d(2024, 1, 12)));
    }
}
