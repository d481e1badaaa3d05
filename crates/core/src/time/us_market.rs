use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use std::collections::HashSet;

// NYSE closes at 16:00 ET; vendors publish the EOD bar a little later.
const CLOSE_CUTOFF_HOUR_ET: u32 = 17;
const CLOSE_CUTOFF_MINUTE_ET: u32 = 0;

/// The run's reference date: explicit `YYYY-MM-DD`, or the latest completed US session.
pub fn resolve_reference_date(
    reference_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = reference_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid reference date {s:?} (expected YYYY-MM-DD)"));
    }

    let now_et = now_utc.with_timezone(&New_York);

    let cutoff_reached =
        (now_et.hour(), now_et.minute()) >= (CLOSE_CUTOFF_HOUR_ET, CLOSE_CUTOFF_MINUTE_ET);
    let mut date = now_et.date_naive();
    if !cutoff_reached {
        date = date - Duration::days(1);
    }

    let extra = configured_holidays();
    while is_weekend(date) || is_nyse_holiday(date) || extra.contains(&date) {
        date = date - Duration::days(1);
    }

    Ok(date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Regular NYSE full-day closures, with weekend observance. Special closures (national days of
/// mourning, weather) come from `US_MARKET_HOLIDAYS`.
pub fn is_nyse_holiday(date: NaiveDate) -> bool {
    nyse_holidays(date.year()).contains(&date)
}

fn nyse_holidays(year: i32) -> Vec<NaiveDate> {
    let fixed = |m, d| NaiveDate::from_ymd_opt(year, m, d);
    let nth = |m, wd, n| NaiveDate::from_weekday_of_month_opt(year, m, wd, n);

    let mut out: Vec<Option<NaiveDate>> = vec![
        // A Saturday New Year's Day is not observed on the preceding Friday.
        fixed(1, 1).and_then(|d| match d.weekday() {
            Weekday::Sat => None,
            _ => Some(observed(d)),
        }),
        nth(1, Weekday::Mon, 3),
        nth(2, Weekday::Mon, 3),
        good_friday(year),
        nth(5, Weekday::Mon, 5).or_else(|| nth(5, Weekday::Mon, 4)),
        fixed(7, 4).map(observed),
        nth(9, Weekday::Mon, 1),
        nth(11, Weekday::Thu, 4),
        fixed(12, 25).map(observed),
    ];
    if year >= 2022 {
        out.push(fixed(6, 19).map(observed));
    }

    out.into_iter().flatten().collect()
}

fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// Two days before Gregorian Easter Sunday.
fn good_friday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;

    let easter = NaiveDate::from_ymd_opt(
        year,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )?;
    Some(easter - Duration::days(2))
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // US_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD"
    let mut out = HashSet::new();
    if let Ok(s) = std::env::var("US_MARKET_HOLIDAYS") {
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Ok(d) = NaiveDate::parse_from_str(part, "%Y-%m-%d") {
                out.insert(d);
            }
        }
    }
    out
}
