//! Calendar period arithmetic: labels, previous-period windows and trend
//! bucket sizes.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{ReportError, Result};
use crate::models::Frequency;

// ---

pub const ONE_DAY_MS: i64 = 86_400_000;

/// Periods up to this many days are bucketed daily, longer ones weekly.
const DAILY_BUCKET_MAX_DAYS: i64 = 90;

/// Parse an ISO-8601 timestamp, keeping the supplied offset (`Z` is `+00:00`).
/// Naive timestamps and bare dates are taken as UTC.
pub fn parse_iso(raw: &str) -> Result<DateTime<FixedOffset>> {
    // ---
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = date.and_time(chrono::NaiveTime::MIN);
        return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    Err(ReportError::Validation(format!("Invalid ISO-8601 timestamp: '{raw}'")))
}

pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    // ---
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Human label for a report period.
///
/// Checked in order: whole calendar month ("February 2026"), whole year
/// ("2026"), whole quarter ("Q1 2026"), otherwise a day range
/// ("3 Feb – 17 Mar 2026"). Calendar dates are read in each timestamp's own
/// offset, not in UTC.
pub fn period_label(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> String {
    // ---
    let (s, e) = (start.date_naive(), end.date_naive());

    if s.year() == e.year()
        && s.month() == e.month()
        && s.day() == 1
        && e.day() >= last_day_of_month(e.year(), e.month())
    {
        return s.format("%B %Y").to_string();
    }

    if s.year() == e.year() && s.month() == 1 && s.day() == 1 && e.month() == 12 && e.day() == 31 {
        return s.year().to_string();
    }

    let quarter_start = matches!(s.month(), 1 | 4 | 7 | 10);
    if quarter_start
        && s.day() == 1
        && s.year() == e.year()
        && e.month() == s.month() + 2
        && e.day() == last_day_of_month(e.year(), e.month())
    {
        return format!("Q{} {}", (s.month() - 1) / 3 + 1, s.year());
    }

    format!(
        "{} {} \u{2013} {} {} {}",
        s.day(),
        s.format("%b"),
        e.day(),
        e.format("%b"),
        e.year()
    )
}

/// [`period_label`] over ISO-8601 strings.
pub fn make_period_label(start_iso: &str, end_iso: &str) -> Result<String> {
    Ok(period_label(parse_iso(start_iso)?, parse_iso(end_iso)?))
}

/// The calendar period before the one containing `now`, as
/// (`YYYY-MM-DDT00:00:00Z`, `YYYY-MM-DDT23:59:59Z`).
pub fn calculate_previous_period(frequency: Frequency, now: DateTime<Utc>) -> (String, String) {
    // ---
    let today = now.date_naive();

    let (year, first_month, last_month) = match frequency {
        Frequency::Monthly => {
            let (y, m) = if today.month() == 1 {
                (today.year() - 1, 12)
            } else {
                (today.year(), today.month() - 1)
            };
            (y, m, m)
        }
        Frequency::Quarterly => {
            let current_q_start = ((today.month() - 1) / 3) * 3 + 1;
            let (y, m) = if current_q_start == 1 {
                (today.year() - 1, 10)
            } else {
                (today.year(), current_q_start - 3)
            };
            (y, m, m + 2)
        }
        Frequency::Yearly => (today.year() - 1, 1, 12),
    };

    let end_day = last_day_of_month(year, last_month);
    (
        format!("{year:04}-{first_month:02}-01T00:00:00Z"),
        format!("{year:04}-{last_month:02}-{end_day:02}T23:59:59Z"),
    )
}

/// Trend bucket width for a period, with its label.
pub fn choose_trend_interval(start_ms: i64, end_ms: i64) -> (i64, &'static str) {
    // ---
    if end_ms - start_ms <= DAILY_BUCKET_MAX_DAYS * ONE_DAY_MS {
        (ONE_DAY_MS, "daily")
    } else {
        (7 * ONE_DAY_MS, "weekly")
    }
}
