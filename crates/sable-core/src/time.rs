//! Wall-clock helpers: ISO-8601 formatting and day stamps, UTC throughout.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
#[must_use]
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn epoch_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Nanoseconds since the Unix epoch. Used for gate id uniqueness.
#[must_use]
pub fn epoch_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// Current instant as `YYYY-MM-DDTHH:MM:SSZ`.
#[must_use]
pub fn now_iso() -> String {
    iso_from_secs(epoch_secs())
}

/// Format Unix seconds as `YYYY-MM-DDTHH:MM:SSZ`.
#[must_use]
pub fn iso_from_secs(secs: u64) -> String {
    let days = secs / 86_400;
    let time_secs = secs % 86_400;
    let hours = time_secs / 3_600;
    let minutes = (time_secs % 3_600) / 60;
    let seconds = time_secs % 60;
    let (year, month, day) = days_to_ymd(days);
    format!("{year:04}-{month:02}-{day:02}T{hours:02}:{minutes:02}:{seconds:02}Z")
}

/// UTC day stamp (`YYYY-MM-DD`) for the current instant. Names the day files.
#[must_use]
pub fn today_stamp() -> String {
    day_stamp_from_secs(epoch_secs())
}

/// UTC day stamp for the given Unix seconds.
#[must_use]
pub fn day_stamp_from_secs(secs: u64) -> String {
    let (year, month, day) = days_to_ymd(secs / 86_400);
    format!("{year:04}-{month:02}-{day:02}")
}

/// The last `days` day stamps, newest first, including today.
#[must_use]
pub fn recent_day_stamps(days: u32) -> Vec<String> {
    let now = epoch_secs();
    (0..u64::from(days))
        .map(|back| day_stamp_from_secs(now.saturating_sub(back * 86_400)))
        .collect()
}

fn days_to_ymd(mut days: u64) -> (u64, u64, u64) {
    let mut year = 1970;
    loop {
        let days_in_year = if is_leap(year) { 366 } else { 365 };
        if days < days_in_year {
            break;
        }
        days -= days_in_year;
        year += 1;
    }
    let month_days: [u64; 12] = if is_leap(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };
    let mut month = 0;
    for (i, &md) in month_days.iter().enumerate() {
        if days < md {
            month = i as u64 + 1;
            break;
        }
        days -= md;
    }
    (year, month, days + 1)
}

fn is_leap(y: u64) -> bool {
    y.is_multiple_of(4) && (!y.is_multiple_of(100) || y.is_multiple_of(400))
}
