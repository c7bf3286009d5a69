//! Valid-time resolution.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::message::{keys, GribMessage};

/// Valid time of a message.
///
/// A direct `validDate` attribute wins. Otherwise `dataDate` (YYYYMMDD)
/// and `dataTime` (HHMM, default 0) are decomposed arithmetically; hours
/// and minutes are added to the date, so an out-of-range time of day rolls
/// over rather than failing. A missing, zero or impossible date, or a time
/// too large to represent, yields `None`.
pub fn resolve_timestamp(message: &impl GribMessage) -> Option<DateTime<Utc>> {
    if let Some(valid) = message
        .attribute(keys::VALID_DATE)
        .and_then(|value| value.as_timestamp())
    {
        return Some(valid);
    }

    let date = message.attribute(keys::DATA_DATE)?.as_i64()?;
    if date == 0 {
        return None;
    }
    let time = message
        .attribute(keys::DATA_TIME)
        .and_then(|value| value.as_i64())
        .unwrap_or(0);

    let (year, month, day) = (date / 10_000, (date / 100) % 100, date % 100);
    let (hour, minute) = (time / 100, time % 100);

    let midnight = NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )?
    .and_hms_opt(0, 0, 0)?;

    let naive = midnight
        .checked_add_signed(Duration::try_hours(hour)?)?
        .checked_add_signed(Duration::try_minutes(minute)?)?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}
