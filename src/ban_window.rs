//! Calendar arithmetic for the follow-up ban window.
//!
//! The window always ends exactly two calendar months after the original
//! punishment was created, with the day clamped to the end of the target
//! month. Eligibility looks only at that calendar end; the requested
//! duration additionally respects an explicit expiry when one exists.
use time::{Date, Month, PrimitiveDateTime};

use crate::error::{Error, Result};

/// Fixed offset of the ban window, in calendar months.
pub const WINDOW_MONTHS: u8 = 2;

/// Requested durations never go below one hour.
pub const MIN_DURATION_SECS: i64 = 3600;

/// Calendar end of the ban window and whether it is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanWindow {
    pub ends: PrimitiveDateTime,
    pub eligible_now: bool,
}

pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub fn days_in_month(year: i32, month: Month) -> u8 {
    match month {
        Month::February if is_leap_year(year) => 29,
        Month::February => 28,
        Month::April | Month::June | Month::September | Month::November => 30,
        _ => 31,
    }
}

/// `created` shifted forward by [`WINDOW_MONTHS`], keeping the time of day.
pub fn calculated_ban_end(created: PrimitiveDateTime) -> Result<PrimitiveDateTime> {
    let month = created.month().nth_next(WINDOW_MONTHS);
    let year = if (month as u8) < (created.month() as u8) {
        created.year() + 1
    } else {
        created.year()
    };
    let day = created.day().min(days_in_month(year, month));
    let date = Date::from_calendar_date(year, month, day)
        .map_err(|e| Error::InvalidArgument(format!("ban end out of range for {created}: {e}")))?;
    Ok(PrimitiveDateTime::new(date, created.time()))
}

pub fn bannable_window(created: PrimitiveDateTime, now: PrimitiveDateTime) -> Result<BanWindow> {
    let ends = calculated_ban_end(created)?;
    Ok(BanWindow {
        ends,
        eligible_now: now <= ends,
    })
}

/// Seconds to request for the follow-up ban, never below [`MIN_DURATION_SECS`].
pub fn remaining_duration(
    created: PrimitiveDateTime,
    expires: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> Result<i64> {
    let calendar_end = calculated_ban_end(created)?;
    let effective_end = match expires {
        Some(expires) => calendar_end.min(expires),
        None => calendar_end,
    };
    if effective_end <= now {
        return Ok(MIN_DURATION_SECS);
    }
    Ok((effective_end - now).whole_seconds().max(MIN_DURATION_SECS))
}
