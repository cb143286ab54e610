//! Wall-clock helpers.
//!
//! Store timestamps are naive local date-times, so every conversion goes
//! through one process-wide UTC offset. It must be captured with
//! [`init_local_offset`] before the async runtime starts worker threads,
//! because the platform lookup refuses to run in a multi-threaded process.
use std::sync::OnceLock;

use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Determine and pin the local offset, falling back to UTC.
pub fn init_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

pub fn local_offset() -> UtcOffset {
    LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC)
}

/// Current local time without offset information.
pub fn now_local() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc().to_offset(local_offset());
    PrimitiveDateTime::new(now.date(), now.time())
}

pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Convert a unix timestamp into a naive date-time at `offset`.
pub fn from_unix(ts: i64, offset: UtcOffset) -> Option<PrimitiveDateTime> {
    let at = OffsetDateTime::from_unix_timestamp(ts).ok()?.to_offset(offset);
    Some(PrimitiveDateTime::new(at.date(), at.time()))
}
