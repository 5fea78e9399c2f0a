//! crates/study_tracker_core/src/timeline.rs
//!
//! Local-day arithmetic for the study tracker. The product runs on a single
//! fixed timezone (UTC+7, Asia/Bangkok — no DST), so a `FixedOffset` is exact.
//! Everything here is a pure function; the aggregator routes all day-boundary
//! decisions through this module so that session splitting and progress lookups
//! agree on where a day starts.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Offset of the product timezone from UTC, in seconds.
pub const LOCAL_UTC_OFFSET_SECS: i32 = 7 * 3600;

/// Longest contribution a single sub-interval may make to one day.
pub const MAX_DAY_SECONDS: i64 = 86_400;

/// Minutes of accumulated study per badge tier.
const MINUTES_PER_BADGE: i64 = 180;

/// Highest badge tier.
const MAX_BADGE: i64 = 4;

/// Year offset of the Buddhist era used for the Thai locale.
const BUDDHIST_ERA_OFFSET: i32 = 543;

/// The product timezone.
pub fn local_offset() -> FixedOffset {
    FixedOffset::east_opt(LOCAL_UTC_OFFSET_SECS).expect("UTC+7 is a valid offset")
}

/// Projects an absolute instant onto the local wall clock.
pub fn to_local(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&local_offset()).naive_local()
}

/// The local calendar day an instant falls in.
pub fn local_day(instant: DateTime<Utc>) -> NaiveDate {
    to_local(instant).date()
}

/// Splits `[start, end]` into one `(local_day, whole_seconds)` pair per local
/// calendar day the interval touches, in chronological order.
///
/// The first piece runs from `start` to the next local midnight, inner pieces
/// are full days, and the last ends at `end`. A zero-length interval still
/// touches its single day (with zero seconds); an inverted interval (end
/// before start, e.g. clock skew) touches nothing.
pub fn split_by_local_day(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(NaiveDate, i64)> {
    let mut cursor = to_local(start);
    let end_local = to_local(end);
    if end_local < cursor {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    while cursor.date() < end_local.date() {
        let Some(next_day) = cursor.date().succ_opt() else {
            break;
        };
        let midnight = next_day.and_time(NaiveTime::MIN);
        pieces.push((cursor.date(), (midnight - cursor).num_seconds()));
        cursor = midnight;
    }
    pieces.push((end_local.date(), (end_local - cursor).num_seconds()));
    pieces
}

/// Clamps one day's contribution to `[0, 86400]` seconds. The splitter cannot
/// produce anything outside that range, but corrupted session rows could.
pub fn clamp_day_seconds(seconds: i64) -> i64 {
    seconds.clamp(0, MAX_DAY_SECONDS)
}

/// Badge tier for an amount of accumulated minutes: one step every three
/// hours, capped at tier 4. This formula is the source of truth for display;
/// the persisted `badge_level` column is only a running-max cache of hints.
pub fn badge_level(total_minutes: i64) -> i16 {
    (total_minutes / MINUTES_PER_BADGE).clamp(0, MAX_BADGE) as i16
}

/// Presentation tier for the "today" view. Boundaries at 0, 3, 6 and 9 hours:
/// tier 0 only at exactly zero, then (0,3) / [3,6) / [6,9) / [9,inf).
pub fn image_tier(total_seconds: i64) -> u8 {
    match total_seconds {
        s if s <= 0 => 0,
        s if s < 3 * 3600 => 1,
        s if s < 6 * 3600 => 2,
        s if s < 9 * 3600 => 3,
        _ => 4,
    }
}

/// Formats a second count as zero-padded `HH:MM:SS`. Hours may exceed 24.
pub fn format_hms(total_seconds: i64) -> String {
    let secs = total_seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// The year as shown for a locale: the Thai locale displays Buddhist-era
/// years, every other locale the plain Gregorian year.
pub fn displayed_year(year: i32, lang: Option<&str>) -> i32 {
    match lang {
        Some("th") => year + BUDDHIST_ERA_OFFSET,
        _ => year,
    }
}
