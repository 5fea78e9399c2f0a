//! crates/study_tracker_core/src/domain.rs
//!
//! Defines the pure, core data structures for the study tracker.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// One contiguous start/stop interval of tracked study activity.
#[derive(Debug, Clone)]
pub struct StudySession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// `None` while the session is still open.
    pub ended_at: Option<DateTime<Utc>>,
    /// Whole minutes between start and end; `None` until the session is stopped.
    pub duration_minutes: Option<i64>,
}

impl StudySession {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Accumulated totals for one user on one local calendar day.
///
/// `total_minutes` is derived (`total_seconds / 60`) and `badge_level` is a
/// running maximum of the hints supplied to the upsert, not necessarily the
/// badge formula applied to the current minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayTotals {
    pub total_seconds: i64,
    pub total_minutes: i64,
    pub badge_level: i16,
}

impl DayTotals {
    pub const ZERO: DayTotals = DayTotals {
        total_seconds: 0,
        total_minutes: 0,
        badge_level: 0,
    };
}

/// Outcome of a stop request. Stopping an unknown or already-closed session is
/// a soft no-op, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The session was closed; carries the totals of the last local day the
    /// session touched.
    Completed(DayTotals),
    InvalidSession,
}

/// Today's accumulated time, pre-formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodaySummary {
    pub seconds: i64,
    /// `HH:MM:SS`; hours may exceed 24.
    pub time: String,
    /// Presentation tier 0-4, resolved to a display asset by the client.
    pub image_tier: u8,
}

/// One day's entry in the month calendar view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEntry {
    pub total_minutes: i64,
    pub total_seconds: i64,
    pub badge: i16,
    /// The year as displayed for the requested locale (Buddhist era for "th").
    pub year: i32,
}

/// Totals for a single queried day. Zero-valued when the day has no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayProgressView {
    pub date: NaiveDate,
    pub total_minutes: i64,
    pub total_seconds: i64,
    pub hours: i64,
    pub badge_level: i16,
}

impl DayProgressView {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_minutes: 0,
            total_seconds: 0,
            hours: 0,
            badge_level: 0,
        }
    }
}

/// The user's most recently started open session, if any, together with the
/// server clock so clients can compute elapsed time without trusting their own.
#[derive(Debug, Clone)]
pub struct ActiveSessionView {
    pub session: Option<StudySession>,
    pub server_time: DateTime<Utc>,
}
