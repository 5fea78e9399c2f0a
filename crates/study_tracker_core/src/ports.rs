//! crates/study_tracker_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! aggregator to be independent of the database engine and the wall clock.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{DayTotals, StudySession};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Storage contract for sessions and daily progress.
///
/// Days are always *local* calendar dates: the aggregator converts instants to
/// the product timezone before they reach this trait, so implementations never
/// perform timezone arithmetic of their own.
#[async_trait]
pub trait StudyStore: Send + Sync {
    // --- Session Lifecycle ---
    async fn insert_session(
        &self,
        user_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> PortResult<StudySession>;

    async fn session_by_id(&self, session_id: Uuid) -> PortResult<Option<StudySession>>;

    /// Closes the session if it is still open. Returns `false` when the
    /// session is unknown or already closed — a concurrent stop may win the
    /// race between the caller's read and this write, and the loser must be
    /// able to tell.
    async fn close_session(
        &self,
        session_id: Uuid,
        ended_at: DateTime<Utc>,
        duration_minutes: i64,
    ) -> PortResult<bool>;

    /// The most recently started session for the user with no end time.
    async fn latest_open_session(&self, user_id: Uuid) -> PortResult<Option<StudySession>>;

    // --- Daily Progress ---
    /// Locate-or-create the row for `(user_id, day)`, add `add_seconds`, raise
    /// `badge_level` to at least `badge_hint`, and recompute `total_minutes`.
    ///
    /// Implementations must make the read-modify-write atomic with respect to
    /// concurrent calls on the same key (row lock or native atomic increment);
    /// two sessions stopped at nearly the same moment must not lose seconds.
    async fn upsert_daily_progress(
        &self,
        user_id: Uuid,
        day: NaiveDate,
        add_seconds: i64,
        badge_hint: i16,
    ) -> PortResult<DayTotals>;

    async fn daily_progress(&self, user_id: Uuid, day: NaiveDate) -> PortResult<Option<DayTotals>>;

    /// All rows for the user whose day falls within `[first, last]`, inclusive.
    async fn daily_progress_in_range(
        &self,
        user_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
    ) -> PortResult<Vec<(NaiveDate, DayTotals)>>;
}

/// Injectable time source so tests can pin the clock for day-boundary cases.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The production clock.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
