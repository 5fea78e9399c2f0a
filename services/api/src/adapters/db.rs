//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `StudyStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use study_tracker_core::domain::{DayTotals, StudySession};
use study_tracker_core::ports::{PortError, PortResult, StudyStore};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `StudyStore` port.
#[derive(Clone)]
pub struct PgStudyStore {
    pool: PgPool,
}

impl PgStudyStore {
    /// Creates a new `PgStudyStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: Uuid,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    duration_minutes: Option<i64>,
}

impl SessionRecord {
    fn to_domain(self) -> StudySession {
        StudySession {
            id: self.id,
            user_id: self.user_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_minutes: self.duration_minutes,
        }
    }
}

#[derive(FromRow)]
struct TotalsRecord {
    total_seconds: i64,
    total_minutes: i64,
    badge_level: i16,
}

impl TotalsRecord {
    fn to_domain(self) -> DayTotals {
        DayTotals {
            total_seconds: self.total_seconds,
            total_minutes: self.total_minutes,
            badge_level: self.badge_level,
        }
    }
}

#[derive(FromRow)]
struct DayRecord {
    day: NaiveDate,
    total_seconds: i64,
    total_minutes: i64,
    badge_level: i16,
}

//=========================================================================================
// `StudyStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl StudyStore for PgStudyStore {
    async fn insert_session(
        &self,
        user_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> PortResult<StudySession> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "INSERT INTO study_sessions (id, user_id, started_at) VALUES ($1, $2, $3) \
             RETURNING id, user_id, started_at, ended_at, duration_minutes",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.to_domain())
    }

    async fn session_by_id(&self, session_id: Uuid) -> PortResult<Option<StudySession>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, user_id, started_at, ended_at, duration_minutes \
             FROM study_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn close_session(
        &self,
        session_id: Uuid,
        ended_at: DateTime<Utc>,
        duration_minutes: i64,
    ) -> PortResult<bool> {
        // The `ended_at IS NULL` guard makes concurrent stops race safely:
        // exactly one UPDATE matches, and the loser sees zero rows affected.
        let result = sqlx::query(
            "UPDATE study_sessions SET ended_at = $2, duration_minutes = $3 \
             WHERE id = $1 AND ended_at IS NULL",
        )
        .bind(session_id)
        .bind(ended_at)
        .bind(duration_minutes)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn latest_open_session(&self, user_id: Uuid) -> PortResult<Option<StudySession>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, user_id, started_at, ended_at, duration_minutes \
             FROM study_sessions \
             WHERE user_id = $1 AND ended_at IS NULL \
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn upsert_daily_progress(
        &self,
        user_id: Uuid,
        day: NaiveDate,
        add_seconds: i64,
        badge_hint: i16,
    ) -> PortResult<DayTotals> {
        // A single atomic increment: concurrent stops for the same (user, day)
        // serialize on the row instead of racing a read-modify-write. The
        // unique index on (user_id, day) backs this at the schema level.
        let record = sqlx::query_as::<_, TotalsRecord>(
            "INSERT INTO daily_progress (id, user_id, day, total_seconds, total_minutes, badge_level) \
             VALUES ($1, $2, $3, $4, $4 / 60, $5) \
             ON CONFLICT (user_id, day) DO UPDATE SET \
                 total_seconds = daily_progress.total_seconds + EXCLUDED.total_seconds, \
                 total_minutes = (daily_progress.total_seconds + EXCLUDED.total_seconds) / 60, \
                 badge_level = GREATEST(daily_progress.badge_level, EXCLUDED.badge_level) \
             RETURNING total_seconds, total_minutes, badge_level",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(day)
        .bind(add_seconds)
        .bind(badge_hint)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.to_domain())
    }

    async fn daily_progress(&self, user_id: Uuid, day: NaiveDate) -> PortResult<Option<DayTotals>> {
        let record = sqlx::query_as::<_, TotalsRecord>(
            "SELECT total_seconds, total_minutes, badge_level \
             FROM daily_progress WHERE user_id = $1 AND day = $2",
        )
        .bind(user_id)
        .bind(day)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.map(TotalsRecord::to_domain))
    }

    async fn daily_progress_in_range(
        &self,
        user_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
    ) -> PortResult<Vec<(NaiveDate, DayTotals)>> {
        let records = sqlx::query_as::<_, DayRecord>(
            "SELECT day, total_seconds, total_minutes, badge_level \
             FROM daily_progress \
             WHERE user_id = $1 AND day BETWEEN $2 AND $3 \
             ORDER BY day ASC",
        )
        .bind(user_id)
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let rows = records
            .into_iter()
            .map(|r| {
                (
                    r.day,
                    DayTotals {
                        total_seconds: r.total_seconds,
                        total_minutes: r.total_minutes,
                        badge_level: r.badge_level,
                    },
                )
            })
            .collect();
        Ok(rows)
    }
}
