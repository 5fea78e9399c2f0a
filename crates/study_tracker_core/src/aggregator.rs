//! crates/study_tracker_core/src/aggregator.rs
//!
//! The study-time aggregator: session lifecycle plus the per-user, per-local-day
//! totals derived from it. All storage and clock access goes through the ports,
//! so the same logic runs against Postgres in production and against in-memory
//! doubles in tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Months, NaiveDate};
use uuid::Uuid;

use crate::domain::{
    ActiveSessionView, CalendarEntry, DayProgressView, DayTotals, StopOutcome, StudySession,
    TodaySummary,
};
use crate::ports::{Clock, PortError, PortResult, StudyStore};
use crate::timeline;

pub struct StudyTimeAggregator {
    store: Arc<dyn StudyStore>,
    clock: Arc<dyn Clock>,
}

impl StudyTimeAggregator {
    pub fn new(store: Arc<dyn StudyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Opens a new session for the user, started now.
    ///
    /// The caller's identity is trusted; several open sessions per user are
    /// tolerated and aggregate independently.
    pub async fn start_session(&self, user_id: Uuid) -> PortResult<StudySession> {
        self.store.insert_session(user_id, self.clock.now()).await
    }

    /// Closes a session and folds its elapsed time into the daily totals.
    ///
    /// The interval is split at local midnights and each piece is merged into
    /// its day's row. Returns the totals of the last day touched. Stopping an
    /// unknown or already-closed session is a soft no-op.
    pub async fn stop_session(&self, session_id: Uuid) -> PortResult<StopOutcome> {
        let session = match self.store.session_by_id(session_id).await? {
            Some(s) if s.is_open() => s,
            _ => return Ok(StopOutcome::InvalidSession),
        };

        let ended_at = self.clock.now();
        let duration_minutes = (ended_at - session.started_at).num_minutes().max(0);
        let closed = self
            .store
            .close_session(session_id, ended_at, duration_minutes)
            .await?;
        if !closed {
            // A concurrent stop closed the session between our read and our
            // write; the winner already aggregated it.
            return Ok(StopOutcome::InvalidSession);
        }

        let mut last_totals = DayTotals::ZERO;
        for (day, seconds) in timeline::split_by_local_day(session.started_at, ended_at) {
            // The stop path never supplies a badge hint; badges shown to users
            // are derived from minutes on read.
            last_totals = self
                .upsert_daily_progress(session.user_id, day, seconds, 0)
                .await?;
        }
        Ok(StopOutcome::Completed(last_totals))
    }

    /// Merges seconds into one day's row, clamping the contribution to a single
    /// day's worth as a guard against corrupted session data.
    async fn upsert_daily_progress(
        &self,
        user_id: Uuid,
        day: NaiveDate,
        add_seconds: i64,
        badge_hint: i16,
    ) -> PortResult<DayTotals> {
        let seconds = timeline::clamp_day_seconds(add_seconds);
        self.store
            .upsert_daily_progress(user_id, day, seconds, badge_hint)
            .await
    }

    /// Today's totals, formatted for the timer screen. Zero state when the
    /// user has not studied today.
    pub async fn today_summary(&self, user_id: Uuid) -> PortResult<TodaySummary> {
        let today = timeline::local_day(self.clock.now());
        let totals = self
            .store
            .daily_progress(user_id, today)
            .await?
            .unwrap_or(DayTotals::ZERO);
        Ok(TodaySummary {
            seconds: totals.total_seconds,
            time: timeline::format_hms(totals.total_seconds),
            image_tier: timeline::image_tier(totals.total_seconds),
        })
    }

    /// Every recorded day of the given month, keyed `YYYY-MM-DD`. Badges are
    /// recomputed from minutes; `lang` selects the displayed calendar era.
    pub async fn month_calendar(
        &self,
        user_id: Uuid,
        year: i32,
        month: u32,
        lang: Option<&str>,
    ) -> PortResult<BTreeMap<String, CalendarEntry>> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| PortError::InvalidInput(format!("invalid month {year}-{month}")))?;
        let last = first
            .checked_add_months(Months::new(1))
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| PortError::InvalidInput(format!("invalid month {year}-{month}")))?;

        let rows = self
            .store
            .daily_progress_in_range(user_id, first, last)
            .await?;

        let mut calendar = BTreeMap::new();
        for (day, totals) in rows {
            calendar.insert(
                day.format("%Y-%m-%d").to_string(),
                CalendarEntry {
                    total_minutes: totals.total_minutes,
                    total_seconds: totals.total_seconds,
                    badge: timeline::badge_level(totals.total_minutes),
                    year: timeline::displayed_year(day.year(), lang),
                },
            );
        }
        Ok(calendar)
    }

    /// One day's totals. A day with no recorded activity is a valid zero
    /// state, not an error.
    pub async fn day_progress(
        &self,
        user_id: Uuid,
        year: i32,
        month: u32,
        day: u32,
    ) -> PortResult<DayProgressView> {
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| PortError::InvalidInput(format!("invalid date {year}-{month}-{day}")))?;

        let view = match self.store.daily_progress(user_id, date).await? {
            Some(totals) => DayProgressView {
                date,
                total_minutes: totals.total_minutes,
                total_seconds: totals.total_seconds,
                hours: totals.total_seconds / 3600,
                badge_level: timeline::badge_level(totals.total_minutes),
            },
            None => DayProgressView::empty(date),
        };
        Ok(view)
    }

    /// The user's most recently started open session, with the server clock so
    /// the client can render elapsed time without trusting its own.
    pub async fn active_session(&self, user_id: Uuid) -> PortResult<ActiveSessionView> {
        let session = self.store.latest_open_session(user_id).await?;
        Ok(ActiveSessionView {
            session,
            server_time: self.clock.now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory `StudyStore` double. Locks are never held across awaits.
    #[derive(Default)]
    struct MemoryStore {
        inner: Mutex<MemoryInner>,
    }

    #[derive(Default)]
    struct MemoryInner {
        sessions: HashMap<Uuid, StudySession>,
        progress: HashMap<(Uuid, NaiveDate), DayTotals>,
    }

    #[async_trait]
    impl StudyStore for MemoryStore {
        async fn insert_session(
            &self,
            user_id: Uuid,
            started_at: DateTime<Utc>,
        ) -> PortResult<StudySession> {
            let session = StudySession {
                id: Uuid::new_v4(),
                user_id,
                started_at,
                ended_at: None,
                duration_minutes: None,
            };
            self.inner
                .lock()
                .unwrap()
                .sessions
                .insert(session.id, session.clone());
            Ok(session)
        }

        async fn session_by_id(&self, session_id: Uuid) -> PortResult<Option<StudySession>> {
            Ok(self.inner.lock().unwrap().sessions.get(&session_id).cloned())
        }

        async fn close_session(
            &self,
            session_id: Uuid,
            ended_at: DateTime<Utc>,
            duration_minutes: i64,
        ) -> PortResult<bool> {
            let mut inner = self.inner.lock().unwrap();
            match inner.sessions.get_mut(&session_id) {
                Some(session) if session.is_open() => {
                    session.ended_at = Some(ended_at);
                    session.duration_minutes = Some(duration_minutes);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn latest_open_session(&self, user_id: Uuid) -> PortResult<Option<StudySession>> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .sessions
                .values()
                .filter(|s| s.user_id == user_id && s.is_open())
                .max_by_key(|s| s.started_at)
                .cloned())
        }

        async fn upsert_daily_progress(
            &self,
            user_id: Uuid,
            day: NaiveDate,
            add_seconds: i64,
            badge_hint: i16,
        ) -> PortResult<DayTotals> {
            let mut inner = self.inner.lock().unwrap();
            let totals = inner.progress.entry((user_id, day)).or_insert(DayTotals::ZERO);
            totals.total_seconds += add_seconds;
            totals.total_minutes = totals.total_seconds / 60;
            totals.badge_level = totals.badge_level.max(badge_hint);
            Ok(*totals)
        }

        async fn daily_progress(
            &self,
            user_id: Uuid,
            day: NaiveDate,
        ) -> PortResult<Option<DayTotals>> {
            Ok(self.inner.lock().unwrap().progress.get(&(user_id, day)).copied())
        }

        async fn daily_progress_in_range(
            &self,
            user_id: Uuid,
            first: NaiveDate,
            last: NaiveDate,
        ) -> PortResult<Vec<(NaiveDate, DayTotals)>> {
            let inner = self.inner.lock().unwrap();
            let mut rows: Vec<_> = inner
                .progress
                .iter()
                .filter(|((uid, day), _)| *uid == user_id && (first..=last).contains(day))
                .map(|((_, day), totals)| (*day, *totals))
                .collect();
            rows.sort_by_key(|(day, _)| *day);
            Ok(rows)
        }
    }

    /// Store double where a rival stop lands between the caller's session read
    /// and its close, so the caller always loses the race.
    struct ContestedStore {
        inner: MemoryStore,
        rival_stop: DateTime<Utc>,
    }

    #[async_trait]
    impl StudyStore for ContestedStore {
        async fn insert_session(
            &self,
            user_id: Uuid,
            started_at: DateTime<Utc>,
        ) -> PortResult<StudySession> {
            self.inner.insert_session(user_id, started_at).await
        }

        async fn session_by_id(&self, session_id: Uuid) -> PortResult<Option<StudySession>> {
            let snapshot = self.inner.session_by_id(session_id).await?;
            // The rival's stop wins right after this read.
            self.inner
                .close_session(session_id, self.rival_stop, 0)
                .await?;
            Ok(snapshot)
        }

        async fn close_session(
            &self,
            session_id: Uuid,
            ended_at: DateTime<Utc>,
            duration_minutes: i64,
        ) -> PortResult<bool> {
            self.inner
                .close_session(session_id, ended_at, duration_minutes)
                .await
        }

        async fn latest_open_session(&self, user_id: Uuid) -> PortResult<Option<StudySession>> {
            self.inner.latest_open_session(user_id).await
        }

        async fn upsert_daily_progress(
            &self,
            user_id: Uuid,
            day: NaiveDate,
            add_seconds: i64,
            badge_hint: i16,
        ) -> PortResult<DayTotals> {
            self.inner
                .upsert_daily_progress(user_id, day, add_seconds, badge_hint)
                .await
        }

        async fn daily_progress(
            &self,
            user_id: Uuid,
            day: NaiveDate,
        ) -> PortResult<Option<DayTotals>> {
            self.inner.daily_progress(user_id, day).await
        }

        async fn daily_progress_in_range(
            &self,
            user_id: Uuid,
            first: NaiveDate,
            last: NaiveDate,
        ) -> PortResult<Vec<(NaiveDate, DayTotals)>> {
            self.inner.daily_progress_in_range(user_id, first, last).await
        }
    }

    /// Settable clock so tests can pin start and stop instants exactly.
    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn starting_at(now: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(now),
            }
        }

        fn set(&self, now: DateTime<Utc>) {
            *self.now.lock().unwrap() = now;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        timeline::local_offset()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn day(y: i32, mo: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap()
    }

    fn fixture(start: DateTime<Utc>) -> (StudyTimeAggregator, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::default());
        let clock = Arc::new(ManualClock::starting_at(start));
        let aggregator = StudyTimeAggregator::new(store.clone(), clock.clone());
        (aggregator, store, clock)
    }

    #[tokio::test]
    async fn morning_session_lands_on_one_day() {
        let (agg, _, clock) = fixture(local(2025, 3, 10, 8, 0, 0));
        let user = Uuid::new_v4();

        let session = agg.start_session(user).await.unwrap();
        clock.set(local(2025, 3, 10, 9, 30, 0));
        let outcome = agg.stop_session(session.id).await.unwrap();

        assert_eq!(
            outcome,
            StopOutcome::Completed(DayTotals {
                total_seconds: 5400,
                total_minutes: 90,
                badge_level: 0,
            })
        );
        let view = agg.day_progress(user, 2025, 3, 10).await.unwrap();
        assert_eq!(view.total_seconds, 5400);
        assert_eq!(view.total_minutes, 90);
    }

    #[tokio::test]
    async fn overnight_session_splits_and_returns_last_day() {
        let (agg, store, clock) = fixture(local(2025, 3, 10, 23, 0, 0));
        let user = Uuid::new_v4();

        let session = agg.start_session(user).await.unwrap();
        clock.set(local(2025, 3, 11, 2, 0, 0));
        let outcome = agg.stop_session(session.id).await.unwrap();

        assert_eq!(
            outcome,
            StopOutcome::Completed(DayTotals {
                total_seconds: 7200,
                total_minutes: 120,
                badge_level: 0,
            })
        );
        let first = store
            .daily_progress(user, day(2025, 3, 10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.total_seconds, 3600);
        let second = store
            .daily_progress(user, day(2025, 3, 11))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.total_seconds, 7200);
    }

    #[tokio::test]
    async fn sequential_sessions_accumulate() {
        let (agg, _, clock) = fixture(local(2025, 3, 10, 9, 0, 0));
        let user = Uuid::new_v4();

        let first = agg.start_session(user).await.unwrap();
        clock.set(local(2025, 3, 10, 10, 30, 0));
        agg.stop_session(first.id).await.unwrap();

        clock.set(local(2025, 3, 10, 14, 0, 0));
        let second = agg.start_session(user).await.unwrap();
        clock.set(local(2025, 3, 10, 15, 40, 0));
        let outcome = agg.stop_session(second.id).await.unwrap();

        assert_eq!(
            outcome,
            StopOutcome::Completed(DayTotals {
                total_seconds: 11_400,
                total_minutes: 190,
                badge_level: 0,
            })
        );
    }

    #[tokio::test]
    async fn second_stop_is_a_soft_no_op() {
        let (agg, store, clock) = fixture(local(2025, 3, 10, 8, 0, 0));
        let user = Uuid::new_v4();

        let session = agg.start_session(user).await.unwrap();
        clock.set(local(2025, 3, 10, 9, 0, 0));
        agg.stop_session(session.id).await.unwrap();

        clock.set(local(2025, 3, 10, 11, 0, 0));
        let again = agg.stop_session(session.id).await.unwrap();
        assert_eq!(again, StopOutcome::InvalidSession);

        let totals = store
            .daily_progress(user, day(2025, 3, 10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(totals.total_seconds, 3600);
    }

    #[tokio::test]
    async fn losing_a_stop_race_is_a_soft_no_op() {
        let store = Arc::new(ContestedStore {
            inner: MemoryStore::default(),
            rival_stop: local(2025, 3, 10, 9, 0, 0),
        });
        let clock = Arc::new(ManualClock::starting_at(local(2025, 3, 10, 8, 0, 0)));
        let agg = StudyTimeAggregator::new(store.clone(), clock.clone());
        let user = Uuid::new_v4();

        let session = agg.start_session(user).await.unwrap();
        clock.set(local(2025, 3, 10, 9, 0, 5));
        let outcome = agg.stop_session(session.id).await.unwrap();

        // The loser reports the soft failure and contributes no seconds.
        assert_eq!(outcome, StopOutcome::InvalidSession);
        assert!(store.inner.inner.lock().unwrap().progress.is_empty());
    }

    #[tokio::test]
    async fn stopping_unknown_session_mutates_nothing() {
        let (agg, store, _) = fixture(local(2025, 3, 10, 8, 0, 0));
        let outcome = agg.stop_session(Uuid::new_v4()).await.unwrap();
        assert_eq!(outcome, StopOutcome::InvalidSession);
        assert!(store.inner.lock().unwrap().progress.is_empty());
        assert!(store.inner.lock().unwrap().sessions.is_empty());
    }

    #[tokio::test]
    async fn oversized_contribution_is_clamped() {
        let (agg, _, _) = fixture(local(2025, 3, 10, 8, 0, 0));
        let user = Uuid::new_v4();
        let totals = agg
            .upsert_daily_progress(user, day(2025, 3, 10), 90_000, 0)
            .await
            .unwrap();
        assert_eq!(totals.total_seconds, 86_400);
        assert_eq!(totals.total_minutes, 1440);
    }

    #[tokio::test]
    async fn badge_hint_never_lowers_the_stored_level() {
        let (agg, _, _) = fixture(local(2025, 3, 10, 8, 0, 0));
        let user = Uuid::new_v4();
        let raised = agg
            .upsert_daily_progress(user, day(2025, 3, 10), 60, 3)
            .await
            .unwrap();
        assert_eq!(raised.badge_level, 3);
        let after = agg
            .upsert_daily_progress(user, day(2025, 3, 10), 60, 1)
            .await
            .unwrap();
        assert_eq!(after.badge_level, 3);
    }

    #[tokio::test]
    async fn today_summary_zero_state() {
        let (agg, _, _) = fixture(local(2025, 3, 10, 8, 0, 0));
        let summary = agg.today_summary(Uuid::new_v4()).await.unwrap();
        assert_eq!(summary.seconds, 0);
        assert_eq!(summary.time, "00:00:00");
        assert_eq!(summary.image_tier, 0);
    }

    #[tokio::test]
    async fn today_summary_reflects_stopped_session() {
        let (agg, _, clock) = fixture(local(2025, 3, 10, 8, 0, 0));
        let user = Uuid::new_v4();
        let session = agg.start_session(user).await.unwrap();
        clock.set(local(2025, 3, 10, 12, 15, 30));
        agg.stop_session(session.id).await.unwrap();

        let summary = agg.today_summary(user).await.unwrap();
        assert_eq!(summary.seconds, 15_330);
        assert_eq!(summary.time, "04:15:30");
        assert_eq!(summary.image_tier, 2);
    }

    #[tokio::test]
    async fn day_progress_zero_state_is_not_an_error() {
        let (agg, _, _) = fixture(local(2025, 3, 10, 8, 0, 0));
        let view = agg.day_progress(Uuid::new_v4(), 2025, 7, 4).await.unwrap();
        assert_eq!(view, DayProgressView::empty(day(2025, 7, 4)));
    }

    #[tokio::test]
    async fn invalid_date_is_rejected() {
        let (agg, _, _) = fixture(local(2025, 3, 10, 8, 0, 0));
        let err = agg.day_progress(Uuid::new_v4(), 2025, 2, 30).await;
        assert!(matches!(err, Err(PortError::InvalidInput(_))));
        let err = agg.month_calendar(Uuid::new_v4(), 2025, 13, None).await;
        assert!(matches!(err, Err(PortError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn calendar_keys_days_and_applies_locale_year() {
        let (agg, store, _) = fixture(local(2025, 3, 10, 8, 0, 0));
        let user = Uuid::new_v4();
        store
            .upsert_daily_progress(user, day(2025, 3, 10), 5400, 0)
            .await
            .unwrap();
        store
            .upsert_daily_progress(user, day(2025, 3, 21), 12_000, 0)
            .await
            .unwrap();
        // Neighboring months must not leak in.
        store
            .upsert_daily_progress(user, day(2025, 4, 1), 600, 0)
            .await
            .unwrap();

        let calendar = agg
            .month_calendar(user, 2025, 3, Some("th"))
            .await
            .unwrap();
        assert_eq!(calendar.len(), 2);
        let entry = &calendar["2025-03-21"];
        assert_eq!(entry.total_seconds, 12_000);
        assert_eq!(entry.total_minutes, 200);
        assert_eq!(entry.badge, 1);
        assert_eq!(entry.year, 2568);
    }

    #[tokio::test]
    async fn active_session_reports_latest_open() {
        let (agg, _, clock) = fixture(local(2025, 3, 10, 8, 0, 0));
        let user = Uuid::new_v4();

        let none = agg.active_session(user).await.unwrap();
        assert!(none.session.is_none());

        agg.start_session(user).await.unwrap();
        clock.set(local(2025, 3, 10, 9, 0, 0));
        let later = agg.start_session(user).await.unwrap();

        clock.set(local(2025, 3, 10, 9, 5, 0));
        let view = agg.active_session(user).await.unwrap();
        let open = view.session.expect("open session");
        assert_eq!(open.id, later.id);
        assert_eq!(view.server_time, local(2025, 3, 10, 9, 5, 0));
    }
}
