//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use study_tracker_core::domain::StopOutcome;
use study_tracker_core::ports::PortError;
use tracing::error;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        start_session_handler,
        stop_session_handler,
        today_handler,
        calendar_handler,
        day_progress_handler,
        active_session_handler,
    ),
    components(
        schemas(
            StartSessionResponse,
            StopSessionResponse,
            InvalidSessionResponse,
            TodayResponse,
            CalendarDayResponse,
            DayProgressResponse,
            ActiveSessionResponse,
        )
    ),
    tags(
        (name = "Study Timer", description = "Study-session tracking and daily progress.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, IntoParams)]
pub struct StartSessionQuery {
    /// The already-authenticated user the session belongs to.
    pub user_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct StartSessionResponse {
    session_id: Uuid,
    start_time: DateTime<Utc>,
}

/// Totals of the last local day the stopped session touched.
#[derive(Serialize, ToSchema)]
pub struct StopSessionResponse {
    total_seconds: i64,
    total_minutes: i64,
    badge_level: i16,
}

/// Soft-failure body for a stop on an unknown or already-closed session.
#[derive(Serialize, ToSchema)]
pub struct InvalidSessionResponse {
    error: String,
}

#[derive(Serialize, ToSchema)]
pub struct TodayResponse {
    seconds: i64,
    /// `HH:MM:SS`; hours may exceed 24.
    time: String,
    image_tier: u8,
}

#[derive(Deserialize, IntoParams)]
pub struct CalendarQuery {
    /// Locale flag; `th` switches the displayed year to the Buddhist era.
    pub lang: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CalendarDayResponse {
    total_minutes: i64,
    total_seconds: i64,
    badge: i16,
    year: i32,
}

#[derive(Serialize, ToSchema)]
pub struct DayProgressResponse {
    date: String,
    total_minutes: i64,
    total_seconds: i64,
    hours: i64,
    badge_level: i16,
}

#[derive(Serialize, ToSchema)]
pub struct ActiveSessionResponse {
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<DateTime<Utc>>,
    server_time: DateTime<Utc>,
}

//=========================================================================================
// Error Translation
//=========================================================================================

/// Maps a core port error onto a transport response.
fn port_error_response(context: &str, err: PortError) -> (StatusCode, String) {
    match err {
        PortError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Unexpected(_) => {
            error!("{context}: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to {context}"),
            )
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Start a study session for a user.
#[utoipa::path(
    post,
    path = "/study/start",
    params(StartSessionQuery),
    responses(
        (status = 201, description = "Session started", body = StartSessionResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn start_session_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<StartSessionQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = app_state
        .aggregator
        .start_session(query.user_id)
        .await
        .map_err(|e| port_error_response("start session", e))?;

    let response = StartSessionResponse {
        session_id: session.id,
        start_time: session.started_at,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Stop a study session and fold its time into the daily totals.
///
/// Stopping a session that does not exist or is already stopped is a no-op and
/// returns a soft-failure body rather than an error status, so clients may
/// retry freely.
#[utoipa::path(
    post,
    path = "/study/stop/{session_id}",
    params(
        ("session_id" = Uuid, Path, description = "The session to stop.")
    ),
    responses(
        (status = 200, description = "Totals for the last day touched, or a soft invalid-session body", body = StopSessionResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn stop_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, (StatusCode, String)> {
    let outcome = app_state
        .aggregator
        .stop_session(session_id)
        .await
        .map_err(|e| port_error_response("stop session", e))?;

    let response = match outcome {
        StopOutcome::Completed(totals) => Json(StopSessionResponse {
            total_seconds: totals.total_seconds,
            total_minutes: totals.total_minutes,
            badge_level: totals.badge_level,
        })
        .into_response(),
        StopOutcome::InvalidSession => Json(InvalidSessionResponse {
            error: "Invalid session".to_string(),
        })
        .into_response(),
    };
    Ok(response)
}

/// Today's accumulated study time, formatted for the timer screen.
#[utoipa::path(
    get,
    path = "/study/today/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "The user to query.")
    ),
    responses(
        (status = 200, description = "Today's totals (zeros when no activity)", body = TodayResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn today_handler(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let summary = app_state
        .aggregator
        .today_summary(user_id)
        .await
        .map_err(|e| port_error_response("fetch today's summary", e))?;

    Ok(Json(TodayResponse {
        seconds: summary.seconds,
        time: summary.time,
        image_tier: summary.image_tier,
    }))
}

/// The month's recorded days, keyed by local date.
#[utoipa::path(
    get,
    path = "/study/calendar/{user_id}/{year}/{month}",
    params(
        ("user_id" = Uuid, Path, description = "The user to query."),
        ("year" = i32, Path, description = "Calendar year."),
        ("month" = u32, Path, description = "Calendar month, 1-12."),
        CalendarQuery,
    ),
    responses(
        (status = 200, description = "Recorded days keyed YYYY-MM-DD", body = BTreeMap<String, CalendarDayResponse>),
        (status = 400, description = "Invalid year or month"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn calendar_handler(
    State(app_state): State<Arc<AppState>>,
    Path((user_id, year, month)): Path<(Uuid, i32, u32)>,
    Query(query): Query<CalendarQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let calendar = app_state
        .aggregator
        .month_calendar(user_id, year, month, query.lang.as_deref())
        .await
        .map_err(|e| port_error_response("fetch calendar", e))?;

    let body: BTreeMap<String, CalendarDayResponse> = calendar
        .into_iter()
        .map(|(date, entry)| {
            (
                date,
                CalendarDayResponse {
                    total_minutes: entry.total_minutes,
                    total_seconds: entry.total_seconds,
                    badge: entry.badge,
                    year: entry.year,
                },
            )
        })
        .collect();
    Ok(Json(body))
}

/// One day's totals; a day with no recorded activity returns zeros.
#[utoipa::path(
    get,
    path = "/study/progress/{user_id}/{year}/{month}/{day}",
    params(
        ("user_id" = Uuid, Path, description = "The user to query."),
        ("year" = i32, Path, description = "Calendar year."),
        ("month" = u32, Path, description = "Calendar month, 1-12."),
        ("day" = u32, Path, description = "Day of month.")
    ),
    responses(
        (status = 200, description = "The day's totals (zeros when no activity)", body = DayProgressResponse),
        (status = 400, description = "Invalid date"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn day_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Path((user_id, year, month, day)): Path<(Uuid, i32, u32, u32)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let view = app_state
        .aggregator
        .day_progress(user_id, year, month, day)
        .await
        .map_err(|e| port_error_response("fetch day progress", e))?;

    Ok(Json(DayProgressResponse {
        date: view.date.format("%Y-%m-%d").to_string(),
        total_minutes: view.total_minutes,
        total_seconds: view.total_seconds,
        hours: view.hours,
        badge_level: view.badge_level,
    }))
}

/// The user's currently open session, if any, plus the server clock.
#[utoipa::path(
    get,
    path = "/study/active/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "The user to query.")
    ),
    responses(
        (status = 200, description = "The open session and server time", body = ActiveSessionResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn active_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let view = app_state
        .aggregator
        .active_session(user_id)
        .await
        .map_err(|e| port_error_response("fetch active session", e))?;

    let response = match view.session {
        Some(session) => ActiveSessionResponse {
            active: true,
            session_id: Some(session.id),
            start_time: Some(session.started_at),
            server_time: view.server_time,
        },
        None => ActiveSessionResponse {
            active: false,
            session_id: None,
            start_time: None,
            server_time: view.server_time,
        },
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn invalid_session_body_matches_the_wire_format() {
        let body = serde_json::to_value(InvalidSessionResponse {
            error: "Invalid session".to_string(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"error": "Invalid session"}));
    }

    #[test]
    fn inactive_response_omits_the_session_fields() {
        let body = serde_json::to_value(ActiveSessionResponse {
            active: false,
            session_id: None,
            start_time: None,
            server_time: Utc.with_ymd_and_hms(2025, 3, 10, 2, 5, 0).unwrap(),
        })
        .unwrap();
        assert_eq!(body["active"], serde_json::json!(false));
        assert!(body.get("session_id").is_none());
        assert!(body.get("start_time").is_none());
        assert!(body.get("server_time").is_some());
    }

    #[test]
    fn stop_response_carries_all_three_totals() {
        let body = serde_json::to_value(StopSessionResponse {
            total_seconds: 5400,
            total_minutes: 90,
            badge_level: 0,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"total_seconds": 5400, "total_minutes": 90, "badge_level": 0})
        );
    }
}
