use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::scheduler::ScheduleInfo;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScheduleParams {
    pub minutes: Option<u64>,
}

/// POST /api/schedule/{action}?minutes=N: create or replace the schedule.
pub async fn schedule_action(
    State(app): State<AppState>,
    Path(action): Path<String>,
    Query(params): Query<ScheduleParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    // Unknown action wins over a bad interval.
    app.engine.registry().resolve(&action)?;
    let minutes = params
        .minutes
        .ok_or_else(|| AppError::bad_request("query parameter 'minutes' is required"))?;
    let info = app.scheduler.schedule(&action, minutes)?;
    Ok(Json(serde_json::json!({
        "status": "scheduled",
        "job_id": info.job_id,
        "interval_minutes": info.interval_minutes,
        "next_run_time": info.next_run_time,
    })))
}

/// DELETE /api/schedule/{action}
pub async fn unschedule_action(
    State(app): State<AppState>,
    Path(action): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let job_id = app.scheduler.unschedule(&action)?;
    Ok(Json(serde_json::json!({
        "status": "removed",
        "job_id": job_id,
    })))
}

/// GET /api/schedules
pub async fn list_schedules(State(app): State<AppState>) -> Json<Vec<ScheduleInfo>> {
    Json(app.scheduler.list())
}
