use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use opsctl_core::run::RunRecord;
use serde::Deserialize;

use crate::engine::RunOptions;
use crate::error::AppError;
use crate::state::AppState;

/// Optional body of `POST /api/run/{action}`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunBody {
    #[serde(default)]
    pub hosts: Option<Vec<String>>,
}

fn parse_body(body: &Bytes) -> Result<RunBody, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RunBody::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("invalid request body: {e}")))
}

/// POST /api/run/{action}: execute an action now and wait for it to finish.
///
/// A failed run is still a 200: the failure is in the returned record.
/// The run is spawned off the request, so a client that disconnects early
/// does not cancel it and the record still lands in the ledger.
pub async fn run_action(
    State(app): State<AppState>,
    Path(action): Path<String>,
    body: Bytes,
) -> Result<Json<RunRecord>, AppError> {
    let body = parse_body(&body)?;
    let opts = RunOptions {
        scheduled: false,
        hosts: body.hosts,
    };
    let engine = app.engine.clone();
    let handle = tokio::spawn(async move { engine.execute_with(&action, opts).await });
    let record = handle.await??;
    Ok(Json(record))
}

/// GET /api/runs: most recent first.
pub async fn list_runs(State(app): State<AppState>) -> Json<Vec<RunRecord>> {
    Json(app.engine.ledger().list())
}

/// GET /api/runs/{id}
pub async fn get_run(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunRecord>, AppError> {
    Ok(Json(app.engine.ledger().get(&id)?))
}
