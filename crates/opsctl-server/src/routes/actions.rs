use axum::extract::State;
use axum::Json;
use opsctl_core::registry::ActionDefinition;

use crate::state::AppState;

/// GET /api/actions: the registry, in configuration order.
pub async fn list_actions(State(app): State<AppState>) -> Json<Vec<ActionDefinition>> {
    Json(app.engine.registry().list().to_vec())
}
