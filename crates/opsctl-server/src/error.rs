use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use opsctl_core::error::OpsError;

/// Carries an explicit 400 through the `anyhow::Error` chain.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Error type for every handler. Renders as `{"error": "..."}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<BadRequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        match self.0.downcast_ref::<OpsError>() {
            Some(
                OpsError::UnknownAction(_)
                | OpsError::RunNotFound(_)
                | OpsError::NoActiveSchedule(_),
            ) => StatusCode::NOT_FOUND,
            Some(
                OpsError::InvalidActionId(_)
                | OpsError::InvalidInterval(_)
                | OpsError::NoValidHosts
                | OpsError::NotInitialized,
            ) => StatusCode::BAD_REQUEST,
            Some(OpsError::DuplicateAction(_)) => StatusCode::CONFLICT,
            Some(OpsError::Io(_) | OpsError::Yaml(_) | OpsError::Json(_)) | None => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
