pub mod engine;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod runner;
pub mod scheduler;
pub mod state;

use std::path::PathBuf;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use opsctl_core::config::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Runs
        .route("/api/run/{action}", post(routes::runs::run_action))
        .route("/api/runs", get(routes::runs::list_runs))
        .route("/api/runs/{id}", get(routes::runs::get_run))
        // Schedules
        .route(
            "/api/schedule/{action}",
            post(routes::schedules::schedule_action).delete(routes::schedules::unschedule_action),
        )
        .route("/api/schedules", get(routes::schedules::list_schedules))
        // Registry
        .route("/api/actions", get(routes::actions::list_actions))
        // Operational
        .route("/health", get(routes::health::health))
        .route("/metrics", get(routes::metrics::metrics))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            count_requests,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Count every request by method, matched route template, and status.
async fn count_requests(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().as_str().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let response = next.run(req).await;
    app.metrics
        .observe_http(&method, &path, response.status().as_u16());
    response
}

/// Start the opsctl HTTP server with its scheduler on a pre-bound listener.
///
/// Useful when `port = 0` and the OS picks a free port. Returns after
/// Ctrl-C, once in-flight requests have drained and every timer is stopped.
pub async fn serve_on(
    root: PathBuf,
    config: Config,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app_state = AppState::new(root, &config)?;

    if let Some(info) = app_state
        .scheduler
        .install_default(config.default_schedule.as_ref())?
    {
        tracing::info!(
            job_id = %info.job_id,
            interval_minutes = info.interval_minutes,
            "heartbeat installed"
        );
    }

    let scheduler = app_state.scheduler.clone();
    let app = build_router(app_state);

    tracing::info!("opsctl server listening on http://localhost:{actual_port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await?;

    scheduler.shutdown();
    Ok(())
}
