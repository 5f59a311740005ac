//! HTTP handlers for the reception.
//!
//! The HTML routes (`/`, `/start`, `/stop`, `/restart`) back a minimal
//! browser page; the `/api` routes answer with JSON.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;

use super::api::{CommandResponse, StatusResponse};
use crate::service::{Service, ServiceError};

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The supervised service.
    pub service: Service,
}

impl AppState {
    /// Create new app state for a service.
    #[must_use]
    pub fn new(service: Service) -> Self {
        Self { service }
    }
}

/// Terminate the service if it is running, then start it again.
///
/// # Errors
///
/// Returns the first error of the terminate or start step.
pub async fn restart_service(service: &Service) -> Result<(), ServiceError> {
    if service.is_running() {
        match service.terminate().await {
            // Closed on its own between the check and the request.
            Ok(_) | Err(ServiceError::NotRunning) => {}
            Err(e) => return Err(e),
        }
    }
    service.start().await
}

/// HTTP status for a failed service command.
fn error_status(error: &ServiceError) -> StatusCode {
    if error.is_misuse() {
        StatusCode::CONFLICT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn status_page(running: bool) -> String {
    if running {
        r#"<h1>Service is running</h1>
<form method="post" action="/stop">
    <button type="submit">Stop</button>
</form>
<form method="post" action="/restart">
    <button type="submit">Restart</button>
</form>
"#
        .to_string()
    } else {
        r#"<h1>Service is not running</h1>
<form method="post" action="/start">
    <button type="submit">Start</button>
</form>
"#
        .to_string()
    }
}

fn error_page(action: &str, error: &ServiceError) -> Response {
    let body = format!(
        "<h1>Failed to {action} the service</h1>\n<p>{error}</p>\n<a href=\"/\">Back</a>\n"
    );
    (error_status(error), Html(body)).into_response()
}

/// Redirect back to the status page, or render the error.
fn page_result(action: &str, result: Result<(), ServiceError>) -> Response {
    match result {
        Ok(()) => Redirect::to("/").into_response(),
        Err(e) => {
            tracing::warn!(action, error = %e, "Service command failed");
            error_page(action, &e)
        }
    }
}

/// GET / - Status page.
pub async fn get_index(State(state): State<AppState>) -> Html<String> {
    Html(status_page(state.service.is_running()))
}

/// POST /start - Start the service, then redirect to the status page.
pub async fn post_start(State(state): State<AppState>) -> Response {
    page_result("start", state.service.start().await)
}

/// POST /stop - Stop the service, then redirect to the status page.
pub async fn post_stop(State(state): State<AppState>) -> Response {
    page_result("stop", state.service.terminate().await.map(|_| ()))
}

/// POST /restart - Restart the service, then redirect to the status page.
pub async fn post_restart(State(state): State<AppState>) -> Response {
    page_result("restart", restart_service(&state.service).await)
}

/// Turn a command result into a JSON response.
fn command_result(
    success: &str,
    failure: &str,
    result: Result<(), ServiceError>,
) -> (StatusCode, Json<CommandResponse>) {
    match result {
        Ok(()) => (StatusCode::OK, Json(CommandResponse::success(success))),
        Err(e) => {
            tracing::warn!(error = %e, "{failure}");
            (
                error_status(&e),
                Json(CommandResponse::error(failure, e.to_string())),
            )
        }
    }
}

/// GET /api/status - Current service status.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::from_service(&state.service))
}

/// POST /api/start - Start the service.
pub async fn post_api_start(State(state): State<AppState>) -> (StatusCode, Json<CommandResponse>) {
    command_result(
        "Service started",
        "Failed to start service",
        state.service.start().await,
    )
}

/// POST /api/stop - Stop the service.
pub async fn post_api_stop(State(state): State<AppState>) -> (StatusCode, Json<CommandResponse>) {
    command_result(
        "Service stopped",
        "Failed to stop service",
        state.service.terminate().await.map(|_| ()),
    )
}

/// POST /api/restart - Restart the service.
pub async fn post_api_restart(
    State(state): State<AppState>,
) -> (StatusCode, Json<CommandResponse>) {
    command_result(
        "Service restarted",
        "Failed to restart service",
        restart_service(&state.service).await,
    )
}
