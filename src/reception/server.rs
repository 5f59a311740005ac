//! Reception HTTP server with axum router and graceful shutdown.

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    get_index, get_status, post_api_restart, post_api_start, post_api_stop, post_restart,
    post_start, post_stop, AppState,
};
use super::ReceptionError;
use crate::config::ReceptionSection;
use crate::service::Service;

/// HTTP server that lets remote callers control the service.
pub struct ReceptionServer {
    /// Server configuration.
    config: ReceptionSection,
    /// Application state shared across handlers.
    state: AppState,
    /// Triggers graceful shutdown.
    cancel: CancellationToken,
}

impl ReceptionServer {
    /// Create a new reception server with default configuration.
    #[must_use]
    pub fn new(service: Service, cancel: CancellationToken) -> Self {
        Self {
            config: ReceptionSection::default(),
            state: AppState::new(service),
            cancel,
        }
    }

    /// Set the server configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: ReceptionSection) -> Self {
        self.config = config;
        self
    }

    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Build the axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/", get(get_index))
            .route("/start", post(post_start))
            .route("/stop", post(post_stop))
            .route("/restart", post(post_restart))
            .route("/api/status", get(get_status))
            .route("/api/start", post(post_api_start))
            .route("/api/stop", post(post_api_stop))
            .route("/api/restart", post(post_api_restart))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Run the server, binding to the configured address.
    ///
    /// The server runs until the cancellation token is triggered, then shuts
    /// down gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or serve.
    pub async fn run(self) -> Result<(), ReceptionError> {
        let addr = self.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ReceptionError::BindError {
                address: addr.clone(),
                source,
            })?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ReceptionError> {
        let cancel = self.cancel.clone();
        let app = self.build_router();

        match listener.local_addr() {
            Ok(local) => tracing::info!(address = %local, "Reception listening"),
            Err(_) => tracing::info!(address = %self.address(), "Reception listening"),
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("Reception shutting down gracefully");
            })
            .await
            .map_err(|e| ReceptionError::ServerError(e.to_string()))
    }
}
