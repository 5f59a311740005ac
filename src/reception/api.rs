//! API response types for the reception HTTP endpoints.

use serde::{Deserialize, Serialize};

use crate::service::{Service, ServiceState};

/// Response for GET /api/status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Whether the service is running.
    pub running: bool,
    /// Current lifecycle state.
    pub state: ServiceState,
    /// Process ID, while a process exists.
    pub pid: Option<u32>,
}

impl StatusResponse {
    /// Snapshot the status of a service.
    #[must_use]
    pub fn from_service(service: &Service) -> Self {
        let state = service.state();
        Self {
            running: state.is_running(),
            state,
            pid: service.pid(),
        }
    }
}

/// Response for command endpoints (POST /api/start, /api/stop, /api/restart).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Whether the command was successful.
    pub success: bool,
    /// Message describing the result.
    pub message: String,
    /// Optional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    /// Create a success response.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
        }
    }

    /// Create an error response.
    #[must_use]
    pub fn error(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.into()),
        }
    }
}
