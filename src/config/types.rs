//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::service::{SpawnReporting, DEFAULT_KILL_SIGNAL};

/// Default port for the reception server.
pub const DEFAULT_PORT: u16 = 32366;

/// Default grace period for stopping the service on interrupt.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;

/// Settings for the supervised service process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Working directory of the service command.
    pub cwd: PathBuf,
    /// Signal sent when the service is asked to terminate.
    pub kill_signal: String,
    /// How long an interrupt waits for the service to close.
    pub stop_timeout_secs: u64,
    /// Whether the launcher reports spawn confirmation as its own event.
    pub spawn_reporting: SpawnReporting,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            kill_signal: DEFAULT_KILL_SIGNAL.to_string(),
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            spawn_reporting: SpawnReporting::Distinct,
        }
    }
}

/// Settings for the HTTP control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceptionSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Whether to enable permissive CORS.
    pub cors_permissive: bool,
}

impl Default for ReceptionSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            cors_permissive: false,
        }
    }
}

/// Configuration for the supervisor, as loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Start the service as soon as the supervisor runs.
    pub auto_start: bool,
    pub service: ServiceSection,
    pub reception: ReceptionSection,
}
