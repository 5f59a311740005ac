//! Derived lifecycle state of a service.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a service, derived from its phase signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// No process; `start` is allowed.
    #[default]
    Idle,
    /// Launch requested, spawn not yet confirmed.
    Starting,
    /// Process confirmed launched.
    Started,
    /// Kill requested, close not yet observed.
    Terminating,
    /// Close observed; resets to `Idle` right away.
    Terminated,
}

impl ServiceState {
    /// Derive the state from the starting and terminating phases.
    ///
    /// Each argument is `None` when the phase is absent, otherwise whether the
    /// phase has settled.
    #[must_use]
    pub fn from_phases(starting: Option<bool>, terminating: Option<bool>) -> Self {
        match (starting, terminating) {
            (None, _) => Self::Idle,
            (Some(false), _) => Self::Starting,
            (Some(true), None) => Self::Started,
            (Some(true), Some(false)) => Self::Terminating,
            (Some(true), Some(true)) => Self::Terminated,
        }
    }

    /// Every state except `Idle` counts as running.
    #[must_use]
    pub fn is_running(self) -> bool {
        self != Self::Idle
    }

    /// Lowercase name, as used in logs and the HTTP API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
