//! Service command errors.

/// Error type for service `start`/`terminate` operations.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// `start` was called while the service was not idle.
    #[error("Service already running")]
    AlreadyRunning,
    /// `terminate` was called while the service was idle.
    #[error("Service not running")]
    NotRunning,
    /// `terminate` was called while a termination was in progress.
    #[error("Service already shutting down")]
    AlreadyTerminating,
    /// The OS refused the kill request.
    #[error("Failed to kill the service: {0}")]
    KillFailure(#[source] std::io::Error),
    /// An internal invariant was violated.
    #[error("Unexpected service state: {0}")]
    UnexpectedState(&'static str),
}

impl ServiceError {
    /// Whether the error comes from calling an operation in the wrong state.
    ///
    /// Such errors leave the service untouched and can be retried once the
    /// state allows it.
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning | Self::NotRunning | Self::AlreadyTerminating
        )
    }
}
