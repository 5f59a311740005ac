//! Service supervisor state machine.
//!
//! A [`Service`] owns at most one process at a time. Its lifecycle is tracked
//! by two optional completion signals, one for the starting phase and one for
//! the terminating phase:
//!
//! | state       | starting | terminating |
//! |-------------|----------|-------------|
//! | idle        | absent   | absent      |
//! | starting    | pending  | absent      |
//! | started     | settled  | absent      |
//! | terminating | settled  | pending     |
//! | terminated  | settled  | settled     |
//!
//! Launcher notifications arrive on a channel and are applied by a single
//! transition function.

use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::{
    ExitReport, Launcher, OutputHandlers, ProcessControl, ProcessEvent, ServiceCommand,
    ServiceError, ServiceState, SpawnError, SpawnReporting, TokioLauncher,
};
use crate::signal::CompletionSignal;

/// Callback receiving launch and runtime errors of the process.
pub type ErrorCallback = Arc<dyn Fn(&SpawnError) + Send + Sync>;

/// Callback receiving the exit status once the process has closed.
pub type CloseCallback = Arc<dyn Fn(&ExitReport) + Send + Sync>;

/// Construction options for a [`Service`].
pub struct ServiceOptions {
    command: ServiceCommand,
    output: OutputHandlers,
    on_error: ErrorCallback,
    on_close: CloseCallback,
    launcher: Arc<dyn Launcher>,
}

impl ServiceOptions {
    /// Create options with the mandatory error and close callbacks.
    pub fn new<E, C>(command: ServiceCommand, on_error: E, on_close: C) -> Self
    where
        E: Fn(&SpawnError) + Send + Sync + 'static,
        C: Fn(&ExitReport) + Send + Sync + 'static,
    {
        Self {
            command,
            output: OutputHandlers::default(),
            on_error: Arc::new(on_error),
            on_close: Arc::new(on_close),
            launcher: Arc::new(TokioLauncher::new()),
        }
    }

    /// Receive raw standard output chunks.
    #[must_use]
    pub fn on_stdout(mut self, callback: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        self.output.stdout = Some(Arc::new(callback));
        self
    }

    /// Receive raw standard error chunks.
    #[must_use]
    pub fn on_stderr(mut self, callback: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        self.output.stderr = Some(Arc::new(callback));
        self
    }

    /// Replace the default `tokio::process` launcher.
    #[must_use]
    pub fn launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Arc::new(launcher);
        self
    }
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("command", &self.command)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// Phase signals and process handle of a service.
///
/// `process` is `None` exactly when both signals are `None`.
#[derive(Default)]
struct Phases {
    starting: Option<CompletionSignal<(), ExitReport>>,
    terminating: Option<CompletionSignal<ExitReport, Infallible>>,
    process: Option<Box<dyn ProcessControl>>,
}

impl Phases {
    fn state(&self) -> ServiceState {
        ServiceState::from_phases(
            self.starting.as_ref().map(CompletionSignal::is_settled),
            self.terminating.as_ref().map(CompletionSignal::is_settled),
        )
    }
}

struct Inner {
    command: ServiceCommand,
    output: OutputHandlers,
    on_error: ErrorCallback,
    on_close: CloseCallback,
    launcher: Arc<dyn Launcher>,
    spawn_reporting: SpawnReporting,
    phases: Mutex<Phases>,
}

/// A long-running command that can be started and terminated at will.
///
/// Cloning yields another handle onto the same service.
#[derive(Clone)]
pub struct Service {
    inner: Arc<Inner>,
}

impl Service {
    /// Create an idle service.
    #[must_use]
    pub fn new(options: ServiceOptions) -> Self {
        let spawn_reporting = options.launcher.spawn_reporting();
        tracing::debug!(
            command = %options.command,
            ?spawn_reporting,
            "Service created"
        );

        Self {
            inner: Arc::new(Inner {
                command: options.command,
                output: options.output,
                on_error: options.on_error,
                on_close: options.on_close,
                launcher: options.launcher,
                spawn_reporting,
                phases: Mutex::new(Phases::default()),
            }),
        }
    }

    /// The command this service runs.
    #[must_use]
    pub fn command(&self) -> &ServiceCommand {
        &self.inner.command
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        self.inner.phases().state()
    }

    /// Whether the service is anywhere between `start` and close.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Process ID of the running process, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.inner
            .phases()
            .process
            .as_ref()
            .and_then(|process| process.id())
    }

    /// Launch the process and wait until the launch attempt has settled.
    ///
    /// A process that fails to spawn still completes the start: the failure
    /// goes to the error callback, followed by the close callback.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::AlreadyRunning` if the service is not idle.
    pub async fn start(&self) -> Result<(), ServiceError> {
        let starting = Arc::clone(&self.inner).begin_start()?;
        starting.settled().await;
        Ok(())
    }

    /// Request termination and wait until the process has closed.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` when idle, `AlreadyTerminating` when a termination
    /// is in progress, and `KillFailure` when the OS rejects the kill request.
    pub async fn terminate(&self) -> Result<ExitReport, ServiceError> {
        let terminating = self.inner.begin_terminate()?;
        match terminating.wait().await {
            Ok(report) => Ok(report),
            Err(never) => match never {},
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("command", &self.inner.command)
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    fn phases(&self) -> MutexGuard<'_, Phases> {
        self.phases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_start(self: Arc<Self>) -> Result<CompletionSignal<(), ExitReport>, ServiceError> {
        let mut phases = self.phases();

        if phases.starting.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }
        if phases.process.is_some() || phases.terminating.is_some() {
            tracing::error!(state = %phases.state(), "Process handle present while idle");
            return Err(ServiceError::UnexpectedState(
                "process handle present while idle",
            ));
        }

        let starting = CompletionSignal::new();
        // The channel exists before the launch, so no notification is lost.
        let (tx, rx) = mpsc::unbounded_channel();
        let process = self.launcher.launch(&self.command, self.output.clone(), tx);

        phases.starting = Some(starting.clone());
        phases.process = Some(process);

        if self.spawn_reporting == SpawnReporting::Implicit {
            starting.resolve(());
        }
        tracing::debug!(state = %phases.state(), "Service start requested");
        drop(phases);

        tokio::spawn(dispatch(self, rx));
        Ok(starting)
    }

    fn begin_terminate(&self) -> Result<CompletionSignal<ExitReport, Infallible>, ServiceError> {
        let mut phases = self.phases();

        if phases.starting.is_none() {
            return Err(ServiceError::NotRunning);
        }
        if phases.terminating.is_some() {
            return Err(ServiceError::AlreadyTerminating);
        }
        let state = phases.state();
        let Some(process) = phases.process.as_mut() else {
            tracing::error!(%state, "Process handle missing while running");
            return Err(ServiceError::UnexpectedState(
                "process handle missing while running",
            ));
        };

        if !process.killed() {
            if let Err(e) = process.kill() {
                tracing::warn!(pid = ?process.id(), error = %e, "Kill request rejected");
                return Err(ServiceError::KillFailure(e));
            }
        }

        let terminating = CompletionSignal::new();
        phases.terminating = Some(terminating.clone());
        tracing::debug!(state = %phases.state(), "Service termination requested");
        Ok(terminating)
    }

    /// Apply one launcher notification.
    fn handle_event(&self, event: ProcessEvent) {
        match event {
            ProcessEvent::Spawned => {
                let starting = self.phases().starting.clone();
                match starting {
                    Some(starting) => {
                        starting.resolve(());
                        tracing::info!(command = %self.command, "Service started");
                    }
                    None => tracing::warn!("Spawn notification without a start in progress"),
                }
            }
            ProcessEvent::SpawnFailed(err) => {
                tracing::warn!(
                    command = %self.command,
                    code = %err.code(),
                    error = %err,
                    "Service process error"
                );
                (self.on_error)(&err);
            }
            ProcessEvent::Closed(report) => {
                let Phases {
                    starting,
                    terminating,
                    ..
                } = std::mem::take(&mut *self.phases());
                tracing::info!(command = %self.command, %report, "Service closed");

                let waiters = CloseWaiters {
                    starting,
                    terminating,
                    report: report.clone(),
                };
                (self.on_close)(&report);
                drop(waiters);
            }
        }
    }
}

/// Waiters released once the close callback has returned or unwound.
struct CloseWaiters {
    starting: Option<CompletionSignal<(), ExitReport>>,
    terminating: Option<CompletionSignal<ExitReport, Infallible>>,
    report: ExitReport,
}

impl Drop for CloseWaiters {
    fn drop(&mut self) {
        if let Some(terminating) = self.terminating.take() {
            terminating.resolve(self.report.clone());
        }
        // A launch that never spawned ends here.
        if let Some(starting) = self.starting.take() {
            starting.reject(std::mem::take(&mut self.report));
        }
    }
}

/// Feed launcher notifications into the transition function until close.
async fn dispatch(inner: Arc<Inner>, mut events: UnboundedReceiver<ProcessEvent>) {
    while let Some(event) = events.recv().await {
        let closed = matches!(event, ProcessEvent::Closed(_));
        inner.handle_event(event);
        if closed {
            return;
        }
    }
    tracing::error!(
        command = %inner.command,
        "Process events ended without a close notification"
    );
}
