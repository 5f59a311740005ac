//! Service process launching and control.
//!
//! The supervisor never talks to the OS directly. It asks a [`Launcher`] to
//! start the process and receives [`ProcessEvent`]s back on a channel, while
//! the returned [`ProcessControl`] handle is used to request termination.

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
#[cfg(unix)]
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ServiceCommand;

/// Size of the buffer used when forwarding child output.
const OUTPUT_CHUNK_SIZE: usize = 8192;

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The program was not found.
    #[error("Program not found")]
    NotFound,
    /// Permission denied when spawning.
    #[error("Permission denied")]
    PermissionDenied,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    #[must_use]
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }

    /// Short errno-style code, `ENOENT` when the program does not exist.
    ///
    /// Errors without an OS error number fall back to the I/O error kind.
    #[must_use]
    pub fn code(&self) -> Cow<'static, str> {
        match self {
            Self::NotFound => Cow::Borrowed("ENOENT"),
            Self::PermissionDenied => Cow::Borrowed("EACCES"),
            Self::Io(err) => match err.raw_os_error() {
                #[cfg(unix)]
                Some(raw) => Cow::Owned(format!("{:?}", nix::errno::Errno::from_raw(raw))),
                _ => Cow::Owned(format!("{:?}", err.kind())),
            },
        }
    }

    /// Whether the program could not be found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// How a process ended.
///
/// Both fields are `None` when the process never ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitReport {
    /// Exit code, if the process exited on its own.
    pub code: Option<i32>,
    /// Name of the terminating signal, such as `SIGTERM`.
    pub signal: Option<String>,
}

impl ExitReport {
    /// Whether the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitReport {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal().map(signal_name)
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("no exit status"),
        }
    }
}

#[cfg(unix)]
fn signal_name(raw: i32) -> String {
    nix::sys::signal::Signal::try_from(raw)
        .map_or_else(|_| format!("SIG{raw}"), |signal| signal.as_str().to_string())
}

/// Notification from a launched process.
#[derive(Debug)]
pub enum ProcessEvent {
    /// The OS confirmed the process was created.
    Spawned,
    /// The process could not be created or the launcher hit an error.
    SpawnFailed(SpawnError),
    /// The process is gone and its output streams are closed.
    ///
    /// Always the last event of a launch, including failed ones.
    Closed(ExitReport),
}

/// Sender half used by launchers to report [`ProcessEvent`]s.
pub type EventSender = mpsc::UnboundedSender<ProcessEvent>;

/// Callback receiving raw output chunks.
pub type OutputCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Output callbacks for the standard streams of a process.
#[derive(Clone, Default)]
pub struct OutputHandlers {
    /// Receives standard output chunks.
    pub stdout: Option<OutputCallback>,
    /// Receives standard error chunks.
    pub stderr: Option<OutputCallback>,
}

impl fmt::Debug for OutputHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputHandlers")
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Whether a launcher reports [`ProcessEvent::Spawned`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnReporting {
    /// A distinct `Spawned` event follows a successful launch.
    #[default]
    Distinct,
    /// No `Spawned` event is sent; the launch call itself counts as started.
    Implicit,
}

/// Control handle for a launched process.
pub trait ProcessControl: Send {
    /// OS process ID, if the process is running.
    fn id(&self) -> Option<u32>;

    /// Whether a kill request has already been delivered.
    fn killed(&self) -> bool;

    /// Ask the process to terminate.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses the request.
    fn kill(&mut self) -> io::Result<()>;
}

/// Starts processes on behalf of the supervisor.
pub trait Launcher: Send + Sync {
    /// Whether this launcher sends `Spawned` events.
    fn spawn_reporting(&self) -> SpawnReporting {
        SpawnReporting::Distinct
    }

    /// Launch `command`, forwarding output to `output` and lifecycle
    /// notifications to `events`.
    ///
    /// Must not fail: launch errors are reported as `SpawnFailed` followed
    /// by `Closed`.
    fn launch(
        &self,
        command: &ServiceCommand,
        output: OutputHandlers,
        events: EventSender,
    ) -> Box<dyn ProcessControl>;
}

/// Error type for launcher configuration.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LauncherError {
    /// The kill signal name is not a known signal.
    #[error("Unknown signal: {0}")]
    UnknownSignal(String),
}

/// Default signal sent by a kill request.
pub const DEFAULT_KILL_SIGNAL: &str = "SIGTERM";

/// Launcher backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct TokioLauncher {
    spawn_reporting: SpawnReporting,
    #[cfg(unix)]
    kill_signal: nix::sys::signal::Signal,
}

impl Default for TokioLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioLauncher {
    /// Create a launcher that terminates processes with `SIGTERM`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spawn_reporting: SpawnReporting::Distinct,
            #[cfg(unix)]
            kill_signal: nix::sys::signal::Signal::SIGTERM,
        }
    }

    /// Use a different signal for kill requests.
    ///
    /// Ignored on platforms without signals, where kill requests always
    /// force the process to stop.
    ///
    /// # Errors
    ///
    /// Returns `LauncherError::UnknownSignal` if `name` is not a signal name.
    pub fn with_kill_signal(mut self, name: &str) -> Result<Self, LauncherError> {
        #[cfg(unix)]
        {
            use std::str::FromStr;

            self.kill_signal = nix::sys::signal::Signal::from_str(name)
                .map_err(|_| LauncherError::UnknownSignal(name.to_string()))?;
        }
        #[cfg(not(unix))]
        {
            tracing::debug!(signal = %name, "Kill signal ignored on this platform");
        }
        Ok(self)
    }

    /// Set whether `Spawned` events are sent.
    #[must_use]
    pub fn with_spawn_reporting(mut self, reporting: SpawnReporting) -> Self {
        self.spawn_reporting = reporting;
        self
    }
}

impl Launcher for TokioLauncher {
    fn spawn_reporting(&self) -> SpawnReporting {
        self.spawn_reporting
    }

    fn launch(
        &self,
        command: &ServiceCommand,
        output: OutputHandlers,
        events: EventSender,
    ) -> Box<dyn ProcessControl> {
        let mut cmd = Command::new(command.program());
        cmd.args(command.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = command.get_working_dir() {
            cmd.current_dir(dir);
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let err = SpawnError::from_io(err);
                tracing::debug!(%command, error = %err, "Failed to spawn service process");
                let _ = events.send(ProcessEvent::SpawnFailed(err));
                let _ = events.send(ProcessEvent::Closed(ExitReport::default()));
                return Box::new(Unspawned);
            }
        };

        let pid = child.id();
        tracing::info!(%command, pid = ?pid, "Service process spawned");

        if self.spawn_reporting == SpawnReporting::Distinct {
            let _ = events.send(ProcessEvent::Spawned);
        }

        #[cfg(unix)]
        {
            let exited = Arc::new(AtomicBool::new(false));
            tokio::spawn(watch_child(child, output, events, Arc::clone(&exited)));
            Box::new(ChildControl {
                pid,
                killed: false,
                exited,
                signal: self.kill_signal,
            })
        }

        #[cfg(not(unix))]
        {
            let (kill_tx, kill_rx) = tokio::sync::oneshot::channel();
            tokio::spawn(watch_child(child, output, events, kill_rx));
            Box::new(ChildControl {
                pid,
                kill_tx: Some(kill_tx),
            })
        }
    }
}

/// Handle for a launch whose spawn failed.
struct Unspawned;

impl ProcessControl for Unspawned {
    fn id(&self) -> Option<u32> {
        None
    }

    fn killed(&self) -> bool {
        false
    }

    fn kill(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Handle for a running child process.
///
/// `exited` is set once the child has been reaped. Its pid may be reused
/// from then on, so no signal is sent to it.
#[cfg(unix)]
struct ChildControl {
    pid: Option<u32>,
    killed: bool,
    exited: Arc<AtomicBool>,
    signal: nix::sys::signal::Signal,
}

#[cfg(unix)]
fn already_exited() -> io::Error {
    io::Error::other("process already exited")
}

#[cfg(unix)]
impl ProcessControl for ChildControl {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn killed(&self) -> bool {
        self.killed
    }

    fn kill(&mut self) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return Ok(());
        };
        if self.exited.load(Ordering::Acquire) {
            tracing::debug!(pid, "Kill request for a process that already exited");
            return Err(already_exited());
        }
        let raw = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

        match kill(Pid::from_raw(raw), self.signal) {
            Ok(()) => {
                tracing::debug!(pid, signal = %self.signal, "Kill request delivered");
                self.killed = true;
                Ok(())
            }
            // Reaped between the flag check and the signal.
            Err(Errno::ESRCH) => Err(already_exited()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }
}

/// Handle for a running child process.
#[cfg(not(unix))]
struct ChildControl {
    pid: Option<u32>,
    kill_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

#[cfg(not(unix))]
impl ProcessControl for ChildControl {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn killed(&self) -> bool {
        self.kill_tx.is_none()
    }

    fn kill(&mut self) -> io::Result<()> {
        if let Some(tx) = self.kill_tx.take() {
            // A closed receiver means the child already exited.
            let _ = tx.send(());
        }
        Ok(())
    }
}

/// Forward output, wait for exit, then report `Closed` once both streams end.
#[cfg(unix)]
async fn watch_child(
    mut child: Child,
    output: OutputHandlers,
    events: EventSender,
    exited: Arc<AtomicBool>,
) {
    let pumps = spawn_pumps(&mut child, output);
    let status = child.wait().await;
    // Output may stay open after this, held by processes the child left behind.
    exited.store(true, Ordering::Release);
    finish(status, pumps, &events).await;
}

#[cfg(not(unix))]
async fn watch_child(
    mut child: Child,
    output: OutputHandlers,
    events: EventSender,
    mut kill_rx: tokio::sync::oneshot::Receiver<()>,
) {
    let pumps = spawn_pumps(&mut child, output);
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "Failed to kill service process");
            }
            child.wait().await
        }
    };
    finish(status, pumps, &events).await;
}

fn spawn_pumps(child: &mut Child, output: OutputHandlers) -> [Option<JoinHandle<()>>; 2] {
    [
        child
            .stdout
            .take()
            .map(|stream| tokio::spawn(pump(stream, output.stdout))),
        child
            .stderr
            .take()
            .map(|stream| tokio::spawn(pump(stream, output.stderr))),
    ]
}

async fn finish(
    status: io::Result<ExitStatus>,
    pumps: [Option<JoinHandle<()>>; 2],
    events: &EventSender,
) {
    for pump in pumps.into_iter().flatten() {
        if let Err(e) = pump.await {
            tracing::warn!(error = %e, "Output forwarding task failed");
        }
    }

    let report = match status {
        Ok(status) => ExitReport::from(status),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to wait for service process");
            ExitReport::default()
        }
    };
    tracing::debug!(%report, "Service process closed");
    let _ = events.send(ProcessEvent::Closed(report));
}

/// Copy a stream to `callback` chunk by chunk until EOF.
///
/// The stream is drained even without a callback so the child never blocks
/// on a full pipe.
async fn pump<R>(mut stream: R, callback: Option<OutputCallback>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; OUTPUT_CHUNK_SIZE];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Some(callback) = &callback {
                    callback(&buf[..n]);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Output stream read failed");
                break;
            }
        }
    }
}
