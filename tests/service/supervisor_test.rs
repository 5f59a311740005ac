//! End-to-end tests of the service supervisor against real processes.

use std::pin::pin;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures_util::poll;
use service_supervisor::service::{
    ExitReport, Service, ServiceCommand, ServiceError, ServiceOptions, ServiceState,
    SpawnReporting, TokioLauncher,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Everything a service reported through its callbacks.
#[derive(Default)]
struct Recorded {
    stdout: Mutex<Vec<Vec<u8>>>,
    stderr: Mutex<Vec<Vec<u8>>>,
    log: Mutex<Vec<String>>,
}

struct Harness {
    service: Service,
    recorded: Arc<Recorded>,
    /// Receives `(report, is_running observed inside the close callback)`.
    closed: mpsc::UnboundedReceiver<(ExitReport, bool)>,
}

impl Harness {
    fn new(command: ServiceCommand) -> Self {
        Self::with_launcher(command, TokioLauncher::new())
    }

    fn with_launcher(command: ServiceCommand, launcher: TokioLauncher) -> Self {
        let recorded = Arc::new(Recorded::default());
        let cell: Arc<OnceLock<Service>> = Arc::new(OnceLock::new());
        let (tx, closed) = mpsc::unbounded_channel();

        let options = ServiceOptions::new(
            command,
            {
                let recorded = Arc::clone(&recorded);
                move |error: &service_supervisor::service::SpawnError| {
                    recorded
                        .log
                        .lock()
                        .unwrap()
                        .push(format!("error:{}", error.code()));
                }
            },
            {
                let recorded = Arc::clone(&recorded);
                let cell = Arc::clone(&cell);
                move |report: &ExitReport| {
                    recorded.log.lock().unwrap().push("close".to_string());
                    let running = cell.get().is_some_and(Service::is_running);
                    let _ = tx.send((report.clone(), running));
                }
            },
        )
        .on_stdout({
            let recorded = Arc::clone(&recorded);
            move |chunk: &[u8]| recorded.stdout.lock().unwrap().push(chunk.to_vec())
        })
        .on_stderr({
            let recorded = Arc::clone(&recorded);
            move |chunk: &[u8]| recorded.stderr.lock().unwrap().push(chunk.to_vec())
        })
        .launcher(launcher);

        let service = Service::new(options);
        let _ = cell.set(service.clone());

        Self {
            service,
            recorded,
            closed,
        }
    }

    async fn next_close(&mut self) -> (ExitReport, bool) {
        timeout(WAIT, self.closed.recv())
            .await
            .expect("close callback not invoked in time")
            .expect("close channel dropped")
    }
}

fn sleeper() -> ServiceCommand {
    ServiceCommand::new("sleep").arg("30")
}

#[tokio::test]
async fn process_exiting_on_its_own_reports_output_and_close() {
    let mut harness = Harness::new(ServiceCommand::new("sh").args(["-c", "printf '1 2 3\\n'"]));

    harness.service.start().await.unwrap();
    let (report, running_in_callback) = harness.next_close().await;

    assert_eq!(
        report,
        ExitReport {
            code: Some(0),
            signal: None,
        }
    );
    assert!(!running_in_callback);
    assert!(!harness.service.is_running());
    assert_eq!(*harness.recorded.stdout.lock().unwrap(), vec![b"1 2 3\n".to_vec()]);
    assert!(harness.recorded.stderr.lock().unwrap().is_empty());
    assert_eq!(*harness.recorded.log.lock().unwrap(), ["close"]);
}

#[tokio::test]
async fn terminate_kills_long_running_process() {
    let mut harness = Harness::new(sleeper());

    harness.service.start().await.unwrap();
    assert_eq!(harness.service.state(), ServiceState::Started);
    assert!(harness.service.pid().is_some());

    let report = timeout(WAIT, harness.service.terminate())
        .await
        .expect("terminate timed out")
        .unwrap();

    assert_eq!(report.code, None);
    assert_eq!(report.signal.as_deref(), Some("SIGTERM"));
    assert!(!harness.service.is_running());
    assert!(harness.service.pid().is_none());

    // The close callback already ran when terminate returned.
    let (closed, running_in_callback) = harness.closed.try_recv().unwrap();
    assert_eq!(closed, report);
    assert!(!running_in_callback);
}

#[tokio::test]
async fn missing_program_reports_error_then_close() {
    let mut harness = Harness::new(ServiceCommand::new("/nonexistent/service-supervisor-test"));

    harness.service.start().await.unwrap();
    let (report, _) = harness.next_close().await;

    assert_eq!(report, ExitReport::default());
    assert!(!harness.service.is_running());
    assert_eq!(
        *harness.recorded.log.lock().unwrap(),
        ["error:ENOENT", "close"]
    );
}

#[tokio::test]
async fn start_while_running_fails_and_keeps_state() {
    let harness = Harness::new(sleeper());
    harness.service.start().await.unwrap();
    let pid = harness.service.pid();

    let err = harness.service.start().await.unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyRunning));
    assert_eq!(harness.service.state(), ServiceState::Started);
    assert_eq!(harness.service.pid(), pid);

    harness.service.terminate().await.unwrap();
}

#[tokio::test]
async fn start_while_starting_fails() {
    let harness = Harness::new(sleeper());

    let mut first = pin!(harness.service.start());
    assert!(poll!(&mut first).is_pending());
    assert_eq!(harness.service.state(), ServiceState::Starting);

    let err = harness.service.start().await.unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyRunning));

    first.await.unwrap();
    harness.service.terminate().await.unwrap();
}

#[tokio::test]
async fn terminate_while_idle_fails() {
    let harness = Harness::new(sleeper());

    let err = harness.service.terminate().await.unwrap_err();
    assert!(matches!(err, ServiceError::NotRunning));
    assert_eq!(harness.service.state(), ServiceState::Idle);
}

#[tokio::test]
async fn concurrent_terminate_fails() {
    let harness = Harness::new(sleeper());
    harness.service.start().await.unwrap();

    let mut first = pin!(harness.service.terminate());
    assert!(poll!(&mut first).is_pending());
    assert_eq!(harness.service.state(), ServiceState::Terminating);
    assert!(harness.service.is_running());

    let err = harness.service.terminate().await.unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyTerminating));

    let report = first.await.unwrap();
    assert_eq!(report.signal.as_deref(), Some("SIGTERM"));
    assert_eq!(harness.service.state(), ServiceState::Idle);
}

#[tokio::test]
async fn start_while_terminating_fails_and_keeps_state() {
    let harness = Harness::new(sleeper());
    harness.service.start().await.unwrap();

    let mut terminate = pin!(harness.service.terminate());
    assert!(poll!(&mut terminate).is_pending());

    let err = harness.service.start().await.unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyRunning));
    assert_eq!(harness.service.state(), ServiceState::Terminating);

    terminate.await.unwrap();
    assert_eq!(harness.service.state(), ServiceState::Idle);
}

#[tokio::test]
async fn kill_is_refused_once_the_process_has_exited() {
    // The background sleep keeps stdout open after the shell exits.
    let mut harness = Harness::new(ServiceCommand::new("sh").args(["-c", "sleep 2 & exit 0"]));
    harness.service.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(harness.service.is_running());

    let err = harness.service.terminate().await.unwrap_err();
    assert!(matches!(err, ServiceError::KillFailure(_)));
    assert_eq!(harness.service.state(), ServiceState::Started);

    let (report, _) = harness.next_close().await;
    assert_eq!(report.code, Some(0));
    assert!(!harness.service.is_running());
}

#[tokio::test]
async fn service_can_start_again_after_close() {
    let mut harness = Harness::new(sleeper());

    harness.service.start().await.unwrap();
    let first_pid = harness.service.pid();
    harness.service.terminate().await.unwrap();
    harness.next_close().await;

    harness.service.start().await.unwrap();
    assert!(harness.service.is_running());
    assert_ne!(harness.service.pid(), first_pid);
    harness.service.terminate().await.unwrap();
}

#[tokio::test]
async fn stderr_and_exit_code_are_reported() {
    let mut harness = Harness::new(ServiceCommand::new("sh").args(["-c", "printf oops >&2; exit 3"]));

    harness.service.start().await.unwrap();
    let (report, _) = harness.next_close().await;

    assert_eq!(report.code, Some(3));
    assert_eq!(harness.recorded.stderr.lock().unwrap().concat(), b"oops");
    assert!(harness.recorded.stdout.lock().unwrap().is_empty());
}

#[tokio::test]
async fn custom_kill_signal_is_used() {
    let launcher = TokioLauncher::new().with_kill_signal("SIGINT").unwrap();
    let harness = Harness::with_launcher(sleeper(), launcher);

    harness.service.start().await.unwrap();
    let report = harness.service.terminate().await.unwrap();
    assert_eq!(report.signal.as_deref(), Some("SIGINT"));
}

#[tokio::test]
async fn implicit_spawn_reporting_starts_immediately() {
    let launcher = TokioLauncher::new().with_spawn_reporting(SpawnReporting::Implicit);
    let harness = Harness::with_launcher(sleeper(), launcher);

    let mut start = pin!(harness.service.start());
    assert!(poll!(&mut start).is_ready());
    assert_eq!(harness.service.state(), ServiceState::Started);

    harness.service.terminate().await.unwrap();
}

#[tokio::test]
async fn working_dir_is_applied() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let temp_path = temp_dir.path().canonicalize().unwrap();
    let mut harness = Harness::new(ServiceCommand::new("pwd").working_dir(&temp_path));

    harness.service.start().await.unwrap();
    harness.next_close().await;

    let output = harness.recorded.stdout.lock().unwrap().concat();
    let output = String::from_utf8(output).unwrap();
    assert_eq!(output.trim(), temp_path.to_str().unwrap());
}
