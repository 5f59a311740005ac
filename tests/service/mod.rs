//! Service module tests.

#[cfg(unix)]
mod supervisor_test;

/// Verify all public service types are exported from the library.
#[test]
fn test_all_service_types_exported() {
    use service_supervisor::service::{
        CommandError, ExitReport, LauncherError, ProcessEvent, Service, ServiceCommand,
        ServiceError, ServiceOptions, ServiceState, SpawnError, SpawnReporting, TokioLauncher,
        DEFAULT_KILL_SIGNAL,
    };

    let command = ServiceCommand::new("true");
    let service = Service::new(ServiceOptions::new(command, |_| {}, |_| {}));
    assert_eq!(service.state(), ServiceState::Idle);
    assert!(!service.is_running());

    let _ = TokioLauncher::new().with_spawn_reporting(SpawnReporting::Implicit);
    let _: fn() -> ServiceError = || ServiceError::NotRunning;
    let _: fn() -> CommandError = || CommandError::Empty;
    let _: fn() -> LauncherError = || LauncherError::UnknownSignal(String::new());
    let _ = ProcessEvent::SpawnFailed(SpawnError::NotFound);
    let _ = ExitReport::default();
    assert_eq!(DEFAULT_KILL_SIGNAL, "SIGTERM");
}
