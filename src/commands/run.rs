//! The `run` command: supervise one service and expose it over HTTP.

use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, ConfigLoader, ServiceSection, SupervisorConfig};
use crate::display;
use crate::reception::{ReceptionError, ReceptionServer};
use crate::service::{
    CommandError, LauncherError, Service, ServiceCommand, ServiceError, ServiceOptions,
    TokioLauncher,
};

/// Arguments of the run command, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    /// Command line of the service.
    pub command: String,
    /// Start the service immediately.
    pub auto_start: bool,
    /// Reception port override.
    pub port: Option<u16>,
    /// Reception host override.
    pub host: Option<String>,
    /// Working directory override.
    pub cwd: Option<PathBuf>,
    /// Explicit configuration file.
    pub config: Option<PathBuf>,
}

/// Error type for the run command.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Launcher(#[from] LauncherError),
    #[error(transparent)]
    Reception(#[from] ReceptionError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Load the configuration file and apply command-line overrides.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be read or parsed.
pub fn resolve_config(args: &RunArgs) -> Result<SupervisorConfig, ConfigError> {
    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path.clone()),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;

    config.auto_start |= args.auto_start;
    if let Some(port) = args.port {
        config.reception.port = port;
    }
    if let Some(host) = &args.host {
        config.reception.host.clone_from(host);
    }
    if let Some(cwd) = &args.cwd {
        config.service.cwd.clone_from(cwd);
    }

    Ok(config)
}

/// Build a service that reports its lifecycle on the console.
///
/// # Errors
///
/// Returns an error if the configured kill signal is unknown.
pub fn build_service(command: ServiceCommand, config: &ServiceSection) -> Result<Service, RunError> {
    let launcher = TokioLauncher::new()
        .with_kill_signal(&config.kill_signal)?
        .with_spawn_reporting(config.spawn_reporting);
    let program = command.program().to_string();

    let options = ServiceOptions::new(
        command,
        move |error| display::print_error(&display::spawn_error_message(&program, error)),
        |report| {
            for warning in display::close_warnings(report) {
                display::print_warning(&warning);
            }
        },
    )
    .on_stdout(display::forward_stdout)
    .on_stderr(display::forward_stderr)
    .launcher(launcher);

    Ok(Service::new(options))
}

/// Terminate the service if it is running, waiting at most `timeout`.
pub async fn stop_service(service: &Service, timeout: Duration) {
    if !service.is_running() {
        return;
    }

    match tokio::time::timeout(timeout, service.terminate()).await {
        Ok(Ok(report)) => tracing::debug!(%report, "Service stopped"),
        Ok(Err(ServiceError::NotRunning)) => {}
        Ok(Err(e)) => display::print_error(&format!("Failed to stop the service: {e}")),
        Err(_) => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "Service did not stop in time");
            display::print_warning("Service did not stop in time; it will be killed on exit.");
        }
    }
}

/// Run the supervisor until interrupted.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the reception cannot bind,
/// or the reception server fails.
pub async fn run(args: RunArgs) -> Result<(), RunError> {
    let config = resolve_config(&args)?;
    let command = ServiceCommand::parse(&args.command)?.working_dir(&config.service.cwd);
    let service = build_service(command.clone(), &config.service)?;

    let cancel = CancellationToken::new();
    let server = ReceptionServer::new(service.clone(), cancel.clone())
        .with_config(config.reception.clone());
    let address = server.address();

    display::print_options(
        &command.to_string(),
        &config.service.cwd.display().to_string(),
        &address,
        config.auto_start,
    );

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ReceptionError::BindError {
            address: address.clone(),
            source,
        })?;

    if config.auto_start {
        service.start().await?;
        if service.is_running() {
            display::print_started();
        }
    }

    let mut server_task = tokio::spawn(server.serve(listener));
    let stop_timeout = Duration::from_secs(config.service.stop_timeout_secs);

    tokio::select! {
        joined = &mut server_task => {
            stop_service(&service, stop_timeout).await;
            return flatten(joined);
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "Failed to listen for interrupt");
            }
        }
    }

    display::print_interrupted();
    stop_service(&service, stop_timeout).await;
    display::print_stopped();

    cancel.cancel();
    flatten(server_task.await)
}

fn flatten(
    joined: Result<Result<(), ReceptionError>, tokio::task::JoinError>,
) -> Result<(), RunError> {
    match joined {
        Ok(result) => Ok(result?),
        Err(e) => Err(ReceptionError::ServerError(e.to_string()).into()),
    }
}
