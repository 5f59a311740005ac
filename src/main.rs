//! Service Supervisor - run one service command and control it over HTTP.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use service_supervisor::commands::run::{run, RunArgs};

#[derive(Parser)]
#[command(
    name = "service-supervisor",
    about = "Run a service command and start, stop or restart it over HTTP",
    version
)]
struct Cli {
    /// Command line of the service to run.
    command: String,

    /// Start the service immediately.
    #[arg(short = 'a', long)]
    auto_start: bool,

    /// Port for the HTTP reception.
    #[arg(short, long)]
    port: Option<u16>,

    /// Host address for the HTTP reception.
    #[arg(long)]
    host: Option<String>,

    /// Working directory of the service command.
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Path to a configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let args = RunArgs {
        command: cli.command,
        auto_start: cli.auto_start,
        port: cli.port,
        host: cli.host,
        cwd: cli.cwd,
        config: cli.config,
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Supervisor failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
