mod commands;
mod events;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use commands::Command;
use state::AppState;

const PRINTER_DRAIN: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(
    name = "tensorquick",
    version,
    about = "Deploy image models to the GPU cloud and generate images"
)]
struct Cli {
    /// Settings file (defaults to $TENSORQUICK_CONFIG_PATH or ~/.tensorquick.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print job events as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_tracing() {
    // Bridge `log` records from the library into tracing
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to install log bridge: {}", e);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false));

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    info!("Starting tensorquick v{}", env!("CARGO_PKG_VERSION"));

    let mut state = match AppState::load(cli.config) {
        Ok(state) => state,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let printer = events::start_event_printer(&state.job_broadcaster, cli.json);

    let result = commands::run(&mut state, cli.command).await;

    // Dropping every broadcaster closes the channel; the printer exits after
    // the buffered events
    drop(state);
    match tokio::time::timeout(PRINTER_DRAIN, printer).await {
        Ok(Ok(printed)) => debug!("Printed {} job events", printed),
        Ok(Err(e)) => warn!("Event printer failed: {}", e),
        Err(_) => warn!("Event printer did not finish within {:?}", PRINTER_DRAIN),
    }

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
