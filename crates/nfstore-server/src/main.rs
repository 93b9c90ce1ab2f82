use clap::Parser;
use nfstore_server::{Behaviour, Orchestrator};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "nfstore-server",
    about = "Orchestrator stub for the OSM package onboarding API"
)]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "NFSTORE_STUB_PORT", default_value_t = 8448)]
    port: u16,

    /// Directory to store onboarded packages in.
    #[arg(long, env = "NFSTORE_STUB_DATA", default_value = "./nfstore-stub-data")]
    data_dir: PathBuf,

    /// Id returned for every accepted package instead of the descriptor id.
    #[arg(long, env = "NFSTORE_STUB_ASSIGNED_ID")]
    assigned_id: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = fs::create_dir_all(&cli.data_dir) {
        error!("failed to create data directory {}: {e}", cli.data_dir.display());
        return ExitCode::FAILURE;
    }

    let behaviour = Behaviour {
        assigned_id: cli.assigned_id,
        ..Behaviour::default()
    };

    let addr = format!("0.0.0.0:{}", cli.port);
    info!("starting orchestrator stub on {addr}");
    info!("data directory: {}", cli.data_dir.display());

    let orchestrator = Arc::new(Orchestrator::with_behaviour(cli.data_dir, behaviour));
    match nfstore_server::run_server(&orchestrator, &addr) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}
