//! Exto Server — Application entry point.

use exto_server::{AppState, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(debug: bool) {
    let default = if debug { "exto=debug" } else { "exto=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let manager = exto_db::DbManager::connect(&config.db).await?;
    exto_db::run_migrations(manager.client()).await?;

    let state = AppState::build(&config, manager.client(), manager.query_timeout());
    info!(
        port = config.port,
        extraction = state.scanner.is_some(),
        upload_dir = %config.scan.upload_dir.display(),
        "Exto services ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    Ok(())
}

#[tokio::main]
async fn main() {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(config.debug);

    info!("Starting Exto server...");
    if let Err(e) = run(config).await {
        error!(error = %e, "Exto server failed");
        std::process::exit(1);
    }
    info!("Exto server stopped.");
}
