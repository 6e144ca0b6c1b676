use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use relay_server::auth::middleware::OriginPolicy;
use relay_server::config::{generate_config_template, Cli, Config};
use relay_server::{routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Handle --generate-config: print template and exit
    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load(&cli)?;

    // Initialize tracing/logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Relay server v{} starting", env!("CARGO_PKG_VERSION"));

    let origins = OriginPolicy::new(config.allowed_origins.iter().cloned());
    tracing::info!(allowed_origins = ?origins.origins(), "Cross-origin policy loaded");

    let app_state = state::AppState::new(origins);
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
