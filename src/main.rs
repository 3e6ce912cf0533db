//! # Chat & Call Server
//!
//! Entry point: tracing, configuration, then the HTTP/WebSocket server with
//! its background sweeps.

use anyhow::Result;
use tracing::info;

use chat_call_server::config::Settings;
use chat_call_server::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    chat_call_server::telemetry::init_tracing();

    info!("Starting Chat & Call Server...");

    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
