//! echoplex server binary.
//!
//! Clients send newline-delimited text; each line comes back with an
//! `[ECHO] ` prefix. A case-insensitive `quit` or `q` closes the session.

use echoplex::config::Config;
use echoplex::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        max_connections = config.max_connections,
        "Starting echoplex server"
    );

    let mut server = Server::new(&config)?;
    server.run()?;

    Ok(())
}
