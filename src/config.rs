//! Configuration for the echo server, via command-line arguments.

use clap::Parser;

/// Command-line arguments for the echo server.
#[derive(Parser, Debug, Clone)]
#[command(name = "echoplex")]
#[command(version = "0.1.0")]
#[command(about = "An event-driven TCP echo server", long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// TCP port to listen on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Maximum number of concurrent connections
    #[arg(long, default_value_t = 1024)]
    pub max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn load() -> Self {
        Self::parse()
    }
}
