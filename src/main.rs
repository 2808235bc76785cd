//! Entry point for the caching forward proxy.
//!
//! Usage: `caching-proxy <port> [--config <file>]`
//!
//! The port always comes from the command line; everything else has
//! defaults and can be overridden through an optional TOML config file.
//! SIGINT triggers a graceful shutdown: the listener closes, in-flight
//! requests finish, tunnels observe the flag and exit.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use caching_proxy::config::loader::load_config;
use caching_proxy::config::validation::validate_config;
use caching_proxy::lifecycle::signals;
use caching_proxy::net::Listener;
use caching_proxy::{observability, ProxyConfig, ProxyServer, Shutdown};

#[derive(Parser)]
#[command(name = "caching-proxy")]
#[command(about = "Caching HTTP/1.1 forward proxy", long_about = None)]
struct Cli {
    /// Port to listen on for client connections
    port: u16,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    observability::logging::init();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    config.listener.port = cli.port;

    if let Err(errors) = validate_config(&config) {
        for error in errors {
            eprintln!("{error}");
        }
        std::process::exit(1);
    }

    tracing::info!(
        port = config.listener.port,
        cache_entries = config.cache.max_entries,
        log_path = %config.log.path.display(),
        "caching-proxy starting"
    );

    let listener = Listener::bind(&config.listener)?;

    let shutdown = Arc::new(Shutdown::new());
    tokio::spawn(signals::shutdown_on_ctrl_c(Arc::clone(&shutdown)));

    let server = ProxyServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
