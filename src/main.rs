//! RAX Browse Server - Entry Point
//!
//! Serves one directory read-only over HTTP: listing pages for directories,
//! ranged downloads for files.

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use rax_browse_server::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "rax-browse-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory to serve
    #[arg(short, long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to bind
    host: Option<String>,

    /// Port to bind
    port: Option<u16>,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(directory) = self.directory {
            config.directory = directory.to_string_lossy().into_owned();
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match ServerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);

    info!("Launching browse server...");

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Server stopped");
    ExitCode::SUCCESS
}
