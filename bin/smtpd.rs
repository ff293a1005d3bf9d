#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;
use smtpd::{
    config::ServerConfig,
    internal, logging,
    server::{self, Server},
};
use tokio::sync::broadcast;

const DEFAULT_CONFIG: &str = "./smtpd.toml";

/// Local SMTP server that stores every message it receives
#[derive(Parser, Debug)]
#[command(name = "smtpd")]
#[command(version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Built-in defaults are used when
    /// the default file does not exist.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load(cli: &Cli) -> anyhow::Result<ServerConfig> {
    match &cli.config {
        Some(path) => Ok(ServerConfig::load(path)?),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG);
            if path.exists() {
                Ok(ServerConfig::load(path)?)
            } else {
                Ok(ServerConfig::default())
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load(&cli)?;
    config.log.validate()?;
    logging::init(&config.log)?;

    // Validates the rest of the configuration
    let server = Server::bind(&config).await?;
    let (sender, receiver) = broadcast::channel(16);

    let ret = tokio::select! {
        r = server.serve(sender.clone(), receiver) => r,
        r = server::shutdown(sender) => r,
    };

    internal!(level = INFO, "Shutting down...");

    ret
}
