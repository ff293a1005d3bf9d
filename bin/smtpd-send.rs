//! Send one of the two stock test messages to an SMTP server.
//!
//! ```text
//! smtpd-send plain
//! smtpd-send attachment --file report.pdf
//! smtpd-send --host mail.example.com --port 587 --starttls \
//!     --username alice --password secret plain
//! ```

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use smtpd::{
    client::Credentials,
    config::{LogConfig, MessageKind, SendConfig},
    logging,
    transport::Mailer,
};

/// Send a test email over SMTP
#[derive(Parser, Debug)]
#[command(name = "smtpd-send")]
#[command(version, long_about = None)]
struct Cli {
    /// TOML file with sender settings; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SMTP server host
    #[arg(long)]
    host: Option<String>,

    /// SMTP server port
    #[arg(long)]
    port: Option<u16>,

    /// Sender address
    #[arg(long)]
    from: Option<String>,

    /// Recipient address(es), comma separated
    #[arg(long)]
    to: Option<String>,

    /// Username for SMTP AUTH
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Password for SMTP AUTH
    #[arg(long, requires = "username")]
    password: Option<String>,

    /// Upgrade the connection with STARTTLS before authenticating
    #[arg(long)]
    starttls: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Log SMTP traffic at this level (debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a plain text message
    Plain,
    /// Send a message with a file attached
    Attachment {
        /// File to attach
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(SendConfig, MessageKind)> {
        let mut config = match &self.config {
            Some(path) => SendConfig::load(path)?,
            None => SendConfig::default(),
        };

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(from) = self.from {
            config.message.from = from;
        }
        if let Some(to) = self.to {
            config.message.to = to;
        }
        if let (Some(username), Some(password)) = (self.username, self.password) {
            config.auth = Some(Credentials::new(username, password));
        }
        config.server.starttls |= self.starttls;
        config.server.accept_invalid_certs |= self.insecure;

        let kind = match self.command {
            Commands::Plain => MessageKind::Plain,
            Commands::Attachment { file } => {
                if let Some(file) = file {
                    config.attachment.path = file;
                }
                MessageKind::Attachment
            }
        };

        Ok((config, kind))
    }
}

async fn run(config: &SendConfig, kind: MessageKind) -> bool {
    let message = match config.message(kind).await {
        Ok(message) => message,
        Err(err) => {
            println!("Error: {err}");
            return false;
        }
    };

    let outcome = Mailer::new(config.connection_params()).send(&message).await;
    println!("{}", outcome.summary());
    outcome.is_success()
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let mut cli = Cli::parse();

    let log = LogConfig {
        level: cli.log_level.take().unwrap_or_else(|| "error".to_string()),
        ..LogConfig::default()
    };
    log.validate()?;
    logging::init(&log)?;

    let (config, kind) = cli.into_config()?;

    Ok(if run(&config, kind).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
