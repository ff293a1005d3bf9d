//! The local capture server: accepts mail over SMTP and writes every
//! message to the storage directory.

mod auth;
mod command;
mod connection;
mod mail;
mod session;
mod status;

use std::{net::SocketAddr, sync::Arc};

use futures_util::future::join_all;
use tokio::{net::TcpListener, sync::broadcast};

pub use self::{
    auth::Authenticator,
    command::{Command, HeloVariant},
    connection::TlsInfo,
    mail::{METADATA_HEADER, Mail, generate_id},
    session::{Session, SessionConfig},
    status::Status,
};
use crate::{config::ServerConfig, error::ConfigError, internal};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Signal {
    Shutdown,
    Finalised,
}

impl SessionConfig {
    /// Resolve everything a session needs from a validated configuration:
    /// the user list and the TLS acceptor.
    ///
    /// # Errors
    ///
    /// Fails if the auth file cannot be read or parsed, or the TLS key pair
    /// cannot be loaded.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let authenticator = match &config.smtp.auth_file {
            Some(path) => {
                let authenticator = Authenticator::load(path)?;
                internal!(
                    level = INFO,
                    "Loaded {} user(s) from {}",
                    authenticator.len(),
                    path.display()
                );
                authenticator
            }
            None => Authenticator::empty(),
        };

        Ok(Self {
            hostname: config.smtp.hostname.clone(),
            instance_name: config.server.instance_name.clone(),
            max_size: config.smtp.max_size,
            max_recipients: config.smtp.max_recipients,
            allow_anonymous: config.smtp.allow_anonymous,
            allow_insecure_auth: config.smtp.allow_insecure_auth,
            storage: config.storage.path.clone(),
            timeouts: config.timeouts.clone(),
            authenticator,
            tls: connection::acceptor(&config.tls)?,
        })
    }
}

pub struct Server {
    listener: TcpListener,
    config: Arc<SessionConfig>,
}

impl Server {
    /// Validate `config`, prepare the storage directory, and bind the
    /// listening socket.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or if the address cannot be bound.
    pub async fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let session_config = SessionConfig::from_config(config)?;
        let listener = TcpListener::bind(config.socket_addr().await?).await?;

        internal!(
            level = INFO,
            "Listening on {} (tls: {}, anonymous: {}, storage: {})",
            listener.local_addr()?,
            session_config.tls.is_some(),
            session_config.allow_anonymous,
            session_config.storage.display()
        );

        Ok(Self {
            listener,
            config: Arc::new(session_config),
        })
    }

    /// The bound address. Useful when the configured port is 0.
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until a [`Signal::Shutdown`] arrives, then wait
    /// for in-flight sessions and answer with [`Signal::Finalised`].
    ///
    /// # Errors
    ///
    /// Fails only if the shutdown channel cannot be answered.
    pub async fn serve(
        self,
        sender: broadcast::Sender<Signal>,
        mut receiver: broadcast::Receiver<Signal>,
    ) -> anyhow::Result<()> {
        let mut sessions = Vec::default();

        loop {
            tokio::select! {
                sig = receiver.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed)) {
                        internal!(
                            level = INFO,
                            "Received Shutdown signal, finishing {} session(s) ...",
                            sessions.len()
                        );
                        join_all(sessions).await;
                        // Nobody listening is fine
                        let _ = sender.send(Signal::Finalised);
                        break;
                    }
                }

                connection = self.listener.accept() => {
                    let (stream, peer) = match connection {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            internal!(level = WARN, "Failed to accept connection: {err}");
                            continue;
                        }
                    };

                    sessions.retain(|handle: &tokio::task::JoinHandle<()>| !handle.is_finished());

                    let session = Session::create(Arc::clone(&self.config), stream, peer);
                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = session.run().await {
                            if err.is_client_error() {
                                internal!(level = DEBUG, "Session with {peer} ended: {err}");
                            } else {
                                internal!(level = ERROR, "Session with {peer} failed: {err}");
                            }
                        }
                    }));
                }
            }
        }

        Ok(())
    }
}

/// Wait for CTRL+C or SIGTERM, ask the server to stop, then wait until it has
/// finished. A second CTRL+C stops waiting.
///
/// # Errors
///
/// Fails if the signal handlers cannot be installed.
pub async fn shutdown(sender: broadcast::Sender<Signal>) -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    let mut receiver = sender.subscribe();
    sender.send(Signal::Shutdown)?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(Signal::Finalised) | Err(broadcast::error::RecvError::Closed) => break,
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}
