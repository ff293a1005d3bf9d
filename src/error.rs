//! Error types shared by the configuration layer and the capture server.
//!
//! The client side keeps its own [`ClientError`](crate::client::ClientError),
//! and message construction reports [`MessageError`](crate::message::MessageError).

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML for the expected shape.
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A required configuration field is missing.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A configuration value is invalid.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// A file referenced by the configuration does not exist.
    #[error("{what} not found at {path}: {source}")]
    FileNotFound {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A directory referenced by the configuration could not be created.
    #[error("creating {what} directory {path}: {source}")]
    CreateDir {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The TLS certificate or key could not be turned into a server config.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// The credentials file could not be loaded.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The global tracing subscriber could not be installed.
    #[error("initialising logging: {0}")]
    Logging(String),
}

/// Errors raised while loading a credentials file.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("opening auth file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid format at line {line}: {reason}")]
    InvalidLine { line: usize, reason: &'static str },
}

/// Errors that end a capture-server session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection error occurred.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// The client sent a line longer than the server accepts.
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    /// The TLS handshake after STARTTLS failed.
    #[error("TLS handshake failed: {0}")]
    Tls(String),

    /// The client stayed silent for longer than the configured timeout.
    #[error("session timed out after {0} seconds")]
    Timeout(u64),
}

impl SessionError {
    /// Returns `true` if the error is a client-side issue.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::LineTooLong(_) | Self::Timeout(_))
    }
}
