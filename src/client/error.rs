use std::io;

use thiserror::Error;

use crate::message::MessageError;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Connect, read or write failed, including a refused connection.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The server sent something that is not an SMTP reply.
    #[error("Malformed server reply: {0}")]
    ParseError(String),

    /// A reply outside the class the current step requires.
    #[error("SMTP error: {code} - {message}")]
    SmtpError { code: u16, message: String },

    #[error("TLS error: {0}")]
    TlsError(String),

    /// Credentials were configured but could not be used.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The server closed the socket before replying.
    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Server reply is not valid UTF-8: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// The message could not be turned into an envelope.
    #[error(transparent)]
    Message(#[from] MessageError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
