use std::{fmt::Display, fs::File, io::BufReader, path::Path, sync::Arc};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig, ServerConnection,
        pki_types::{CertificateDer, PrivateKeyDer},
    },
    server::TlsStream,
};

use crate::{
    config::TlsConfig,
    error::{ConfigError, SessionError},
};

const READ_CHUNK: usize = 4096;

/// Negotiated TLS parameters, recorded in the `Received` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsInfo {
    pub version: String,
    pub cipher: String,
}

impl TlsInfo {
    fn of(conn: &ServerConnection) -> Self {
        Self {
            version: conn
                .protocol_version()
                .and_then(|v| v.as_str())
                .map(|v| v.replace("v1_", "1_"))
                .unwrap_or_default(),
            cipher: conn
                .negotiated_cipher_suite()
                .and_then(|s| s.suite().as_str())
                .map(str::to_string)
                .unwrap_or_default(),
        }
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::FileNotFound {
        what: "TLS certificate",
        path: path.to_path_buf(),
        source,
    })?;

    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ConfigError::Tls(format!("reading {}: {err}", path.display())))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::FileNotFound {
        what: "TLS key",
        path: path.to_path_buf(),
        source,
    })?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|err| ConfigError::Tls(format!("reading {}: {err}", path.display())))?
        .ok_or_else(|| ConfigError::Tls(format!("no private key in {}", path.display())))
}

/// Build the STARTTLS acceptor once at startup. `None` when TLS is disabled.
pub fn acceptor(config: &TlsConfig) -> Result<Option<TlsAcceptor>, ConfigError> {
    if !config.enabled {
        return Ok(None);
    }

    let cert = config
        .cert_file
        .as_deref()
        .ok_or(ConfigError::MissingField("tls cert_file"))?;
    let key = config
        .key_file
        .as_deref()
        .ok_or(ConfigError::MissingField("tls key_file"))?;

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(load_certs(cert)?, load_key(key)?)
        .map_err(|err| ConfigError::Tls(err.to_string()))?;

    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}

enum Stream<S> {
    Plain(S),
    Tls(Box<TlsStream<S>>),
    /// Left behind by a failed handshake.
    Closed,
}

/// A client connection with a line-oriented read buffer.
pub struct Connection<S: AsyncRead + AsyncWrite + Unpin + Send> {
    stream: Stream<S>,
    buffer: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Connection<S> {
    pub fn plain(stream: S) -> Self {
        Self {
            stream: Stream::Plain(stream),
            buffer: Vec::with_capacity(READ_CHUNK),
        }
    }

    pub const fn is_tls(&self) -> bool {
        matches!(self.stream, Stream::Tls(_))
    }

    /// Write one reply line, terminated with CRLF.
    pub async fn send<R: Display + Send + Sync>(&mut self, response: &R) -> std::io::Result<()> {
        let line = format!("{response}\r\n");
        match &mut self.stream {
            Stream::Plain(stream) => {
                stream.write_all(line.as_bytes()).await?;
                stream.flush().await
            }
            Stream::Tls(stream) => {
                stream.write_all(line.as_bytes()).await?;
                stream.flush().await
            }
            Stream::Closed => Err(std::io::ErrorKind::NotConnected.into()),
        }
    }

    async fn fill(&mut self) -> std::io::Result<usize> {
        let mut chunk = [0; READ_CHUNK];
        let n = match &mut self.stream {
            Stream::Plain(stream) => stream.read(&mut chunk).await?,
            Stream::Tls(stream) => stream.read(&mut chunk).await?,
            Stream::Closed => 0,
        };
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Read the next line including its terminator. Returns `None` once the
    /// peer has closed the connection.
    pub async fn read_line(&mut self, max: usize) -> Result<Option<Vec<u8>>, SessionError> {
        loop {
            if let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
                return Ok(Some(self.buffer.drain(..=end).collect()));
            }

            if self.buffer.len() > max {
                return Err(SessionError::LineTooLong(max));
            }

            if self.fill().await? == 0 {
                return Ok(None);
            }
        }
    }

    /// Perform the server side of the TLS handshake. Anything the client
    /// pipelined before the handshake is discarded. A failed handshake
    /// leaves the connection closed.
    pub async fn upgrade(&mut self, acceptor: &TlsAcceptor) -> Result<TlsInfo, SessionError> {
        let stream = match std::mem::replace(&mut self.stream, Stream::Closed) {
            Stream::Plain(stream) => stream,
            other => {
                self.stream = other;
                return Err(SessionError::Tls("connection is not plain text".to_string()));
            }
        };
        self.buffer.clear();

        let stream = acceptor
            .accept(stream)
            .await
            .map_err(|err| SessionError::Tls(err.to_string()))?;
        let info = TlsInfo::of(stream.get_ref().1);
        self.stream = Stream::Tls(Box::new(stream));

        Ok(info)
    }
}
