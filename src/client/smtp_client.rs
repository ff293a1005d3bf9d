//! SMTP client implementation with support for STARTTLS and AUTH.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{
        ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use super::{
    Capabilities, Credentials, Mechanism,
    error::{ClientError, Result},
    response::Response,
};
use crate::{config::ClientTimeouts, incoming, message::encoding::normalize_crlf, outgoing};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client connection that can be either plain TCP or TLS-wrapped.
enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade_to_tls(self, domain: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            ));
        };

        let mut root_store = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            root_store.add(cert).map_err(|e| {
                ClientError::TlsError(format!("Failed to add certificate: {e}"))
            })?;
        }
        // Some unreadable system certificates are not fatal
        if !certs.errors.is_empty() {
            tracing::warn!(?certs.errors, "Some certificates could not be loaded");
        }

        let mut config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if accept_invalid_certs {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerifier));
        }

        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| ClientError::TlsError(format!("Invalid domain: {e}")))?;

        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        Ok(Self::Tls(Box::new(tls_stream)))
    }
}

/// A certificate verifier that accepts all certificates (for testing only).
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

/// Run `fut`, turning an elapsed `limit` into [`ClientError::Timeout`].
async fn timed<T>(
    limit: Duration,
    step: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ClientError::Timeout(step))?
}

/// Normalise line endings, dot-stuff, and terminate the message with
/// `<CRLF>.<CRLF>` (RFC 5321 section 4.5.2).
pub fn prepare_data(data: &str) -> String {
    let normalized = normalize_crlf(data);
    let mut out = String::with_capacity(normalized.len() + 16);

    for line in normalized.split_inclusive("\r\n") {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }

    if !out.is_empty() && !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    out.push_str(".\r\n");

    out
}

/// An SMTP client for sending commands and receiving responses.
///
/// The typed methods check the reply class and turn anything unexpected into
/// [`ClientError::SmtpError`]; [`SmtpClient::command`] returns the raw reply.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_domain: String,
    accept_invalid_certs: bool,
    timeouts: ClientTimeouts,
    capabilities: Capabilities,
}

impl SmtpClient {
    /// Opens a TCP connection to `addr`. `server_domain` is the name the
    /// certificate is checked against after STARTTLS.
    pub async fn connect(
        addr: &str,
        server_domain: impl Into<String>,
        timeouts: ClientTimeouts,
    ) -> Result<Self> {
        let stream = timed(timeouts.connect(), "connection", async {
            Ok(TcpStream::connect(addr).await?)
        })
        .await?;

        Ok(Self {
            connection: Some(ClientConnection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            server_domain: server_domain.into(),
            accept_invalid_certs: false,
            timeouts,
            capabilities: Capabilities::default(),
        })
    }

    /// Sets whether to accept invalid TLS certificates.
    ///
    /// Default is `false`. Only meant for local servers with self-signed
    /// certificates.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Extensions from the most recent EHLO.
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(ClientConnection::Tls(_)))
    }

    /// Reads the initial server greeting, which must be a 220.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        let response = timed(self.timeouts.command(), "greeting", self.read_response()).await?;
        response.expect_code(220)
    }

    /// Sends a raw command and returns whatever the server answered.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.exchange(command, command).await
    }

    /// Like [`Self::command`], logging `shown` in place of the real line.
    async fn exchange(&mut self, command: &str, shown: &str) -> Result<Response> {
        let limit = self.timeouts.command();
        timed(limit, "command response", async {
            outgoing!(level = DEBUG, "{shown}");
            self.send_raw(format!("{command}\r\n").as_bytes()).await?;
            self.read_response().await
        })
        .await
    }

    /// Sends EHLO and records the advertised extensions. Falls back to HELO
    /// when the server rejects EHLO permanently.
    pub async fn ehlo(&mut self, domain: &str) -> Result<&Capabilities> {
        let response = self.command(&format!("EHLO {domain}")).await?;

        self.capabilities = if response.is_permanent_error() {
            self.helo(domain).await?;
            Capabilities::default()
        } else {
            Capabilities::from_ehlo(&response.expect_class(2)?)
        };

        Ok(&self.capabilities)
    }

    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}"))
            .await?
            .expect_class(2)
    }

    /// Sends STARTTLS and upgrades the connection. The caller must send EHLO
    /// again afterwards; capabilities are cleared.
    pub async fn starttls(&mut self) -> Result<Response> {
        if !self.capabilities.starttls {
            return Err(ClientError::TlsError(
                "Server does not support STARTTLS".to_string(),
            ));
        }

        let response = self.command("STARTTLS").await?.expect_code(220)?;

        // Anything buffered before the handshake came over plaintext
        self.buffer_pos = 0;
        self.capabilities = Capabilities::default();

        let connection = self.connection.take().ok_or(ClientError::ConnectionClosed)?;
        let upgraded = timed(
            self.timeouts.command(),
            "TLS handshake",
            connection.upgrade_to_tls(&self.server_domain, self.accept_invalid_certs),
        )
        .await?;
        self.connection = Some(upgraded);

        Ok(response)
    }

    /// Authenticates with AUTH PLAIN when offered, AUTH LOGIN otherwise.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<Response> {
        let mechanism = self.capabilities.preferred_auth().ok_or_else(|| {
            ClientError::Auth("SMTP AUTH extension not supported by server".to_string())
        })?;

        let response = match mechanism {
            Mechanism::Plain => {
                let token = credentials.plain_token();
                self.exchange(&format!("AUTH PLAIN {token}"), "AUTH PLAIN <redacted>")
                    .await?
            }
            Mechanism::Login => {
                self.command("AUTH LOGIN").await?.expect_code(334)?;
                self.exchange(&credentials.login_username(), "<username>")
                    .await?
                    .expect_code(334)?;
                self.exchange(&credentials.login_password(), "<password>")
                    .await?
            }
        };

        response.expect_code(235)
    }

    /// Sends MAIL FROM, declaring `size` when the server advertised SIZE.
    pub async fn mail_from(&mut self, from: &str, size: Option<usize>) -> Result<Response> {
        let cmd = match size {
            Some(size) if self.capabilities.size.is_some() => {
                format!("MAIL FROM:<{from}> SIZE={size}")
            }
            _ => format!("MAIL FROM:<{from}>"),
        };
        self.command(&cmd).await?.expect_class(2)
    }

    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>"))
            .await?
            .expect_class(2)
    }

    /// Sends DATA and expects the server to ask for the message (354).
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await?.expect_code(354)
    }

    /// Sends the message body, dot-stuffed and terminated, and returns the
    /// server's final reply.
    pub async fn send_data(&mut self, data: &str) -> Result<Response> {
        let payload = prepare_data(data);
        let limit = self.timeouts.data();

        let response = timed(limit, "message transfer", async {
            outgoing!(level = DEBUG, "<{} bytes of message data>", payload.len());
            self.send_raw(payload.as_bytes()).await?;
            self.read_response().await
        })
        .await?;

        response.expect_class(2)
    }

    pub async fn rset(&mut self) -> Result<Response> {
        self.command("RSET").await?.expect_class(2)
    }

    /// Sends QUIT and drops the connection, whatever the reply.
    pub async fn quit(&mut self) -> Result<Response> {
        let limit = self.timeouts.quit();
        let result = timed(limit, "QUIT", async {
            outgoing!(level = DEBUG, "QUIT");
            self.send_raw(b"QUIT\r\n").await?;
            self.read_response().await
        })
        .await;

        self.connection = None;
        result?.expect_class(2)
    }

    async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(data)
            .await
    }

    /// Reads a complete SMTP response from the server.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!(level = DEBUG, "{} {}", response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn prepare_data_stuffs_leading_dots() {
        assert_eq!(
            prepare_data("Subject: x\r\n\r\n.hidden\r\n..double\r\nend"),
            "Subject: x\r\n\r\n..hidden\r\n...double\r\nend\r\n.\r\n"
        );
    }

    #[test]
    fn prepare_data_normalises_line_endings() {
        assert_eq!(prepare_data("a\nb\n"), "a\r\nb\r\n.\r\n");
        assert_eq!(prepare_data(".\n"), "..\r\n.\r\n");
    }

    #[test]
    fn prepare_data_empty() {
        assert_eq!(prepare_data(""), ".\r\n");
    }
}
