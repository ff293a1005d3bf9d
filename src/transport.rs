//! Send one message over a freshly opened connection.
//!
//! [`Mailer::send`] runs connect, STARTTLS, login, MAIL, RCPT, DATA as one
//! fallible unit. Whatever happens, QUIT is attempted afterwards if a
//! connection was ever opened, and a failing QUIT never changes the outcome.

use std::fmt::{self, Display, Formatter};

use crate::{
    client::{ClientError, Credentials, SmtpClient},
    config::ClientTimeouts,
    internal,
    message::Message,
};

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    pub starttls: bool,
    pub accept_invalid_certs: bool,
    /// Name sent with EHLO/HELO.
    pub helo_name: String,
    pub timeouts: ClientTimeouts,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
            starttls: false,
            accept_invalid_certs: false,
            helo_name: "localhost".to_string(),
            timeouts: ClientTimeouts::default(),
        }
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// What happened to the connection after the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStatus {
    /// No connection was ever opened, so there was nothing to close.
    NotConnected,
    /// QUIT was sent and acknowledged.
    Closed,
    /// QUIT was attempted and failed; the connection was dropped anyway.
    Failed,
}

/// The server's acceptance of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub code: u16,
    /// Text of the final reply to DATA.
    pub message: String,
    pub recipients: Vec<String>,
}

/// Result of a send together with what the close step did.
#[derive(Debug)]
pub struct Outcome {
    pub result: Result<Receipt, ClientError>,
    pub close: CloseStatus,
}

impl Outcome {
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The single line reported to the user.
    pub fn summary(&self) -> String {
        match &self.result {
            Ok(_) => "Email sent successfully!".to_string(),
            Err(err) => format!("Error: {err}"),
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

pub struct Mailer {
    params: ConnectionParams,
}

impl Mailer {
    pub const fn new(params: ConnectionParams) -> Self {
        Self { params }
    }

    pub const fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Send `message` once. Never panics and never skips the close step.
    pub async fn send(&self, message: &Message) -> Outcome {
        let mut slot = None;
        let result = self.transact(&mut slot, message).await;

        if let Err(err) = &result {
            internal!(level = WARN, "Sending to {} failed: {err}", self.params.address());
        }

        let close = match slot {
            None => CloseStatus::NotConnected,
            Some(mut client) => match client.quit().await {
                Ok(_) => CloseStatus::Closed,
                Err(err) => {
                    tracing::debug!(address = %self.params.address(), "Ignoring QUIT failure: {err}");
                    CloseStatus::Failed
                }
            },
        };

        Outcome { result, close }
    }

    /// Everything up to and including the reply to the message data. The
    /// client is parked in `slot` as soon as the connection exists so the
    /// caller can close it on every path.
    async fn transact(
        &self,
        slot: &mut Option<SmtpClient>,
        message: &Message,
    ) -> Result<Receipt, ClientError> {
        let params = &self.params;
        let envelope = message.envelope()?;
        let data = message.to_wire();

        if params.accept_invalid_certs {
            tracing::warn!(
                address = %params.address(),
                "TLS certificate validation is disabled for this connection"
            );
        }

        internal!(level = DEBUG, "Connecting to {}", params.address());
        let client = slot.insert(
            SmtpClient::connect(&params.address(), params.host.clone(), params.timeouts.clone())
                .await?
                .accept_invalid_certs(params.accept_invalid_certs),
        );

        client.read_greeting().await?;
        client.ehlo(&params.helo_name).await?;

        if params.starttls {
            client.starttls().await?;
            client.ehlo(&params.helo_name).await?;
        }

        if let Some(credentials) = &params.credentials {
            client.login(credentials).await?;
        }

        client.mail_from(&envelope.sender, Some(data.len())).await?;
        for recipient in &envelope.recipients {
            client.rcpt_to(recipient).await?;
        }

        client.data().await?;
        let response = client.send_data(&data).await?;

        internal!(level = INFO, "Message accepted: {}", response.message());

        Ok(Receipt {
            code: response.code,
            message: response.message(),
            recipients: envelope.recipients,
        })
    }
}
