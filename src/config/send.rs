use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ClientTimeouts, load_toml};
use crate::{
    client::Credentials,
    error::ConfigError,
    message::{Message, MessageBuilder, MessageError},
    transport::ConnectionParams,
};

pub const DEFAULT_FROM: &str = "your_email@example.com";
pub const DEFAULT_TO: &str = "recipient_email@example.com";
pub const DEFAULT_PLAIN_SUBJECT: &str = "Test Email";
pub const DEFAULT_PLAIN_BODY: &str = "This is a test email.";
pub const DEFAULT_ATTACHMENT_SUBJECT: &str = "Test Email with Attachment";
pub const DEFAULT_ATTACHMENT_BODY: &str = "This is a test email sent with an attachment.";
pub const DEFAULT_ATTACHMENT_PATH: &str = "./Cargo.toml";
pub const DEFAULT_ATTACHMENT_FILENAME: &str = "attachment.pdf";
/// Declared verbatim; the attachment's real content is never inspected.
pub const DEFAULT_ATTACHMENT_CONTENT_TYPE: &str = "application/pdf";

/// Which of the two test messages to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Plain,
    Attachment,
}

impl MessageKind {
    const fn default_subject(self) -> &'static str {
        match self {
            Self::Plain => DEFAULT_PLAIN_SUBJECT,
            Self::Attachment => DEFAULT_ATTACHMENT_SUBJECT,
        }
    }

    const fn default_body(self) -> &'static str {
        match self {
            Self::Plain => DEFAULT_PLAIN_BODY,
            Self::Attachment => DEFAULT_ATTACHMENT_BODY,
        }
    }
}

/// Settings of `smtpd-send`, optionally loaded from a TOML file and then
/// overridden by command line flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendConfig {
    #[serde(default)]
    pub server: SendServerConfig,
    /// Log in with these credentials after the greeting (and STARTTLS).
    #[serde(default)]
    pub auth: Option<Credentials>,
    #[serde(default)]
    pub timeouts: ClientTimeouts,
    #[serde(default)]
    pub message: MessageConfig,
    #[serde(default)]
    pub attachment: AttachmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendServerConfig {
    #[serde(default = "defaults::host")]
    pub host: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
    /// Name sent with EHLO/HELO.
    #[serde(default = "defaults::helo_name")]
    pub helo_name: String,
    #[serde(default)]
    pub starttls: bool,
    /// Skip certificate verification after STARTTLS. Local testing only.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for SendServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            helo_name: defaults::helo_name(),
            starttls: false,
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    #[serde(default = "defaults::from")]
    pub from: String,
    #[serde(default = "defaults::to")]
    pub to: String,
    /// Falls back to the subject of the chosen message kind.
    #[serde(default)]
    pub subject: Option<String>,
    /// Falls back to the body of the chosen message kind.
    #[serde(default)]
    pub body: Option<String>,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            from: defaults::from(),
            to: defaults::to(),
            subject: None,
            body: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    #[serde(default = "defaults::attachment_path")]
    pub path: PathBuf,
    #[serde(default = "defaults::attachment_filename")]
    pub filename: String,
    #[serde(default = "defaults::attachment_content_type")]
    pub content_type: String,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            path: defaults::attachment_path(),
            filename: defaults::attachment_filename(),
            content_type: defaults::attachment_content_type(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn host() -> String {
        "127.0.0.1".to_string()
    }
    pub const fn port() -> u16 {
        2525
    }
    pub fn helo_name() -> String {
        "localhost".to_string()
    }
    pub fn from() -> String {
        super::DEFAULT_FROM.to_string()
    }
    pub fn to() -> String {
        super::DEFAULT_TO.to_string()
    }
    pub fn attachment_path() -> PathBuf {
        PathBuf::from(super::DEFAULT_ATTACHMENT_PATH)
    }
    pub fn attachment_filename() -> String {
        super::DEFAULT_ATTACHMENT_FILENAME.to_string()
    }
    pub fn attachment_content_type() -> String {
        super::DEFAULT_ATTACHMENT_CONTENT_TYPE.to_string()
    }
}

impl SendConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_toml(path.as_ref())
    }

    /// Build the message of the given kind from the configured headers,
    /// reading the attachment from disk when one is needed.
    pub async fn message(&self, kind: MessageKind) -> Result<Message, MessageError> {
        let builder = MessageBuilder::new()
            .from(&self.message.from)
            .to(&self.message.to)
            .subject(
                self.message
                    .subject
                    .as_deref()
                    .unwrap_or_else(|| kind.default_subject()),
            )
            .body(
                self.message
                    .body
                    .as_deref()
                    .unwrap_or_else(|| kind.default_body()),
            );

        let builder = match kind {
            MessageKind::Plain => builder,
            MessageKind::Attachment => {
                builder
                    .attach_file(
                        &self.attachment.path,
                        &self.attachment.filename,
                        &self.attachment.content_type,
                    )
                    .await?
            }
        };

        builder.build()
    }

    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.server.host.clone(),
            port: self.server.port,
            credentials: self.auth.clone(),
            starttls: self.server.starttls,
            accept_invalid_certs: self.server.accept_invalid_certs,
            helo_name: self.server.helo_name.clone(),
            timeouts: self.timeouts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_stock_scripts() {
        let config = SendConfig::default();
        let params = config.connection_params();

        assert_eq!(params.host, "127.0.0.1");
        assert_eq!(params.port, 2525);
        assert!(params.credentials.is_none());
        assert!(!params.starttls);
        assert_eq!(config.message.from, "your_email@example.com");
        assert_eq!(config.message.to, "recipient_email@example.com");
        assert_eq!(config.attachment.filename, "attachment.pdf");
        assert_eq!(config.attachment.content_type, "application/pdf");
    }

    #[test]
    fn parses_partial_file() {
        let config: SendConfig = toml::from_str(
            r#"
            [server]
            port = 2626
            starttls = true

            [auth]
            username = "alice"
            password = "secret"

            [message]
            subject = "Hello"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 2626);
        assert!(config.server.starttls);
        assert_eq!(config.auth.as_ref().map(|a| a.username.as_str()), Some("alice"));
        assert_eq!(config.message.subject.as_deref(), Some("Hello"));
        assert_eq!(config.message.from, DEFAULT_FROM);
    }

    #[tokio::test]
    async fn plain_message_uses_kind_defaults() {
        let message = SendConfig::default()
            .message(MessageKind::Plain)
            .await
            .unwrap();

        assert_eq!(message.headers().get("Subject"), Some(DEFAULT_PLAIN_SUBJECT));
        assert_eq!(message.body().text(), DEFAULT_PLAIN_BODY);
        assert!(message.attachment().is_none());
    }

    #[tokio::test]
    async fn attachment_message_reads_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("go.mod");
        std::fs::write(&path, "module example\n").unwrap();

        let mut config = SendConfig::default();
        config.attachment.path = path;

        let message = config.message(MessageKind::Attachment).await.unwrap();
        let attachment = message.attachment().unwrap();

        assert_eq!(
            message.headers().get("subject"),
            Some(DEFAULT_ATTACHMENT_SUBJECT)
        );
        assert_eq!(attachment.filename, "attachment.pdf");
        assert_eq!(attachment.content_type, "application/pdf");
        assert_eq!(attachment.data, b"module example\n");
    }

    #[tokio::test]
    async fn missing_attachment_is_an_error() {
        let mut config = SendConfig::default();
        config.attachment.path = PathBuf::from("/definitely/not/here.bin");

        let err = config.message(MessageKind::Attachment).await.unwrap_err();
        assert!(matches!(err, MessageError::Attachment { .. }));
    }
}
