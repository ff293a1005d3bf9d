//! Fluent construction of a [`Message`].

use std::path::Path;

use ulid::Ulid;

use super::{Attachment, Headers, Message, MessageError, TextBody, addresses};

/// Builder for a message with From, To, Subject, a text body and at most one
/// attachment.
///
/// # Examples
///
/// ```
/// use smtpd::message::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("your_email@example.com")
///     .to("recipient_email@example.com")
///     .subject("Test Email")
///     .body("This is a test email.")
///     .build()
///     .unwrap();
///
/// assert!(message.to_wire().contains("Subject: Test Email\r\n"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    headers: Headers,
    body: Option<String>,
    attachment: Option<Attachment>,
    boundary: Option<String>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the From header.
    #[must_use]
    pub fn from(self, from: impl Into<String>) -> Self {
        self.header("From", from)
    }

    /// Sets the To header. Several recipients are given as one
    /// comma-separated list.
    #[must_use]
    pub fn to(self, to: impl Into<String>) -> Self {
        self.header("To", to)
    }

    #[must_use]
    pub fn subject(self, subject: impl Into<String>) -> Self {
        self.header("Subject", subject)
    }

    /// Sets an arbitrary header, replacing any earlier value of the same
    /// name regardless of case.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, text: impl Into<String>) -> Self {
        self.body = Some(text.into());
        self
    }

    /// Attaches `data`. A message carries at most one attachment, so this
    /// replaces any earlier one.
    #[must_use]
    pub fn attach(
        mut self,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.attachment = Some(Attachment {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        });
        self
    }

    /// Reads `path` and attaches it under the given filename and type.
    pub async fn attach_file(
        self,
        path: impl AsRef<Path>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Result<Self, MessageError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| MessageError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(self.attach(filename, content_type, data))
    }

    /// Overrides the generated multipart boundary.
    #[must_use]
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Validates the headers and produces the message. `Date` and
    /// `Message-ID` are filled in unless already set.
    pub fn build(self) -> Result<Message, MessageError> {
        let Self {
            mut headers,
            body,
            attachment,
            boundary,
        } = self;

        for required in ["From", "To"] {
            if headers.get(required).is_none_or(|v| v.trim().is_empty()) {
                return Err(MessageError::MissingHeader(required));
            }
        }

        for (name, value) in headers.iter() {
            let valid_name = !name.is_empty()
                && name.bytes().all(|b| b.is_ascii_graphic() && b != b':');
            if !valid_name || value.contains(['\r', '\n']) {
                return Err(MessageError::InvalidHeader {
                    name: name.to_string(),
                });
            }
        }

        if !headers.contains("Date") {
            headers.set("Date", chrono::Utc::now().to_rfc2822());
        }
        if !headers.contains("Message-ID") {
            let domain = headers
                .get("From")
                .and_then(|from| addresses("From", from).ok())
                .and_then(|addrs| addrs.into_iter().next())
                .and_then(|addr| addr.rsplit_once('@').map(|(_, d)| d.to_string()))
                .unwrap_or_else(|| "localhost".to_string());
            headers.set("Message-ID", format!("<{}@{domain}>", Ulid::new()));
        }

        Ok(Message {
            headers,
            body: TextBody::new(body.unwrap_or_default()),
            attachment,
            boundary: boundary.unwrap_or_else(|| format!("=_Part_{}", Ulid::new())),
        })
    }
}
