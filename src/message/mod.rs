//! MIME message construction.
//!
//! A [`Message`] is built once with [`MessageBuilder`], serialised with
//! [`Message::to_wire`] and handed to the transport. It holds a single text
//! body and at most one attachment; with an attachment it is written as
//! `multipart/mixed`.

mod builder;
pub(crate) mod encoding;
mod headers;

use std::{fmt::Write as _, io, path::PathBuf};

use mailparse::MailAddr;
use thiserror::Error;

pub use self::{builder::MessageBuilder, headers::Headers};
use self::encoding::{MAX_7BIT_LINE, base64_lines, filename_param, normalize_crlf};

/// Errors raised while constructing a message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// A header the message cannot be sent without is absent.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// A header name or value would corrupt the message framing.
    #[error("invalid header {name}: names must be printable ASCII and values single-line")]
    InvalidHeader { name: String },

    /// An address header could not be parsed.
    #[error("invalid address in {header}: {reason}")]
    InvalidAddress { header: &'static str, reason: String },

    /// The To header yields no recipient addresses.
    #[error("no recipients in To header")]
    NoRecipients,

    /// The attachment file could not be read.
    #[error("reading attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How the text body is written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    Base64,
}

impl TransferEncoding {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::Base64 => "base64",
        }
    }
}

/// The text part of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBody {
    text: String,
    charset: &'static str,
}

impl TextBody {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let charset = if text.is_ascii() { "us-ascii" } else { "utf-8" };
        Self { text, charset }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// `us-ascii` for pure ASCII text, `utf-8` otherwise.
    pub const fn charset(&self) -> &'static str {
        self.charset
    }

    /// ASCII text with short enough lines goes out as-is; anything else is
    /// base64 encoded.
    pub fn transfer_encoding(&self) -> TransferEncoding {
        if self.text.is_ascii() && self.text.lines().all(|line| line.len() <= MAX_7BIT_LINE) {
            TransferEncoding::SevenBit
        } else {
            TransferEncoding::Base64
        }
    }

    fn write_part(&self, out: &mut String) {
        let encoding = self.transfer_encoding();

        let _ = write!(
            out,
            "Content-Type: text/plain; charset=\"{}\"\r\n\
             Content-Transfer-Encoding: {}\r\n\r\n",
            self.charset,
            encoding.as_str()
        );

        match encoding {
            TransferEncoding::SevenBit => {
                let text = normalize_crlf(&self.text);
                out.push_str(&text);
                if !text.ends_with("\r\n") {
                    out.push_str("\r\n");
                }
            }
            TransferEncoding::Base64 => {
                out.push_str(&base64_lines(normalize_crlf(&self.text).as_bytes()));
            }
        }
    }
}

impl Default for TextBody {
    fn default() -> Self {
        Self::new(String::new())
    }
}

/// A binary attachment. The content type is declared by the caller and used
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    fn write_part(&self, out: &mut String) {
        let _ = write!(
            out,
            "Content-Type: {}\r\n\
             Content-Transfer-Encoding: base64\r\n\
             Content-Disposition: attachment; {}\r\n\r\n",
            self.content_type,
            filename_param(&self.filename)
        );
        out.push_str(&base64_lines(&self.data));
    }
}

/// SMTP envelope derived from the message headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender: String,
    pub recipients: Vec<String>,
}

/// A complete message, ready to be serialised.
#[derive(Debug, Clone)]
pub struct Message {
    headers: Headers,
    body: TextBody,
    attachment: Option<Attachment>,
    boundary: String,
}

fn addresses(header: &'static str, value: &str) -> Result<Vec<String>, MessageError> {
    let list = mailparse::addrparse(value).map_err(|err| MessageError::InvalidAddress {
        header,
        reason: err.to_string(),
    })?;

    Ok(list
        .iter()
        .flat_map(|entry| match entry {
            MailAddr::Single(single) => vec![single.addr.clone()],
            MailAddr::Group(group) => group.addrs.iter().map(|s| s.addr.clone()).collect(),
        })
        .collect())
}

impl Message {
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    pub const fn body(&self) -> &TextBody {
        &self.body
    }

    pub const fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Sender and recipients for MAIL FROM / RCPT TO: the first address of
    /// `From`, and every address of `To` and `Cc`.
    pub fn envelope(&self) -> Result<Envelope, MessageError> {
        let from = self
            .headers
            .get("From")
            .ok_or(MessageError::MissingHeader("From"))?;
        let sender = addresses("From", from)?
            .into_iter()
            .next()
            .ok_or_else(|| MessageError::InvalidAddress {
                header: "From",
                reason: "no address".to_string(),
            })?;

        let to = self
            .headers
            .get("To")
            .ok_or(MessageError::MissingHeader("To"))?;
        let mut recipients = addresses("To", to)?;
        if let Some(cc) = self.headers.get("Cc") {
            recipients.extend(addresses("Cc", cc)?);
        }

        if recipients.is_empty() {
            return Err(MessageError::NoRecipients);
        }

        Ok(Envelope { sender, recipients })
    }

    /// Serialise the message with CRLF line endings.
    pub fn to_wire(&self) -> String {
        let mut out = self.headers.to_string();
        out.push_str("MIME-Version: 1.0\r\n");

        match &self.attachment {
            None => self.body.write_part(&mut out),
            Some(attachment) => {
                let boundary = &self.boundary;
                let _ = write!(
                    out,
                    "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\r\n\
                     This is a multi-part message in MIME format.\r\n\
                     --{boundary}\r\n"
                );
                self.body.write_part(&mut out);
                let _ = write!(out, "--{boundary}\r\n");
                attachment.write_part(&mut out);
                let _ = write!(out, "--{boundary}--\r\n");
            }
        }

        out
    }
}
