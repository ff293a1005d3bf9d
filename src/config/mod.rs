//! Configuration for the capture server and the test-mail sender.
//!
//! Both are plain TOML files. Every field has a default so an empty file, or
//! no file at all, describes the stock local setup on `127.0.0.1:2525`.

mod log;
mod send;
mod server;
mod timeouts;

use std::path::Path;

use serde::de::DeserializeOwned;

pub use self::{
    log::{LogConfig, LogFormat},
    send::{
        AttachmentConfig, DEFAULT_ATTACHMENT_BODY, DEFAULT_ATTACHMENT_CONTENT_TYPE,
        DEFAULT_ATTACHMENT_FILENAME, DEFAULT_ATTACHMENT_PATH, DEFAULT_ATTACHMENT_SUBJECT,
        DEFAULT_FROM, DEFAULT_PLAIN_BODY, DEFAULT_PLAIN_SUBJECT, DEFAULT_TO, MessageConfig,
        MessageKind, SendConfig, SendServerConfig,
    },
    server::{ListenConfig, ServerConfig, SmtpConfig, StorageConfig, TlsConfig},
    timeouts::{ClientTimeouts, ServerTimeouts},
};
use crate::error::ConfigError;

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
