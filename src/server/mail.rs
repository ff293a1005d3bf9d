//! Accepted messages and how they are written to the storage directory.

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::connection::TlsInfo;

/// Header carrying the JSON metadata of a stored message.
pub const METADATA_HEADER: &str = "X-SMTPD-DATA";

/// A message accepted by the capture server.
#[derive(Debug, Clone, Serialize)]
pub struct Mail {
    pub id: String,
    pub received_at: DateTime<Utc>,
    /// Empty for anonymous sessions.
    pub username: String,
    /// Empty for the null sender.
    pub mail_from: String,
    pub rcpt_to: Vec<String>,
    pub client_ip: String,
    /// Size of the received data in bytes, after dot-unstuffing.
    pub size: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, String>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// `<unix-nanos>-<16 chars of base32(sha256(instance-username-random))>`.
pub fn generate_id(instance_name: &str, username: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let salt: [u8; 8] = rand::random();

    let mut hasher = Sha256::new();
    hasher.update(format!("{instance_name}-{username}-").as_bytes());
    hasher.update(salt);
    let hash = BASE32_NOPAD.encode(&hasher.finalize());

    format!("{nanos}-{}", &hash[..16])
}

impl Mail {
    /// `ESMTP`, with `S` for TLS and `A` for an authenticated client (RFC 3848).
    fn protocol(&self, tls: bool) -> String {
        let mut protocol = String::from("ESMTP");
        if tls {
            protocol.push('S');
        }
        if !self.username.is_empty() {
            protocol.push('A');
        }
        protocol
    }

    /// The `Received` trace header, folded over several lines.
    pub fn received_header(&self, hostname: &str, helo: &str, tls: Option<&TlsInfo>) -> String {
        let helo = if helo.is_empty() { &self.client_ip } else { helo };
        let tls_info = tls
            .map(|info| {
                format!(
                    "\r\n        (version={} cipher={})",
                    info.version, info.cipher
                )
            })
            .unwrap_or_default();

        format!(
            "Received: from {helo} ({ip} [{ip}])\r\n        \
             by {hostname} with {protocol} id {id}\r\n        \
             for <{rcpts}>{tls_info};\r\n        \
             {date}\r\n",
            ip = self.client_ip,
            protocol = self.protocol(tls.is_some()),
            id = self.id,
            rcpts = self.rcpt_to.join(">, <"),
            date = self.received_at.to_rfc2822(),
        )
    }

    /// The stored file: metadata header, trace header, then the message as
    /// received.
    pub fn render(&self, received: &str) -> Result<Vec<u8>, serde_json::Error> {
        let metadata = serde_json::to_string(self)?;

        let mut out = Vec::with_capacity(self.data.len() + metadata.len() + received.len() + 32);
        out.extend_from_slice(format!("{METADATA_HEADER}: {metadata}\r\n").as_bytes());
        out.extend_from_slice(received.as_bytes());
        out.extend_from_slice(&self.data);
        Ok(out)
    }

    /// Write `contents` to `<dir>/<id>.eml` through a temporary file in the
    /// same directory, so readers never see a partial message.
    pub fn save(&self, dir: &Path, contents: &[u8]) -> std::io::Result<PathBuf> {
        let target = dir.join(format!("{}.eml", self.id));

        let mut file = tempfile::Builder::new()
            .prefix(".mail-")
            .suffix(".eml.tmp")
            .tempfile_in(dir)?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;
        file.persist(&target).map_err(|err| err.error)?;

        Ok(target)
    }
}
