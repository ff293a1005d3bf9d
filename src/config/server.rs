use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::{LogConfig, ServerTimeouts, load_toml};
use crate::error::ConfigError;

/// Configuration of the capture server, loaded from `smtpd.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub timeouts: ServerTimeouts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "defaults::host")]
    pub host: String,
    /// Kept wider than `u16` so an out-of-range port is reported by
    /// validation instead of a parse error.
    #[serde(default = "defaults::port")]
    pub port: u32,
    /// Mixed into generated mail ids so several instances sharing a
    /// storage directory never collide.
    #[serde(default = "defaults::instance_name")]
    pub instance_name: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            instance_name: defaults::instance_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Name announced in the greeting and the `Received` header.
    #[serde(default = "defaults::hostname")]
    pub hostname: String,
    /// Maximum accepted message size in bytes.
    #[serde(default = "defaults::max_size")]
    pub max_size: usize,
    #[serde(default = "defaults::max_recipients")]
    pub max_recipients: usize,
    /// `username:password` file, one entry per line.
    #[serde(default)]
    pub auth_file: Option<PathBuf>,
    #[serde(default = "defaults::allow_anonymous")]
    pub allow_anonymous: bool,
    /// Offer AUTH on connections that have not negotiated TLS.
    #[serde(default)]
    pub allow_insecure_auth: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            hostname: defaults::hostname(),
            max_size: defaults::max_size(),
            max_recipients: defaults::max_recipients(),
            auth_file: None,
            allow_anonymous: defaults::allow_anonymous(),
            allow_insecure_auth: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: defaults::storage_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

mod defaults {
    use std::path::PathBuf;

    pub fn host() -> String {
        "127.0.0.1".to_string()
    }
    pub const fn port() -> u32 {
        2525
    }
    pub fn instance_name() -> String {
        "smtpd".to_string()
    }
    pub fn hostname() -> String {
        "localhost".to_string()
    }
    pub const fn max_size() -> usize {
        10 * 1024 * 1024 // 10 MiB
    }
    pub const fn max_recipients() -> usize {
        50
    }
    pub const fn allow_anonymous() -> bool {
        true
    }
    pub fn storage_path() -> PathBuf {
        PathBuf::from("./data")
    }
}

fn require_file(what: &'static str, path: &Path) -> Result<(), ConfigError> {
    std::fs::metadata(path)
        .map(|_| ())
        .map_err(|source| ConfigError::FileNotFound {
            what,
            path: path.to_path_buf(),
            source,
        })
}

impl ServerConfig {
    /// Read and parse the configuration at `path` without validating it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_toml(path.as_ref())
    }

    /// Check every setting, creating the storage directory when missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::MissingField("server host"));
        }
        if !(1..=65535).contains(&self.server.port) {
            return Err(ConfigError::Invalid {
                field: "server port",
                reason: format!("{} is outside 1-65535", self.server.port),
            });
        }
        if self.server.instance_name.trim().is_empty() {
            return Err(ConfigError::MissingField("server instance_name"));
        }

        if self.smtp.hostname.trim().is_empty() {
            return Err(ConfigError::MissingField("smtp hostname"));
        }
        if self.smtp.max_size == 0 {
            return Err(ConfigError::Invalid {
                field: "smtp max_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.smtp.max_recipients == 0 {
            return Err(ConfigError::Invalid {
                field: "smtp max_recipients",
                reason: "must be greater than zero".to_string(),
            });
        }
        match &self.smtp.auth_file {
            Some(path) => require_file("auth file", path)?,
            None if !self.smtp.allow_anonymous => {
                return Err(ConfigError::MissingField(
                    "smtp auth_file (anonymous access is disabled)",
                ));
            }
            None => {}
        }

        if self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("storage path"));
        }
        std::fs::create_dir_all(&self.storage.path).map_err(|source| ConfigError::CreateDir {
            what: "storage",
            path: self.storage.path.clone(),
            source,
        })?;

        if self.tls.enabled {
            let cert = self
                .tls
                .cert_file
                .as_deref()
                .ok_or(ConfigError::MissingField("tls cert_file"))?;
            let key = self
                .tls
                .key_file
                .as_deref()
                .ok_or(ConfigError::MissingField("tls key_file"))?;
            require_file("TLS certificate", cert)?;
            require_file("TLS key", key)?;
        }

        self.log.validate()
    }

    /// The address the listener binds to. Host names other than `localhost`
    /// are resolved and the first address is used.
    pub async fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let port = u16::try_from(self.server.port).map_err(|_| ConfigError::Invalid {
            field: "server port",
            reason: format!("{} is outside 1-65535", self.server.port),
        })?;

        let host = self.server.host.trim();
        if host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), port));
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        let unresolved = |reason: String| ConfigError::Invalid {
            field: "server host",
            reason,
        };
        tokio::net::lookup_host((host, port))
            .await
            .map_err(|err| unresolved(format!("{host}: {err}")))?
            .next()
            .ok_or_else(|| unresolved(format!("{host} has no addresses")))
    }
}
