//! Runs a real [`Server`] on a free local port with a temporary storage
//! directory.
//!
//! ```no_run
//! let server = CaptureServer::builder().with_user("alice", "secret").start().await?;
//! let outcome = Mailer::new(server.params()).send(&message).await;
//! assert_eq!(server.messages()?.len(), 1);
//! server.shutdown().await;
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use smtpd::{
    config::ServerConfig,
    server::{METADATA_HEADER, Server, Signal},
    transport::ConnectionParams,
};
use tempfile::TempDir;
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle, time::timeout};

/// A message read back from the storage directory.
pub struct StoredMail {
    pub raw: Vec<u8>,
    pub metadata: serde_json::Value,
}

impl StoredMail {
    fn read(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read(path)?;
        let parsed = mailparse::parse_mail(&raw)?;
        let header = parsed
            .headers
            .iter()
            .find(|h| h.get_key_ref().eq_ignore_ascii_case(METADATA_HEADER))
            .ok_or_else(|| anyhow::anyhow!("{} has no metadata header", path.display()))?;
        let metadata = serde_json::from_str(&header.get_value())?;

        Ok(Self { raw, metadata })
    }

    pub fn parsed(&self) -> mailparse::ParsedMail<'_> {
        mailparse::parse_mail(&self.raw).expect("stored mail parses")
    }
}

pub struct CaptureServer {
    port: u16,
    _root: TempDir,
    storage: PathBuf,
    shutdown_tx: broadcast::Sender<Signal>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl CaptureServer {
    pub fn builder() -> CaptureServerBuilder {
        CaptureServerBuilder::default()
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub fn storage(&self) -> &Path {
        &self.storage
    }

    /// Connection parameters for a client of this server.
    pub fn params(&self) -> ConnectionParams {
        ConnectionParams::new("127.0.0.1", self.port)
    }

    /// Every stored message, oldest first.
    pub fn messages(&self) -> anyhow::Result<Vec<StoredMail>> {
        let mut paths = std::fs::read_dir(&self.storage)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        paths.retain(|p| p.extension().is_some_and(|ext| ext == "eml"));
        // Ids start with the receive time in nanoseconds
        paths.sort();

        paths.iter().map(|p| StoredMail::read(p)).collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(Signal::Shutdown);
        let _ = timeout(Duration::from_secs(5), self.handle).await;
    }
}

#[derive(Default)]
pub struct CaptureServerBuilder {
    users: Vec<(String, String)>,
    anonymous: Option<bool>,
    insecure_auth: bool,
    max_size: Option<usize>,
    max_recipients: Option<usize>,
    tls: bool,
}

impl CaptureServerBuilder {
    #[must_use]
    pub fn with_user(mut self, username: &str, password: &str) -> Self {
        self.users.push((username.to_string(), password.to_string()));
        self
    }

    #[must_use]
    pub const fn allow_anonymous(mut self, allow: bool) -> Self {
        self.anonymous = Some(allow);
        self
    }

    #[must_use]
    pub const fn allow_insecure_auth(mut self) -> Self {
        self.insecure_auth = true;
        self
    }

    #[must_use]
    pub const fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    #[must_use]
    pub const fn with_max_recipients(mut self, max: usize) -> Self {
        self.max_recipients = Some(max);
        self
    }

    /// Offer STARTTLS with the self-signed pair in `tests/fixtures`.
    #[must_use]
    pub const fn with_tls(mut self) -> Self {
        self.tls = true;
        self
    }

    pub async fn start(self) -> anyhow::Result<CaptureServer> {
        let root = tempfile::tempdir()?;
        let storage = root.path().join("mail");

        // Reserve a free port, then hand it to the server
        let port = TcpListener::bind("127.0.0.1:0").await?.local_addr()?.port();

        let mut config = ServerConfig::default();
        config.server.port = u32::from(port);
        config.smtp.hostname = "capture.test".to_string();
        config.smtp.allow_insecure_auth = self.insecure_auth;
        config.storage.path = storage.clone();

        if let Some(allow) = self.anonymous {
            config.smtp.allow_anonymous = allow;
        }
        if let Some(max_size) = self.max_size {
            config.smtp.max_size = max_size;
        }
        if let Some(max) = self.max_recipients {
            config.smtp.max_recipients = max;
        }
        if self.tls {
            let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
            config.tls.enabled = true;
            config.tls.cert_file = Some(fixtures.join("cert.pem"));
            config.tls.key_file = Some(fixtures.join("key.pem"));
        }
        if !self.users.is_empty() {
            let path = root.path().join("users.txt");
            let users = self
                .users
                .iter()
                .map(|(user, pass)| format!("{user}:{pass}\n"))
                .collect::<String>();
            std::fs::write(&path, format!("# test users\n{users}"))?;
            config.smtp.auth_file = Some(path);
        }

        let server = Server::bind(&config).await?;
        let (shutdown_tx, receiver) = broadcast::channel(8);
        let handle = tokio::spawn(server.serve(shutdown_tx.clone(), receiver));

        Ok(CaptureServer {
            port,
            _root: root,
            storage,
            shutdown_tx,
            handle,
        })
    }
}
