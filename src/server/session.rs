use std::{collections::BTreeMap, fmt::Display, net::SocketAddr, path::PathBuf, sync::Arc};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;

use super::{
    auth::Authenticator,
    command::{Command, HeloVariant},
    connection::{Connection, TlsInfo},
    mail::{Mail, generate_id},
    status::Status,
};
use crate::{config::ServerTimeouts, error::SessionError, incoming, internal, outgoing};

/// Longest command line accepted. Larger than the RFC 5321 limit of 512 so
/// long AUTH responses fit.
const MAX_COMMAND_LINE: usize = 4096;

/// Longest line accepted inside DATA.
const MAX_DATA_LINE: usize = 64 * 1024;

/// Settings shared by every session of a server.
pub struct SessionConfig {
    pub hostname: String,
    pub instance_name: String,
    pub max_size: usize,
    pub max_recipients: usize,
    pub allow_anonymous: bool,
    pub allow_insecure_auth: bool,
    pub storage: PathBuf,
    pub timeouts: ServerTimeouts,
    pub authenticator: Authenticator,
    pub tls: Option<TlsAcceptor>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum State {
    /// Waiting for HELO/EHLO.
    #[default]
    Connect,
    /// Greeted, no transaction in progress.
    Ready,
    MailFrom,
    RcptTo,
}

#[derive(Debug, Default)]
pub struct Context {
    pub state: State,
    pub helo: Option<String>,
    pub username: Option<String>,
    pub mail_from: Option<String>,
    pub rcpt_to: Vec<String>,
    pub tls: Option<TlsInfo>,
}

impl Context {
    fn reset_transaction(&mut self) {
        self.mail_from = None;
        self.rcpt_to.clear();
        if self.state != State::Connect {
            self.state = State::Ready;
        }
    }
}

#[derive(PartialEq, Eq, Debug)]
enum Event {
    ConnectionKeepAlive,
    ConnectionClose,
    StartTls,
}

pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    peer: SocketAddr,
    config: Arc<SessionConfig>,
    connection: Connection<Stream>,
    context: Context,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub fn create(config: Arc<SessionConfig>, stream: Stream, peer: SocketAddr) -> Self {
        Self {
            peer,
            config,
            connection: Connection::plain(stream),
            context: Context::default(),
        }
    }

    pub async fn run(mut self) -> Result<(), SessionError> {
        internal!(level = DEBUG, "Connected to {}", self.peer);

        let result = self.run_inner().await;

        match &result {
            Err(SessionError::LineTooLong(_)) => {
                let _ = self.reply(Status::SyntaxError, "5.5.6 Line too long").await;
            }
            Err(SessionError::Timeout(_)) => {
                let _ = self
                    .reply(Status::Unavailable, "4.4.2 Idle timeout, closing connection")
                    .await;
            }
            _ => {}
        }

        internal!(level = DEBUG, "Connection to {} closed", self.peer);
        result
    }

    async fn run_inner(&mut self) -> Result<(), SessionError> {
        let greeting = format!("{} ESMTP smtpd ready", self.config.hostname);
        self.reply(Status::ServiceReady, greeting).await?;

        loop {
            let Some(line) = self.read_line(MAX_COMMAND_LINE).await? else {
                return Ok(());
            };

            let command = Command::try_from(line.as_slice()).unwrap_or_else(|e| e);
            incoming!("{command}");

            match self.handle(command).await? {
                Event::ConnectionKeepAlive => {}
                Event::ConnectionClose => return Ok(()),
                Event::StartTls => self.upgrade().await?,
            }
        }
    }

    async fn upgrade(&mut self) -> Result<(), SessionError> {
        let Some(acceptor) = self.config.tls.clone() else {
            return Err(SessionError::Tls("TLS is not configured".to_string()));
        };

        let limit = self.config.timeouts.command();
        let info = tokio::time::timeout(limit, self.connection.upgrade(&acceptor))
            .await
            .map_err(|_| SessionError::Timeout(limit.as_secs()))??;
        internal!(
            level = DEBUG,
            "Connection from {} upgraded to {} ({})",
            self.peer,
            info.version,
            info.cipher
        );

        // RFC 3207: forget everything learnt before the handshake
        self.context = Context {
            tls: Some(info),
            ..Context::default()
        };

        Ok(())
    }

    async fn read_line(&mut self, max: usize) -> Result<Option<Vec<u8>>, SessionError> {
        let limit = self.config.timeouts.command();
        tokio::time::timeout(limit, self.connection.read_line(max))
            .await
            .map_err(|_| SessionError::Timeout(limit.as_secs()))?
    }

    async fn reply<M: Display + Send>(
        &mut self,
        status: Status,
        message: M,
    ) -> Result<(), SessionError> {
        let line = format!("{status} {message}");
        outgoing!("{line}");
        Ok(self.connection.send(&line).await?)
    }

    async fn reply_lines(&mut self, status: Status, lines: &[String]) -> Result<(), SessionError> {
        for (idx, line) in lines.iter().enumerate() {
            let separator = if idx + 1 == lines.len() { ' ' } else { '-' };
            let line = format!("{status}{separator}{line}");
            outgoing!("{line}");
            self.connection.send(&line).await?;
        }
        Ok(())
    }

    fn authorized(&self) -> bool {
        self.config.allow_anonymous || self.context.username.is_some()
    }

    fn auth_offered(&self) -> bool {
        self.context.tls.is_some() || self.config.allow_insecure_auth
    }

    fn ehlo_lines(&self, client: &str) -> Vec<String> {
        let mut lines = vec![
            format!("{} Hello {client}", self.config.hostname),
            format!("SIZE {}", self.config.max_size),
            "8BITMIME".to_string(),
            "ENHANCEDSTATUSCODES".to_string(),
        ];

        if self.auth_offered() {
            lines.push("AUTH PLAIN LOGIN".to_string());
        }
        if self.config.tls.is_some() && !self.connection.is_tls() {
            lines.push("STARTTLS".to_string());
        }

        lines
    }

    /// Checks shared by MAIL, RCPT and DATA. Returns the rejection to send,
    /// if any.
    fn precondition(&self) -> Option<(Status, &'static str)> {
        if self.context.state == State::Connect {
            Some((Status::InvalidCommandSequence, "5.5.1 Send HELO/EHLO first"))
        } else if !self.authorized() {
            Some((Status::AuthRequired, "5.7.0 Authentication required"))
        } else {
            None
        }
    }

    async fn handle(&mut self, command: Command) -> Result<Event, SessionError> {
        if matches!(
            command,
            Command::MailFrom { .. } | Command::RcptTo(_) | Command::Data
        ) && let Some((status, message)) = self.precondition()
        {
            self.reply(status, message).await?;
            return Ok(Event::ConnectionKeepAlive);
        }

        match command {
            Command::Helo(variant) => {
                let (client, esmtp) = match variant {
                    HeloVariant::Ehlo(client) => (client, true),
                    HeloVariant::Helo(client) => (client, false),
                };

                self.context.state = State::Ready;
                self.context.reset_transaction();

                if esmtp {
                    let lines = self.ehlo_lines(&client);
                    self.reply_lines(Status::Ok, &lines).await?;
                } else {
                    let message = format!("{} Hello {client}", self.config.hostname);
                    self.reply(Status::Ok, message).await?;
                }
                self.context.helo = Some(client);
            }
            Command::StartTls => {
                if self.config.tls.is_none() {
                    self.reply(Status::NotImplemented, "5.5.1 STARTTLS not supported")
                        .await?;
                } else if self.context.tls.is_some() {
                    self.reply(Status::InvalidCommandSequence, "5.5.1 Already running TLS")
                        .await?;
                } else {
                    self.reply(Status::ServiceReady, "2.0.0 Ready to start TLS")
                        .await?;
                    return Ok(Event::StartTls);
                }
            }
            Command::Auth { mechanism, initial } => {
                return self.authenticate(&mechanism, initial).await;
            }
            Command::MailFrom { from, size } => {
                if self.context.state != State::Ready {
                    self.reply(Status::InvalidCommandSequence, "5.5.1 Sender already specified")
                        .await?;
                } else if size.is_some_and(|size| size > self.config.max_size) {
                    let message = format!(
                        "5.3.4 Message too large, maximum size is {}",
                        self.config.max_size
                    );
                    self.reply(Status::ExceededStorage, message).await?;
                } else {
                    let from = from.unwrap_or_default();
                    let message = format!("2.1.0 Sender <{from}> OK");
                    self.context.mail_from = Some(from);
                    self.context.state = State::MailFrom;
                    self.reply(Status::Ok, message).await?;
                }
            }
            Command::RcptTo(to) => {
                if !matches!(self.context.state, State::MailFrom | State::RcptTo) {
                    self.reply(Status::InvalidCommandSequence, "5.5.1 Need MAIL before RCPT")
                        .await?;
                } else if self.context.rcpt_to.len() >= self.config.max_recipients {
                    let message = format!(
                        "4.5.3 Too many recipients, maximum is {}",
                        self.config.max_recipients
                    );
                    self.reply(Status::InsufficientStorage, message).await?;
                } else {
                    let message = format!("2.1.5 Recipient <{to}> OK");
                    self.context.rcpt_to.push(to);
                    self.context.state = State::RcptTo;
                    self.reply(Status::Ok, message).await?;
                }
            }
            Command::Data => {
                if self.context.state == State::RcptTo {
                    return self.receive_data().await;
                }
                self.reply(Status::InvalidCommandSequence, "5.5.1 Need RCPT before DATA")
                    .await?;
            }
            Command::Rset => {
                self.context.reset_transaction();
                self.reply(Status::Ok, "2.0.0 Flushed").await?;
            }
            Command::Noop => self.reply(Status::Ok, "2.0.0 OK").await?,
            Command::Quit => {
                self.reply(Status::GoodBye, "2.0.0 Bye").await?;
                return Ok(Event::ConnectionClose);
            }
            Command::Invalid(_) => {
                self.reply(Status::ParameterError, "5.5.4 Syntax error in parameters")
                    .await?;
            }
            Command::Unknown(_) => {
                self.reply(Status::SyntaxError, "5.5.2 Command not recognized")
                    .await?;
            }
        }

        Ok(Event::ConnectionKeepAlive)
    }

    /// Send a `334` challenge and read the client's answer. `None` means the
    /// client went away or cancelled with `*`.
    async fn challenge(&mut self, prompt: &str) -> Result<Option<String>, SessionError> {
        self.reply(Status::AuthContinue, prompt).await?;

        let Some(line) = self.read_line(MAX_COMMAND_LINE).await? else {
            return Ok(None);
        };
        let line = String::from_utf8_lossy(&line).trim().to_string();
        incoming!("<credentials>");

        Ok((line != "*").then_some(line))
    }

    fn decode(token: &str) -> Option<String> {
        // "=" stands for an empty initial response
        if token == "=" {
            return Some(String::new());
        }
        STANDARD
            .decode(token.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    async fn authenticate(
        &mut self,
        mechanism: &str,
        initial: Option<String>,
    ) -> Result<Event, SessionError> {
        let rejection = if self.context.state == State::Connect {
            Some((Status::InvalidCommandSequence, "5.5.1 Send HELO/EHLO first"))
        } else if self.context.username.is_some() {
            Some((Status::InvalidCommandSequence, "5.5.1 Already authenticated"))
        } else if self.context.state != State::Ready {
            Some((Status::InvalidCommandSequence, "5.5.1 Mail transaction in progress"))
        } else if !self.auth_offered() {
            Some((
                Status::EncryptionRequired,
                "5.7.11 Encryption required for requested authentication mechanism",
            ))
        } else {
            None
        };

        if let Some((status, message)) = rejection {
            self.reply(status, message).await?;
            return Ok(Event::ConnectionKeepAlive);
        }

        let credentials = match mechanism {
            "PLAIN" => {
                let token = match initial {
                    Some(token) => Some(token),
                    None => self.challenge("").await?,
                };

                token.as_deref().map(|token| {
                    Self::decode(token).and_then(|decoded| {
                        let mut parts = decoded.splitn(3, '\0');
                        match (parts.next(), parts.next(), parts.next()) {
                            (Some(_authzid), Some(user), Some(pass)) => {
                                Some((user.to_string(), pass.to_string()))
                            }
                            _ => None,
                        }
                    })
                })
            }
            "LOGIN" => {
                let username = match initial {
                    Some(token) => Some(token),
                    // "Username:"
                    None => self.challenge("VXNlcm5hbWU6").await?,
                };
                match username {
                    None => None,
                    Some(username) => {
                        // "Password:"
                        let password = self.challenge("UGFzc3dvcmQ6").await?;
                        password.map(|password| {
                            Self::decode(&username).zip(Self::decode(&password))
                        })
                    }
                }
            }
            _ => {
                self.reply(
                    Status::ParameterNotImplemented,
                    "5.5.4 Unrecognized authentication type",
                )
                .await?;
                return Ok(Event::ConnectionKeepAlive);
            }
        };

        match credentials {
            None => {
                self.reply(Status::ParameterError, "5.0.0 Authentication cancelled")
                    .await?;
            }
            Some(None) => {
                self.reply(Status::ParameterError, "5.5.2 Invalid authentication data")
                    .await?;
            }
            Some(Some((username, password))) => {
                if self.config.authenticator.authenticate(&username, &password) {
                    internal!(level = INFO, "{} authenticated as {username}", self.peer);
                    self.context.username = Some(username);
                    self.reply(Status::AuthSuccessful, "2.7.0 Authentication succeeded")
                        .await?;
                } else {
                    internal!(level = WARN, "Failed login for {username} from {}", self.peer);
                    self.reply(Status::AuthFailed, "5.7.8 Authentication credentials invalid")
                        .await?;
                }
            }
        }

        Ok(Event::ConnectionKeepAlive)
    }

    /// Read the message up to the terminating dot, then store it.
    async fn receive_data(&mut self) -> Result<Event, SessionError> {
        self.reply(
            Status::StartMailInput,
            "Start mail input; end with <CR><LF>.<CR><LF>",
        )
        .await?;

        let max_size = self.config.max_size;
        let limit = self.config.timeouts.data_block();
        let mut data = Vec::new();
        let mut too_large = false;

        loop {
            let line = tokio::time::timeout(limit, self.connection.read_line(MAX_DATA_LINE))
                .await
                .map_err(|_| SessionError::Timeout(limit.as_secs()))??;
            let Some(line) = line else {
                // The client vanished mid-message; nothing is stored
                return Ok(Event::ConnectionClose);
            };

            if line == b".\r\n" || line == b".\n" {
                break;
            }

            let line = line.strip_prefix(b".").unwrap_or(&line[..]);

            // Keep reading to the terminator so the session stays in sync
            if !too_large {
                if data.len() + line.len() > max_size {
                    too_large = true;
                    data = Vec::new();
                } else {
                    data.extend_from_slice(line);
                }
            }
        }

        if too_large {
            self.context.reset_transaction();
            let message = format!("5.3.4 Message too large, maximum size is {max_size}");
            self.reply(Status::ExceededStorage, message).await?;
            return Ok(Event::ConnectionKeepAlive);
        }

        match self.store(data).await {
            Ok(id) => {
                let message = format!("2.0.0 Message {id} accepted for delivery");
                self.reply(Status::Ok, message).await?;
            }
            Err(err) => {
                internal!(level = ERROR, "Failed to store message: {err}");
                self.reply(Status::ActionUnavailable, "4.3.0 Failed to store message")
                    .await?;
            }
        }

        self.context.reset_transaction();
        Ok(Event::ConnectionKeepAlive)
    }

    async fn store(&mut self, data: Vec<u8>) -> anyhow::Result<String> {
        let username = self.context.username.clone().unwrap_or_default();
        let id = generate_id(&self.config.instance_name, &username);

        let mut extras = BTreeMap::new();
        extras.insert("server_name".to_string(), self.config.hostname.clone());
        if let Some(helo) = &self.context.helo {
            extras.insert("helo".to_string(), helo.clone());
        }
        if let Some(tls) = &self.context.tls {
            extras.insert("tls_conn".to_string(), tls.version.clone());
            extras.insert("tls_cipher".to_string(), tls.cipher.clone());
        }

        let mail = Mail {
            id: id.clone(),
            received_at: Utc::now(),
            username,
            mail_from: self.context.mail_from.clone().unwrap_or_default(),
            rcpt_to: self.context.rcpt_to.clone(),
            client_ip: self.peer.ip().to_string(),
            size: data.len(),
            extras,
            data,
        };

        let received = mail.received_header(
            &self.config.hostname,
            self.context.helo.as_deref().unwrap_or_default(),
            self.context.tls.as_ref(),
        );
        let contents = mail.render(&received)?;
        let dir = self.config.storage.clone();

        let path = tokio::task::spawn_blocking(move || mail.save(&dir, &contents)).await??;

        internal!(
            level = INFO,
            "Stored message {id} from <{}> for {:?} at {}",
            self.context.mail_from.as_deref().unwrap_or_default(),
            self.context.rcpt_to,
            path.display()
        );

        Ok(id)
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    use super::*;

    struct Client {
        reader: BufReader<DuplexStream>,
    }

    impl Client {
        async fn send(&mut self, line: &str) {
            self.reader
                .get_mut()
                .write_all(format!("{line}\r\n").as_bytes())
                .await
                .unwrap();
        }

        /// Read one full (possibly multi-line) reply.
        async fn reply(&mut self) -> Vec<String> {
            let mut lines = Vec::new();
            loop {
                let mut line = String::new();
                self.reader.read_line(&mut line).await.unwrap();
                let line = line.trim_end().to_string();
                let last = line.as_bytes().get(3) != Some(&b'-');
                lines.push(line);
                if last {
                    return lines;
                }
            }
        }

        async fn command(&mut self, line: &str) -> String {
            self.send(line).await;
            self.reply().await.join("\n")
        }
    }

    fn config(storage: &Path) -> SessionConfig {
        SessionConfig {
            hostname: "mx.test".to_string(),
            instance_name: "test".to_string(),
            max_size: 1024,
            max_recipients: 2,
            allow_anonymous: true,
            allow_insecure_auth: false,
            storage: storage.to_path_buf(),
            timeouts: ServerTimeouts::default(),
            authenticator: "alice:secret".parse().unwrap(),
            tls: None,
        }
    }

    async fn start(config: SessionConfig) -> (Client, tokio::task::JoinHandle<Result<(), SessionError>>) {
        let (client, server) = tokio::io::duplex(16 * 1024);
        let session = Session::create(Arc::new(config), server, "127.0.0.1:40000".parse().unwrap());
        let handle = tokio::spawn(session.run());

        let mut client = Client {
            reader: BufReader::new(client),
        };
        assert_eq!(client.reply().await, vec!["220 mx.test ESMTP smtpd ready"]);

        (client, handle)
    }

    fn stored(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn ehlo_advertises_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _) = start(config(dir.path())).await;

        let reply = client.command("EHLO client.test").await;
        assert_eq!(
            reply,
            "250-mx.test Hello client.test\n\
             250-SIZE 1024\n\
             250-8BITMIME\n\
             250 ENHANCEDSTATUSCODES"
        );

        let mut insecure = config(dir.path());
        insecure.allow_insecure_auth = true;
        let (mut client, _) = start(insecure).await;
        let reply = client.command("EHLO client.test").await;
        assert!(reply.ends_with("250 AUTH PLAIN LOGIN"));

        assert_eq!(client.command("HELO client.test").await, "250 mx.test Hello client.test");
    }

    #[tokio::test]
    async fn stores_a_message() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, handle) = start(config(dir.path())).await;

        client.command("EHLO client.test").await;
        assert!(client.command("MAIL FROM:<a@example.com>").await.starts_with("250 "));
        assert!(client.command("RCPT TO:<b@example.com>").await.starts_with("250 "));
        assert!(client.command("DATA").await.starts_with("354 "));

        client.send("Subject: hi\r\n\r\n..leading dot\r\nbody").await;
        let reply = client.command(".").await;
        assert!(reply.starts_with("250 2.0.0 Message "), "{reply}");
        assert!(reply.ends_with(" accepted for delivery"));

        assert_eq!(client.command("QUIT").await, "221 2.0.0 Bye");
        assert!(handle.await.unwrap().is_ok());

        let files = stored(dir.path());
        assert_eq!(files.len(), 1);
        let mail = &files[0];
        assert!(mail.starts_with("X-SMTPD-DATA: {"));
        assert!(mail.contains("Received: from client.test (127.0.0.1 [127.0.0.1])"));
        assert!(mail.ends_with("Subject: hi\r\n\r\n.leading dot\r\nbody\r\n"));

        let id = reply
            .trim_start_matches("250 2.0.0 Message ")
            .trim_end_matches(" accepted for delivery");
        assert!(dir.path().join(format!("{id}.eml")).exists());
    }

    #[tokio::test]
    async fn requires_authentication_when_anonymous_is_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.allow_anonymous = false;
        config.allow_insecure_auth = true;
        let (mut client, _) = start(config).await;

        client.command("EHLO client.test").await;
        assert_eq!(
            client.command("MAIL FROM:<a@example.com>").await,
            "530 5.7.0 Authentication required"
        );

        // \0alice\0wrong
        assert!(
            client
                .command("AUTH PLAIN AGFsaWNlAHdyb25n")
                .await
                .starts_with("535 ")
        );
        assert!(
            client
                .command("AUTH PLAIN AGFsaWNlAHNlY3JldA==")
                .await
                .starts_with("235 ")
        );
        assert!(client.command("MAIL FROM:<a@example.com>").await.starts_with("250 "));
    }

    #[tokio::test]
    async fn auth_login_dialogue() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.allow_insecure_auth = true;
        let (mut client, _) = start(config).await;

        client.command("EHLO client.test").await;
        assert_eq!(client.command("AUTH LOGIN").await, "334 VXNlcm5hbWU6");
        assert_eq!(client.command("YWxpY2U=").await, "334 UGFzc3dvcmQ6");
        assert_eq!(
            client.command("c2VjcmV0").await,
            "235 2.7.0 Authentication succeeded"
        );
        assert!(client.command("AUTH LOGIN").await.starts_with("503 "));
    }

    #[tokio::test]
    async fn auth_needs_tls_or_insecure_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _) = start(config(dir.path())).await;

        client.command("EHLO client.test").await;
        assert!(
            client
                .command("AUTH PLAIN AGFsaWNlAHNlY3JldA==")
                .await
                .starts_with("538 ")
        );
    }

    #[tokio::test]
    async fn enforces_limits() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _) = start(config(dir.path())).await;

        client.command("EHLO client.test").await;
        assert!(
            client
                .command("MAIL FROM:<a@example.com> SIZE=4096")
                .await
                .starts_with("552 ")
        );

        client.command("MAIL FROM:<a@example.com>").await;
        client.command("RCPT TO:<1@example.com>").await;
        client.command("RCPT TO:<2@example.com>").await;
        assert_eq!(
            client.command("RCPT TO:<3@example.com>").await,
            "452 4.5.3 Too many recipients, maximum is 2"
        );

        assert!(client.command("DATA").await.starts_with("354 "));
        client.send(&"x".repeat(2000)).await;
        assert!(client.command(".").await.starts_with("552 "));
        assert!(stored(dir.path()).is_empty());

        // The session is still usable
        assert_eq!(client.command("NOOP").await, "250 2.0.0 OK");
    }

    #[tokio::test]
    async fn rejects_out_of_sequence_commands() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _) = start(config(dir.path())).await;

        assert!(client.command("MAIL FROM:<a@example.com>").await.starts_with("503 "));
        client.command("EHLO client.test").await;
        assert!(client.command("DATA").await.starts_with("503 "));
        assert!(client.command("RCPT TO:<b@example.com>").await.starts_with("503 "));
        assert!(client.command("STARTTLS").await.starts_with("502 "));
        assert!(client.command("VRFY someone").await.starts_with("500 "));
        assert!(client.command("MAIL FROM:nobody").await.starts_with("501 "));

        client.command("MAIL FROM:<a@example.com>").await;
        assert!(client.command("MAIL FROM:<a@example.com>").await.starts_with("503 "));
        assert_eq!(client.command("RSET").await, "250 2.0.0 Flushed");
        assert!(client.command("MAIL FROM:<a@example.com>").await.starts_with("250 "));
        assert!(client.command("RCPT TO:<Postmaster>").await.starts_with("250 "));
    }

    #[tokio::test]
    async fn silent_tls_handshake_times_out() {
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        let tls = crate::config::TlsConfig {
            enabled: true,
            cert_file: Some(fixtures.join("cert.pem")),
            key_file: Some(fixtures.join("key.pem")),
        };

        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.tls = crate::server::connection::acceptor(&tls).unwrap();
        config.timeouts.command_secs = 1;
        let (mut client, handle) = start(config).await;

        assert!(client.command("EHLO client.test").await.contains("250 STARTTLS"));
        assert_eq!(
            client.command("STARTTLS").await,
            "220 2.0.0 Ready to start TLS"
        );

        // No ClientHello follows; the client stays connected
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("session outlived the handshake timeout")
            .unwrap();
        assert!(matches!(result, Err(SessionError::Timeout(1))));
        drop(client);
    }
}
