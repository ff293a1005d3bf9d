//! Scripted SMTP server for replies the capture server never sends.
//!
//! Every verb has a canned reply that a test can override:
//!
//! ```rust,no_run
//! let server = MockSmtpServer::builder()
//!     .reply("RCPT", 550, "5.1.1 User unknown")
//!     .build()
//!     .await?;
//! // point a Mailer at server.addr(), then inspect server.commands().await
//! ```

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    time::timeout,
};

/// What the mock saw, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Everything between DATA and the terminating dot, still dot-stuffed.
    MessageContent(Vec<u8>),
    Quit,
    Other(String),
}

impl SmtpCommand {
    fn from_line(verb: &str, args: &str) -> Self {
        let args = args.to_string();
        match verb {
            "EHLO" => Self::Ehlo(args),
            "HELO" => Self::Helo(args),
            "AUTH" => Self::Auth(args),
            "MAIL" => Self::MailFrom(args),
            "RCPT" => Self::RcptTo(args),
            "DATA" => Self::Data,
            "QUIT" => Self::Quit,
            _ => Self::Other(format!("{verb} {args}").trim().to_string()),
        }
    }
}

#[derive(Clone)]
struct Script {
    greeting: (u16, String),
    /// EHLO lines; the first doubles as the greeting line.
    capabilities: Vec<String>,
    replies: HashMap<&'static str, (u16, String)>,
    /// Reply to the terminating dot.
    accepted: (u16, String),
    /// Close the socket on QUIT instead of answering.
    drop_on_quit: bool,
}

impl Default for Script {
    fn default() -> Self {
        let replies = [
            ("HELO", 250, "mock.test"),
            ("AUTH", 235, "2.7.0 Authentication succeeded"),
            ("MAIL", 250, "2.1.0 OK"),
            ("RCPT", 250, "2.1.5 OK"),
            ("DATA", 354, "End data with <CR><LF>.<CR><LF>"),
            ("RSET", 250, "2.0.0 OK"),
            ("QUIT", 221, "2.0.0 Bye"),
        ]
        .into_iter()
        .map(|(verb, code, text)| (verb, (code, text.to_string())))
        .collect();

        Self {
            greeting: (220, "mock.test ESMTP".to_string()),
            capabilities: vec!["mock.test".to_string(), "SIZE 10000000".to_string()],
            replies,
            accepted: (250, "2.0.0 Queued".to_string()),
            drop_on_quit: false,
        }
    }
}

impl Script {
    fn reply_to(&self, verb: &str) -> String {
        if verb == "EHLO" {
            let last = self.capabilities.len().saturating_sub(1);
            return self
                .capabilities
                .iter()
                .enumerate()
                .map(|(i, cap)| format!("250{}{cap}\r\n", if i < last { '-' } else { ' ' }))
                .collect();
        }

        let (code, text) = self
            .replies
            .get(verb)
            .cloned()
            .unwrap_or((500, "5.5.2 Unknown command".to_string()));
        format!("{code} {text}\r\n")
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    seen: Arc<Mutex<Vec<SmtpCommand>>>,
}

impl MockSmtpServer {
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            script: Script::default(),
        }
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.seen.lock().await.clone()
    }

    /// Content of the first completed DATA, if any.
    pub async fn message(&self) -> Option<Vec<u8>> {
        self.commands().await.into_iter().find_map(|cmd| match cmd {
            SmtpCommand::MessageContent(content) => Some(content),
            _ => None,
        })
    }

    async fn converse(
        stream: TcpStream,
        script: Arc<Script>,
        seen: Arc<Mutex<Vec<SmtpCommand>>>,
    ) -> std::io::Result<()> {
        let mut stream = BufReader::new(stream);
        let mut line = String::new();

        let (code, text) = &script.greeting;
        stream
            .get_mut()
            .write_all(format!("{code} {text}\r\n").as_bytes())
            .await?;

        loop {
            line.clear();
            match timeout(Duration::from_secs(10), stream.read_line(&mut line)).await {
                Ok(Ok(0) | Err(_)) | Err(_) => return Ok(()),
                Ok(Ok(_)) => {}
            }

            let (verb, args) = line.trim().split_once(' ').unwrap_or((line.trim(), ""));
            let verb = verb.to_ascii_uppercase();
            let command = SmtpCommand::from_line(&verb, args);
            seen.lock().await.push(command.clone());

            if command == SmtpCommand::Quit && script.drop_on_quit {
                return Ok(());
            }

            let reply = script.reply_to(&verb);
            stream.get_mut().write_all(reply.as_bytes()).await?;

            match command {
                SmtpCommand::Quit => return Ok(()),
                SmtpCommand::Data if reply.starts_with("354") => {
                    let mut content = Vec::new();
                    loop {
                        line.clear();
                        if stream.read_line(&mut line).await? == 0 {
                            return Ok(());
                        }
                        if line == ".\r\n" {
                            break;
                        }
                        content.extend_from_slice(line.as_bytes());
                    }
                    seen.lock().await.push(SmtpCommand::MessageContent(content));

                    let (code, text) = &script.accepted;
                    stream
                        .get_mut()
                        .write_all(format!("{code} {text}\r\n").as_bytes())
                        .await?;
                }
                _ => {}
            }
        }
    }
}

pub struct MockSmtpServerBuilder {
    script: Script,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn greeting(mut self, code: u16, text: &str) -> Self {
        self.script.greeting = (code, text.to_string());
        self
    }

    #[must_use]
    pub fn capabilities(mut self, capabilities: &[&str]) -> Self {
        self.script.capabilities = capabilities.iter().map(ToString::to_string).collect();
        self
    }

    /// Override the reply to `verb` (upper case, e.g. `"RCPT"`).
    #[must_use]
    pub fn reply(mut self, verb: &'static str, code: u16, text: &str) -> Self {
        self.script.replies.insert(verb, (code, text.to_string()));
        self
    }

    /// Override the reply to the end of the message data.
    #[must_use]
    pub fn accepted(mut self, code: u16, text: &str) -> Self {
        self.script.accepted = (code, text.to_string());
        self
    }

    #[must_use]
    pub const fn drop_on_quit(mut self) -> Self {
        self.script.drop_on_quit = true;
        self
    }

    /// Listen on a random local port until the test ends.
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let script = Arc::new(self.script);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let shared = Arc::clone(&seen);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let script = Arc::clone(&script);
                let seen = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = MockSmtpServer::converse(stream, script, seen).await;
                });
            }
        });

        Ok(MockSmtpServer { addr, seen })
    }
}
