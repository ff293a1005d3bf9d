use core::fmt::{self, Display, Formatter};

use mailparse::MailAddr;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Command {
    Helo(HeloVariant),
    /// `from` is `None` for the null reverse-path `<>` of
    /// [RFC-5321](https://www.ietf.org/rfc/rfc5321.txt).
    MailFrom {
        from: Option<String>,
        size: Option<usize>,
    },
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
    StartTls,
    Auth {
        mechanism: String,
        initial: Option<String>,
    },
    /// A known command with bad arguments.
    Invalid(String),
    /// Not a command this server knows.
    Unknown(String),
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(variant @ (HeloVariant::Ehlo(id) | HeloVariant::Helo(id))) => {
                write!(fmt, "{variant} {id}")
            }
            Self::MailFrom { from, size } => {
                write!(fmt, "MAIL FROM:<{}>", from.as_deref().unwrap_or_default())?;
                if let Some(size) = size {
                    write!(fmt, " SIZE={size}")?;
                }
                Ok(())
            }
            Self::RcptTo(rcpt) => write!(fmt, "RCPT TO:<{rcpt}>"),
            Self::Data => fmt.write_str("DATA"),
            Self::Rset => fmt.write_str("RSET"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::StartTls => fmt.write_str("STARTTLS"),
            // Never log credentials
            Self::Auth { mechanism, initial } => write!(
                fmt,
                "AUTH {mechanism}{}",
                if initial.is_some() { " <redacted>" } else { "" }
            ),
            Self::Invalid(s) | Self::Unknown(s) => fmt.write_str(s),
        }
    }
}

/// Split `<path> PARAMS...` into the path (without brackets) and the
/// remaining parameters.
fn split_path(args: &str) -> Option<(&str, &str)> {
    let args = args.trim();

    if let Some(rest) = args.strip_prefix('<') {
        let end = rest.find('>')?;
        Some((rest[..end].trim(), rest[end + 1..].trim()))
    } else {
        Some(args.split_once(' ').unwrap_or((args, "")))
    }
}

fn mailbox(path: &str) -> Option<String> {
    if !path.contains('@') {
        return None;
    }

    match mailparse::addrparse(path).ok()?.first()? {
        MailAddr::Single(single) => Some(single.addr.clone()),
        MailAddr::Group(_) => None,
    }
}

impl Command {
    fn mail_from(command: &str, args: &str) -> Result<Self, Self> {
        if args.trim().is_empty() {
            return Err(Self::Invalid(command.to_owned()));
        }

        let (path, params) = split_path(args).ok_or_else(|| Self::Invalid(command.to_owned()))?;

        let from = if path.is_empty() {
            None
        } else {
            Some(mailbox(path).ok_or_else(|| Self::Invalid(command.to_owned()))?)
        };

        let mut size = None;
        for param in params.split_whitespace() {
            if let Some((key, value)) = param.split_once('=') {
                if key.eq_ignore_ascii_case("SIZE") {
                    size = Some(
                        value
                            .parse()
                            .map_err(|_| Self::Invalid(command.to_owned()))?,
                    );
                }
            }
        }

        Ok(Self::MailFrom { from, size })
    }

    fn rcpt_to(command: &str, args: &str) -> Result<Self, Self> {
        split_path(args)
            .and_then(|(path, _)| {
                // RFC 5321 section 4.5.1: the bare postmaster mailbox is always accepted
                if path.eq_ignore_ascii_case("postmaster") {
                    Some(path.to_string())
                } else {
                    mailbox(path)
                }
            })
            .map(Self::RcptTo)
            .ok_or_else(|| Self::Invalid(command.to_owned()))
    }
}

impl TryFrom<&str> for Command {
    type Error = Self;

    fn try_from(command: &str) -> Result<Self, Self::Error> {
        let command = command.trim_end_matches(['\r', '\n']);
        let comm = command.to_ascii_uppercase();
        let comm = comm.trim();

        if comm.starts_with("MAIL FROM:") {
            Self::mail_from(command, &command.trim_start()[10..])
        } else if comm.starts_with("RCPT TO:") {
            Self::rcpt_to(command, &command.trim_start()[8..])
        } else if comm.starts_with("EHLO") || comm.starts_with("HELO") {
            match command.trim().split_once(' ') {
                Some((_, host)) if !host.trim().is_empty() => {
                    let host = host.trim().to_string();
                    Ok(Self::Helo(if comm.starts_with('H') {
                        HeloVariant::Helo(host)
                    } else {
                        HeloVariant::Ehlo(host)
                    }))
                }
                _ => Err(Self::Invalid(format!("Expected hostname in {comm}"))),
            }
        } else if comm == "AUTH" || comm.starts_with("AUTH ") {
            let mut args = command.trim()[4..].split_whitespace();
            match (args.next(), args.next(), args.next()) {
                (Some(mechanism), initial, None) => Ok(Self::Auth {
                    mechanism: mechanism.to_ascii_uppercase(),
                    initial: initial.map(str::to_string),
                }),
                _ => Err(Self::Invalid("AUTH".to_string())),
            }
        } else {
            // NOOP may carry an ignored argument
            match comm.split_whitespace().next().unwrap_or_default() {
                "DATA" if comm == "DATA" => Ok(Self::Data),
                "RSET" if comm == "RSET" => Ok(Self::Rset),
                "QUIT" if comm == "QUIT" => Ok(Self::Quit),
                "STARTTLS" if comm == "STARTTLS" => Ok(Self::StartTls),
                "NOOP" => Ok(Self::Noop),
                "DATA" | "RSET" | "QUIT" | "STARTTLS" => Err(Self::Invalid(command.to_owned())),
                _ => Err(Self::Unknown(command.to_owned())),
            }
        }
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = Self;

    fn try_from(command: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(command).map_or(
            Err(Self::Invalid("Unable to interpret command".to_string())),
            Self::try_from,
        )
    }
}

impl TryFrom<String> for Command {
    type Error = Self;

    fn try_from(command: String) -> Result<Self, Self::Error> {
        Self::try_from(command.as_str())
    }
}
