//! Reply parsing for the client side of a session.

use super::error::{ClientError, Result};

/// One physical line of a reply: `250-SIZE 1000` or `250 OK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// `false` when the code is followed by `-` and more lines follow.
    pub is_last: bool,
    pub message: String,
}

impl ResponseLine {
    /// Split a line without its terminator into code, separator and text.
    ///
    /// # Errors
    ///
    /// [`ClientError::ParseError`] unless the line starts with three digits
    /// followed by nothing, a space or a dash.
    pub fn parse(line: &str) -> Result<Self> {
        let bad = || ClientError::ParseError(format!("malformed reply line '{line}'"));

        let digits = line.get(..3).ok_or_else(bad)?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let code = digits.parse().map_err(|_| bad())?;

        let (is_last, message) = match line.as_bytes().get(3) {
            None => (true, ""),
            Some(b' ') => (true, &line[4..]),
            Some(b'-') => (false, &line[4..]),
            Some(_) => return Err(bad()),
        };

        Ok(Self {
            code,
            is_last,
            message: message.to_string(),
        })
    }
}

/// A complete reply; multi-line replies keep one entry per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Text of every line, newline separated.
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Pass the reply through when its first digit is `class`.
    pub fn expect_class(self, class: u16) -> Result<Self> {
        if self.code / 100 == class {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    /// Pass the reply through when it carries exactly `code`.
    pub fn expect_code(self, code: u16) -> Result<Self> {
        if self.code == code {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    pub fn into_error(self) -> ClientError {
        ClientError::SmtpError {
            code: self.code,
            message: self.message(),
        }
    }

    /// Take the first complete reply off the front of `buffer`.
    ///
    /// Returns the reply with the number of bytes it spanned, or `None` while
    /// the final line has not arrived yet. Bytes after the reply are left for
    /// the next call.
    ///
    /// # Errors
    ///
    /// [`ClientError::ParseError`] for malformed lines or when the lines of
    /// one reply disagree on the code.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut code = None;
        let mut offset = 0;

        while let Some(end) = buffer[offset..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[offset..offset + end];
            offset += end + 1;

            let text = std::str::from_utf8(raw)?.trim_end_matches('\r');
            if text.is_empty() {
                continue;
            }

            let line = ResponseLine::parse(text)?;
            if *code.get_or_insert(line.code) != line.code {
                return Err(ClientError::ParseError(format!(
                    "reply mixes codes {} and {}",
                    code.unwrap_or_default(),
                    line.code
                )));
            }

            lines.push(line.message);
            if line.is_last {
                return Ok(Some((Self::new(line.code, lines), offset)));
            }
        }

        Ok(None)
    }
}
