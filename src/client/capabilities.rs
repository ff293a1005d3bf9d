use super::Response;

/// Authentication mechanisms the client knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
    Login,
}

impl Mechanism {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

/// ESMTP extensions advertised in an EHLO response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub starttls: bool,
    /// Mechanisms listed after `AUTH`, upper-cased.
    pub auth: Vec<String>,
    /// Declared maximum message size; `Some(0)` means no limit.
    pub size: Option<usize>,
}

impl Capabilities {
    /// Reads the extension lines of an EHLO response. The first line is the
    /// server's greeting and is skipped.
    pub fn from_ehlo(response: &Response) -> Self {
        let mut capabilities = Self::default();

        for line in response.lines.iter().skip(1) {
            let mut words = line.split_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };

            match keyword.to_ascii_uppercase().as_str() {
                "STARTTLS" => capabilities.starttls = true,
                "AUTH" => capabilities
                    .auth
                    .extend(words.map(str::to_ascii_uppercase)),
                "SIZE" => {
                    capabilities.size = Some(words.next().and_then(|n| n.parse().ok()).unwrap_or(0));
                }
                _ => {}
            }
        }

        capabilities
    }

    pub fn supports_auth(&self, mechanism: Mechanism) -> bool {
        self.auth.iter().any(|m| m == mechanism.as_str())
    }

    /// PLAIN when offered, LOGIN otherwise.
    pub fn preferred_auth(&self) -> Option<Mechanism> {
        [Mechanism::Plain, Mechanism::Login]
            .into_iter()
            .find(|&m| self.supports_auth(m))
    }
}
