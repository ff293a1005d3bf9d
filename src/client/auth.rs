use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// Username and password used for AUTH.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The `AUTH PLAIN` initial response: `base64("\0user\0pass")`.
    pub fn plain_token(&self) -> String {
        STANDARD.encode(format!("\0{}\0{}", self.username, self.password))
    }

    pub fn login_username(&self) -> String {
        STANDARD.encode(&self.username)
    }

    pub fn login_password(&self) -> String {
        STANDARD.encode(&self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_token() {
        let credentials = Credentials::new("alice", "secret");
        assert_eq!(credentials.plain_token(), "AGFsaWNlAHNlY3JldA==");
    }

    #[test]
    fn login_tokens() {
        let credentials = Credentials::new("alice", "secret");
        assert_eq!(credentials.login_username(), "YWxpY2U=");
        assert_eq!(credentials.login_password(), "c2VjcmV0");
    }

    #[test]
    fn debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("alice", "secret"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("secret"));
    }
}
