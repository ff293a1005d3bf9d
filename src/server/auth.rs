use std::{collections::HashMap, path::Path};

use crate::error::AuthError;

/// Username/password pairs accepted by AUTH.
///
/// Loaded from a file with one `username:password` pair per line. Blank lines
/// and lines starting with `#` are ignored; surrounding whitespace is trimmed.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    credentials: HashMap<String, String>,
}

impl Authenticator {
    /// An authenticator that rejects everyone.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| AuthError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        contents.parse()
    }

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.credentials
            .get(username)
            .is_some_and(|stored| stored == password)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

impl std::str::FromStr for Authenticator {
    type Err = AuthError;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        let mut credentials = HashMap::new();

        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split(':');
            let (Some(username), Some(password), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(AuthError::InvalidLine {
                    line: idx + 1,
                    reason: "expected username:password",
                });
            };

            let (username, password) = (username.trim(), password.trim());
            if username.is_empty() || password.is_empty() {
                return Err(AuthError::InvalidLine {
                    line: idx + 1,
                    reason: "username and password cannot be empty",
                });
            }

            credentials.insert(username.to_string(), password.to_string());
        }

        Ok(Self { credentials })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_format() {
        let auth: Authenticator = "# users\n\nalice:secret\n  bob : hunter2  \n"
            .parse()
            .unwrap();

        assert_eq!(auth.len(), 2);
        assert!(auth.authenticate("alice", "secret"));
        assert!(auth.authenticate("bob", "hunter2"));
        assert!(!auth.authenticate("alice", "wrong"));
        assert!(!auth.authenticate("carol", "secret"));
    }

    #[test]
    fn reports_line_numbers() {
        let err = "alice:secret\n# fine\nbroken\n"
            .parse::<Authenticator>()
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidLine { line: 3, .. }));

        let err = "a:b:c".parse::<Authenticator>().unwrap_err();
        assert!(matches!(err, AuthError::InvalidLine { line: 1, .. }));

        let err = "\n:nopass".parse::<Authenticator>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid format at line 2: username and password cannot be empty"
        );
    }

    #[test]
    fn empty_rejects_everyone() {
        assert!(!Authenticator::empty().authenticate("", ""));
    }

    #[test]
    fn load_missing_file() {
        let err = Authenticator::load("/no/such/users.txt").unwrap_err();
        assert!(matches!(err, AuthError::Io { .. }));
    }
}
