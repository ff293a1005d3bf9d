use std::fmt::{self, Display, Formatter};

use super::encoding::{encode_address_list, encode_word};

/// Headers whose values are address lists, so only their display names may
/// be encoded.
const ADDRESS_HEADERS: &[&str] = &["from", "to", "cc", "bcc", "reply-to", "sender"];

/// Message headers with case-insensitive, unique names.
///
/// Setting a header that already exists replaces its value in place, so the
/// first insertion decides where it is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self
            .entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes every header as `Name: value\r\n`, encoding values as needed.
impl Display for Headers {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            let value = if ADDRESS_HEADERS
                .iter()
                .any(|header| header.eq_ignore_ascii_case(name))
            {
                encode_address_list(value)
            } else {
                encode_word(value)
            };

            write!(f, "{name}: {value}\r\n")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn set_replaces_case_insensitively() {
        let mut headers = Headers::new();
        headers.set("Subject", "first");
        headers.set("To", "a@example.com");
        headers.set("SUBJECT", "second");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("subject"), Some("second"));
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec![("Subject", "second"), ("To", "a@example.com")]
        );
    }

    #[test]
    fn remove() {
        let mut headers = Headers::new();
        headers.set("X-Test", "1");

        assert_eq!(headers.remove("x-test").as_deref(), Some("1"));
        assert!(headers.is_empty());
        assert!(headers.remove("x-test").is_none());
    }

    #[test]
    fn display_encodes_values() {
        let mut headers = Headers::new();
        headers.set("From", "Zoë <zoe@example.com>");
        headers.set("Subject", "Grüße");
        headers.set("X-Plain", "ascii");

        assert_eq!(
            headers.to_string(),
            "From: =?utf-8?b?Wm/Dqw==?= <zoe@example.com>\r\n\
             Subject: =?utf-8?b?R3LDvMOfZQ==?=\r\n\
             X-Plain: ascii\r\n"
        );
    }
}
