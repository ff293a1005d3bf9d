//! Transfer and header encodings used when serialising a message.

use std::fmt::Write as _;

use base64::{Engine, engine::general_purpose::STANDARD};
use mailparse::MailAddr;

/// Maximum length of an encoded body line, excluding CRLF (RFC 2045).
const BASE64_LINE: usize = 76;

/// Raw bytes carried by a single RFC 2047 encoded-word. 45 bytes become 60
/// base64 characters, which keeps the word under the 75 character limit.
const ENCODED_WORD_BYTES: usize = 45;

/// Longest line allowed in a `7bit` body (RFC 5322 section 2.1.1).
pub(super) const MAX_7BIT_LINE: usize = 998;

/// Base64 encode `data` into CRLF terminated lines of 76 characters.
pub fn base64_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE * 2 + 2);

    for chunk in encoded.as_bytes().chunks(BASE64_LINE) {
        // base64 output is always ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push_str("\r\n");
    }

    out
}

/// Convert bare `\n` and `\r` line breaks to CRLF.
pub fn normalize_crlf(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 32);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\r\n");
            }
            '\n' => out.push_str("\r\n"),
            c => out.push(c),
        }
    }

    out
}

/// Encode a header value as RFC 2047 `B` encoded-words when it contains
/// anything outside ASCII. Words are split on character boundaries and
/// folded onto continuation lines.
pub fn encode_word(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut start = 0;

    for (idx, c) in value.char_indices() {
        if idx + c.len_utf8() - start > ENCODED_WORD_BYTES {
            words.push(&value[start..idx]);
            start = idx;
        }
    }
    words.push(&value[start..]);

    words
        .into_iter()
        .map(|word| format!("=?utf-8?b?{}?=", STANDARD.encode(word)))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Encode the display names of an address list header, leaving the
/// addresses themselves untouched.
///
/// Falls back to [`encode_word`] on the whole value if it cannot be parsed as
/// an address list.
pub fn encode_address_list(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let Ok(list) = mailparse::addrparse(value) else {
        return encode_word(value);
    };

    let mailbox = |name: Option<&String>, addr: &str| match name {
        Some(name) if !name.is_empty() => format!("{} <{addr}>", encode_word(name)),
        _ => addr.to_string(),
    };

    list.iter()
        .map(|entry| match entry {
            MailAddr::Single(single) => mailbox(single.display_name.as_ref(), &single.addr),
            MailAddr::Group(group) => format!(
                "{}: {};",
                encode_word(&group.group_name),
                group
                    .addrs
                    .iter()
                    .map(|single| mailbox(single.display_name.as_ref(), &single.addr))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a `filename` parameter, using the RFC 2231 extended form for names
/// outside ASCII.
pub fn filename_param(filename: &str) -> String {
    if filename.is_ascii() {
        let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
        return format!("filename=\"{escaped}\"");
    }

    let mut encoded = String::with_capacity(filename.len() * 3);
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }

    format!("filename*=utf-8''{encoded}")
}
