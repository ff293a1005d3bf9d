//! How long either side waits on the other.
//!
//! The capture server uses the RFC 5321 section 4.5.3.2 minimums; the sender
//! uses shorter values so a wedged local server is reported quickly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `[timeouts]` in `smtpd.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTimeouts {
    /// Idle time allowed while waiting for the next command.
    #[serde(default = "defaults::idle")]
    pub command_secs: u64,
    /// Idle time allowed between lines of a DATA transfer.
    #[serde(default = "defaults::data_line")]
    pub data_block_secs: u64,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            command_secs: defaults::idle(),
            data_block_secs: defaults::data_line(),
        }
    }
}

impl ServerTimeouts {
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub const fn data_block(&self) -> Duration {
        Duration::from_secs(self.data_block_secs)
    }
}

/// `[timeouts]` in the sender's TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientTimeouts {
    /// TCP connect.
    #[serde(default = "defaults::reply")]
    pub connect_secs: u64,
    /// Any single command/reply exchange, including the TLS handshake.
    #[serde(default = "defaults::reply")]
    pub command_secs: u64,
    /// Writing the message and waiting for the final `250`.
    #[serde(default = "defaults::transfer")]
    pub data_secs: u64,
    #[serde(default = "defaults::goodbye")]
    pub quit_secs: u64,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::reply(),
            command_secs: defaults::reply(),
            data_secs: defaults::transfer(),
            quit_secs: defaults::goodbye(),
        }
    }
}

impl ClientTimeouts {
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

mod defaults {
    pub const fn idle() -> u64 {
        5 * 60
    }
    pub const fn data_line() -> u64 {
        3 * 60
    }

    pub const fn reply() -> u64 {
        30
    }
    pub const fn transfer() -> u64 {
        2 * 60
    }
    pub const fn goodbye() -> u64 {
        10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_uses_rfc_minimums() {
        let timeouts = ServerTimeouts::default();
        assert_eq!(timeouts.command(), Duration::from_secs(300));
        assert_eq!(timeouts.data_block(), Duration::from_secs(180));
    }

    #[test]
    fn missing_keys_fall_back() {
        let server: ServerTimeouts = toml::from_str("command_secs = 5").unwrap();
        assert_eq!(server.command(), Duration::from_secs(5));
        assert_eq!(server.data_block(), Duration::from_secs(180));

        let client: ClientTimeouts = toml::from_str("connect_secs = 2").unwrap();
        assert_eq!(client.connect(), Duration::from_secs(2));
        assert_eq!(client.command(), Duration::from_secs(30));
        assert_eq!(client.data(), Duration::from_secs(120));
        assert_eq!(client.quit(), Duration::from_secs(10));
    }
}
