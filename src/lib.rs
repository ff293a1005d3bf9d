//! A local SMTP capture server and a client that sends test messages to it.
//!
//! - [`server`] accepts mail on a local port and stores every message as an
//!   `.eml` file with a JSON metadata header.
//! - [`message`] builds RFC 5322 / MIME messages, with or without an
//!   attachment.
//! - [`client`] and [`transport`] speak SMTP to any server, including this one.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod server;
pub mod transport;

pub use tracing;
