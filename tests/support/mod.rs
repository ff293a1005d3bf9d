//! Test support: an in-process capture server and a scripted SMTP server.

#![allow(dead_code)] // Not every test binary uses every helper

pub mod harness;
pub mod mock_server;

pub use harness::{CaptureServer, StoredMail};
pub use mock_server::{MockSmtpServer, SmtpCommand};
