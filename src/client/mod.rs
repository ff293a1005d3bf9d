//! SMTP client used to hand a message to a server.
//!
//! The client speaks just enough ESMTP for the sender: EHLO (with a HELO
//! fallback), STARTTLS, AUTH PLAIN/LOGIN, MAIL, RCPT, DATA, RSET and QUIT.
//!
//! ```no_run
//! use smtpd::{client::SmtpClient, config::ClientTimeouts};
//!
//! # async fn example() -> Result<(), smtpd::client::ClientError> {
//! let mut client = SmtpClient::connect("127.0.0.1:2525", "localhost", ClientTimeouts::default()).await?;
//! client.read_greeting().await?;
//! client.ehlo("localhost").await?;
//! client.mail_from("your_email@example.com", None).await?;
//! client.rcpt_to("recipient_email@example.com").await?;
//! client.data().await?;
//! client.send_data("Subject: Test\r\n\r\nHello World").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod capabilities;
mod error;
mod response;
mod smtp_client;

pub use auth::Credentials;
pub use capabilities::{Capabilities, Mechanism};
pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::{SmtpClient, prepare_data};
