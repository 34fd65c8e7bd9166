//! mailbox-rs: storage engine for captured email
//!
//! Ingests raw messages, keeps a structured summary next to the zstd
//! compressed original, and serves listing, search, tags, read state and
//! retention over a single SQLite connection.
//!
//! # Features
//!
//! - **Lossless storage**: the raw bytes of every message are kept and
//!   re-parsed on retrieval
//! - **Consistency**: summary, payload and tags change in one transaction
//! - **Search**: field prefixes, tags, read state and date ranges
//! - **Retention**: count and age limits applied by a background loop
//!
//! # Example
//!
//! ```no_run
//! use mailbox_rs::config::Config;
//! use mailbox_rs::store::Mailbox;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mailbox = Mailbox::open(Config::ephemeral()).await?;
//!
//!     let id = mailbox
//!         .store(b"From: a@example.com\r\nSubject: Hi\r\n\r\nHello")
//!         .await?;
//!     let message = mailbox.get_message(&id).await?;
//!     println!("{}", message.subject);
//!
//!     mailbox.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`envelope`]: Parsed view of a raw email
//! - [`storage`]: SQLite engine and payload codec
//! - [`store`]: The mailbox operations
//! - [`notify`]: Event and webhook sinks

pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{MailError, Result};
pub use store::Mailbox;
