//! Parsed view of a raw email
//!
//! The store never keeps a parsed envelope around: every retrieval re-parses
//! the stored payload through [`EnvelopeParser`].

pub mod html;
pub mod parser;
pub mod types;
pub mod unsubscribe;

pub use parser::EnvelopeParser;
pub use types::{Address, Envelope, Part};
pub use unsubscribe::ListUnsubscribe;
