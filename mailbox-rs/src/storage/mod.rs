//! Storage engine
//!
//! - [`database`]: the single-connection SQLite handle, migrations and
//!   ephemeral-file lifecycle
//! - [`activity`]: last-activity, idle and deleted-bytes tracking
//! - [`codec`]: zstd compression of raw payloads

pub mod activity;
pub mod codec;
pub mod database;

pub use activity::Activity;
pub use codec::PayloadCodec;
pub use database::Database;
