//! Storage Layer - statement execution against SQLite
//!
//! Every statement runs in its own transaction: committed on success,
//! rolled back before the error is surfaced.

pub mod sqlite;

pub use sqlite::{Record, Session};
pub(crate) use sqlite::classify;
