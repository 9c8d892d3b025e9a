//! Persistence layer.
//!
//! - `error`: storage-agnostic error kinds
//! - `models`: domain entities
//! - `sqlite`: the SQLite-backed store, sole writer to the database

mod error;
mod models;
mod sqlite;


pub use error::{DbError, DbResult};
pub use models::*;
pub use sqlite::SqliteStore;
