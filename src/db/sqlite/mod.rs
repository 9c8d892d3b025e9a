//! SQLite implementation of the store.
//!
//! One file per entity; each file is an `impl SqliteStore` block. All
//! multi-row mutations run in a single transaction.

mod activity;
mod attachment;
mod comment;
mod connection;
mod dependency;
mod epic;
mod helpers;
mod label;
mod project;
mod task;
mod token;
mod user;

#[cfg(test)]
mod dependency_test;

pub use connection::SqliteStore;
