//! SQLite backend for the civic deliberation engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each trait method runs one synchronous
//! function from the `ideas`, `groups`, `invites`, `users`, or `ledger`
//! modules inside a single SQLite transaction.

mod encode;
mod groups;
mod ideas;
mod invites;
mod ledger;
mod schema;
mod store;
mod users;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
