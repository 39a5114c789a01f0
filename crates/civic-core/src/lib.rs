//! Core types, business rules, and trait definitions for the civic
//! deliberation engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. Storage
//! backends implement the traits in [`store`]; the text-generation and
//! notification collaborators implement the traits in [`collab`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod collab;
pub mod error;
pub mod graph;
pub mod group;
pub mod ids;
pub mod identity;
pub mod idea;
pub mod invite;
pub mod ledger;
pub mod status;
pub mod store;
pub mod synthesis;

pub use error::{Error, ErrorKind, Result, ResultExt};
pub use ids::{GroupId, IdeaId, SessionId, UserId};
