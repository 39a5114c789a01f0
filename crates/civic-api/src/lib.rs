//! JSON REST API for the civic deliberation engine.
//!
//! Exposes an axum [`Router`] backed by any store implementing the
//! [`civic_core::store`] traits. Identity comes from request headers (see
//! [`caller`]); TLS and credential issuance are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", civic_api::api_router(state))
//! ```

pub mod caller;
pub mod chat;
pub mod error;
pub mod groups;
pub mod ideas;
pub mod invites;
pub mod points;
pub mod synthesis;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, patch, post, put},
};
use civic_actions::{Clerk, Personas};
use civic_core::{
  collab::{Notifier, TextGenerator},
  identity::Actor,
  ledger::{Award, Ledger, PointActions, PointContext},
  store::{GroupStore, IdeaStore, LedgerStore, UserStore},
  synthesis::Synthesizer,
};
use serde::Serialize;
use tracing::debug;

pub use caller::Caller;
pub use error::ApiError;

/// Every store trait the API needs, in one bound.
pub trait CivicStore:
  UserStore + IdeaStore + GroupStore + LedgerStore + Send + Sync + 'static
{
}

impl<T> CivicStore for T where
  T: UserStore + IdeaStore + GroupStore + LedgerStore + Send + Sync + 'static
{
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:       Arc<S>,
  pub ledger:      Ledger<S>,
  pub synthesizer: Synthesizer<S>,
  pub clerk:       Clerk<S>,
  pub personas:    Arc<Personas>,
  pub notifier:    Arc<dyn Notifier>,
  /// Base URL for links in invitation messages.
  pub public_url:  Arc<str>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:       self.store.clone(),
      ledger:      self.ledger.clone(),
      synthesizer: self.synthesizer.clone(),
      clerk:       self.clerk.clone(),
      personas:    self.personas.clone(),
      notifier:    self.notifier.clone(),
      public_url:  self.public_url.clone(),
    }
  }
}

impl<S: CivicStore> ApiState<S> {
  pub fn new(
    store: Arc<S>,
    generator: Arc<dyn TextGenerator>,
    notifier: Arc<dyn Notifier>,
    actions: Arc<PointActions>,
    public_url: &str,
  ) -> Self {
    Self {
      ledger: Ledger::new(store.clone(), actions),
      synthesizer: Synthesizer::new(store.clone(), generator.clone()),
      clerk: Clerk::new(store.clone(), generator),
      personas: Arc::new(Personas::default()),
      notifier,
      public_url: Arc::from(public_url),
      store,
    }
  }

  pub fn with_personas(mut self, personas: Personas) -> Self {
    self.personas = Arc::new(personas);
    self
  }

  pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
    self.synthesizer = self.synthesizer.with_max_tokens(max_tokens);
    self.clerk = self.clerk.with_max_tokens(max_tokens);
    self
  }

  /// Award `action` for something `actor` just did. Ledger rejections never
  /// fail the request; the points credited are returned.
  pub(crate) async fn reward(
    &self,
    actor: &Actor,
    action: &str,
    context: PointContext,
  ) -> i64 {
    match self.ledger.award(actor.identity(), action, context).await {
      Ok(Award::Credited { points, .. }) => points,
      Ok(Award::Skipped) => 0,
      Err(e) => {
        debug!(action, error = %e, "no points awarded");
        0
      }
    }
  }
}

/// A response body together with the points its action earned.
#[derive(Debug, Serialize)]
pub struct Rewarded<T> {
  #[serde(flatten)]
  pub item:           T,
  pub points_awarded: i64,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S: CivicStore>(state: ApiState<S>) -> Router<()> {
  Router::new()
    // Identity and points
    .route("/me", get(points::me::<S>))
    .route("/users", post(points::signup::<S>))
    .route("/points", get(points::summary::<S>))
    .route("/points/claim", post(points::claim::<S>))
    .route("/points/visit", post(points::visit::<S>))
    // Ideas
    .route("/ideas", get(ideas::list::<S>).post(ideas::create::<S>))
    .route(
      "/ideas/{id}",
      get(ideas::get_one::<S>)
        .patch(ideas::edit::<S>)
        .delete(ideas::delete::<S>),
    )
    .route("/ideas/{id}/thread", get(ideas::thread::<S>))
    .route("/ideas/{id}/parent", put(ideas::set_parent::<S>))
    .route("/ideas/{id}/promote", post(ideas::promote::<S>))
    .route("/ideas/{id}/shareable", put(ideas::shareable::<S>))
    .route("/ideas/{id}/tags", post(ideas::tag::<S>))
    .route("/ideas/{id}/votes", get(ideas::tally::<S>).post(ideas::vote::<S>))
    .route("/ideas/{id}/links", get(ideas::links::<S>).post(ideas::link::<S>))
    .route("/ideas/{id}/sources", get(synthesis::sources::<S>))
    .route("/ideas/{id}/staleness", get(synthesis::staleness::<S>))
    // Groups
    .route("/groups", get(groups::list::<S>).post(groups::create::<S>))
    .route("/groups/{id}", get(groups::get_one::<S>).patch(groups::update::<S>))
    .route("/groups/{id}/join", post(groups::join::<S>))
    .route("/groups/{id}/leave", post(groups::leave::<S>))
    .route("/groups/{id}/access", get(groups::access::<S>))
    .route("/groups/{id}/members", get(groups::members::<S>))
    .route("/groups/{id}/members/{user_id}", patch(groups::update_member::<S>))
    .route("/groups/{id}/reply-links", post(groups::reply_links::<S>))
    // Invites
    .route(
      "/groups/{id}/invites",
      get(invites::list::<S>).post(invites::send::<S>),
    )
    .route("/invites/accept/{token}", post(invites::accept::<S>))
    .route("/invites/decline/{token}", post(invites::decline::<S>))
    // Synthesis
    .route("/groups/{id}/gather", post(synthesis::gather::<S>))
    .route("/groups/{id}/crystallize", post(synthesis::crystallize::<S>))
    .route("/groups/{id}/digests", get(synthesis::digests::<S>))
    .route("/groups/{id}/proposal", get(synthesis::proposal::<S>))
    .route("/groups/{id}/staleness", get(synthesis::group_staleness::<S>))
    // Chat
    .route("/personas", get(chat::personas::<S>))
    .route("/chat", post(chat::respond::<S>))
    .with_state(state)
}
