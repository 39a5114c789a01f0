//! Integration tests for `SqliteStore` against an in-memory database.

mod groups;
mod ideas;
mod invites;
mod ledger;
mod synthesis;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use civic_core::{
  collab::{GenerationError, GenerationRequest, Notifier, TextGenerator},
  group::{AccessLevel, Group, NewGroup},
  identity::{Actor, NewUser, User, VerificationTier},
  store::{GroupStore, UserStore},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn user(s: &SqliteStore, handle: &str, tier: VerificationTier) -> User {
  s.create_user(NewUser {
    handle: handle.into(),
    email: Some(format!("{handle}@example.com")),
    email_verified: tier >= VerificationTier::Remembered,
    tier,
  })
  .await
  .unwrap()
}

async fn citizen(s: &SqliteStore, handle: &str) -> (User, Actor) {
  let u = user(s, handle, VerificationTier::Remembered).await;
  let actor = u.actor();
  (u, actor)
}

async fn group(s: &SqliteStore, creator: &Actor, name: &str, level: AccessLevel) -> Group {
  let input = NewGroup { access_level: level, ..NewGroup::new(name) };
  s.create_group(input, creator.clone()).await.unwrap()
}

/// Unwrap to the core error for kind and variant assertions.
fn core_err(err: Error) -> civic_core::Error { err.into() }

/// Replays canned replies in order and records every request.
#[derive(Default)]
struct ScriptedGenerator {
  replies:  Mutex<Vec<Result<String, GenerationError>>>,
  requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
  fn new(replies: impl IntoIterator<Item = Result<String, GenerationError>>) -> Arc<Self> {
    let mut replies: Vec<_> = replies.into_iter().collect();
    replies.reverse();
    Arc::new(Self { replies: Mutex::new(replies), ..Self::default() })
  }

  fn silent() -> Arc<Self> { Self::new(Vec::new()) }

  fn request_count(&self) -> usize { self.requests.lock().unwrap().len() }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
  fn model(&self) -> &str { "scripted" }

  async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
    self.requests.lock().unwrap().push(request);
    self
      .replies
      .lock()
      .unwrap()
      .pop()
      .unwrap_or(Err(GenerationError::Empty))
  }
}

/// Records messages; fails delivery to any address in `bounce`.
#[derive(Default)]
struct RecordingNotifier {
  sent:   Mutex<Vec<(String, String, String)>>,
  bounce: Vec<String>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
    if self.bounce.iter().any(|b| b == to) {
      return false;
    }
    self
      .sent
      .lock()
      .unwrap()
      .push((to.into(), subject.into(), body.into()));
    true
  }
}
