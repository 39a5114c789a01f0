//! External collaborators: text generation and notification delivery.
//!
//! Both are used behind `Arc<dyn ..>` so the server can pick an
//! implementation at startup, which is why they use `async_trait` rather than
//! native async trait methods.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Error;

// ─── Text generation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
  User,
  Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
  pub speaker: Speaker,
  pub text:    String,
}

impl Turn {
  pub fn user(text: impl Into<String>) -> Self {
    Self { speaker: Speaker::User, text: text.into() }
  }

  pub fn assistant(text: impl Into<String>) -> Self {
    Self { speaker: Speaker::Assistant, text: text.into() }
  }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
  pub system_prompt: String,
  pub history:       Vec<Turn>,
  /// Upper bound on generated tokens.
  pub max_tokens:    u32,
}

#[derive(Debug, Error)]
pub enum GenerationError {
  #[error("request timed out")]
  Timeout,

  #[error("transport failure: {0}")]
  Transport(String),

  #[error("provider rejected the request: {status}: {message}")]
  Rejected { status: u16, message: String },

  #[error("provider returned no text")]
  Empty,
}

impl From<GenerationError> for Error {
  fn from(e: GenerationError) -> Self { Error::AiUnavailable(e.to_string()) }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
  /// Model identifier, for logging and provenance.
  fn model(&self) -> &str;

  async fn generate(
    &self,
    request: GenerationRequest,
  ) -> Result<String, GenerationError>;
}

// ─── Notification ────────────────────────────────────────────────────────────

#[async_trait]
pub trait Notifier: Send + Sync {
  /// Fire-and-forget delivery. Returns `false` on failure; callers must
  /// tolerate it.
  async fn send(&self, to: &str, subject: &str, body: &str) -> bool;
}
