//! Error types for `civic-core`.
//!
//! Every variant belongs to exactly one [`ErrorKind`]; callers decide on
//! retries and HTTP statuses from the kind, never from the message.

use thiserror::Error;

use crate::{
  ids::{GroupId, IdeaId, UserId},
  idea::IdeaStatus,
};

#[derive(Debug, Error)]
pub enum Error {
  // ── Validation ────────────────────────────────────────────────────────
  #[error("invalid input: {0}")]
  Validation(String),

  #[error("idea not found: {0}")]
  IdeaNotFound(IdeaId),

  #[error("group not found: {0}")]
  GroupNotFound(GroupId),

  #[error("user not found: {0}")]
  UserNotFound(UserId),

  #[error("invite not found")]
  InviteNotFound,

  #[error("unknown point action: {0:?}")]
  UnknownAction(String),

  // ── Authorization ─────────────────────────────────────────────────────
  #[error("not allowed: {0}")]
  Forbidden(String),

  // ── State conflicts ───────────────────────────────────────────────────
  #[error("invalid transition: idea is {current}, cannot move to {target}")]
  InvalidTransition {
    current: IdeaStatus,
    target:  IdeaStatus,
  },

  #[error("circular reference: idea {idea} cannot be placed under {parent}")]
  CircularReference { idea: IdeaId, parent: IdeaId },

  #[error("conflict: {0}")]
  Conflict(String),

  // ── Ledger rejections ─────────────────────────────────────────────────
  #[error("cooldown active for {action} ({hours}h window)")]
  CooldownActive { action: String, hours: u32 },

  #[error("daily limit of {limit} reached for {action}")]
  DailyLimitReached { action: String, limit: u32 },

  // ── External collaborators ────────────────────────────────────────────
  #[error("AI collaborator unavailable: {0}")]
  AiUnavailable(String),

  // ── Internal ──────────────────────────────────────────────────────────
  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Coarse classification used for retry decisions and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Rejected before any mutation; safe to retry after correction.
  Validation,
  /// Never retried; surfaced verbatim.
  Authorization,
  /// Business-rule terminal.
  StateConflict,
  /// Cooldown or daily cap; a normal rejection, not a fault.
  RaceCondition,
  /// AI or notification collaborator failure.
  ExternalService,
  Internal,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_)
      | Self::IdeaNotFound(_)
      | Self::GroupNotFound(_)
      | Self::UserNotFound(_)
      | Self::InviteNotFound
      | Self::UnknownAction(_) => ErrorKind::Validation,
      Self::Forbidden(_) => ErrorKind::Authorization,
      Self::InvalidTransition { .. }
      | Self::CircularReference { .. }
      | Self::Conflict(_) => ErrorKind::StateConflict,
      Self::CooldownActive { .. } | Self::DailyLimitReached { .. } => {
        ErrorKind::RaceCondition
      }
      Self::AiUnavailable(_) => ErrorKind::ExternalService,
      Self::Storage(_) | Self::Serialization(_) => ErrorKind::Internal,
    }
  }

  /// `true` for the not-found family of validation errors.
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::IdeaNotFound(_)
        | Self::GroupNotFound(_)
        | Self::UserNotFound(_)
        | Self::InviteNotFound
    )
  }

  pub fn forbidden(msg: impl Into<String>) -> Self {
    Self::Forbidden(msg.into())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Lifts a backend result into a core [`Result`].
pub trait ResultExt<T> {
  fn err_into(self) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
  fn err_into(self) -> Result<T> { self.map_err(Into::into) }
}
