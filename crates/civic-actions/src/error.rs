//! Error types for the action-tag protocol.

use thiserror::Error;

use crate::ActionKind;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{action} is missing required parameter {key:?}")]
  MissingParam { action: ActionKind, key: &'static str },

  #[error("{action} has an invalid {key:?}: {value:?}")]
  InvalidParam {
    action: ActionKind,
    key:    &'static str,
    value:  String,
  },

  #[error("persona {persona:?} may not run {action}")]
  NotPermitted { action: ActionKind, persona: String },

  #[error(transparent)]
  Core(#[from] civic_core::Error),
}

impl Error {
  /// The action this error belongs to, when it was raised for one.
  pub fn action(&self) -> Option<ActionKind> {
    match self {
      Error::MissingParam { action, .. }
      | Error::InvalidParam { action, .. }
      | Error::NotPermitted { action, .. } => Some(*action),
      Error::Core(_) => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
