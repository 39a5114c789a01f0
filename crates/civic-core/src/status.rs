//! The idea maturity state machine.
//!
//! `raw → refining → distilled → actionable` is linear and only moves
//! forward. `archived` is reachable from every state and absorbing.

use crate::{Error, Result, idea::IdeaStatus};

impl IdeaStatus {
  /// Position in the linear progression; `None` for `Archived`.
  pub fn rank(self) -> Option<u8> {
    match self {
      Self::Raw => Some(0),
      Self::Refining => Some(1),
      Self::Distilled => Some(2),
      Self::Actionable => Some(3),
      Self::Archived => None,
    }
  }

  /// The next linear status, if any.
  pub fn next(self) -> Option<Self> {
    match self {
      Self::Raw => Some(Self::Refining),
      Self::Refining => Some(Self::Distilled),
      Self::Distilled => Some(Self::Actionable),
      Self::Actionable | Self::Archived => None,
    }
  }
}

/// Check that `current → target` is a legal promotion.
pub fn check_promotion(current: IdeaStatus, target: IdeaStatus) -> Result<()> {
  if target == IdeaStatus::Archived {
    return Ok(());
  }
  match (current.rank(), target.rank()) {
    (Some(from), Some(to)) if to > from => Ok(()),
    _ => Err(Error::InvalidTransition { current, target }),
  }
}
