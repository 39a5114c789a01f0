//! Identifier newtypes.
//!
//! Ideas, groups, and users are addressed by database-assigned integers so
//! that AI replies can reference them as `#42`. Anonymous sessions are
//! addressed by the opaque cookie value issued outside this crate.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! int_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
      Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub i64);

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
      }
    }

    impl From<i64> for $name {
      fn from(v: i64) -> Self { Self(v) }
    }
  };
}

int_id!(
  /// Primary key of an idea.
  IdeaId
);
int_id!(
  /// Primary key of a group.
  GroupId
);
int_id!(
  /// Primary key of a registered user.
  UserId
);

/// Opaque anonymous-session identifier (cookie scoped).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
  pub fn new(s: impl Into<String>) -> Self { Self(s.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for SessionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
