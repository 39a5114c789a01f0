//! Identities, actors, and verification tiers.
//!
//! The core never authenticates credentials. An outer layer resolves request
//! credentials into an [`Actor`] and hands it to the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  ids::{SessionId, UserId},
  ledger::Transfer,
};

// ─── Verification ────────────────────────────────────────────────────────────

/// How strongly an account has proven who it is. Ordered from weakest to
/// strongest.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationTier {
  /// Account exists but nothing has been verified.
  #[default]
  Anonymous,
  /// Email verified.
  Remembered,
  /// Phone verified.
  Verified,
  /// Background checked (manual).
  Vetted,
}

/// Minimum tier for voting on a group's ideas as a non-member.
pub const PUBLIC_VOTE_MIN_TIER: VerificationTier = VerificationTier::Remembered;

/// Minimum tier for creating a group.
pub const GROUP_CREATE_MIN_TIER: VerificationTier = VerificationTier::Remembered;

// ─── Identity ────────────────────────────────────────────────────────────────

/// Who owns an idea or a ledger row: a registered user or an anonymous
/// session. Exactly one is ever recorded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
  User(UserId),
  Session(SessionId),
}

impl Identity {
  pub fn user_id(&self) -> Option<UserId> {
    match self {
      Self::User(id) => Some(*id),
      Self::Session(_) => None,
    }
  }

  pub fn session_id(&self) -> Option<&SessionId> {
    match self {
      Self::User(_) => None,
      Self::Session(s) => Some(s),
    }
  }
}

// ─── Actor ───────────────────────────────────────────────────────────────────

/// The resolved requester of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
  User {
    user_id: UserId,
    tier:    VerificationTier,
  },
  Anonymous {
    session_id: SessionId,
  },
}

impl Actor {
  pub fn user(user_id: UserId, tier: VerificationTier) -> Self {
    Self::User { user_id, tier }
  }

  pub fn anonymous(session_id: impl Into<String>) -> Self {
    Self::Anonymous { session_id: SessionId::new(session_id) }
  }

  pub fn user_id(&self) -> Option<UserId> {
    match self {
      Self::User { user_id, .. } => Some(*user_id),
      Self::Anonymous { .. } => None,
    }
  }

  /// The identity this actor writes under.
  pub fn identity(&self) -> Identity {
    match self {
      Self::User { user_id, .. } => Identity::User(*user_id),
      Self::Anonymous { session_id } => Identity::Session(session_id.clone()),
    }
  }

  /// Anonymous actors rank below every registered tier.
  pub fn tier(&self) -> Option<VerificationTier> {
    match self {
      Self::User { tier, .. } => Some(*tier),
      Self::Anonymous { .. } => None,
    }
  }

  /// Whether this actor's identity is `identity`.
  pub fn is(&self, identity: &Identity) -> bool {
    match (self, identity) {
      (Self::User { user_id, .. }, Identity::User(owner)) => user_id == owner,
      (Self::Anonymous { session_id }, Identity::Session(owner)) => {
        session_id == owner
      }
      _ => false,
    }
  }

  pub fn meets(&self, min: VerificationTier) -> bool {
    self.tier().is_some_and(|t| t >= min)
  }
}

// ─── User ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_id:        UserId,
  pub handle:         String,
  pub email:          Option<String>,
  pub email_verified: bool,
  pub tier:           VerificationTier,
  /// Denormalized running total; always equals the sum of the user's
  /// `points_log` rows.
  pub civic_points:   i64,
  pub created_at:     DateTime<Utc>,
}

impl User {
  pub fn actor(&self) -> Actor { Actor::user(self.user_id, self.tier) }
}

/// Input to [`crate::store::UserStore::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
  pub handle:         String,
  pub email:          Option<String>,
  pub email_verified: bool,
  pub tier:           VerificationTier,
}

/// A logged-in device session. The plaintext token is only ever available on
/// the value returned at creation; the store keeps a digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSession {
  pub token:      String,
  pub user_id:    UserId,
  pub created_at: DateTime<Utc>,
}

/// A new account with its first device session, as returned by
/// [`crate::store::UserStore::register`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
  pub user:     User,
  /// Device token for `Authorization: Bearer`. Only ever shown here.
  pub session:  DeviceSession,
  /// Points claimed from the anonymous session, if one was presented.
  pub transfer: Transfer,
}
