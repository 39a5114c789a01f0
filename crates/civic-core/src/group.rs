//! Groups, memberships, and the access-control rules that govern them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  Error, Result,
  identity::{Actor, PUBLIC_VOTE_MIN_TIER},
  idea::normalize_tags,
  ids::{GroupId, UserId},
};

// ─── Scope ───────────────────────────────────────────────────────────────────

/// Geographic reach of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum Scope {
  #[default]
  National,
  State { state_id: i64 },
  Town { state_id: i64, town_id: i64 },
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScopeLevel {
  National,
  State,
  Town,
}

impl Scope {
  pub fn level(&self) -> ScopeLevel {
    match self {
      Self::National => ScopeLevel::National,
      Self::State { .. } => ScopeLevel::State,
      Self::Town { .. } => ScopeLevel::Town,
    }
  }

  pub fn state_id(&self) -> Option<i64> {
    match self {
      Self::National => None,
      Self::State { state_id } | Self::Town { state_id, .. } => Some(*state_id),
    }
  }

  pub fn town_id(&self) -> Option<i64> {
    match self {
      Self::Town { town_id, .. } => Some(*town_id),
      _ => None,
    }
  }

  /// Rebuild a scope from its stored columns.
  pub fn from_parts(
    level: ScopeLevel,
    state_id: Option<i64>,
    town_id: Option<i64>,
  ) -> Result<Self> {
    match (level, state_id, town_id) {
      (ScopeLevel::National, _, _) => Ok(Self::National),
      (ScopeLevel::State, Some(state_id), _) => Ok(Self::State { state_id }),
      (ScopeLevel::Town, Some(state_id), Some(town_id)) => {
        Ok(Self::Town { state_id, town_id })
      }
      _ => Err(Error::Validation(format!("{level} scope is missing its ids"))),
    }
  }
}

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccessLevel {
  /// Anyone may join as a member.
  #[default]
  Open,
  /// Anyone may join, but only as an observer.
  Observable,
  /// Invite only.
  Closed,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GroupStatus {
  #[default]
  Forming,
  Active,
  Crystallizing,
  Crystallized,
  Archived,
}

impl GroupStatus {
  /// Whether a facilitator may move a group from `self` to `target`.
  pub fn can_transition_to(self, target: GroupStatus) -> bool {
    use GroupStatus::*;
    match (self, target) {
      (Forming, Active)
      | (Active, Crystallizing)
      | (Crystallizing, Crystallized)
      | (Crystallizing | Crystallized, Active)
      | (Archived, Active) => true,
      (from, Archived) => from != Archived,
      _ => false,
    }
  }

  /// Whether a crystallization run may start from this status.
  pub fn can_crystallize(self) -> bool {
    matches!(self, Self::Active | Self::Crystallizing | Self::Crystallized)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
  Facilitator,
  Member,
  Observer,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemberStatus {
  #[default]
  Active,
  Inactive,
}

// ─── Public flags ────────────────────────────────────────────────────────────

/// Non-member visibility of a group's ideas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicFlags {
  pub readable: bool,
  pub voting:   bool,
}

impl PublicFlags {
  /// Enforce `voting ⇒ readable`.
  pub fn normalized(mut self) -> Self {
    if self.voting {
      self.readable = true;
    }
    self
  }

  /// Merge a partial write into the stored flags.
  ///
  /// An explicit `readable = false` without an explicit `voting` also turns
  /// voting off; an explicit `voting = true` always wins and forces
  /// readability back on.
  pub fn merge(self, readable: Option<bool>, voting: Option<bool>) -> Self {
    let mut merged = Self {
      readable: readable.unwrap_or(self.readable),
      voting:   voting.unwrap_or(self.voting),
    };
    if readable == Some(false) && voting.is_none() {
      merged.voting = false;
    }
    merged.normalized()
  }
}

// ─── Group ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
  pub group_id:     GroupId,
  pub name:         String,
  pub description:  String,
  pub tags:         Vec<String>,
  pub scope:        Scope,
  pub access_level: AccessLevel,
  pub status:       GroupStatus,
  pub public:       PublicFlags,
  /// System-seeded civic-topic group rather than user-created.
  pub is_standard:  bool,
  pub created_by:   Option<UserId>,
  pub created_at:   DateTime<Utc>,
}

impl Group {
  pub fn is_archived(&self) -> bool { self.status == GroupStatus::Archived }
}

/// Input to [`crate::store::GroupStore::create_group`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGroup {
  pub name:         String,
  #[serde(default)]
  pub description:  String,
  #[serde(default)]
  pub tags:         Vec<String>,
  #[serde(default)]
  pub scope:        Scope,
  #[serde(default)]
  pub access_level: AccessLevel,
  #[serde(default)]
  pub public:       PublicFlags,
  #[serde(default)]
  pub is_standard:  bool,
}

impl NewGroup {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Self::default() }
  }

  pub fn validated(mut self) -> Result<Self> {
    self.name = self.name.trim().to_string();
    if self.name.is_empty() {
      return Err(Error::Validation("group name is empty".into()));
    }
    self.description = self.description.trim().to_string();
    self.tags = normalize_tags(&self.tags);
    self.public = self.public.normalized();
    Ok(self)
  }

  /// Status a freshly created group starts in.
  pub fn initial_status(&self) -> GroupStatus {
    if self.is_standard {
      GroupStatus::Active
    } else {
      GroupStatus::Forming
    }
  }
}

/// A facilitator's partial update to a group. `None` fields are left as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupUpdate {
  pub name:            Option<String>,
  pub description:     Option<String>,
  pub tags:            Option<Vec<String>>,
  pub status:          Option<GroupStatus>,
  pub public_readable: Option<bool>,
  pub public_voting:   Option<bool>,
}

impl GroupUpdate {
  /// Apply this update to `group`, checking the status transition and
  /// renormalizing the public flags.
  pub fn apply(self, mut group: Group) -> Result<Group> {
    if let Some(name) = self.name {
      let name = name.trim().to_string();
      if name.is_empty() {
        return Err(Error::Validation("group name is empty".into()));
      }
      group.name = name;
    }
    if let Some(description) = self.description {
      group.description = description.trim().to_string();
    }
    if let Some(tags) = self.tags {
      group.tags = normalize_tags(&tags);
    }
    if let Some(target) = self.status.filter(|t| *t != group.status) {
      if !group.status.can_transition_to(target) {
        return Err(Error::Conflict(format!(
          "group cannot move from {} to {target}",
          group.status
        )));
      }
      group.status = target;
    }
    group.public = group.public.merge(self.public_readable, self.public_voting);
    Ok(group)
  }
}

// ─── Membership ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
  pub group_id:  GroupId,
  pub user_id:   UserId,
  pub role:      Role,
  pub status:    MemberStatus,
  pub joined_at: DateTime<Utc>,
}

impl Membership {
  pub fn is_active(&self) -> bool { self.status == MemberStatus::Active }

  pub fn is_active_facilitator(&self) -> bool {
    self.is_active() && self.role == Role::Facilitator
  }
}

/// A facilitator's change to another member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", content = "value", rename_all = "snake_case")]
pub enum MemberChange {
  Role(Role),
  Status(MemberStatus),
  Remove,
}

impl MemberChange {
  /// Whether an active facilitator subjected to this change stops being one.
  fn ends_facilitation(self) -> bool {
    match self {
      Self::Role(role) => role != Role::Facilitator,
      Self::Status(status) => status != MemberStatus::Active,
      Self::Remove => true,
    }
  }
}

/// Role a self-service join receives under each access level.
pub fn join_role(level: AccessLevel) -> Result<Role> {
  match level {
    AccessLevel::Open => Ok(Role::Member),
    AccessLevel::Observable => Ok(Role::Observer),
    AccessLevel::Closed => {
      Err(Error::forbidden("this group is invite only"))
    }
  }
}

// ─── Access matrix ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Access {
  pub read:  bool,
  pub write: bool,
  pub vote:  bool,
}

/// Compute what `actor` may do with the ideas of `group`.
///
/// Active members always read; facilitators and members write and vote;
/// observers write nothing and vote only under the public rules. Everyone
/// else reads when the group is publicly readable, and votes when it is
/// publicly votable and their tier is at least [`PUBLIC_VOTE_MIN_TIER`].
/// Archived groups accept no writes or votes.
pub fn access_for(
  group: &Group,
  membership: Option<&Membership>,
  actor: &Actor,
) -> Access {
  let member = membership
    .filter(|m| m.is_active() && Some(m.user_id) == actor.user_id());
  let public_vote = group.public.voting && actor.meets(PUBLIC_VOTE_MIN_TIER);

  let mut access = match member.map(|m| m.role) {
    Some(Role::Facilitator | Role::Member) => {
      Access { read: true, write: true, vote: true }
    }
    Some(Role::Observer) => {
      Access { read: true, write: false, vote: public_vote }
    }
    None => Access {
      read:  group.public.readable,
      write: false,
      vote:  public_vote,
    },
  };

  if group.is_archived() {
    access.write = false;
    access.vote = false;
  }
  access
}

// ─── Facilitator succession ──────────────────────────────────────────────────

/// Outcome of checking a membership change against the facilitator rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Succession {
  /// The change leaves at least one active facilitator.
  Unaffected,
  /// Promote this member to facilitator before applying the change.
  Promote(UserId),
}

/// Check that applying `change` to `target` keeps an active facilitator.
///
/// When `target` is the sole active facilitator, picks the active
/// non-observer with the earliest `joined_at` (ties broken by user id) as
/// successor. Refused with a conflict when no successor exists. Archived
/// groups are exempt.
pub fn check_succession(
  group: &Group,
  members: &[Membership],
  target: UserId,
  change: MemberChange,
) -> Result<Succession> {
  if group.is_archived() || !change.ends_facilitation() {
    return Ok(Succession::Unaffected);
  }

  let target_is_facilitator = members
    .iter()
    .any(|m| m.user_id == target && m.is_active_facilitator());
  let others = members
    .iter()
    .filter(|m| m.user_id != target && m.is_active_facilitator())
    .count();
  if !target_is_facilitator || others > 0 {
    return Ok(Succession::Unaffected);
  }

  members
    .iter()
    .filter(|m| {
      m.user_id != target && m.is_active() && m.role == Role::Member
    })
    .min_by_key(|m| (m.joined_at, m.user_id.0))
    .map(|m| Succession::Promote(m.user_id))
    .ok_or_else(|| {
      Error::Conflict(
        "cannot remove the last facilitator: no active member can succeed"
          .into(),
      )
    })
}
