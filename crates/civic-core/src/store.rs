//! Storage traits and supporting query types.
//!
//! The traits are implemented by storage backends (e.g. `civic-store-sqlite`).
//! Higher layers (`civic-api`, `civic-actions`, the [`crate::synthesis`]
//! pipeline) depend on these abstractions, not on any concrete backend.
//!
//! Every mutating method is a single transaction in the backend: it either
//! applies completely or not at all. Methods that take an [`Actor`] enforce
//! the ownership and membership rules themselves.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  group::{
    Access, Group, GroupStatus, GroupUpdate, MemberChange, Membership,
    NewGroup, Role, ScopeLevel,
  },
  identity::{Actor, DeviceSession, Identity, NewUser, Registration, User},
  idea::{
    Category, DeleteMode, Idea, IdeaLink, IdeaStatus, LinkKind, NewIdea, Vote,
    VoteTally,
  },
  ids::{GroupId, IdeaId, SessionId, UserId},
  invite::{Invite, InviteDecision, IssuedInvite, Resolution},
  ledger::{Award, PointAction, PointContext, PointLogEntry, Reconciliation, Transfer},
};

// ─── Query types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
  /// Newest first.
  #[default]
  Recent,
  /// Oldest first, for thread views.
  Chronological,
}

/// Parameters for [`IdeaStore::list_ideas`]. Soft-deleted ideas are never
/// returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeaQuery {
  pub owner:         Option<Identity>,
  pub group_id:      Option<GroupId>,
  /// Only ideas outside any group.
  pub personal_only: bool,
  pub category:      Option<Category>,
  /// Skip ideas of this category.
  pub exclude:       Option<Category>,
  pub status:        Option<IdeaStatus>,
  /// Created at or after this instant.
  pub since:         Option<DateTime<Utc>>,
  pub parent_id:     Option<IdeaId>,
  /// Exclude clerk-authored ideas.
  pub human_only:    bool,
  pub order:         Order,
  pub limit:         Option<usize>,
  pub offset:        Option<usize>,
}

impl IdeaQuery {
  pub fn in_group(group_id: GroupId) -> Self {
    Self { group_id: Some(group_id), ..Self::default() }
  }

  /// Direct children of `parent`, oldest first.
  pub fn thread(parent: IdeaId) -> Self {
    Self {
      parent_id: Some(parent),
      order: Order::Chronological,
      ..Self::default()
    }
  }
}

/// Parameters for [`GroupStore::list_groups`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupQuery {
  /// Only groups where this user has an active membership.
  pub member:   Option<UserId>,
  /// With `member`: only memberships of this role.
  pub role:     Option<Role>,
  pub level:    Option<ScopeLevel>,
  pub state_id: Option<i64>,
  pub town_id:  Option<i64>,
  pub status:   Option<GroupStatus>,
  pub limit:    Option<usize>,
  pub offset:   Option<usize>,
}

/// One page of a listing. `total` counts every match, ignoring pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
  pub items:  Vec<T>,
  pub total:  u64,
  pub offset: usize,
}

/// A digest or proposal together with the ideas it summarized.
#[derive(Debug, Clone)]
pub struct SynthesisRecord {
  /// Clerk-authored idea to write.
  pub idea:         NewIdea,
  pub sources:      Vec<IdeaId>,
  /// Group status to set in the same transaction.
  pub group_status: Option<GroupStatus>,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Error type shared by every store trait of one backend.
pub trait Backend: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;
}

pub trait UserStore: Backend {
  fn create_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Case-insensitive lookup.
  fn find_user_by_email(
    &self,
    email: String,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Issue a new device session. The plaintext token is returned once.
  fn create_device_session(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<DeviceSession, Self::Error>> + Send + '_;

  /// Create an account and its first device session, and claim `claim`'s
  /// unclaimed points for it. Nothing is kept if any step fails.
  fn register(
    &self,
    input: NewUser,
    claim: Option<SessionId>,
  ) -> impl Future<Output = Result<Registration, Self::Error>> + Send + '_;

  /// Resolve a device token to its user, if any.
  fn resolve_device_session(
    &self,
    token: String,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;
}

pub trait IdeaStore: Backend {
  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a new idea. Writing into a group requires write access for the
  /// owner; sessions can never write into a group.
  fn create_idea(
    &self,
    input: NewIdea,
  ) -> impl Future<Output = Result<Idea, Self::Error>> + Send + '_;

  /// Owner only. Increments `edit_count` and stamps `updated_at`.
  fn edit_idea(
    &self,
    idea_id: IdeaId,
    requester: Actor,
    content: String,
  ) -> impl Future<Output = Result<Idea, Self::Error>> + Send + '_;

  /// Owner only. Hard deletes are refused while synthesis edges reference
  /// the idea.
  fn delete_idea(
    &self,
    idea_id: IdeaId,
    requester: Actor,
    mode: DeleteMode,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Owner only. Re-parent `idea_id` under `parent_id`, refusing cycles.
  fn link_parent(
    &self,
    idea_id: IdeaId,
    parent_id: IdeaId,
    requester: Actor,
  ) -> impl Future<Output = Result<Idea, Self::Error>> + Send + '_;

  /// Owner only. See [`crate::status::check_promotion`].
  fn promote(
    &self,
    idea_id: IdeaId,
    requester: Actor,
    target: IdeaStatus,
  ) -> impl Future<Output = Result<Idea, Self::Error>> + Send + '_;

  fn set_shareable(
    &self,
    idea_id: IdeaId,
    requester: Actor,
    shareable: bool,
  ) -> impl Future<Output = Result<Idea, Self::Error>> + Send + '_;

  fn add_tags(
    &self,
    idea_id: IdeaId,
    requester: Actor,
    tags: Vec<String>,
  ) -> impl Future<Output = Result<Idea, Self::Error>> + Send + '_;

  /// Record or replace `voter`'s vote and return the new tally.
  fn vote(
    &self,
    idea_id: IdeaId,
    voter: Actor,
    vote: Vote,
  ) -> impl Future<Output = Result<VoteTally, Self::Error>> + Send + '_;

  fn create_link(
    &self,
    a: IdeaId,
    b: IdeaId,
    kind: LinkKind,
    requester: Actor,
  ) -> impl Future<Output = Result<IdeaLink, Self::Error>> + Send + '_;

  /// Turn `reply:#id` references in a group's ideas into reply links.
  /// Returns the number of links created.
  fn materialize_reply_links(
    &self,
    group_id: GroupId,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Write a clerk idea and its synthesis edges in one transaction.
  fn record_synthesis(
    &self,
    record: SynthesisRecord,
  ) -> impl Future<Output = Result<Idea, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// `None` if the idea does not exist or is soft-deleted.
  fn get_idea(
    &self,
    idea_id: IdeaId,
  ) -> impl Future<Output = Result<Option<Idea>, Self::Error>> + Send + '_;

  fn list_ideas(
    &self,
    query: IdeaQuery,
  ) -> impl Future<Output = Result<Page<Idea>, Self::Error>> + Send + '_;

  fn tally(
    &self,
    idea_id: IdeaId,
  ) -> impl Future<Output = Result<VoteTally, Self::Error>> + Send + '_;

  fn links(
    &self,
    idea_id: IdeaId,
  ) -> impl Future<Output = Result<Vec<IdeaLink>, Self::Error>> + Send + '_;

  /// Sources of a digest or proposal, soft-deleted ones included.
  fn synthesis_sources(
    &self,
    digest_id: IdeaId,
  ) -> impl Future<Output = Result<Vec<Idea>, Self::Error>> + Send + '_;

  /// Clerk ideas of `category` in a group, newest first.
  fn list_syntheses(
    &self,
    group_id: GroupId,
    category: Category,
  ) -> impl Future<Output = Result<Vec<Idea>, Self::Error>> + Send + '_;
}

pub trait GroupStore: Backend {
  /// Requires a user of at least
  /// [`GROUP_CREATE_MIN_TIER`](crate::identity::GROUP_CREATE_MIN_TIER). The
  /// creator becomes the first facilitator.
  fn create_group(
    &self,
    input: NewGroup,
    creator: Actor,
  ) -> impl Future<Output = Result<Group, Self::Error>> + Send + '_;

  fn get_group(
    &self,
    group_id: GroupId,
  ) -> impl Future<Output = Result<Option<Group>, Self::Error>> + Send + '_;

  fn list_groups(
    &self,
    query: GroupQuery,
  ) -> impl Future<Output = Result<Page<Group>, Self::Error>> + Send + '_;

  fn join_group(
    &self,
    group_id: GroupId,
    requester: Actor,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  /// Deactivates the requester's membership, applying the facilitator
  /// safeguard.
  fn leave_group(
    &self,
    group_id: GroupId,
    requester: Actor,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Facilitator only.
  fn update_group(
    &self,
    group_id: GroupId,
    requester: Actor,
    update: GroupUpdate,
  ) -> impl Future<Output = Result<Group, Self::Error>> + Send + '_;

  /// Facilitator only. Returns the member's new state, or `None` when
  /// removed.
  fn update_member(
    &self,
    group_id: GroupId,
    requester: Actor,
    user_id: UserId,
    change: MemberChange,
  ) -> impl Future<Output = Result<Option<Membership>, Self::Error>> + Send + '_;

  /// All memberships, active and inactive, by `joined_at`.
  fn members(
    &self,
    group_id: GroupId,
  ) -> impl Future<Output = Result<Vec<Membership>, Self::Error>> + Send + '_;

  fn membership(
    &self,
    group_id: GroupId,
    user_id: UserId,
  ) -> impl Future<Output = Result<Option<Membership>, Self::Error>> + Send + '_;

  /// Evaluate the access matrix for `actor`.
  fn access(
    &self,
    group_id: GroupId,
    actor: Actor,
  ) -> impl Future<Output = Result<Access, Self::Error>> + Send + '_;

  /// Facilitator only. Classify and issue one invite per address.
  fn create_invites(
    &self,
    group_id: GroupId,
    requester: Actor,
    emails: Vec<String>,
  ) -> impl Future<Output = Result<Vec<IssuedInvite>, Self::Error>> + Send + '_;

  fn resolve_invite(
    &self,
    token: String,
    decision: InviteDecision,
  ) -> impl Future<Output = Result<Resolution, Self::Error>> + Send + '_;

  /// Facilitator only. Newest first.
  fn list_invites(
    &self,
    group_id: GroupId,
    requester: Actor,
  ) -> impl Future<Output = Result<Vec<Invite>, Self::Error>> + Send + '_;
}

pub trait LedgerStore: Backend {
  /// Check the cooldown and daily limit, then log and credit, all in one
  /// exclusive transaction.
  fn award(
    &self,
    identity: Identity,
    action: PointAction,
    context: PointContext,
  ) -> impl Future<Output = Result<Award, Self::Error>> + Send + '_;

  /// Stamp every unclaimed row of `session_id` with `user_id` and credit
  /// their sum once.
  fn transfer_session(
    &self,
    session_id: SessionId,
    user_id: UserId,
  ) -> impl Future<Output = Result<Transfer, Self::Error>> + Send + '_;

  fn recalculate(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<Reconciliation, Self::Error>> + Send + '_;

  /// Users: the running total. Sessions: the sum of unclaimed rows.
  fn balance(
    &self,
    identity: Identity,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// Newest first.
  fn history(
    &self,
    identity: Identity,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<PointLogEntry>, Self::Error>> + Send + '_;
}
