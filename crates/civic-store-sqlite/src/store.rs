//! [`SqliteStore`] — the SQLite implementation of the civic store traits.

use std::path::Path;

use civic_core::{
  group::{Access, Group, GroupUpdate, MemberChange, Membership, NewGroup},
  identity::{Actor, DeviceSession, Identity, NewUser, Registration, User},
  idea::{
    Category, DeleteMode, Idea, IdeaLink, IdeaStatus, LinkKind, NewIdea, Vote,
    VoteTally,
  },
  ids::{GroupId, IdeaId, SessionId, UserId},
  invite::{Invite, InviteDecision, IssuedInvite, Resolution},
  ledger::{Award, PointAction, PointContext, PointLogEntry, Reconciliation, Transfer},
  store::{
    Backend, GroupQuery, GroupStore, IdeaQuery, IdeaStore, LedgerStore, Page,
    SynthesisRecord, UserStore,
  },
};
use rusqlite::Connection;

use crate::{Error, Result, groups, ideas, invites, ledger, schema::SCHEMA, users};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A civic store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread.
  async fn run<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Raw SQL access for tests that need to corrupt or inspect state.
  #[cfg(test)]
  pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
  {
    self.run(f).await
  }
}

impl Backend for SqliteStore {
  type Error = Error;
}

// ─── UserStore impl ──────────────────────────────────────────────────────────

impl UserStore for SqliteStore {
  async fn create_user(&self, input: NewUser) -> Result<User> {
    self.run(move |conn| users::insert(conn, input)).await
  }

  async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
    self.run(move |conn| users::load(conn, user_id)).await
  }

  async fn find_user_by_email(&self, email: String) -> Result<Option<User>> {
    self.run(move |conn| users::find_by_email(conn, &email)).await
  }

  async fn create_device_session(&self, user_id: UserId) -> Result<DeviceSession> {
    self.run(move |conn| users::create_session(conn, user_id)).await
  }

  async fn register(
    &self,
    input: NewUser,
    claim: Option<SessionId>,
  ) -> Result<Registration> {
    self
      .run(move |conn| users::register(conn, input, claim.as_ref()))
      .await
  }

  async fn resolve_device_session(&self, token: String) -> Result<Option<User>> {
    self.run(move |conn| users::resolve_session(conn, &token)).await
  }
}

// ─── IdeaStore impl ──────────────────────────────────────────────────────────

impl IdeaStore for SqliteStore {
  async fn create_idea(&self, input: NewIdea) -> Result<Idea> {
    self.run(move |conn| ideas::create(conn, input)).await
  }

  async fn edit_idea(
    &self,
    idea_id: IdeaId,
    requester: Actor,
    content: String,
  ) -> Result<Idea> {
    self
      .run(move |conn| ideas::edit(conn, idea_id, &requester, &content))
      .await
  }

  async fn delete_idea(
    &self,
    idea_id: IdeaId,
    requester: Actor,
    mode: DeleteMode,
  ) -> Result<()> {
    self
      .run(move |conn| ideas::delete(conn, idea_id, &requester, mode))
      .await
  }

  async fn link_parent(
    &self,
    idea_id: IdeaId,
    parent_id: IdeaId,
    requester: Actor,
  ) -> Result<Idea> {
    self
      .run(move |conn| ideas::link_parent(conn, idea_id, parent_id, &requester))
      .await
  }

  async fn promote(
    &self,
    idea_id: IdeaId,
    requester: Actor,
    target: IdeaStatus,
  ) -> Result<Idea> {
    self
      .run(move |conn| ideas::promote(conn, idea_id, &requester, target))
      .await
  }

  async fn set_shareable(
    &self,
    idea_id: IdeaId,
    requester: Actor,
    shareable: bool,
  ) -> Result<Idea> {
    self
      .run(move |conn| ideas::set_shareable(conn, idea_id, &requester, shareable))
      .await
  }

  async fn add_tags(
    &self,
    idea_id: IdeaId,
    requester: Actor,
    tags: Vec<String>,
  ) -> Result<Idea> {
    self
      .run(move |conn| ideas::add_tags(conn, idea_id, &requester, tags))
      .await
  }

  async fn vote(&self, idea_id: IdeaId, voter: Actor, vote: Vote) -> Result<VoteTally> {
    self.run(move |conn| ideas::vote(conn, idea_id, &voter, vote)).await
  }

  async fn create_link(
    &self,
    a: IdeaId,
    b: IdeaId,
    kind: LinkKind,
    requester: Actor,
  ) -> Result<IdeaLink> {
    self
      .run(move |conn| ideas::create_link(conn, a, b, kind, &requester))
      .await
  }

  async fn materialize_reply_links(&self, group_id: GroupId) -> Result<usize> {
    self
      .run(move |conn| ideas::materialize_reply_links(conn, group_id))
      .await
  }

  async fn record_synthesis(&self, record: SynthesisRecord) -> Result<Idea> {
    self.run(move |conn| ideas::record_synthesis(conn, record)).await
  }

  async fn get_idea(&self, idea_id: IdeaId) -> Result<Option<Idea>> {
    self.run(move |conn| ideas::load(conn, idea_id)).await
  }

  async fn list_ideas(&self, query: IdeaQuery) -> Result<Page<Idea>> {
    self.run(move |conn| ideas::list(conn, &query)).await
  }

  async fn tally(&self, idea_id: IdeaId) -> Result<VoteTally> {
    self.run(move |conn| ideas::tally(conn, idea_id)).await
  }

  async fn links(&self, idea_id: IdeaId) -> Result<Vec<IdeaLink>> {
    self.run(move |conn| ideas::links(conn, idea_id)).await
  }

  async fn synthesis_sources(&self, digest_id: IdeaId) -> Result<Vec<Idea>> {
    self
      .run(move |conn| ideas::synthesis_sources(conn, digest_id))
      .await
  }

  async fn list_syntheses(
    &self,
    group_id: GroupId,
    category: Category,
  ) -> Result<Vec<Idea>> {
    self
      .run(move |conn| ideas::list_syntheses(conn, group_id, category))
      .await
  }
}

// ─── GroupStore impl ─────────────────────────────────────────────────────────

impl GroupStore for SqliteStore {
  async fn create_group(&self, input: NewGroup, creator: Actor) -> Result<Group> {
    self
      .run(move |conn| groups::create(conn, input, &creator))
      .await
  }

  async fn get_group(&self, group_id: GroupId) -> Result<Option<Group>> {
    self.run(move |conn| groups::load(conn, group_id)).await
  }

  async fn list_groups(&self, query: GroupQuery) -> Result<Page<Group>> {
    self.run(move |conn| groups::list(conn, &query)).await
  }

  async fn join_group(&self, group_id: GroupId, requester: Actor) -> Result<Membership> {
    self
      .run(move |conn| groups::join(conn, group_id, &requester))
      .await
  }

  async fn leave_group(&self, group_id: GroupId, requester: Actor) -> Result<()> {
    self
      .run(move |conn| groups::leave(conn, group_id, &requester))
      .await
  }

  async fn update_group(
    &self,
    group_id: GroupId,
    requester: Actor,
    update: GroupUpdate,
  ) -> Result<Group> {
    self
      .run(move |conn| groups::update(conn, group_id, &requester, update))
      .await
  }

  async fn update_member(
    &self,
    group_id: GroupId,
    requester: Actor,
    user_id: UserId,
    change: MemberChange,
  ) -> Result<Option<Membership>> {
    self
      .run(move |conn| {
        groups::update_member(conn, group_id, &requester, user_id, change)
      })
      .await
  }

  async fn members(&self, group_id: GroupId) -> Result<Vec<Membership>> {
    self.run(move |conn| groups::members(conn, group_id)).await
  }

  async fn membership(
    &self,
    group_id: GroupId,
    user_id: UserId,
  ) -> Result<Option<Membership>> {
    self
      .run(move |conn| groups::membership(conn, group_id, user_id))
      .await
  }

  async fn access(&self, group_id: GroupId, actor: Actor) -> Result<Access> {
    self
      .run(move |conn| groups::access(conn, group_id, &actor))
      .await
  }

  async fn create_invites(
    &self,
    group_id: GroupId,
    requester: Actor,
    emails: Vec<String>,
  ) -> Result<Vec<IssuedInvite>> {
    self
      .run(move |conn| invites::create(conn, group_id, &requester, emails))
      .await
  }

  async fn resolve_invite(
    &self,
    token: String,
    decision: InviteDecision,
  ) -> Result<Resolution> {
    self
      .run(move |conn| invites::resolve(conn, &token, decision))
      .await
  }

  async fn list_invites(&self, group_id: GroupId, requester: Actor) -> Result<Vec<Invite>> {
    self
      .run(move |conn| invites::list(conn, group_id, &requester))
      .await
  }
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  async fn award(
    &self,
    identity: Identity,
    action: PointAction,
    context: PointContext,
  ) -> Result<Award> {
    self
      .run(move |conn| ledger::award(conn, &identity, &action, &context))
      .await
  }

  async fn transfer_session(
    &self,
    session_id: SessionId,
    user_id: UserId,
  ) -> Result<Transfer> {
    self
      .run(move |conn| ledger::transfer(conn, &session_id, user_id))
      .await
  }

  async fn recalculate(&self, user_id: UserId) -> Result<Reconciliation> {
    self.run(move |conn| ledger::recalculate(conn, user_id)).await
  }

  async fn balance(&self, identity: Identity) -> Result<i64> {
    self.run(move |conn| ledger::balance(conn, &identity)).await
  }

  async fn history(&self, identity: Identity, limit: usize) -> Result<Vec<PointLogEntry>> {
    self
      .run(move |conn| ledger::history(conn, &identity, limit))
      .await
  }
}
