//! Groups, memberships, and access evaluation.

use chrono::Utc;
use civic_core::{
  Error as CoreError,
  group::{
    Access, Group, GroupStatus, GroupUpdate, MemberChange, MemberStatus,
    Membership, NewGroup, Role, Succession, access_for, check_succession,
    join_role,
  },
  identity::{Actor, GROUP_CREATE_MIN_TIER},
  ids::{GroupId, UserId},
  store::{GroupQuery, Page},
};
use rusqlite::{Connection, OptionalExtension as _, params, params_from_iter, types::Value};
use tracing::info;

use crate::{
  Result,
  encode::{
    GROUP_COLUMNS, MEMBER_COLUMNS, RawGroup, RawMembership, encode_dt,
    encode_tags,
  },
  users,
};

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn load(conn: &Connection, group_id: GroupId) -> Result<Option<Group>> {
  let raw = conn
    .query_row(
      &format!("SELECT {GROUP_COLUMNS} FROM civic_groups WHERE group_id = ?1"),
      params![group_id.0],
      RawGroup::from_row,
    )
    .optional()?;
  raw.map(RawGroup::into_group).transpose()
}

pub fn require(conn: &Connection, group_id: GroupId) -> Result<Group> {
  load(conn, group_id)?.ok_or_else(|| CoreError::GroupNotFound(group_id).into())
}

pub fn membership(
  conn: &Connection,
  group_id: GroupId,
  user_id: UserId,
) -> Result<Option<Membership>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {MEMBER_COLUMNS} FROM group_members
         WHERE group_id = ?1 AND user_id = ?2"
      ),
      params![group_id.0, user_id.0],
      RawMembership::from_row,
    )
    .optional()?;
  raw.map(RawMembership::into_membership).transpose()
}

pub fn members(conn: &Connection, group_id: GroupId) -> Result<Vec<Membership>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {MEMBER_COLUMNS} FROM group_members
     WHERE group_id = ?1 ORDER BY joined_at, user_id"
  ))?;
  let raws = stmt
    .query_map(params![group_id.0], RawMembership::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawMembership::into_membership).collect()
}

pub fn access(conn: &Connection, group_id: GroupId, actor: &Actor) -> Result<Access> {
  let group = require(conn, group_id)?;
  let member = match actor.user_id() {
    Some(user_id) => membership(conn, group_id, user_id)?,
    None => None,
  };
  Ok(access_for(&group, member.as_ref(), actor))
}

/// The requester's user id, if they are an active facilitator of the group.
pub fn require_facilitator(
  conn: &Connection,
  group_id: GroupId,
  actor: &Actor,
) -> Result<UserId> {
  let denied =
    || crate::Error::from(CoreError::forbidden("facilitator role required"));
  let user_id = actor.user_id().ok_or_else(denied)?;
  match membership(conn, group_id, user_id)? {
    Some(m) if m.is_active_facilitator() => Ok(user_id),
    _ => Err(denied()),
  }
}

pub fn list(conn: &Connection, query: &GroupQuery) -> Result<Page<Group>> {
  let mut conds: Vec<String> = Vec::new();
  let mut args: Vec<Value> = Vec::new();

  if let Some(user_id) = query.member {
    args.push(Value::Integer(user_id.0));
    let mut cond = format!(
      "g.group_id IN (SELECT group_id FROM group_members
        WHERE user_id = ?{} AND status = 'active'",
      args.len()
    );
    if let Some(role) = query.role {
      args.push(Value::Text(role.to_string()));
      cond.push_str(&format!(" AND role = ?{}", args.len()));
    }
    cond.push(')');
    conds.push(cond);
  }
  if let Some(level) = query.level {
    args.push(Value::Text(level.to_string()));
    conds.push(format!("g.scope_level = ?{}", args.len()));
  }
  if let Some(state_id) = query.state_id {
    args.push(Value::Integer(state_id));
    conds.push(format!("g.state_id = ?{}", args.len()));
  }
  if let Some(town_id) = query.town_id {
    args.push(Value::Integer(town_id));
    conds.push(format!("g.town_id = ?{}", args.len()));
  }
  if let Some(status) = query.status {
    args.push(Value::Text(status.to_string()));
    conds.push(format!("g.status = ?{}", args.len()));
  }

  let where_clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };

  let total: i64 = conn.query_row(
    &format!("SELECT COUNT(*) FROM civic_groups g {where_clause}"),
    params_from_iter(args.iter()),
    |r| r.get(0),
  )?;

  let offset = query.offset.unwrap_or(0);
  let limit = query.limit.map_or(-1, |l| l as i64);
  let sql = format!(
    "SELECT {GROUP_COLUMNS} FROM civic_groups g {where_clause}
     ORDER BY g.created_at DESC, g.group_id DESC
     LIMIT {limit} OFFSET {offset}"
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(params_from_iter(args.iter()), RawGroup::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let items = raws
    .into_iter()
    .map(RawGroup::into_group)
    .collect::<Result<Vec<_>>>()?;

  Ok(Page { items, total: total as u64, offset })
}

// ─── Writes ──────────────────────────────────────────────────────────────────

pub fn create(conn: &mut Connection, input: NewGroup, creator: &Actor) -> Result<Group> {
  let user_id = creator
    .user_id()
    .ok_or_else(|| CoreError::forbidden("sign in to create a group"))?;
  let input = input.validated()?;

  let tx = conn.transaction()?;
  let tier = users::tier(&tx, user_id)?;
  if tier < GROUP_CREATE_MIN_TIER {
    return Err(
      CoreError::forbidden(format!(
        "creating a group requires a {GROUP_CREATE_MIN_TIER} account"
      ))
      .into(),
    );
  }

  let now = encode_dt(Utc::now());
  let status = input.initial_status();
  tx.execute(
    "INSERT INTO civic_groups (
       name, description, tags, scope_level, state_id, town_id, access_level,
       status, public_readable, public_voting, is_standard, created_by,
       created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    params![
      input.name,
      input.description,
      encode_tags(&input.tags)?,
      input.scope.level().to_string(),
      input.scope.state_id(),
      input.scope.town_id(),
      input.access_level.to_string(),
      status.to_string(),
      input.public.readable,
      input.public.voting,
      input.is_standard,
      user_id.0,
      now,
    ],
  )?;
  let group_id = GroupId(tx.last_insert_rowid());
  tx.execute(
    "INSERT INTO group_members (group_id, user_id, role, status, joined_at)
     VALUES (?1, ?2, 'facilitator', 'active', ?3)",
    params![group_id.0, user_id.0, now],
  )?;
  let group = require(&tx, group_id)?;
  tx.commit()?;

  info!(group = %group_id, creator = %user_id, "group created");
  Ok(group)
}

/// Insert a membership, or reactivate an inactive one with `role`.
pub fn upsert_member(
  conn: &Connection,
  group_id: GroupId,
  user_id: UserId,
  role: Role,
) -> Result<Membership> {
  let now = encode_dt(Utc::now());
  conn.execute(
    "INSERT INTO group_members (group_id, user_id, role, status, joined_at)
     VALUES (?1, ?2, ?3, 'active', ?4)
     ON CONFLICT (group_id, user_id)
     DO UPDATE SET role = excluded.role, status = 'active',
                   joined_at = excluded.joined_at",
    params![group_id.0, user_id.0, role.to_string(), now],
  )?;
  membership(conn, group_id, user_id)?.ok_or_else(|| {
    CoreError::Conflict("membership vanished during join".into()).into()
  })
}

pub fn join(conn: &mut Connection, group_id: GroupId, actor: &Actor) -> Result<Membership> {
  let user_id = actor
    .user_id()
    .ok_or_else(|| CoreError::forbidden("sign in to join a group"))?;

  let tx = conn.transaction()?;
  users::require(&tx, user_id)?;
  let group = require(&tx, group_id)?;
  if group.is_archived() {
    return Err(CoreError::Conflict("group is archived".into()).into());
  }
  if membership(&tx, group_id, user_id)?.is_some_and(|m| m.is_active()) {
    return Err(CoreError::Conflict("already a member of this group".into()).into());
  }
  let role = join_role(group.access_level)?;
  let member = upsert_member(&tx, group_id, user_id, role)?;
  tx.commit()?;

  info!(group = %group_id, user = %user_id, role = %role, "joined group");
  Ok(member)
}

/// Apply `change` to `target`, promoting a successor first when the change
/// would leave the group without an active facilitator.
fn apply_change(
  conn: &Connection,
  group: &Group,
  target: UserId,
  change: MemberChange,
) -> Result<Option<Membership>> {
  let group_id = group.group_id;
  let roster = members(conn, group_id)?;
  if let Succession::Promote(successor) =
    check_succession(group, &roster, target, change)?
  {
    conn.execute(
      "UPDATE group_members SET role = 'facilitator'
       WHERE group_id = ?1 AND user_id = ?2",
      params![group_id.0, successor.0],
    )?;
    info!(group = %group_id, from = %target, to = %successor, "facilitator succession");
  }

  match change {
    MemberChange::Role(role) => {
      conn.execute(
        "UPDATE group_members SET role = ?3 WHERE group_id = ?1 AND user_id = ?2",
        params![group_id.0, target.0, role.to_string()],
      )?;
    }
    MemberChange::Status(status) => {
      conn.execute(
        "UPDATE group_members SET status = ?3 WHERE group_id = ?1 AND user_id = ?2",
        params![group_id.0, target.0, status.to_string()],
      )?;
    }
    MemberChange::Remove => {
      conn.execute(
        "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
        params![group_id.0, target.0],
      )?;
    }
  }
  membership(conn, group_id, target)
}

pub fn leave(conn: &mut Connection, group_id: GroupId, actor: &Actor) -> Result<()> {
  let user_id = actor
    .user_id()
    .ok_or_else(|| CoreError::forbidden("sign in to leave a group"))?;

  let tx = conn.transaction()?;
  let group = require(&tx, group_id)?;
  if !membership(&tx, group_id, user_id)?.is_some_and(|m| m.is_active()) {
    return Err(CoreError::Conflict("not a member of this group".into()).into());
  }
  apply_change(
    &tx,
    &group,
    user_id,
    MemberChange::Status(MemberStatus::Inactive),
  )?;
  tx.commit()?;

  info!(group = %group_id, user = %user_id, "left group");
  Ok(())
}

pub fn update_member(
  conn: &mut Connection,
  group_id: GroupId,
  actor: &Actor,
  target: UserId,
  change: MemberChange,
) -> Result<Option<Membership>> {
  let tx = conn.transaction()?;
  let group = require(&tx, group_id)?;
  require_facilitator(&tx, group_id, actor)?;
  if membership(&tx, group_id, target)?.is_none() {
    return Err(
      CoreError::Validation(format!("user {target} is not in this group")).into(),
    );
  }
  let updated = apply_change(&tx, &group, target, change)?;
  tx.commit()?;

  info!(group = %group_id, user = %target, ?change, "member updated");
  Ok(updated)
}

pub fn update(
  conn: &mut Connection,
  group_id: GroupId,
  actor: &Actor,
  update: GroupUpdate,
) -> Result<Group> {
  let tx = conn.transaction()?;
  let current = require(&tx, group_id)?;
  require_facilitator(&tx, group_id, actor)?;
  let next = update.apply(current)?;
  tx.execute(
    "UPDATE civic_groups
     SET name = ?2, description = ?3, tags = ?4, status = ?5,
         public_readable = ?6, public_voting = ?7
     WHERE group_id = ?1",
    params![
      group_id.0,
      next.name,
      next.description,
      encode_tags(&next.tags)?,
      next.status.to_string(),
      next.public.readable,
      next.public.voting,
    ],
  )?;
  let group = require(&tx, group_id)?;
  tx.commit()?;
  Ok(group)
}

/// Set a group's status without facilitator checks. Used by the synthesis
/// pipeline, which has already authorized the run.
pub fn set_status(conn: &Connection, group_id: GroupId, status: GroupStatus) -> Result<()> {
  let changed = conn.execute(
    "UPDATE civic_groups SET status = ?2 WHERE group_id = ?1",
    params![group_id.0, status.to_string()],
  )?;
  if changed == 0 {
    return Err(CoreError::GroupNotFound(group_id).into());
  }
  Ok(())
}
