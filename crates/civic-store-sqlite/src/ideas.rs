//! The idea graph: nodes, threading, links, votes, and synthesis edges.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use civic_core::{
  Error as CoreError,
  graph::{can_hard_delete, check_reparent, reply_references},
  group::access_for,
  identity::{Actor, Identity},
  idea::{
    Category, DeleteMode, Idea, IdeaLink, IdeaStatus, LinkKind, NewIdea,
    SynthesisEdge, Vote, VoteTally, normalize_content, normalize_tags,
  },
  ids::{GroupId, IdeaId},
  status::check_promotion,
  store::{IdeaQuery, Order, Page, SynthesisRecord},
};
use rusqlite::{Connection, OptionalExtension as _, params, params_from_iter, types::Value};
use tracing::{debug, info};

use crate::{
  Result,
  encode::{
    IDEA_COLUMNS, LINK_COLUMNS, RawIdea, RawLink, decode_dt, encode_dt,
    encode_tags, identity_columns,
  },
  groups, users,
};

// ─── Reads ───────────────────────────────────────────────────────────────────

/// Load an idea, soft-deleted or not.
pub fn load_any(conn: &Connection, idea_id: IdeaId) -> Result<Option<Idea>> {
  let raw = conn
    .query_row(
      &format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE idea_id = ?1"),
      params![idea_id.0],
      RawIdea::from_row,
    )
    .optional()?;
  raw.map(RawIdea::into_idea).transpose()
}

/// Load a live idea. Soft-deleted ideas are reported as not found.
pub fn load(conn: &Connection, idea_id: IdeaId) -> Result<Option<Idea>> {
  Ok(load_any(conn, idea_id)?.filter(|i| !i.is_deleted()))
}

fn require(conn: &Connection, idea_id: IdeaId) -> Result<Idea> {
  load(conn, idea_id)?.ok_or_else(|| CoreError::IdeaNotFound(idea_id).into())
}

fn parent_of(conn: &Connection, idea_id: IdeaId) -> Result<Option<IdeaId>> {
  let parent: Option<Option<i64>> = conn
    .query_row(
      "SELECT parent_id FROM ideas WHERE idea_id = ?1",
      params![idea_id.0],
      |r| r.get(0),
    )
    .optional()?;
  Ok(parent.flatten().map(IdeaId))
}

/// Fail unless `actor` owns `idea`. AI-authored ideas have no owner.
fn require_owner(idea: &Idea, actor: &Actor, verb: &str) -> Result<()> {
  if idea.is_clerk() {
    return Err(
      CoreError::forbidden(format!("AI-authored ideas cannot be {verb}")).into(),
    );
  }
  match &idea.owner {
    Some(owner) if actor.is(owner) => Ok(()),
    _ => Err(
      CoreError::forbidden(format!("only the owner may {verb} idea {}", idea.id))
        .into(),
    ),
  }
}

fn edges_touching(conn: &Connection, idea_id: IdeaId) -> Result<Vec<SynthesisEdge>> {
  let mut stmt = conn.prepare(
    "SELECT digest_id, source_id, created_at FROM synthesis_edges
     WHERE digest_id = ?1 OR source_id = ?1",
  )?;
  let raws = stmt
    .query_map(params![idea_id.0], |r| {
      Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?, r.get::<_, String>(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws
    .into_iter()
    .map(|(digest, source, at)| {
      Ok(SynthesisEdge {
        digest_id:  IdeaId(digest),
        source_id:  IdeaId(source),
        created_at: decode_dt(&at)?,
      })
    })
    .collect()
}

pub fn tally(conn: &Connection, idea_id: IdeaId) -> Result<VoteTally> {
  let (up, down): (u32, u32) = conn.query_row(
    "SELECT COALESCE(SUM(vote = 1), 0), COALESCE(SUM(vote = -1), 0)
     FROM idea_votes WHERE idea_id = ?1",
    params![idea_id.0],
    |r| Ok((r.get(0)?, r.get(1)?)),
  )?;
  Ok(VoteTally { up, down })
}

pub fn links(conn: &Connection, idea_id: IdeaId) -> Result<Vec<IdeaLink>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {LINK_COLUMNS} FROM idea_links
     WHERE idea_a = ?1 OR idea_b = ?1 ORDER BY created_at, link_id"
  ))?;
  let raws = stmt
    .query_map(params![idea_id.0], RawLink::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawLink::into_link).collect()
}

fn collect_ideas(
  conn: &Connection,
  sql: &str,
  args: impl rusqlite::Params,
) -> Result<Vec<Idea>> {
  let mut stmt = conn.prepare(sql)?;
  let raws = stmt
    .query_map(args, RawIdea::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawIdea::into_idea).collect()
}

pub fn synthesis_sources(conn: &Connection, digest_id: IdeaId) -> Result<Vec<Idea>> {
  let columns = prefixed(IDEA_COLUMNS, "i");
  collect_ideas(
    conn,
    &format!(
      "SELECT {columns} FROM synthesis_edges e
       JOIN ideas i ON i.idea_id = e.source_id
       WHERE e.digest_id = ?1 ORDER BY i.idea_id"
    ),
    params![digest_id.0],
  )
}

pub fn list_syntheses(
  conn: &Connection,
  group_id: GroupId,
  category: Category,
) -> Result<Vec<Idea>> {
  collect_ideas(
    conn,
    &format!(
      "SELECT {IDEA_COLUMNS} FROM ideas
       WHERE group_id = ?1 AND category = ?2 AND clerk_key IS NOT NULL
         AND deleted_at IS NULL
       ORDER BY created_at DESC, idea_id DESC"
    ),
    params![group_id.0, category.to_string()],
  )
}

fn prefixed(columns: &str, alias: &str) -> String {
  columns
    .split(',')
    .map(|c| format!("{alias}.{}", c.trim()))
    .collect::<Vec<_>>()
    .join(", ")
}

pub fn list(conn: &Connection, query: &IdeaQuery) -> Result<Page<Idea>> {
  let mut conds: Vec<String> = vec!["deleted_at IS NULL".into()];
  let mut args: Vec<Value> = Vec::new();
  let mut bind = |conds: &mut Vec<String>, column: &str, value: Value| {
    args.push(value);
    conds.push(format!("{column} ?{}", args.len()));
  };

  match &query.owner {
    Some(Identity::User(id)) => bind(&mut conds, "user_id =", Value::Integer(id.0)),
    Some(Identity::Session(s)) => {
      bind(&mut conds, "session_id =", Value::Text(s.0.clone()))
    }
    None => {}
  }
  if let Some(group_id) = query.group_id {
    bind(&mut conds, "group_id =", Value::Integer(group_id.0));
  }
  if query.personal_only {
    conds.push("group_id IS NULL".into());
  }
  if let Some(category) = query.category {
    bind(&mut conds, "category =", Value::Text(category.to_string()));
  }
  if let Some(category) = query.exclude {
    bind(&mut conds, "category !=", Value::Text(category.to_string()));
  }
  if let Some(status) = query.status {
    bind(&mut conds, "status =", Value::Text(status.to_string()));
  }
  if let Some(since) = query.since {
    bind(&mut conds, "created_at >=", Value::Text(encode_dt(since)));
  }
  if let Some(parent) = query.parent_id {
    bind(&mut conds, "parent_id =", Value::Integer(parent.0));
  }
  if query.human_only {
    conds.push("clerk_key IS NULL".into());
  }

  let where_clause = conds.join(" AND ");
  let total: i64 = conn.query_row(
    &format!("SELECT COUNT(*) FROM ideas WHERE {where_clause}"),
    params_from_iter(args.iter()),
    |r| r.get(0),
  )?;

  let direction = match query.order {
    Order::Recent => "DESC",
    Order::Chronological => "ASC",
  };
  let offset = query.offset.unwrap_or(0);
  let limit = query.limit.map_or(-1, |l| l as i64);
  let items = collect_ideas(
    conn,
    &format!(
      "SELECT {IDEA_COLUMNS} FROM ideas WHERE {where_clause}
       ORDER BY created_at {direction}, idea_id {direction}
       LIMIT {limit} OFFSET {offset}"
    ),
    params_from_iter(args.iter()),
  )?;

  Ok(Page { items, total: total as u64, offset })
}

// ─── Writes ──────────────────────────────────────────────────────────────────

fn insert(conn: &Connection, input: &NewIdea, now: DateTime<Utc>) -> Result<IdeaId> {
  let (user_id, session_id) = match input.owner() {
    Some(owner) => identity_columns(owner),
    None => (None, None),
  };
  let now = encode_dt(now);
  conn.execute(
    "INSERT INTO ideas (
       user_id, session_id, clerk_key, parent_id, content, category, status,
       tags, source, group_id, shareable, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
    params![
      user_id,
      session_id,
      input.clerk_key(),
      input.parent_id.map(|p| p.0),
      input.content,
      input.category.to_string(),
      input.status.to_string(),
      encode_tags(&input.tags)?,
      input.source.to_string(),
      input.group_id.map(|g| g.0),
      input.shareable,
      now,
    ],
  )?;
  Ok(IdeaId(conn.last_insert_rowid()))
}

/// Check that `owner` may post into `group_id`.
fn check_group_write(conn: &Connection, group_id: GroupId, owner: &Identity) -> Result<()> {
  let group = groups::require(conn, group_id)?;
  if group.is_archived() {
    return Err(CoreError::Conflict("group is archived".into()).into());
  }
  let Identity::User(user_id) = owner else {
    return Err(
      CoreError::forbidden("anonymous sessions cannot post to a group").into(),
    );
  };
  let actor = Actor::user(*user_id, users::tier(conn, *user_id)?);
  let membership = groups::membership(conn, group_id, *user_id)?;
  if !access_for(&group, membership.as_ref(), &actor).write {
    return Err(
      CoreError::forbidden("posting requires an active member or facilitator")
        .into(),
    );
  }
  Ok(())
}

pub fn create(conn: &mut Connection, input: NewIdea) -> Result<Idea> {
  let input = input.validated()?;

  let tx = conn.transaction()?;
  if let Some(Identity::User(user_id)) = input.owner() {
    users::require(&tx, *user_id)?;
  }
  if let Some(group_id) = input.group_id {
    match input.owner() {
      Some(owner) => check_group_write(&tx, group_id, owner)?,
      None => {
        groups::require(&tx, group_id)?;
      }
    }
  }
  if let Some(parent_id) = input.parent_id {
    require(&tx, parent_id)?;
  }
  let idea_id = insert(&tx, &input, Utc::now())?;
  let idea = require(&tx, idea_id)?;
  tx.commit()?;

  debug!(idea = %idea_id, category = %idea.category, "idea created");
  Ok(idea)
}

pub fn edit(
  conn: &mut Connection,
  idea_id: IdeaId,
  actor: &Actor,
  content: &str,
) -> Result<Idea> {
  let content = normalize_content(content)?;

  let tx = conn.transaction()?;
  let idea = require(&tx, idea_id)?;
  require_owner(&idea, actor, "edit")?;
  tx.execute(
    "UPDATE ideas SET content = ?2, edit_count = edit_count + 1, updated_at = ?3
     WHERE idea_id = ?1",
    params![idea_id.0, content, encode_dt(Utc::now())],
  )?;
  let idea = require(&tx, idea_id)?;
  tx.commit()?;
  Ok(idea)
}

pub fn delete(
  conn: &mut Connection,
  idea_id: IdeaId,
  actor: &Actor,
  mode: DeleteMode,
) -> Result<()> {
  let tx = conn.transaction()?;
  let idea = load_any(&tx, idea_id)?.ok_or(CoreError::IdeaNotFound(idea_id))?;
  require_owner(&idea, actor, "delete")?;

  match mode {
    DeleteMode::Soft => {
      if idea.is_deleted() {
        return Err(
          CoreError::Conflict(format!("idea {idea_id} is already deleted")).into(),
        );
      }
      tx.execute(
        "UPDATE ideas SET deleted_at = ?2 WHERE idea_id = ?1",
        params![idea_id.0, encode_dt(Utc::now())],
      )?;
    }
    DeleteMode::Hard => {
      let edges = edges_touching(&tx, idea_id)?;
      if !can_hard_delete(idea_id, &edges) {
        return Err(
          CoreError::Conflict(format!(
            "idea {idea_id} is referenced by a digest; soft delete it instead"
          ))
          .into(),
        );
      }
      tx.execute("DELETE FROM idea_votes WHERE idea_id = ?1", params![idea_id.0])?;
      tx.execute(
        "DELETE FROM idea_links WHERE idea_a = ?1 OR idea_b = ?1",
        params![idea_id.0],
      )?;
      tx.execute(
        "UPDATE ideas SET parent_id = NULL WHERE parent_id = ?1",
        params![idea_id.0],
      )?;
      tx.execute("DELETE FROM ideas WHERE idea_id = ?1", params![idea_id.0])?;
    }
  }
  tx.commit()?;

  info!(idea = %idea_id, ?mode, "idea deleted");
  Ok(())
}

pub fn link_parent(
  conn: &mut Connection,
  idea_id: IdeaId,
  parent_id: IdeaId,
  actor: &Actor,
) -> Result<Idea> {
  let tx = conn.transaction()?;
  let idea = require(&tx, idea_id)?;
  require_owner(&idea, actor, "re-thread")?;
  if idea_id != parent_id {
    let parent = require(&tx, parent_id)?;
    if parent.group_id != idea.group_id {
      return Err(
        CoreError::Validation("parent must be in the same group".into()).into(),
      );
    }
  }
  check_reparent(idea_id, parent_id, |id| parent_of(&tx, id))?;
  tx.execute(
    "UPDATE ideas SET parent_id = ?2 WHERE idea_id = ?1",
    params![idea_id.0, parent_id.0],
  )?;
  let idea = require(&tx, idea_id)?;
  tx.commit()?;
  Ok(idea)
}

pub fn promote(
  conn: &mut Connection,
  idea_id: IdeaId,
  actor: &Actor,
  target: IdeaStatus,
) -> Result<Idea> {
  let tx = conn.transaction()?;
  let idea = require(&tx, idea_id)?;
  require_owner(&idea, actor, "promoted")?;
  check_promotion(idea.status, target)?;
  tx.execute(
    "UPDATE ideas SET status = ?2 WHERE idea_id = ?1",
    params![idea_id.0, target.to_string()],
  )?;
  let idea = require(&tx, idea_id)?;
  tx.commit()?;

  info!(idea = %idea_id, status = %target, "idea promoted");
  Ok(idea)
}

pub fn set_shareable(
  conn: &mut Connection,
  idea_id: IdeaId,
  actor: &Actor,
  shareable: bool,
) -> Result<Idea> {
  let tx = conn.transaction()?;
  let idea = require(&tx, idea_id)?;
  require_owner(&idea, actor, "share")?;
  tx.execute(
    "UPDATE ideas SET shareable = ?2 WHERE idea_id = ?1",
    params![idea_id.0, shareable],
  )?;
  let idea = require(&tx, idea_id)?;
  tx.commit()?;
  Ok(idea)
}

pub fn add_tags(
  conn: &mut Connection,
  idea_id: IdeaId,
  actor: &Actor,
  tags: Vec<String>,
) -> Result<Idea> {
  let tx = conn.transaction()?;
  let idea = require(&tx, idea_id)?;
  require_owner(&idea, actor, "tag")?;
  let merged = normalize_tags(idea.tags.iter().cloned().chain(tags));
  tx.execute(
    "UPDATE ideas SET tags = ?2 WHERE idea_id = ?1",
    params![idea_id.0, encode_tags(&merged)?],
  )?;
  let idea = require(&tx, idea_id)?;
  tx.commit()?;
  Ok(idea)
}

pub fn vote(
  conn: &mut Connection,
  idea_id: IdeaId,
  voter: &Actor,
  vote: Vote,
) -> Result<VoteTally> {
  let user_id = voter
    .user_id()
    .ok_or_else(|| CoreError::forbidden("sign in to vote"))?;

  let tx = conn.transaction()?;
  let idea = require(&tx, idea_id)?;
  if idea.is_clerk() {
    return Err(CoreError::forbidden("AI-authored ideas cannot be voted on").into());
  }
  if let Some(group_id) = idea.group_id {
    if !groups::access(&tx, group_id, voter)?.vote {
      return Err(
        CoreError::forbidden("you cannot vote on this group's ideas").into(),
      );
    }
  }
  tx.execute(
    "INSERT INTO idea_votes (idea_id, user_id, vote, voted_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (idea_id, user_id)
     DO UPDATE SET vote = excluded.vote, voted_at = excluded.voted_at",
    params![idea_id.0, user_id.0, vote.value(), encode_dt(Utc::now())],
  )?;
  let result = tally(&tx, idea_id)?;
  tx.commit()?;
  Ok(result)
}

pub fn create_link(
  conn: &mut Connection,
  a: IdeaId,
  b: IdeaId,
  kind: LinkKind,
  actor: &Actor,
) -> Result<IdeaLink> {
  if a == b {
    return Err(CoreError::Validation("an idea cannot link to itself".into()).into());
  }

  let tx = conn.transaction()?;
  let from = require(&tx, a)?;
  require(&tx, b)?;
  require_owner(&from, actor, "link")?;

  let (lo, hi) = if a.0 < b.0 { (a, b) } else { (b, a) };
  let exists = tx
    .query_row(
      "SELECT 1 FROM idea_links WHERE idea_a = ?1 AND idea_b = ?2",
      params![lo.0, hi.0],
      |_| Ok(()),
    )
    .optional()?
    .is_some();
  if exists {
    return Err(
      CoreError::Conflict(format!("ideas {a} and {b} are already linked")).into(),
    );
  }
  tx.execute(
    "INSERT INTO idea_links (idea_a, idea_b, kind, created_by, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![
      lo.0,
      hi.0,
      kind.to_string(),
      actor.user_id().map(|u| u.0),
      encode_dt(Utc::now()),
    ],
  )?;
  let link_id = tx.last_insert_rowid();
  let link = tx.query_row(
    &format!("SELECT {LINK_COLUMNS} FROM idea_links WHERE link_id = ?1"),
    params![link_id],
    RawLink::from_row,
  )?;
  tx.commit()?;
  link.into_link()
}

pub fn materialize_reply_links(conn: &mut Connection, group_id: GroupId) -> Result<usize> {
  let tx = conn.transaction()?;
  groups::require(&tx, group_id)?;

  let candidates: Vec<(i64, String)> = {
    let mut stmt = tx.prepare(
      "SELECT idea_id, content FROM ideas
       WHERE group_id = ?1 AND deleted_at IS NULL
         AND content LIKE '%reply:#%'",
    )?;
    stmt
      .query_map(params![group_id.0], |r| Ok((r.get(0)?, r.get(1)?)))?
      .collect::<rusqlite::Result<Vec<_>>>()?
  };

  let now = encode_dt(Utc::now());
  let mut created = 0;
  for (idea_id, content) in candidates {
    for target in reply_references(&content) {
      if target.0 == idea_id {
        continue;
      }
      let in_group = load(&tx, target)?.is_some_and(|t| t.group_id == Some(group_id));
      if !in_group {
        continue;
      }
      let (lo, hi) = if idea_id < target.0 { (idea_id, target.0) } else { (target.0, idea_id) };
      created += tx.execute(
        "INSERT OR IGNORE INTO idea_links (idea_a, idea_b, kind, created_at)
         VALUES (?1, ?2, 'reply', ?3)",
        params![lo, hi, now],
      )?;
    }
  }
  tx.commit()?;
  Ok(created)
}

pub fn record_synthesis(conn: &mut Connection, record: SynthesisRecord) -> Result<Idea> {
  let SynthesisRecord { idea, sources, group_status } = record;
  if idea.clerk_key().is_none() {
    return Err(
      CoreError::Validation("digests and proposals must be AI-authored".into()).into(),
    );
  }
  let idea = idea.validated()?;

  let tx = conn.transaction()?;
  if let Some(group_id) = idea.group_id {
    groups::require(&tx, group_id)?;
  }
  let now = Utc::now();
  let digest_id = insert(&tx, &idea, now)?;

  let mut seen = HashSet::new();
  for source in sources.into_iter().filter(|s| seen.insert(*s)) {
    load_any(&tx, source)?.ok_or(CoreError::IdeaNotFound(source))?;
    tx.execute(
      "INSERT INTO synthesis_edges (digest_id, source_id, created_at)
       VALUES (?1, ?2, ?3)",
      params![digest_id.0, source.0, encode_dt(now)],
    )?;
  }
  if let (Some(group_id), Some(status)) = (idea.group_id, group_status) {
    groups::set_status(&tx, group_id, status)?;
  }
  let digest = require(&tx, digest_id)?;
  tx.commit()?;

  info!(
    digest = %digest_id,
    category = %digest.category,
    sources = seen.len(),
    "synthesis recorded"
  );
  Ok(digest)
}
