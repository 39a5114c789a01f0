//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with nanosecond
//! precision, so lexical order in SQL matches chronological order. Tag sets
//! are compact JSON arrays. Enumerations use their `strum` snake/kebab names.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use civic_core::{
  group::{Group, Membership, PublicFlags, Scope},
  identity::{Identity, User},
  idea::{Idea, IdeaLink},
  ids::{GroupId, IdeaId, SessionId, UserId},
  invite::Invite,
  ledger::{PointContext, PointLogEntry},
};
use rusqlite::Row;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Parse a stored enum name. Values were written by this crate, so an
/// unknown name means a corrupt row.
pub fn decode_enum<T: FromStr>(column: &'static str, value: &str) -> Result<T> {
  value
    .parse()
    .map_err(|_| Error::Decode { column, value: value.to_string() })
}

// ─── Tags ────────────────────────────────────────────────────────────────────

pub fn encode_tags(tags: &[String]) -> Result<String> {
  Ok(serde_json::to_string(tags)?)
}

pub fn decode_tags(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// Split an identity into its `(user_id, session_id)` columns.
pub fn identity_columns(identity: &Identity) -> (Option<i64>, Option<String>) {
  match identity {
    Identity::User(id) => (Some(id.0), None),
    Identity::Session(s) => (None, Some(s.0.clone())),
  }
}

fn decode_identity(
  user_id: Option<i64>,
  session_id: Option<String>,
) -> Option<Identity> {
  match (user_id, session_id) {
    (Some(id), _) => Some(Identity::User(UserId(id))),
    (None, Some(s)) => Some(Identity::Session(SessionId(s))),
    (None, None) => None,
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const IDEA_COLUMNS: &str = "idea_id, user_id, session_id, clerk_key, \
  parent_id, content, category, status, tags, source, group_id, shareable, \
  edit_count, created_at, updated_at, deleted_at";

/// Raw values read directly from an `ideas` row.
pub struct RawIdea {
  pub idea_id:    i64,
  pub user_id:    Option<i64>,
  pub session_id: Option<String>,
  pub clerk_key:  Option<String>,
  pub parent_id:  Option<i64>,
  pub content:    String,
  pub category:   String,
  pub status:     String,
  pub tags:       String,
  pub source:     String,
  pub group_id:   Option<i64>,
  pub shareable:  bool,
  pub edit_count: u32,
  pub created_at: String,
  pub updated_at: String,
  pub deleted_at: Option<String>,
}

impl RawIdea {
  /// Read a row selected with [`IDEA_COLUMNS`], optionally table-prefixed.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      idea_id:    row.get(0)?,
      user_id:    row.get(1)?,
      session_id: row.get(2)?,
      clerk_key:  row.get(3)?,
      parent_id:  row.get(4)?,
      content:    row.get(5)?,
      category:   row.get(6)?,
      status:     row.get(7)?,
      tags:       row.get(8)?,
      source:     row.get(9)?,
      group_id:   row.get(10)?,
      shareable:  row.get(11)?,
      edit_count: row.get(12)?,
      created_at: row.get(13)?,
      updated_at: row.get(14)?,
      deleted_at: row.get(15)?,
    })
  }

  pub fn into_idea(self) -> Result<Idea> {
    Ok(Idea {
      id:         IdeaId(self.idea_id),
      owner:      decode_identity(self.user_id, self.session_id),
      clerk_key:  self.clerk_key,
      parent_id:  self.parent_id.map(IdeaId),
      content:    self.content,
      category:   decode_enum("ideas.category", &self.category)?,
      status:     decode_enum("ideas.status", &self.status)?,
      tags:       decode_tags(&self.tags)?,
      source:     decode_enum("ideas.source", &self.source)?,
      group_id:   self.group_id.map(GroupId),
      shareable:  self.shareable,
      edit_count: self.edit_count,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      deleted_at: decode_opt_dt(self.deleted_at)?,
    })
  }
}

pub const LINK_COLUMNS: &str =
  "link_id, idea_a, idea_b, kind, created_by, created_at";

pub struct RawLink {
  pub link_id:    i64,
  pub idea_a:     i64,
  pub idea_b:     i64,
  pub kind:       String,
  pub created_by: Option<i64>,
  pub created_at: String,
}

impl RawLink {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      link_id:    row.get(0)?,
      idea_a:     row.get(1)?,
      idea_b:     row.get(2)?,
      kind:       row.get(3)?,
      created_by: row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_link(self) -> Result<IdeaLink> {
    Ok(IdeaLink {
      link_id:    self.link_id,
      idea_a:     IdeaId(self.idea_a),
      idea_b:     IdeaId(self.idea_b),
      kind:       decode_enum("idea_links.kind", &self.kind)?,
      created_by: self.created_by.map(UserId),
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const GROUP_COLUMNS: &str = "group_id, name, description, tags, \
  scope_level, state_id, town_id, access_level, status, public_readable, \
  public_voting, is_standard, created_by, created_at";

pub struct RawGroup {
  pub group_id:        i64,
  pub name:            String,
  pub description:     String,
  pub tags:            String,
  pub scope_level:     String,
  pub state_id:        Option<i64>,
  pub town_id:         Option<i64>,
  pub access_level:    String,
  pub status:          String,
  pub public_readable: bool,
  pub public_voting:   bool,
  pub is_standard:     bool,
  pub created_by:      Option<i64>,
  pub created_at:      String,
}

impl RawGroup {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:        row.get(0)?,
      name:            row.get(1)?,
      description:     row.get(2)?,
      tags:            row.get(3)?,
      scope_level:     row.get(4)?,
      state_id:        row.get(5)?,
      town_id:         row.get(6)?,
      access_level:    row.get(7)?,
      status:          row.get(8)?,
      public_readable: row.get(9)?,
      public_voting:   row.get(10)?,
      is_standard:     row.get(11)?,
      created_by:      row.get(12)?,
      created_at:      row.get(13)?,
    })
  }

  pub fn into_group(self) -> Result<Group> {
    let level = decode_enum("civic_groups.scope_level", &self.scope_level)?;
    Ok(Group {
      group_id:     GroupId(self.group_id),
      name:         self.name,
      description:  self.description,
      tags:         decode_tags(&self.tags)?,
      scope:        Scope::from_parts(level, self.state_id, self.town_id)?,
      access_level: decode_enum("civic_groups.access_level", &self.access_level)?,
      status:       decode_enum("civic_groups.status", &self.status)?,
      public:       PublicFlags {
        readable: self.public_readable,
        voting:   self.public_voting,
      },
      is_standard:  self.is_standard,
      created_by:   self.created_by.map(UserId),
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const MEMBER_COLUMNS: &str = "group_id, user_id, role, status, joined_at";

pub struct RawMembership {
  pub group_id:  i64,
  pub user_id:   i64,
  pub role:      String,
  pub status:    String,
  pub joined_at: String,
}

impl RawMembership {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:  row.get(0)?,
      user_id:   row.get(1)?,
      role:      row.get(2)?,
      status:    row.get(3)?,
      joined_at: row.get(4)?,
    })
  }

  pub fn into_membership(self) -> Result<Membership> {
    Ok(Membership {
      group_id:  GroupId(self.group_id),
      user_id:   UserId(self.user_id),
      role:      decode_enum("group_members.role", &self.role)?,
      status:    decode_enum("group_members.status", &self.status)?,
      joined_at: decode_dt(&self.joined_at)?,
    })
  }
}

pub const INVITE_COLUMNS: &str = "invite_id, group_id, email, user_id, \
  invited_by, accept_token, decline_token, status, created_at, expires_at, \
  resolved_at";

pub struct RawInvite {
  pub invite_id:     i64,
  pub group_id:      i64,
  pub email:         String,
  pub user_id:       Option<i64>,
  pub invited_by:    i64,
  pub accept_token:  String,
  pub decline_token: String,
  pub status:        String,
  pub created_at:    String,
  pub expires_at:    String,
  pub resolved_at:   Option<String>,
}

impl RawInvite {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      invite_id:     row.get(0)?,
      group_id:      row.get(1)?,
      email:         row.get(2)?,
      user_id:       row.get(3)?,
      invited_by:    row.get(4)?,
      accept_token:  row.get(5)?,
      decline_token: row.get(6)?,
      status:        row.get(7)?,
      created_at:    row.get(8)?,
      expires_at:    row.get(9)?,
      resolved_at:   row.get(10)?,
    })
  }

  pub fn into_invite(self) -> Result<Invite> {
    Ok(Invite {
      invite_id:     self.invite_id,
      group_id:      GroupId(self.group_id),
      email:         self.email,
      user_id:       self.user_id.map(UserId),
      invited_by:    UserId(self.invited_by),
      accept_token:  self.accept_token,
      decline_token: self.decline_token,
      status:        decode_enum("group_invites.status", &self.status)?,
      created_at:    decode_dt(&self.created_at)?,
      expires_at:    decode_dt(&self.expires_at)?,
      resolved_at:   decode_opt_dt(self.resolved_at)?,
    })
  }
}

pub const USER_COLUMNS: &str =
  "user_id, handle, email, email_verified, tier, civic_points, created_at";

pub struct RawUser {
  pub user_id:        i64,
  pub handle:         String,
  pub email:          Option<String>,
  pub email_verified: bool,
  pub tier:           String,
  pub civic_points:   i64,
  pub created_at:     String,
}

impl RawUser {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:        row.get(0)?,
      handle:         row.get(1)?,
      email:          row.get(2)?,
      email_verified: row.get(3)?,
      tier:           row.get(4)?,
      civic_points:   row.get(5)?,
      created_at:     row.get(6)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:        UserId(self.user_id),
      handle:         self.handle,
      email:          self.email,
      email_verified: self.email_verified,
      tier:           decode_enum("users.tier", &self.tier)?,
      civic_points:   self.civic_points,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

pub const LOG_COLUMNS: &str = "log_id, user_id, session_id, action_name, \
  points_earned, context_type, context_id, earned_at";

pub struct RawLogEntry {
  pub log_id:        i64,
  pub user_id:       Option<i64>,
  pub session_id:    Option<String>,
  pub action_name:   String,
  pub points_earned: i64,
  pub context_type:  Option<String>,
  pub context_id:    Option<String>,
  pub earned_at:     String,
}

impl RawLogEntry {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      log_id:        row.get(0)?,
      user_id:       row.get(1)?,
      session_id:    row.get(2)?,
      action_name:   row.get(3)?,
      points_earned: row.get(4)?,
      context_type:  row.get(5)?,
      context_id:    row.get(6)?,
      earned_at:     row.get(7)?,
    })
  }

  pub fn into_entry(self) -> Result<PointLogEntry> {
    Ok(PointLogEntry {
      log_id:        self.log_id,
      user_id:       self.user_id.map(UserId),
      session_id:    self.session_id.map(SessionId),
      action_name:   self.action_name,
      points_earned: self.points_earned,
      context:       PointContext {
        context_type: self.context_type,
        context_id:   self.context_id,
      },
      earned_at:     decode_dt(&self.earned_at)?,
    })
  }
}
