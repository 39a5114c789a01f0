//! Group invitations: issuing and one-way token resolution.

use chrono::Utc;
use civic_core::{
  Error as CoreError,
  group::Role,
  identity::{Actor, NewUser, VerificationTier},
  ids::{GroupId, UserId},
  invite::{
    Invite, InviteDecision, InviteOutcome, InviteStatus, IssuedInvite,
    Resolution, ResolutionStep, classify_invitee, handle_stem, invite_ttl,
    normalize_email, plan_resolution,
  },
};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Result,
  encode::{INVITE_COLUMNS, RawInvite, encode_dt},
  groups, users,
};

fn load_by(conn: &Connection, column: &str, value: &str) -> Result<Option<Invite>> {
  let raw = conn
    .query_row(
      &format!("SELECT {INVITE_COLUMNS} FROM group_invites WHERE {column} = ?1"),
      params![value],
      RawInvite::from_row,
    )
    .optional()?;
  raw.map(RawInvite::into_invite).transpose()
}

fn has_pending(conn: &Connection, group_id: GroupId, email: &str) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM group_invites
         WHERE group_id = ?1 AND email = ?2 AND status = 'pending'
           AND expires_at > ?3",
        params![group_id.0, email, encode_dt(Utc::now())],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}

fn new_token() -> String { Uuid::new_v4().simple().to_string() }

pub fn create(
  conn: &mut Connection,
  group_id: GroupId,
  requester: &Actor,
  emails: Vec<String>,
) -> Result<Vec<IssuedInvite>> {
  let tx = conn.transaction()?;
  let group = groups::require(&tx, group_id)?;
  let invited_by = groups::require_facilitator(&tx, group_id, requester)?;
  if group.is_archived() {
    return Err(CoreError::Conflict("group is archived".into()).into());
  }

  let now = Utc::now();
  let mut issued = Vec::with_capacity(emails.len());
  for raw in emails {
    let Some(email) = normalize_email(&raw) else {
      issued.push(IssuedInvite {
        email:   raw.trim().to_string(),
        outcome: InviteOutcome::InvalidEmail,
        invite:  None,
      });
      continue;
    };

    let existing = users::find_by_email(&tx, &email)?;
    let is_member = match &existing {
      Some(user) => groups::membership(&tx, group_id, user.user_id)?
        .is_some_and(|m| m.is_active()),
      None => false,
    };
    let pending = has_pending(&tx, group_id, &email)?;
    let outcome = classify_invitee(existing.as_ref(), is_member, pending);
    if outcome != InviteOutcome::Invited {
      debug!(group = %group_id, %email, ?outcome, "invite skipped");
      issued.push(IssuedInvite { email, outcome, invite: None });
      continue;
    }

    let accept_token = new_token();
    tx.execute(
      "INSERT INTO group_invites (
         group_id, email, user_id, invited_by, accept_token, decline_token,
         status, created_at, expires_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8)",
      params![
        group_id.0,
        email,
        existing.as_ref().map(|u| u.user_id.0),
        invited_by.0,
        accept_token,
        new_token(),
        encode_dt(now),
        encode_dt(now + invite_ttl()),
      ],
    )?;
    let invite = load_by(&tx, "accept_token", &accept_token)?;
    issued.push(IssuedInvite { email, outcome, invite });
  }
  tx.commit()?;

  info!(
    group = %group_id,
    invited = issued.iter().filter(|i| i.invite.is_some()).count(),
    "invites issued"
  );
  Ok(issued)
}

fn mark(conn: &Connection, invite_id: i64, status: InviteStatus, user_id: Option<UserId>) -> Result<()> {
  conn.execute(
    "UPDATE group_invites
     SET status = ?2, user_id = COALESCE(?3, user_id), resolved_at = ?4
     WHERE invite_id = ?1",
    params![
      invite_id,
      status.to_string(),
      user_id.map(|u| u.0),
      encode_dt(Utc::now()),
    ],
  )?;
  Ok(())
}

pub fn resolve(
  conn: &mut Connection,
  token: &str,
  decision: InviteDecision,
) -> Result<Resolution> {
  let column = match decision {
    InviteDecision::Accept => "accept_token",
    InviteDecision::Decline => "decline_token",
  };

  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let invite = load_by(&tx, column, token)?.ok_or(CoreError::InviteNotFound)?;
  let group_id = invite.group_id;

  let resolution = match plan_resolution(&invite, decision, Utc::now())? {
    ResolutionStep::Replay(status) => Resolution::replay(status, group_id),
    ResolutionStep::Expire => {
      mark(&tx, invite.invite_id, InviteStatus::Expired, None)?;
      Resolution::Expired { group_id }
    }
    ResolutionStep::Decline => {
      mark(&tx, invite.invite_id, InviteStatus::Declined, None)?;
      Resolution::Declined { group_id }
    }
    ResolutionStep::Accept => {
      let known = match invite.user_id {
        Some(user_id) => Some(users::require(&tx, user_id)?),
        None => users::find_by_email(&tx, &invite.email)?,
      };
      let (user_id, provisioned) = match known {
        Some(user) => {
          users::verify_email(&tx, user.user_id)?;
          (user.user_id, None)
        }
        None => {
          let handle = users::unique_handle(&tx, &handle_stem(&invite.email))?;
          let user = users::insert(&tx, NewUser {
            handle,
            email: Some(invite.email.clone()),
            email_verified: true,
            tier: VerificationTier::Remembered,
          })?;
          let session = users::create_session(&tx, user.user_id)?;
          info!(user = %user.user_id, "account provisioned from invite");
          (user.user_id, Some(session))
        }
      };

      let active = groups::membership(&tx, group_id, user_id)?
        .is_some_and(|m| m.is_active());
      if !active {
        groups::upsert_member(&tx, group_id, user_id, Role::Member)?;
      }
      mark(&tx, invite.invite_id, InviteStatus::Accepted, Some(user_id))?;
      Resolution::Accepted { user_id, group_id, provisioned }
    }
  };
  tx.commit()?;

  debug!(group = %group_id, ?decision, "invite resolved");
  Ok(resolution)
}

pub fn list(conn: &Connection, group_id: GroupId, requester: &Actor) -> Result<Vec<Invite>> {
  groups::require(conn, group_id)?;
  groups::require_facilitator(conn, group_id, requester)?;
  let mut stmt = conn.prepare(&format!(
    "SELECT {INVITE_COLUMNS} FROM group_invites
     WHERE group_id = ?1 ORDER BY created_at DESC, invite_id DESC"
  ))?;
  let raws = stmt
    .query_map(params![group_id.0], RawInvite::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawInvite::into_invite).collect()
}
