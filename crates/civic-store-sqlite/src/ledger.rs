//! The append-only points log and the running `civic_points` total.

use chrono::{DateTime, Utc};
use civic_core::{
  identity::Identity,
  ids::{SessionId, UserId},
  ledger::{Award, PointAction, PointContext, PointLogEntry, Reconciliation, Transfer, day_start},
};
use rusqlite::{Connection, TransactionBehavior, params};
use tracing::debug;

use crate::{
  Result,
  encode::{LOG_COLUMNS, RawLogEntry, encode_dt, identity_columns},
  users,
};

/// Identity predicate and its bound value for `points_log` queries.
fn owner_clause(identity: &Identity) -> (&'static str, rusqlite::types::Value) {
  use rusqlite::types::Value;
  match identity {
    Identity::User(id) => ("user_id = ?1", Value::Integer(id.0)),
    Identity::Session(s) => ("session_id = ?1", Value::Text(s.0.clone())),
  }
}

fn count_since(
  conn: &Connection,
  identity: &Identity,
  action: &str,
  since: DateTime<Utc>,
) -> Result<u64> {
  let (clause, owner) = owner_clause(identity);
  let n: i64 = conn.query_row(
    &format!(
      "SELECT COUNT(*) FROM points_log
       WHERE {clause} AND action_name = ?2 AND earned_at >= ?3"
    ),
    params![owner, action, encode_dt(since)],
    |r| r.get(0),
  )?;
  Ok(n as u64)
}

pub fn award(
  conn: &mut Connection,
  identity: &Identity,
  action: &PointAction,
  context: &PointContext,
) -> Result<Award> {
  let now = Utc::now();
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  if let Some(since) = action.cooldown_since(now) {
    action.check_cooldown(count_since(&tx, identity, &action.action_name, since)?)?;
  }
  if action.daily_limit.is_some() {
    let today = count_since(&tx, identity, &action.action_name, day_start(now))?;
    action.check_daily_limit(today)?;
  }
  if !action.logs() {
    return Ok(Award::Skipped);
  }
  if let Identity::User(user_id) = identity {
    users::require(&tx, *user_id)?;
  }

  let (user_id, session_id) = identity_columns(identity);
  tx.execute(
    "INSERT INTO points_log (
       user_id, session_id, action_name, points_earned,
       context_type, context_id, earned_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    params![
      user_id,
      session_id,
      action.action_name,
      action.points_value,
      context.context_type,
      context.context_id,
      encode_dt(now),
    ],
  )?;
  let log_id = tx.last_insert_rowid();
  if let Some(user_id) = user_id {
    tx.execute(
      "UPDATE users SET civic_points = civic_points + ?2 WHERE user_id = ?1",
      params![user_id, action.points_value],
    )?;
  }
  tx.commit()?;

  Ok(Award::Credited { log_id, points: action.points_value })
}

pub fn transfer(
  conn: &mut Connection,
  session_id: &SessionId,
  user_id: UserId,
) -> Result<Transfer> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let transfer = claim(&tx, session_id, user_id)?;
  tx.commit()?;
  Ok(transfer)
}

/// Move a session's unclaimed rows onto `user_id` inside the caller's
/// transaction.
pub fn claim(
  tx: &Connection,
  session_id: &SessionId,
  user_id: UserId,
) -> Result<Transfer> {
  users::require(tx, user_id)?;

  let (rows, points): (i64, i64) = tx.query_row(
    "SELECT COUNT(*), COALESCE(SUM(points_earned), 0) FROM points_log
     WHERE session_id = ?1 AND user_id IS NULL",
    params![session_id.0],
    |r| Ok((r.get(0)?, r.get(1)?)),
  )?;
  if rows > 0 {
    tx.execute(
      "UPDATE points_log SET user_id = ?2
       WHERE session_id = ?1 AND user_id IS NULL",
      params![session_id.0, user_id.0],
    )?;
    tx.execute(
      "UPDATE users SET civic_points = civic_points + ?2 WHERE user_id = ?1",
      params![user_id.0, points],
    )?;
  }

  Ok(Transfer { rows_claimed: rows as u64, points_transferred: points })
}

pub fn recalculate(conn: &mut Connection, user_id: UserId) -> Result<Reconciliation> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let recorded = users::require(&tx, user_id)?.civic_points;
  let replayed: i64 = tx.query_row(
    "SELECT COALESCE(SUM(points_earned), 0) FROM points_log WHERE user_id = ?1",
    params![user_id.0],
    |r| r.get(0),
  )?;
  if recorded != replayed {
    tx.execute(
      "UPDATE users SET civic_points = ?2 WHERE user_id = ?1",
      params![user_id.0, replayed],
    )?;
  }
  tx.commit()?;

  debug!(user = %user_id, recorded, replayed, "ledger replayed");
  Ok(Reconciliation { user_id, recorded, replayed })
}

pub fn balance(conn: &Connection, identity: &Identity) -> Result<i64> {
  match identity {
    Identity::User(user_id) => Ok(users::require(conn, *user_id)?.civic_points),
    Identity::Session(session_id) => Ok(conn.query_row(
      "SELECT COALESCE(SUM(points_earned), 0) FROM points_log
       WHERE session_id = ?1 AND user_id IS NULL",
      params![session_id.0],
      |r| r.get(0),
    )?),
  }
}

pub fn history(conn: &Connection, identity: &Identity, limit: usize) -> Result<Vec<PointLogEntry>> {
  let (clause, owner) = owner_clause(identity);
  let mut stmt = conn.prepare(&format!(
    "SELECT {LOG_COLUMNS} FROM points_log WHERE {clause}
     ORDER BY earned_at DESC, log_id DESC LIMIT ?2"
  ))?;
  let raws = stmt
    .query_map(params![owner, limit as i64], RawLogEntry::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawLogEntry::into_entry).collect()
}
