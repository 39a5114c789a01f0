//! Accounts and device sessions.

use chrono::Utc;
use civic_core::{
  identity::{DeviceSession, NewUser, Registration, User, VerificationTier},
  ids::{SessionId, UserId},
  ledger::Transfer,
  invite::normalize_email,
};
use rand_core::{OsRng, RngCore as _};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior, params};
use sha2::{Digest as _, Sha256};

use crate::{
  Result,
  encode::{RawUser, USER_COLUMNS, decode_enum, encode_dt},
  ledger,
};

const MAX_HANDLE_SUFFIX: u32 = 10_000;

pub fn load(conn: &Connection, user_id: UserId) -> Result<Option<User>> {
  let raw = conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
      params![user_id.0],
      RawUser::from_row,
    )
    .optional()?;
  raw.map(RawUser::into_user).transpose()
}

pub fn require(conn: &Connection, user_id: UserId) -> Result<User> {
  load(conn, user_id)?
    .ok_or_else(|| civic_core::Error::UserNotFound(user_id).into())
}

/// Current tier, used to rebuild an [`Actor`](civic_core::identity::Actor)
/// for an idea owner.
pub fn tier(conn: &Connection, user_id: UserId) -> Result<VerificationTier> {
  let tier: Option<String> = conn
    .query_row(
      "SELECT tier FROM users WHERE user_id = ?1",
      params![user_id.0],
      |r| r.get(0),
    )
    .optional()?;
  match tier {
    Some(t) => decode_enum("users.tier", &t),
    None => Err(civic_core::Error::UserNotFound(user_id).into()),
  }
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
  let email = email.trim().to_lowercase();
  let raw = conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
      params![email],
      RawUser::from_row,
    )
    .optional()?;
  raw.map(RawUser::into_user).transpose()
}

/// First free handle among `stem`, `stem2`, `stem3`, ...
pub fn unique_handle(conn: &Connection, stem: &str) -> Result<String> {
  let taken = |h: &str| -> Result<bool> {
    Ok(
      conn
        .query_row("SELECT 1 FROM users WHERE handle = ?1", params![h], |_| {
          Ok(())
        })
        .optional()?
        .is_some(),
    )
  };
  if !taken(stem)? {
    return Ok(stem.to_string());
  }
  for n in 2..MAX_HANDLE_SUFFIX {
    let candidate = format!("{stem}{n}");
    if !taken(&candidate)? {
      return Ok(candidate);
    }
  }
  Err(civic_core::Error::Conflict(format!("no free handle for {stem:?}")).into())
}

pub fn insert(conn: &Connection, input: NewUser) -> Result<User> {
  let handle = input.handle.trim().to_string();
  if handle.is_empty() {
    return Err(civic_core::Error::Validation("handle is empty".into()).into());
  }
  let email = match input.email.as_deref() {
    Some(raw) => Some(normalize_email(raw).ok_or_else(|| {
      civic_core::Error::Validation(format!("invalid email {raw:?}"))
    })?),
    None => None,
  };

  let clash: Option<i64> = conn
    .query_row(
      "SELECT user_id FROM users WHERE handle = ?1 OR (email IS NOT NULL AND email = ?2)",
      params![handle, email],
      |r| r.get(0),
    )
    .optional()?;
  if clash.is_some() {
    return Err(
      civic_core::Error::Conflict("handle or email already registered".into())
        .into(),
    );
  }

  conn.execute(
    "INSERT INTO users (handle, email, email_verified, tier, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![
      handle,
      email,
      input.email_verified,
      input.tier.to_string(),
      encode_dt(Utc::now()),
    ],
  )?;
  require(conn, UserId(conn.last_insert_rowid()))
}

/// Account, first device session, and session claim in one transaction.
pub fn register(
  conn: &mut Connection,
  input: NewUser,
  claim: Option<&SessionId>,
) -> Result<Registration> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let user = insert(&tx, input)?;
  let session = create_session(&tx, user.user_id)?;
  let transfer = match claim {
    Some(session_id) => ledger::claim(&tx, session_id, user.user_id)?,
    None => Transfer::default(),
  };
  let user = require(&tx, user.user_id)?;
  tx.commit()?;
  Ok(Registration { user, session, transfer })
}

/// Mark an address verified and lift the tier to at least `remembered`.
pub fn verify_email(conn: &Connection, user_id: UserId) -> Result<()> {
  let current = tier(conn, user_id)?;
  let tier = current.max(VerificationTier::Remembered);
  conn.execute(
    "UPDATE users SET email_verified = 1, tier = ?2 WHERE user_id = ?1",
    params![user_id.0, tier.to_string()],
  )?;
  Ok(())
}

// ─── Device sessions ─────────────────────────────────────────────────────────

fn token_digest(token: &str) -> String {
  hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn create_session(
  conn: &Connection,
  user_id: UserId,
) -> Result<DeviceSession> {
  require(conn, user_id)?;
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  let token = hex::encode(bytes);
  let created_at = Utc::now();
  conn.execute(
    "INSERT INTO device_sessions (token_hash, user_id, created_at)
     VALUES (?1, ?2, ?3)",
    params![token_digest(&token), user_id.0, encode_dt(created_at)],
  )?;
  Ok(DeviceSession { token, user_id, created_at })
}

pub fn resolve_session(conn: &Connection, token: &str) -> Result<Option<User>> {
  let user_id: Option<i64> = conn
    .query_row(
      "SELECT user_id FROM device_sessions WHERE token_hash = ?1",
      params![token_digest(token)],
      |r| r.get(0),
    )
    .optional()?;
  match user_id {
    Some(id) => load(conn, UserId(id)),
    None => Ok(None),
  }
}
