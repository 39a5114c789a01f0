//! Identity and civic-points endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/me` | Profile and balance of the caller |
//! | `POST` | `/users` | Body: `{"handle":"..","email":".."}`; claims the `X-Session-Id` points |
//! | `GET`  | `/points` | Balance and recent history; `?limit` |
//! | `POST` | `/points/claim` | Registered caller + `X-Session-Id` header |
//! | `POST` | `/points/visit` | Awards `page_visit` |

use axum::{
  Json,
  extract::{Query, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use civic_core::{
  Error, ResultExt,
  identity::{Actor, NewUser, User, VerificationTier},
  invite::normalize_email,
  ledger::{PointContext, PointLogEntry, Transfer},
  store::UserStore,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
  ApiState, Caller, CivicStore, Rewarded, caller::session_id, error::ApiError,
};

const DEFAULT_HISTORY: usize = 20;
const MAX_HISTORY: usize = 100;
const MAX_HANDLE_LEN: usize = 40;

// ─── Me ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Me {
  /// `null` for anonymous sessions.
  pub user:    Option<User>,
  pub session: Option<String>,
  pub balance: i64,
}

/// `GET /me`
pub async fn me<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
) -> Result<Json<Me>, ApiError> {
  let balance = state.ledger.balance(actor.identity()).await?;
  let me = match &actor {
    Actor::User { user_id, .. } => {
      let user = state
        .store
        .get_user(*user_id)
        .await
        .err_into()?
        .ok_or(Error::UserNotFound(*user_id))?;
      Me { user: Some(user), session: None, balance }
    }
    Actor::Anonymous { session_id } => Me {
      user: None,
      session: Some(session_id.to_string()),
      balance,
    },
  };
  Ok(Json(me))
}

// ─── Signup ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SignupBody {
  pub handle: String,
  #[serde(default)]
  pub email:  Option<String>,
}

/// `POST /users` — create an unverified account and claim the anonymous
/// session's points, if one is presented.
pub async fn signup<S: CivicStore>(
  State(state): State<ApiState<S>>,
  headers: HeaderMap,
  Json(body): Json<SignupBody>,
) -> Result<impl IntoResponse, ApiError> {
  let handle = body.handle.trim();
  if handle.is_empty() || handle.chars().count() > MAX_HANDLE_LEN {
    return Err(ApiError::BadRequest(format!(
      "handle must be 1 to {MAX_HANDLE_LEN} characters"
    )));
  }
  let email = match body.email.as_deref().map(str::trim) {
    None | Some("") => None,
    Some(raw) => Some(
      normalize_email(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid email {raw:?}")))?,
    ),
  };

  let registration = state
    .store
    .register(
      NewUser {
        handle: handle.to_string(),
        email,
        email_verified: false,
        tier: VerificationTier::Anonymous,
      },
      session_id(&headers),
    )
    .await
    .err_into()?;
  info!(
    user = %registration.user.user_id,
    claimed = registration.transfer.points_transferred,
    "account created"
  );

  Ok((StatusCode::CREATED, Json(registration)))
}

// ─── Points ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
  pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
  pub balance: i64,
  pub history: Vec<PointLogEntry>,
}

/// `GET /points[?limit=20]`
pub async fn summary<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Summary>, ApiError> {
  let limit = params.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY);
  let balance = state.ledger.balance(actor.identity()).await?;
  let history = state.ledger.history(actor.identity(), limit).await?;
  Ok(Json(Summary { balance, history }))
}

/// `POST /points/claim` — move a session's points onto the calling user.
/// Claiming twice is harmless.
pub async fn claim<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  headers: HeaderMap,
) -> Result<Json<Transfer>, ApiError> {
  let user_id = actor
    .user_id()
    .ok_or_else(|| Error::forbidden("only registered users can claim points"))?;
  let sid = session_id(&headers).ok_or_else(|| {
    ApiError::BadRequest("missing X-Session-Id header".to_string())
  })?;
  Ok(Json(state.ledger.transfer_session(sid, user_id).await?))
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Visit {
  #[serde(default)]
  pub page: Option<String>,
}

/// `POST /points/visit`
pub async fn visit<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Json(body): Json<Visit>,
) -> Json<Rewarded<Visit>> {
  let context = match &body.page {
    Some(page) => PointContext::new("page", page),
    None => PointContext::default(),
  };
  let points_awarded = state.reward(&actor, "page_visit", context).await;
  Json(Rewarded { item: body, points_awarded })
}
