//! Handlers for `/groups` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/groups` | Optional `?mine`, `role`, `level`, `state_id`, `town_id`, `status` |
//! | `POST`  | `/groups` | Body: [`NewGroup`]; 201 + group + points |
//! | `GET`   | `/groups/:id` | 404 if not found |
//! | `PATCH` | `/groups/:id` | Body: [`GroupUpdate`]; facilitator only |
//! | `POST`  | `/groups/:id/join` | Role follows the access level |
//! | `POST`  | `/groups/:id/leave` | Facilitator safeguard applies |
//! | `GET`   | `/groups/:id/access` | The caller's read/write/vote rights |
//! | `GET`   | `/groups/:id/members` | Requires read access |
//! | `PATCH` | `/groups/:id/members/:user_id` | Body: [`MemberChange`] |
//! | `POST`  | `/groups/:id/reply-links` | Requires write access |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use civic_core::{
  Error, ResultExt,
  group::{
    Access, Group, GroupStatus, GroupUpdate, MemberChange, Membership, NewGroup,
    Role, ScopeLevel,
  },
  ids::{GroupId, UserId},
  ledger::PointContext,
  store::{GroupQuery, GroupStore, IdeaStore, Page},
};
use serde::{Deserialize, Serialize};

use crate::{
  ApiState, Caller, CivicStore, Rewarded, error::ApiError, ideas::MAX_PAGE,
};

async fn require_group<S: CivicStore>(
  state: &ApiState<S>,
  group_id: GroupId,
) -> Result<Group, ApiError> {
  Ok(
    state
      .store
      .get_group(group_id)
      .await
      .err_into()?
      .ok_or(Error::GroupNotFound(group_id))?,
  )
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// Only groups the caller belongs to.
  #[serde(default)]
  pub mine:     bool,
  pub role:     Option<Role>,
  pub level:    Option<ScopeLevel>,
  pub state_id: Option<i64>,
  pub town_id:  Option<i64>,
  pub status:   Option<GroupStatus>,
  pub limit:    Option<usize>,
  pub offset:   Option<usize>,
}

/// `GET /groups[?mine=true][&role=..][&level=..][&state_id=..]...`
pub async fn list<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Query(params): Query<ListParams>,
) -> Result<Json<Page<Group>>, ApiError> {
  let member = if params.mine {
    Some(actor.user_id().ok_or(ApiError::Unauthenticated)?)
  } else {
    None
  };
  let page = state
    .store
    .list_groups(GroupQuery {
      member,
      role: params.role,
      level: params.level,
      state_id: params.state_id,
      town_id: params.town_id,
      status: params.status,
      limit: Some(params.limit.unwrap_or(MAX_PAGE).clamp(1, MAX_PAGE)),
      offset: params.offset,
    })
    .await
    .err_into()?;
  Ok(Json(page))
}

// ─── Create / read / update ──────────────────────────────────────────────────

/// `POST /groups` — the caller becomes the first facilitator.
pub async fn create<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Json(body): Json<NewGroup>,
) -> Result<impl IntoResponse, ApiError> {
  let group = state.store.create_group(body, actor.clone()).await.err_into()?;
  let points_awarded = state
    .reward(&actor, "group_created", PointContext::new("group", group.group_id))
    .await;
  Ok((StatusCode::CREATED, Json(Rewarded { item: group, points_awarded })))
}

/// `GET /groups/:id`
pub async fn get_one<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Path(id): Path<GroupId>,
) -> Result<Json<Group>, ApiError> {
  Ok(Json(require_group(&state, id).await?))
}

/// `PATCH /groups/:id`
pub async fn update<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
  Json(body): Json<GroupUpdate>,
) -> Result<Json<Group>, ApiError> {
  Ok(Json(state.store.update_group(id, actor, body).await.err_into()?))
}

// ─── Membership ──────────────────────────────────────────────────────────────

/// `POST /groups/:id/join`
pub async fn join<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
) -> Result<Json<Rewarded<Membership>>, ApiError> {
  let membership = state.store.join_group(id, actor.clone()).await.err_into()?;
  let points_awarded = state
    .reward(&actor, "group_joined", PointContext::new("group", id))
    .await;
  Ok(Json(Rewarded { item: membership, points_awarded }))
}

/// `POST /groups/:id/leave` — 204.
pub async fn leave<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
) -> Result<StatusCode, ApiError> {
  state.store.leave_group(id, actor).await.err_into()?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /groups/:id/access`
pub async fn access<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
) -> Result<Json<Access>, ApiError> {
  Ok(Json(state.store.access(id, actor).await.err_into()?))
}

/// `GET /groups/:id/members`
pub async fn members<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
) -> Result<Json<Vec<Membership>>, ApiError> {
  if !state.store.access(id, actor).await.err_into()?.read {
    return Err(Error::forbidden("members are visible to readers only").into());
  }
  Ok(Json(state.store.members(id).await.err_into()?))
}

/// Result of `PATCH /groups/:id/members/:user_id`; `membership` is `null`
/// after a removal.
#[derive(Debug, Serialize)]
pub struct MemberUpdate {
  pub membership: Option<Membership>,
}

/// `PATCH /groups/:id/members/:user_id` — facilitator only.
pub async fn update_member<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path((id, user_id)): Path<(GroupId, UserId)>,
  Json(change): Json<MemberChange>,
) -> Result<Json<MemberUpdate>, ApiError> {
  let membership = state
    .store
    .update_member(id, actor, user_id, change)
    .await
    .err_into()?;
  Ok(Json(MemberUpdate { membership }))
}

#[derive(Debug, Serialize)]
pub struct ReplyLinks {
  pub linked: usize,
}

/// `POST /groups/:id/reply-links` — turn `reply:#id` references into links.
pub async fn reply_links<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
) -> Result<Json<ReplyLinks>, ApiError> {
  if !state.store.access(id, actor).await.err_into()?.write {
    return Err(Error::forbidden("requires write access").into());
  }
  let linked = state.store.materialize_reply_links(id).await.err_into()?;
  Ok(Json(ReplyLinks { linked }))
}
