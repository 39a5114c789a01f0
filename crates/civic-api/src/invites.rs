//! Handlers for invitation endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/groups/:id/invites` | Facilitator only |
//! | `POST` | `/groups/:id/invites` | Body: `{"emails":[...]}`; one result per address |
//! | `POST` | `/invites/accept/:token` | No identity required |
//! | `POST` | `/invites/decline/:token` | No identity required |

use axum::{
  Json,
  extract::{Path, State},
};
use civic_core::{
  ResultExt,
  identity::Actor,
  ids::GroupId,
  invite::{Invite, InviteDecision, InviteResult, Resolution, send_invites},
  ledger::PointContext,
  store::{GroupStore, UserStore},
};
use serde::Deserialize;
use tracing::info;

use crate::{ApiState, Caller, CivicStore, Rewarded, error::ApiError};

/// Most addresses accepted in one request.
pub const MAX_INVITES: usize = 50;

#[derive(Debug, Deserialize)]
pub struct InviteBody {
  pub emails: Vec<String>,
}

/// `POST /groups/:id/invites`
pub async fn send<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
  Json(body): Json<InviteBody>,
) -> Result<Json<Vec<InviteResult>>, ApiError> {
  if body.emails.len() > MAX_INVITES {
    return Err(ApiError::BadRequest(format!(
      "at most {MAX_INVITES} addresses per request"
    )));
  }
  let results = send_invites(
    state.store.as_ref(),
    state.notifier.as_ref(),
    id,
    &actor,
    body.emails,
    &state.public_url,
  )
  .await?;
  Ok(Json(results))
}

/// `GET /groups/:id/invites`
pub async fn list<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
) -> Result<Json<Vec<Invite>>, ApiError> {
  Ok(Json(state.store.list_invites(id, actor).await.err_into()?))
}

async fn resolve<S: CivicStore>(
  state: &ApiState<S>,
  token: String,
  decision: InviteDecision,
) -> Result<Rewarded<Resolution>, ApiError> {
  let resolution = state
    .store
    .resolve_invite(token, decision)
    .await
    .err_into()?;
  let points_awarded = match &resolution {
    Resolution::Accepted { user_id, group_id, .. } => {
      let user = state
        .store
        .get_user(*user_id)
        .await
        .err_into()?
        .ok_or(civic_core::Error::UserNotFound(*user_id))?;
      info!(group = %group_id, user = %user_id, "invite accepted");
      let actor: Actor = user.actor();
      state
        .reward(&actor, "invite_accepted", PointContext::new("group", group_id))
        .await
    }
    _ => 0,
  };
  Ok(Rewarded { item: resolution, points_awarded })
}

/// `POST /invites/accept/:token` — a newly provisioned account receives its
/// device token in `provisioned`.
pub async fn accept<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Path(token): Path<String>,
) -> Result<Json<Rewarded<Resolution>>, ApiError> {
  Ok(Json(resolve(&state, token, InviteDecision::Accept).await?))
}

/// `POST /invites/decline/:token`
pub async fn decline<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Path(token): Path<String>,
) -> Result<Json<Rewarded<Resolution>>, ApiError> {
  Ok(Json(resolve(&state, token, InviteDecision::Decline).await?))
}
