//! Gather / crystallize endpoints and staleness reports.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/groups/:id/gather` | Write access; 201 + new digests |
//! | `POST` | `/groups/:id/crystallize` | Facilitator only; 201 + proposal |
//! | `GET`  | `/groups/:id/digests` | Newest first |
//! | `GET`  | `/groups/:id/proposal` | 404 until the group has crystallized |
//! | `GET`  | `/groups/:id/staleness` | One report per digest and proposal |
//! | `GET`  | `/ideas/:id/sources` | Includes soft-deleted sources |
//! | `GET`  | `/ideas/:id/staleness` | 400 for ordinary ideas |
//!
//! Both writes call the text generator and can take several seconds. A
//! generator failure is reported as 503 and nothing is written.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use civic_core::{
  ResultExt,
  idea::{Category, Idea},
  ids::{GroupId, IdeaId},
  store::IdeaStore,
  synthesis::Staleness,
};
use serde::Serialize;

use crate::{
  ApiState, Caller, CivicStore,
  error::ApiError,
  ideas::{require_read, visible_idea},
};

#[derive(Debug, Serialize)]
pub struct Gathered {
  pub digests: Vec<Idea>,
}

/// `POST /groups/:id/gather`
pub async fn gather<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
) -> Result<impl IntoResponse, ApiError> {
  let digests = state.synthesizer.gather(id, &actor).await?;
  Ok((StatusCode::CREATED, Json(Gathered { digests })))
}

/// `POST /groups/:id/crystallize`
pub async fn crystallize<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
) -> Result<impl IntoResponse, ApiError> {
  let proposal = state.synthesizer.crystallize(id, &actor).await?;
  Ok((StatusCode::CREATED, Json(proposal)))
}

/// `GET /groups/:id/digests`
pub async fn digests<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
) -> Result<Json<Vec<Idea>>, ApiError> {
  require_read(&state, &actor, id).await?;
  let digests = state
    .store
    .list_syntheses(id, Category::Digest)
    .await
    .err_into()?;
  Ok(Json(digests))
}

/// `GET /groups/:id/proposal`
pub async fn proposal<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
) -> Result<Json<Idea>, ApiError> {
  require_read(&state, &actor, id).await?;
  let proposal = state
    .synthesizer
    .latest_proposal(id)
    .await?
    .ok_or(ApiError::NotFound("proposal"))?;
  Ok(Json(proposal))
}

/// `GET /groups/:id/staleness`
pub async fn group_staleness<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<GroupId>,
) -> Result<Json<Vec<Staleness>>, ApiError> {
  require_read(&state, &actor, id).await?;
  Ok(Json(state.synthesizer.group_staleness(id).await?))
}

/// `GET /ideas/:id/sources`
pub async fn sources<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
) -> Result<Json<Vec<Idea>>, ApiError> {
  visible_idea(&state, &actor, id).await?;
  Ok(Json(state.store.synthesis_sources(id).await.err_into()?))
}

/// `GET /ideas/:id/staleness`
pub async fn staleness<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
) -> Result<Json<Staleness>, ApiError> {
  visible_idea(&state, &actor, id).await?;
  Ok(Json(state.synthesizer.staleness(id).await?))
}
