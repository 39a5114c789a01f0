//! Operator routes, all behind HTTP Basic auth.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/admin/actions` | The point action table in effect |
//! | `POST` | `/admin/users/:id/reconcile` | Replay the log and correct the running total |
//! | `POST` | `/admin/users/:id/milestones` | Body: `{"milestone_id":"..","points":40}` |

use axum::{
  Json, Router,
  extract::{Path, State},
  routing::{get, post},
};
use civic_api::CivicStore;
use civic_core::{
  ids::UserId,
  ledger::{Award, PointAction, Reconciliation},
};
use serde::Deserialize;
use tracing::info;

use crate::{AdminState, auth::Admin, error::Error};

pub fn router<S: CivicStore>(state: AdminState<S>) -> Router {
  Router::new()
    .route("/actions", get(actions::<S>))
    .route("/users/{id}/reconcile", post(reconcile::<S>))
    .route("/users/{id}/milestones", post(milestone::<S>))
    .with_state(state)
}

/// `GET /admin/actions`, sorted by name.
async fn actions<S: CivicStore>(
  _: Admin,
  State(state): State<AdminState<S>>,
) -> Json<Vec<PointAction>> {
  let mut actions: Vec<PointAction> =
    state.ledger.actions().iter().cloned().collect();
  actions.sort_by(|a, b| a.action_name.cmp(&b.action_name));
  Json(actions)
}

/// `POST /admin/users/:id/reconcile`
async fn reconcile<S: CivicStore>(
  _: Admin,
  State(state): State<AdminState<S>>,
  Path(id): Path<UserId>,
) -> Result<Json<Reconciliation>, Error> {
  let rec = state.ledger.recalculate(id).await?;
  info!(user = %id, drift = rec.drift(), "reconciled");
  Ok(Json(rec))
}

#[derive(Debug, Deserialize)]
struct MilestoneBody {
  milestone_id: String,
  points:       i64,
}

/// `POST /admin/users/:id/milestones`
async fn milestone<S: CivicStore>(
  _: Admin,
  State(state): State<AdminState<S>>,
  Path(id): Path<UserId>,
  Json(body): Json<MilestoneBody>,
) -> Result<Json<Award>, Error> {
  let award = state
    .ledger
    .award_milestone(id, &body.milestone_id, body.points)
    .await?;
  Ok(Json(award))
}
