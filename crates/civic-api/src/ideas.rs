//! Handlers for `/ideas` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/ideas` | Own personal ideas, or `?group_id` (read access) |
//! | `POST`   | `/ideas` | Body: [`NewIdeaBody`]; 201 + idea + points |
//! | `GET`    | `/ideas/:id` | 404 when hidden or soft-deleted |
//! | `PATCH`  | `/ideas/:id` | Body: `{"content":"..."}`; owner only |
//! | `DELETE` | `/ideas/:id` | `?mode=soft\|hard`; owner only |
//! | `GET`    | `/ideas/:id/thread` | Direct children, oldest first |
//! | `PUT`    | `/ideas/:id/parent` | Body: `{"parent_id":1}` |
//! | `POST`   | `/ideas/:id/promote` | Body: `{"status":"refining"}` |
//! | `PUT`    | `/ideas/:id/shareable` | Body: `{"shareable":true}` |
//! | `POST`   | `/ideas/:id/tags` | Body: `{"tags":["..."]}` |
//! | `GET`    | `/ideas/:id/votes` | Tally |
//! | `POST`   | `/ideas/:id/votes` | Body: `{"vote":"up"}` |
//! | `GET`    | `/ideas/:id/links` | Undirected links |
//! | `POST`   | `/ideas/:id/links` | Body: `{"other_id":2,"kind":"supports"}` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use civic_core::{
  Error, ResultExt,
  identity::Actor,
  idea::{
    Category, DeleteMode, Idea, IdeaLink, IdeaStatus, LinkKind, NewIdea, Source,
    Vote, VoteTally,
  },
  ids::{GroupId, IdeaId},
  ledger::PointContext,
  store::{GroupStore, IdeaQuery, IdeaStore, Order, Page},
};
use serde::Deserialize;
use tracing::debug;

use crate::{ApiState, Caller, CivicStore, Rewarded, error::ApiError};

pub const DEFAULT_PAGE: usize = 50;
pub const MAX_PAGE: usize = 200;

/// Marker an idea uses to reply to another idea of the same group.
const REPLY_MARKER: &str = "reply:#";

// ─── Visibility ──────────────────────────────────────────────────────────────

pub(crate) async fn require_read<S: CivicStore>(
  state: &ApiState<S>,
  actor: &Actor,
  group_id: GroupId,
) -> Result<(), ApiError> {
  let access = state.store.access(group_id, actor.clone()).await.err_into()?;
  if access.read {
    Ok(())
  } else {
    Err(Error::forbidden("this group's ideas are not public").into())
  }
}

/// Load an idea the caller may see. Hidden ideas are reported as missing.
///
/// Group ideas follow the access matrix. Personal ideas are visible to their
/// owner, or to anyone once shareable; a clerk reply in a personal thread is
/// visible to whoever can see the message it answers.
pub(crate) async fn visible_idea<S: CivicStore>(
  state: &ApiState<S>,
  actor: &Actor,
  idea_id: IdeaId,
) -> Result<Idea, ApiError> {
  let idea = state
    .store
    .get_idea(idea_id)
    .await
    .err_into()?
    .ok_or(Error::IdeaNotFound(idea_id))?;
  let visible = match (idea.group_id, idea.owner.as_ref()) {
    (Some(group_id), _) => {
      state.store.access(group_id, actor.clone()).await.err_into()?.read
    }
    (None, Some(owner)) => idea.shareable || actor.is(owner),
    (None, None) => match idea.parent_id {
      Some(parent_id) => state
        .store
        .get_idea(parent_id)
        .await
        .err_into()?
        .and_then(|p| p.owner)
        .is_some_and(|owner| actor.is(&owner)),
      None => false,
    },
  };
  if visible {
    Ok(idea)
  } else {
    Err(Error::IdeaNotFound(idea_id).into())
  }
}

fn page_limit(limit: Option<usize>) -> usize {
  limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// List this group's ideas instead of the caller's personal ones.
  pub group_id:   Option<GroupId>,
  pub category:   Option<Category>,
  pub status:     Option<IdeaStatus>,
  pub since:      Option<DateTime<Utc>>,
  pub parent_id:  Option<IdeaId>,
  #[serde(default)]
  pub human_only: bool,
  #[serde(default)]
  pub order:      Order,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

/// `GET /ideas[?group_id=..][&category=..][&status=..][&since=..]...`
pub async fn list<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Query(params): Query<ListParams>,
) -> Result<Json<Page<Idea>>, ApiError> {
  let mut query = IdeaQuery {
    category: params.category,
    status: params.status,
    since: params.since,
    parent_id: params.parent_id,
    human_only: params.human_only,
    order: params.order,
    limit: Some(page_limit(params.limit)),
    offset: params.offset,
    ..IdeaQuery::default()
  };
  match params.group_id {
    Some(group_id) => {
      require_read(&state, &actor, group_id).await?;
      query.group_id = Some(group_id);
    }
    None => {
      query.owner = Some(actor.identity());
      query.personal_only = true;
    }
  }
  let page = state.store.list_ideas(query).await.err_into()?;
  Ok(Json(page))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /ideas`. `category` and `source` are parsed
/// leniently: unknown values fall back instead of being rejected.
#[derive(Debug, Deserialize)]
pub struct NewIdeaBody {
  pub content:   String,
  pub category:  Option<String>,
  #[serde(default)]
  pub tags:      Vec<String>,
  pub source:    Option<String>,
  pub group_id:  Option<GroupId>,
  pub parent_id: Option<IdeaId>,
}

/// `POST /ideas` — returns 201 + the stored idea and the points it earned.
pub async fn create<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Json(body): Json<NewIdeaBody>,
) -> Result<impl IntoResponse, ApiError> {
  let input = NewIdea::new(actor.identity(), body.content)
    .with_category(body.category.as_deref().map_or(Category::Idea, Category::lenient))
    .with_source(body.source.as_deref().map_or(Source::Web, Source::lenient))
    .with_tags(body.tags)
    .with_parent(body.parent_id)
    .in_group(body.group_id);
  let idea = state.store.create_idea(input).await.err_into()?;

  let replies_to = idea.group_id.filter(|_| idea.content.contains(REPLY_MARKER));
  if let Some(group_id) = replies_to {
    let linked = state.store.materialize_reply_links(group_id).await.err_into()?;
    debug!(idea = %idea.id, linked, "reply links materialized");
  }

  let points_awarded = state
    .reward(&actor, "idea_submitted", PointContext::new("idea", idea.id))
    .await;
  Ok((StatusCode::CREATED, Json(Rewarded { item: idea, points_awarded })))
}

// ─── Read ────────────────────────────────────────────────────────────────────

/// `GET /ideas/:id`
pub async fn get_one<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
) -> Result<Json<Idea>, ApiError> {
  Ok(Json(visible_idea(&state, &actor, id).await?))
}

/// `GET /ideas/:id/thread`
pub async fn thread<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
) -> Result<Json<Vec<Idea>>, ApiError> {
  visible_idea(&state, &actor, id).await?;
  let page = state
    .store
    .list_ideas(IdeaQuery::thread(id))
    .await
    .err_into()?;
  Ok(Json(page.items))
}

// ─── Owner edits ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EditBody {
  pub content: String,
}

/// `PATCH /ideas/:id`
pub async fn edit<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
  Json(body): Json<EditBody>,
) -> Result<Json<Idea>, ApiError> {
  let idea = state.store.edit_idea(id, actor, body.content).await.err_into()?;
  Ok(Json(idea))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
  #[serde(default)]
  pub mode: DeleteMode,
}

/// `DELETE /ideas/:id[?mode=hard]` — 204.
pub async fn delete<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
  Query(params): Query<DeleteParams>,
) -> Result<StatusCode, ApiError> {
  state.store.delete_idea(id, actor, params.mode).await.err_into()?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ParentBody {
  pub parent_id: IdeaId,
}

/// `PUT /ideas/:id/parent`
pub async fn set_parent<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
  Json(body): Json<ParentBody>,
) -> Result<Json<Idea>, ApiError> {
  let idea = state
    .store
    .link_parent(id, body.parent_id, actor)
    .await
    .err_into()?;
  Ok(Json(idea))
}

#[derive(Debug, Deserialize)]
pub struct PromoteBody {
  pub status: IdeaStatus,
}

/// `POST /ideas/:id/promote`
pub async fn promote<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
  Json(body): Json<PromoteBody>,
) -> Result<Json<Rewarded<Idea>>, ApiError> {
  let idea = state
    .store
    .promote(id, actor.clone(), body.status)
    .await
    .err_into()?;
  // Archiving is not a maturity step.
  let points_awarded = match body.status.rank() {
    Some(_) => {
      state
        .reward(&actor, "idea_promoted", PointContext::new("idea", id))
        .await
    }
    None => 0,
  };
  Ok(Json(Rewarded { item: idea, points_awarded }))
}

#[derive(Debug, Deserialize)]
pub struct ShareableBody {
  pub shareable: bool,
}

/// `PUT /ideas/:id/shareable`
pub async fn shareable<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
  Json(body): Json<ShareableBody>,
) -> Result<Json<Idea>, ApiError> {
  let idea = state
    .store
    .set_shareable(id, actor, body.shareable)
    .await
    .err_into()?;
  Ok(Json(idea))
}

#[derive(Debug, Deserialize)]
pub struct TagsBody {
  pub tags: Vec<String>,
}

/// `POST /ideas/:id/tags` — merges into the existing set.
pub async fn tag<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
  Json(body): Json<TagsBody>,
) -> Result<Json<Idea>, ApiError> {
  let idea = state.store.add_tags(id, actor, body.tags).await.err_into()?;
  Ok(Json(idea))
}

// ─── Votes ───────────────────────────────────────────────────────────────────

/// `GET /ideas/:id/votes`
pub async fn tally<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
) -> Result<Json<VoteTally>, ApiError> {
  visible_idea(&state, &actor, id).await?;
  Ok(Json(state.store.tally(id).await.err_into()?))
}

#[derive(Debug, Deserialize)]
pub struct VoteBody {
  pub vote: Vote,
}

/// `POST /ideas/:id/votes` — records or replaces the caller's vote.
pub async fn vote<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
  Json(body): Json<VoteBody>,
) -> Result<Json<Rewarded<VoteTally>>, ApiError> {
  let tally = state.store.vote(id, actor.clone(), body.vote).await.err_into()?;
  let points_awarded = state
    .reward(&actor, "vote_cast", PointContext::new("idea", id))
    .await;
  Ok(Json(Rewarded { item: tally, points_awarded }))
}

// ─── Links ───────────────────────────────────────────────────────────────────

/// `GET /ideas/:id/links`
pub async fn links<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
) -> Result<Json<Vec<IdeaLink>>, ApiError> {
  visible_idea(&state, &actor, id).await?;
  Ok(Json(state.store.links(id).await.err_into()?))
}

#[derive(Debug, Deserialize)]
pub struct LinkBody {
  pub other_id: IdeaId,
  #[serde(default)]
  pub kind:     LinkKind,
}

/// `POST /ideas/:id/links` — 201 + the link.
pub async fn link<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Path(id): Path<IdeaId>,
  Json(body): Json<LinkBody>,
) -> Result<impl IntoResponse, ApiError> {
  let link = state
    .store
    .create_link(id, body.other_id, body.kind, actor)
    .await
    .err_into()?;
  Ok((StatusCode::CREATED, Json(link)))
}
