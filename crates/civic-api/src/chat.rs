//! Conversational endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/personas` | Key, name and capabilities of each persona |
//! | `POST` | `/chat` | Body: [`ChatBody`]; unknown personas fall back to the guide |
//!
//! A generator failure does not fail the request: the message is saved and
//! the reply carries an `error` field instead.

use axum::{Json, extract::State};
use civic_actions::{ActionKind, ChatReply, ChatTurn};
use civic_core::{collab::Turn, ids::GroupId};
use serde::{Deserialize, Serialize};

use crate::{ApiState, Caller, CivicStore, error::ApiError};

/// Longest message accepted, in characters.
const MAX_MESSAGE_CHARS: usize = 8_000;
/// Most history turns forwarded to the generator.
const MAX_HISTORY_TURNS: usize = 40;

#[derive(Debug, Serialize)]
pub struct PersonaInfo {
  pub key:          String,
  pub name:         String,
  pub capabilities: Vec<ActionKind>,
}

/// `GET /personas`
pub async fn personas<S: CivicStore>(
  State(state): State<ApiState<S>>,
) -> Json<Vec<PersonaInfo>> {
  let list = state
    .personas
    .iter()
    .map(|p| PersonaInfo {
      key:          p.clerk_key.clone(),
      name:         p.name.clone(),
      capabilities: p.capabilities.clone(),
    })
    .collect();
  Json(list)
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
  #[serde(default)]
  pub persona:  Option<String>,
  pub message:  String,
  #[serde(default)]
  pub history:  Vec<Turn>,
  #[serde(default)]
  pub group_id: Option<GroupId>,
}

/// `POST /chat`
pub async fn respond<S: CivicStore>(
  State(state): State<ApiState<S>>,
  Caller(actor): Caller,
  Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, ApiError> {
  if body.message.chars().count() > MAX_MESSAGE_CHARS {
    return Err(ApiError::BadRequest(format!(
      "message exceeds {MAX_MESSAGE_CHARS} characters"
    )));
  }
  let persona = state
    .personas
    .resolve(body.persona.as_deref())
    .ok_or(ApiError::NotFound("persona"))?;

  let mut history = body.history;
  if history.len() > MAX_HISTORY_TURNS {
    history.drain(..history.len() - MAX_HISTORY_TURNS);
  }
  let turn = ChatTurn {
    message: body.message,
    history,
    group_id: body.group_id,
  };
  let reply = state.clerk.respond(persona, &actor, turn).await?;
  Ok(Json(reply))
}
