//! Request identity.
//!
//! `Authorization: Bearer <device token>` resolves to a registered user.
//! Otherwise `X-Session-Id` identifies an anonymous visitor. Requests with
//! neither are rejected with 401.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use civic_core::{ResultExt, identity::Actor, ids::SessionId, store::UserStore};

use crate::{ApiState, CivicStore, error::ApiError};

pub const SESSION_HEADER: &str = "x-session-id";

const MAX_SESSION_ID_LEN: usize = 128;

/// The resolved requester of an API call.
#[derive(Debug, Clone)]
pub struct Caller(pub Actor);

fn bearer(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)?
    .to_str()
    .ok()?
    .strip_prefix("Bearer ")
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

/// The anonymous session presented with the request, if any.
pub fn session_id(headers: &HeaderMap) -> Option<SessionId> {
  headers
    .get(SESSION_HEADER)?
    .to_str()
    .ok()
    .map(str::trim)
    .filter(|s| !s.is_empty() && s.len() <= MAX_SESSION_ID_LEN)
    .map(SessionId::new)
}

impl<S: CivicStore> FromRequestParts<ApiState<S>> for Caller {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &ApiState<S>,
  ) -> Result<Self, Self::Rejection> {
    if let Some(token) = bearer(&parts.headers) {
      let user = state
        .store
        .resolve_device_session(token.to_string())
        .await
        .err_into()?
        .ok_or(ApiError::Unauthenticated)?;
      return Ok(Caller(user.actor()));
    }
    session_id(&parts.headers)
      .map(|s| Caller(Actor::Anonymous { session_id: s }))
      .ok_or(ApiError::Unauthenticated)
  }
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  #[test]
  fn bearer_requires_the_scheme() {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
    assert_eq!(bearer(&headers), None);
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  t0k "));
    assert_eq!(bearer(&headers), Some("t0k"));
  }

  #[test]
  fn session_ids_are_bounded() {
    let mut headers = HeaderMap::new();
    assert!(session_id(&headers).is_none());
    headers.insert(SESSION_HEADER, HeaderValue::from_static("  "));
    assert!(session_id(&headers).is_none());
    let long = "x".repeat(MAX_SESSION_ID_LEN + 1);
    headers.insert(SESSION_HEADER, HeaderValue::from_str(&long).unwrap());
    assert!(session_id(&headers).is_none());
    headers.insert(SESSION_HEADER, HeaderValue::from_static("abc"));
    assert_eq!(session_id(&headers), Some(SessionId::new("abc")));
  }
}
