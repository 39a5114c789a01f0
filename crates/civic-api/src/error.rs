//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Status codes follow the core [`ErrorKind`]: validation 400 (404 for the
//! not-found family), authorization 403, state conflicts 409, ledger
//! rejections 429, collaborator failures 503, everything else 500.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use civic_core::ErrorKind;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Neither a device token nor a session id was presented, or the token is
  /// unknown.
  #[error("authentication required")]
  Unauthenticated,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("{0} not found")]
  NotFound(&'static str),

  #[error(transparent)]
  Core(#[from] civic_core::Error),
}

impl From<civic_actions::Error> for ApiError {
  fn from(e: civic_actions::Error) -> Self {
    match e {
      civic_actions::Error::Core(inner) => ApiError::Core(inner),
      other => ApiError::BadRequest(other.to_string()),
    }
  }
}

fn kind_name(kind: ErrorKind) -> &'static str {
  match kind {
    ErrorKind::Validation => "validation",
    ErrorKind::Authorization => "authorization",
    ErrorKind::StateConflict => "state_conflict",
    ErrorKind::RaceCondition => "race_condition",
    ErrorKind::ExternalService => "external_service",
    ErrorKind::Internal => "internal",
  }
}

impl ApiError {
  pub fn status(&self) -> (StatusCode, &'static str) {
    match self {
      ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
      ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation"),
      ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
      ApiError::Core(e) if e.is_not_found() => (StatusCode::NOT_FOUND, "not_found"),
      ApiError::Core(e) => {
        let status = match e.kind() {
          ErrorKind::Validation => StatusCode::BAD_REQUEST,
          ErrorKind::Authorization => StatusCode::FORBIDDEN,
          ErrorKind::StateConflict => StatusCode::CONFLICT,
          ErrorKind::RaceCondition => StatusCode::TOO_MANY_REQUESTS,
          ErrorKind::ExternalService => StatusCode::SERVICE_UNAVAILABLE,
          ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, kind_name(e.kind()))
      }
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, kind) = self.status();
    if status.is_server_error() {
      error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string(), "kind": kind }))).into_response()
  }
}
