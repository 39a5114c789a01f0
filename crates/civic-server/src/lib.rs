//! HTTP server for the civic deliberation engine.
//!
//! Mounts the JSON API under `/api` and the operator routes under `/admin`
//! (see [`admin`]), backed by any [`CivicStore`].

pub mod admin;
pub mod auth;
pub mod error;
pub mod generator;
pub mod notifier;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, routing::get};
use civic_actions::Persona;
use civic_api::{ApiState, CivicStore};
use civic_core::ledger::{Ledger, PointAction};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::AuthConfig;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `civic.toml` and
/// `CIVIC_*` environment variables.
#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  /// Base URL used in invitation links.
  pub public_url:          String,
  pub store_path:          PathBuf,
  pub admin_username:      String,
  /// PHC string produced by `civic-server --hash-password`.
  pub admin_password_hash: String,
  #[serde(default)]
  pub ai:                  AiConfig,
  /// Replaces the built-in point action table when non-empty.
  #[serde(default)]
  pub point_actions:       Vec<PointAction>,
  /// Replaces the built-in personas when non-empty.
  #[serde(default)]
  pub personas:            Vec<Persona>,
}

/// Text-generation backend. Without an `api_key` every generation fails and
/// the AI features report themselves unavailable.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AiConfig {
  pub endpoint:     String,
  pub model:        String,
  pub api_key:      Option<String>,
  pub timeout_secs: u64,
  pub max_tokens:   u32,
}

impl Default for AiConfig {
  fn default() -> Self {
    Self {
      endpoint:     generator::DEFAULT_ENDPOINT.to_string(),
      model:        String::new(),
      api_key:      None,
      timeout_secs: 30,
      max_tokens:   1_024,
    }
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// State for the operator routes.
pub struct AdminState<S> {
  pub ledger: Ledger<S>,
  pub auth:   Arc<AuthConfig>,
}

impl<S> Clone for AdminState<S> {
  fn clone(&self) -> Self {
    Self { ledger: self.ledger.clone(), auth: self.auth.clone() }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the full application router.
pub fn router<S: CivicStore>(api: ApiState<S>, auth: Arc<AuthConfig>) -> Router {
  let admin = AdminState { ledger: api.ledger.clone(), auth };
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", civic_api::api_router(api))
    .nest("/admin", admin::router(admin))
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
  use civic_core::{
    identity::{NewUser, VerificationTier},
    ledger::PointActions,
    store::UserStore,
  };
  use civic_store_sqlite::SqliteStore;
  use rand_core::OsRng;
  use tower::ServiceExt as _;

  use super::*;
  use crate::{generator::UnconfiguredGenerator, notifier::LogNotifier};

  fn auth_config(password: &str) -> Arc<AuthConfig> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();
    Arc::new(AuthConfig { username: "admin".to_string(), password_hash: hash })
  }

  async fn app() -> (Router, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let api = ApiState::new(
      store.clone(),
      Arc::new(UnconfiguredGenerator),
      Arc::new(LogNotifier),
      Arc::new(PointActions::defaults()),
      "http://localhost:8080",
    );
    (router(api, auth_config("secret")), store)
  }

  fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    headers: Vec<(header::HeaderName, String)>,
    body: &str,
  ) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
  }

  #[tokio::test]
  async fn api_is_mounted_under_prefix() {
    let (app, _) = app().await;
    let (status, _) = send(&app, "GET", "/health", vec![], "").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
      &app,
      "GET",
      "/api/me",
      vec![(header::HeaderName::from_static("x-session-id"), "s-1".into())],
      "",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.contains("\"balance\":0"), "{body}");
  }

  #[tokio::test]
  async fn admin_requires_credentials() {
    let (app, _) = app().await;
    let (status, _) = send(&app, "GET", "/admin/actions", vec![], "").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = vec![(header::AUTHORIZATION, basic("admin", "nope"))];
    let (status, _) = send(&app, "GET", "/admin/actions", wrong, "").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let right = vec![(header::AUTHORIZATION, basic("admin", "secret"))];
    let (status, body) = send(&app, "GET", "/admin/actions", right, "").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("idea_submitted"), "{body}");
  }

  #[tokio::test]
  async fn milestones_and_reconciliation() {
    let (app, store) = app().await;
    let user = store
      .create_user(NewUser {
        handle:         "ada".into(),
        email:          None,
        email_verified: false,
        tier:           VerificationTier::Anonymous,
      })
      .await
      .unwrap();
    let auth = || {
      vec![
        (header::AUTHORIZATION, basic("admin", "secret")),
        (header::CONTENT_TYPE, "application/json".to_string()),
      ]
    };

    let uri = format!("/admin/users/{}/milestones", user.user_id);
    let (status, body) = send(
      &app,
      "POST",
      &uri,
      auth(),
      r#"{"milestone_id":"first_proposal","points":40}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let uri = format!("/admin/users/{}/reconcile", user.user_id);
    let (status, body) = send(&app, "POST", &uri, auth(), "").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.contains("\"recorded\":40"), "{body}");
    assert!(body.contains("\"replayed\":40"), "{body}");
  }
}
