//! Async HTTP client wrapping the civic JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use civic_core::{
  group::Group,
  idea::Idea,
  ids::{GroupId, IdeaId},
  store::Page,
};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

/// Connection settings for the civic API.
#[derive(Debug, Clone, Default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Device token from `civic signup`.
  pub token:    Option<String>,
  /// Anonymous session id, used when no token is set.
  pub session:  Option<String>,
}

/// Async HTTP client for the civic JSON REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    // Synthesis calls wait on the text generator.
    let client = Client::builder()
      .timeout(Duration::from_secs(120))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn identify(&self, req: RequestBuilder) -> RequestBuilder {
    let req = match &self.config.token {
      Some(token) => req.bearer_auth(token),
      None => req,
    };
    match &self.config.session {
      Some(session) => req.header("x-session-id", session),
      None => req,
    }
  }

  async fn send(&self, method: Method, path: &str, req: RequestBuilder) -> Result<Response> {
    debug!(%method, path, "request");
    let resp = self
      .identify(req)
      .send()
      .await
      .with_context(|| format!("{method} {path} failed"))?;
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let message = body["error"].as_str().unwrap_or("no details");
    Err(anyhow!("{method} {path} → {status}: {message}"))
  }

  async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let req = self.client.get(self.url(path));
    let resp = self.send(Method::GET, path, req).await?;
    resp.json().await.with_context(|| format!("deserialising {path}"))
  }

  async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
    let req = self.client.post(self.url(path)).json(body);
    let resp = self.send(Method::POST, path, req).await?;
    resp.json().await.with_context(|| format!("deserialising {path}"))
  }

  // ── Identity and points ───────────────────────────────────────────────────

  /// `GET /api/me`
  pub async fn me(&self) -> Result<Value> { self.get("/me").await }

  /// `POST /api/users`
  pub async fn signup(&self, handle: &str, email: Option<&str>) -> Result<Value> {
    let body = serde_json::json!({ "handle": handle, "email": email });
    self.post("/users", &body).await
  }

  /// `GET /api/points?limit=<n>`
  pub async fn points(&self, limit: usize) -> Result<Value> {
    self.get(&format!("/points?limit={limit}")).await
  }

  /// `POST /api/points/claim`
  pub async fn claim(&self) -> Result<Value> {
    self.post("/points/claim", &serde_json::json!({})).await
  }

  // ── Ideas ─────────────────────────────────────────────────────────────────

  /// `GET /api/ideas[?group_id=<id>]`
  pub async fn list_ideas(&self, group: Option<GroupId>) -> Result<Page<Idea>> {
    match group {
      Some(id) => self.get(&format!("/ideas?group_id={id}")).await,
      None => self.get("/ideas").await,
    }
  }

  /// `GET /api/ideas/<id>`
  pub async fn get_idea(&self, id: IdeaId) -> Result<Idea> {
    self.get(&format!("/ideas/{id}")).await
  }

  /// `GET /api/ideas/<id>/thread`
  pub async fn thread(&self, id: IdeaId) -> Result<Vec<Idea>> {
    self.get(&format!("/ideas/{id}/thread")).await
  }

  /// `POST /api/ideas`
  pub async fn add_idea(&self, body: &Value) -> Result<Value> {
    self.post("/ideas", body).await
  }

  /// `POST /api/ideas/<id>/promote`
  pub async fn promote(&self, id: IdeaId, status: &str) -> Result<Value> {
    let body = serde_json::json!({ "status": status });
    self.post(&format!("/ideas/{id}/promote"), &body).await
  }

  /// `POST /api/ideas/<id>/votes`
  pub async fn vote(&self, id: IdeaId, vote: &str) -> Result<Value> {
    let body = serde_json::json!({ "vote": vote });
    self.post(&format!("/ideas/{id}/votes"), &body).await
  }

  // ── Groups ────────────────────────────────────────────────────────────────

  /// `GET /api/groups[?mine=true]`
  pub async fn list_groups(&self, mine: bool) -> Result<Page<Group>> {
    self.get(&format!("/groups?mine={mine}")).await
  }

  /// `POST /api/groups`
  pub async fn create_group(&self, body: &Value) -> Result<Value> {
    self.post("/groups", body).await
  }

  /// `POST /api/groups/<id>/join`
  pub async fn join(&self, id: GroupId) -> Result<Value> {
    self.post(&format!("/groups/{id}/join"), &serde_json::json!({})).await
  }

  /// `POST /api/groups/<id>/invites`
  pub async fn invite(&self, id: GroupId, emails: &[String]) -> Result<Value> {
    let body = serde_json::json!({ "emails": emails });
    self.post(&format!("/groups/{id}/invites"), &body).await
  }

  // ── Synthesis ─────────────────────────────────────────────────────────────

  /// `POST /api/groups/<id>/gather`
  pub async fn gather(&self, id: GroupId) -> Result<Value> {
    self.post(&format!("/groups/{id}/gather"), &serde_json::json!({})).await
  }

  /// `POST /api/groups/<id>/crystallize`
  pub async fn crystallize(&self, id: GroupId) -> Result<Idea> {
    self.post(&format!("/groups/{id}/crystallize"), &serde_json::json!({})).await
  }

  /// `GET /api/groups/<id>/staleness`
  pub async fn staleness(&self, id: GroupId) -> Result<Value> {
    self.get(&format!("/groups/{id}/staleness")).await
  }

  // ── Chat ──────────────────────────────────────────────────────────────────

  /// `POST /api/chat`
  pub async fn chat(&self, body: &Value) -> Result<Value> {
    self.post("/chat", body).await
  }
}
