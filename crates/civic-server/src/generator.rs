//! Text generation over an Anthropic-style messages endpoint.

use std::time::Duration;

use async_trait::async_trait;
use civic_core::collab::{
  GenerationError, GenerationRequest, Speaker, TextGenerator,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::AiConfig;

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
/// Longest provider error message kept in a [`GenerationError::Rejected`].
const MAX_ERROR_CHARS: usize = 320;

#[derive(Debug, Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  kind: String,
  text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
  content: Vec<ContentBlock>,
}

/// Calls the messages endpoint with a bounded timeout. Timeouts and
/// transport failures never leave the server waiting.
pub struct HttpGenerator {
  client:   Client,
  endpoint: String,
  model:    String,
  api_key:  String,
}

impl HttpGenerator {
  pub fn new(config: &AiConfig, api_key: String) -> reqwest::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self {
      client,
      endpoint: config.endpoint.clone(),
      model: config.model.clone(),
      api_key,
    })
  }
}

fn payload(model: &str, request: &GenerationRequest) -> Value {
  let messages: Vec<Value> = request
    .history
    .iter()
    .map(|turn| {
      let role = match turn.speaker {
        Speaker::User => "user",
        Speaker::Assistant => "assistant",
      };
      json!({ "role": role, "content": turn.text })
    })
    .collect();
  let mut payload = json!({
    "model": model,
    "max_tokens": request.max_tokens,
    "messages": messages,
  });
  if !request.system_prompt.trim().is_empty() {
    payload["system"] = json!(request.system_prompt);
  }
  payload
}

fn response_text(body: MessagesResponse) -> Result<String, GenerationError> {
  let text = body
    .content
    .iter()
    .filter(|block| block.kind == "text")
    .filter_map(|block| block.text.as_deref())
    .collect::<Vec<_>>()
    .join("\n");
  let text = text.trim();
  if text.is_empty() {
    Err(GenerationError::Empty)
  } else {
    Ok(text.to_string())
  }
}

fn transport(e: reqwest::Error) -> GenerationError {
  if e.is_timeout() {
    GenerationError::Timeout
  } else {
    GenerationError::Transport(e.to_string())
  }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
  fn model(&self) -> &str { &self.model }

  async fn generate(
    &self,
    request: GenerationRequest,
  ) -> Result<String, GenerationError> {
    let resp = self
      .client
      .post(&self.endpoint)
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .json(&payload(&self.model, &request))
      .send()
      .await
      .map_err(transport)?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(GenerationError::Rejected {
        status:  status.as_u16(),
        message: body.chars().take(MAX_ERROR_CHARS).collect(),
      });
    }
    let body: MessagesResponse = resp.json().await.map_err(transport)?;
    let text = response_text(body)?;
    debug!(model = %self.model, chars = text.len(), "generated");
    Ok(text)
  }
}

/// Stand-in used when no API key is configured.
pub struct UnconfiguredGenerator;

#[async_trait]
impl TextGenerator for UnconfiguredGenerator {
  fn model(&self) -> &str { "unconfigured" }

  async fn generate(
    &self,
    _request: GenerationRequest,
  ) -> Result<String, GenerationError> {
    Err(GenerationError::Transport(
      "no text generator is configured".to_string(),
    ))
  }
}

#[cfg(test)]
mod tests {
  use civic_core::collab::Turn;

  use super::*;

  #[test]
  fn payload_maps_turns_and_system_prompt() {
    let request = GenerationRequest {
      system_prompt: "Be brief.".into(),
      history:       vec![Turn::user("hi"), Turn::assistant("hello"), Turn::user("ideas?")],
      max_tokens:    256,
    };
    let p = payload("m-1", &request);
    assert_eq!(p["model"], "m-1");
    assert_eq!(p["max_tokens"], 256);
    assert_eq!(p["system"], "Be brief.");
    assert_eq!(p["messages"][1]["role"], "assistant");
    assert_eq!(p["messages"][2]["content"], "ideas?");

    let bare = GenerationRequest { system_prompt: " ".into(), ..request };
    assert!(payload("m-1", &bare).get("system").is_none());
  }

  #[test]
  fn only_text_blocks_are_kept() {
    let body: MessagesResponse = serde_json::from_value(json!({
      "content": [
        {"type": "text", "text": "First."},
        {"type": "tool_use", "id": "x"},
        {"type": "text", "text": "Second."}
      ]
    }))
    .unwrap();
    assert_eq!(response_text(body).unwrap(), "First.\nSecond.");

    let empty: MessagesResponse =
      serde_json::from_value(json!({"content": [{"type": "text", "text": "  "}]})).unwrap();
    assert!(matches!(response_text(empty), Err(GenerationError::Empty)));
  }

  #[tokio::test]
  async fn unconfigured_generator_always_fails() {
    let request = GenerationRequest {
      system_prompt: String::new(),
      history:       vec![Turn::user("hi")],
      max_tokens:    16,
    };
    let err = UnconfiguredGenerator.generate(request).await.unwrap_err();
    assert!(matches!(err, GenerationError::Transport(_)));
  }
}
