//! One conversational turn with a persona.

use std::sync::Arc;

use civic_core::{
  ResultExt,
  collab::{GenerationRequest, TextGenerator, Turn},
  identity::Actor,
  idea::{Category, Idea, NewIdea, Source},
  ids::GroupId,
  store::IdeaStore,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
  Result,
  exec::{ActionReport, Executor},
  parse::parse,
  persona::Persona,
  render,
};

const DEFAULT_MAX_TOKENS: u32 = 1_024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatTurn {
  pub message:  String,
  /// Earlier turns, oldest first. The new message is appended.
  #[serde(default)]
  pub history:  Vec<Turn>,
  /// Scope for the saved message and any ideas the persona saves.
  #[serde(default)]
  pub group_id: Option<GroupId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
  /// Display name of the persona that answered.
  pub persona: String,
  /// The person's message, saved as a `chat` idea.
  pub message: Idea,
  /// The persona's cleaned reply, saved under `message`. `None` when
  /// generation failed or the reply was only action blocks.
  pub reply:   Option<Idea>,
  pub text:    String,
  pub actions: Vec<ActionReport>,
  /// Set when the generator failed. The message stays saved.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:   Option<String>,
}

pub struct Clerk<S> {
  store:      Arc<S>,
  generator:  Arc<dyn TextGenerator>,
  executor:   Executor<S>,
  max_tokens: u32,
}

impl<S> Clone for Clerk<S> {
  fn clone(&self) -> Self {
    Self {
      store:      self.store.clone(),
      generator:  self.generator.clone(),
      executor:   self.executor.clone(),
      max_tokens: self.max_tokens,
    }
  }
}

impl<S: IdeaStore> Clerk<S> {
  pub fn new(store: Arc<S>, generator: Arc<dyn TextGenerator>) -> Self {
    Self {
      executor: Executor::new(store.clone()),
      store,
      generator,
      max_tokens: DEFAULT_MAX_TOKENS,
    }
  }

  pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
    self.max_tokens = max_tokens;
    self
  }

  fn system_prompt(persona: &Persona) -> String {
    let tags = render::instructions(persona);
    if tags.is_empty() {
      persona.system_prompt.clone()
    } else {
      format!("{}\n\n{tags}", persona.system_prompt)
    }
  }

  /// Save the message, ask the persona, run its actions and save the reply.
  ///
  /// Only a failure to save the message is an `Err`; a generator failure is
  /// reported in [`ChatReply::error`].
  #[instrument(skip_all, fields(persona = %persona.clerk_key))]
  pub async fn respond(
    &self,
    persona: &Persona,
    actor: &Actor,
    turn: ChatTurn,
  ) -> Result<ChatReply> {
    let ChatTurn { message, mut history, group_id } = turn;
    let message = self
      .store
      .create_idea(
        NewIdea::new(actor.identity(), message)
          .with_category(Category::Chat)
          .with_source(Source::AiAssisted)
          .in_group(group_id),
      )
      .await
      .err_into()?;

    history.push(Turn::user(message.content.clone()));
    let request = GenerationRequest {
      system_prompt: Self::system_prompt(persona),
      history,
      max_tokens: self.max_tokens,
    };
    let raw = match self.generator.generate(request).await {
      Ok(raw) => raw,
      Err(e) => {
        warn!(error = %e, model = self.generator.model(), "persona unavailable");
        return Ok(ChatReply {
          persona: persona.name.clone(),
          message,
          reply: None,
          text: String::new(),
          actions: Vec::new(),
          error: Some(civic_core::Error::from(e).to_string()),
        });
      }
    };

    let parsed = parse(&raw);
    let actions = self
      .executor
      .execute_all(persona, actor, group_id, parsed.actions)
      .await;

    let reply = if parsed.text.is_empty() {
      None
    } else {
      let idea = self
        .store
        .create_idea(
          NewIdea::clerk(persona.clerk_key.clone(), parsed.text.clone())
            .with_category(Category::Chat)
            .with_source(Source::AiAssisted)
            .with_parent(Some(message.id))
            .in_group(group_id),
        )
        .await
        .err_into()?;
      Some(idea)
    };

    info!(
      message = %message.id,
      actions = actions.len(),
      failed = actions.iter().filter(|a| !a.success).count(),
      "chat turn complete"
    );
    Ok(ChatReply {
      persona: persona.name.clone(),
      message,
      reply,
      text: parsed.text,
      actions,
      error: None,
    })
  }
}
