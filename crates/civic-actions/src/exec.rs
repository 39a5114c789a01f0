//! Runs decoded actions against the idea store.

use std::sync::Arc;

use civic_core::{
  ResultExt,
  identity::Actor,
  idea::{Category, IdeaStatus, NewIdea, Source},
  ids::{GroupId, IdeaId},
  store::{IdeaQuery, IdeaStore},
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{Action, ActionKind, READ_LIMIT_MAX, Result, persona::Persona};

/// One line of a read-back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdeaLine {
  pub id:       IdeaId,
  pub category: Category,
  pub status:   IdeaStatus,
  pub content:  String,
}

/// What a successful action did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
  Saved { idea_id: IdeaId },
  Tagged { idea_id: IdeaId, tags: Vec<String> },
  Read { ideas: Vec<IdeaLine> },
  Promoted { idea_id: IdeaId, status: IdeaStatus },
  Linked { idea_id: IdeaId, parent_id: IdeaId },
}

/// Per-action result returned alongside a reply.
#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
  /// `None` only when the failure could not be tied to an action kind.
  pub action:  Option<ActionKind>,
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub outcome: Option<Outcome>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:   Option<String>,
}

impl ActionReport {
  fn ok(action: ActionKind, outcome: Outcome) -> Self {
    Self {
      action:  Some(action),
      success: true,
      outcome: Some(outcome),
      error:   None,
    }
  }

  fn failed(action: Option<ActionKind>, error: &crate::Error) -> Self {
    Self {
      action,
      success: false,
      outcome: None,
      error: Some(error.to_string()),
    }
  }
}

/// Executes actions on behalf of the person in the conversation. Every store
/// call carries that person's [`Actor`], so a persona can never do more than
/// the person could do directly.
pub struct Executor<S> {
  store: Arc<S>,
}

impl<S> Clone for Executor<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: IdeaStore> Executor<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Run one action after checking `persona` may run it.
  pub async fn execute(
    &self,
    persona: &Persona,
    actor: &Actor,
    group_id: Option<GroupId>,
    action: Action,
  ) -> Result<Outcome> {
    persona.authorize(action.kind())?;
    let store = &self.store;
    let outcome = match action {
      Action::SaveIdea { content, category, tags, parent_id } => {
        let idea = store
          .create_idea(
            NewIdea::new(actor.identity(), content)
              .with_category(category)
              .with_tags(tags)
              .with_parent(parent_id)
              .with_source(Source::AiAssisted)
              .in_group(group_id),
          )
          .await
          .err_into()?;
        Outcome::Saved { idea_id: idea.id }
      }
      Action::TagIdea { idea_id, tags } => {
        let idea = store.add_tags(idea_id, actor.clone(), tags).await.err_into()?;
        Outcome::Tagged { idea_id, tags: idea.tags }
      }
      Action::ReadIdeas { limit, category } => {
        let page = store
          .list_ideas(IdeaQuery {
            owner: Some(actor.identity()),
            group_id,
            personal_only: group_id.is_none(),
            category,
            exclude: category.is_none().then_some(Category::Chat),
            human_only: true,
            limit: Some(limit.min(READ_LIMIT_MAX)),
            ..IdeaQuery::default()
          })
          .await
          .err_into()?;
        let ideas = page
          .items
          .into_iter()
          .map(|i| IdeaLine {
            id:       i.id,
            category: i.category,
            status:   i.status,
            content:  i.content,
          })
          .collect();
        Outcome::Read { ideas }
      }
      Action::PromoteIdea { idea_id, status } => {
        let idea = store.promote(idea_id, actor.clone(), status).await.err_into()?;
        Outcome::Promoted { idea_id, status: idea.status }
      }
      Action::LinkIdea { idea_id, parent_id } => {
        store
          .link_parent(idea_id, parent_id, actor.clone())
          .await
          .err_into()?;
        Outcome::Linked { idea_id, parent_id }
      }
    };
    Ok(outcome)
  }

  /// Run every parsed action in order. A failure is reported and does not
  /// stop the actions after it.
  pub async fn execute_all(
    &self,
    persona: &Persona,
    actor: &Actor,
    group_id: Option<GroupId>,
    actions: Vec<Result<Action>>,
  ) -> Vec<ActionReport> {
    let mut reports = Vec::with_capacity(actions.len());
    for parsed in actions {
      let report = match parsed {
        Ok(action) => {
          let kind = action.kind();
          match self.execute(persona, actor, group_id, action).await {
            Ok(outcome) => {
              debug!(action = %kind, "action executed");
              ActionReport::ok(kind, outcome)
            }
            Err(e) => {
              warn!(action = %kind, error = %e, "action failed");
              ActionReport::failed(Some(kind), &e)
            }
          }
        }
        Err(e) => {
          debug!(error = %e, "malformed action block");
          ActionReport::failed(e.action(), &e)
        }
      };
      reports.push(report);
    }
    reports
  }
}
