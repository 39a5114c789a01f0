//! Action-tag protocol for AI personas.
//!
//! A persona's reply is free text that may carry structured action blocks
//! after the conversational part:
//!
//! ```text
//! Good thinking. I've noted that down for you.
//!
//! [ACTION: SAVE_IDEA]
//! content: Fix the pothole on Elm St
//! category: todo
//! tags: roads, safety
//! ```
//!
//! [`parse`] splits a reply into the cleaned prose and the decoded
//! [`Action`]s; [`Executor`] runs them against an
//! [`IdeaStore`](civic_core::store::IdeaStore) on behalf of the person in the
//! conversation, and [`Clerk`] ties one chat turn together.
//!
//! # Quick start
//!
//! ```
//! use civic_actions::{Action, parse};
//!
//! let reply = parse("Saved!\n[ACTION: TAG_IDEA]\nidea: #12\ntags: parks");
//! assert_eq!(reply.text, "Saved!");
//! assert!(matches!(reply.actions[0], Ok(Action::TagIdea { .. })));
//! ```

pub mod clerk;
pub mod error;
pub mod exec;
mod lex;
mod parse;
pub mod persona;
pub mod render;

pub use clerk::{ChatReply, ChatTurn, Clerk};
use civic_core::{
  idea::{Category, IdeaStatus},
  ids::IdeaId,
};
pub use error::{Error, Result};
pub use exec::{ActionReport, Executor, Outcome};
pub use parse::{ParsedReply, parse};
pub use persona::{Persona, Personas};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// ─── Public types ────────────────────────────────────────────────────────────

/// Every action a persona can be allowed to run. The wire name is the
/// `SCREAMING_SNAKE_CASE` form used inside `[ACTION: ...]` markers.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
  SaveIdea,
  TagIdea,
  ReadIdeas,
  PromoteIdea,
  LinkIdea,
}

impl ActionKind {
  pub const ALL: [ActionKind; 5] = [
    ActionKind::SaveIdea,
    ActionKind::TagIdea,
    ActionKind::ReadIdeas,
    ActionKind::PromoteIdea,
    ActionKind::LinkIdea,
  ];
}

/// Default and upper bound for `READ_IDEAS` `limit`.
pub const READ_LIMIT_DEFAULT: usize = 10;
pub const READ_LIMIT_MAX: usize = 50;

/// A decoded action block. Each variant maps to exactly one store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  /// `create_idea`, owned by the person in the conversation.
  SaveIdea {
    content:   String,
    category:  Category,
    tags:      Vec<String>,
    parent_id: Option<IdeaId>,
  },
  /// `add_tags`.
  TagIdea { idea_id: IdeaId, tags: Vec<String> },
  /// `list_ideas` over the person's own ideas in the current scope.
  ReadIdeas {
    limit:    usize,
    category: Option<Category>,
  },
  /// `promote`.
  PromoteIdea { idea_id: IdeaId, status: IdeaStatus },
  /// `link_parent`.
  LinkIdea { idea_id: IdeaId, parent_id: IdeaId },
}

impl Action {
  pub fn kind(&self) -> ActionKind {
    match self {
      Action::SaveIdea { .. } => ActionKind::SaveIdea,
      Action::TagIdea { .. } => ActionKind::TagIdea,
      Action::ReadIdeas { .. } => ActionKind::ReadIdeas,
      Action::PromoteIdea { .. } => ActionKind::PromoteIdea,
      Action::LinkIdea { .. } => ActionKind::LinkIdea,
    }
  }
}
