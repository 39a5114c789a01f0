//! Persona reply parser.
//!
//! Pipeline:
//!   raw &str
//!     └─ tokenize()            → Vec<Token>
//!          └─ collect blocks   → prose + Vec<Block>
//!               └─ decode()    → Result<Action> per recognized block

use std::str::FromStr;

use civic_core::{
  idea::{Category, IdeaStatus, normalize_tags},
  ids::IdeaId,
};
use tracing::debug;

use crate::{
  Action, ActionKind, READ_LIMIT_DEFAULT, READ_LIMIT_MAX,
  error::{Error, Result},
  lex::{Token, tokenize},
};

/// A reply split into what the person sees and what the persona asked for.
#[derive(Debug)]
pub struct ParsedReply {
  /// Prose with every action block removed, trimmed.
  pub text:    String,
  /// One entry per recognized block, in order of appearance. A malformed
  /// block yields an error without affecting the others.
  pub actions: Vec<Result<Action>>,
}

// ─── Blocks ──────────────────────────────────────────────────────────────────

struct Block<'a> {
  name:   &'a str,
  fields: Vec<(String, String)>,
}

impl Block<'_> {
  /// First occurrence of `key`, ignoring case. Empty values count as absent.
  fn get(&self, key: &str) -> Option<&str> {
    self
      .fields
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(key))
      .map(|(_, v)| v.as_str())
      .filter(|v| !v.is_empty())
  }
}

fn collect(input: &str) -> (String, Vec<Block<'_>>) {
  let mut prose = String::new();
  let mut blocks: Vec<Block<'_>> = Vec::new();
  let mut blank_run = false;
  for token in tokenize(input) {
    match token {
      Token::Prose(text) => prose.push_str(text),
      Token::Marker(name) => {
        blocks.push(Block { name, fields: Vec::new() });
        blank_run = false;
      }
      Token::Field { key, value } => {
        if let Some(block) = blocks.last_mut() {
          block.fields.push((key.to_string(), value.to_string()));
        }
        blank_run = false;
      }
      Token::Continuation(text) => {
        if let Some((_, value)) =
          blocks.last_mut().and_then(|b| b.fields.last_mut())
        {
          if !value.is_empty() {
            value.push_str(if blank_run { "\n\n" } else { "\n" });
          }
          value.push_str(text);
        }
        blank_run = false;
      }
      Token::Blank => blank_run = true,
    }
  }
  (prose.trim().to_string(), blocks)
}

// ─── Parameter decoding ──────────────────────────────────────────────────────

fn required<'b>(
  block: &'b Block<'_>,
  action: ActionKind,
  key: &'static str,
) -> Result<&'b str> {
  block.get(key).ok_or(Error::MissingParam { action, key })
}

/// Accepts `12` or `#12`.
fn idea_id(action: ActionKind, key: &'static str, raw: &str) -> Result<IdeaId> {
  raw
    .trim()
    .trim_start_matches('#')
    .parse::<i64>()
    .ok()
    .filter(|id| *id > 0)
    .map(IdeaId)
    .ok_or_else(|| Error::InvalidParam { action, key, value: raw.to_string() })
}

fn tags(raw: &str) -> Vec<String> { normalize_tags(raw.split(',')) }

fn decode(kind: ActionKind, block: &Block<'_>) -> Result<Action> {
  Ok(match kind {
    ActionKind::SaveIdea => Action::SaveIdea {
      content:   required(block, kind, "content")?.to_string(),
      category:  block.get("category").map_or(Category::Idea, Category::lenient),
      tags:      block.get("tags").map(tags).unwrap_or_default(),
      parent_id: block
        .get("parent")
        .map(|raw| idea_id(kind, "parent", raw))
        .transpose()?,
    },
    ActionKind::TagIdea => {
      let tags = tags(required(block, kind, "tags")?);
      if tags.is_empty() {
        return Err(Error::MissingParam { action: kind, key: "tags" });
      }
      Action::TagIdea {
        idea_id: idea_id(kind, "idea", required(block, kind, "idea")?)?,
        tags,
      }
    }
    ActionKind::ReadIdeas => Action::ReadIdeas {
      limit:    match block.get("limit") {
        None => READ_LIMIT_DEFAULT,
        Some(raw) => raw
          .parse::<usize>()
          .ok()
          .filter(|n| *n > 0)
          .map(|n| n.min(READ_LIMIT_MAX))
          .ok_or_else(|| Error::InvalidParam {
            action: kind,
            key:    "limit",
            value:  raw.to_string(),
          })?,
      },
      category: block.get("category").map(Category::lenient),
    },
    ActionKind::PromoteIdea => {
      let raw = required(block, kind, "status")?;
      Action::PromoteIdea {
        idea_id: idea_id(kind, "idea", required(block, kind, "idea")?)?,
        status:  IdeaStatus::from_str(&raw.to_ascii_lowercase()).map_err(
          |_| Error::InvalidParam {
            action: kind,
            key:    "status",
            value:  raw.to_string(),
          },
        )?,
      }
    }
    ActionKind::LinkIdea => Action::LinkIdea {
      idea_id:   idea_id(kind, "idea", required(block, kind, "idea")?)?,
      parent_id: idea_id(kind, "parent", required(block, kind, "parent")?)?,
    },
  })
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Split a persona reply into prose and actions. Never fails as a whole;
/// unknown action names are dropped.
pub fn parse(input: &str) -> ParsedReply {
  let (text, blocks) = collect(input);
  let actions = blocks
    .iter()
    .filter_map(|block| match ActionKind::from_str(block.name) {
      Ok(kind) => Some(decode(kind, block)),
      Err(_) => {
        debug!(name = block.name, "ignoring unknown action");
        None
      }
    })
    .collect();
  ParsedReply { text, actions }
}
