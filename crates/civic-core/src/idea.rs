//! Ideas, the atomic unit of the deliberation graph, and the edges between
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  Error, Result,
  identity::Identity,
  ids::{GroupId, IdeaId, UserId},
};

// ─── Enumerations ────────────────────────────────────────────────────────────

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
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
  Idea,
  Decision,
  Todo,
  Note,
  Question,
  Reaction,
  Distilled,
  Digest,
  Chat,
}

/// Maturity of an idea. `Raw` through `Actionable` are linear; `Archived` is
/// absorbing. See [`crate::status`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IdeaStatus {
  #[default]
  Raw,
  Refining,
  Distilled,
  Actionable,
  Archived,
}

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
  AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Source {
  Web,
  Voice,
  AiAssisted,
  Api,
}

// ─── Lenient parsing ─────────────────────────────────────────────────────────

/// Category used when a client sends a value not in [`CATEGORY_TABLE`].
pub const CATEGORY_FALLBACK: Category = Category::Idea;

/// Source used when a client sends a value not in [`SOURCE_TABLE`].
pub const SOURCE_FALLBACK: Source = Source::Web;

/// Every accepted wire value for `category`.
pub const CATEGORY_TABLE: &[(&str, Category)] = &[
  ("idea", Category::Idea),
  ("decision", Category::Decision),
  ("todo", Category::Todo),
  ("note", Category::Note),
  ("question", Category::Question),
  ("reaction", Category::Reaction),
  ("distilled", Category::Distilled),
  ("digest", Category::Digest),
  ("chat", Category::Chat),
];

/// Every accepted wire value for `source`, including legacy client names.
pub const SOURCE_TABLE: &[(&str, Source)] = &[
  ("web", Source::Web),
  ("voice", Source::Voice),
  ("ai-assisted", Source::AiAssisted),
  ("claude-web", Source::AiAssisted),
  ("claude-desktop", Source::AiAssisted),
  ("api", Source::Api),
];

fn lookup<T: Copy>(table: &[(&str, T)], raw: &str) -> Option<T> {
  let needle = raw.trim();
  table
    .iter()
    .find(|(name, _)| name.eq_ignore_ascii_case(needle))
    .map(|(_, v)| *v)
}

impl Category {
  /// Parse a client-supplied category, falling back to
  /// [`CATEGORY_FALLBACK`] instead of rejecting.
  pub fn lenient(raw: &str) -> Self {
    lookup(CATEGORY_TABLE, raw).unwrap_or(CATEGORY_FALLBACK)
  }
}

impl Source {
  /// Parse a client-supplied source, falling back to [`SOURCE_FALLBACK`].
  pub fn lenient(raw: &str) -> Self {
    lookup(SOURCE_TABLE, raw).unwrap_or(SOURCE_FALLBACK)
  }
}

// ─── Content rules ───────────────────────────────────────────────────────────

pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Trim and bound idea content.
pub fn normalize_content(raw: &str) -> Result<String> {
  let content = raw.trim();
  if content.is_empty() {
    return Err(Error::Validation("content is required".into()));
  }
  if content.chars().count() > MAX_CONTENT_CHARS {
    return Err(Error::Validation(format!(
      "content exceeds {MAX_CONTENT_CHARS} characters"
    )));
  }
  Ok(content.to_owned())
}

/// Tags behave as a set: trimmed, lowercased, deduplicated, sorted.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut out: Vec<String> = tags
    .into_iter()
    .map(|t| t.as_ref().trim().trim_start_matches('#').to_lowercase())
    .filter(|t| !t.is_empty())
    .collect();
  out.sort();
  out.dedup();
  out
}

// ─── Idea ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
  pub id:         IdeaId,
  /// `None` exactly when `clerk_key` is set.
  pub owner:      Option<Identity>,
  /// Identifies the AI persona that authored this idea.
  pub clerk_key:  Option<String>,
  pub parent_id:  Option<IdeaId>,
  pub content:    String,
  pub category:   Category,
  pub status:     IdeaStatus,
  pub tags:       Vec<String>,
  pub source:     Source,
  /// `None` means personal scope.
  pub group_id:   Option<GroupId>,
  pub shareable:  bool,
  pub edit_count: u32,
  pub created_at: DateTime<Utc>,
  /// Last content change.
  pub updated_at: DateTime<Utc>,
  pub deleted_at: Option<DateTime<Utc>>,
}

impl Idea {
  pub fn is_clerk(&self) -> bool { self.clerk_key.is_some() }

  pub fn is_deleted(&self) -> bool { self.deleted_at.is_some() }

  /// Produced by the gather/crystallize pipeline.
  pub fn is_synthesis(&self) -> bool {
    self.is_clerk()
      && matches!(self.category, Category::Digest | Category::Distilled)
  }
}

/// Input to [`crate::store::IdeaStore::create_idea`]. Build with
/// [`NewIdea::new`] or [`NewIdea::clerk`] so that exactly one of owner or
/// clerk key is set.
#[derive(Debug, Clone)]
pub struct NewIdea {
  owner:         Option<Identity>,
  clerk_key:     Option<String>,
  pub parent_id: Option<IdeaId>,
  pub content:   String,
  pub category:  Category,
  pub status:    IdeaStatus,
  pub tags:      Vec<String>,
  pub source:    Source,
  pub group_id:  Option<GroupId>,
  pub shareable: bool,
}

impl NewIdea {
  /// A human-authored idea with all optional fields defaulted.
  pub fn new(owner: Identity, content: impl Into<String>) -> Self {
    Self {
      owner:     Some(owner),
      clerk_key: None,
      parent_id: None,
      content:   content.into(),
      category:  Category::Idea,
      status:    IdeaStatus::Raw,
      tags:      Vec::new(),
      source:    Source::Web,
      group_id:  None,
      shareable: false,
    }
  }

  /// An AI-authored idea. It has no human owner.
  pub fn clerk(clerk_key: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      owner:     None,
      clerk_key: Some(clerk_key.into()),
      parent_id: None,
      content:   content.into(),
      category:  Category::Chat,
      status:    IdeaStatus::Raw,
      tags:      Vec::new(),
      source:    Source::AiAssisted,
      group_id:  None,
      shareable: false,
    }
  }

  pub fn owner(&self) -> Option<&Identity> { self.owner.as_ref() }

  pub fn clerk_key(&self) -> Option<&str> { self.clerk_key.as_deref() }

  pub fn in_group(mut self, group_id: Option<GroupId>) -> Self {
    self.group_id = group_id;
    self
  }

  pub fn with_parent(mut self, parent_id: Option<IdeaId>) -> Self {
    self.parent_id = parent_id;
    self
  }

  pub fn with_category(mut self, category: Category) -> Self {
    self.category = category;
    self
  }

  pub fn with_tags<I, S>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    self.tags = normalize_tags(tags);
    self
  }

  pub fn with_source(mut self, source: Source) -> Self {
    self.source = source;
    self
  }

  pub fn with_status(mut self, status: IdeaStatus) -> Self {
    self.status = status;
    self
  }

  /// Validate and normalize content and tags. Called by stores before any
  /// write.
  pub fn validated(mut self) -> Result<Self> {
    self.content = normalize_content(&self.content)?;
    self.tags = normalize_tags(&self.tags);
    if self.clerk_key.is_none() && self.status != IdeaStatus::Raw {
      return Err(Error::Validation(
        "human-authored ideas start at raw status".into(),
      ));
    }
    Ok(self)
  }
}

// ─── Deletion ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
  /// Hide the idea; the row is retained.
  #[default]
  Soft,
  /// Remove the row. Refused while synthesis edges reference it.
  Hard,
}

// ─── Edges ───────────────────────────────────────────────────────────────────

/// Provenance link from a digest or proposal to an idea it summarized.
/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisEdge {
  pub digest_id:  IdeaId,
  pub source_id:  IdeaId,
  pub created_at: DateTime<Utc>,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkKind {
  #[default]
  Related,
  Supports,
  Challenges,
  BuildsOn,
  Reply,
}

/// A non-ownership relation between two ideas. Stored with the smaller id
/// first; at most one link exists per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaLink {
  pub link_id:    i64,
  pub idea_a:     IdeaId,
  pub idea_b:     IdeaId,
  pub kind:       LinkKind,
  pub created_by: Option<UserId>,
  pub created_at: DateTime<Utc>,
}

// ─── Votes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
  Up,
  Down,
}

impl Vote {
  pub fn value(self) -> i64 {
    match self {
      Self::Up => 1,
      Self::Down => -1,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoteTally {
  pub up:   u32,
  pub down: u32,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ids::SessionId;

  #[test]
  fn unknown_category_and_source_fall_back() {
    assert_eq!(Category::lenient("manifesto"), CATEGORY_FALLBACK);
    assert_eq!(Category::lenient(" Question "), Category::Question);
    assert_eq!(Source::lenient("carrier-pigeon"), SOURCE_FALLBACK);
    assert_eq!(Source::lenient("claude-desktop"), Source::AiAssisted);
  }

  #[test]
  fn tables_agree_with_strum_names() {
    for (name, category) in CATEGORY_TABLE {
      assert_eq!(category.as_ref(), *name);
    }
    assert_eq!(Source::AiAssisted.as_ref(), "ai-assisted");
  }

  #[test]
  fn empty_content_is_rejected() {
    let idea = NewIdea::new(Identity::Session(SessionId::new("s1")), "   ");
    assert!(matches!(idea.validated(), Err(Error::Validation(_))));
  }

  #[test]
  fn oversized_content_is_rejected() {
    let long = "x".repeat(MAX_CONTENT_CHARS + 1);
    let idea = NewIdea::new(Identity::Session(SessionId::new("s1")), long);
    assert!(idea.validated().is_err());
  }

  #[test]
  fn tags_are_a_set() {
    let tags = normalize_tags(["Roads", " roads", "#budget", "", "Budget"]);
    assert_eq!(tags, vec!["budget", "roads"]);
  }

  #[test]
  fn clerk_ideas_have_no_owner() {
    let idea = NewIdea::clerk("gatherer", "summary");
    assert!(idea.owner().is_none());
    assert_eq!(idea.clerk_key(), Some("gatherer"));
  }
}
