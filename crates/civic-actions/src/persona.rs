//! AI personas and the action kinds each may run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ActionKind, Error, Result};

/// Key of the persona used when a requested one is unknown.
pub const DEFAULT_PERSONA: &str = "guide";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
  /// Stamped as `clerk_key` on every idea the persona writes.
  pub clerk_key:     String,
  /// Display name, shown next to replies.
  pub name:          String,
  pub system_prompt: String,
  #[serde(default)]
  pub capabilities:  Vec<ActionKind>,
}

impl Persona {
  pub fn new(
    clerk_key: impl Into<String>,
    name: impl Into<String>,
    system_prompt: impl Into<String>,
  ) -> Self {
    Self {
      clerk_key:     clerk_key.into(),
      name:          name.into(),
      system_prompt: system_prompt.into(),
      capabilities:  Vec::new(),
    }
  }

  pub fn with_capabilities(
    mut self,
    capabilities: impl IntoIterator<Item = ActionKind>,
  ) -> Self {
    for kind in capabilities {
      if !self.capabilities.contains(&kind) {
        self.capabilities.push(kind);
      }
    }
    self
  }

  pub fn can(&self, kind: ActionKind) -> bool { self.capabilities.contains(&kind) }

  pub fn authorize(&self, kind: ActionKind) -> Result<()> {
    if self.can(kind) {
      Ok(())
    } else {
      Err(Error::NotPermitted { action: kind, persona: self.name.clone() })
    }
  }

  /// Answers questions about the platform and reads back ideas; never writes.
  pub fn guide() -> Self {
    Self::new(
      DEFAULT_PERSONA,
      "Guide",
      "You are the guide for a civic deliberation platform. Help people \
       understand how ideas, groups and civic points work, and answer \
       questions about what they have already contributed. Be brief and \
       concrete.",
    )
    .with_capabilities([ActionKind::ReadIdeas])
  }

  /// A thinking partner that captures and organizes the person's ideas.
  pub fn brainstorm() -> Self {
    Self::new(
      "brainstorm",
      "Brainstorm",
      "You are a brainstorming partner for a civic deliberation platform. \
       Draw ideas out of the person, restate them crisply, and save each \
       distinct idea as it comes up. Ask one question at a time.",
    )
    .with_capabilities(ActionKind::ALL)
  }
}

/// Personas by clerk key.
#[derive(Debug, Clone)]
pub struct Personas {
  by_key: HashMap<String, Persona>,
}

impl Personas {
  pub fn new(personas: impl IntoIterator<Item = Persona>) -> Self {
    Self {
      by_key: personas
        .into_iter()
        .map(|p| (p.clerk_key.clone(), p))
        .collect(),
    }
  }

  pub fn get(&self, clerk_key: &str) -> Option<&Persona> {
    self.by_key.get(clerk_key)
  }

  /// Every persona, by key.
  pub fn iter(&self) -> impl Iterator<Item = &Persona> {
    let mut all: Vec<&Persona> = self.by_key.values().collect();
    all.sort_by(|a, b| a.clerk_key.cmp(&b.clerk_key));
    all.into_iter()
  }

  /// `clerk_key`, else [`DEFAULT_PERSONA`], else `None`.
  pub fn resolve(&self, clerk_key: Option<&str>) -> Option<&Persona> {
    clerk_key
      .and_then(|key| self.get(key))
      .or_else(|| self.get(DEFAULT_PERSONA))
  }
}

impl Default for Personas {
  fn default() -> Self { Self::new([Persona::guide(), Persona::brainstorm()]) }
}
