//! Action-tag documentation injected into a persona's system prompt.

use std::fmt::Write;

use crate::{ActionKind, READ_LIMIT_DEFAULT, READ_LIMIT_MAX, persona::Persona};

fn usage(kind: ActionKind) -> (&'static str, &'static str) {
  match kind {
    ActionKind::SaveIdea => (
      "To save an idea the person has expressed",
      "content: {the idea, in their words}\n\
       category: {idea|decision|todo|note|question|reaction}\n\
       tags: {optional, comma separated}\n\
       parent: {optional id of the idea this builds on}",
    ),
    ActionKind::TagIdea => (
      "To tag one of the person's ideas",
      "idea: {idea id}\ntags: {comma separated}",
    ),
    ActionKind::ReadIdeas => (
      "To read back the person's recent ideas",
      "limit: {optional number}\ncategory: {optional category}",
    ),
    ActionKind::PromoteIdea => (
      "To move an idea forward once the person agrees it has matured",
      "idea: {idea id}\nstatus: {refining|distilled|actionable|archived}",
    ),
    ActionKind::LinkIdea => (
      "To file an idea under another one",
      "idea: {idea id}\nparent: {id of the idea it belongs under}",
    ),
  }
}

/// Tag documentation for `persona`'s capabilities. Empty when it has none.
pub fn instructions(persona: &Persona) -> String {
  if persona.capabilities.is_empty() {
    return String::new();
  }
  let mut out = String::from(
    "## Action Tags\nWhen the person wants something done, not just \
     discussed, finish your reply with one tag block per action. Tags are \
     removed before the reply is shown. Ids may be written as 12 or #12.\n\n",
  );
  for kind in ActionKind::ALL.into_iter().filter(|k| persona.can(*k)) {
    let (when, params) = usage(kind);
    let _ = write!(out, "{when}:\n[ACTION: {kind}]\n{params}\n\n");
  }
  if persona.can(ActionKind::ReadIdeas) {
    let _ = writeln!(
      out,
      "READ_IDEAS returns {READ_LIMIT_DEFAULT} ideas by default and at most \
       {READ_LIMIT_MAX}; the results arrive on the next turn."
    );
  }
  out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parse;

  #[test]
  fn only_granted_actions_are_documented() {
    let text = instructions(&Persona::guide());
    assert!(text.contains("[ACTION: READ_IDEAS]"));
    assert!(!text.contains("SAVE_IDEA"));
  }

  #[test]
  fn no_capabilities_means_no_section() {
    assert!(instructions(&Persona::new("k", "K", "")).is_empty());
  }

  #[test]
  fn documented_markers_parse() {
    let text = instructions(&Persona::brainstorm());
    let reply = parse(&text);
    assert_eq!(reply.actions.len(), 5);
    assert!(reply.text.starts_with("## Action Tags"));
  }
}
