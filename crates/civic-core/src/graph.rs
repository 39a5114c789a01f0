//! Link-integrity rules for the idea graph.
//!
//! These functions are storage-agnostic: callers supply lookups as closures
//! so the same checks run inside a database transaction or over an in-memory
//! fixture.

use std::collections::HashSet;

use crate::{
  Error,
  idea::SynthesisEdge,
  ids::IdeaId,
};

/// Upper bound on ancestors visited while checking a re-parent. A chain this
/// long is treated as corrupt data.
pub const MAX_ANCESTOR_WALK: usize = 1_024;

/// Check that `idea` may be placed under `proposed_parent`.
///
/// Walks upward from the proposed parent through `parent_of`. Fails with
/// [`Error::CircularReference`] if `idea` is an ancestor of the proposed
/// parent, if the walk revisits an id (looped data), or if the walk exceeds
/// [`MAX_ANCESTOR_WALK`]. Performs no mutation.
pub fn check_reparent<E, F>(
  idea: IdeaId,
  proposed_parent: IdeaId,
  mut parent_of: F,
) -> Result<(), E>
where
  E: From<Error>,
  F: FnMut(IdeaId) -> Result<Option<IdeaId>, E>,
{
  if idea == proposed_parent {
    return Err(
      Error::Validation(format!("idea {idea} cannot be its own parent")).into(),
    );
  }

  let cycle = || Error::CircularReference { idea, parent: proposed_parent };
  let mut visited: HashSet<IdeaId> = HashSet::new();
  let mut cursor = Some(proposed_parent);

  while let Some(current) = cursor {
    if current == idea || !visited.insert(current) {
      return Err(cycle().into());
    }
    if visited.len() > MAX_ANCESTOR_WALK {
      return Err(cycle().into());
    }
    cursor = parent_of(current)?;
  }
  Ok(())
}

/// Whether `idea_id` can be physically removed.
///
/// Refused while any synthesis edge references the idea, on either side:
/// sources keep digest provenance intact, and edges are never left dangling.
pub fn can_hard_delete(idea_id: IdeaId, edges: &[SynthesisEdge]) -> bool {
  !edges
    .iter()
    .any(|e| e.source_id == idea_id || e.digest_id == idea_id)
}

/// Extract `reply:#<id>` references from idea content, in order of first
/// appearance and without duplicates.
pub fn reply_references(content: &str) -> Vec<IdeaId> {
  const MARKER: &str = "reply:#";
  let lower = content.to_ascii_lowercase();
  let mut refs = Vec::new();
  let mut rest = lower.as_str();

  while let Some(pos) = rest.find(MARKER) {
    rest = &rest[pos + MARKER.len()..];
    let digits: String =
      rest.chars().take_while(char::is_ascii_digit).collect();
    if let Ok(n) = digits.parse::<i64>() {
      let id = IdeaId(n);
      if !refs.contains(&id) {
        refs.push(id);
      }
    }
  }
  refs
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use chrono::Utc;

  use super::*;

  fn lookup(
    parents: &HashMap<i64, i64>,
  ) -> impl FnMut(IdeaId) -> Result<Option<IdeaId>, Error> + '_ {
    |id| Ok(parents.get(&id.0).copied().map(IdeaId))
  }

  #[test]
  fn self_parenting_is_rejected() {
    let parents = HashMap::new();
    let err = check_reparent(IdeaId(1), IdeaId(1), lookup(&parents));
    assert!(matches!(err, Err(Error::Validation(_))));
  }

  #[test]
  fn descendant_as_parent_is_a_cycle() {
    // 3 → 2 → 1 (child → parent). Placing 1 under 3 closes a loop.
    let parents = HashMap::from([(3, 2), (2, 1)]);
    let err = check_reparent(IdeaId(1), IdeaId(3), lookup(&parents));
    assert!(matches!(
      err,
      Err(Error::CircularReference { idea: IdeaId(1), parent: IdeaId(3) })
    ));
  }

  #[test]
  fn unrelated_parent_is_fine() {
    let parents = HashMap::from([(3, 2)]);
    assert!(check_reparent(IdeaId(1), IdeaId(3), lookup(&parents)).is_ok());
  }

  #[test]
  fn looped_data_aborts_instead_of_spinning() {
    // 5 and 6 point at each other; 9 is not involved.
    let parents = HashMap::from([(5, 6), (6, 5)]);
    let err = check_reparent(IdeaId(9), IdeaId(5), lookup(&parents));
    assert!(matches!(err, Err(Error::CircularReference { .. })));
  }

  #[test]
  fn hard_delete_is_blocked_by_edges() {
    let edges = vec![SynthesisEdge {
      digest_id:  IdeaId(10),
      source_id:  IdeaId(1),
      created_at: Utc::now(),
    }];
    assert!(!can_hard_delete(IdeaId(1), &edges));
    assert!(!can_hard_delete(IdeaId(10), &edges));
    assert!(can_hard_delete(IdeaId(2), &edges));
  }

  #[test]
  fn reply_references_are_deduplicated() {
    let refs = reply_references("agree with Reply:#12 and reply:#7, reply:#12");
    assert_eq!(refs, vec![IdeaId(12), IdeaId(7)]);
    assert!(reply_references("reply:# nothing").is_empty());
  }
}
