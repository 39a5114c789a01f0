//! The gather → crystallize pipeline and staleness detection.
//!
//! Generator calls happen with no store transaction open. Results are written
//! afterwards in short transactions, one per digest or proposal.

use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
  Error, Result, ResultExt,
  collab::{GenerationRequest, TextGenerator, Turn},
  group::{Group, GroupStatus, Role},
  identity::Actor,
  idea::{Category, Idea, IdeaStatus, NewIdea},
  ids::{GroupId, IdeaId},
  store::{GroupStore, IdeaQuery, IdeaStore, Order, SynthesisRecord},
};

/// Clerk key stamped on digests.
pub const GATHERER: &str = "gatherer";
/// Clerk key stamped on proposals.
pub const CRYSTALLIZER: &str = "crystallizer";

const DEFAULT_MAX_TOKENS: u32 = 2_048;

const GATHER_PROMPT: &str = "You are the gatherer for a civic deliberation \
group. Find the themes that connect the ideas below. Reply with JSON only, in \
the form {\"digests\":[{\"title\":\"...\",\"summary\":\"...\",\
\"source_ids\":[1,2]}]}. Every digest must cite the ids of the ideas it \
summarizes.";

const CRYSTALLIZE_PROMPT: &str = "You are the crystallizer for a civic \
deliberation group. Read the group's ideas and digests below and write one \
structured proposal: a title, key findings, proposed actions, and which \
contributions (by id) each point draws on. Plain text.";

// ─── Staleness ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staleness {
  pub digest_id:     IdeaId,
  pub stale:         bool,
  pub edited_count:  u32,
  pub deleted_count: u32,
  pub source_count:  u32,
}

/// Compare a digest with its sources. A source counts as deleted when it was
/// soft-deleted after the digest was created; otherwise as edited when it was
/// edited after. Pure: never touches storage.
pub fn assess_staleness(digest: &Idea, sources: &[Idea]) -> Staleness {
  let created = digest.created_at;
  let mut edited = 0;
  let mut deleted = 0;
  for source in sources {
    if source.deleted_at.is_some_and(|at| at > created) {
      deleted += 1;
    } else if source.edit_count > 0 && source.updated_at > created {
      edited += 1;
    }
  }
  Staleness {
    digest_id:     digest.id,
    stale:         edited + deleted > 0,
    edited_count:  edited,
    deleted_count: deleted,
    source_count:  sources.len() as u32,
  }
}

// ─── Clustering output ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Cluster {
  #[serde(default)]
  pub title:      String,
  #[serde(default)]
  pub summary:    String,
  #[serde(default)]
  pub source_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct ClusterReply {
  digests: Vec<Cluster>,
}

/// Parse the generator's clustering reply.
///
/// Accepts the JSON object bare or wrapped in prose or a code fence. Source
/// ids outside `scanned` are dropped, as are clusters left with no sources.
/// Unparseable replies degrade to one cluster over every scanned idea, with
/// the raw text as its summary.
pub fn parse_clusters(raw: &str, scanned: &[IdeaId]) -> Vec<Cluster> {
  let known: HashSet<i64> = scanned.iter().map(|id| id.0).collect();
  let fallback = || {
    vec![Cluster {
      title:      "Group digest".into(),
      summary:    raw.trim().to_string(),
      source_ids: scanned.iter().map(|id| id.0).collect(),
    }]
  };

  let json = match (raw.find('{'), raw.rfind('}')) {
    (Some(start), Some(end)) if end > start => &raw[start..=end],
    _ => return fallback(),
  };
  let Ok(reply) = serde_json::from_str::<ClusterReply>(json) else {
    debug!("clustering reply is not JSON; using a single digest");
    return fallback();
  };

  let clusters: Vec<Cluster> = reply
    .digests
    .into_iter()
    .filter_map(|mut c| {
      let mut seen = HashSet::new();
      c.source_ids.retain(|id| known.contains(id) && seen.insert(*id));
      (!c.source_ids.is_empty()).then_some(c)
    })
    .collect();

  if clusters.is_empty() { fallback() } else { clusters }
}

fn digest_content(cluster: &Cluster) -> String {
  match (cluster.title.trim(), cluster.summary.trim()) {
    ("", summary) => summary.to_string(),
    (title, "") => title.to_string(),
    (title, summary) => format!("{title}\n\n{summary}"),
  }
}

fn render_ideas(ideas: &[Idea]) -> String {
  ideas
    .iter()
    .map(|i| format!("#{} [{}] {}", i.id, i.category, i.content))
    .collect::<Vec<_>>()
    .join("\n")
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Runs gather and crystallize for groups in a store.
pub struct Synthesizer<S> {
  store:      Arc<S>,
  generator:  Arc<dyn TextGenerator>,
  max_tokens: u32,
}

impl<S> Clone for Synthesizer<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      generator:  Arc::clone(&self.generator),
      max_tokens: self.max_tokens,
    }
  }
}

impl<S: IdeaStore + GroupStore> Synthesizer<S> {
  pub fn new(store: Arc<S>, generator: Arc<dyn TextGenerator>) -> Self {
    Self { store, generator, max_tokens: DEFAULT_MAX_TOKENS }
  }

  pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
    self.max_tokens = max_tokens;
    self
  }

  async fn group(&self, group_id: GroupId) -> Result<Group> {
    self
      .store
      .get_group(group_id)
      .await
      .err_into()?
      .ok_or(Error::GroupNotFound(group_id))
  }

  async fn ideas(&self, query: IdeaQuery) -> Result<Vec<Idea>> {
    let page = self.store.list_ideas(query).await.err_into()?;
    Ok(page.items)
  }

  async fn generate(&self, system_prompt: &str, body: String) -> Result<String> {
    let request = GenerationRequest {
      system_prompt: system_prompt.to_string(),
      history:       vec![Turn::user(body)],
      max_tokens:    self.max_tokens,
    };
    self.generator.generate(request).await.map_err(|e| {
      warn!(model = self.generator.model(), error = %e, "generation failed");
      Error::from(e)
    })
  }

  /// Cluster a group's ideas into new digests.
  ///
  /// Additive: earlier digests are left alone. Nothing is written if the
  /// generator fails.
  #[instrument(skip(self, requester), fields(group = %group_id))]
  pub async fn gather(
    &self,
    group_id: GroupId,
    requester: &Actor,
  ) -> Result<Vec<Idea>> {
    let group = self.group(group_id).await?;
    if group.is_archived() {
      return Err(Error::Conflict("group is archived".into()));
    }
    let access = self
      .store
      .access(group_id, requester.clone())
      .await
      .err_into()?;
    if !access.write {
      return Err(Error::forbidden("gathering requires write access"));
    }

    let linked = self
      .store
      .materialize_reply_links(group_id)
      .await
      .err_into()?;

    let ideas = self
      .ideas(IdeaQuery {
        human_only: true,
        order: Order::Chronological,
        ..IdeaQuery::in_group(group_id)
      })
      .await?;
    if ideas.is_empty() {
      return Err(Error::Validation("group has no ideas to gather".into()));
    }
    let scanned: Vec<IdeaId> = ideas.iter().map(|i| i.id).collect();

    let raw = self.generate(GATHER_PROMPT, render_ideas(&ideas)).await?;
    let clusters = parse_clusters(&raw, &scanned);

    let mut digests = Vec::with_capacity(clusters.len());
    for cluster in &clusters {
      let idea = NewIdea::clerk(GATHERER, digest_content(cluster))
        .in_group(Some(group_id))
        .with_category(Category::Digest)
        .with_tags(["digest"]);
      let sources = cluster.source_ids.iter().copied().map(IdeaId).collect();
      let digest = self
        .store
        .record_synthesis(SynthesisRecord {
          idea,
          sources,
          group_status: None,
        })
        .await
        .err_into()?;
      digests.push(digest);
    }

    info!(
      scanned = scanned.len(),
      reply_links = linked,
      digests = digests.len(),
      "gather complete"
    );
    Ok(digests)
  }

  /// Produce a proposal from every idea and digest in the group, then mark
  /// the group crystallized. Facilitator only.
  #[instrument(skip(self, requester), fields(group = %group_id))]
  pub async fn crystallize(
    &self,
    group_id: GroupId,
    requester: &Actor,
  ) -> Result<Idea> {
    let group = self.group(group_id).await?;
    let is_facilitator = match requester.user_id() {
      Some(user_id) => self
        .store
        .membership(group_id, user_id)
        .await
        .err_into()?
        .is_some_and(|m| m.is_active() && m.role == Role::Facilitator),
      None => false,
    };
    if !is_facilitator {
      return Err(Error::forbidden("only a facilitator can crystallize"));
    }
    if !group.status.can_crystallize() {
      return Err(Error::Conflict(format!(
        "cannot crystallize a {} group",
        group.status
      )));
    }

    let mut inputs = self
      .ideas(IdeaQuery {
        human_only: true,
        order: Order::Chronological,
        ..IdeaQuery::in_group(group_id)
      })
      .await?;
    let mut digests = self
      .store
      .list_syntheses(group_id, Category::Digest)
      .await
      .err_into()?;
    digests.reverse();
    inputs.extend(digests);
    if inputs.is_empty() {
      return Err(Error::Validation("group has nothing to crystallize".into()));
    }

    let body = format!(
      "Group: {}\n{}\n\n{}",
      group.name,
      group.description,
      render_ideas(&inputs)
    );
    let text = self.generate(CRYSTALLIZE_PROMPT, body).await?;
    let text = text.trim();
    if text.is_empty() {
      return Err(Error::AiUnavailable("empty proposal".into()));
    }

    let idea = NewIdea::clerk(CRYSTALLIZER, text)
      .in_group(Some(group_id))
      .with_category(Category::Distilled)
      .with_status(IdeaStatus::Distilled)
      .with_tags(["proposal"]);
    let proposal = self
      .store
      .record_synthesis(SynthesisRecord {
        idea,
        sources: inputs.iter().map(|i| i.id).collect(),
        group_status: Some(GroupStatus::Crystallized),
      })
      .await
      .err_into()?;

    info!(proposal = %proposal.id, sources = inputs.len(), "crystallized");
    Ok(proposal)
  }

  /// The proposal currently on display: the newest one.
  pub async fn latest_proposal(&self, group_id: GroupId) -> Result<Option<Idea>> {
    let proposals = self
      .store
      .list_syntheses(group_id, Category::Distilled)
      .await
      .err_into()?;
    Ok(proposals.into_iter().next())
  }

  /// Staleness of one digest or proposal.
  pub async fn staleness(&self, digest_id: IdeaId) -> Result<Staleness> {
    let digest = self
      .store
      .get_idea(digest_id)
      .await
      .err_into()?
      .ok_or(Error::IdeaNotFound(digest_id))?;
    if !digest.is_synthesis() {
      return Err(Error::Validation(format!(
        "idea {digest_id} is not a digest or proposal"
      )));
    }
    let sources = self
      .store
      .synthesis_sources(digest_id)
      .await
      .err_into()?;
    Ok(assess_staleness(&digest, &sources))
  }

  /// Staleness of every digest and proposal in a group, newest first.
  pub async fn group_staleness(&self, group_id: GroupId) -> Result<Vec<Staleness>> {
    let mut syntheses = self
      .store
      .list_syntheses(group_id, Category::Digest)
      .await
      .err_into()?;
    syntheses.extend(
      self
        .store
        .list_syntheses(group_id, Category::Distilled)
        .await
        .err_into()?,
    );
    syntheses.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut out = Vec::with_capacity(syntheses.len());
    for digest in &syntheses {
      let sources = self
        .store
        .synthesis_sources(digest.id)
        .await
        .err_into()?;
      out.push(assess_staleness(digest, &sources));
    }
    Ok(out)
  }
}
