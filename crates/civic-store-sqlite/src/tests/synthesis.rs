use std::sync::Arc;

use civic_core::{
  Error as CoreError, ErrorKind,
  collab::GenerationError,
  group::{AccessLevel, GroupStatus, GroupUpdate},
  identity::Identity,
  idea::{Category, DeleteMode, IdeaStatus, NewIdea},
  ids::SessionId,
  ledger::{Award, Ledger, PointActions, PointContext},
  store::{GroupStore, IdeaQuery, IdeaStore},
  synthesis::{CRYSTALLIZER, GATHERER, Synthesizer},
};

use super::{ScriptedGenerator, citizen, group, store};
use crate::SqliteStore;

fn synthesizer(s: &SqliteStore, generator: Arc<ScriptedGenerator>) -> Synthesizer<SqliteStore> {
  Synthesizer::new(Arc::new(s.clone()), generator)
}

fn one_cluster(title: &str, ids: &[i64]) -> Result<String, GenerationError> {
  Ok(format!(
    "Here you go:\n```json\n{{\"digests\": [{{\"title\": \"{title}\", \
     \"summary\": \"Residents want it fixed.\", \"source_ids\": {ids:?}}}]}}\n```"
  ))
}

#[tokio::test]
async fn pothole_walkthrough() {
  let s = store().await;
  let ledger = Ledger::new(Arc::new(s.clone()), Arc::new(PointActions::defaults()));

  // Anonymous submission earns session points.
  let session = SessionId::new("s1");
  let personal = s
    .create_idea(NewIdea::new(
      Identity::Session(session.clone()),
      "Fix the pothole on Elm St",
    ))
    .await
    .unwrap();
  assert_eq!(personal.category, Category::Idea);
  let award = ledger
    .award_session(session.clone(), "idea_submitted", PointContext::new("idea", personal.id))
    .await
    .unwrap();
  assert!(matches!(award, Award::Credited { points: 25, .. }));

  // The visitor signs up, claims their points, and joins the group.
  let (alice_user, alice) = citizen(&s, "alice").await;
  ledger.transfer_session(session, alice_user.user_id).await.unwrap();
  let (bob_user, bob) = citizen(&s, "bob").await;
  let g = group(&s, &bob, "Road Repairs", AccessLevel::Open).await;
  s.join_group(g.group_id, alice.clone()).await.unwrap();

  let pothole = s
    .create_idea(
      NewIdea::new(Identity::User(alice_user.user_id), "Fix the pothole on Elm St")
        .in_group(Some(g.group_id)),
    )
    .await
    .unwrap();
  let sidewalk = s
    .create_idea(
      NewIdea::new(Identity::User(bob_user.user_id), "Elm St sidewalk is cracked too")
        .in_group(Some(g.group_id)),
    )
    .await
    .unwrap();

  let generator = ScriptedGenerator::new([one_cluster("Elm St repairs", &[
    pothole.id.0,
    sidewalk.id.0,
  ])]);
  let synth = synthesizer(&s, generator.clone());
  let digests = synth.gather(g.group_id, &alice).await.unwrap();
  assert_eq!(digests.len(), 1);
  let digest = &digests[0];
  assert_eq!(digest.category, Category::Digest);
  assert_eq!(digest.clerk_key.as_deref(), Some(GATHERER));
  assert!(digest.content.starts_with("Elm St repairs"));
  let mut sources: Vec<_> = s
    .synthesis_sources(digest.id)
    .await
    .unwrap()
    .into_iter()
    .map(|i| i.id)
    .collect();
  sources.sort();
  assert_eq!(sources, [pothole.id, sidewalk.id]);
  assert!(!synth.staleness(digest.id).await.unwrap().stale);

  s.edit_idea(pothole.id, alice, "Fix the two potholes on Elm St".into())
    .await
    .unwrap();
  let staleness = synth.staleness(digest.id).await.unwrap();
  assert!(staleness.stale);
  assert_eq!((staleness.edited_count, staleness.deleted_count), (1, 0));
  assert_eq!(staleness.source_count, 2);

  assert_eq!(ledger.balance(Identity::User(alice_user.user_id)).await.unwrap(), 25);
  assert_eq!(generator.request_count(), 1);
}

#[tokio::test]
async fn gather_is_additive() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Parks", AccessLevel::Open).await;
  let idea = s
    .create_idea(
      NewIdea::new(Identity::User(alice_user.user_id), "more trees")
        .in_group(Some(g.group_id)),
    )
    .await
    .unwrap();

  let generator = ScriptedGenerator::new([
    one_cluster("Trees", &[idea.id.0]),
    Ok("I could not produce JSON, but people like trees.".into()),
  ]);
  let synth = synthesizer(&s, generator);
  synth.gather(g.group_id, &alice).await.unwrap();
  let second = synth.gather(g.group_id, &alice).await.unwrap();
  assert_eq!(second.len(), 1);
  assert!(second[0].content.contains("people like trees"));

  let digests = s.list_syntheses(g.group_id, Category::Digest).await.unwrap();
  assert_eq!(digests.len(), 2);
  assert_eq!(digests[0].id, second[0].id);
}

#[tokio::test]
async fn gather_refuses_observers_and_empty_groups() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let (_, bob) = citizen(&s, "bob").await;
  let g = group(&s, &alice, "Watch", AccessLevel::Observable).await;
  s.join_group(g.group_id, bob.clone()).await.unwrap();
  let generator = ScriptedGenerator::silent();
  let synth = synthesizer(&s, generator.clone());

  let err = synth.gather(g.group_id, &bob).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Authorization);
  let err = synth.gather(g.group_id, &alice).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
  assert_eq!(generator.request_count(), 0);
}

#[tokio::test]
async fn generator_failure_writes_nothing() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Parks", AccessLevel::Open).await;
  s.create_idea(
    NewIdea::new(Identity::User(alice_user.user_id), "more trees")
      .in_group(Some(g.group_id)),
  )
  .await
  .unwrap();

  let generator = ScriptedGenerator::new([Err(GenerationError::Timeout)]);
  let synth = synthesizer(&s, generator);
  let err = synth.gather(g.group_id, &alice).await.unwrap_err();
  assert!(matches!(err, CoreError::AiUnavailable(_)));
  assert!(s.list_syntheses(g.group_id, Category::Digest).await.unwrap().is_empty());
}

#[tokio::test]
async fn crystallize_supersedes_without_deleting() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let (_, bob) = citizen(&s, "bob").await;
  let g = group(&s, &alice, "Budget", AccessLevel::Open).await;
  s.join_group(g.group_id, bob.clone()).await.unwrap();
  let idea = s
    .create_idea(
      NewIdea::new(Identity::User(alice_user.user_id), "publish the budget")
        .in_group(Some(g.group_id)),
    )
    .await
    .unwrap();

  let generator = ScriptedGenerator::new([
    one_cluster("Transparency", &[idea.id.0]),
    Ok("Proposal: publish the budget quarterly.".into()),
    Ok("Proposal: publish the budget monthly.".into()),
    Ok("   ".into()),
  ]);
  let synth = synthesizer(&s, generator);

  let err = synth.crystallize(g.group_id, &alice).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::StateConflict);
  s.update_group(g.group_id, alice.clone(), GroupUpdate {
    status: Some(GroupStatus::Active),
    ..GroupUpdate::default()
  })
  .await
  .unwrap();

  let err = synth.crystallize(g.group_id, &bob).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Authorization);

  let digests = synth.gather(g.group_id, &alice).await.unwrap();
  let first = synth.crystallize(g.group_id, &alice).await.unwrap();
  assert_eq!(first.category, Category::Distilled);
  assert_eq!(first.status, IdeaStatus::Distilled);
  assert_eq!(first.clerk_key.as_deref(), Some(CRYSTALLIZER));
  assert_eq!(first.tags, vec!["proposal"]);
  let mut sources: Vec<_> = s
    .synthesis_sources(first.id)
    .await
    .unwrap()
    .into_iter()
    .map(|i| i.id)
    .collect();
  sources.sort();
  assert_eq!(sources, [idea.id, digests[0].id]);
  let group_now = s.get_group(g.group_id).await.unwrap().unwrap();
  assert_eq!(group_now.status, GroupStatus::Crystallized);

  let second = synth.crystallize(g.group_id, &alice).await.unwrap();
  let latest = synth.latest_proposal(g.group_id).await.unwrap().unwrap();
  assert_eq!(latest.id, second.id);
  assert!(s.get_idea(first.id).await.unwrap().is_some());

  let err = synth.crystallize(g.group_id, &alice).await.unwrap_err();
  assert!(matches!(err, CoreError::AiUnavailable(_)));
  let proposals = s.list_syntheses(g.group_id, Category::Distilled).await.unwrap();
  assert_eq!(proposals.len(), 2);
}

#[tokio::test]
async fn soft_deleted_sources_mark_digests_stale() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Parks", AccessLevel::Open).await;
  let owner = Identity::User(alice_user.user_id);
  let x = s
    .create_idea(NewIdea::new(owner.clone(), "x").in_group(Some(g.group_id)))
    .await
    .unwrap();
  let y = s
    .create_idea(NewIdea::new(owner, "y").in_group(Some(g.group_id)))
    .await
    .unwrap();
  let generator = ScriptedGenerator::new([one_cluster("Both", &[x.id.0, y.id.0])]);
  let synth = synthesizer(&s, generator);
  let digest = synth.gather(g.group_id, &alice).await.unwrap().remove(0);

  s.delete_idea(y.id, alice, DeleteMode::Soft).await.unwrap();
  let report = synth.group_staleness(g.group_id).await.unwrap();
  assert_eq!(report.len(), 1);
  assert_eq!(report[0].digest_id, digest.id);
  assert_eq!((report[0].edited_count, report[0].deleted_count), (0, 1));

  let listed = s.list_ideas(IdeaQuery::in_group(g.group_id)).await.unwrap();
  assert_eq!(listed.total, 2);
}

#[tokio::test]
async fn staleness_requires_a_synthesis() {
  let s = store().await;
  let idea = s
    .create_idea(NewIdea::new(Identity::Session(SessionId::new("s1")), "plain"))
    .await
    .unwrap();
  let synth = synthesizer(&s, ScriptedGenerator::silent());
  let err = synth.staleness(idea.id).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}
