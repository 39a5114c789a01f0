use civic_core::{
  Error as CoreError, ErrorKind,
  group::AccessLevel,
  identity::{Actor, Identity},
  idea::{Category, DeleteMode, IdeaStatus, LinkKind, NewIdea, Vote},
  ids::{IdeaId, SessionId},
  store::{GroupStore, IdeaQuery, IdeaStore, Order, SynthesisRecord},
  synthesis::GATHERER,
};

use super::{citizen, core_err, group, store};

fn session_idea(session: &str, content: &str) -> NewIdea {
  NewIdea::new(Identity::Session(SessionId::new(session)), content)
}

// ─── Creation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_idea() {
  let s = store().await;
  let (alice, _) = citizen(&s, "alice").await;

  let idea = s
    .create_idea(
      NewIdea::new(Identity::User(alice.user_id), "  Fix the pothole  ")
        .with_tags(["Roads", "#roads", "safety"]),
    )
    .await
    .unwrap();
  assert_eq!(idea.content, "Fix the pothole");
  assert_eq!(idea.tags, vec!["roads", "safety"]);
  assert_eq!(idea.status, IdeaStatus::Raw);
  assert_eq!(idea.edit_count, 0);

  let fetched = s.get_idea(idea.id).await.unwrap().unwrap();
  assert_eq!(fetched.owner, Some(Identity::User(alice.user_id)));
  assert_eq!(fetched.created_at, idea.created_at);
}

#[tokio::test]
async fn empty_content_is_rejected() {
  let s = store().await;
  let err = s.create_idea(session_idea("s1", "   ")).await.unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn sessions_cannot_post_into_groups() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Road Repairs", AccessLevel::Open).await;

  let err = s
    .create_idea(session_idea("s1", "hello").in_group(Some(g.group_id)))
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn observers_cannot_post() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let (bob_user, bob) = citizen(&s, "bob").await;
  let g = group(&s, &alice, "Watchers", AccessLevel::Observable).await;
  s.join_group(g.group_id, bob.clone()).await.unwrap();

  let err = s
    .create_idea(
      NewIdea::new(Identity::User(bob_user.user_id), "let me in")
        .in_group(Some(g.group_id)),
    )
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);
}

// ─── Editing and deletion ────────────────────────────────────────────────────

#[tokio::test]
async fn edit_is_owner_only_and_tracked() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let (_, bob) = citizen(&s, "bob").await;
  let idea = s
    .create_idea(NewIdea::new(Identity::User(alice_user.user_id), "first"))
    .await
    .unwrap();

  let err = s
    .edit_idea(idea.id, bob, "hijacked".into())
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);

  let edited = s.edit_idea(idea.id, alice, "second".into()).await.unwrap();
  assert_eq!(edited.content, "second");
  assert_eq!(edited.edit_count, 1);
  assert!(edited.updated_at > idea.updated_at);
}

#[tokio::test]
async fn soft_delete_hides_but_keeps_row() {
  let s = store().await;
  let anon = Actor::anonymous("s1");
  let idea = s.create_idea(session_idea("s1", "temporary")).await.unwrap();

  s.delete_idea(idea.id, anon.clone(), DeleteMode::Soft).await.unwrap();
  assert!(s.get_idea(idea.id).await.unwrap().is_none());
  let listed = s.list_ideas(IdeaQuery::default()).await.unwrap();
  assert_eq!(listed.total, 0);

  let err = s
    .delete_idea(idea.id, anon.clone(), DeleteMode::Soft)
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::StateConflict);

  let err = s
    .edit_idea(idea.id, anon, "back".into())
    .await
    .unwrap_err();
  assert!(matches!(core_err(err), CoreError::IdeaNotFound(_)));
}

#[tokio::test]
async fn hard_delete_refused_while_a_digest_cites_the_idea() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Parks", AccessLevel::Open).await;
  let idea = s
    .create_idea(
      NewIdea::new(Identity::User(alice_user.user_id), "more benches")
        .in_group(Some(g.group_id)),
    )
    .await
    .unwrap();
  let digest = s
    .record_synthesis(SynthesisRecord {
      idea:         NewIdea::clerk(GATHERER, "Seating")
        .in_group(Some(g.group_id))
        .with_category(Category::Digest),
      sources:      vec![idea.id],
      group_status: None,
    })
    .await
    .unwrap();

  let err = s
    .delete_idea(idea.id, alice.clone(), DeleteMode::Hard)
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::StateConflict);

  s.delete_idea(idea.id, alice.clone(), DeleteMode::Soft).await.unwrap();
  let err = s
    .delete_idea(idea.id, alice, DeleteMode::Hard)
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::StateConflict);

  let sources = s.synthesis_sources(digest.id).await.unwrap();
  assert_eq!(sources.len(), 1);
  assert!(sources[0].is_deleted());
}

#[tokio::test]
async fn hard_delete_removes_row_and_detaches_children() {
  let s = store().await;
  let anon = Actor::anonymous("s1");
  let parent = s.create_idea(session_idea("s1", "parent")).await.unwrap();
  let child = s
    .create_idea(session_idea("s1", "child").with_parent(Some(parent.id)))
    .await
    .unwrap();

  s.delete_idea(parent.id, anon, DeleteMode::Hard).await.unwrap();
  assert!(s.get_idea(parent.id).await.unwrap().is_none());
  let child = s.get_idea(child.id).await.unwrap().unwrap();
  assert_eq!(child.parent_id, None);
}

// ─── Threading ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn cycles_are_refused_without_mutation() {
  let s = store().await;
  let anon = Actor::anonymous("s1");
  let a = s.create_idea(session_idea("s1", "a")).await.unwrap();
  let b = s
    .create_idea(session_idea("s1", "b").with_parent(Some(a.id)))
    .await
    .unwrap();
  let c = s
    .create_idea(session_idea("s1", "c").with_parent(Some(b.id)))
    .await
    .unwrap();

  let err = s.link_parent(a.id, c.id, anon.clone()).await.unwrap_err();
  assert!(matches!(
    core_err(err),
    CoreError::CircularReference { idea, parent } if idea == a.id && parent == c.id
  ));
  assert_eq!(s.get_idea(a.id).await.unwrap().unwrap().parent_id, None);
  assert_eq!(s.get_idea(c.id).await.unwrap().unwrap().parent_id, Some(b.id));

  let err = s.link_parent(a.id, a.id, anon.clone()).await.unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Validation);

  let moved = s.link_parent(c.id, a.id, anon).await.unwrap();
  assert_eq!(moved.parent_id, Some(a.id));
}

#[tokio::test]
async fn thread_view_is_chronological() {
  let s = store().await;
  let root = s.create_idea(session_idea("s1", "root")).await.unwrap();
  for n in 0..3 {
    s.create_idea(session_idea("s1", &format!("reply {n}")).with_parent(Some(root.id)))
      .await
      .unwrap();
  }

  let thread = s.list_ideas(IdeaQuery::thread(root.id)).await.unwrap();
  let contents: Vec<_> = thread.items.iter().map(|i| i.content.as_str()).collect();
  assert_eq!(contents, ["reply 0", "reply 1", "reply 2"]);

  let recent = s
    .list_ideas(IdeaQuery { parent_id: Some(root.id), ..IdeaQuery::default() })
    .await
    .unwrap();
  assert_eq!(recent.items[0].content, "reply 2");
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn promotion_only_moves_forward() {
  let s = store().await;
  let anon = Actor::anonymous("s1");
  let idea = s.create_idea(session_idea("s1", "idea")).await.unwrap();

  let idea = s
    .promote(idea.id, anon.clone(), IdeaStatus::Distilled)
    .await
    .unwrap();
  assert_eq!(idea.status, IdeaStatus::Distilled);

  let err = s
    .promote(idea.id, anon.clone(), IdeaStatus::Refining)
    .await
    .unwrap_err();
  assert!(matches!(
    core_err(err),
    CoreError::InvalidTransition { current: IdeaStatus::Distilled, .. }
  ));

  let idea = s
    .promote(idea.id, anon.clone(), IdeaStatus::Archived)
    .await
    .unwrap();
  assert_eq!(idea.status, IdeaStatus::Archived);

  let err = s
    .promote(idea.id, Actor::anonymous("s2"), IdeaStatus::Archived)
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn clerk_ideas_cannot_be_promoted() {
  let s = store().await;
  let digest = s
    .record_synthesis(SynthesisRecord {
      idea:         NewIdea::clerk(GATHERER, "summary").with_category(Category::Digest),
      sources:      vec![],
      group_status: None,
    })
    .await
    .unwrap();
  let err = s
    .promote(digest.id, Actor::anonymous("s1"), IdeaStatus::Refining)
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);
}

// ─── Votes, tags, links ──────────────────────────────────────────────────────

#[tokio::test]
async fn votes_replace_rather_than_accumulate() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let (_, bob) = citizen(&s, "bob").await;
  let idea = s.create_idea(session_idea("s1", "idea")).await.unwrap();

  s.vote(idea.id, alice.clone(), Vote::Up).await.unwrap();
  s.vote(idea.id, bob, Vote::Up).await.unwrap();
  let tally = s.vote(idea.id, alice, Vote::Down).await.unwrap();
  assert_eq!((tally.up, tally.down), (1, 1));

  let err = s
    .vote(idea.id, Actor::anonymous("s9"), Vote::Up)
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn tags_merge_as_a_set() {
  let s = store().await;
  let anon = Actor::anonymous("s1");
  let idea = s
    .create_idea(session_idea("s1", "idea").with_tags(["roads"]))
    .await
    .unwrap();
  let idea = s
    .add_tags(idea.id, anon, vec!["Roads".into(), "budget".into()])
    .await
    .unwrap();
  assert_eq!(idea.tags, vec!["budget", "roads"]);
}

#[tokio::test]
async fn links_are_undirected_and_unique() {
  let s = store().await;
  let anon = Actor::anonymous("s1");
  let a = s.create_idea(session_idea("s1", "a")).await.unwrap();
  let b = s.create_idea(session_idea("s1", "b")).await.unwrap();

  let link = s
    .create_link(b.id, a.id, LinkKind::Supports, anon.clone())
    .await
    .unwrap();
  assert_eq!((link.idea_a, link.idea_b), (a.id, b.id));

  let err = s
    .create_link(a.id, b.id, LinkKind::Related, anon.clone())
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::StateConflict);

  let err = s
    .create_link(a.id, a.id, LinkKind::Related, anon)
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Validation);

  assert_eq!(s.links(a.id).await.unwrap().len(), 1);
  assert_eq!(s.links(b.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reply_references_become_links_once() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Transit", AccessLevel::Open).await;
  let owner = Identity::User(alice_user.user_id);
  let first = s
    .create_idea(NewIdea::new(owner.clone(), "more buses").in_group(Some(g.group_id)))
    .await
    .unwrap();
  s.create_idea(
    NewIdea::new(owner.clone(), format!("agree, REPLY:#{} and reply:#9999", first.id))
      .in_group(Some(g.group_id)),
  )
  .await
  .unwrap();

  assert_eq!(s.materialize_reply_links(g.group_id).await.unwrap(), 1);
  assert_eq!(s.materialize_reply_links(g.group_id).await.unwrap(), 0);
  let links = s.links(first.id).await.unwrap();
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].kind, LinkKind::Reply);
}

// ─── Listing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn listing_filters_and_paginates() {
  let s = store().await;
  for n in 0..5 {
    s.create_idea(session_idea("s1", &format!("s1 idea {n}"))).await.unwrap();
  }
  s.create_idea(session_idea("s2", "other").with_category(Category::Question))
    .await
    .unwrap();

  let page = s
    .list_ideas(IdeaQuery {
      owner: Some(Identity::Session(SessionId::new("s1"))),
      limit: Some(2),
      offset: Some(1),
      ..IdeaQuery::default()
    })
    .await
    .unwrap();
  assert_eq!(page.total, 5);
  assert_eq!(page.offset, 1);
  let contents: Vec<_> = page.items.iter().map(|i| i.content.as_str()).collect();
  assert_eq!(contents, ["s1 idea 3", "s1 idea 2"]);

  let questions = s
    .list_ideas(IdeaQuery {
      category: Some(Category::Question),
      order: Order::Chronological,
      ..IdeaQuery::default()
    })
    .await
    .unwrap();
  assert_eq!(questions.total, 1);
  assert_eq!(questions.items[0].content, "other");

  let rest = s
    .list_ideas(IdeaQuery {
      exclude: Some(Category::Question),
      limit: Some(10),
      ..IdeaQuery::default()
    })
    .await
    .unwrap();
  assert_eq!(rest.total, 5);
  assert!(rest.items.iter().all(|i| i.category != Category::Question));

  let missing = s.get_idea(IdeaId(999)).await.unwrap();
  assert!(missing.is_none());
}
