use civic_core::{
  ErrorKind,
  group::{
    AccessLevel, GroupStatus, GroupUpdate, MemberChange, MemberStatus, NewGroup,
    PublicFlags, Role, Scope, ScopeLevel,
  },
  identity::{Actor, Identity, VerificationTier},
  idea::{NewIdea, Vote},
  store::{GroupQuery, GroupStore, IdeaStore},
};
use rusqlite::params;

use super::{citizen, core_err, group, store, user};

// ─── Creation and joining ────────────────────────────────────────────────────

#[tokio::test]
async fn creator_becomes_facilitator() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Road Repairs", AccessLevel::Open).await;
  assert_eq!(g.status, GroupStatus::Forming);
  assert_eq!(g.created_by, Some(alice_user.user_id));

  let m = s.membership(g.group_id, alice_user.user_id).await.unwrap().unwrap();
  assert_eq!(m.role, Role::Facilitator);
  assert!(m.is_active());
}

#[tokio::test]
async fn unverified_accounts_cannot_create_groups() {
  let s = store().await;
  let u = user(&s, "newbie", VerificationTier::Anonymous).await;
  let err = s
    .create_group(NewGroup::new("Mine"), u.actor())
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn standard_groups_start_active() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let g = s
    .create_group(
      NewGroup { is_standard: true, ..NewGroup::new("Town Hall") },
      alice,
    )
    .await
    .unwrap();
  assert_eq!(g.status, GroupStatus::Active);
}

#[tokio::test]
async fn join_role_follows_access_level() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let (_, bob) = citizen(&s, "bob").await;
  let open = group(&s, &alice, "Open", AccessLevel::Open).await;
  let watch = group(&s, &alice, "Watch", AccessLevel::Observable).await;
  let closed = group(&s, &alice, "Closed", AccessLevel::Closed).await;

  let m = s.join_group(open.group_id, bob.clone()).await.unwrap();
  assert_eq!(m.role, Role::Member);
  let m = s.join_group(watch.group_id, bob.clone()).await.unwrap();
  assert_eq!(m.role, Role::Observer);
  let err = s.join_group(closed.group_id, bob.clone()).await.unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);

  let err = s.join_group(open.group_id, bob).await.unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::StateConflict);

  let err = s
    .join_group(open.group_id, Actor::anonymous("s1"))
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn rejoining_reactivates_membership() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let (bob_user, bob) = citizen(&s, "bob").await;
  let g = group(&s, &alice, "Open", AccessLevel::Open).await;

  let first = s.join_group(g.group_id, bob.clone()).await.unwrap();
  s.leave_group(g.group_id, bob.clone()).await.unwrap();
  let left = s.membership(g.group_id, bob_user.user_id).await.unwrap().unwrap();
  assert_eq!(left.status, MemberStatus::Inactive);

  let back = s.join_group(g.group_id, bob).await.unwrap();
  assert!(back.is_active());
  assert!(back.joined_at >= first.joined_at);
  assert_eq!(s.members(g.group_id).await.unwrap().len(), 2);
}

// ─── Access matrix ───────────────────────────────────────────────────────────

#[tokio::test]
async fn public_flags_gate_outsiders() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let (_, carol) = citizen(&s, "carol").await;
  let lurker = user(&s, "lurker", VerificationTier::Anonymous).await.actor();
  let g = group(&s, &alice, "Budget", AccessLevel::Open).await;
  let idea = s
    .create_idea(
      NewIdea::new(Identity::User(alice_user.user_id), "fund the library")
        .in_group(Some(g.group_id)),
    )
    .await
    .unwrap();

  let access = s.access(g.group_id, carol.clone()).await.unwrap();
  assert!(!access.read && !access.write && !access.vote);
  let err = s.vote(idea.id, carol.clone(), Vote::Up).await.unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);

  let g2 = s
    .update_group(g.group_id, alice.clone(), GroupUpdate {
      public_voting: Some(true),
      ..GroupUpdate::default()
    })
    .await
    .unwrap();
  assert_eq!(g2.public, PublicFlags { readable: true, voting: true });

  let access = s.access(g.group_id, carol.clone()).await.unwrap();
  assert!(access.read && access.vote && !access.write);
  s.vote(idea.id, carol, Vote::Up).await.unwrap();

  let access = s.access(g.group_id, lurker.clone()).await.unwrap();
  assert!(access.read && !access.vote);
  let err = s.vote(idea.id, lurker, Vote::Up).await.unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);

  let g3 = s
    .update_group(g.group_id, alice, GroupUpdate {
      public_readable: Some(false),
      ..GroupUpdate::default()
    })
    .await
    .unwrap();
  assert_eq!(g3.public, PublicFlags { readable: false, voting: false });
}

#[tokio::test]
async fn voting_without_readable_is_impossible_in_storage() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Budget", AccessLevel::Open).await;
  let gid = g.group_id.0;

  let err = s
    .with_conn(move |conn| {
      conn.execute(
        "UPDATE civic_groups SET public_voting = 1, public_readable = 0
         WHERE group_id = ?1",
        params![gid],
      )?;
      Ok(())
    })
    .await;
  assert!(err.is_err());
}

#[tokio::test]
async fn archived_groups_refuse_writes() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Done", AccessLevel::Open).await;
  s.update_group(g.group_id, alice.clone(), GroupUpdate {
    status: Some(GroupStatus::Archived),
    ..GroupUpdate::default()
  })
  .await
  .unwrap();

  let access = s.access(g.group_id, alice.clone()).await.unwrap();
  assert!(access.read && !access.write && !access.vote);
  let err = s
    .create_idea(
      NewIdea::new(Identity::User(alice_user.user_id), "late")
        .in_group(Some(g.group_id)),
    )
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::StateConflict);

  let err = s
    .update_group(g.group_id, alice, GroupUpdate {
      status: Some(GroupStatus::Crystallized),
      ..GroupUpdate::default()
    })
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::StateConflict);
}

#[tokio::test]
async fn only_facilitators_update_groups() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let (_, bob) = citizen(&s, "bob").await;
  let g = group(&s, &alice, "Open", AccessLevel::Open).await;
  s.join_group(g.group_id, bob.clone()).await.unwrap();

  let err = s
    .update_group(g.group_id, bob, GroupUpdate {
      description: Some("mine now".into()),
      ..GroupUpdate::default()
    })
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);
}

// ─── Facilitator safeguard ───────────────────────────────────────────────────

#[tokio::test]
async fn removing_sole_facilitator_promotes_a_member() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let (bob_user, bob) = citizen(&s, "bob").await;
  let g = group(&s, &alice, "Open", AccessLevel::Open).await;
  s.join_group(g.group_id, bob).await.unwrap();

  s.leave_group(g.group_id, alice).await.unwrap();

  let bob_m = s.membership(g.group_id, bob_user.user_id).await.unwrap().unwrap();
  assert_eq!(bob_m.role, Role::Facilitator);
  let alice_m = s.membership(g.group_id, alice_user.user_id).await.unwrap().unwrap();
  assert!(!alice_m.is_active());
}

#[tokio::test]
async fn earliest_member_succeeds_and_observers_are_skipped() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let (_, bob) = citizen(&s, "bob").await;
  let (carol_user, carol) = citizen(&s, "carol").await;
  let (dave_user, dave) = citizen(&s, "dave").await;
  let g = group(&s, &alice, "Open", AccessLevel::Open).await;
  s.join_group(g.group_id, bob.clone()).await.unwrap();
  s.join_group(g.group_id, carol).await.unwrap();
  s.join_group(g.group_id, dave).await.unwrap();
  s.update_member(
    g.group_id,
    alice.clone(),
    carol_user.user_id,
    MemberChange::Role(Role::Observer),
  )
  .await
  .unwrap();
  s.leave_group(g.group_id, bob).await.unwrap();

  let removed = s
    .update_member(g.group_id, alice, alice_user.user_id, MemberChange::Remove)
    .await
    .unwrap();
  assert!(removed.is_none());

  let dave_m = s.membership(g.group_id, dave_user.user_id).await.unwrap().unwrap();
  assert_eq!(dave_m.role, Role::Facilitator);
  let carol_m = s.membership(g.group_id, carol_user.user_id).await.unwrap().unwrap();
  assert_eq!(carol_m.role, Role::Observer);
}

#[tokio::test]
async fn sole_facilitator_without_candidates_cannot_leave() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let (_, bob) = citizen(&s, "bob").await;
  let g = group(&s, &alice, "Watch", AccessLevel::Observable).await;
  s.join_group(g.group_id, bob).await.unwrap();

  let err = s.leave_group(g.group_id, alice.clone()).await.unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::StateConflict);

  let facilitators = s
    .members(g.group_id)
    .await
    .unwrap()
    .into_iter()
    .filter(|m| m.is_active_facilitator())
    .count();
  assert_eq!(facilitators, 1);
}

// ─── Listing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_groups_by_role_and_geography() {
  let s = store().await;
  let (alice_user, alice) = citizen(&s, "alice").await;
  let (bob_user, bob) = citizen(&s, "bob").await;
  let town = s
    .create_group(
      NewGroup {
        scope: Scope::Town { state_id: 7, town_id: 70 },
        ..NewGroup::new("Springfield Roads")
      },
      alice.clone(),
    )
    .await
    .unwrap();
  let state = s
    .create_group(
      NewGroup {
        scope: Scope::State { state_id: 7 },
        ..NewGroup::new("State Budget")
      },
      alice.clone(),
    )
    .await
    .unwrap();
  s.create_group(NewGroup::new("National Parks"), bob.clone())
    .await
    .unwrap();
  s.join_group(state.group_id, bob).await.unwrap();

  let in_state = s
    .list_groups(GroupQuery { state_id: Some(7), ..GroupQuery::default() })
    .await
    .unwrap();
  assert_eq!(in_state.total, 2);

  let towns = s
    .list_groups(GroupQuery { level: Some(ScopeLevel::Town), ..GroupQuery::default() })
    .await
    .unwrap();
  assert_eq!(towns.items.len(), 1);
  assert_eq!(towns.items[0].group_id, town.group_id);

  let led_by_alice = s
    .list_groups(GroupQuery {
      member: Some(alice_user.user_id),
      role: Some(Role::Facilitator),
      ..GroupQuery::default()
    })
    .await
    .unwrap();
  assert_eq!(led_by_alice.total, 2);

  let bob_member = s
    .list_groups(GroupQuery {
      member: Some(bob_user.user_id),
      role: Some(Role::Member),
      ..GroupQuery::default()
    })
    .await
    .unwrap();
  assert_eq!(bob_member.items.len(), 1);
  assert_eq!(bob_member.items[0].group_id, state.group_id);
}
