use civic_core::{
  Error as CoreError, ErrorKind,
  group::{AccessLevel, Role},
  identity::VerificationTier,
  invite::{InviteDecision, InviteOutcome, InviteStatus, Resolution, send_invites},
  store::{GroupStore, UserStore},
};
use rusqlite::params;

use super::{RecordingNotifier, citizen, core_err, group, store, user};

#[tokio::test]
async fn each_address_is_classified_independently() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let (_, bob) = citizen(&s, "bob").await;
  user(&s, "ghost", VerificationTier::Anonymous).await;
  let g = group(&s, &alice, "Closed", AccessLevel::Closed).await;
  s.create_invites(g.group_id, alice.clone(), vec!["pending@example.com".into()])
    .await
    .unwrap();
  let bob_id = bob.user_id().unwrap();
  let gid = g.group_id.0;
  s.with_conn(move |conn| {
    conn.execute(
      "INSERT INTO group_members (group_id, user_id, role, status, joined_at)
       VALUES (?1, ?2, 'member', 'active', '2026-01-01T00:00:00.000000000Z')",
      params![gid, bob_id.0],
    )?;
    Ok(())
  })
  .await
  .unwrap();

  let issued = s
    .create_invites(g.group_id, alice, vec![
      "New@Example.com ".into(),
      "not-an-email".into(),
      "ghost@example.com".into(),
      "bob@example.com".into(),
      "pending@example.com".into(),
    ])
    .await
    .unwrap();
  let outcomes: Vec<_> = issued.iter().map(|i| i.outcome).collect();
  assert_eq!(outcomes, [
    InviteOutcome::Invited,
    InviteOutcome::InvalidEmail,
    InviteOutcome::NotVerified,
    InviteOutcome::AlreadyMember,
    InviteOutcome::AlreadyInvited,
  ]);
  assert_eq!(issued[0].email, "new@example.com");
  let invite = issued[0].invite.as_ref().unwrap();
  assert_eq!(invite.status, InviteStatus::Pending);
  assert_ne!(invite.accept_token, invite.decline_token);
  assert!(issued[1..].iter().all(|i| i.invite.is_none()));
}

#[tokio::test]
async fn only_facilitators_invite() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let (_, bob) = citizen(&s, "bob").await;
  let g = group(&s, &alice, "Open", AccessLevel::Open).await;
  s.join_group(g.group_id, bob.clone()).await.unwrap();

  let err = s
    .create_invites(g.group_id, bob.clone(), vec!["x@example.com".into()])
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);
  let err = s.list_invites(g.group_id, bob).await.unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn accepting_provisions_an_account_once() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Closed", AccessLevel::Closed).await;
  let issued = s
    .create_invites(g.group_id, alice.clone(), vec!["new@example.com".into()])
    .await
    .unwrap();
  let token = issued[0].invite.as_ref().unwrap().accept_token.clone();

  let resolution = s
    .resolve_invite(token.clone(), InviteDecision::Accept)
    .await
    .unwrap();
  let Resolution::Accepted { user_id, group_id, provisioned } = resolution else {
    panic!("expected acceptance, got {resolution:?}");
  };
  assert_eq!(group_id, g.group_id);
  let session = provisioned.expect("new account gets a device session");

  let account = s.get_user(user_id).await.unwrap().unwrap();
  assert_eq!(account.handle, "new");
  assert!(account.email_verified);
  assert_eq!(account.tier, VerificationTier::Remembered);
  let resolved = s.resolve_device_session(session.token).await.unwrap().unwrap();
  assert_eq!(resolved.user_id, user_id);

  let m = s.membership(g.group_id, user_id).await.unwrap().unwrap();
  assert_eq!(m.role, Role::Member);

  let again = s.resolve_invite(token, InviteDecision::Accept).await.unwrap();
  assert!(matches!(again, Resolution::AlreadyAccepted { .. }));
  assert_eq!(s.members(g.group_id).await.unwrap().len(), 2);

  let listed = s.list_invites(g.group_id, alice).await.unwrap();
  assert_eq!(listed[0].status, InviteStatus::Accepted);
  assert_eq!(listed[0].user_id, Some(user_id));
}

#[tokio::test]
async fn accepting_reuses_an_existing_account() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let (bob_user, _) = citizen(&s, "bob").await;
  let g = group(&s, &alice, "Closed", AccessLevel::Closed).await;
  let issued = s
    .create_invites(g.group_id, alice, vec!["BOB@example.com".into()])
    .await
    .unwrap();
  let invite = issued[0].invite.as_ref().unwrap();
  assert_eq!(invite.user_id, Some(bob_user.user_id));

  let resolution = s
    .resolve_invite(invite.accept_token.clone(), InviteDecision::Accept)
    .await
    .unwrap();
  assert!(matches!(
    resolution,
    Resolution::Accepted { user_id, provisioned: None, .. } if user_id == bob_user.user_id
  ));
}

#[tokio::test]
async fn resolution_is_one_way() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Closed", AccessLevel::Closed).await;
  let issued = s
    .create_invites(g.group_id, alice, vec!["carol@example.com".into()])
    .await
    .unwrap();
  let invite = issued[0].invite.clone().unwrap();

  let declined = s
    .resolve_invite(invite.decline_token.clone(), InviteDecision::Decline)
    .await
    .unwrap();
  assert!(matches!(declined, Resolution::Declined { .. }));
  let replay = s
    .resolve_invite(invite.decline_token, InviteDecision::Decline)
    .await
    .unwrap();
  assert!(matches!(replay, Resolution::AlreadyDeclined { .. }));

  let err = s
    .resolve_invite(invite.accept_token, InviteDecision::Accept)
    .await
    .unwrap_err();
  assert_eq!(core_err(err).kind(), ErrorKind::StateConflict);
  assert!(s.find_user_by_email("carol@example.com".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn tokens_only_work_for_their_decision() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Closed", AccessLevel::Closed).await;
  let issued = s
    .create_invites(g.group_id, alice, vec!["dan@example.com".into()])
    .await
    .unwrap();
  let invite = issued[0].invite.clone().unwrap();

  let err = s
    .resolve_invite(invite.accept_token, InviteDecision::Decline)
    .await
    .unwrap_err();
  assert!(matches!(core_err(err), CoreError::InviteNotFound));
}

#[tokio::test]
async fn expired_invites_resolve_as_expired() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Closed", AccessLevel::Closed).await;
  let issued = s
    .create_invites(g.group_id, alice.clone(), vec!["late@example.com".into()])
    .await
    .unwrap();
  let invite = issued[0].invite.clone().unwrap();
  let invite_id = invite.invite_id;
  s.with_conn(move |conn| {
    conn.execute(
      "UPDATE group_invites SET expires_at = '2020-01-01T00:00:00.000000000Z'
       WHERE invite_id = ?1",
      params![invite_id],
    )?;
    Ok(())
  })
  .await
  .unwrap();

  let resolution = s
    .resolve_invite(invite.accept_token, InviteDecision::Accept)
    .await
    .unwrap();
  assert!(matches!(resolution, Resolution::Expired { .. }));
  assert!(s.find_user_by_email("late@example.com".into()).await.unwrap().is_none());

  let reissued = s
    .create_invites(g.group_id, alice, vec!["late@example.com".into()])
    .await
    .unwrap();
  assert_eq!(reissued[0].outcome, InviteOutcome::Invited);
}

#[tokio::test]
async fn failed_delivery_is_reported_per_recipient() {
  let s = store().await;
  let (_, alice) = citizen(&s, "alice").await;
  let g = group(&s, &alice, "Closed", AccessLevel::Closed).await;
  let notifier = RecordingNotifier {
    bounce: vec!["bounce@example.com".into()],
    ..RecordingNotifier::default()
  };

  let results = send_invites(
    &s,
    &notifier,
    g.group_id,
    &alice,
    vec![
      "ok@example.com".into(),
      "bounce@example.com".into(),
      "nope".into(),
    ],
    "https://civic.example/",
  )
  .await
  .unwrap();

  let delivered: Vec<_> = results.iter().map(|r| r.delivered).collect();
  assert_eq!(delivered, [Some(true), Some(false), None]);
  assert_eq!(results[1].outcome, InviteOutcome::Invited);

  let sent = notifier.sent.lock().unwrap();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].0, "ok@example.com");
  assert!(sent[0].2.contains("https://civic.example/invites/accept/"));
}
