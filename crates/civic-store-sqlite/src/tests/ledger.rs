use std::sync::Arc;

use civic_core::{
  Error as CoreError, ErrorKind,
  identity::{Identity, NewUser, VerificationTier},
  ids::SessionId,
  ledger::{Award, Ledger, PointAction, PointActions, PointContext},
  store::UserStore,
};
use rusqlite::params;

use super::{citizen, store};
use crate::SqliteStore;

async fn ledger() -> (SqliteStore, Ledger<SqliteStore>) {
  let s = store().await;
  let ledger = Ledger::new(Arc::new(s.clone()), Arc::new(PointActions::defaults()));
  (s, ledger)
}

fn ctx() -> PointContext { PointContext::default() }

#[tokio::test]
async fn award_logs_and_credits() {
  let (s, ledger) = ledger().await;
  let (alice, _) = citizen(&s, "alice").await;
  let who = Identity::User(alice.user_id);

  let award = ledger
    .award(who.clone(), "idea_submitted", PointContext::new("idea", 7))
    .await
    .unwrap();
  assert!(matches!(award, Award::Credited { points: 25, .. }));
  assert_eq!(ledger.balance(who.clone()).await.unwrap(), 25);

  let history = ledger.history(who, 10).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].context.context_type.as_deref(), Some("idea"));
  assert_eq!(history[0].context.context_id.as_deref(), Some("7"));
  assert_eq!(s.get_user(alice.user_id).await.unwrap().unwrap().civic_points, 25);
}

#[tokio::test]
async fn unknown_actions_are_rejected_on_every_path() {
  let (_, ledger) = ledger().await;
  let err = ledger
    .award_session(SessionId::new("s1"), "teleported", ctx())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::UnknownAction(_)));
  assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn cooldown_blocks_a_second_award() {
  let (s, ledger) = ledger().await;
  let (alice, _) = citizen(&s, "alice").await;
  let who = Identity::User(alice.user_id);

  ledger.award(who.clone(), "group_created", ctx()).await.unwrap();
  let err = ledger
    .award(who.clone(), "group_created", ctx())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::CooldownActive { hours: 24, .. }));
  assert_eq!(err.kind(), ErrorKind::RaceCondition);
  assert_eq!(ledger.balance(who).await.unwrap(), 50);
}

#[tokio::test]
async fn concurrent_awards_inside_a_cooldown_credit_once() {
  let (s, ledger) = ledger().await;
  let (alice, _) = citizen(&s, "alice").await;
  let who = Identity::User(alice.user_id);

  let (a, b) = tokio::join!(
    ledger.award(who.clone(), "group_created", ctx()),
    ledger.award(who.clone(), "group_created", ctx()),
  );
  assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
  assert_eq!(ledger.balance(who).await.unwrap(), 50);
}

#[tokio::test]
async fn daily_limit_is_enforced() {
  let s = store().await;
  let actions = PointActions::new([PointAction::new("vote_cast", 2).daily(2)]);
  let ledger = Ledger::new(Arc::new(s.clone()), Arc::new(actions));
  let session = SessionId::new("s1");

  ledger.award_session(session.clone(), "vote_cast", ctx()).await.unwrap();
  ledger.award_session(session.clone(), "vote_cast", ctx()).await.unwrap();
  let err = ledger
    .award_session(session.clone(), "vote_cast", ctx())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::DailyLimitReached { limit: 2, .. }));
  assert_eq!(ledger.balance(Identity::Session(session)).await.unwrap(), 4);
}

#[tokio::test]
async fn zero_point_actions_skip_but_milestones_log() {
  let s = store().await;
  let actions = PointActions::new([
    PointAction::new("page_view", 0),
    PointAction::new(civic_core::ledger::MILESTONE_ACTION, 0),
  ]);
  let ledger = Ledger::new(Arc::new(s.clone()), Arc::new(actions));
  let (alice, _) = citizen(&s, "alice").await;
  let who = Identity::User(alice.user_id);

  let skipped = ledger.award(who.clone(), "page_view", ctx()).await.unwrap();
  assert!(matches!(skipped, Award::Skipped));
  assert!(ledger.history(who.clone(), 10).await.unwrap().is_empty());

  let milestone = ledger
    .award_milestone(alice.user_id, "first_digest", 100)
    .await
    .unwrap();
  assert!(matches!(milestone, Award::Credited { points: 100, .. }));
  let history = ledger.history(who.clone(), 10).await.unwrap();
  assert_eq!(history[0].context.context_id.as_deref(), Some("first_digest"));
  assert_eq!(ledger.balance(who).await.unwrap(), 100);
}

#[tokio::test]
async fn transfer_is_idempotent() {
  let (s, ledger) = ledger().await;
  let (alice, _) = citizen(&s, "alice").await;
  let session = SessionId::new("s1");
  ledger
    .award_session(session.clone(), "idea_submitted", ctx())
    .await
    .unwrap();
  ledger
    .award_session(session.clone(), "vote_cast", ctx())
    .await
    .unwrap();
  assert_eq!(
    ledger.balance(Identity::Session(session.clone())).await.unwrap(),
    27
  );

  let first = ledger.transfer_session(session.clone(), alice.user_id).await.unwrap();
  assert_eq!((first.rows_claimed, first.points_transferred), (2, 27));
  let second = ledger.transfer_session(session.clone(), alice.user_id).await.unwrap();
  assert_eq!((second.rows_claimed, second.points_transferred), (0, 0));

  let who = Identity::User(alice.user_id);
  assert_eq!(ledger.balance(who).await.unwrap(), 27);
  assert_eq!(ledger.balance(Identity::Session(session)).await.unwrap(), 0);
  let rec = ledger.recalculate(alice.user_id).await.unwrap();
  assert!(!rec.corrected());
}

fn newcomer() -> NewUser {
  NewUser {
    handle:         "alice".into(),
    email:          Some("alice@example.com".into()),
    email_verified: false,
    tier:           VerificationTier::Anonymous,
  }
}

#[tokio::test]
async fn registration_is_all_or_nothing() {
  let (s, ledger) = ledger().await;
  let session = SessionId::new("s1");
  ledger
    .award_session(session.clone(), "idea_submitted", ctx())
    .await
    .unwrap();

  s.with_conn(|conn| {
    conn.execute_batch(
      "CREATE TRIGGER block_claims BEFORE UPDATE OF user_id ON points_log
       BEGIN SELECT RAISE(ABORT, 'claims blocked'); END;",
    )?;
    Ok(())
  })
  .await
  .unwrap();
  assert!(s.register(newcomer(), Some(session.clone())).await.is_err());
  assert!(s.find_user_by_email("alice@example.com".into()).await.unwrap().is_none());
  assert_eq!(
    ledger.balance(Identity::Session(session.clone())).await.unwrap(),
    25
  );

  s.with_conn(|conn| {
    conn.execute_batch("DROP TRIGGER block_claims;")?;
    Ok(())
  })
  .await
  .unwrap();
  let reg = s.register(newcomer(), Some(session.clone())).await.unwrap();
  assert_eq!((reg.transfer.rows_claimed, reg.transfer.points_transferred), (1, 25));
  assert_eq!(reg.user.civic_points, 25);
  let resolved = s.resolve_device_session(reg.session.token.clone()).await.unwrap();
  assert_eq!(resolved.map(|u| u.user_id), Some(reg.user.user_id));
  assert_eq!(ledger.balance(Identity::Session(session)).await.unwrap(), 0);
}

#[tokio::test]
async fn recalculate_repairs_drift() {
  let (s, ledger) = ledger().await;
  let (alice, _) = citizen(&s, "alice").await;
  ledger
    .award(Identity::User(alice.user_id), "idea_submitted", ctx())
    .await
    .unwrap();
  let uid = alice.user_id.0;
  s.with_conn(move |conn| {
    conn.execute(
      "UPDATE users SET civic_points = 999 WHERE user_id = ?1",
      params![uid],
    )?;
    Ok(())
  })
  .await
  .unwrap();

  let rec = ledger.recalculate(alice.user_id).await.unwrap();
  assert_eq!((rec.recorded, rec.replayed, rec.drift()), (999, 25, 974));
  assert_eq!(ledger.balance(Identity::User(alice.user_id)).await.unwrap(), 25);
  assert!(!ledger.recalculate(alice.user_id).await.unwrap().corrected());
}

#[tokio::test]
async fn log_rows_cannot_be_rewritten() {
  let (s, ledger) = ledger().await;
  let (alice, _) = citizen(&s, "alice").await;
  ledger
    .award(Identity::User(alice.user_id), "idea_submitted", ctx())
    .await
    .unwrap();

  let deleted = s
    .with_conn(|conn| {
      conn.execute("DELETE FROM points_log", [])?;
      Ok(())
    })
    .await;
  assert!(deleted.is_err());

  let inflated = s
    .with_conn(|conn| {
      conn.execute("UPDATE points_log SET points_earned = 1000", [])?;
      Ok(())
    })
    .await;
  assert!(inflated.is_err());
}

#[tokio::test]
async fn awards_to_missing_users_fail_cleanly() {
  let (_, ledger) = ledger().await;
  let err = ledger
    .award(
      Identity::User(civic_core::UserId(404)),
      "idea_submitted",
      ctx(),
    )
    .await
    .unwrap_err();
  assert!(err.is_not_found());
}
