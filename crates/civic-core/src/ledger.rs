//! Points ledger: action configuration, award rules, and the [`Ledger`]
//! component that applies them through a [`LedgerStore`].
//!
//! The log is append-only. A user's `civic_points` must always equal the sum
//! of their log rows; [`Ledger::recalculate`] replays the log to verify it.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  Error, Result, ResultExt,
  identity::Identity,
  ids::{SessionId, UserId},
  store::LedgerStore,
};

/// Reserved action that always logs, with caller-supplied points.
pub const MILESTONE_ACTION: &str = "milestone_achieved";

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointAction {
  pub action_name:    String,
  pub points_value:   i64,
  /// Minimum hours between two awards of this action to one identity.
  #[serde(default)]
  pub cooldown_hours: u32,
  /// Maximum awards per identity per UTC day.
  #[serde(default)]
  pub daily_limit:    Option<u32>,
  #[serde(default)]
  pub description:    String,
}

impl PointAction {
  pub fn new(name: impl Into<String>, points: i64) -> Self {
    Self {
      action_name:    name.into(),
      points_value:   points,
      cooldown_hours: 0,
      daily_limit:    None,
      description:    String::new(),
    }
  }

  pub fn cooldown(mut self, hours: u32) -> Self {
    self.cooldown_hours = hours;
    self
  }

  pub fn daily(mut self, limit: u32) -> Self {
    self.daily_limit = Some(limit);
    self
  }

  pub fn describe(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  /// Whether an award that passes the checks writes a log row.
  pub fn logs(&self) -> bool {
    self.points_value != 0 || self.action_name == MILESTONE_ACTION
  }

  /// Start of the cooldown window ending at `now`, if the action has one.
  pub fn cooldown_since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (self.cooldown_hours > 0)
      .then(|| now - Duration::hours(i64::from(self.cooldown_hours)))
  }

  /// Reject when a prior award falls inside the cooldown window.
  pub fn check_cooldown(&self, recent_awards: u64) -> Result<()> {
    if self.cooldown_hours > 0 && recent_awards > 0 {
      return Err(Error::CooldownActive {
        action: self.action_name.clone(),
        hours:  self.cooldown_hours,
      });
    }
    Ok(())
  }

  /// Reject when today's count already meets the daily limit.
  pub fn check_daily_limit(&self, today: u64) -> Result<()> {
    match self.daily_limit {
      Some(limit) if today >= u64::from(limit) => Err(Error::DailyLimitReached {
        action: self.action_name.clone(),
        limit,
      }),
      _ => Ok(()),
    }
  }
}

/// Midnight UTC of the day containing `now`.
pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
  now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// The action table, loaded once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct PointActions {
  actions: HashMap<String, PointAction>,
}

impl PointActions {
  pub fn new(actions: impl IntoIterator<Item = PointAction>) -> Self {
    let actions = actions
      .into_iter()
      .map(|a| (a.action_name.clone(), a))
      .collect();
    Self { actions }
  }

  /// The built-in table, used when configuration supplies none.
  pub fn defaults() -> Self {
    Self::new([
      PointAction::new("idea_submitted", 25)
        .daily(20)
        .describe("Submitted an idea"),
      PointAction::new("vote_cast", 2).daily(50).describe("Voted on an idea"),
      PointAction::new("group_created", 50)
        .cooldown(24)
        .describe("Created a group"),
      PointAction::new("group_joined", 10).describe("Joined a group"),
      PointAction::new("invite_accepted", 20)
        .describe("Accepted a group invitation"),
      PointAction::new("idea_promoted", 5).describe("Advanced an idea's status"),
      PointAction::new("page_visit", 1).cooldown(1).describe("Visited a page"),
      PointAction::new(MILESTONE_ACTION, 0).describe("Reached a milestone"),
    ])
  }

  pub fn get(&self, name: &str) -> Result<&PointAction> {
    self
      .actions
      .get(name)
      .ok_or_else(|| Error::UnknownAction(name.to_string()))
  }

  pub fn iter(&self) -> impl Iterator<Item = &PointAction> {
    self.actions.values()
  }

  pub fn len(&self) -> usize { self.actions.len() }

  pub fn is_empty(&self) -> bool { self.actions.is_empty() }
}

impl Default for PointActions {
  fn default() -> Self { Self::defaults() }
}

// ─── Log ─────────────────────────────────────────────────────────────────────

/// What an award was for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointContext {
  pub context_type: Option<String>,
  pub context_id:   Option<String>,
}

impl PointContext {
  pub fn new(kind: impl Into<String>, id: impl ToString) -> Self {
    Self {
      context_type: Some(kind.into()),
      context_id:   Some(id.to_string()),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointLogEntry {
  pub log_id:        i64,
  pub user_id:       Option<UserId>,
  pub session_id:    Option<SessionId>,
  pub action_name:   String,
  pub points_earned: i64,
  pub context:       PointContext,
  pub earned_at:     DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Award {
  Credited { log_id: i64, points: i64 },
  /// Zero-point action; nothing was written.
  Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transfer {
  pub rows_claimed:       u64,
  pub points_transferred: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
  pub user_id:  UserId,
  /// Running total before reconciliation.
  pub recorded: i64,
  /// Sum of the log; the running total after reconciliation.
  pub replayed: i64,
}

impl Reconciliation {
  pub fn drift(&self) -> i64 { self.recorded - self.replayed }

  pub fn corrected(&self) -> bool { self.drift() != 0 }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// Applies the action table to a ledger store.
pub struct Ledger<S> {
  store:   Arc<S>,
  actions: Arc<PointActions>,
}

impl<S> Clone for Ledger<S> {
  fn clone(&self) -> Self {
    Self {
      store:   Arc::clone(&self.store),
      actions: Arc::clone(&self.actions),
    }
  }
}

impl<S: LedgerStore> Ledger<S> {
  pub fn new(store: Arc<S>, actions: Arc<PointActions>) -> Self {
    Self { store, actions }
  }

  pub fn actions(&self) -> &PointActions { &self.actions }

  /// Award `action` to a user or session.
  ///
  /// Cooldown and daily-limit rejections come back as
  /// [`Error::CooldownActive`] and [`Error::DailyLimitReached`].
  pub async fn award(
    &self,
    identity: Identity,
    action: &str,
    context: PointContext,
  ) -> Result<Award> {
    let action = self.actions.get(action)?.clone();
    let name = action.action_name.clone();
    let award = self
      .store
      .award(identity.clone(), action, context)
      .await
      .err_into()?;
    debug!(?identity, action = %name, ?award, "award");
    Ok(award)
  }

  /// Award to an anonymous session. Sessions have no running total.
  pub async fn award_session(
    &self,
    session_id: SessionId,
    action: &str,
    context: PointContext,
  ) -> Result<Award> {
    self.award(Identity::Session(session_id), action, context).await
  }

  /// Log a milestone with a caller-chosen point value.
  pub async fn award_milestone(
    &self,
    user_id: UserId,
    milestone_id: &str,
    points: i64,
  ) -> Result<Award> {
    let base = self.actions.get(MILESTONE_ACTION)?;
    let action = PointAction { points_value: points, ..base.clone() };
    self
      .store
      .award(
        Identity::User(user_id),
        action,
        PointContext::new("milestone", milestone_id),
      )
      .await
      .err_into()
  }

  /// Claim a session's unclaimed rows for `user_id`. Idempotent.
  pub async fn transfer_session(
    &self,
    session_id: SessionId,
    user_id: UserId,
  ) -> Result<Transfer> {
    let transfer = self
      .store
      .transfer_session(session_id.clone(), user_id)
      .await
      .err_into()?;
    if transfer.rows_claimed > 0 {
      info!(
        session = %session_id,
        user = %user_id,
        rows = transfer.rows_claimed,
        points = transfer.points_transferred,
        "session points transferred"
      );
    }
    Ok(transfer)
  }

  /// Replay the log for `user_id` and correct the running total.
  pub async fn recalculate(&self, user_id: UserId) -> Result<Reconciliation> {
    let rec = self.store.recalculate(user_id).await.err_into()?;
    if rec.corrected() {
      warn!(
        user = %user_id,
        recorded = rec.recorded,
        replayed = rec.replayed,
        "civic_points drift corrected"
      );
    }
    Ok(rec)
  }

  pub async fn balance(&self, identity: Identity) -> Result<i64> {
    self.store.balance(identity).await.err_into()
  }

  pub async fn history(
    &self,
    identity: Identity,
    limit: usize,
  ) -> Result<Vec<PointLogEntry>> {
    self.store.history(identity, limit).await.err_into()
  }
}
