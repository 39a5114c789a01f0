//! Group invitations: outcome classification and the one-way resolution
//! lifecycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, warn};

use crate::{
  Error, Result, ResultExt,
  collab::Notifier,
  identity::{Actor, DeviceSession, User},
  ids::{GroupId, UserId},
  store::GroupStore,
};

/// Invites expire this many days after creation.
pub const INVITE_TTL_DAYS: i64 = 7;

pub fn invite_ttl() -> Duration { Duration::days(INVITE_TTL_DAYS) }

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InviteStatus {
  #[default]
  Pending,
  Accepted,
  Declined,
  Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
  pub invite_id:     i64,
  pub group_id:      GroupId,
  pub email:         String,
  /// Set on creation when the address belongs to an account, or on
  /// acceptance.
  pub user_id:       Option<UserId>,
  pub invited_by:    UserId,
  #[serde(skip_serializing)]
  pub accept_token:  String,
  #[serde(skip_serializing)]
  pub decline_token: String,
  pub status:        InviteStatus,
  pub created_at:    DateTime<Utc>,
  pub expires_at:    DateTime<Utc>,
  pub resolved_at:   Option<DateTime<Utc>>,
}

// ─── Issuing ─────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InviteOutcome {
  Invited,
  InvalidEmail,
  /// The address belongs to an account that never verified it.
  NotVerified,
  AlreadyMember,
  AlreadyInvited,
}

/// Per-address result of [`send_invites`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteResult {
  pub email:     String,
  pub outcome:   InviteOutcome,
  /// Whether the notification went out. `None` when nothing was sent.
  pub delivered: Option<bool>,
}

/// What the store produced for one address, before notification.
#[derive(Debug, Clone)]
pub struct IssuedInvite {
  pub email:   String,
  pub outcome: InviteOutcome,
  pub invite:  Option<Invite>,
}

/// Trim and lowercase an address. `None` if it is not plausibly deliverable.
pub fn normalize_email(raw: &str) -> Option<String> {
  let email = raw.trim().to_lowercase();
  if email.len() > 254 || email.chars().any(char::is_whitespace) {
    return None;
  }
  let (local, domain) = email.split_once('@')?;
  let domain_ok = domain.contains('.')
    && !domain.starts_with('.')
    && !domain.ends_with('.')
    && !domain.contains('@');
  (!local.is_empty() && domain_ok).then_some(email)
}

/// Classify an address that already normalized cleanly.
pub fn classify_invitee(
  existing: Option<&User>,
  is_member: bool,
  has_pending_invite: bool,
) -> InviteOutcome {
  match existing {
    Some(user) if !user.email_verified => InviteOutcome::NotVerified,
    _ if is_member => InviteOutcome::AlreadyMember,
    _ if has_pending_invite => InviteOutcome::AlreadyInvited,
    _ => InviteOutcome::Invited,
  }
}

/// Derive a handle stem from the mailbox part of an address.
pub fn handle_stem(email: &str) -> String {
  let local = email.split('@').next().unwrap_or_default();
  let stem: String = local
    .chars()
    .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
    .take(24)
    .collect::<String>()
    .to_lowercase();
  if stem.is_empty() { "citizen".into() } else { stem }
}

/// Issue invites for every address and notify each new invitee.
///
/// Addresses are processed independently. A failed notification does not
/// undo the invite; it is reported as `delivered = Some(false)`.
pub async fn send_invites<S: GroupStore>(
  store: &S,
  notifier: &dyn Notifier,
  group_id: GroupId,
  requester: &Actor,
  emails: Vec<String>,
  public_url: &str,
) -> Result<Vec<InviteResult>> {
  let group = store
    .get_group(group_id)
    .await
    .err_into()?
    .ok_or(Error::GroupNotFound(group_id))?;
  let issued = store
    .create_invites(group_id, requester.clone(), emails)
    .await
    .err_into()?;

  let base = public_url.trim_end_matches('/');
  let mut results = Vec::with_capacity(issued.len());
  for item in issued {
    let delivered = match &item.invite {
      Some(invite) => {
        let subject = format!("You're invited to join {}", group.name);
        let body = format!(
          "You have been invited to the group \"{}\".\n\nAccept: \
           {base}/invites/accept/{}\nDecline: {base}/invites/decline/{}\n\n\
           This invitation expires on {}.",
          group.name,
          invite.accept_token,
          invite.decline_token,
          invite.expires_at.format("%Y-%m-%d"),
        );
        let ok = notifier.send(&invite.email, &subject, &body).await;
        if ok {
          debug!(group = %group_id, email = %invite.email, "invite sent");
        } else {
          warn!(group = %group_id, email = %invite.email, "invite delivery failed");
        }
        Some(ok)
      }
      None => None,
    };
    results.push(InviteResult {
      email: item.email,
      outcome: item.outcome,
      delivered,
    });
  }
  Ok(results)
}

// ─── Resolving ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteDecision {
  Accept,
  Decline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Resolution {
  Accepted {
    user_id:     UserId,
    group_id:    GroupId,
    /// Present only when an account was created for the invitee.
    provisioned: Option<DeviceSession>,
  },
  AlreadyAccepted {
    group_id: GroupId,
  },
  Declined {
    group_id: GroupId,
  },
  AlreadyDeclined {
    group_id: GroupId,
  },
  Expired {
    group_id: GroupId,
  },
}

/// What a store must do with an invite located by token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
  Accept,
  Decline,
  /// Pending but past `expires_at`: mark expired.
  Expire,
  /// Replay of an already-applied decision, or a resolved-expired invite.
  Replay(InviteStatus),
}

/// Decide how to apply `decision` to `invite` at `now`. Transitions are
/// one-way: replaying the opposite token of a resolved invite is a conflict.
pub fn plan_resolution(
  invite: &Invite,
  decision: InviteDecision,
  now: DateTime<Utc>,
) -> Result<ResolutionStep> {
  use InviteDecision as D;
  use InviteStatus as S;
  match (invite.status, decision) {
    (S::Pending, _) if now >= invite.expires_at => Ok(ResolutionStep::Expire),
    (S::Pending, D::Accept) => Ok(ResolutionStep::Accept),
    (S::Pending, D::Decline) => Ok(ResolutionStep::Decline),
    (S::Accepted, D::Accept) | (S::Declined, D::Decline) | (S::Expired, _) => {
      Ok(ResolutionStep::Replay(invite.status))
    }
    (status, _) => Err(Error::Conflict(format!("invite already {status}"))),
  }
}

impl Resolution {
  pub fn replay(status: InviteStatus, group_id: GroupId) -> Self {
    match status {
      InviteStatus::Accepted => Self::AlreadyAccepted { group_id },
      InviteStatus::Declined => Self::AlreadyDeclined { group_id },
      InviteStatus::Pending | InviteStatus::Expired => {
        Self::Expired { group_id }
      }
    }
  }
}
