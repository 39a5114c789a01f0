//! Notification delivery.

use async_trait::async_trait;
use civic_core::collab::Notifier;
use tracing::{debug, info};

/// Writes every notification to the log instead of sending it. Suitable for
/// development and for deployments that relay mail from the log stream.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
  async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
    info!(%to, %subject, "notification");
    debug!(%to, %body, "notification body");
    true
  }
}
