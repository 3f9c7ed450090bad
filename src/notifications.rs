//! Polled notification delivery.
//!
//! The backend has no push channel, so the notification list and the unread
//! count are two polled queries. Read state only moves one way, and the
//! unread count is always re-queried after a transition instead of being
//! patched locally.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::api::types::{Notification, UnreadCount};
use crate::api::SchoolClient;
use crate::error::ApiResult;
use crate::query::{Snapshot, Subscription};

/// How often the notification bell refreshes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

impl Notification {
  /// Mark this notification read. Returns false if it already was.
  pub fn mark_read(&mut self) -> bool {
    if self.is_read {
      return false;
    }
    self.is_read = true;
    true
  }
}

/// Number of unread items in `items`.
pub fn unread_count(items: &[Notification]) -> usize {
  items.iter().filter(|n| !n.is_read).count()
}

/// Badge text for an unread count: empty at zero, capped at "9+".
pub fn badge(count: u32) -> String {
  match count {
    0 => String::new(),
    1..=9 => count.to_string(),
    _ => "9+".to_string(),
  }
}

/// Entry point for reading and acknowledging notifications.
#[derive(Clone)]
pub struct NotificationCenter {
  client: SchoolClient,
  interval: Duration,
}

impl NotificationCenter {
  pub fn new(client: SchoolClient, interval: Duration) -> Self {
    Self { client, interval }
  }

  /// Start polling the list and the unread count. Polling stops when the
  /// returned feed is dropped.
  pub fn feed(&self) -> NotificationFeed {
    NotificationFeed {
      list: self.client.watch_notifications(Some(self.interval)),
      count: self.client.watch_unread_count(Some(self.interval)),
    }
  }

  pub async fn list(&self) -> ApiResult<Arc<Vec<Notification>>> {
    self.client.notifications().await
  }

  /// Mark one notification read.
  ///
  /// Returns `Ok(false)` without contacting the server when the
  /// notification is already read.
  pub async fn mark_read(&self, id: &str) -> ApiResult<bool> {
    let current = self.client.notifications().await?;
    if current.iter().any(|n| n.id == id && n.is_read) {
      debug!("notification {} already read", id);
      return Ok(false);
    }
    self.client.mark_notification_read(id).await?;
    Ok(true)
  }

  /// Mark every unread notification read in one request.
  ///
  /// The list is re-read from the server first. Returns how many were
  /// unread; when none are, nothing is sent.
  pub async fn mark_all_read(&self) -> ApiResult<usize> {
    let current = self.client.fresh_notifications().await?;
    let unread = unread_count(&current);
    if unread == 0 {
      debug!("no unread notifications");
      return Ok(0);
    }
    self.client.mark_all_notifications_read().await?;
    Ok(unread)
  }
}

/// Live view over the polled notification queries.
#[derive(Debug)]
pub struct NotificationFeed {
  list: Subscription<Vec<Notification>>,
  count: Subscription<UnreadCount>,
}

impl NotificationFeed {
  pub fn list(&self) -> Snapshot<Vec<Notification>> {
    self.list.snapshot()
  }

  pub fn count(&self) -> Snapshot<UnreadCount> {
    self.count.snapshot()
  }

  /// Unread count as reported by the server, or derived from the list
  /// while the count has not loaded.
  pub fn unread(&self) -> u32 {
    if let Some(count) = self.count.snapshot().data() {
      return count.count;
    }
    self
      .list
      .snapshot()
      .data()
      .map(|items| unread_count(items) as u32)
      .unwrap_or(0)
  }

  pub fn badge(&self) -> String {
    badge(self.unread())
  }

  /// Wait until either query publishes a new state.
  pub async fn changed(&mut self) {
    tokio::select! {
      _ = self.list.changed() => {}
      _ = self.count.changed() => {}
    }
  }

  /// Wait until neither query has a request in flight.
  pub async fn settled(&mut self) {
    self.list.settled().await;
    self.count.settled().await;
  }
}
