//! Entry status, options, and the read-only snapshots handed to consumers.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::ApiError;

/// Type-erased cached value.
pub(crate) type AnyData = Arc<dyn Any + Send + Sync>;

/// The status of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// Nothing has been requested yet (or the query is disabled)
  Idle,
  /// A request is in flight
  Loading,
  /// The last applied request succeeded
  Success,
  /// The last applied request failed
  Error,
}

/// Per-consumer options for a query.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
  /// When false no fetch is issued and the entry stays idle.
  pub enabled: bool,
  /// Background refresh cadence while subscribed. `None` or zero disables polling.
  pub refetch_interval: Option<Duration>,
  /// Age after which successful data counts as stale. `None` means data
  /// only goes stale through invalidation or failure.
  pub stale_time: Option<Duration>,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      enabled: true,
      refetch_interval: None,
      stale_time: None,
    }
  }
}

impl QueryOptions {
  pub fn enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
    self.refetch_interval = Some(interval);
    self
  }

  /// Set the stale time for this query.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = Some(duration);
    self
  }

  /// The polling interval, if polling is actually requested.
  pub(crate) fn polling_interval(&self) -> Option<Duration> {
    self.refetch_interval.filter(|d| !d.is_zero())
  }
}

/// Internal, type-erased state published to subscribers on every transition.
#[derive(Clone)]
pub(crate) struct EntryState {
  pub status: QueryStatus,
  pub data: Option<AnyData>,
  pub error: Option<ApiError>,
  pub updated_at: Option<DateTime<Utc>>,
  pub is_stale: bool,
}

impl Default for EntryState {
  fn default() -> Self {
    Self {
      status: QueryStatus::Idle,
      data: None,
      error: None,
      updated_at: None,
      is_stale: false,
    }
  }
}

impl EntryState {
  pub fn typed<T: Send + Sync + 'static>(&self) -> Snapshot<T> {
    let data = self.data.clone().and_then(|d| match d.downcast::<T>() {
      Ok(data) => Some(data),
      Err(_) => {
        warn!(
          "cached value does not have the requested type {}",
          std::any::type_name::<T>()
        );
        None
      }
    });

    Snapshot {
      status: self.status,
      data,
      error: self.error.clone(),
      updated_at: self.updated_at,
      is_stale: self.is_stale,
    }
  }
}

/// Read-only view of a cache entry at one point in time.
#[derive(Debug)]
pub struct Snapshot<T> {
  pub status: QueryStatus,
  /// Last successfully fetched value. Survives later failures and refreshes.
  pub data: Option<Arc<T>>,
  pub error: Option<ApiError>,
  pub updated_at: Option<DateTime<Utc>>,
  /// Data is present but no longer current (invalidated, failed refresh,
  /// or older than the stale time).
  pub is_stale: bool,
}

impl<T> Clone for Snapshot<T> {
  fn clone(&self) -> Self {
    Self {
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
      updated_at: self.updated_at,
      is_stale: self.is_stale,
    }
  }
}

impl<T> Snapshot<T> {
  pub fn is_idle(&self) -> bool {
    self.status == QueryStatus::Idle
  }

  pub fn is_loading(&self) -> bool {
    self.status == QueryStatus::Loading
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_deref()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_ref()
  }

  /// The entry failed because the session is gone.
  pub fn requires_auth(&self) -> bool {
    self.is_error() && self.error.as_ref().is_some_and(ApiError::is_unauthorized)
  }

  /// Collapse into the value of the last applied request.
  pub fn into_result(self) -> Result<Arc<T>, ApiError> {
    match (self.status, self.data, self.error) {
      (QueryStatus::Error, _, Some(err)) => Err(err),
      (QueryStatus::Idle, None, _) => Err(ApiError::Disabled),
      (_, Some(data), _) => Ok(data),
      (_, None, Some(err)) => Err(err),
      (_, None, None) => Err(ApiError::Cancelled),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zero_interval_disables_polling() {
    let opts = QueryOptions::default().with_refetch_interval(Duration::ZERO);
    assert_eq!(opts.polling_interval(), None);

    let opts = QueryOptions::default().with_refetch_interval(Duration::from_secs(30));
    assert_eq!(opts.polling_interval(), Some(Duration::from_secs(30)));
  }

  #[test]
  fn test_typed_snapshot_downcasts() {
    let state = EntryState {
      status: QueryStatus::Success,
      data: Some(Arc::new(vec![1u32, 2, 3])),
      ..EntryState::default()
    };

    let snap = state.typed::<Vec<u32>>();
    assert!(snap.is_success());
    assert_eq!(snap.data(), Some(&vec![1, 2, 3]));

    let wrong = state.typed::<String>();
    assert!(wrong.data().is_none());
  }

  #[test]
  fn test_requires_auth() {
    let state = EntryState {
      status: QueryStatus::Error,
      error: Some(ApiError::Unauthorized),
      ..EntryState::default()
    };
    assert!(state.typed::<u8>().requires_auth());
  }

  #[test]
  fn test_into_result_prefers_error_status() {
    let state = EntryState {
      status: QueryStatus::Error,
      data: Some(Arc::new(5u8)),
      error: Some(ApiError::Network("offline".into())),
      updated_at: None,
      is_stale: true,
    };
    assert_eq!(
      state.typed::<u8>().into_result().unwrap_err(),
      ApiError::Network("offline".into())
    );
  }
}
