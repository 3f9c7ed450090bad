//! Mutations and the invalidation that follows them.

use std::fmt;
use std::future::Future;
use tracing::{debug, warn};

use super::client::QueryClient;
use super::key::QueryKey;
use crate::error::ApiResult;

/// HTTP-equivalent verb of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
  Post,
  Put,
  Delete,
}

impl fmt::Display for Verb {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Verb::Post => "POST",
      Verb::Put => "PUT",
      Verb::Delete => "DELETE",
    })
  }
}

/// Description of a write and the cached data it makes stale.
#[derive(Debug, Clone)]
pub struct MutationIntent {
  pub verb: Verb,
  /// Target resource path, e.g. `/feedback/42/reply`.
  pub target: String,
  /// Key prefixes invalidated when the write succeeds.
  pub invalidates: Vec<QueryKey>,
}

impl MutationIntent {
  pub fn new(verb: Verb, target: impl Into<String>) -> Self {
    Self {
      verb,
      target: target.into(),
      invalidates: Vec::new(),
    }
  }

  pub fn invalidating(mut self, prefix: QueryKey) -> Self {
    self.invalidates.push(prefix);
    self
  }
}

impl fmt::Display for MutationIntent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.verb, self.target)
  }
}

impl QueryClient {
  /// Run `op` once. On success every entry under the intent's prefixes is
  /// invalidated before the result is returned; on failure the cache is
  /// left untouched, unless the session was rejected, and the error is
  /// handed back. Nothing is retried.
  pub async fn mutate<T, Fut>(&self, intent: &MutationIntent, op: Fut) -> ApiResult<T>
  where
    Fut: Future<Output = ApiResult<T>>,
  {
    debug!("mutation {}", intent);
    match op.await {
      Ok(value) => {
        for prefix in &intent.invalidates {
          self.invalidate(prefix);
        }
        Ok(value)
      }
      Err(err) => {
        warn!("mutation {} failed: {}", intent, err);
        if err.is_unauthorized() {
          self.require_auth();
        }
        Err(err)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ApiError;
  use crate::query::QueryOptions;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn counting(counter: Arc<AtomicU32>) -> impl Fn() -> futures::future::BoxFuture<'static, ApiResult<u32>> + Send + Sync {
    use futures::FutureExt;
    move || {
      let counter = counter.clone();
      async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }.boxed()
    }
  }

  #[tokio::test]
  async fn test_success_invalidates_before_resolving() {
    let client = QueryClient::new();
    let counter = Arc::new(AtomicU32::new(0));
    let users = QueryKey::new("users");
    let mut sub = client.subscribe(users.clone(), counting(counter.clone()), QueryOptions::default());
    sub.settled().await;

    let intent = MutationIntent::new(Verb::Put, "/users/u1/approve").invalidating(users.clone());
    let approved = client.mutate(&intent, async { Ok("u1") }).await.unwrap();
    assert_eq!(approved, "u1");

    let snap = sub.snapshot();
    assert!(snap.is_loading());
    assert!(snap.is_stale);

    assert_eq!(sub.settled().await.data(), Some(&2));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_failure_leaves_cache_untouched() {
    let client = QueryClient::new();
    let counter = Arc::new(AtomicU32::new(0));
    let users = QueryKey::new("users");
    let mut sub = client.subscribe(users.clone(), counting(counter.clone()), QueryOptions::default());
    let before = sub.settled().await;

    let intent = MutationIntent::new(Verb::Delete, "/users/u1").invalidating(users.clone());
    let result: ApiResult<()> = client
      .mutate(&intent, async {
        Err(ApiError::Validation {
          status: 400,
          message: "cannot delete yourself".into(),
        })
      })
      .await;

    assert!(result.is_err());
    let after = sub.snapshot();
    assert!(after.is_success());
    assert!(!after.is_stale);
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_intent_display() {
    let intent = MutationIntent::new(Verb::Post, "/feedback");
    assert_eq!(intent.to_string(), "POST /feedback");
  }
}
