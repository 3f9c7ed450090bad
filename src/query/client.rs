//! Process-wide query cache with request de-duplication, polling and
//! prefix invalidation.
//!
//! A [`QueryClient`] owns every cache entry. Consumers either ask for a
//! value once ([`QueryClient::get_or_fetch`]) or stay subscribed
//! ([`QueryClient::subscribe`]) and receive every status transition through
//! the returned [`Subscription`]. Dropping the subscription releases it,
//! and dropping the last polling subscription for a key cancels its timer.
//!
//! # Example
//!
//! ```ignore
//! let queries = QueryClient::new();
//! let api = api.clone();
//! let mut sub = queries.subscribe(
//!   SchoolQuery::Notifications.key(),
//!   move || {
//!     let api = api.clone();
//!     async move { api.notifications().await }
//!   },
//!   QueryOptions::default().with_refetch_interval(Duration::from_secs(30)),
//! );
//!
//! loop {
//!   let snapshot = sub.changed().await;
//!   if let Some(list) = snapshot.data() {
//!     render(list);
//!   }
//! }
//! ```

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::key::QueryKey;
use super::state::{AnyData, EntryState, QueryOptions, QueryStatus, Snapshot};
use crate::error::{ApiError, ApiResult};

type FetchResult = Result<AnyData, ApiError>;

/// A factory function that creates futures for fetching data
type FetcherFn = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;

type InFlightFuture = Shared<BoxFuture<'static, FetchResult>>;

struct InFlight {
  seq: u64,
  future: InFlightFuture,
}

struct Entry {
  state: EntryState,
  tx: watch::Sender<EntryState>,
  fetcher: Option<FetcherFn>,
  stale_time: Option<Duration>,
  in_flight: Option<InFlight>,
  /// Sequence number of the most recently issued request.
  latest_seq: u64,
  /// Set by invalidation, cleared by the next successful response.
  invalidated: bool,
  /// Enabled subscriptions currently holding this entry.
  subscribers: usize,
}

impl Entry {
  fn new() -> Self {
    let (tx, _) = watch::channel(EntryState::default());
    Self {
      state: EntryState::default(),
      tx,
      fetcher: None,
      stale_time: None,
      in_flight: None,
      latest_seq: 0,
      invalidated: false,
      subscribers: 0,
    }
  }

  fn publish(&self) {
    self.tx.send_replace(self.state.clone());
  }

  fn is_expired(&self) -> bool {
    match (self.stale_time, self.state.updated_at) {
      (Some(stale_time), Some(updated_at)) => {
        let age = Utc::now().signed_duration_since(updated_at);
        age.to_std().map(|age| age > stale_time).unwrap_or(false)
      }
      _ => false,
    }
  }

  fn is_fresh(&self) -> bool {
    self.state.status == QueryStatus::Success && !self.invalidated && !self.is_expired()
  }

  fn current_state(&self) -> EntryState {
    let mut state = self.state.clone();
    if state.data.is_some() && self.is_expired() {
      state.is_stale = true;
    }
    state
  }
}

struct Timer {
  handle: JoinHandle<()>,
  refs: usize,
}

#[derive(Default)]
struct Registry {
  entries: HashMap<QueryKey, Entry>,
  /// One timer per distinct (key, interval) pair.
  timers: HashMap<(QueryKey, Duration), Timer>,
  next_seq: u64,
  closed: bool,
}

impl Registry {
  fn entry(&mut self, key: &QueryKey) -> &mut Entry {
    self.entries.entry(key.clone()).or_insert_with(Entry::new)
  }

  fn next_seq(&mut self) -> u64 {
    self.next_seq += 1;
    self.next_seq
  }
}

struct Inner {
  registry: Mutex<Registry>,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, Registry> {
    self.registry.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Issue a new request for `key` with its registered fetcher.
  ///
  /// Any request already in flight keeps running, but its response will be
  /// discarded because this one carries a newer sequence number.
  fn start_fetch(
    self: &Arc<Self>,
    registry: &mut Registry,
    key: &QueryKey,
  ) -> Option<(u64, InFlightFuture)> {
    let seq = registry.next_seq();
    let entry = registry.entries.get_mut(key)?;
    let fetcher = entry.fetcher.clone()?;

    entry.latest_seq = seq;
    entry.state.status = QueryStatus::Loading;
    entry.state.is_stale = entry.state.data.is_some();
    entry.publish();

    debug!("fetching {} (request {})", key, seq);

    let weak = Arc::downgrade(self);
    let task_key = key.clone();
    let handle = tokio::spawn(async move {
      let result = match AssertUnwindSafe(fetcher()).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
          warn!("fetch for {} panicked", task_key);
          Err(ApiError::Cancelled)
        }
      };
      // The cache is updated even if every requester has gone away.
      if let Some(inner) = weak.upgrade() {
        inner.apply(&task_key, seq, result.clone());
      }
      result
    });

    let future = async move { handle.await.unwrap_or(Err(ApiError::Cancelled)) }
      .boxed()
      .shared();

    entry.in_flight = Some(InFlight {
      seq,
      future: future.clone(),
    });

    Some((seq, future))
  }

  /// Join the request in flight for `key`, or start one if the entry needs it.
  fn join_or_start(
    self: &Arc<Self>,
    registry: &mut Registry,
    key: &QueryKey,
    force: bool,
  ) -> Option<(u64, InFlightFuture)> {
    let entry = registry.entries.get(key)?;
    if let Some(in_flight) = &entry.in_flight {
      return Some((in_flight.seq, in_flight.future.clone()));
    }
    if force || !entry.is_fresh() {
      return self.start_fetch(registry, key);
    }
    None
  }

  /// Apply a response, discarding it if a newer request has been issued.
  ///
  /// An unauthorized response ends the session however old it is.
  fn apply(&self, key: &QueryKey, seq: u64, result: FetchResult) {
    let mut registry = self.lock();
    if matches!(result, Err(ApiError::Unauthorized)) {
      debug!("request {} for {} was unauthorized", seq, key);
      expire_session(&mut registry);
      return;
    }

    let Some(entry) = registry.entries.get_mut(key) else {
      return;
    };

    if entry.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
      entry.in_flight = None;
    }

    if seq < entry.latest_seq {
      debug!(
        "discarding response {} for {}: request {} is newer",
        seq, key, entry.latest_seq
      );
      return;
    }

    match result {
      Ok(data) => {
        entry.state = EntryState {
          status: QueryStatus::Success,
          data: Some(data),
          error: None,
          updated_at: Some(Utc::now()),
          is_stale: false,
        };
        entry.invalidated = false;
      }
      Err(err) => {
        debug!("fetch for {} failed: {}", key, err);
        entry.state.status = QueryStatus::Error;
        entry.state.is_stale = entry.state.data.is_some();
        entry.state.error = Some(err);
      }
    }
    entry.publish();
  }

  /// Timer path: behaves like an explicit fetch, joining any request in flight.
  fn poll_refresh(self: &Arc<Self>, key: &QueryKey) {
    let mut registry = self.lock();
    let active = registry
      .entries
      .get(key)
      .is_some_and(|entry| entry.subscribers > 0);
    if active {
      let _ = self.join_or_start(&mut registry, key, true);
    }
  }

  fn acquire_timer(self: &Arc<Self>, registry: &mut Registry, key: &QueryKey, interval: Duration) {
    let slot = (key.clone(), interval);
    if let Some(timer) = registry.timers.get_mut(&slot) {
      timer.refs += 1;
      return;
    }

    debug!("polling {} every {:?}", key, interval);

    let weak = Arc::downgrade(self);
    let key = key.clone();
    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
          break;
        };
        inner.poll_refresh(&key);
      }
    });

    registry.timers.insert(slot, Timer { handle, refs: 1 });
  }

  fn release(&self, key: &QueryKey, counted: bool, interval: Option<Duration>) {
    let mut registry = self.lock();

    if counted {
      if let Some(entry) = registry.entries.get_mut(key) {
        entry.subscribers = entry.subscribers.saturating_sub(1);
      }
    }

    if let Some(interval) = interval {
      let slot = (key.clone(), interval);
      let remove = match registry.timers.get_mut(&slot) {
        Some(timer) => {
          timer.refs = timer.refs.saturating_sub(1);
          timer.refs == 0
        }
        None => false,
      };
      if remove {
        if let Some(timer) = registry.timers.remove(&slot) {
          timer.handle.abort();
          debug!("stopped polling {}", key);
        }
      }
    }
  }
}

impl Drop for Inner {
  fn drop(&mut self) {
    let registry = self.registry.get_mut().unwrap_or_else(PoisonError::into_inner);
    for (_, timer) in registry.timers.drain() {
      timer.handle.abort();
    }
  }
}

fn expire_session(registry: &mut Registry) {
  let seq = registry.next_seq();
  for entry in registry.entries.values_mut() {
    entry.latest_seq = seq;
    entry.in_flight = None;
    entry.invalidated = true;
    entry.state = EntryState {
      status: QueryStatus::Error,
      data: None,
      error: Some(ApiError::Unauthorized),
      updated_at: None,
      is_stale: false,
    };
    entry.publish();
  }
  warn!(
    "session ended; {} cache entries require authentication",
    registry.entries.len()
  );
}

fn erase<T, F, Fut>(fetcher: F) -> FetcherFn
where
  T: Send + Sync + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = ApiResult<T>> + Send + 'static,
{
  Arc::new(move || {
    let fut = fetcher();
    async move { fut.await.map(|value| Arc::new(value) as AnyData) }.boxed()
  })
}

/// Shared cache of server-derived data.
///
/// Cloning is cheap and every clone sees the same entries. Methods that
/// start requests spawn onto the current Tokio runtime.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<Inner>,
}

impl Default for QueryClient {
  fn default() -> Self {
    Self::new()
  }
}

impl QueryClient {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Inner {
        registry: Mutex::new(Registry::default()),
      }),
    }
  }

  /// Return the freshest known value for `key`, fetching it if the entry is
  /// missing, failed, invalidated, or older than its stale time.
  ///
  /// Concurrent callers for the same key share one request. If a newer
  /// request is issued while waiting, this waits for that one instead.
  pub async fn get_or_fetch<T, F, Fut>(
    &self,
    key: &QueryKey,
    fetcher: F,
    options: QueryOptions,
  ) -> Snapshot<T>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let pending = {
      let mut registry = self.inner.lock();
      let entry = registry.entry(key);
      entry.fetcher = Some(erase(fetcher));
      entry.stale_time = options.stale_time;
      if !options.enabled {
        return entry.current_state().typed();
      }
      self.inner.join_or_start(&mut registry, key, false)
    };
    self.wait(key, pending).await
  }

  /// Issue a new request for `key` regardless of freshness and return its
  /// result. Use when a decision must not rest on cached data.
  pub async fn fetch_fresh<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> ApiResult<Arc<T>>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let pending = {
      let mut registry = self.inner.lock();
      registry.entry(key).fetcher = Some(erase(fetcher));
      self.inner.start_fetch(&mut registry, key)
    };
    self.wait(key, pending).await.into_result()
  }

  /// Wait for `pending`, following any newer request issued meanwhile.
  async fn wait<T: Send + Sync + 'static>(
    &self,
    key: &QueryKey,
    mut pending: Option<(u64, InFlightFuture)>,
  ) -> Snapshot<T> {
    while let Some((seq, future)) = pending.take() {
      let _ = future.await;
      pending = {
        let registry = self.inner.lock();
        registry
          .entries
          .get(key)
          .and_then(|entry| entry.in_flight.as_ref())
          .filter(|in_flight| in_flight.seq > seq)
          .map(|in_flight| (in_flight.seq, in_flight.future.clone()))
      };
    }

    self.snapshot(key)
  }

  /// Like [`QueryClient::get_or_fetch`], collapsed into the fetched value.
  pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> ApiResult<Arc<T>>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    self
      .get_or_fetch(key, fetcher, QueryOptions::default())
      .await
      .into_result()
  }

  /// Subscribe to `key`. Must be called from within a Tokio runtime.
  ///
  /// An enabled subscription fetches immediately unless the entry is fresh,
  /// and polls at `options.refetch_interval` until the subscription drops.
  pub fn subscribe<T, F, Fut>(&self, key: QueryKey, fetcher: F, options: QueryOptions) -> Subscription<T>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    let mut registry = self.inner.lock();
    let closed = registry.closed;

    let entry = registry.entry(&key);
    entry.fetcher = Some(erase(fetcher));
    entry.stale_time = options.stale_time;
    if options.enabled {
      entry.subscribers += 1;
    }

    let mut interval = None;
    if options.enabled {
      let _ = self.inner.join_or_start(&mut registry, &key, false);
      if !closed {
        interval = options.polling_interval();
      }
    }
    if let Some(interval) = interval {
      self.inner.acquire_timer(&mut registry, &key, interval);
    }

    // Subscribed after any fetch above, so the first `changed()` waits for
    // the response rather than the loading transition.
    let rx = registry.entry(&key).tx.subscribe();
    drop(registry);

    Subscription {
      client: self.clone(),
      key,
      counted: options.enabled,
      interval,
      rx,
      _marker: PhantomData,
    }
  }

  /// Force a new request for `key`, even if one is already in flight.
  ///
  /// Returns false when no fetcher has been registered for the key.
  pub fn refetch(&self, key: &QueryKey) -> bool {
    let mut registry = self.inner.lock();
    self.inner.start_fetch(&mut registry, key).is_some()
  }

  /// Mark every entry under `prefix` stale.
  ///
  /// Entries with an enabled subscriber move to `Loading` and are refetched
  /// right away; the rest refetch on their next read. Returns the number of
  /// entries matched.
  pub fn invalidate(&self, prefix: &QueryKey) -> usize {
    let mut registry = self.inner.lock();
    let keys: Vec<QueryKey> = registry
      .entries
      .keys()
      .filter(|key| key.starts_with(prefix))
      .cloned()
      .collect();

    for key in &keys {
      let Some(entry) = registry.entries.get_mut(key) else {
        continue;
      };
      entry.invalidated = true;
      entry.state.is_stale = entry.state.data.is_some();

      if entry.subscribers > 0 && entry.fetcher.is_some() {
        let _ = self.inner.start_fetch(&mut registry, key);
      } else {
        entry.publish();
      }
    }

    info!("invalidated {} entries under {}", keys.len(), prefix);
    keys.len()
  }

  /// Current snapshot of `key`; idle if it has never been requested.
  pub fn snapshot<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Snapshot<T> {
    let registry = self.inner.lock();
    registry
      .entries
      .get(key)
      .map(Entry::current_state)
      .unwrap_or_default()
      .typed()
  }

  /// Drop all cached data and move every entry to the
  /// authentication-required state. Responses to requests issued before
  /// this call are discarded.
  ///
  /// Happens automatically when any fetch fails with
  /// [`ApiError::Unauthorized`].
  pub fn require_auth(&self) {
    expire_session(&mut self.inner.lock());
  }

  /// Cancel every polling timer. Subscriptions created afterwards do not poll.
  pub fn shutdown(&self) {
    let mut registry = self.inner.lock();
    registry.closed = true;
    for (_, timer) in registry.timers.drain() {
      timer.handle.abort();
    }
    info!("query client shut down");
  }

  /// Number of running polling timers.
  pub fn active_timers(&self) -> usize {
    self.inner.lock().timers.len()
  }
}

/// Scoped subscription to one cache entry.
///
/// Dropping it unsubscribes; the polling timer for its (key, interval) stops
/// when the last subscription using it is dropped. A request already in
/// flight still completes and updates the cache.
pub struct Subscription<T> {
  client: QueryClient,
  key: QueryKey,
  counted: bool,
  interval: Option<Duration>,
  rx: watch::Receiver<EntryState>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Subscription<T> {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// Latest published state.
  pub fn snapshot(&self) -> Snapshot<T> {
    self.rx.borrow().typed()
  }

  /// Returns `true` if the state changed since the last call.
  /// Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    match self.rx.has_changed() {
      Ok(true) => {
        self.rx.borrow_and_update();
        true
      }
      _ => false,
    }
  }

  /// Wait for the next status transition and return the new state.
  pub async fn changed(&mut self) -> Snapshot<T> {
    if self.rx.changed().await.is_err() {
      debug!("cache entry {} was dropped", self.key);
    }
    self.rx.borrow_and_update().typed()
  }

  /// Wait until no request is in flight and return the settled state.
  pub async fn settled(&mut self) -> Snapshot<T> {
    loop {
      let snapshot = self.rx.borrow_and_update().typed::<T>();
      if !snapshot.is_loading() {
        return snapshot;
      }
      if self.rx.changed().await.is_err() {
        return self.snapshot();
      }
    }
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    self
      .client
      .inner
      .release(&self.key, self.counted, self.interval);
  }
}

impl<T> std::fmt::Debug for Subscription<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("interval", &self.interval)
      .finish_non_exhaustive()
  }
}
