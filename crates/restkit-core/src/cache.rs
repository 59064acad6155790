//! Query cache behind every read operation.
//!
//! Each [`CacheKey`] owns one entry with the state machine
//! `idle -> loading -> {resolved, errored}`; a revalidation moves a settled
//! entry back to `loading` while keeping the last value visible.
//!
//! Concurrency rules:
//!
//! - At most one request per key is joined by callers. A second `load` while
//!   one is in flight waits on the same result instead of issuing a request.
//! - Requests run on their own task, so dropping a caller never cancels the
//!   network call.
//! - Every request gets a sequence number from a cache-wide counter. A result
//!   is applied only when its sequence is newer than the last applied one, so
//!   a slow request can never overwrite a newer result or a local mutation.
//! - An entry lives while it has subscribers or a request in flight. When the
//!   last subscriber leaves, an idle entry is evicted at once; a busy one is
//!   evicted when its request completes and that result is discarded. A key
//!   revived later starts empty.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::watch;

use crate::args::{CallArgs, ParamMap};
use crate::client::ApiClient;
use crate::config::CallOptions;
use crate::error::{ApiError, TransportError};
use crate::fetcher::{self, Fetcher};
use crate::namespace::PreparedCall;
use crate::operation::{InvalidationTarget, ParamMatch};

/// `(resource.operation, canonical params)`. Parameters are serialized with
/// object keys sorted at every depth, so structurally equal maps always
/// produce the same key. An empty parameter map has no serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    scope: String,
    params: Option<String>,
}

impl CacheKey {
    pub fn new(scope: impl Into<String>, params: &ParamMap) -> Self {
        let params = (!params.is_empty()).then(|| {
            let object = params
                .iter()
                .map(|(name, value)| (name.clone(), canonicalize(value)))
                .collect();
            Value::Object(object).to_string()
        });
        Self {
            scope: scope.into(),
            params,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn params(&self) -> Option<&str> {
        self.params.as_deref()
    }

    /// Resource part of the scope (`products` for `products.list`).
    pub fn resource(&self) -> &str {
        self.scope
            .split_once('.')
            .map(|(resource, _)| resource)
            .unwrap_or(&self.scope)
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.params {
            Some(params) => write!(f, "{}:{}", self.scope, params),
            None => f.write_str(&self.scope),
        }
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(name, value)| (name.clone(), canonicalize(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Settled outcome of the last applied request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryStatus {
    #[default]
    Idle,
    Loading,
    Resolved,
    Errored,
}

/// Snapshot of one cache entry as exposed to hook consumers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub status: QueryStatus,
    pub data: Option<Value>,
    pub error: Option<ApiError>,
    pub is_loading: bool,
    pub is_stale: bool,
}

impl QueryState {
    fn from_error(error: ApiError) -> Self {
        Self {
            status: QueryStatus::Errored,
            error: Some(error),
            ..Self::default()
        }
    }
}

type Settled = Option<Result<Value, ApiError>>;

#[derive(Debug)]
struct InFlight {
    seq: u64,
    result: watch::Receiver<Settled>,
}

#[derive(Debug)]
struct Entry {
    params: ParamMap,
    status: QueryStatus,
    data: Option<Value>,
    error: Option<ApiError>,
    stale: bool,
    invalidated_at_seq: u64,
    applied_seq: u64,
    subscribers: usize,
    in_flight: Option<InFlight>,
}

impl Entry {
    fn new(params: ParamMap, last_seq: u64) -> Self {
        Self {
            params,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            stale: false,
            invalidated_at_seq: 0,
            applied_seq: last_seq,
            subscribers: 0,
            in_flight: None,
        }
    }

    fn state(&self) -> QueryState {
        QueryState {
            status: if self.in_flight.is_some() {
                QueryStatus::Loading
            } else {
                self.status
            },
            data: self.data.clone(),
            error: self.error.clone(),
            is_loading: self.in_flight.is_some(),
            is_stale: self.stale,
        }
    }

    fn fresh_value(&self) -> Option<Value> {
        match (self.status, &self.data) {
            (QueryStatus::Resolved, Some(data)) if !self.stale => Some(data.clone()),
            _ => None,
        }
    }

    /// In-flight request issued after the last invalidation.
    fn joinable(&self) -> Option<watch::Receiver<Settled>> {
        self.in_flight
            .as_ref()
            .filter(|in_flight| in_flight.seq > self.invalidated_at_seq)
            .map(|in_flight| in_flight.result.clone())
    }

    fn mark_stale(&mut self, last_seq: u64) {
        self.stale = true;
        self.invalidated_at_seq = last_seq;
    }

    fn is_evictable(&self) -> bool {
        self.subscribers == 0 && self.in_flight.is_none()
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, Entry>,
    last_seq: u64,
}

impl CacheInner {
    fn next_seq(&mut self) -> u64 {
        self.last_seq += 1;
        self.last_seq
    }

    fn entry(&mut self, key: &CacheKey, params: &ParamMap) -> &mut Entry {
        let last_seq = self.last_seq;
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(params.clone(), last_seq))
    }
}

/// Shared, cloneable handle to one client's query cache.
#[derive(Debug, Clone, Default)]
pub struct QueryCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner
            .lock()
            .expect("query cache lock should not be poisoned")
    }

    /// Registers interest in `key`. The entry stays alive until every
    /// returned [`Subscription`] is dropped.
    pub fn subscribe(&self, key: &CacheKey, params: &ParamMap) -> Subscription {
        let mut inner = self.lock();
        let entry = inner.entry(key, params);
        entry.subscribers += 1;
        tracing::trace!(key = %key, subscribers = entry.subscribers, "subscribed");
        Subscription {
            cache: self.clone(),
            key: key.clone(),
        }
    }

    fn unsubscribe(&self, key: &CacheKey) {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(key) else {
            return;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        tracing::trace!(key = %key, subscribers = entry.subscribers, "unsubscribed");
        if entry.is_evictable() {
            inner.entries.remove(key);
            tracing::trace!(key = %key, "evicted");
        }
    }

    /// Current state of `key`; `Idle` when nothing is cached.
    pub fn state(&self, key: &CacheKey) -> QueryState {
        self.lock()
            .entries
            .get(key)
            .map(Entry::state)
            .unwrap_or_default()
    }

    /// Returns the fresh cached value, joins the in-flight request, or starts
    /// a new one built by `start`. With `force`, always starts a new request.
    pub async fn load<F, Fut>(
        &self,
        key: &CacheKey,
        params: &ParamMap,
        force: bool,
        start: F,
    ) -> Result<Value, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        let receiver = {
            let mut inner = self.lock();
            let entry = inner.entry(key, params);

            if !force {
                if let Some(value) = entry.fresh_value() {
                    tracing::trace!(key = %key, "cache hit");
                    return Ok(value);
                }
            }

            match entry.joinable().filter(|_| !force) {
                Some(receiver) => {
                    tracing::trace!(key = %key, "joining in-flight request");
                    receiver
                }
                None => {
                    let seq = inner.next_seq();
                    self.spawn_request(&mut inner, key, params, seq, start())
                }
            }
        };

        wait_for(receiver).await
    }

    fn spawn_request<Fut>(
        &self,
        inner: &mut CacheInner,
        key: &CacheKey,
        params: &ParamMap,
        seq: u64,
        request: Fut,
    ) -> watch::Receiver<Settled>
    where
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        let (sender, receiver) = watch::channel(None);
        let entry = inner.entry(key, params);
        entry.in_flight = Some(InFlight {
            seq,
            result: receiver.clone(),
        });
        tracing::trace!(key = %key, seq, "loading");

        let cache = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let result = request.await;
            cache.complete(&key, seq, &result);
            let _ = sender.send(Some(result));
        });

        receiver
    }

    fn complete(&self, key: &CacheKey, seq: u64, result: &Result<Value, ApiError>) {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(key) else {
            tracing::trace!(key = %key, seq, "discarding result for evicted key");
            return;
        };

        if entry.in_flight.as_ref().is_some_and(|in_flight| in_flight.seq == seq) {
            entry.in_flight = None;
        }

        if entry.subscribers == 0 {
            if entry.in_flight.is_none() {
                inner.entries.remove(key);
                tracing::trace!(key = %key, seq, "evicted after unsubscribed load");
            }
            return;
        }

        if seq <= entry.applied_seq {
            tracing::trace!(key = %key, seq, applied = entry.applied_seq, "discarding out-of-order result");
            return;
        }

        entry.applied_seq = seq;
        match result {
            Ok(value) => {
                entry.data = Some(value.clone());
                entry.error = None;
                entry.status = QueryStatus::Resolved;
            }
            Err(error) => {
                entry.error = Some(error.clone());
                entry.status = QueryStatus::Errored;
            }
        }
        entry.stale = seq <= entry.invalidated_at_seq;
        tracing::trace!(key = %key, seq, status = ?entry.status, "applied");
    }

    /// Replaces the cached value of `key` locally. Requests already in flight
    /// will not overwrite it.
    pub fn set_data(&self, key: &CacheKey, params: &ParamMap, value: Value) {
        let mut inner = self.lock();
        let seq = inner.next_seq();
        let entry = inner.entry(key, params);
        entry.applied_seq = seq;
        entry.data = Some(value);
        entry.error = None;
        entry.status = QueryStatus::Resolved;
        entry.stale = false;
        tracing::trace!(key = %key, seq, "mutated locally");
        if entry.is_evictable() {
            inner.entries.remove(key);
        }
    }

    /// Marks stale every entry selected by `targets`, comparing
    /// [`ParamMatch::SameValues`] names against `params`. Returns the number
    /// of entries marked.
    pub fn invalidate(&self, targets: &[InvalidationTarget], params: &ParamMap) -> usize {
        let mut inner = self.lock();
        let last_seq = inner.last_seq;
        let mut marked = 0;

        for (key, entry) in inner.entries.iter_mut() {
            let selected = targets.iter().any(|target| {
                key.scope() == target.scope() && params_match(&target.params, &entry.params, params)
            });
            if selected {
                entry.mark_stale(last_seq);
                marked += 1;
                tracing::trace!(key = %key, "invalidated");
            }
        }

        tracing::debug!(targets = targets.len(), marked, "invalidated cached queries");
        marked
    }

    /// Marks stale every entry of every operation of `resource`.
    pub fn invalidate_resource(&self, resource: &str) -> usize {
        let mut inner = self.lock();
        let last_seq = inner.last_seq;
        let mut marked = 0;
        for (key, entry) in inner.entries.iter_mut() {
            if key.resource() == resource {
                entry.mark_stale(last_seq);
                marked += 1;
            }
        }
        marked
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached value. Subscribed entries are reset to `Idle`;
    /// results of requests in flight are discarded.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let last_seq = inner.next_seq();
        inner.entries.retain(|_, entry| entry.subscribers > 0);
        for entry in inner.entries.values_mut() {
            let subscribers = entry.subscribers;
            let params = std::mem::take(&mut entry.params);
            *entry = Entry::new(params, last_seq);
            entry.subscribers = subscribers;
        }
        tracing::debug!(remaining = inner.entries.len(), "cache cleared");
    }
}

fn params_match(matcher: &ParamMatch, cached: &ParamMap, mutation: &ParamMap) -> bool {
    match matcher {
        ParamMatch::Any => true,
        ParamMatch::SameValues(names) => names.iter().all(|name| {
            matches!((cached.get(name), mutation.get(name)), (Some(a), Some(b)) if a == b)
        }),
    }
}

async fn wait_for(mut receiver: watch::Receiver<Settled>) -> Result<Value, ApiError> {
    let settled = match receiver.wait_for(Option::is_some).await {
        Ok(settled) => settled.clone(),
        Err(_) => None,
    };
    settled.unwrap_or_else(|| {
        Err(TransportError::other("request task ended without producing a result").into())
    })
}

/// Keeps a cache entry alive. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    cache: QueryCache,
    key: CacheKey,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key);
    }
}

/// Subscribed view of one query: the hook surface.
///
/// No method returns an error. Failures, including argument and
/// configuration errors found at construction, surface in
/// [`QueryState::error`].
#[derive(Debug)]
pub struct QueryHandle {
    fetcher: Fetcher,
    setup: Result<Bound, ApiError>,
}

#[derive(Debug)]
struct Bound {
    client: ApiClient,
    call: PreparedCall,
    subscription: Subscription,
}

impl QueryHandle {
    pub(crate) fn new(fetcher: Fetcher, args: CallArgs, client: Option<&ApiClient>) -> Self {
        let setup = Self::bind(&fetcher, args, client);
        if let Err(error) = &setup {
            tracing::debug!(
                operation = %fetcher.descriptor().qualified_name(),
                error = %error,
                "query handle created in errored state"
            );
        }
        Self { fetcher, setup }
    }

    fn bind(fetcher: &Fetcher, args: CallArgs, client: Option<&ApiClient>) -> Result<Bound, ApiError> {
        let client = crate::client::resolve_client(client)?;
        let call = PreparedCall::new(Arc::clone(fetcher.descriptor()), args)?;
        let subscription = client.cache().subscribe(&call.cache_key(), call.params());
        Ok(Bound {
            client,
            call,
            subscription,
        })
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn key(&self) -> Option<&CacheKey> {
        self.setup.as_ref().ok().map(|bound| bound.subscription.key())
    }

    pub fn state(&self) -> QueryState {
        match &self.setup {
            Ok(bound) => bound.client.cache().state(bound.subscription.key()),
            Err(error) => QueryState::from_error(error.clone()),
        }
    }

    /// Serves a fresh cached value or loads it, then returns the state.
    pub async fn load(&self) -> QueryState {
        self.run(false).await
    }

    /// Forces a new request, then returns the state.
    pub async fn revalidate(&self) -> QueryState {
        self.run(true).await
    }

    /// Replaces the cached value without a request.
    pub fn mutate(&self, value: Value) -> QueryState {
        if let Ok(bound) = &self.setup {
            bound
                .client
                .cache()
                .set_data(bound.subscription.key(), bound.call.params(), value);
        }
        self.state()
    }

    async fn run(&self, force: bool) -> QueryState {
        let bound = match &self.setup {
            Ok(bound) => bound,
            Err(error) => return QueryState::from_error(error.clone()),
        };

        let client = bound.client.clone();
        let call = bound.call.clone();
        let result = bound
            .client
            .cache()
            .load(bound.subscription.key(), bound.call.params(), force, move || async move {
                fetcher::execute(&client, &call, CallOptions::default()).await
            })
            .await;

        if let Err(error) = &result {
            tracing::debug!(key = %bound.subscription.key(), error = %error, "query failed");
        }
        self.state()
    }
}
