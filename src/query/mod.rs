//! Per-subscription fetch controller, inspired by TanStack Query.
//!
//! A [`Query<T>`] turns a [`QueryOptions`] description into managed state:
//! it consults the shared response cache, coalesces duplicate executions
//! through the in-flight registry, retries failures per its [`RetryPolicy`],
//! and layers pagination and optimistic mutation on top.
//!
//! Executions run on spawned tasks and report back over a channel; the owner
//! drains it with [`poll`](Query::poll) from its event loop. A generation
//! counter ties every settlement to the execution that produced it, so a
//! superseded request (parameters changed, query disabled) can never
//! overwrite newer state no matter when its response arrives.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::api::Transport;
use crate::cache::{ExecutionResult, RequestSignature, ResponseCache};
use crate::client::QueryClient;
use crate::error::ApiError;

mod optimistic;
mod options;
mod pagination;
mod retry;

pub use crate::api::Method;
pub use optimistic::{OptimisticConfig, UpdateFn};
pub use options::{ErrorCallback, QueryOptions, SuccessCallback, TransformFn};
pub use pagination::PaginationConfig;
pub use retry::RetryPolicy;

use optimistic::Snapshot;
use pagination::{merge_pages, page_len, total_pages, Paginator};

/// Lifecycle state of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
  /// No execution has produced a result yet
  Idle,
  Loading,
  Success,
  Error,
}

/// What a spawned execution reports back to its owning query.
enum ExecEvent {
  AttemptFailed {
    generation: u64,
    attempts: u32,
  },
  Settled {
    generation: u64,
    load_more: bool,
    result: ExecutionResult,
  },
}

/// A single logical request and its managed state.
///
/// Not `Clone`: each subscription owns its state independently. Two queries
/// built from the same options still share cache entries and in-flight
/// executions through their common [`QueryClient`].
pub struct Query<T> {
  client: QueryClient,
  transport: Arc<dyn Transport>,
  options: QueryOptions<T>,

  data: Option<T>,
  /// Raw accumulated body, kept for page merging and cache bookkeeping
  raw: Option<Value>,
  state: QueryState,
  error: Option<ApiError>,

  paginator: Option<Paginator>,
  optimistic_data: Option<T>,
  snapshot: Snapshot<T>,
  retry_count: u32,

  /// Incremented for every new execution; stale settlements are dropped
  generation: u64,
  events_tx: mpsc::UnboundedSender<ExecEvent>,
  events_rx: mpsc::UnboundedReceiver<ExecEvent>,
}

impl<T> Query<T>
where
  T: DeserializeOwned + Clone + Send + 'static,
{
  pub fn new(client: QueryClient, transport: Arc<dyn Transport>, options: QueryOptions<T>) -> Self {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let paginator = options.pagination.as_ref().map(Paginator::new);

    Self {
      client,
      transport,
      options,
      data: None,
      raw: None,
      state: QueryState::Idle,
      error: None,
      paginator,
      optimistic_data: None,
      snapshot: Snapshot::default(),
      retry_count: 0,
      generation: 0,
      events_tx,
      events_rx,
    }
  }

  /// Start fetching, preferring the shared cache for GET requests.
  ///
  /// No-op while disabled or while an execution is already loading. A cached
  /// response younger than `stale_time` is published synchronously without
  /// touching the network; `on_success` does not fire for cache hits.
  pub fn fetch(&mut self) {
    if !self.options.enabled {
      tracing::trace!(url = %self.options.url, "fetch skipped: query disabled");
      return;
    }
    if self.state == QueryState::Loading {
      return;
    }

    if self.options.method.is_get() {
      let (params, body) = self.prepare_request(None);
      let signature =
        RequestSignature::compute(self.options.method, &self.options.url, &params, body.as_ref());

      if let Some((value, age)) = self.client.cache().get(&signature) {
        if !ResponseCache::is_stale(age, self.options.stale_time) {
          if let Ok(typed) = serde_json::from_value::<T>(value.clone()) {
            tracing::trace!(signature = %signature, age_ms = age.as_millis() as u64, "serving fresh cached response");
            if let Some(paginator) = &mut self.paginator {
              if let Some(total) = total_pages(&value) {
                paginator.total_pages = Some(total);
              }
            }
            self.data = Some(typed);
            self.raw = Some(value);
            self.state = QueryState::Success;
            self.error = None;
            return;
          }
        }
      }
    }

    self.start_execution(None, false);
  }

  /// Force a new execution, ignoring cache freshness.
  ///
  /// Supersedes any execution still in flight: its eventual settlement is
  /// discarded.
  pub fn refetch(&mut self) {
    self.start_execution(None, false);
  }

  /// Execute the request with an explicit payload (mutating methods), or
  /// with the options' static body when `payload` is `None`.
  ///
  /// When an [`OptimisticConfig`] is present, `data` is replaced with the
  /// projected result immediately; settlement either confirms it with the
  /// server response or rolls it back per `rollback_on_error`.
  pub fn mutate(&mut self, payload: Option<Value>) {
    if let Some(optimistic) = &self.options.optimistic {
      self.snapshot.capture(&self.data);
      let projected = (optimistic.update_data)(self.data.as_ref(), payload.as_ref());
      self.optimistic_data = Some(projected.clone());
      self.data = Some(projected);
    }

    self.start_execution(payload, false);
  }

  /// Fetch the next page and append its items (infinite scroll only).
  ///
  /// No-op in paged mode, when the end of data was reached, or while a
  /// previous `load_more` is still in flight.
  pub fn load_more(&mut self) {
    let Some(paginator) = &mut self.paginator else {
      return;
    };
    if !paginator.infinite_scroll || !paginator.has_more || paginator.is_fetching_more {
      return;
    }

    paginator.is_fetching_more = true;
    paginator.page += 1;
    self.start_execution(None, true);
  }

  /// Jump to a page (clamped to 1) and fetch it, replacing current data.
  pub fn set_page(&mut self, page: u64) {
    let Some(paginator) = &mut self.paginator else {
      return;
    };

    let page = page.max(1);
    if paginator.page == page {
      return;
    }
    paginator.page = page;

    if self.options.enabled {
      self.start_execution(None, false);
    }
  }

  /// Advance to the next page if the last response said one exists.
  pub fn next_page(&mut self) {
    if self.has_next_page() {
      self.set_page(self.page() + 1);
    }
  }

  pub fn previous_page(&mut self) {
    if self.has_previous_page() {
      self.set_page(self.page() - 1);
    }
  }

  /// Replace the query parameters. This changes the request signature, so
  /// any in-flight execution is superseded and a fresh fetch starts if the
  /// query is enabled.
  pub fn set_params(&mut self, params: BTreeMap<String, Value>) {
    self.options.params = params;
    self.generation += 1;
    if self.options.enabled {
      self.start_execution(None, false);
    }
  }

  /// Point the query at a different URL, superseding any in-flight
  /// execution, and fetch if enabled.
  pub fn set_url(&mut self, url: impl Into<String>) {
    self.options.url = url.into();
    self.generation += 1;
    if self.options.enabled {
      self.start_execution(None, false);
    }
  }

  /// Enable or disable the query. Enabling triggers a fetch; disabling
  /// detaches any in-flight execution so its result is dropped.
  pub fn set_enabled(&mut self, enabled: bool) {
    self.options.enabled = enabled;

    if enabled {
      self.fetch();
    } else {
      self.generation += 1;
      if self.state == QueryState::Loading {
        self.state = QueryState::Idle;
      }
      if let Some(paginator) = &mut self.paginator {
        paginator.is_fetching_more = false;
      }
    }
  }

  pub fn reset_retry_count(&mut self) {
    self.retry_count = 0;
  }

  /// Drain settlement events from finished executions and apply those that
  /// belong to the current generation. Returns whether state changed.
  ///
  /// Call this from the owner's event loop tick.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;

    while let Ok(event) = self.events_rx.try_recv() {
      match event {
        ExecEvent::AttemptFailed {
          generation,
          attempts,
        } if generation == self.generation => {
          self.retry_count = attempts;
          changed = true;
        }
        ExecEvent::Settled {
          generation,
          load_more,
          result,
        } if generation == self.generation => {
          self.apply_settlement(load_more, result);
          changed = true;
        }
        _ => {
          tracing::trace!(url = %self.options.url, "dropping event from superseded execution");
        }
      }
    }

    changed
  }

  fn apply_settlement(&mut self, load_more: bool, result: ExecutionResult) {
    match result {
      Ok(new_page) => {
        let merged = if load_more && self.paginator.as_ref().is_some_and(|p| p.infinite_scroll) {
          match &self.raw {
            Some(previous) => merge_pages(previous, &new_page),
            None => new_page.clone(),
          }
        } else {
          new_page.clone()
        };

        let typed: T = match serde_json::from_value(merged.clone()) {
          Ok(typed) => typed,
          Err(err) => {
            self.fail(ApiError::Serialization(format!(
              "failed to deserialize response: {err}"
            )));
            return;
          }
        };

        if let Some(paginator) = &mut self.paginator {
          paginator.is_fetching_more = false;
          if let Some(total) = total_pages(&new_page) {
            paginator.total_pages = Some(total);
          }
          if paginator.infinite_scroll {
            // A page shorter than the page size is the end-of-data signal
            if let Some(len) = page_len(&new_page) {
              paginator.has_more = len == paginator.page_size;
            }
          }
        }

        self.data = Some(typed);
        self.raw = Some(merged);
        self.state = QueryState::Success;
        self.error = None;
        self.optimistic_data = None;
        self.snapshot.discard();

        if let (Some(callback), Some(data)) = (&self.options.on_success, &self.data) {
          callback(data);
        }
      }
      Err(error) => self.fail(error),
    }
  }

  fn fail(&mut self, error: ApiError) {
    tracing::debug!(url = %self.options.url, error = %error, "query failed");

    if let Some(paginator) = &mut self.paginator {
      paginator.is_fetching_more = false;
    }

    if let Some(optimistic) = &self.options.optimistic {
      if optimistic.rollback_on_error {
        if let Some(previous) = self.snapshot.take() {
          self.data = previous;
        }
      } else {
        // Keep the projection; the snapshot is no longer needed
        self.snapshot.discard();
      }
    }
    self.optimistic_data = None;

    self.state = QueryState::Error;
    if let Some(callback) = &self.options.on_error {
      callback(&error);
    }
    self.error = Some(error);
  }

  /// Wire-level parameters and body for the current state.
  ///
  /// Paginated GETs carry `page` and `pageSize` as query parameters in both
  /// pagination modes, so the signature distinguishes pages and the server
  /// sees which one to produce. Mutating methods send the payload (or the
  /// static body) and no parameters; DELETE sends neither.
  fn prepare_request(&self, payload: Option<Value>) -> (BTreeMap<String, Value>, Option<Value>) {
    match self.options.method {
      Method::Get => {
        let mut params = self.options.params.clone();
        if let Some(paginator) = &self.paginator {
          params.insert("page".to_string(), Value::from(paginator.page));
          params.insert(
            "pageSize".to_string(),
            Value::from(paginator.page_size as u64),
          );
        }
        (params, None)
      }
      Method::Delete => (BTreeMap::new(), None),
      Method::Post | Method::Put | Method::Patch => (
        BTreeMap::new(),
        payload.or_else(|| self.options.body.clone()),
      ),
    }
  }

  /// Kick off (or join) an execution for the current request description.
  ///
  /// The retry loop runs inside the shared execution, so every caller that
  /// joined it observes the final outcome after all attempts. Successful GET
  /// responses are written to the cache by the execution itself, post
  /// transform, before any joiner sees them.
  fn start_execution(&mut self, payload: Option<Value>, load_more: bool) {
    self.generation += 1;
    let generation = self.generation;

    if !load_more {
      self.state = QueryState::Loading;
    }
    self.error = None;

    let (wire_params, body) = self.prepare_request(payload);
    let signature =
      RequestSignature::compute(self.options.method, &self.options.url, &wire_params, body.as_ref());

    let transport = Arc::clone(&self.transport);
    let cache = Arc::clone(self.client.cache());
    let cache_key = signature.clone();
    let method = self.options.method;
    let url = self.options.url.clone();
    let cache_time = self.options.cache_time;
    let retry = self.options.retry.clone();
    let transform = self.options.transform.clone();
    let attempt_events = self.events_tx.clone();

    let execution = self.client.inflight().join_or_start(
      &signature,
      self.options.dedupe_time,
      move || {
        async move {
          let mut attempts: u32 = 0;
          loop {
            let result =
              dispatch(transport.as_ref(), method, &url, &wire_params, body.as_ref()).await;
            attempts += 1;

            match result {
              Ok(value) => {
                let value = match &transform {
                  Some(transform) => transform(value),
                  None => value,
                };
                if method.is_get() {
                  cache.put(&cache_key, value.clone(), cache_time);
                }
                return Ok(value);
              }
              Err(error) => {
                if let Some(policy) = &retry {
                  let _ = attempt_events.send(ExecEvent::AttemptFailed {
                    generation,
                    attempts,
                  });
                  if policy.should_retry(attempts) {
                    tracing::debug!(url = %url, attempts, "attempt failed, retrying");
                    tokio::time::sleep(policy.retry_delay).await;
                    continue;
                  }
                }
                return Err(error);
              }
            }
          }
        }
        .boxed()
      },
    );

    let settle_events = self.events_tx.clone();
    tokio::spawn(async move {
      let result = execution.await;
      let _ = settle_events.send(ExecEvent::Settled {
        generation,
        load_more,
        result,
      });
    });
  }

  pub fn state(&self) -> QueryState {
    self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  /// The raw accumulated response body, before deserialization.
  pub fn raw(&self) -> Option<&Value> {
    self.raw.as_ref()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.state == QueryState::Loading
  }

  pub fn is_error(&self) -> bool {
    self.state == QueryState::Error
  }

  /// Current page, 1 for unpaginated queries.
  pub fn page(&self) -> u64 {
    self.paginator.as_ref().map(|p| p.page).unwrap_or(1)
  }

  pub fn has_next_page(&self) -> bool {
    self.paginator.as_ref().is_some_and(Paginator::has_next)
  }

  pub fn has_previous_page(&self) -> bool {
    self.paginator.as_ref().is_some_and(Paginator::has_previous)
  }

  /// Whether another page may exist (infinite scroll).
  pub fn has_more(&self) -> bool {
    self.paginator.as_ref().is_some_and(|p| p.has_more)
  }

  pub fn is_fetching_more(&self) -> bool {
    self.paginator.as_ref().is_some_and(|p| p.is_fetching_more)
  }

  /// The pending optimistic projection, if a mutation is unsettled.
  pub fn optimistic_data(&self) -> Option<&T> {
    self.optimistic_data.as_ref()
  }

  pub fn retry_count(&self) -> u32 {
    self.retry_count
  }

  pub fn options(&self) -> &QueryOptions<T> {
    &self.options
  }
}

impl<T> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("url", &self.options.url)
      .field("method", &self.options.method)
      .field("state", &self.state)
      .field("error", &self.error)
      .field("retry_count", &self.retry_count)
      .field("generation", &self.generation)
      .finish_non_exhaustive()
  }
}

async fn dispatch(
  transport: &dyn Transport,
  method: Method,
  url: &str,
  params: &BTreeMap<String, Value>,
  body: Option<&Value>,
) -> ExecutionResult {
  match method {
    Method::Get => transport.get(url, params).await,
    Method::Post => transport.post(url, body).await,
    Method::Put => transport.put(url, body).await,
    Method::Patch => transport.patch(url, body).await,
    Method::Delete => transport.delete(url).await,
  }
}
