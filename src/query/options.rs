use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::api::Method;
use crate::error::ApiError;

use super::optimistic::OptimisticConfig;
use super::pagination::PaginationConfig;
use super::retry::RetryPolicy;

/// Transform applied to the raw response body before deserialization.
pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

pub type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&ApiError) + Send + Sync>;

/// Declarative description of a logical request and how to manage it.
///
/// Immutable per logical call: a description with different parameters is a
/// different logical request (and hashes to a different signature).
pub struct QueryOptions<T> {
  pub url: String,
  pub method: Method,
  /// Query parameters; kept sorted so signatures are order-stable
  pub params: BTreeMap<String, Value>,
  /// Static request body for mutating methods, used when `mutate` is called
  /// without a payload
  pub body: Option<Value>,
  /// When false, no execution occurs and state stays as it was
  pub enabled: bool,
  /// TTL for cached responses
  pub cache_time: Duration,
  /// Freshness threshold for cache reads; zero means always refetch
  pub stale_time: Duration,
  /// Grace window during which settled executions still absorb new callers
  pub dedupe_time: Duration,
  pub pagination: Option<PaginationConfig>,
  pub optimistic: Option<OptimisticConfig<T>>,
  pub retry: Option<RetryPolicy>,
  pub transform: Option<TransformFn>,
  pub on_success: Option<SuccessCallback<T>>,
  pub on_error: Option<ErrorCallback>,
}

impl<T> QueryOptions<T> {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      method,
      params: BTreeMap::new(),
      body: None,
      enabled: true,
      cache_time: Duration::from_secs(5 * 60),
      stale_time: Duration::ZERO,
      dedupe_time: Duration::from_secs(1),
      pagination: None,
      optimistic: None,
      retry: None,
      transform: None,
      on_success: None,
      on_error: None,
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new(Method::Get, url)
  }

  pub fn post(url: impl Into<String>) -> Self {
    Self::new(Method::Post, url)
  }

  pub fn put(url: impl Into<String>) -> Self {
    Self::new(Method::Put, url)
  }

  pub fn patch(url: impl Into<String>) -> Self {
    Self::new(Method::Patch, url)
  }

  pub fn delete(url: impl Into<String>) -> Self {
    Self::new(Method::Delete, url)
  }

  /// Replace all query parameters.
  pub fn with_params(mut self, params: BTreeMap<String, Value>) -> Self {
    self.params = params;
    self
  }

  /// Set a single query parameter.
  pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn with_enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
    self.cache_time = cache_time;
    self
  }

  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn with_dedupe_time(mut self, dedupe_time: Duration) -> Self {
    self.dedupe_time = dedupe_time;
    self
  }

  pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
    self.pagination = Some(pagination);
    self
  }

  pub fn with_optimistic(mut self, optimistic: OptimisticConfig<T>) -> Self {
    self.optimistic = Some(optimistic);
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = Some(retry);
    self
  }

  pub fn with_transform<F>(mut self, transform: F) -> Self
  where
    F: Fn(Value) -> Value + Send + Sync + 'static,
  {
    self.transform = Some(Arc::new(transform));
    self
  }

  pub fn on_success<F>(mut self, callback: F) -> Self
  where
    F: Fn(&T) + Send + Sync + 'static,
  {
    self.on_success = Some(Arc::new(callback));
    self
  }

  pub fn on_error<F>(mut self, callback: F) -> Self
  where
    F: Fn(&ApiError) + Send + Sync + 'static,
  {
    self.on_error = Some(Arc::new(callback));
    self
  }
}

impl<T> std::fmt::Debug for QueryOptions<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryOptions")
      .field("url", &self.url)
      .field("method", &self.method)
      .field("params", &self.params)
      .field("enabled", &self.enabled)
      .field("cache_time", &self.cache_time)
      .field("stale_time", &self.stale_time)
      .field("dedupe_time", &self.dedupe_time)
      .field("pagination", &self.pagination)
      .field("retry", &self.retry)
      .finish_non_exhaustive()
  }
}
