//! Shared query infrastructure with an explicit lifecycle.
//!
//! One [`QueryClient`] per application: it owns the response cache, the
//! in-flight registry, and the janitor task that sweeps expired cache
//! entries. Handing it to every [`Query`](crate::query::Query) replaces the
//! process-wide mutable maps a hook-style implementation would use, so tests
//! can build isolated instances instead of sharing ambient state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::cache::{InFlightRegistry, ResponseCache};

/// Configuration for a [`QueryClient`].
#[derive(Debug, Clone)]
pub struct QueryClientConfig {
  /// How often the janitor sweeps expired cache entries
  pub sweep_interval: Duration,
}

impl Default for QueryClientConfig {
  fn default() -> Self {
    Self {
      sweep_interval: Duration::from_secs(60),
    }
  }
}

struct Inner {
  cache: Arc<ResponseCache>,
  inflight: Arc<InFlightRegistry>,
  janitor: JoinHandle<()>,
}

impl Drop for Inner {
  fn drop(&mut self) {
    self.janitor.abort();
  }
}

/// Cheaply cloneable handle to the shared cache and in-flight registry.
///
/// Construct one at application start; the janitor stops when the last
/// handle is dropped.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<Inner>,
}

impl QueryClient {
  /// Create a client and spawn its janitor. Requires a tokio runtime.
  pub fn new(config: QueryClientConfig) -> Self {
    let cache = Arc::new(ResponseCache::new());
    let inflight = Arc::new(InFlightRegistry::new());

    let janitor = {
      let cache = Arc::clone(&cache);
      tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.sweep_interval);
        // The first tick fires immediately; skip it so a fresh client does
        // not sweep an empty cache
        interval.tick().await;
        loop {
          interval.tick().await;
          cache.evict_expired();
        }
      })
    };

    Self {
      inner: Arc::new(Inner {
        cache,
        inflight,
        janitor,
      }),
    }
  }

  pub fn cache(&self) -> &Arc<ResponseCache> {
    &self.inner.cache
  }

  pub fn inflight(&self) -> &Arc<InFlightRegistry> {
    &self.inner.inflight
  }
}

impl std::fmt::Debug for QueryClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryClient")
      .field("cached entries", &self.inner.cache.len())
      .field("in-flight", &self.inner.inflight.len())
      .finish()
  }
}
