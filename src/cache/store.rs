//! Time-bounded in-memory response cache.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use super::signature::RequestSignature;

/// A cached response value and its capture time.
#[derive(Debug, Clone)]
struct CacheEntry {
  value: Value,
  captured_at: Instant,
  /// TTL carried from the originating query's cache_time
  ttl: Duration,
}

impl CacheEntry {
  fn age(&self, now: Instant) -> Duration {
    now.saturating_duration_since(self.captured_at)
  }

  fn is_expired(&self, now: Instant) -> bool {
    self.age(now) > self.ttl
  }
}

/// Maps request signatures to cached response bodies.
///
/// Only successful GET responses belong here; mutating methods never populate
/// or consult it. Entries past their TTL are treated as absent on read and
/// physically removed by the janitor's periodic [`evict_expired`] sweep.
///
/// [`evict_expired`]: ResponseCache::evict_expired
#[derive(Debug, Default)]
pub struct ResponseCache {
  entries: Mutex<HashMap<RequestSignature, CacheEntry>>,
}

impl ResponseCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Store a value, overwriting any prior entry for the signature.
  pub fn put(&self, signature: &RequestSignature, value: Value, ttl: Duration) {
    let mut entries = self.entries.lock().unwrap();
    entries.insert(
      signature.clone(),
      CacheEntry {
        value,
        captured_at: Instant::now(),
        ttl,
      },
    );
  }

  /// Look up a value and its age. Entries older than their TTL count as
  /// absent even before the janitor removes them.
  pub fn get(&self, signature: &RequestSignature) -> Option<(Value, Duration)> {
    let entries = self.entries.lock().unwrap();
    let entry = entries.get(signature)?;

    let now = Instant::now();
    if entry.is_expired(now) {
      return None;
    }

    Some((entry.value.clone(), entry.age(now)))
  }

  /// Whether a cached value of the given age is stale for the caller's
  /// freshness threshold. A threshold of zero means always stale (the cache
  /// is bypassed for freshness decisions but still populated).
  pub fn is_stale(age: Duration, stale_time: Duration) -> bool {
    stale_time.is_zero() || age > stale_time
  }

  /// Remove entries past their TTL. Returns how many were evicted.
  pub fn evict_expired(&self) -> usize {
    let mut entries = self.entries.lock().unwrap();
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    let evicted = before - entries.len();

    if evicted > 0 {
      tracing::debug!(evicted, remaining = entries.len(), "evicted expired cache entries");
    }
    evicted
  }

  pub fn len(&self) -> usize {
    self.entries.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) {
    self.entries.lock().unwrap().clear();
  }
}
