//! In-flight execution registry: one network call per signature.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::time::Instant;

use crate::error::ApiError;

use super::signature::RequestSignature;

/// Outcome of one execution, cloneable so it can fan out to every joiner.
pub type ExecutionResult = Result<Value, ApiError>;

/// A pending execution multiple callers can await.
pub type SharedExecution = Shared<BoxFuture<'static, ExecutionResult>>;

/// One registered execution and its dedupe bookkeeping.
///
/// `settled_at` is written from inside the shared future the moment it
/// completes, so expiry never depends on when the cleanup task gets
/// scheduled.
struct Entry {
  execution: SharedExecution,
  settled_at: Arc<Mutex<Option<Instant>>>,
  window: Duration,
}

impl Entry {
  /// Settled longer ago than the dedupe window allows.
  fn is_expired(&self, now: Instant) -> bool {
    self
      .settled_at
      .lock()
      .unwrap()
      .is_some_and(|settled| now.saturating_duration_since(settled) > self.window)
  }
}

/// Maps request signatures to their single outstanding execution.
///
/// Joining callers share the pending result instead of issuing duplicate
/// network work. A settled entry stays joinable for the dedupe window so
/// near-simultaneous late joiners still coalesce; past the window it counts
/// as absent at join time, even if the cleanup task has not swept it yet.
#[derive(Default)]
pub struct InFlightRegistry {
  entries: Mutex<HashMap<RequestSignature, Entry>>,
}

impl InFlightRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Join the outstanding execution for `signature`, or start one.
  ///
  /// `start` is only invoked when no joinable execution is registered: a
  /// pending one, or one that settled within the last `dedupe_window`. An
  /// entry settled longer ago is removed eagerly and a fresh execution
  /// starts. The returned future always runs to completion even if every
  /// caller stops awaiting it: a watcher task drives it, then sweeps the
  /// entry once its window has passed.
  pub fn join_or_start<F>(
    self: &Arc<Self>,
    signature: &RequestSignature,
    dedupe_window: Duration,
    start: F,
  ) -> SharedExecution
  where
    F: FnOnce() -> BoxFuture<'static, ExecutionResult>,
  {
    let mut entries = self.entries.lock().unwrap();
    let now = Instant::now();

    let joinable = entries
      .get(signature)
      .filter(|entry| !entry.is_expired(now))
      .map(|entry| entry.execution.clone());
    if let Some(execution) = joinable {
      tracing::trace!(signature = %signature, "joining in-flight execution");
      return execution;
    }
    // Absent, or settled past its window but not yet swept
    entries.remove(signature);

    let settled_at = Arc::new(Mutex::new(None));
    let execution = {
      let settled_at = Arc::clone(&settled_at);
      let inner = start();
      async move {
        let result = inner.await;
        *settled_at.lock().unwrap() = Some(Instant::now());
        result
      }
      .boxed()
      .shared()
    };

    entries.insert(
      signature.clone(),
      Entry {
        execution: execution.clone(),
        settled_at: Arc::clone(&settled_at),
        window: dedupe_window,
      },
    );
    drop(entries);

    let registry = Arc::clone(self);
    let key = signature.clone();
    let settled = execution.clone();
    tokio::spawn(async move {
      let _ = settled.await;
      tokio::time::sleep(dedupe_window).await;
      let mut entries = registry.entries.lock().unwrap();
      // Only sweep the entry this task was spawned for, never a replacement
      // registered under the same signature in the meantime
      if entries
        .get(&key)
        .is_some_and(|entry| Arc::ptr_eq(&entry.settled_at, &settled_at))
      {
        entries.remove(&key);
      }
    });

    execution
  }

  /// Number of executions currently registered (pending or within their
  /// dedupe window).
  pub fn len(&self) -> usize {
    self.entries.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Method;
  use serde_json::json;
  use std::collections::BTreeMap;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn sig(url: &str) -> RequestSignature {
    RequestSignature::compute(Method::Get, url, &BTreeMap::new(), None)
  }

  fn counting_execution(
    counter: &Arc<AtomicU32>,
    latency: Duration,
    value: Value,
  ) -> impl FnOnce() -> BoxFuture<'static, ExecutionResult> {
    let counter = Arc::clone(counter);
    move || {
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(latency).await;
        Ok(value)
      }
      .boxed()
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_callers_share_one_execution() {
    let registry = Arc::new(InFlightRegistry::new());
    let counter = Arc::new(AtomicU32::new(0));
    let key = sig("/items");
    let window = Duration::from_secs(1);

    let first = registry.join_or_start(
      &key,
      window,
      counting_execution(&counter, Duration::from_millis(50), json!(1)),
    );
    let second = registry.join_or_start(
      &key,
      window,
      counting_execution(&counter, Duration::from_millis(50), json!(2)),
    );

    let (a, b) = tokio::join!(first, second);
    assert_eq!(a.unwrap(), json!(1));
    assert_eq!(b.unwrap(), json!(1));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_late_joiner_within_dedupe_window_coalesces() {
    let registry = Arc::new(InFlightRegistry::new());
    let counter = Arc::new(AtomicU32::new(0));
    let key = sig("/items");
    let window = Duration::from_secs(1);

    let first = registry.join_or_start(
      &key,
      window,
      counting_execution(&counter, Duration::ZERO, json!(1)),
    );
    assert_eq!(first.await.unwrap(), json!(1));

    // Settled, but still inside the window: the joiner gets the same result
    tokio::time::advance(Duration::from_millis(500)).await;
    let joiner = registry.join_or_start(
      &key,
      window,
      counting_execution(&counter, Duration::ZERO, json!(2)),
    );
    assert_eq!(joiner.await.unwrap(), json!(1));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_settled_entry_past_window_starts_fresh() {
    let registry = Arc::new(InFlightRegistry::new());
    let counter = Arc::new(AtomicU32::new(0));
    let key = sig("/items");
    let window = Duration::from_secs(1);

    let first = registry.join_or_start(
      &key,
      window,
      counting_execution(&counter, Duration::ZERO, json!(1)),
    );
    assert_eq!(first.await.unwrap(), json!(1));

    // Jump past the window without giving the sweeper a chance to run: the
    // settled entry must count as absent purely by its age
    tokio::time::advance(window + Duration::from_secs(1)).await;

    let second = registry.join_or_start(
      &key,
      window,
      counting_execution(&counter, Duration::ZERO, json!(2)),
    );
    assert_eq!(second.await.unwrap(), json!(2));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_sweeper_spares_replacement_entry() {
    let registry = Arc::new(InFlightRegistry::new());
    let counter = Arc::new(AtomicU32::new(0));
    let key = sig("/items");
    let window = Duration::from_secs(1);

    let first = registry.join_or_start(
      &key,
      window,
      counting_execution(&counter, Duration::ZERO, json!(1)),
    );
    assert_eq!(first.await.unwrap(), json!(1));

    tokio::time::advance(Duration::from_secs(2)).await;

    // Replacement under the same signature, still running while the first
    // execution's delayed sweep fires
    let second = registry.join_or_start(
      &key,
      window,
      counting_execution(&counter, Duration::from_secs(5), json!(2)),
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(registry.len(), 1);

    assert_eq!(second.await.unwrap(), json!(2));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_entry_removed_after_dedupe_window() {
    let registry = Arc::new(InFlightRegistry::new());
    let counter = Arc::new(AtomicU32::new(0));
    let key = sig("/items");
    let window = Duration::from_secs(1);

    let first = registry.join_or_start(
      &key,
      window,
      counting_execution(&counter, Duration::ZERO, json!(1)),
    );
    assert_eq!(first.await.unwrap(), json!(1));

    tokio::time::sleep(window + Duration::from_millis(10)).await;
    assert!(registry.is_empty());

    // A fresh execution starts now
    let second = registry.join_or_start(
      &key,
      window,
      counting_execution(&counter, Duration::ZERO, json!(2)),
    );
    assert_eq!(second.await.unwrap(), json!(2));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_distinct_signatures_run_independently() {
    let registry = Arc::new(InFlightRegistry::new());
    let counter = Arc::new(AtomicU32::new(0));
    let window = Duration::from_secs(1);

    let a = registry.join_or_start(
      &sig("/a"),
      window,
      counting_execution(&counter, Duration::from_millis(10), json!("a")),
    );
    let b = registry.join_or_start(
      &sig("/b"),
      window,
      counting_execution(&counter, Duration::from_millis(10), json!("b")),
    );

    let (a, b) = tokio::join!(a, b);
    assert_eq!(a.unwrap(), json!("a"));
    assert_eq!(b.unwrap(), json!("b"));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_abandoned_execution_still_completes() {
    let registry = Arc::new(InFlightRegistry::new());
    let completed = Arc::new(AtomicU32::new(0));
    let key = sig("/items");

    {
      let completed = Arc::clone(&completed);
      let _dropped = registry.join_or_start(&key, Duration::ZERO, move || {
        async move {
          tokio::time::sleep(Duration::from_millis(20)).await;
          completed.fetch_add(1, Ordering::SeqCst);
          Ok(json!(1))
        }
        .boxed()
      });
      // Caller drops its handle without awaiting
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
  }
}
