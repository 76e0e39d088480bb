//! Scripted transport for tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;

use super::types::Method;
use super::Transport;

/// One request as the mock saw it.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
  pub method: Method,
  pub url: String,
  pub params: BTreeMap<String, Value>,
  pub body: Option<Value>,
}

/// Transport double: replays a scripted sequence of results, then a fallback.
///
/// Each scripted entry carries a simulated latency so tests can interleave
/// slow and fast executions deterministically under a paused clock.
pub(crate) struct MockTransport {
  script: Mutex<VecDeque<(Duration, Result<Value, ApiError>)>>,
  fallback: Mutex<(Duration, Result<Value, ApiError>)>,
  calls: AtomicU32,
  requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
  pub fn new() -> Self {
    Self {
      script: Mutex::new(VecDeque::new()),
      fallback: Mutex::new((
        Duration::ZERO,
        Err(ApiError::Unknown("no scripted response".to_string())),
      )),
      calls: AtomicU32::new(0),
      requests: Mutex::new(Vec::new()),
    }
  }

  /// A transport that answers every call with the same value.
  pub fn always_ok(value: Value) -> Self {
    let mock = Self::new();
    mock.set_fallback(Ok(value));
    mock
  }

  /// A transport that fails every call with the same error.
  pub fn always_err(error: ApiError) -> Self {
    let mock = Self::new();
    mock.set_fallback(Err(error));
    mock
  }

  pub fn push_ok(&self, value: Value) {
    self.push_delayed(Duration::ZERO, Ok(value));
  }

  pub fn push_err(&self, error: ApiError) {
    self.push_delayed(Duration::ZERO, Err(error));
  }

  pub fn push_delayed(&self, latency: Duration, result: Result<Value, ApiError>) {
    self.script.lock().unwrap().push_back((latency, result));
  }

  pub fn set_fallback(&self, result: Result<Value, ApiError>) {
    *self.fallback.lock().unwrap() = (Duration::ZERO, result);
  }

  /// How many times the transport was invoked.
  pub fn calls(&self) -> u32 {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn requests(&self) -> Vec<RecordedRequest> {
    self.requests.lock().unwrap().clone()
  }

  async fn handle(
    &self,
    method: Method,
    url: &str,
    params: BTreeMap<String, Value>,
    body: Option<Value>,
  ) -> Result<Value, ApiError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.requests.lock().unwrap().push(RecordedRequest {
      method,
      url: url.to_string(),
      params,
      body,
    });

    let (latency, result) = {
      let mut script = self.script.lock().unwrap();
      match script.pop_front() {
        Some(entry) => entry,
        None => self.fallback.lock().unwrap().clone(),
      }
    };

    if !latency.is_zero() {
      tokio::time::sleep(latency).await;
    }
    result
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn get(&self, url: &str, params: &BTreeMap<String, Value>) -> Result<Value, ApiError> {
    self.handle(Method::Get, url, params.clone(), None).await
  }

  async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
    self
      .handle(Method::Post, url, BTreeMap::new(), body.cloned())
      .await
  }

  async fn put(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
    self
      .handle(Method::Put, url, BTreeMap::new(), body.cloned())
      .await
  }

  async fn patch(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
    self
      .handle(Method::Patch, url, BTreeMap::new(), body.cloned())
      .await
  }

  async fn delete(&self, url: &str) -> Result<Value, ApiError> {
    self.handle(Method::Delete, url, BTreeMap::new(), None).await
  }
}
